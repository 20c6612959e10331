// src/store/memory.rs

//! In-memory store for tests. Mirrors the guarantees of the PostgreSQL
//! statements: every method runs under one lock, which plays the role of the
//! row-level atomicity the database provides.

use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;

use crate::models::{
    assignment::{Assignment, AssignmentFilter, AssignmentStatus, NewAssignment},
    band::Band,
    mock_test::{MockTest, NewTest, TestChanges},
    module::{ModuleChanges, NewModule, TestModule},
    result::ExamResult,
    submission::{Submission, UpsertSubmission},
};
use crate::store::{AssignmentStore, CatalogStore, StoreResult, SubmissionStore};

#[derive(Default)]
struct Tables {
    next_id: i64,
    tests: Vec<MockTest>,
    modules: Vec<TestModule>,
    assignments: Vec<Assignment>,
    submissions: Vec<Submission>,
    results: Vec<ExamResult>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn awaiting_grading(&self, assignment: &Assignment) -> bool {
        self.modules
            .iter()
            .filter(|m| m.test_id == assignment.test_id)
            .all(|m| {
                self.submissions.iter().any(|s| {
                    s.assignment_id == assignment.id && s.module_id == m.id && s.is_submitted()
                })
            })
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().expect("memory store lock poisoned")
    }

    /// Number of submission rows for one (assignment, module) pair.
    pub fn submission_rows(&self, assignment_id: i64, module_id: i64) -> usize {
        self.lock()
            .submissions
            .iter()
            .filter(|s| s.assignment_id == assignment_id && s.module_id == module_id)
            .count()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn create_test(&self, test: NewTest) -> StoreResult<MockTest> {
        let mut tables = self.lock();
        let now = Utc::now();
        let row = MockTest {
            id: tables.next_id(),
            title: test.title,
            description: test.description,
            published: test.published,
            created_at: now,
            updated_at: now,
        };
        tables.tests.push(row.clone());
        Ok(row)
    }

    async fn list_tests(&self, published_only: bool) -> StoreResult<Vec<MockTest>> {
        let tables = self.lock();
        let mut rows: Vec<MockTest> = tables
            .tests
            .iter()
            .filter(|t| t.published || !published_only)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(rows)
    }

    async fn find_test(&self, id: i64) -> StoreResult<Option<MockTest>> {
        Ok(self.lock().tests.iter().find(|t| t.id == id).cloned())
    }

    async fn update_test(&self, id: i64, changes: TestChanges) -> StoreResult<Option<MockTest>> {
        let mut tables = self.lock();
        let Some(row) = tables.tests.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(description) = changes.description {
            row.description = Some(description).filter(|d| !d.is_empty());
        }
        if let Some(published) = changes.published {
            row.published = published;
        }
        row.updated_at = Utc::now();
        Ok(Some(row.clone()))
    }

    async fn delete_test(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock();
        let before = tables.tests.len();
        tables.tests.retain(|t| t.id != id);
        tables.modules.retain(|m| m.test_id != id);
        Ok(tables.tests.len() < before)
    }

    async fn create_module(&self, module: NewModule) -> StoreResult<TestModule> {
        let mut tables = self.lock();
        let row = TestModule {
            id: tables.next_id(),
            test_id: module.test_id,
            kind: module.kind,
            title: module.title,
            position: module.position,
            duration_minutes: module.duration_minutes,
            answer_key: Json(module.answer_key),
            created_at: Utc::now(),
        };
        tables.modules.push(row.clone());
        Ok(row)
    }

    async fn list_modules(&self, test_id: i64) -> StoreResult<Vec<TestModule>> {
        let tables = self.lock();
        let mut rows: Vec<TestModule> = tables
            .modules
            .iter()
            .filter(|m| m.test_id == test_id)
            .cloned()
            .collect();
        rows.sort_by_key(|m| (m.position, m.id));
        Ok(rows)
    }

    async fn find_module(&self, id: i64) -> StoreResult<Option<TestModule>> {
        Ok(self.lock().modules.iter().find(|m| m.id == id).cloned())
    }

    async fn update_module(
        &self,
        id: i64,
        changes: ModuleChanges,
    ) -> StoreResult<Option<TestModule>> {
        let mut tables = self.lock();
        let Some(row) = tables.modules.iter_mut().find(|m| m.id == id) else {
            return Ok(None);
        };
        if let Some(title) = changes.title {
            row.title = title;
        }
        if let Some(position) = changes.position {
            row.position = position;
        }
        if let Some(duration) = changes.duration_minutes {
            row.duration_minutes = duration;
        }
        if let Some(answer_key) = changes.answer_key {
            row.answer_key = Json(answer_key);
        }
        Ok(Some(row.clone()))
    }

    async fn delete_module(&self, id: i64) -> StoreResult<bool> {
        let mut tables = self.lock();
        let before = tables.modules.len();
        tables.modules.retain(|m| m.id != id);
        tables.submissions.retain(|s| s.module_id != id);
        Ok(tables.modules.len() < before)
    }
}

#[async_trait]
impl AssignmentStore for MemoryStore {
    async fn insert_assignment(&self, new: NewAssignment) -> StoreResult<Option<Assignment>> {
        let mut tables = self.lock();
        let clash = tables.assignments.iter().any(|a| {
            a.token == new.token
                || (a.status == AssignmentStatus::Active
                    && a.student_id == new.student_id
                    && a.test_id == new.test_id)
        });
        if clash {
            return Ok(None);
        }
        let row = Assignment {
            id: tables.next_id(),
            student_id: new.student_id,
            test_id: new.test_id,
            token: new.token,
            valid_from: new.valid_from,
            valid_until: new.valid_until,
            status: AssignmentStatus::Active,
            created_at: new.valid_from,
            updated_at: new.valid_from,
        };
        tables.assignments.push(row.clone());
        Ok(Some(row))
    }

    async fn find_assignment(&self, id: i64) -> StoreResult<Option<Assignment>> {
        Ok(self.lock().assignments.iter().find(|a| a.id == id).cloned())
    }

    async fn find_assignment_by_token(&self, token: &str) -> StoreResult<Option<Assignment>> {
        Ok(self.lock().assignments.iter().find(|a| a.token == token).cloned())
    }

    async fn find_active_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> StoreResult<Option<Assignment>> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .find(|a| {
                a.student_id == student_id
                    && a.test_id == test_id
                    && a.status == AssignmentStatus::Active
            })
            .cloned())
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> StoreResult<Vec<Assignment>> {
        let tables = self.lock();
        let mut rows: Vec<Assignment> = tables
            .assignments
            .iter()
            .filter(|a| filter.status.is_none_or(|s| a.status == s))
            .filter(|a| filter.student_id.is_none_or(|id| a.student_id == id))
            .filter(|a| filter.test_id.is_none_or(|id| a.test_id == id))
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(rows)
    }

    async fn count_assignments_for_test(&self, test_id: i64) -> StoreResult<i64> {
        Ok(self
            .lock()
            .assignments
            .iter()
            .filter(|a| a.test_id == test_id)
            .count() as i64)
    }

    async fn complete_assignment(
        &self,
        result: ExamResult,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Assignment>> {
        let mut tables = self.lock();
        let Some(row) = tables
            .assignments
            .iter_mut()
            .find(|a| a.id == result.assignment_id && a.status == AssignmentStatus::Active)
        else {
            return Ok(None);
        };
        row.status = AssignmentStatus::Completed;
        row.updated_at = now;
        let completed = row.clone();
        tables.results.push(result);
        Ok(Some(completed))
    }

    async fn expire_assignment(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Assignment>> {
        let mut tables = self.lock();
        let spared = tables
            .assignments
            .iter()
            .find(|a| a.id == id)
            .is_some_and(|a| tables.awaiting_grading(a));
        if spared {
            return Ok(None);
        }
        let Some(row) = tables
            .assignments
            .iter_mut()
            .find(|a| a.id == id && a.status == AssignmentStatus::Active)
        else {
            return Ok(None);
        };
        row.status = AssignmentStatus::Expired;
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let mut tables = self.lock();
        let overdue: Vec<i64> = tables
            .assignments
            .iter()
            .filter(|a| a.status == AssignmentStatus::Active && a.valid_until < now)
            .filter(|a| !tables.awaiting_grading(a))
            .map(|a| a.id)
            .collect();
        for row in tables.assignments.iter_mut() {
            if overdue.contains(&row.id) {
                row.status = AssignmentStatus::Expired;
                row.updated_at = now;
            }
        }
        Ok(overdue.len() as u64)
    }
}

#[async_trait]
impl SubmissionStore for MemoryStore {
    async fn upsert_submission(&self, upsert: UpsertSubmission) -> StoreResult<Option<Submission>> {
        let mut tables = self.lock();
        let accepting = tables.assignments.iter().any(|a| {
            a.id == upsert.assignment_id
                && a.status == AssignmentStatus::Active
                && a.is_within_window(upsert.now)
        });
        if !accepting {
            return Ok(None);
        }

        if let Some(row) = tables
            .submissions
            .iter_mut()
            .find(|s| s.assignment_id == upsert.assignment_id && s.module_id == upsert.module_id)
        {
            if row.is_submitted() {
                return Ok(None);
            }
            row.answers = Json(upsert.answers);
            row.time_spent_secs = upsert.time_spent_secs;
            row.updated_at = upsert.now;
            return Ok(Some(row.clone()));
        }

        let row = Submission {
            id: tables.next_id(),
            assignment_id: upsert.assignment_id,
            module_id: upsert.module_id,
            answers: Json(upsert.answers),
            time_spent_secs: upsert.time_spent_secs,
            started_at: upsert.now,
            updated_at: upsert.now,
            submitted_at: None,
            raw_score: None,
            band: None,
        };
        tables.submissions.push(row.clone());
        Ok(Some(row))
    }

    async fn finalize_submission(
        &self,
        id: i64,
        raw_score: Option<i32>,
        band: Option<Band>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>> {
        let mut tables = self.lock();
        let Some(assignment_id) = tables
            .submissions
            .iter()
            .find(|s| s.id == id && !s.is_submitted())
            .map(|s| s.assignment_id)
        else {
            return Ok(None);
        };
        let active = tables
            .assignments
            .iter()
            .any(|a| a.id == assignment_id && a.status == AssignmentStatus::Active);
        if !active {
            return Ok(None);
        }
        let Some(row) = tables.submissions.iter_mut().find(|s| s.id == id) else {
            return Ok(None);
        };
        row.submitted_at = Some(now);
        row.updated_at = now;
        row.raw_score = raw_score;
        row.band = band;
        Ok(Some(row.clone()))
    }

    async fn grade_submission(
        &self,
        id: i64,
        band: Band,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>> {
        let mut tables = self.lock();
        let Some(row) = tables
            .submissions
            .iter_mut()
            .find(|s| s.id == id && s.is_submitted())
        else {
            return Ok(None);
        };
        row.band = Some(band);
        row.updated_at = now;
        Ok(Some(row.clone()))
    }

    async fn find_submission(&self, id: i64) -> StoreResult<Option<Submission>> {
        Ok(self.lock().submissions.iter().find(|s| s.id == id).cloned())
    }

    async fn list_submissions(&self, assignment_id: i64) -> StoreResult<Vec<Submission>> {
        Ok(self
            .lock()
            .submissions
            .iter()
            .filter(|s| s.assignment_id == assignment_id)
            .cloned()
            .collect())
    }

    async fn find_result(&self, assignment_id: i64) -> StoreResult<Option<ExamResult>> {
        Ok(self
            .lock()
            .results
            .iter()
            .find(|r| r.assignment_id == assignment_id)
            .cloned())
    }
}
