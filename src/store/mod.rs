// src/store/mod.rs

//! Persistence seams.
//!
//! Every coordination guarantee (one row per assignment and module, one
//! ACTIVE assignment per student and test, single-winner status transitions)
//! is provided by the store itself, so handlers never hold locks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    assignment::{Assignment, AssignmentFilter, NewAssignment},
    band::Band,
    mock_test::{MockTest, NewTest, TestChanges},
    module::{ModuleChanges, NewModule, TestModule},
    result::ExamResult,
    submission::{Submission, UpsertSubmission},
};

#[cfg(test)]
pub mod memory;
pub mod postgres;

pub use postgres::PgStore;

pub type StoreResult<T> = Result<T, sqlx::Error>;

/// Tests and their modules.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn create_test(&self, test: NewTest) -> StoreResult<MockTest>;
    async fn list_tests(&self, published_only: bool) -> StoreResult<Vec<MockTest>>;
    async fn find_test(&self, id: i64) -> StoreResult<Option<MockTest>>;
    async fn update_test(&self, id: i64, changes: TestChanges) -> StoreResult<Option<MockTest>>;
    async fn delete_test(&self, id: i64) -> StoreResult<bool>;

    async fn create_module(&self, module: NewModule) -> StoreResult<TestModule>;
    /// Modules of a test ordered by position.
    async fn list_modules(&self, test_id: i64) -> StoreResult<Vec<TestModule>>;
    async fn find_module(&self, id: i64) -> StoreResult<Option<TestModule>>;
    async fn update_module(
        &self,
        id: i64,
        changes: ModuleChanges,
    ) -> StoreResult<Option<TestModule>>;
    async fn delete_module(&self, id: i64) -> StoreResult<bool>;
}

/// Assignment rows and their status transitions.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    /// Returns `None` when the row conflicts with an existing ACTIVE
    /// assignment for the same student and test (or a token collision).
    async fn insert_assignment(&self, new: NewAssignment) -> StoreResult<Option<Assignment>>;
    async fn find_assignment(&self, id: i64) -> StoreResult<Option<Assignment>>;
    async fn find_assignment_by_token(&self, token: &str) -> StoreResult<Option<Assignment>>;
    async fn find_active_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> StoreResult<Option<Assignment>>;
    async fn list_assignments(&self, filter: &AssignmentFilter) -> StoreResult<Vec<Assignment>>;
    async fn count_assignments_for_test(&self, test_id: i64) -> StoreResult<i64>;

    /// ACTIVE -> COMPLETED together with the result row. `None` if the
    /// assignment was no longer ACTIVE.
    async fn complete_assignment(
        &self,
        result: ExamResult,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Assignment>>;
    /// ACTIVE -> EXPIRED for one row. `None` if it was no longer ACTIVE or
    /// all its modules are handed in and only wait for grading.
    async fn expire_assignment(&self, id: i64, now: DateTime<Utc>)
    -> StoreResult<Option<Assignment>>;
    /// ACTIVE -> EXPIRED for every row past its window, except those whose
    /// modules are all handed in and only wait for grading.
    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<u64>;
}

/// Submissions and results.
#[async_trait]
pub trait SubmissionStore: Send + Sync {
    /// Create-or-overwrite keyed by (assignment, module). `None` when the
    /// assignment is not ACTIVE and in window at `now`, or the module was
    /// already submitted.
    async fn upsert_submission(&self, upsert: UpsertSubmission) -> StoreResult<Option<Submission>>;
    /// Freezes the submission and records its auto score, if any.
    async fn finalize_submission(
        &self,
        id: i64,
        raw_score: Option<i32>,
        band: Option<Band>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>>;
    /// Sets the band of an already submitted row.
    async fn grade_submission(
        &self,
        id: i64,
        band: Band,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>>;
    async fn find_submission(&self, id: i64) -> StoreResult<Option<Submission>>;
    async fn list_submissions(&self, assignment_id: i64) -> StoreResult<Vec<Submission>>;
    async fn find_result(&self, assignment_id: i64) -> StoreResult<Option<ExamResult>>;
}

/// Everything the service needs from persistence.
pub trait Store: CatalogStore + AssignmentStore + SubmissionStore {}

impl<T> Store for T where T: CatalogStore + AssignmentStore + SubmissionStore {}
