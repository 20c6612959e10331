// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder, types::Json};

use crate::models::{
    assignment::{Assignment, AssignmentFilter, AssignmentStatus, NewAssignment},
    band::Band,
    mock_test::{MockTest, NewTest, TestChanges},
    module::{ModuleChanges, NewModule, TestModule},
    result::ExamResult,
    submission::{Submission, UpsertSubmission},
};
use crate::store::{AssignmentStore, CatalogStore, StoreResult, SubmissionStore};

const TEST_COLUMNS: &str = "id, title, description, published, created_at, updated_at";

const MODULE_COLUMNS: &str =
    "id, test_id, kind, title, position, duration_minutes, answer_key, created_at";

const ASSIGNMENT_COLUMNS: &str = "\
    id, student_id, test_id, token, valid_from, valid_until, status, created_at, updated_at";

const SUBMISSION_COLUMNS: &str = "\
    id, assignment_id, module_id, answers, time_spent_secs, started_at, updated_at, \
    submitted_at, raw_score, band";

const RESULT_COLUMNS: &str = "assignment_id, module_bands, overall_band, created_at";

/// True for an assignment `a` with at least one module not handed in yet.
/// Assignments failing it only wait for grading and are never expired.
const UNSUBMITTED_MODULE: &str = "\
    SELECT 1 FROM test_modules m \
    WHERE m.test_id = a.test_id \
      AND NOT EXISTS ( \
          SELECT 1 FROM submissions s \
          WHERE s.assignment_id = a.id \
            AND s.module_id = m.id \
            AND s.submitted_at IS NOT NULL)";

/// PostgreSQL-backed store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for PgStore {
    async fn create_test(&self, test: NewTest) -> StoreResult<MockTest> {
        sqlx::query_as::<_, MockTest>(&format!(
            "INSERT INTO mock_tests (title, description, published) \
             VALUES ($1, $2, $3) RETURNING {TEST_COLUMNS}"
        ))
        .bind(test.title)
        .bind(test.description)
        .bind(test.published)
        .fetch_one(&self.pool)
        .await
    }

    async fn list_tests(&self, published_only: bool) -> StoreResult<Vec<MockTest>> {
        sqlx::query_as::<_, MockTest>(&format!(
            "SELECT {TEST_COLUMNS} FROM mock_tests \
             WHERE published OR NOT $1 ORDER BY id DESC"
        ))
        .bind(published_only)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_test(&self, id: i64) -> StoreResult<Option<MockTest>> {
        sqlx::query_as::<_, MockTest>(&format!("SELECT {TEST_COLUMNS} FROM mock_tests WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
    }

    async fn update_test(&self, id: i64, changes: TestChanges) -> StoreResult<Option<MockTest>> {
        sqlx::query_as::<_, MockTest>(&format!(
            "UPDATE mock_tests SET \
                title = COALESCE($2, title), \
                description = CASE WHEN $3::text IS NULL THEN description ELSE NULLIF($3, '') END, \
                published = COALESCE($4, published), \
                updated_at = NOW() \
             WHERE id = $1 RETURNING {TEST_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.description)
        .bind(changes.published)
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_test(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM mock_tests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn create_module(&self, module: NewModule) -> StoreResult<TestModule> {
        sqlx::query_as::<_, TestModule>(&format!(
            "INSERT INTO test_modules (test_id, kind, title, position, duration_minutes, answer_key) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING {MODULE_COLUMNS}"
        ))
        .bind(module.test_id)
        .bind(module.kind)
        .bind(module.title)
        .bind(module.position)
        .bind(module.duration_minutes)
        .bind(Json(module.answer_key))
        .fetch_one(&self.pool)
        .await
    }

    async fn list_modules(&self, test_id: i64) -> StoreResult<Vec<TestModule>> {
        sqlx::query_as::<_, TestModule>(&format!(
            "SELECT {MODULE_COLUMNS} FROM test_modules WHERE test_id = $1 ORDER BY position, id"
        ))
        .bind(test_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_module(&self, id: i64) -> StoreResult<Option<TestModule>> {
        sqlx::query_as::<_, TestModule>(&format!(
            "SELECT {MODULE_COLUMNS} FROM test_modules WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn update_module(
        &self,
        id: i64,
        changes: ModuleChanges,
    ) -> StoreResult<Option<TestModule>> {
        sqlx::query_as::<_, TestModule>(&format!(
            "UPDATE test_modules SET \
                title = COALESCE($2, title), \
                position = COALESCE($3, position), \
                duration_minutes = COALESCE($4, duration_minutes), \
                answer_key = COALESCE($5, answer_key) \
             WHERE id = $1 RETURNING {MODULE_COLUMNS}"
        ))
        .bind(id)
        .bind(changes.title)
        .bind(changes.position)
        .bind(changes.duration_minutes)
        .bind(changes.answer_key.map(Json))
        .fetch_optional(&self.pool)
        .await
    }

    async fn delete_module(&self, id: i64) -> StoreResult<bool> {
        let result = sqlx::query("DELETE FROM test_modules WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl AssignmentStore for PgStore {
    async fn insert_assignment(&self, new: NewAssignment) -> StoreResult<Option<Assignment>> {
        // The partial unique index on (student_id, test_id) WHERE status = 'ACTIVE'
        // turns a concurrent duplicate start into "no row".
        sqlx::query_as::<_, Assignment>(&format!(
            "INSERT INTO assignments ( \
                student_id, test_id, token, valid_from, valid_until, status, created_at, updated_at \
             ) VALUES ($1, $2, $3, $4, $5, $6, $4, $4) \
             ON CONFLICT DO NOTHING \
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(new.student_id)
        .bind(new.test_id)
        .bind(new.token)
        .bind(new.valid_from)
        .bind(new.valid_until)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_assignment(&self, id: i64) -> StoreResult<Option<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_assignment_by_token(&self, token: &str) -> StoreResult<Option<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE token = $1"
        ))
        .bind(token)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_active_assignment(
        &self,
        student_id: i64,
        test_id: i64,
    ) -> StoreResult<Option<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments \
             WHERE student_id = $1 AND test_id = $2 AND status = $3"
        ))
        .bind(student_id)
        .bind(test_id)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_assignments(&self, filter: &AssignmentFilter) -> StoreResult<Vec<Assignment>> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {ASSIGNMENT_COLUMNS} FROM assignments WHERE TRUE"
        ));

        if let Some(status) = filter.status {
            builder.push(" AND status = ");
            builder.push_bind(status);
        }
        if let Some(student_id) = filter.student_id {
            builder.push(" AND student_id = ");
            builder.push_bind(student_id);
        }
        if let Some(test_id) = filter.test_id {
            builder.push(" AND test_id = ");
            builder.push_bind(test_id);
        }

        builder.push(" ORDER BY created_at DESC, id DESC LIMIT 500");

        builder.build_query_as::<Assignment>().fetch_all(&self.pool).await
    }

    async fn count_assignments_for_test(&self, test_id: i64) -> StoreResult<i64> {
        sqlx::query_scalar("SELECT COUNT(*) FROM assignments WHERE test_id = $1")
            .bind(test_id)
            .fetch_one(&self.pool)
            .await
    }

    async fn complete_assignment(
        &self,
        result: ExamResult,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Assignment>> {
        let mut tx = self.pool.begin().await?;

        let completed = sqlx::query_as::<_, Assignment>(&format!(
            "UPDATE assignments SET status = $1, updated_at = $2 \
             WHERE id = $3 AND status = $4 RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(AssignmentStatus::Completed)
        .bind(now)
        .bind(result.assignment_id)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(completed) = completed else {
            tx.rollback().await?;
            return Ok(None);
        };

        sqlx::query(
            "INSERT INTO exam_results (assignment_id, module_bands, overall_band, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(result.assignment_id)
        .bind(result.module_bands)
        .bind(result.overall_band)
        .bind(result.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(Some(completed))
    }

    async fn expire_assignment(
        &self,
        id: i64,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Assignment>> {
        sqlx::query_as::<_, Assignment>(&format!(
            "UPDATE assignments a SET status = $1, updated_at = $2 \
             WHERE a.id = $3 AND a.status = $4 \
               AND EXISTS ({UNSUBMITTED_MODULE}) \
             RETURNING {ASSIGNMENT_COLUMNS}"
        ))
        .bind(AssignmentStatus::Expired)
        .bind(now)
        .bind(id)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn expire_overdue(&self, now: DateTime<Utc>) -> StoreResult<u64> {
        let result = sqlx::query(&format!(
            "UPDATE assignments a SET status = $1, updated_at = $2 \
             WHERE a.status = $3 AND a.valid_until < $2 \
               AND EXISTS ({UNSUBMITTED_MODULE})"
        ))
        .bind(AssignmentStatus::Expired)
        .bind(now)
        .bind(AssignmentStatus::Active)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl SubmissionStore for PgStore {
    async fn upsert_submission(&self, upsert: UpsertSubmission) -> StoreResult<Option<Submission>> {
        // Single statement: the unique (assignment_id, module_id) key serializes
        // concurrent autosaves, and the EXISTS guard re-checks the assignment so
        // nothing slips in after a sweep or completion.
        sqlx::query_as::<_, Submission>(&format!(
            "INSERT INTO submissions ( \
                assignment_id, module_id, answers, time_spent_secs, started_at, updated_at \
             ) \
             SELECT $1, $2, $3, $4, $5, $5 \
             WHERE EXISTS ( \
                 SELECT 1 FROM assignments \
                 WHERE id = $1 AND status = $6 AND valid_from <= $5 AND valid_until >= $5) \
             ON CONFLICT (assignment_id, module_id) DO UPDATE SET \
                answers = EXCLUDED.answers, \
                time_spent_secs = EXCLUDED.time_spent_secs, \
                updated_at = EXCLUDED.updated_at \
             WHERE submissions.submitted_at IS NULL \
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(upsert.assignment_id)
        .bind(upsert.module_id)
        .bind(Json(upsert.answers))
        .bind(upsert.time_spent_secs)
        .bind(upsert.now)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn finalize_submission(
        &self,
        id: i64,
        raw_score: Option<i32>,
        band: Option<Band>,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>> {
        sqlx::query_as::<_, Submission>(&format!(
            "UPDATE submissions s SET submitted_at = $2, updated_at = $2, raw_score = $3, band = $4 \
             WHERE s.id = $1 AND s.submitted_at IS NULL \
               AND EXISTS ( \
                   SELECT 1 FROM assignments a WHERE a.id = s.assignment_id AND a.status = $5) \
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(now)
        .bind(raw_score)
        .bind(band)
        .bind(AssignmentStatus::Active)
        .fetch_optional(&self.pool)
        .await
    }

    async fn grade_submission(
        &self,
        id: i64,
        band: Band,
        now: DateTime<Utc>,
    ) -> StoreResult<Option<Submission>> {
        sqlx::query_as::<_, Submission>(&format!(
            "UPDATE submissions SET band = $2, updated_at = $3 \
             WHERE id = $1 AND submitted_at IS NOT NULL RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(id)
        .bind(band)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
    }

    async fn find_submission(&self, id: i64) -> StoreResult<Option<Submission>> {
        sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
    }

    async fn list_submissions(&self, assignment_id: i64) -> StoreResult<Vec<Submission>> {
        sqlx::query_as::<_, Submission>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE assignment_id = $1 ORDER BY id"
        ))
        .bind(assignment_id)
        .fetch_all(&self.pool)
        .await
    }

    async fn find_result(&self, assignment_id: i64) -> StoreResult<Option<ExamResult>> {
        sqlx::query_as::<_, ExamResult>(&format!(
            "SELECT {RESULT_COLUMNS} FROM exam_results WHERE assignment_id = $1"
        ))
        .bind(assignment_id)
        .fetch_optional(&self.pool)
        .await
    }
}
