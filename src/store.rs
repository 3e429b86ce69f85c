use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    CourseStatus, EnrollmentFilter, EnrollmentRecord, EnrollmentView, Identity, MetricsPatch,
    StudentProfile,
};

/// Keyed access to enrollment rows and the student profile they hang off.
///
/// Writes that target a single row report `false` when no row matched.
#[async_trait]
pub trait EnrollmentStore: Send + Sync {
    async fn find_student(&self, student_id: Uuid) -> Result<Option<StudentProfile>>;

    async fn course_exists(&self, course_id: Uuid) -> Result<bool>;

    /// Inserts or overwrites the row keyed by (student_id, course_id).
    async fn upsert_enrollment(&self, record: &EnrollmentRecord) -> Result<()>;

    /// Rows for one student in insertion order.
    async fn find_enrollments(
        &self,
        student_id: Uuid,
        filter: EnrollmentFilter,
    ) -> Result<Vec<EnrollmentView>>;

    async fn update_grade(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        grade: Option<&str>,
    ) -> Result<bool>;

    async fn update_metrics(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        patch: &MetricsPatch,
    ) -> Result<bool>;

    async fn delete_enrollment(&self, student_id: Uuid, course_id: Uuid) -> Result<bool>;

    /// Deletes every row of the student, or only rows with `status` when given.
    async fn delete_enrollments(
        &self,
        student_id: Uuid,
        status: Option<CourseStatus>,
    ) -> Result<u64>;
}

/// Maps an opaque session token to the caller. Never mints tokens.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>>;
}
