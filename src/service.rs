use std::sync::Arc;

use tracing::{debug, info};
use uuid::Uuid;

use crate::context::{self, StudentContext};
use crate::error::{PlannerError, Result};
use crate::events::ViewInvalidator;
use crate::models::{
    CourseStatus, EnrollmentFilter, EnrollmentSubmission, Identity, MetricsUpdate, Schedule,
    StudentProfile,
};
use crate::reconcile;
use crate::schedule;
use crate::store::{EnrollmentStore, IdentityResolver};

/// Enrollment operations over a store, one call per request.
pub struct Planner<S> {
    store: Arc<S>,
    invalidator: ViewInvalidator,
}

impl<S> Clone for Planner<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            invalidator: self.invalidator.clone(),
        }
    }
}

fn require(identity: Option<&Identity>) -> Result<&Identity> {
    identity.ok_or(PlannerError::Unauthorized)
}

fn require_course(course_id: Option<Uuid>) -> Result<Uuid> {
    course_id.ok_or_else(|| PlannerError::Validation("missing courseId".to_string()))
}

impl<S: EnrollmentStore + IdentityResolver> Planner<S> {
    pub fn new(store: Arc<S>, invalidator: ViewInvalidator) -> Self {
        Self { store, invalidator }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn invalidator(&self) -> &ViewInvalidator {
        &self.invalidator
    }

    pub async fn authenticate(&self, token: Option<&str>) -> Result<Option<Identity>> {
        match token {
            Some(token) => self.store.resolve(token).await,
            None => Ok(None),
        }
    }

    async fn student(&self, identity: &Identity) -> Result<StudentProfile> {
        self.store
            .find_student(identity.student_id)
            .await?
            .ok_or_else(|| PlannerError::NotFound("student not found".to_string()))
    }

    pub async fn submit_enrollment(
        &self,
        identity: Option<&Identity>,
        submission: &EnrollmentSubmission,
    ) -> Result<()> {
        let identity = require(identity)?;
        let valid = reconcile::validate_submission(submission)?;
        let student = self.student(identity).await?;
        if !self.store.course_exists(valid.course_id).await? {
            return Err(PlannerError::NotFound(format!("course {}", valid.course_id)));
        }

        let record = reconcile::build_record(student.id, valid, student.grade_level);
        self.store.upsert_enrollment(&record).await?;
        info!(
            student_id = %record.student_id,
            course_id = %record.course_id,
            status = %record.status,
            grade_level = ?record.grade_level,
            "enrollment saved"
        );

        self.invalidator.invalidate(student.id);
        Ok(())
    }

    /// `Ok(None)` covers both "not signed in" and "nothing placed yet".
    pub async fn project_schedule(&self, identity: Option<&Identity>) -> Result<Option<Schedule>> {
        let Some(identity) = identity else {
            return Ok(None);
        };

        let placed = self
            .store
            .find_enrollments(
                identity.student_id,
                EnrollmentFilter {
                    status: None,
                    placed_only: true,
                },
            )
            .await?;
        debug!(student_id = %identity.student_id, placed = placed.len(), "projecting schedule");

        Ok(schedule::project(&placed))
    }

    pub async fn update_metrics(
        &self,
        identity: Option<&Identity>,
        course_id: Option<Uuid>,
        update: &MetricsUpdate,
    ) -> Result<()> {
        let identity = require(identity)?;
        let course_id = require_course(course_id)?;

        let Some(patch) = reconcile::metrics_patch(update) else {
            debug!(%course_id, "metrics update without fields skipped");
            return Ok(());
        };

        if !self
            .store
            .update_metrics(identity.student_id, course_id, &patch)
            .await?
        {
            return Err(PlannerError::NotFound(format!("enrollment for course {course_id}")));
        }

        self.invalidator.invalidate(identity.student_id);
        Ok(())
    }

    pub async fn update_grade(
        &self,
        identity: Option<&Identity>,
        course_id: Option<Uuid>,
        grade: Option<&str>,
    ) -> Result<()> {
        let identity = require(identity)?;
        let course_id = require_course(course_id)?;
        let grade = reconcile::non_blank(grade).map(str::trim);

        if !self
            .store
            .update_grade(identity.student_id, course_id, grade)
            .await?
        {
            return Err(PlannerError::NotFound(format!("enrollment for course {course_id}")));
        }

        self.invalidator.invalidate(identity.student_id);
        Ok(())
    }

    pub async fn delete_enrollment(&self, identity: Option<&Identity>, course_id: Uuid) -> Result<()> {
        let identity = require(identity)?;

        if !self
            .store
            .delete_enrollment(identity.student_id, course_id)
            .await?
        {
            return Err(PlannerError::NotFound(format!("enrollment for course {course_id}")));
        }
        info!(student_id = %identity.student_id, %course_id, "enrollment deleted");

        self.invalidator.invalidate(identity.student_id);
        Ok(())
    }

    pub async fn clear_planned(&self, identity: Option<&Identity>) -> Result<u64> {
        let identity = require(identity)?;
        let deleted = self
            .store
            .delete_enrollments(identity.student_id, Some(CourseStatus::Planned))
            .await?;
        info!(student_id = %identity.student_id, deleted, "planned courses cleared");

        self.invalidator.invalidate(identity.student_id);
        Ok(deleted)
    }

    pub async fn student_context(&self, identity: Option<&Identity>) -> Result<StudentContext> {
        let identity = require(identity)?;
        let student = self.student(identity).await?;
        let enrollments = self
            .store
            .find_enrollments(student.id, EnrollmentFilter::default())
            .await?;

        Ok(context::build(&student, &enrollments))
    }
}
