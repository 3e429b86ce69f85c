use uuid::Uuid;

use crate::error::{PlannerError, Result};
use crate::models::{
    CourseStatus, EnrollmentRecord, EnrollmentSubmission, MetricChange, MetricsPatch,
    MetricsUpdate,
};

/// Confidence token that completed middle-school courses carry in place of a number.
pub const MIDDLE_SCHOOL_TOKEN: &str = "middle";
pub const MIDDLE_SCHOOL_GRADE_LEVEL: i32 = 8;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedFields {
    pub grade_level: Option<i32>,
    pub stress_level: Option<String>,
}

/// A submission that passed the status-specific field checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidSubmission {
    pub course_id: Uuid,
    pub status: CourseStatus,
    pub grade: Option<String>,
    pub confidence: Option<String>,
    pub stress: Option<String>,
}

pub fn non_blank(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

pub fn validate_submission(submission: &EnrollmentSubmission) -> Result<ValidSubmission> {
    let course_id = submission
        .course_id
        .ok_or_else(|| PlannerError::Validation("missing courseId".to_string()))?;

    let grade = non_blank(submission.grade.as_deref()).map(str::to_string);
    let confidence = non_blank(submission.confidence.as_deref()).map(str::to_string);
    let stress = non_blank(submission.stress.as_deref()).map(str::to_string);

    match submission.status {
        CourseStatus::Completed => {
            if grade.is_none() {
                return Err(PlannerError::Validation(
                    "grade is required for completed courses".to_string(),
                ));
            }
            if confidence.is_none() {
                return Err(PlannerError::Validation(
                    "completed grade level is required".to_string(),
                ));
            }
        }
        CourseStatus::InProgress if grade.is_none() => {
            return Err(PlannerError::Validation(
                "grade is required for in-progress courses".to_string(),
            ));
        }
        _ => {}
    }

    Ok(ValidSubmission {
        course_id,
        status: submission.status,
        grade,
        confidence,
        stress,
    })
}

/// Reads a grade level out of a confidence token.
///
/// Only the exact token `"middle"` maps to grade 8. Otherwise the leading
/// digits are parsed after trimming, so `"11"` and `"9th"` both resolve;
/// anything else yields `None`.
pub fn infer_grade_level(token: &str) -> Option<i32> {
    if token == MIDDLE_SCHOOL_TOKEN {
        return Some(MIDDLE_SCHOOL_GRADE_LEVEL);
    }

    let token = token.trim();
    let end = token
        .char_indices()
        .find(|(idx, ch)| !(ch.is_ascii_digit() || (*idx == 0 && (*ch == '-' || *ch == '+'))))
        .map_or(token.len(), |(idx, _)| idx);
    token[..end].parse::<i32>().ok()
}

/// Applies the status-dependent rules for grade level and stress.
pub fn derive_fields(
    status: CourseStatus,
    confidence: Option<&str>,
    stress: Option<&str>,
    current_grade_level: Option<i32>,
) -> DerivedFields {
    let grade_level = match (status, non_blank(confidence)) {
        (CourseStatus::Completed, Some(token)) => infer_grade_level(token),
        (status, _) if status.is_current() => current_grade_level,
        _ => None,
    };

    let stress_level = if status.is_current() {
        non_blank(stress).map(str::to_string)
    } else {
        None
    };

    DerivedFields {
        grade_level,
        stress_level,
    }
}

pub fn build_record(
    student_id: Uuid,
    submission: ValidSubmission,
    current_grade_level: Option<i32>,
) -> EnrollmentRecord {
    let derived = derive_fields(
        submission.status,
        submission.confidence.as_deref(),
        submission.stress.as_deref(),
        current_grade_level,
    );

    EnrollmentRecord {
        student_id,
        course_id: submission.course_id,
        status: submission.status,
        grade: submission.grade,
        confidence_level: submission.confidence,
        stress_level: derived.stress_level,
        grade_level: derived.grade_level,
    }
}

/// Turns a partial metrics update into column writes, or `None` when nothing changes.
pub fn metrics_patch(update: &MetricsUpdate) -> Option<MetricsPatch> {
    fn column(change: MetricChange) -> Option<Option<String>> {
        match change {
            MetricChange::Keep => None,
            MetricChange::Clear => Some(None),
            MetricChange::Set(level) => Some(Some(level.as_str().to_string())),
        }
    }

    let patch = MetricsPatch {
        confidence_level: column(update.confidence),
        stress_level: column(update.stress),
    };

    if patch.confidence_level.is_none() && patch.stress_level.is_none() {
        None
    } else {
        Some(patch)
    }
}

/// Grade level used for display and context: stored value, else inferred from confidence.
pub fn effective_grade_level(record: &EnrollmentRecord) -> Option<i32> {
    record
        .grade_level
        .or_else(|| non_blank(record.confidence_level.as_deref()).and_then(infer_grade_level))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MetricLevel;

    fn submission(status: CourseStatus) -> EnrollmentSubmission {
        EnrollmentSubmission {
            course_id: Some(Uuid::new_v4()),
            status,
            grade: Some("A".to_string()),
            confidence: Some("10".to_string()),
            stress: Some("HIGH".to_string()),
        }
    }

    #[test]
    fn middle_token_maps_to_grade_eight() {
        let derived = derive_fields(CourseStatus::Completed, Some("middle"), None, Some(11));
        assert_eq!(derived.grade_level, Some(8));
    }

    #[test]
    fn padded_or_recased_middle_is_not_grade_eight() {
        assert_eq!(infer_grade_level(" middle "), None);
        assert_eq!(infer_grade_level("Middle"), None);
        let derived = derive_fields(CourseStatus::Completed, Some(" middle"), None, Some(11));
        assert_eq!(derived.grade_level, None);
    }

    #[test]
    fn numeric_confidence_sets_completed_grade_level() {
        let derived = derive_fields(CourseStatus::Completed, Some("11"), None, None);
        assert_eq!(derived.grade_level, Some(11));
        assert_eq!(infer_grade_level(" 9th "), Some(9));
    }

    #[test]
    fn unparsable_confidence_leaves_grade_level_empty() {
        let derived = derive_fields(CourseStatus::Completed, Some("invalid"), None, Some(10));
        assert_eq!(derived.grade_level, None);
        assert_eq!(infer_grade_level("HIGH"), None);
        assert_eq!(infer_grade_level("-"), None);
    }

    #[test]
    fn current_courses_use_on_file_grade_level() {
        let in_progress = derive_fields(CourseStatus::InProgress, None, Some("LOW"), Some(10));
        assert_eq!(in_progress.grade_level, Some(10));
        assert_eq!(in_progress.stress_level.as_deref(), Some("LOW"));

        let next = derive_fields(CourseStatus::NextSemester, Some("HIGH"), None, None);
        assert_eq!(next.grade_level, None);
    }

    #[test]
    fn stress_is_dropped_for_completed_and_planned() {
        for status in [CourseStatus::Completed, CourseStatus::Planned] {
            let derived = derive_fields(status, Some("9"), Some("VERY_HIGH"), Some(9));
            assert_eq!(derived.stress_level, None, "{status}");
        }
        let planned = derive_fields(CourseStatus::Planned, Some("9"), None, Some(9));
        assert_eq!(planned.grade_level, None);
    }

    #[test]
    fn completed_requires_grade_and_confidence() {
        let mut missing_grade = submission(CourseStatus::Completed);
        missing_grade.grade = Some("  ".to_string());
        assert!(matches!(
            validate_submission(&missing_grade),
            Err(PlannerError::Validation(_))
        ));

        let mut missing_confidence = submission(CourseStatus::Completed);
        missing_confidence.confidence = None;
        assert!(matches!(
            validate_submission(&missing_confidence),
            Err(PlannerError::Validation(_))
        ));
    }

    #[test]
    fn in_progress_requires_grade_but_planned_does_not() {
        let mut in_progress = submission(CourseStatus::InProgress);
        in_progress.grade = None;
        assert!(validate_submission(&in_progress).is_err());

        let mut planned = submission(CourseStatus::Planned);
        planned.grade = None;
        planned.confidence = None;
        assert!(validate_submission(&planned).is_ok());
    }

    #[test]
    fn missing_course_id_is_rejected() {
        let mut input = submission(CourseStatus::Planned);
        input.course_id = None;
        let err = validate_submission(&input).unwrap_err();
        assert!(err.to_string().contains("courseId"));
    }

    #[test]
    fn build_record_nulls_planned_stress() {
        let student_id = Uuid::new_v4();
        let valid = validate_submission(&submission(CourseStatus::Planned)).unwrap();
        let record = build_record(student_id, valid, Some(10));
        assert_eq!(record.stress_level, None);
        assert_eq!(record.grade_level, None);
        assert_eq!(record.confidence_level.as_deref(), Some("10"));
    }

    #[test]
    fn metrics_patch_only_touches_present_fields() {
        let stress_only = MetricsUpdate {
            confidence: MetricChange::Keep,
            stress: MetricChange::Set(MetricLevel::High),
        };
        let patch = metrics_patch(&stress_only).unwrap();
        assert_eq!(patch.confidence_level, None);
        assert_eq!(patch.stress_level, Some(Some("HIGH".to_string())));

        let cleared = MetricsUpdate {
            confidence: MetricChange::Clear,
            stress: MetricChange::Keep,
        };
        assert_eq!(metrics_patch(&cleared).unwrap().confidence_level, Some(None));

        assert_eq!(metrics_patch(&MetricsUpdate::default()), None);
    }

    #[test]
    fn effective_grade_level_falls_back_to_confidence() {
        let record = EnrollmentRecord {
            student_id: Uuid::new_v4(),
            course_id: Uuid::new_v4(),
            status: CourseStatus::Completed,
            grade: Some("B".to_string()),
            confidence_level: Some("middle".to_string()),
            stress_level: None,
            grade_level: None,
        };
        assert_eq!(effective_grade_level(&record), Some(8));
    }
}
