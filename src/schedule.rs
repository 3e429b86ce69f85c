use std::collections::BTreeMap;

use crate::models::{EnrollmentView, GradeKey, Schedule, ScheduledCourse};

/// Groups enrollments into grade buckets, keeping retrieval order inside each bucket.
///
/// Returns `None` when nothing could be placed, which callers treat as
/// "no schedule yet" rather than an empty plan.
pub fn project(enrollments: &[EnrollmentView]) -> Option<Schedule> {
    let mut buckets: BTreeMap<GradeKey, Vec<ScheduledCourse>> = BTreeMap::new();

    for enrollment in enrollments {
        buckets
            .entry(GradeKey::from(enrollment.record.grade_level))
            .or_default()
            .push(ScheduledCourse {
                name: enrollment.course.name.clone(),
                status: enrollment.record.status,
            });
    }

    if buckets.is_empty() {
        None
    } else {
        Some(Schedule(buckets))
    }
}
