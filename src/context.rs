//! Student context handed to the completion service.
//!
//! Past courses are locked into `history` by their effective grade level so
//! generated plans never move them; planned courses stay editable.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::{CourseStatus, EnrollmentView, GradeKey, MetricLevel, StudentProfile};
use crate::reconcile::effective_grade_level;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscriptEntry {
    pub course_name: String,
    pub grade: Option<String>,
    pub confidence: String,
    pub stress: String,
    pub status: CourseStatus,
    pub level: Option<String>,
    pub credits: f64,
    pub code: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grade_level: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlannedCourse {
    pub course_name: String,
    pub grade_level: Option<i32>,
    pub level: Option<String>,
    pub credits: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentContext {
    pub name: String,
    pub grade: Option<i32>,
    pub completed_courses: Vec<String>,
    pub history: BTreeMap<GradeKey, Vec<String>>,
    pub transcript: Vec<TranscriptEntry>,
    pub planned_courses: Vec<PlannedCourse>,
}

pub fn build(student: &StudentProfile, enrollments: &[EnrollmentView]) -> StudentContext {
    let neutral = MetricLevel::Neutral.as_str();
    let mut context = StudentContext {
        name: student.full_name.clone(),
        grade: student.grade_level,
        completed_courses: Vec::new(),
        history: BTreeMap::new(),
        transcript: Vec::new(),
        planned_courses: Vec::new(),
    };

    for EnrollmentView { record, course } in enrollments {
        if record.status == CourseStatus::Planned {
            context.planned_courses.push(PlannedCourse {
                course_name: course.name.clone(),
                grade_level: record.grade_level,
                level: course.level.clone(),
                credits: course.credits.unwrap_or_default(),
            });
            continue;
        }

        let grade_level = effective_grade_level(record);
        context.completed_courses.push(course.name.clone());
        context
            .history
            .entry(GradeKey::from(grade_level))
            .or_default()
            .push(course.name.clone());
        context.transcript.push(TranscriptEntry {
            course_name: course.name.clone(),
            grade: record.grade.clone(),
            confidence: record
                .confidence_level
                .clone()
                .unwrap_or_else(|| neutral.to_string()),
            stress: record
                .stress_level
                .clone()
                .unwrap_or_else(|| neutral.to_string()),
            status: record.status,
            level: course.level.clone(),
            credits: course.credits.unwrap_or_default(),
            code: course.code.clone().unwrap_or_default(),
            grade_level,
        });
    }

    context
}
