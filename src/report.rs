use std::fmt::Write;

use chrono::NaiveDate;

use crate::models::{CourseStatus, EnrollmentView, Schedule, StudentProfile};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusSummary {
    pub status: CourseStatus,
    pub count: usize,
}

/// Counts per status, in lifecycle order, skipping statuses with no courses.
pub fn summarize_by_status(enrollments: &[EnrollmentView]) -> Vec<StatusSummary> {
    CourseStatus::ALL
        .into_iter()
        .map(|status| StatusSummary {
            status,
            count: enrollments
                .iter()
                .filter(|e| e.record.status == status)
                .count(),
        })
        .filter(|summary| summary.count > 0)
        .collect()
}

pub fn build_report(
    student: &StudentProfile,
    generated_on: NaiveDate,
    schedule: Option<&Schedule>,
    enrollments: &[EnrollmentView],
) -> String {
    let summaries = summarize_by_status(enrollments);
    let mut output = String::new();

    let _ = writeln!(output, "# Four-Year Plan: {}", student.full_name);
    let grade_label = student
        .grade_level
        .map_or_else(|| "grade not on file".to_string(), |g| format!("grade {g}"));
    let _ = writeln!(
        output,
        "Generated for {} ({}) on {}",
        student.email, grade_label, generated_on
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "## Status Mix");

    if summaries.is_empty() {
        let _ = writeln!(output, "No courses recorded yet.");
    } else {
        for summary in &summaries {
            let _ = writeln!(output, "- {}: {} courses", summary.status, summary.count);
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Schedule");

    match schedule {
        None => {
            let _ = writeln!(output, "No courses placed on the timeline yet.");
        }
        Some(schedule) => {
            for (grade, courses) in &schedule.0 {
                let _ = writeln!(output);
                let _ = writeln!(output, "### Grade {grade}");
                for course in courses {
                    let _ = writeln!(output, "- {} ({})", course.name, course.status);
                }
            }
        }
    }

    let unplaced: Vec<&EnrollmentView> = enrollments
        .iter()
        .filter(|e| e.record.grade_level.is_none())
        .collect();
    let _ = writeln!(output);
    let _ = writeln!(output, "## Unplaced Courses");

    if unplaced.is_empty() {
        let _ = writeln!(output, "Every course has a grade level.");
    } else {
        for enrollment in unplaced {
            let _ = writeln!(
                output,
                "- {} ({})",
                enrollment.course.name, enrollment.record.status
            );
        }
    }

    output
}
