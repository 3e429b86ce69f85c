use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use uuid::Uuid;

use crate::error::ParseTokenError;

/// Caller identity, resolved once per request from an opaque session token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Identity {
    pub student_id: Uuid,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CourseStatus {
    Completed,
    InProgress,
    NextSemester,
    #[default]
    Planned,
}

impl CourseStatus {
    pub const ALL: [CourseStatus; 4] = [
        CourseStatus::Completed,
        CourseStatus::InProgress,
        CourseStatus::NextSemester,
        CourseStatus::Planned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CourseStatus::Completed => "COMPLETED",
            CourseStatus::InProgress => "IN_PROGRESS",
            CourseStatus::NextSemester => "NEXT_SEMESTER",
            CourseStatus::Planned => "PLANNED",
        }
    }

    /// Statuses for which stress is tracked and the on-file grade level applies.
    pub fn is_current(self) -> bool {
        matches!(self, CourseStatus::InProgress | CourseStatus::NextSemester)
    }
}

impl fmt::Display for CourseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CourseStatus {
    type Err = ParseTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_uppercase().replace(['-', ' '], "_");
        CourseStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == normalized)
            .ok_or_else(|| ParseTokenError {
                kind: "course status",
                value: value.to_string(),
            })
    }
}

/// Five-point ordinal scale shared by confidence and stress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MetricLevel {
    VeryLow,
    Low,
    Neutral,
    High,
    VeryHigh,
}

impl MetricLevel {
    pub const SCALE: [MetricLevel; 5] = [
        MetricLevel::VeryLow,
        MetricLevel::Low,
        MetricLevel::Neutral,
        MetricLevel::High,
        MetricLevel::VeryHigh,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            MetricLevel::VeryLow => "VERY_LOW",
            MetricLevel::Low => "LOW",
            MetricLevel::Neutral => "NEUTRAL",
            MetricLevel::High => "HIGH",
            MetricLevel::VeryHigh => "VERY_HIGH",
        }
    }
}

impl fmt::Display for MetricLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricLevel {
    type Err = ParseTokenError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        MetricLevel::SCALE
            .into_iter()
            .find(|level| level.as_str() == value)
            .ok_or_else(|| ParseTokenError {
                kind: "metric level",
                value: value.to_string(),
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentProfile {
    pub id: Uuid,
    pub full_name: String,
    pub email: String,
    pub grade_level: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseSummary {
    pub id: Uuid,
    pub name: String,
    pub code: Option<String>,
    pub department: String,
    pub level: Option<String>,
    pub credits: Option<f64>,
}

/// Persisted row keyed by (student_id, course_id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentRecord {
    pub student_id: Uuid,
    pub course_id: Uuid,
    pub status: CourseStatus,
    pub grade: Option<String>,
    pub confidence_level: Option<String>,
    pub stress_level: Option<String>,
    pub grade_level: Option<i32>,
}

/// An enrollment joined with its course.
#[derive(Debug, Clone, PartialEq)]
pub struct EnrollmentView {
    pub record: EnrollmentRecord,
    pub course: CourseSummary,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentSubmission {
    #[serde(default)]
    pub course_id: Option<Uuid>,
    pub status: CourseStatus,
    #[serde(default)]
    pub grade: Option<String>,
    #[serde(default)]
    pub confidence: Option<String>,
    #[serde(default)]
    pub stress: Option<String>,
}

/// One side of a partial metrics update.
///
/// A missing JSON field is `Keep`; an empty string or `null` is `Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetricChange {
    #[default]
    Keep,
    Clear,
    Set(MetricLevel),
}

impl<'de> Deserialize<'de> for MetricChange {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Option::<String>::deserialize(deserializer)?;
        match raw.as_deref().map(str::trim) {
            None | Some("") => Ok(MetricChange::Clear),
            Some(token) => token
                .parse::<MetricLevel>()
                .map(MetricChange::Set)
                .map_err(serde::de::Error::custom),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsUpdate {
    #[serde(default)]
    pub confidence: MetricChange,
    #[serde(default)]
    pub stress: MetricChange,
}

/// Column writes produced from a `MetricsUpdate`; `None` leaves the column alone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricsPatch {
    pub confidence_level: Option<Option<String>>,
    pub stress_level: Option<Option<String>>,
}

/// Filter for `EnrollmentStore::find_enrollments`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EnrollmentFilter {
    pub status: Option<CourseStatus>,
    /// Only records with a grade level assigned.
    pub placed_only: bool,
}

/// Key of a schedule bucket: a grade level, or unassigned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum GradeKey {
    Level(i32),
    Unassigned,
}

impl From<Option<i32>> for GradeKey {
    fn from(level: Option<i32>) -> Self {
        level.map_or(GradeKey::Unassigned, GradeKey::Level)
    }
}

impl fmt::Display for GradeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GradeKey::Level(level) => write!(f, "{level}"),
            GradeKey::Unassigned => f.write_str("Unassigned"),
        }
    }
}

impl Serialize for GradeKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduledCourse {
    pub name: String,
    pub status: CourseStatus,
}

/// Enrollments grouped by grade bucket, in retrieval order within each bucket.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schedule(pub BTreeMap<GradeKey, Vec<ScheduledCourse>>);

impl Schedule {
    pub fn bucket(&self, key: GradeKey) -> Option<&[ScheduledCourse]> {
        self.0.get(&key).map(Vec::as_slice)
    }
}
