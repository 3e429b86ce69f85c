use anyhow::Context;
use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{PlannerError, Result};
use crate::models::{
    CourseStatus, CourseSummary, EnrollmentFilter, EnrollmentRecord, EnrollmentSubmission,
    EnrollmentView, Identity, MetricsPatch, StudentProfile,
};
use crate::service::Planner;
use crate::store::{EnrollmentStore, IdentityResolver};

pub async fn init_db(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// PostgreSQL-backed enrollment store.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn student_by_email(&self, email: &str) -> Result<Option<StudentProfile>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, grade_level FROM academic_planner.students WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| student_from_row(&row)))
    }

    pub async fn course_id_by_name(&self, name: &str) -> Result<Option<Uuid>> {
        let row = sqlx::query(
            "SELECT id FROM academic_planner.courses WHERE name = $1 OR code = $1",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| row.get("id")))
    }
}

fn student_from_row(row: &PgRow) -> StudentProfile {
    StudentProfile {
        id: row.get("id"),
        full_name: row.get("full_name"),
        email: row.get("email"),
        grade_level: row.get("grade_level"),
    }
}

fn enrollment_from_row(row: &PgRow) -> Result<EnrollmentView> {
    let status: String = row.get("status");
    let status = status
        .parse::<CourseStatus>()
        .map_err(|err| PlannerError::Database(sqlx::Error::Decode(Box::new(err))))?;
    let course_id: Uuid = row.get("course_id");

    Ok(EnrollmentView {
        record: EnrollmentRecord {
            student_id: row.get("student_id"),
            course_id,
            status,
            grade: row.get("grade"),
            confidence_level: row.get("confidence_level"),
            stress_level: row.get("stress_level"),
            grade_level: row.get("grade_level"),
        },
        course: CourseSummary {
            id: course_id,
            name: row.get("name"),
            code: row.get("code"),
            department: row.get("department"),
            level: row.get("level"),
            credits: row.get("credits"),
        },
    })
}

#[async_trait]
impl EnrollmentStore for PgStore {
    async fn find_student(&self, student_id: Uuid) -> Result<Option<StudentProfile>> {
        let row = sqlx::query(
            "SELECT id, full_name, email, grade_level FROM academic_planner.students WHERE id = $1",
        )
        .bind(student_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| student_from_row(&row)))
    }

    async fn course_exists(&self, course_id: Uuid) -> Result<bool> {
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM academic_planner.courses WHERE id = $1) AS found",
        )
        .bind(course_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("found"))
    }

    async fn upsert_enrollment(&self, record: &EnrollmentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO academic_planner.enrollments
            (student_id, course_id, status, grade, confidence_level, stress_level, grade_level)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ON CONFLICT (student_id, course_id) DO UPDATE
            SET status = EXCLUDED.status,
                grade = EXCLUDED.grade,
                confidence_level = EXCLUDED.confidence_level,
                stress_level = EXCLUDED.stress_level,
                grade_level = EXCLUDED.grade_level,
                updated_at = now()
            "#,
        )
        .bind(record.student_id)
        .bind(record.course_id)
        .bind(record.status.as_str())
        .bind(record.grade.as_deref())
        .bind(record.confidence_level.as_deref())
        .bind(record.stress_level.as_deref())
        .bind(record.grade_level)
        .execute(&self.pool)
        .await
        .map_err(|err| match err {
            // Course removed between the existence check and the write.
            sqlx::Error::Database(db) if db.is_foreign_key_violation() => {
                PlannerError::NotFound(format!("course {}", record.course_id))
            }
            other => PlannerError::Database(other),
        })?;

        Ok(())
    }

    async fn find_enrollments(
        &self,
        student_id: Uuid,
        filter: EnrollmentFilter,
    ) -> Result<Vec<EnrollmentView>> {
        let mut query = String::from(
            "SELECT e.student_id, e.course_id, e.status, e.grade, e.confidence_level, \
             e.stress_level, e.grade_level, c.name, c.code, c.department, c.level, c.credits \
             FROM academic_planner.enrollments e \
             JOIN academic_planner.courses c ON c.id = e.course_id \
             WHERE e.student_id = $1",
        );

        if filter.placed_only {
            query.push_str(" AND e.grade_level IS NOT NULL");
        }
        if filter.status.is_some() {
            query.push_str(" AND e.status = $2");
        }
        query.push_str(" ORDER BY e.created_at, e.course_id");

        let mut rows = sqlx::query(&query).bind(student_id);
        if let Some(status) = filter.status {
            rows = rows.bind(status.as_str());
        }

        rows.fetch_all(&self.pool)
            .await?
            .iter()
            .map(enrollment_from_row)
            .collect()
    }

    async fn update_grade(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        grade: Option<&str>,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE academic_planner.enrollments
            SET grade = $3, updated_at = now()
            WHERE student_id = $1 AND course_id = $2
            "#,
        )
        .bind(student_id)
        .bind(course_id)
        .bind(grade)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn update_metrics(
        &self,
        student_id: Uuid,
        course_id: Uuid,
        patch: &MetricsPatch,
    ) -> Result<bool> {
        let mut query = String::from("UPDATE academic_planner.enrollments SET updated_at = now()");
        let mut values: Vec<Option<&str>> = Vec::new();

        if let Some(confidence) = &patch.confidence_level {
            values.push(confidence.as_deref());
            query.push_str(&format!(", confidence_level = ${}", values.len() + 2));
        }
        if let Some(stress) = &patch.stress_level {
            values.push(stress.as_deref());
            query.push_str(&format!(", stress_level = ${}", values.len() + 2));
        }
        query.push_str(" WHERE student_id = $1 AND course_id = $2");

        let mut update = sqlx::query(&query).bind(student_id).bind(course_id);
        for value in values {
            update = update.bind(value);
        }

        let result = update.execute(&self.pool).await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_enrollment(&self, student_id: Uuid, course_id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            "DELETE FROM academic_planner.enrollments WHERE student_id = $1 AND course_id = $2",
        )
        .bind(student_id)
        .bind(course_id)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn delete_enrollments(
        &self,
        student_id: Uuid,
        status: Option<CourseStatus>,
    ) -> Result<u64> {
        let result = sqlx::query(
            r#"
            DELETE FROM academic_planner.enrollments
            WHERE student_id = $1 AND ($2::text IS NULL OR status = $2)
            "#,
        )
        .bind(student_id)
        .bind(status.map(CourseStatus::as_str))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }
}

#[async_trait]
impl IdentityResolver for PgStore {
    async fn resolve(&self, token: &str) -> Result<Option<Identity>> {
        let row = sqlx::query(
            "SELECT student_id FROM academic_planner.sessions WHERE id = $1 AND expires_at > now()",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|row| Identity {
            student_id: row.get("student_id"),
        }))
    }
}

const SEED_SESSION_DAYS: i64 = 7;

pub async fn seed(planner: &Planner<PgStore>) -> anyhow::Result<()> {
    let pool = planner.store().pool();

    let students = vec![
        (
            Uuid::parse_str("2bfc553c-83f9-4788-9db1-f861d64797a8")?,
            "Maya Okafor",
            "maya.okafor@lakeview-high.example",
            Some(10),
        ),
        (
            Uuid::parse_str("fa517cca-eb83-48a4-b553-554cc8b7a9d1")?,
            "Theo Alvarez",
            "theo.alvarez@lakeview-high.example",
            Some(11),
        ),
        (
            Uuid::parse_str("776769ca-123f-493a-83fb-4e8c3ac184ab")?,
            "Priya Raman",
            "priya.raman@lakeview-high.example",
            None,
        ),
    ];

    for (id, name, email, grade_level) in &students {
        sqlx::query(
            r#"
            INSERT INTO academic_planner.students (id, full_name, email, grade_level)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (email) DO UPDATE
            SET full_name = EXCLUDED.full_name, grade_level = EXCLUDED.grade_level
            "#,
        )
        .bind(id)
        .bind(name)
        .bind(email)
        .bind(grade_level)
        .execute(pool)
        .await?;
    }

    let courses = vec![
        ("ENG1CP", "English 1 CP", "English", "CP", 1.0),
        ("ALG1H", "Algebra 1 Honors", "Math", "Honors", 1.0),
        ("GEOCP", "Geometry CP", "Math", "CP", 1.0),
        ("BIOH", "Biology Honors", "Science", "Honors", 1.0),
        ("SPA1CP", "Spanish 1 CP", "World Languages", "CP", 1.0),
        ("APCSP", "AP Computer Science Principles", "Computer Science", "AP", 1.0),
        ("APUSH", "AP US History", "Social Studies", "AP", 1.0),
    ];

    for (code, name, department, level, credits) in courses {
        sqlx::query(
            r#"
            INSERT INTO academic_planner.courses (id, name, code, department, level, credits)
            VALUES ($1, $2, $3, $4, $5, $6)
            ON CONFLICT (name) DO UPDATE
            SET code = EXCLUDED.code, department = EXCLUDED.department,
                level = EXCLUDED.level, credits = EXCLUDED.credits
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(name)
        .bind(code)
        .bind(department)
        .bind(level)
        .bind(credits)
        .execute(pool)
        .await?;
    }

    let expires_at = Utc::now() + Duration::days(SEED_SESSION_DAYS);
    for (id, _, email, _) in &students {
        let token = format!("seed-{}", email.split('@').next().unwrap_or("student"));
        sqlx::query(
            r#"
            INSERT INTO academic_planner.sessions (id, student_id, expires_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (id) DO UPDATE SET expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(&token)
        .bind(id)
        .bind(expires_at)
        .execute(pool)
        .await?;
    }

    let enrollments = vec![
        ("maya.okafor@lakeview-high.example", "English 1 CP", CourseStatus::Completed, Some("A-"), Some("9"), None),
        ("maya.okafor@lakeview-high.example", "Algebra 1 Honors", CourseStatus::Completed, Some("B+"), Some("middle"), None),
        ("maya.okafor@lakeview-high.example", "Biology Honors", CourseStatus::InProgress, Some("B"), None, Some("HIGH")),
        ("maya.okafor@lakeview-high.example", "AP US History", CourseStatus::Planned, None, None, None),
        ("theo.alvarez@lakeview-high.example", "Spanish 1 CP", CourseStatus::Completed, Some("A"), Some("10"), None),
        ("theo.alvarez@lakeview-high.example", "AP Computer Science Principles", CourseStatus::NextSemester, None, Some("LOW"), Some("NEUTRAL")),
    ];

    for (email, course, status, grade, confidence, stress) in enrollments {
        let submission = EnrollmentSubmission {
            course_id: planner.store().course_id_by_name(course).await?,
            status,
            grade: grade.map(str::to_string),
            confidence: confidence.map(str::to_string),
            stress: stress.map(str::to_string),
        };
        let student = planner
            .store()
            .student_by_email(email)
            .await?
            .with_context(|| format!("seed student {email} missing"))?;
        planner
            .submit_enrollment(Some(&Identity { student_id: student.id }), &submission)
            .await?;
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ImportSummary {
    pub applied: usize,
    pub skipped: usize,
}

pub async fn import_csv(
    planner: &Planner<PgStore>,
    csv_path: &std::path::Path,
) -> anyhow::Result<ImportSummary> {
    #[derive(serde::Deserialize)]
    struct CsvRow {
        email: String,
        course: String,
        status: String,
        grade: Option<String>,
        confidence: Option<String>,
        stress: Option<String>,
    }

    let mut reader = csv::Reader::from_path(csv_path)
        .with_context(|| format!("failed to open {}", csv_path.display()))?;
    let mut summary = ImportSummary::default();

    for (line, result) in reader.deserialize::<CsvRow>().enumerate() {
        let row = result?;
        let line = line + 2;

        let status = match row.status.parse::<CourseStatus>() {
            Ok(status) => status,
            Err(err) => {
                warn!(line, error = %err, "skipping row");
                summary.skipped += 1;
                continue;
            }
        };

        let Some(student) = planner.store().student_by_email(&row.email).await? else {
            warn!(line, email = %row.email, "skipping row for unknown student");
            summary.skipped += 1;
            continue;
        };

        let Some(course_id) = planner.store().course_id_by_name(&row.course).await? else {
            warn!(line, course = %row.course, "skipping row for unknown course");
            summary.skipped += 1;
            continue;
        };

        let submission = EnrollmentSubmission {
            course_id: Some(course_id),
            status,
            grade: row.grade,
            confidence: row.confidence,
            stress: row.stress,
        };

        match planner
            .submit_enrollment(Some(&Identity { student_id: student.id }), &submission)
            .await
        {
            Ok(()) => summary.applied += 1,
            Err(err @ (PlannerError::Validation(_) | PlannerError::NotFound(_))) => {
                warn!(line, course = %row.course, error = %err, "skipping row");
                summary.skipped += 1;
            }
            Err(err) => return Err(err.into()),
        }
    }

    info!(applied = summary.applied, skipped = summary.skipped, "import finished");
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use std::io::Write;
    use std::sync::Arc;

    use super::*;
    use crate::events::ViewInvalidator;

    async fn insert_student(pool: &PgPool, email: &str, grade_level: Option<i32>) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO academic_planner.students (id, full_name, email, grade_level) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(email.split('@').next().unwrap())
        .bind(email)
        .bind(grade_level)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    async fn insert_course(pool: &PgPool, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO academic_planner.courses (id, name, department, level, credits) \
             VALUES ($1, $2, 'General', 'CP', 1.0)",
        )
        .bind(id)
        .bind(name)
        .execute(pool)
        .await
        .unwrap();
        id
    }

    fn record(student_id: Uuid, course_id: Uuid, status: CourseStatus) -> EnrollmentRecord {
        EnrollmentRecord {
            student_id,
            course_id,
            status,
            grade: None,
            confidence_level: None,
            stress_level: None,
            grade_level: None,
        }
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn upsert_overwrites_and_keeps_retrieval_slot(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let student = insert_student(&pool, "maya.okafor@lakeview-high.example", Some(10)).await;
        let english = insert_course(&pool, "English 1 CP").await;
        let biology = insert_course(&pool, "Biology Honors").await;

        store
            .upsert_enrollment(&record(student, english, CourseStatus::Planned))
            .await
            .unwrap();
        store
            .upsert_enrollment(&record(student, biology, CourseStatus::Planned))
            .await
            .unwrap();

        let mut completed = record(student, english, CourseStatus::Completed);
        completed.grade = Some("A-".to_string());
        completed.grade_level = Some(9);
        store.upsert_enrollment(&completed).await.unwrap();

        let rows = store
            .find_enrollments(student, EnrollmentFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].course.name, "English 1 CP");
        assert_eq!(rows[0].record, completed);
        assert_eq!(rows[1].course.name, "Biology Honors");

        let placed = store
            .find_enrollments(
                student,
                EnrollmentFilter {
                    status: Some(CourseStatus::Completed),
                    placed_only: true,
                },
            )
            .await
            .unwrap();
        assert_eq!(placed.len(), 1);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn metrics_patch_writes_only_present_columns(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let student = insert_student(&pool, "theo.alvarez@lakeview-high.example", Some(11)).await;
        let course = insert_course(&pool, "Spanish 2 CP").await;

        let mut current = record(student, course, CourseStatus::InProgress);
        current.confidence_level = Some("LOW".to_string());
        current.stress_level = Some("NEUTRAL".to_string());
        store.upsert_enrollment(&current).await.unwrap();

        let stress_only = MetricsPatch {
            confidence_level: None,
            stress_level: Some(Some("HIGH".to_string())),
        };
        assert!(store.update_metrics(student, course, &stress_only).await.unwrap());

        let row = &store
            .find_enrollments(student, EnrollmentFilter::default())
            .await
            .unwrap()[0];
        assert_eq!(row.record.confidence_level.as_deref(), Some("LOW"));
        assert_eq!(row.record.stress_level.as_deref(), Some("HIGH"));

        let both = MetricsPatch {
            confidence_level: Some(Some("VERY_HIGH".to_string())),
            stress_level: Some(None),
        };
        assert!(store.update_metrics(student, course, &both).await.unwrap());

        let row = &store
            .find_enrollments(student, EnrollmentFilter::default())
            .await
            .unwrap()[0];
        assert_eq!(row.record.confidence_level.as_deref(), Some("VERY_HIGH"));
        assert_eq!(row.record.stress_level, None);

        assert!(!store
            .update_metrics(student, Uuid::new_v4(), &both)
            .await
            .unwrap());
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn unknown_course_is_not_found(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let student = insert_student(&pool, "priya.raman@lakeview-high.example", None).await;
        let missing = Uuid::new_v4();

        assert!(!store.course_exists(missing).await.unwrap());
        assert!(matches!(
            store
                .upsert_enrollment(&record(student, missing, CourseStatus::Planned))
                .await,
            Err(PlannerError::NotFound(_))
        ));

        let planner = Planner::new(Arc::new(store), ViewInvalidator::default());
        let submission = EnrollmentSubmission {
            course_id: Some(missing),
            status: CourseStatus::Planned,
            ..Default::default()
        };
        assert!(matches!(
            planner
                .submit_enrollment(Some(&Identity { student_id: student }), &submission)
                .await,
            Err(PlannerError::NotFound(_))
        ));
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn expired_sessions_do_not_resolve(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let student = insert_student(&pool, "maya.okafor@lakeview-high.example", Some(10)).await;

        sqlx::query(
            "INSERT INTO academic_planner.sessions (id, student_id, expires_at) VALUES \
             ('live', $1, now() + interval '1 hour'), ('stale', $1, now() - interval '1 hour')",
        )
        .bind(student)
        .execute(&pool)
        .await
        .unwrap();

        assert_eq!(
            store.resolve("live").await.unwrap(),
            Some(Identity { student_id: student })
        );
        assert_eq!(store.resolve("stale").await.unwrap(), None);
        assert_eq!(store.resolve("unknown").await.unwrap(), None);
    }

    #[sqlx::test(migrations = "./migrations")]
    async fn import_skips_unknown_courses_and_students(pool: PgPool) {
        let store = PgStore::new(pool.clone());
        let student = insert_student(&pool, "maya.okafor@lakeview-high.example", Some(10)).await;
        insert_course(&pool, "English 1 CP").await;
        let planner = Planner::new(Arc::new(store), ViewInvalidator::default());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "email,course,status,grade,confidence,stress").unwrap();
        writeln!(file, "maya.okafor@lakeview-high.example,English 1 CP,COMPLETED,A-,9,").unwrap();
        writeln!(file, "maya.okafor@lakeview-high.example,Underwater Basket Weaving,PLANNED,,,").unwrap();
        writeln!(file, "nobody@lakeview-high.example,English 1 CP,PLANNED,,,").unwrap();
        writeln!(file, "maya.okafor@lakeview-high.example,English 1 CP,SOMEDAY,,,").unwrap();
        file.flush().unwrap();

        let summary = import_csv(&planner, file.path()).await.unwrap();
        assert_eq!(
            summary,
            ImportSummary {
                applied: 1,
                skipped: 3
            }
        );

        let rows = planner
            .store()
            .find_enrollments(student, EnrollmentFilter::default())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.grade_level, Some(9));
    }
}
