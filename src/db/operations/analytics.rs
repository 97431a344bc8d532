use chrono::NaiveDateTime;
use serde::Serialize;
use sqlx::{PgPool, Row};

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrollmentAggregate {
    pub total: i64,
    pub completed: i64,
    pub average_progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseEnrollmentCount {
    pub course_id: String,
    pub title: String,
    pub enrollment_count: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressRank {
    pub course_id: String,
    pub title: String,
    pub enrollment_count: i64,
    pub average_progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorCourseStats {
    pub course_id: String,
    pub title: String,
    pub status: String,
    pub enrollment_count: i64,
    pub completed_count: i64,
    pub average_progress: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptAggregate {
    pub total: i64,
    pub passed: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonAggregate {
    pub started: i64,
    pub completed: i64,
    pub average_time_spent: f64,
}

pub async fn course_enrollment_aggregate(
    pool: &PgPool,
    course_id: &str,
) -> Result<EnrollmentAggregate, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
          COUNT(*) AS "total",
          COUNT(*) FILTER (WHERE "isCompleted") AS "completed",
          COALESCE(AVG("progress"), 0) AS "averageProgress"
        FROM "enrollments"
        WHERE "courseId" = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(pool)
    .await?;

    Ok(EnrollmentAggregate {
        total: row.try_get("total")?,
        completed: row.try_get("completed")?,
        average_progress: row.try_get("averageProgress")?,
    })
}

pub async fn platform_enrollment_aggregate(
    pool: &PgPool,
) -> Result<EnrollmentAggregate, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
          COUNT(*) AS "total",
          COUNT(*) FILTER (WHERE "isCompleted") AS "completed",
          COALESCE(AVG("progress"), 0) AS "averageProgress"
        FROM "enrollments"
        "#,
    )
    .fetch_one(pool)
    .await?;

    Ok(EnrollmentAggregate {
        total: row.try_get("total")?,
        completed: row.try_get("completed")?,
        average_progress: row.try_get("averageProgress")?,
    })
}

pub async fn count_users(pool: &PgPool) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "users""#)
        .fetch_one(pool)
        .await
}

pub async fn count_courses_by_status(pool: &PgPool, status: &str) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(r#"SELECT COUNT(*) FROM "courses" WHERE "status" = $1"#)
        .bind(status)
        .fetch_one(pool)
        .await
}

/// Active user: distinct user with lesson activity after the cutoff. A `None`
/// cutoff counts everyone who ever touched a lesson.
pub async fn count_active_users(
    pool: &PgPool,
    since: Option<NaiveDateTime>,
) -> Result<i64, sqlx::Error> {
    match since {
        Some(cutoff) => {
            sqlx::query_scalar(
                r#"
                SELECT COUNT(DISTINCT "userId")
                FROM "lesson_progress"
                WHERE "lastAccessedAt" >= $1
                "#,
            )
            .bind(cutoff)
            .fetch_one(pool)
            .await
        }
        None => {
            sqlx::query_scalar(r#"SELECT COUNT(DISTINCT "userId") FROM "lesson_progress""#)
                .fetch_one(pool)
                .await
        }
    }
}

pub async fn top_courses_by_enrollments(
    pool: &PgPool,
    limit: i64,
) -> Result<Vec<CourseEnrollmentCount>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c."id" AS "courseId", c."title", COUNT(e."id") AS "enrollmentCount"
        FROM "courses" c
        LEFT JOIN "enrollments" e ON e."courseId" = c."id"
        WHERE c."status" = 'published'
        GROUP BY c."id", c."title"
        ORDER BY "enrollmentCount" DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(CourseEnrollmentCount {
                course_id: row.try_get("courseId")?,
                title: row.try_get("title")?,
                enrollment_count: row.try_get("enrollmentCount")?,
            })
        })
        .collect()
}

pub async fn top_courses_by_average_progress(
    pool: &PgPool,
    limit: i64,
    min_enrollments: i64,
) -> Result<Vec<CourseProgressRank>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c."id" AS "courseId", c."title",
               COUNT(e."id") AS "enrollmentCount",
               AVG(e."progress") AS "averageProgress"
        FROM "courses" c
        JOIN "enrollments" e ON e."courseId" = c."id"
        WHERE c."status" = 'published'
        GROUP BY c."id", c."title"
        HAVING COUNT(e."id") >= $2
        ORDER BY "averageProgress" DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .bind(min_enrollments)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(CourseProgressRank {
                course_id: row.try_get("courseId")?,
                title: row.try_get("title")?,
                enrollment_count: row.try_get("enrollmentCount")?,
                average_progress: row.try_get("averageProgress")?,
            })
        })
        .collect()
}

pub async fn instructor_course_stats(
    pool: &PgPool,
    instructor_id: &str,
) -> Result<Vec<InstructorCourseStats>, sqlx::Error> {
    let rows = sqlx::query(
        r#"
        SELECT c."id" AS "courseId", c."title", c."status",
               COUNT(e."id") AS "enrollmentCount",
               COUNT(e."id") FILTER (WHERE e."isCompleted") AS "completedCount",
               COALESCE(AVG(e."progress"), 0) AS "averageProgress"
        FROM "courses" c
        LEFT JOIN "enrollments" e ON e."courseId" = c."id"
        WHERE c."instructorId" = $1
        GROUP BY c."id", c."title", c."status"
        ORDER BY c."createdAt" DESC
        "#,
    )
    .bind(instructor_id)
    .fetch_all(pool)
    .await?;

    rows.iter()
        .map(|row| {
            Ok(InstructorCourseStats {
                course_id: row.try_get("courseId")?,
                title: row.try_get("title")?,
                status: row.try_get("status")?,
                enrollment_count: row.try_get("enrollmentCount")?,
                completed_count: row.try_get("completedCount")?,
                average_progress: row.try_get("averageProgress")?,
            })
        })
        .collect()
}

/// Attempts against every quiz owned by the course, whether attached
/// directly or through one of its modules.
pub async fn course_attempt_aggregate(
    pool: &PgPool,
    course_id: &str,
) -> Result<AttemptAggregate, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
          COUNT(a."id") AS "total",
          COUNT(a."id") FILTER (WHERE a."isPassed") AS "passed"
        FROM "quiz_attempts" a
        JOIN "quizzes" q ON q."id" = a."quizId"
        LEFT JOIN "modules" m ON m."id" = q."moduleId"
        WHERE q."courseId" = $1 OR m."courseId" = $1
        "#,
    )
    .bind(course_id)
    .fetch_one(pool)
    .await?;

    Ok(AttemptAggregate {
        total: row.try_get("total")?,
        passed: row.try_get("passed")?,
    })
}

pub async fn lesson_aggregate(
    pool: &PgPool,
    lesson_id: &str,
) -> Result<LessonAggregate, sqlx::Error> {
    let row = sqlx::query(
        r#"
        SELECT
          COUNT(*) FILTER (WHERE "status" <> 'not_started') AS "started",
          COUNT(*) FILTER (WHERE "status" = 'completed') AS "completed",
          COALESCE(AVG("timeSpent"::double precision), 0) AS "averageTimeSpent"
        FROM "lesson_progress"
        WHERE "lessonId" = $1
        "#,
    )
    .bind(lesson_id)
    .fetch_one(pool)
    .await?;

    Ok(LessonAggregate {
        started: row.try_get("started")?,
        completed: row.try_get("completed")?,
        average_time_spent: row.try_get("averageTimeSpent")?,
    })
}
