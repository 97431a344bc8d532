use chrono::{Duration, Utc};
use serde::Serialize;

use crate::db::operations::analytics as analytics_ops;
use crate::db::operations::analytics::{
    CourseEnrollmentCount, CourseProgressRank, InstructorCourseStats,
};
use crate::db::operations::courses;
use crate::db::Database;

/// Minimum enrollments before a course qualifies for the average-progress
/// ranking; small courses would otherwise dominate it.
pub const MIN_ENROLLMENTS_FOR_RANKING: i64 = 5;

#[derive(Debug, thiserror::Error)]
pub enum AnalyticsError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityWindow {
    Days(i64),
    All,
}

impl ActivityWindow {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "7d" => Some(ActivityWindow::Days(7)),
            "30d" => Some(ActivityWindow::Days(30)),
            "90d" => Some(ActivityWindow::Days(90)),
            "all" => Some(ActivityWindow::All),
            _ => None,
        }
    }

    pub fn label(&self) -> String {
        match self {
            ActivityWindow::Days(days) => format!("{days}d"),
            ActivityWindow::All => "all".to_string(),
        }
    }
}

pub fn completion_rate(completed: i64, total: i64) -> f64 {
    if total > 0 {
        100.0 * completed as f64 / total as f64
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlatformStatistics {
    pub total_users: i64,
    pub published_courses: i64,
    pub total_enrollments: i64,
    pub completed_enrollments: i64,
    pub completion_rate: f64,
    pub average_progress: f64,
    pub active_users: i64,
    pub activity_window: String,
}

pub async fn platform_statistics(
    db: &Database,
    window: ActivityWindow,
) -> Result<PlatformStatistics, AnalyticsError> {
    let total_users = analytics_ops::count_users(db.pool()).await?;
    let published_courses = analytics_ops::count_courses_by_status(db.pool(), "published").await?;
    let enrollments = analytics_ops::platform_enrollment_aggregate(db.pool()).await?;

    let cutoff = match window {
        ActivityWindow::Days(days) => Some((Utc::now() - Duration::days(days)).naive_utc()),
        ActivityWindow::All => None,
    };
    let active_users = analytics_ops::count_active_users(db.pool(), cutoff).await?;

    Ok(PlatformStatistics {
        total_users,
        published_courses,
        total_enrollments: enrollments.total,
        completed_enrollments: enrollments.completed,
        completion_rate: completion_rate(enrollments.completed, enrollments.total),
        average_progress: enrollments.average_progress,
        active_users,
        activity_window: window.label(),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseStatistics {
    pub course_id: String,
    pub title: String,
    pub module_count: i64,
    pub lesson_count: i64,
    pub enrollment_count: i64,
    pub completed_count: i64,
    pub completion_rate: f64,
    pub average_progress: f64,
    pub attempt_count: i64,
    pub passed_attempts: i64,
    pub pass_rate: f64,
}

pub async fn course_statistics(
    db: &Database,
    course_id: &str,
) -> Result<CourseStatistics, AnalyticsError> {
    let course = courses::find_course(db.pool(), course_id)
        .await?
        .ok_or_else(|| AnalyticsError::NotFound("course does not exist".to_string()))?;

    let mut conn = db.pool().acquire().await?;
    let module_count = courses::count_course_modules(&mut conn, course_id).await?;
    let lesson_count: i64 = courses::list_course_lesson_ids(&mut conn, course_id)
        .await?
        .len() as i64;
    drop(conn);

    let enrollments = analytics_ops::course_enrollment_aggregate(db.pool(), course_id).await?;
    let attempts = analytics_ops::course_attempt_aggregate(db.pool(), course_id).await?;

    Ok(CourseStatistics {
        course_id: course.id,
        title: course.title,
        module_count,
        lesson_count,
        enrollment_count: enrollments.total,
        completed_count: enrollments.completed,
        completion_rate: completion_rate(enrollments.completed, enrollments.total),
        average_progress: enrollments.average_progress,
        attempt_count: attempts.total,
        passed_attempts: attempts.passed,
        pass_rate: completion_rate(attempts.passed, attempts.total),
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonStatistics {
    pub lesson_id: String,
    pub title: String,
    pub started: i64,
    pub completed: i64,
    pub completion_rate: f64,
    pub average_time_spent: f64,
}

pub async fn lesson_statistics(
    db: &Database,
    lesson_id: &str,
) -> Result<LessonStatistics, AnalyticsError> {
    let lesson = courses::find_lesson(db.pool(), lesson_id)
        .await?
        .ok_or_else(|| AnalyticsError::NotFound("lesson does not exist".to_string()))?;

    let aggregate = analytics_ops::lesson_aggregate(db.pool(), lesson_id).await?;

    Ok(LessonStatistics {
        lesson_id: lesson.id,
        title: lesson.title,
        started: aggregate.started,
        completed: aggregate.completed,
        completion_rate: completion_rate(aggregate.completed, aggregate.started),
        average_time_spent: aggregate.average_time_spent,
    })
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum TopCourses {
    ByEnrollments(Vec<CourseEnrollmentCount>),
    ByAverageProgress(Vec<CourseProgressRank>),
}

pub async fn top_courses_by_enrollments(
    db: &Database,
    limit: i64,
) -> Result<TopCourses, AnalyticsError> {
    let rows = analytics_ops::top_courses_by_enrollments(db.pool(), limit).await?;
    Ok(TopCourses::ByEnrollments(rows))
}

pub async fn top_courses_by_average_progress(
    db: &Database,
    limit: i64,
) -> Result<TopCourses, AnalyticsError> {
    let rows = analytics_ops::top_courses_by_average_progress(
        db.pool(),
        limit,
        MIN_ENROLLMENTS_FOR_RANKING,
    )
    .await?;
    Ok(TopCourses::ByAverageProgress(rows))
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InstructorDashboard {
    pub course_count: i64,
    pub total_enrollments: i64,
    pub average_completion_rate: f64,
    pub courses: Vec<InstructorCourseStats>,
}

pub async fn instructor_dashboard(
    db: &Database,
    instructor_id: &str,
) -> Result<InstructorDashboard, AnalyticsError> {
    let courses = analytics_ops::instructor_course_stats(db.pool(), instructor_id).await?;

    let course_count = courses.len() as i64;
    let total_enrollments: i64 = courses.iter().map(|c| c.enrollment_count).sum();
    let total_completed: i64 = courses.iter().map(|c| c.completed_count).sum();

    Ok(InstructorDashboard {
        course_count,
        total_enrollments,
        average_completion_rate: completion_rate(total_completed, total_enrollments),
        courses,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completion_rate_formula() {
        assert_eq!(completion_rate(3, 4), 75.0);
        assert_eq!(completion_rate(0, 10), 0.0);
        assert_eq!(completion_rate(10, 10), 100.0);
    }

    #[test]
    fn completion_rate_empty_set() {
        assert_eq!(completion_rate(0, 0), 0.0);
    }

    #[test]
    fn activity_window_parsing() {
        assert_eq!(ActivityWindow::parse("7d"), Some(ActivityWindow::Days(7)));
        assert_eq!(ActivityWindow::parse("30d"), Some(ActivityWindow::Days(30)));
        assert_eq!(ActivityWindow::parse("90d"), Some(ActivityWindow::Days(90)));
        assert_eq!(ActivityWindow::parse("all"), Some(ActivityWindow::All));
        assert_eq!(ActivityWindow::parse("1y"), None);
        assert_eq!(ActivityWindow::parse(""), None);
    }
}
