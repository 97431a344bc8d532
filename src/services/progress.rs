use chrono::Utc;
use sqlx::PgConnection;

use crate::db::operations::courses::{self, LessonContext};
use crate::db::operations::enrollments::{self, EnrollmentRow};
use crate::db::operations::progress as progress_ops;
use crate::db::operations::progress::{LessonProgressRow, ModuleProgressRow};
use crate::db::Database;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressStatus {
    NotStarted,
    InProgress,
    Completed,
}

impl ProgressStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::NotStarted => "not_started",
            ProgressStatus::InProgress => "in_progress",
            ProgressStatus::Completed => "completed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "not_started" => Some(ProgressStatus::NotStarted),
            "in_progress" => Some(ProgressStatus::InProgress),
            "completed" => Some(ProgressStatus::Completed),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgressError {
    #[error("validation error: {0}")]
    Validation(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not enrolled: {0}")]
    NotEnrolled(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Default)]
pub struct LessonProgressPatch {
    pub status: Option<ProgressStatus>,
    pub time_spent_delta: Option<i64>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgressOutcome {
    pub lesson_progress: LessonProgressRow,
    pub enrollment: EnrollmentRow,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModuleRollup {
    pub progress: f64,
    pub status: ProgressStatus,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrollmentRollup {
    pub progress: f64,
    pub all_modules_completed: bool,
}

/// A module with no lessons stays at 0% and not_started; it can never reach
/// completed. Preserved source behavior, see DESIGN.md.
pub fn module_rollup(total_lessons: i64, completed_lessons: i64, any_started: bool) -> ModuleRollup {
    if total_lessons <= 0 {
        return ModuleRollup {
            progress: 0.0,
            status: ProgressStatus::NotStarted,
        };
    }

    let progress = 100.0 * completed_lessons as f64 / total_lessons as f64;

    let status = if completed_lessons == total_lessons {
        ProgressStatus::Completed
    } else if completed_lessons > 0 || any_started {
        ProgressStatus::InProgress
    } else {
        ProgressStatus::NotStarted
    };

    ModuleRollup { progress, status }
}

pub fn enrollment_rollup(total_modules: i64, completed_modules: i64) -> EnrollmentRollup {
    if total_modules <= 0 {
        return EnrollmentRollup {
            progress: 0.0,
            all_modules_completed: false,
        };
    }

    EnrollmentRollup {
        progress: 100.0 * completed_modules as f64 / total_modules as f64,
        all_modules_completed: completed_modules == total_modules,
    }
}

/// Records a learner's lesson activity and rolls the change up through the
/// owning module and enrollment. The whole chain runs in one transaction so
/// the module recompute observes the lesson write and the enrollment
/// recompute observes the module write.
pub async fn record_lesson_progress(
    db: &Database,
    user_id: &str,
    lesson_id: &str,
    patch: LessonProgressPatch,
) -> Result<LessonProgressOutcome, ProgressError> {
    if let Some(delta) = patch.time_spent_delta {
        if delta < 0 {
            return Err(ProgressError::Validation(
                "timeSpentDelta must be a non-negative number of seconds".to_string(),
            ));
        }
    }

    let mut tx = db.pool().begin().await?;

    let ctx = courses::find_lesson_context(&mut tx, lesson_id)
        .await?
        .ok_or_else(|| ProgressError::NotFound("lesson does not exist".to_string()))?;

    enrollments::find_enrollment(&mut tx, user_id, &ctx.course_id)
        .await?
        .ok_or_else(|| {
            ProgressError::NotEnrolled("user is not enrolled in this course".to_string())
        })?;

    let lesson_progress = apply_lesson_patch(&mut tx, user_id, &ctx, &patch).await?;

    let enrollment = enrollments::find_enrollment(&mut tx, user_id, &ctx.course_id)
        .await?
        .ok_or_else(|| {
            ProgressError::NotEnrolled("user is not enrolled in this course".to_string())
        })?;

    tx.commit().await?;

    Ok(LessonProgressOutcome {
        lesson_progress,
        enrollment,
    })
}

/// Applies a lesson patch and runs the module/enrollment recompute chain on
/// the caller's connection. Validation of the caller's access has already
/// happened by the time this runs.
pub(crate) async fn apply_lesson_patch(
    conn: &mut PgConnection,
    user_id: &str,
    ctx: &LessonContext,
    patch: &LessonProgressPatch,
) -> Result<LessonProgressRow, ProgressError> {
    let existing = progress_ops::ensure_lesson_progress(conn, user_id, &ctx.lesson_id).await?;

    let prev_status = ProgressStatus::parse(&existing.status).unwrap_or(ProgressStatus::NotStarted);
    let next_status = patch.status.unwrap_or(prev_status);

    // completedAt is stamped on the first transition into completed and
    // cleared when the status leaves completed.
    let completed_at_change = if next_status == ProgressStatus::Completed
        && prev_status != ProgressStatus::Completed
    {
        Some(Some(Utc::now().naive_utc()))
    } else if next_status != ProgressStatus::Completed && prev_status == ProgressStatus::Completed {
        Some(None)
    } else {
        None
    };

    let delta = patch.time_spent_delta.unwrap_or(0).max(0);
    let time_spent = i64::from(existing.time_spent)
        .saturating_add(delta)
        .min(i64::from(i32::MAX)) as i32;

    progress_ops::update_lesson_progress(
        conn,
        &existing.id,
        next_status.as_str(),
        time_spent,
        completed_at_change,
    )
    .await?;

    recompute_module_progress(conn, user_id, &ctx.module_id).await?;
    recompute_enrollment_progress(conn, user_id, &ctx.course_id).await?;

    let updated = progress_ops::ensure_lesson_progress(conn, user_id, &ctx.lesson_id).await?;
    Ok(updated)
}

/// Derives the module's status and percentage from its lesson rows.
pub(crate) async fn recompute_module_progress(
    conn: &mut PgConnection,
    user_id: &str,
    module_id: &str,
) -> Result<(), ProgressError> {
    let total_lessons = courses::count_module_lessons(conn, module_id).await?;
    let rows = progress_ops::list_lesson_progress_for_module(conn, user_id, module_id).await?;

    let completed = rows
        .iter()
        .filter(|row| row.status == ProgressStatus::Completed.as_str())
        .count() as i64;
    let any_started = rows
        .iter()
        .any(|row| row.status == ProgressStatus::InProgress.as_str());

    let rollup = module_rollup(total_lessons, completed, any_started);

    let existing = progress_ops::ensure_module_progress(conn, user_id, module_id).await?;
    let newly_completed = rollup.status == ProgressStatus::Completed
        && existing.status != ProgressStatus::Completed.as_str();

    progress_ops::update_module_progress(
        conn,
        &existing.id,
        rollup.status.as_str(),
        rollup.progress,
        newly_completed,
    )
    .await?;

    Ok(())
}

/// Derives the enrollment's aggregate percentage from its module rows. A
/// missing enrollment row makes this a no-op. `isCompleted` latches: once a
/// learner finished the course it stays finished, and the completion date is
/// stamped exactly once.
pub(crate) async fn recompute_enrollment_progress(
    conn: &mut PgConnection,
    user_id: &str,
    course_id: &str,
) -> Result<(), ProgressError> {
    let Some(enrollment) = enrollments::find_enrollment(conn, user_id, course_id).await? else {
        return Ok(());
    };

    let total_modules = courses::count_course_modules(conn, course_id).await?;
    let rows = progress_ops::list_module_progress_for_course(conn, user_id, course_id).await?;

    let completed_modules = rows
        .iter()
        .filter(|row| row.status == ProgressStatus::Completed.as_str())
        .count() as i64;

    let rollup = enrollment_rollup(total_modules, completed_modules);

    let is_completed = enrollment.is_completed || rollup.all_modules_completed;
    let newly_completed = rollup.all_modules_completed && !enrollment.is_completed;

    enrollments::update_enrollment_rollup(
        conn,
        &enrollment.id,
        rollup.progress,
        is_completed,
        newly_completed,
    )
    .await?;

    Ok(())
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleProgressView {
    pub module_id: String,
    pub status: String,
    pub progress: f64,
    pub completed_at: Option<String>,
    pub last_accessed_at: Option<String>,
}

/// A learner who never touched a module gets the default not-started shape
/// instead of a 404.
pub async fn get_module_progress(
    db: &Database,
    user_id: &str,
    module_id: &str,
) -> Result<ModuleProgressView, ProgressError> {
    let module = courses::find_module(db.pool(), module_id)
        .await?
        .ok_or_else(|| ProgressError::NotFound("module does not exist".to_string()))?;

    let row = progress_ops::get_module_progress(db.pool(), user_id, module_id).await?;

    Ok(match row {
        Some(row) => ModuleProgressView {
            module_id: module.id,
            status: row.status,
            progress: row.progress,
            completed_at: row.completed_at,
            last_accessed_at: Some(row.last_accessed_at),
        },
        None => ModuleProgressView {
            module_id: module.id,
            status: ProgressStatus::NotStarted.as_str().to_string(),
            progress: 0.0,
            completed_at: None,
            last_accessed_at: None,
        },
    })
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonWithProgress {
    pub id: String,
    pub title: String,
    pub position: i32,
    pub progress: Option<LessonProgressRow>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleWithProgress {
    pub id: String,
    pub title: String,
    pub position: i32,
    pub progress: Option<ModuleProgressRow>,
    pub lessons: Vec<LessonWithProgress>,
}

#[derive(Debug, Clone, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CourseProgressView {
    pub enrollment: EnrollmentRow,
    pub course_id: String,
    pub course_title: String,
    pub modules: Vec<ModuleWithProgress>,
}

pub async fn get_course_progress(
    db: &Database,
    user_id: &str,
    course_id: &str,
) -> Result<CourseProgressView, ProgressError> {
    let course = courses::find_course(db.pool(), course_id)
        .await?
        .ok_or_else(|| ProgressError::NotFound("course does not exist".to_string()))?;

    let mut conn = db.pool().acquire().await?;

    let enrollment = enrollments::find_enrollment(&mut conn, user_id, course_id)
        .await?
        .ok_or_else(|| {
            ProgressError::NotEnrolled("user is not enrolled in this course".to_string())
        })?;

    let modules = courses::list_modules(db.pool(), course_id).await?;
    let module_rows =
        progress_ops::list_module_progress_for_course(&mut conn, user_id, course_id).await?;

    let mut out = Vec::with_capacity(modules.len());
    for module in modules {
        let module_progress = module_rows
            .iter()
            .find(|row| row.module_id == module.id)
            .cloned();

        let lessons = courses::list_lessons(db.pool(), &module.id).await?;
        let lesson_rows =
            progress_ops::list_lesson_progress_for_module(&mut conn, user_id, &module.id).await?;

        let lessons = lessons
            .into_iter()
            .map(|lesson| {
                let progress = lesson_rows
                    .iter()
                    .find(|row| row.lesson_id == lesson.id)
                    .cloned();
                LessonWithProgress {
                    id: lesson.id,
                    title: lesson.title,
                    position: lesson.position,
                    progress,
                }
            })
            .collect();

        out.push(ModuleWithProgress {
            id: module.id,
            title: module.title,
            position: module.position,
            progress: module_progress,
            lessons,
        });
    }

    Ok(CourseProgressView {
        enrollment,
        course_id: course.id,
        course_title: course.title,
        modules: out,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_rollup_exact_percentage() {
        let rollup = module_rollup(4, 1, false);
        assert_eq!(rollup.progress, 25.0);
        assert_eq!(rollup.status, ProgressStatus::InProgress);

        let rollup = module_rollup(3, 3, false);
        assert_eq!(rollup.progress, 100.0);
        assert_eq!(rollup.status, ProgressStatus::Completed);
    }

    #[test]
    fn module_rollup_zero_lessons_stays_not_started() {
        let rollup = module_rollup(0, 0, false);
        assert_eq!(rollup.progress, 0.0);
        assert_eq!(rollup.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn module_rollup_in_progress_without_completions() {
        let rollup = module_rollup(5, 0, true);
        assert_eq!(rollup.progress, 0.0);
        assert_eq!(rollup.status, ProgressStatus::InProgress);
    }

    #[test]
    fn module_rollup_untouched_module() {
        let rollup = module_rollup(5, 0, false);
        assert_eq!(rollup.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn enrollment_rollup_module_granularity() {
        // 2x2 course walkthrough: one completed module out of two is 50%,
        // regardless of how far the second module's lessons have come.
        let rollup = enrollment_rollup(2, 0);
        assert_eq!(rollup.progress, 0.0);
        assert!(!rollup.all_modules_completed);

        let rollup = enrollment_rollup(2, 1);
        assert_eq!(rollup.progress, 50.0);
        assert!(!rollup.all_modules_completed);

        let rollup = enrollment_rollup(2, 2);
        assert_eq!(rollup.progress, 100.0);
        assert!(rollup.all_modules_completed);
    }

    #[test]
    fn enrollment_rollup_zero_modules_never_completes() {
        let rollup = enrollment_rollup(0, 0);
        assert_eq!(rollup.progress, 0.0);
        assert!(!rollup.all_modules_completed);
    }

    #[test]
    fn status_round_trip() {
        for status in [
            ProgressStatus::NotStarted,
            ProgressStatus::InProgress,
            ProgressStatus::Completed,
        ] {
            assert_eq!(ProgressStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ProgressStatus::parse("finished"), None);
    }
}
