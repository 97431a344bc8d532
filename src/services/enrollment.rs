use crate::db::operations::courses;
use crate::db::operations::enrollments::{self, EnrollmentRow, EnrollmentWithCourse};
use crate::db::operations::progress as progress_ops;
use crate::db::Database;

#[derive(Debug, thiserror::Error)]
pub enum EnrollmentError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already enrolled")]
    AlreadyEnrolled,
    #[error("validation error: {0}")]
    Validation(String),
    #[error("sql error: {0}")]
    Sql(#[from] sqlx::Error),
}

/// Enrolls a learner and pre-creates a progress row for every module and
/// lesson the course has right now. Content added later gets its row on
/// first touch instead.
pub async fn enroll(
    db: &Database,
    user_id: &str,
    course_id: &str,
) -> Result<EnrollmentRow, EnrollmentError> {
    let course = courses::find_course(db.pool(), course_id)
        .await?
        .ok_or_else(|| EnrollmentError::NotFound("course does not exist".to_string()))?;

    if course.status != "published" {
        return Err(EnrollmentError::Validation(
            "course is not open for enrollment".to_string(),
        ));
    }

    let mut tx = db.pool().begin().await?;

    if enrollments::find_enrollment(&mut tx, user_id, course_id)
        .await?
        .is_some()
    {
        return Err(EnrollmentError::AlreadyEnrolled);
    }

    let enrollment = enrollments::insert_enrollment(&mut tx, user_id, course_id).await?;

    let module_ids = courses::list_course_module_ids(&mut tx, course_id).await?;
    let lesson_ids = courses::list_course_lesson_ids(&mut tx, course_id).await?;
    progress_ops::seed_module_progress(&mut tx, user_id, &module_ids).await?;
    progress_ops::seed_lesson_progress(&mut tx, user_id, &lesson_ids).await?;

    tx.commit().await?;

    Ok(enrollment)
}

/// Unenroll drops the enrollment and every progress row the learner holds
/// for the course's content.
pub async fn unenroll(db: &Database, user_id: &str, course_id: &str) -> Result<(), EnrollmentError> {
    let mut tx = db.pool().begin().await?;

    let existing = enrollments::find_enrollment(&mut tx, user_id, course_id).await?;
    if existing.is_none() {
        return Err(EnrollmentError::NotFound(
            "user is not enrolled in this course".to_string(),
        ));
    }

    progress_ops::delete_progress_for_course(&mut tx, user_id, course_id).await?;
    enrollments::delete_enrollment(&mut tx, user_id, course_id).await?;

    tx.commit().await?;

    Ok(())
}

pub async fn list_for_user(
    db: &Database,
    user_id: &str,
) -> Result<Vec<EnrollmentWithCourse>, EnrollmentError> {
    Ok(enrollments::list_enrollments_for_user(db.pool(), user_id).await?)
}
