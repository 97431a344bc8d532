//! Property-based tests for the progress rollup and quiz scoring formulas.
//!
//! Invariants covered:
//! - Rollup percentages stay inside [0, 100] and match the exact formula
//! - Module/enrollment completion holds iff every child is completed
//! - Scoring is bounded by the total points and inclusive at the threshold
//! - Short-answer matching is invariant under case changes
//! - The required-question gate reports exactly the unanswered required ids

use proptest::prelude::*;

use openlearn_backend::db::operations::quizzes::QuestionRow;
use openlearn_backend::services::progress::{enrollment_rollup, module_rollup, ProgressStatus};
use openlearn_backend::services::quiz::{
    missing_required_questions, score_percentage, short_answer_matches,
};

fn arb_counts() -> impl Strategy<Value = (i64, i64)> {
    (0i64..=200).prop_flat_map(|total| (Just(total), 0..=total.max(0)))
}

fn question_row(id: usize, required: bool) -> QuestionRow {
    QuestionRow {
        id: format!("q{id}"),
        quiz_id: "quiz".to_string(),
        question_type: "multiple_choice".to_string(),
        text: String::new(),
        points: 1,
        is_required: required,
        position: id as i32,
    }
}

proptest! {
    #[test]
    fn module_progress_matches_formula((total, completed) in arb_counts(), any_started in any::<bool>()) {
        let rollup = module_rollup(total, completed, any_started);

        prop_assert!(rollup.progress >= 0.0);
        prop_assert!(rollup.progress <= 100.0);

        if total > 0 {
            prop_assert_eq!(rollup.progress, 100.0 * completed as f64 / total as f64);
        } else {
            prop_assert_eq!(rollup.progress, 0.0);
        }

        let is_completed = rollup.status == ProgressStatus::Completed;
        prop_assert_eq!(is_completed, total > 0 && completed == total);
    }

    #[test]
    fn module_with_no_activity_is_not_started(total in 1i64..=200) {
        let rollup = module_rollup(total, 0, false);
        prop_assert_eq!(rollup.status, ProgressStatus::NotStarted);
    }

    #[test]
    fn enrollment_progress_matches_formula((total, completed) in arb_counts()) {
        let rollup = enrollment_rollup(total, completed);

        prop_assert!(rollup.progress >= 0.0);
        prop_assert!(rollup.progress <= 100.0);

        if total > 0 {
            prop_assert_eq!(rollup.progress, 100.0 * completed as f64 / total as f64);
        } else {
            prop_assert_eq!(rollup.progress, 0.0);
        }

        prop_assert_eq!(rollup.all_modules_completed, total > 0 && completed == total);
    }

    #[test]
    fn rollup_is_deterministic((total, completed) in arb_counts(), any_started in any::<bool>()) {
        // Recomputing from the same child rows must not drift.
        let first = module_rollup(total, completed, any_started);
        let second = module_rollup(total, completed, any_started);
        prop_assert_eq!(first, second);
    }

    #[test]
    fn score_percentage_is_bounded(earned_raw in 0u32..=1000, total_raw in 0u32..=1000) {
        let total = f64::from(total_raw);
        let earned = f64::from(earned_raw.min(total_raw));

        let pct = score_percentage(earned, total);
        prop_assert!(pct >= 0.0);
        prop_assert!(pct <= 100.0);

        if total_raw > 0 && earned_raw >= total_raw {
            prop_assert_eq!(pct, 100.0);
        }
    }

    #[test]
    fn passing_threshold_is_inclusive(total in 1u32..=100, passing in 0u32..=100) {
        // Earning exactly the passing fraction always passes.
        let total_points = f64::from(total);
        let earned = total_points * f64::from(passing) / 100.0;
        let pct = score_percentage(earned, total_points);
        prop_assert!(pct >= f64::from(passing) - 1e-9);
    }

    #[test]
    fn short_answer_match_ignores_case(answer in "[a-zA-Z ]{1,24}") {
        let correct = vec![answer.clone()];
        prop_assert!(short_answer_matches(&correct, &answer.to_uppercase()));
        prop_assert!(short_answer_matches(&correct, &answer.to_lowercase()));
    }

    #[test]
    fn missing_required_is_exact(required_mask in proptest::collection::vec(any::<bool>(), 1..20),
                                 answered_mask in proptest::collection::vec(any::<bool>(), 1..20)) {
        let questions: Vec<QuestionRow> = required_mask
            .iter()
            .enumerate()
            .map(|(i, required)| question_row(i, *required))
            .collect();

        let answered: Vec<String> = answered_mask
            .iter()
            .enumerate()
            .filter(|(_, answered)| **answered)
            .map(|(i, _)| format!("q{i}"))
            .collect();

        let missing = missing_required_questions(&questions, &answered);

        for id in &missing {
            let question = questions.iter().find(|q| &q.id == id).unwrap();
            prop_assert!(question.is_required);
            prop_assert!(!answered.contains(id));
        }

        for question in questions.iter().filter(|q| q.is_required) {
            if !answered.contains(&question.id) {
                prop_assert!(missing.contains(&question.id));
            }
        }
    }
}
