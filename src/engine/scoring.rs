// src/engine/scoring.rs

use chrono::{DateTime, Utc};

use super::session::TestSession;
use crate::models::{
    question::Question,
    test_result::{AnswerRecord, TestResultDraft, UNANSWERED},
};

/// Builds the per-question answer list in session order.
/// An unanswered question is always incorrect.
pub fn answer_records(
    questions: &[Question],
    selected: &[Option<usize>],
    time_spent: &[u32],
) -> Vec<AnswerRecord> {
    questions
        .iter()
        .enumerate()
        .map(|(i, question)| {
            let choice = selected.get(i).copied().flatten();
            AnswerRecord {
                question_id: question.id,
                selected_option: choice.map_or(UNANSWERED, |c| c as i32),
                is_correct: question.is_correct(choice),
                time_spent: time_spent.get(i).copied().unwrap_or(0),
            }
        })
        .collect()
}

/// Scores a session. `time_spent` is the aggregate session timer, not the
/// sum of the per-question counters.
pub fn score(session: &TestSession, now: DateTime<Utc>) -> TestResultDraft {
    let answers = answer_records(
        session.questions(),
        session.selected_options(),
        session.time_spent(),
    );
    let score = answers.iter().filter(|a| a.is_correct).count() as u32;

    TestResultDraft {
        user_id: session.identity().user_id,
        user_name: session.identity().user_name.clone(),
        test_id: session.test_id(),
        test_date: now,
        score,
        total_questions: answers.len() as u32,
        time_spent: session.elapsed_secs(),
        answers,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{
        engine::session::{Step, TimeLimits},
        models::user::Identity,
    };

    fn question(id: i64, correct: usize) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            options: ["10", "20", "30", "40"].map(String::from),
            correct_option: correct,
            explanation: Some("arithmetic".into()),
            topic: Some("Mathematics".into()),
            created_at: None,
        }
    }

    fn session(questions: Vec<Question>) -> TestSession {
        let identity = Identity {
            user_id: 3,
            user_name: "Alan".into(),
        };
        let mut s = TestSession::new(identity, Some(11), questions, TimeLimits::default()).unwrap();
        s.start(Utc.with_ymd_and_hms(2026, 5, 4, 9, 0, 0).unwrap())
            .unwrap();
        s
    }

    fn finish(s: &mut TestSession) -> TestResultDraft {
        let now = Utc.with_ymd_and_hms(2026, 5, 4, 9, 30, 0).unwrap();
        loop {
            if let Step::Completed(draft) = s.next(now).unwrap() {
                return draft;
            }
        }
    }

    fn assert_result_invariants(questions: &[Question], draft: &TestResultDraft) {
        assert_eq!(draft.answers.len(), draft.total_questions as usize);
        assert!(draft.score <= draft.total_questions);
        for (answer, question) in draft.answers.iter().zip(questions) {
            assert_eq!(answer.question_id, question.id);
            assert_eq!(
                answer.is_correct,
                answer.selected_option == question.correct_option as i32
            );
        }
    }

    #[test]
    fn test_all_correct_scores_full_marks() {
        let questions: Vec<Question> = (0..4).map(|i| question(i, i as usize)).collect();
        let mut s = session(questions.clone());
        for (i, q) in questions.iter().enumerate() {
            s.go_to(i).unwrap();
            s.select_option(q.correct_option).unwrap();
        }
        s.go_to(3).unwrap();

        let draft = finish(&mut s);
        assert_eq!(draft.score, draft.total_questions);
        assert_result_invariants(&questions, &draft);
    }

    #[test]
    fn test_nothing_answered_scores_zero() {
        let questions: Vec<Question> = (0..3).map(|i| question(i, 1)).collect();
        let mut s = session(questions.clone());

        let draft = finish(&mut s);
        assert_eq!(draft.score, 0);
        assert!(draft.answers.iter().all(|a| !a.is_answered()));
        assert_result_invariants(&questions, &draft);
    }

    #[test]
    fn test_one_right_one_skipped() {
        let questions = vec![question(1, 2), question(2, 0)];
        let mut s = session(questions.clone());
        s.select_option(2).unwrap();

        let draft = finish(&mut s);

        assert_eq!(draft.score, 1);
        assert_eq!(draft.answers[0].selected_option, 2);
        assert!(draft.answers[0].is_correct);
        assert_eq!(draft.answers[1].selected_option, UNANSWERED);
        assert!(!draft.answers[1].is_correct);
        assert_eq!(draft.test_id, Some(11));
        assert_eq!(draft.user_name, "Alan");
        assert_result_invariants(&questions, &draft);
    }

    #[test]
    fn test_time_spent_comes_from_session_timer() {
        let questions = vec![question(1, 0), question(2, 0)];
        let mut s = session(questions);
        for _ in 0..7 {
            s.tick(Utc::now());
        }
        s.go_to(1).unwrap();
        for _ in 0..3 {
            s.tick(Utc::now());
        }

        let draft = finish(&mut s);
        assert_eq!(draft.time_spent, 10);
        assert_eq!(draft.answers[0].time_spent, 7);
        assert_eq!(draft.answers[1].time_spent, 3);
    }

    #[test]
    fn test_percentage() {
        let questions = vec![question(1, 0), question(2, 0), question(3, 0), question(4, 0)];
        let mut s = session(questions);
        s.select_option(0).unwrap();
        let draft = finish(&mut s);
        assert_eq!(draft.percentage(), 25.0);
    }
}
