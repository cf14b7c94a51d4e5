// src/engine/session.rs

//! State of one student attempt.
//!
//! Per-question status is always derived from the answer and the review flag.
//! Time only moves through `tick`, which drives both the per-question timer
//! and the aggregate session timer.

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::scoring;
use crate::models::{
    question::{PublicQuestion, Question},
    test_result::TestResultDraft,
    user::Identity,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum QuestionStatus {
    Answered,
    Unanswered,
    AnsweredReview,
    UnansweredReview,
}

impl QuestionStatus {
    pub fn derive(answered: bool, marked_for_review: bool) -> Self {
        match (answered, marked_for_review) {
            (true, false) => Self::Answered,
            (false, false) => Self::Unanswered,
            (true, true) => Self::AnsweredReview,
            (false, true) => Self::UnansweredReview,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    NotStarted,
    InProgress,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    /// The student moved past the last question.
    Finished,
    /// The per-question timer ran out on the last question.
    QuestionTimeout,
    /// The aggregate test duration elapsed.
    TimeUp,
}

/// Timer settings for one session. `None` disables a timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TimeLimits {
    pub per_question_secs: Option<u32>,
    pub total_secs: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("A session needs at least one question")]
    Empty,

    #[error("The test has not been started")]
    NotStarted,

    #[error("The test has already been started")]
    AlreadyStarted,

    #[error("The test is already complete")]
    Complete,

    #[error("Question {0} does not exist in this test")]
    IndexOutOfRange(usize),

    #[error("Option {0} does not exist for this question")]
    InvalidOption(usize),
}

/// What a navigation or timer event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Still in progress; `current_index` may have moved.
    Continue,
    /// The session just completed and was scored.
    Completed(TestResultDraft),
}

impl Step {
    pub fn completed(&self) -> Option<&TestResultDraft> {
        match self {
            Step::Completed(draft) => Some(draft),
            Step::Continue => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TestSession {
    id: Uuid,
    identity: Identity,
    test_id: Option<i64>,
    limits: TimeLimits,
    questions: Vec<Question>,
    selected_options: Vec<Option<usize>>,
    marked_for_review: Vec<bool>,
    question_status: Vec<QuestionStatus>,
    time_spent: Vec<u32>,
    current_index: usize,
    phase: SessionPhase,
    start_time: Option<DateTime<Utc>>,
    elapsed_secs: u32,
    question_elapsed_secs: u32,
    completion: Option<CompletionReason>,
}

impl TestSession {
    /// Builds a not-yet-started session over an already selected question list.
    pub fn new(
        identity: Identity,
        test_id: Option<i64>,
        questions: Vec<Question>,
        limits: TimeLimits,
    ) -> Result<Self, SessionError> {
        if questions.is_empty() {
            return Err(SessionError::Empty);
        }
        let n = questions.len();

        Ok(Self {
            id: Uuid::new_v4(),
            identity,
            test_id,
            limits,
            questions,
            selected_options: vec![None; n],
            marked_for_review: vec![false; n],
            question_status: vec![QuestionStatus::Unanswered; n],
            time_spent: vec![0; n],
            current_index: 0,
            phase: SessionPhase::NotStarted,
            start_time: None,
            elapsed_secs: 0,
            question_elapsed_secs: 0,
            completion: None,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn test_id(&self) -> Option<i64> {
        self.test_id
    }

    pub fn limits(&self) -> TimeLimits {
        self.limits
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn completion(&self) -> Option<CompletionReason> {
        self.completion
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current_index
    }

    pub fn current_question(&self) -> &Question {
        &self.questions[self.current_index]
    }

    pub fn selected_options(&self) -> &[Option<usize>] {
        &self.selected_options
    }

    pub fn marked_for_review(&self) -> &[bool] {
        &self.marked_for_review
    }

    pub fn question_status(&self) -> &[QuestionStatus] {
        &self.question_status
    }

    pub fn time_spent(&self) -> &[u32] {
        &self.time_spent
    }

    pub fn start_time(&self) -> Option<DateTime<Utc>> {
        self.start_time
    }

    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    pub fn remaining_secs(&self) -> Option<u32> {
        self.limits
            .total_secs
            .map(|total| total.saturating_sub(self.elapsed_secs))
    }

    pub fn question_remaining_secs(&self) -> Option<u32> {
        self.limits
            .per_question_secs
            .map(|limit| limit.saturating_sub(self.question_elapsed_secs))
    }

    pub fn start(&mut self, now: DateTime<Utc>) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::NotStarted => {
                self.phase = SessionPhase::InProgress;
                self.start_time = Some(now);
                Ok(())
            }
            SessionPhase::InProgress => Err(SessionError::AlreadyStarted),
            SessionPhase::Complete => Err(SessionError::Complete),
        }
    }

    /// Records option `option` for the current question.
    pub fn select_option(&mut self, option: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        let i = self.current_index;
        if option >= self.questions[i].options.len() {
            return Err(SessionError::InvalidOption(option));
        }
        self.selected_options[i] = Some(option);
        self.refresh_status(i);
        Ok(())
    }

    /// Flips the review flag on the current question.
    pub fn toggle_review(&mut self) -> Result<bool, SessionError> {
        self.ensure_in_progress()?;
        let i = self.current_index;
        self.marked_for_review[i] = !self.marked_for_review[i];
        self.refresh_status(i);
        Ok(self.marked_for_review[i])
    }

    /// Jumps straight to question `index`.
    pub fn go_to(&mut self, index: usize) -> Result<(), SessionError> {
        self.ensure_in_progress()?;
        if index >= self.questions.len() {
            return Err(SessionError::IndexOutOfRange(index));
        }
        self.move_to(index);
        Ok(())
    }

    /// Advances one question, or completes the session from the last one.
    pub fn next(&mut self, now: DateTime<Utc>) -> Result<Step, SessionError> {
        self.ensure_in_progress()?;
        Ok(self.advance(now, CompletionReason::Finished))
    }

    /// Per-question timer expiry. An unanswered question is charged the full
    /// limit; the answer itself is never touched.
    pub fn expire_question(&mut self, now: DateTime<Utc>) -> Result<Step, SessionError> {
        self.ensure_in_progress()?;
        let i = self.current_index;
        if let (None, Some(limit)) = (self.selected_options[i], self.limits.per_question_secs) {
            self.time_spent[i] = self.time_spent[i].max(limit);
        }
        Ok(self.advance(now, CompletionReason::QuestionTimeout))
    }

    /// One second of wall time. Ticks outside `InProgress` are ignored.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Step {
        if self.phase != SessionPhase::InProgress {
            return Step::Continue;
        }

        self.elapsed_secs += 1;
        self.question_elapsed_secs += 1;
        self.time_spent[self.current_index] += 1;

        if self
            .limits
            .total_secs
            .is_some_and(|total| self.elapsed_secs >= total)
        {
            return Step::Completed(self.complete(now, CompletionReason::TimeUp));
        }

        if self
            .limits
            .per_question_secs
            .is_some_and(|limit| self.question_elapsed_secs >= limit)
        {
            return self
                .expire_question(now)
                .unwrap_or(Step::Continue);
        }

        Step::Continue
    }

    /// Question as shown to the student (no answer key).
    pub fn public_question(&self, index: usize) -> Option<PublicQuestion> {
        self.questions.get(index).map(PublicQuestion::from)
    }

    fn ensure_in_progress(&self) -> Result<(), SessionError> {
        match self.phase {
            SessionPhase::InProgress => Ok(()),
            SessionPhase::NotStarted => Err(SessionError::NotStarted),
            SessionPhase::Complete => Err(SessionError::Complete),
        }
    }

    fn refresh_status(&mut self, i: usize) {
        self.question_status[i] = QuestionStatus::derive(
            self.selected_options[i].is_some(),
            self.marked_for_review[i],
        );
    }

    fn move_to(&mut self, index: usize) {
        if index != self.current_index {
            self.question_elapsed_secs = 0;
        }
        self.current_index = index;
    }

    fn advance(&mut self, now: DateTime<Utc>, reason: CompletionReason) -> Step {
        if self.current_index + 1 < self.questions.len() {
            self.move_to(self.current_index + 1);
            Step::Continue
        } else {
            Step::Completed(self.complete(now, reason))
        }
    }

    fn complete(&mut self, now: DateTime<Utc>, reason: CompletionReason) -> TestResultDraft {
        self.phase = SessionPhase::Complete;
        self.completion = Some(reason);
        scoring::score(self, now)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::models::test_result::UNANSWERED;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 5, 4, 10, 0, 0).unwrap()
    }

    fn identity() -> Identity {
        Identity {
            user_id: 7,
            user_name: "Grace".into(),
        }
    }

    fn question(id: i64, correct: usize) -> Question {
        Question {
            id,
            text: format!("Q{id}"),
            options: ["A", "B", "C", "D"].map(String::from),
            correct_option: correct,
            explanation: None,
            topic: Some("Logic".into()),
            created_at: None,
        }
    }

    fn started(n: i64, limits: TimeLimits) -> TestSession {
        let questions = (1..=n).map(|id| question(id, 2)).collect();
        let mut session = TestSession::new(identity(), None, questions, limits).unwrap();
        session.start(now()).unwrap();
        session
    }

    fn per_question(secs: u32) -> TimeLimits {
        TimeLimits {
            per_question_secs: Some(secs),
            total_secs: None,
        }
    }

    #[test]
    fn test_status_derivation_table() {
        assert_eq!(QuestionStatus::derive(false, false), QuestionStatus::Unanswered);
        assert_eq!(QuestionStatus::derive(true, false), QuestionStatus::Answered);
        assert_eq!(
            QuestionStatus::derive(false, true),
            QuestionStatus::UnansweredReview
        );
        assert_eq!(
            QuestionStatus::derive(true, true),
            QuestionStatus::AnsweredReview
        );
    }

    #[test]
    fn test_status_always_matches_answer_and_review() {
        let mut s = started(3, TimeLimits::default());
        s.toggle_review().unwrap();
        s.select_option(1).unwrap();
        s.go_to(2).unwrap();
        s.toggle_review().unwrap();
        s.toggle_review().unwrap();
        s.go_to(1).unwrap();
        s.toggle_review().unwrap();

        for i in 0..s.len() {
            assert_eq!(
                s.question_status()[i],
                QuestionStatus::derive(
                    s.selected_options()[i].is_some(),
                    s.marked_for_review()[i]
                )
            );
        }
        assert_eq!(s.question_status()[0], QuestionStatus::AnsweredReview);
        assert_eq!(s.question_status()[1], QuestionStatus::UnansweredReview);
        assert_eq!(s.question_status()[2], QuestionStatus::Unanswered);
    }

    #[test]
    fn test_cannot_act_before_start() {
        let mut s = TestSession::new(identity(), None, vec![question(1, 0)], TimeLimits::default())
            .unwrap();
        assert_eq!(s.select_option(0), Err(SessionError::NotStarted));
        assert_eq!(s.next(now()), Err(SessionError::NotStarted));
        assert_eq!(s.tick(now()), Step::Continue);
        assert_eq!(s.elapsed_secs(), 0);
    }

    #[test]
    fn test_empty_session_is_rejected() {
        assert_eq!(
            TestSession::new(identity(), None, vec![], TimeLimits::default()).unwrap_err(),
            SessionError::Empty
        );
    }

    #[test]
    fn test_rejects_bad_option_and_index() {
        let mut s = started(2, TimeLimits::default());
        assert_eq!(s.select_option(4), Err(SessionError::InvalidOption(4)));
        assert_eq!(s.go_to(2), Err(SessionError::IndexOutOfRange(2)));
        assert_eq!(s.selected_options()[0], None);
    }

    #[test]
    fn test_next_on_last_question_completes() {
        let mut s = started(2, TimeLimits::default());
        assert_eq!(s.next(now()).unwrap(), Step::Continue);
        assert_eq!(s.current_index(), 1);

        let step = s.next(now()).unwrap();
        assert!(step.completed().is_some());
        assert_eq!(s.phase(), SessionPhase::Complete);
        assert_eq!(s.completion(), Some(CompletionReason::Finished));
    }

    #[test]
    fn test_complete_session_rejects_mutation() {
        let mut s = started(1, TimeLimits::default());
        s.next(now()).unwrap();

        assert_eq!(s.select_option(0), Err(SessionError::Complete));
        assert_eq!(s.toggle_review(), Err(SessionError::Complete));
        assert_eq!(s.go_to(0), Err(SessionError::Complete));
        assert_eq!(s.next(now()), Err(SessionError::Complete));
        assert_eq!(s.start(now()), Err(SessionError::Complete));

        let elapsed = s.elapsed_secs();
        assert_eq!(s.tick(now()), Step::Continue);
        assert_eq!(s.elapsed_secs(), elapsed);
    }

    #[test]
    fn test_free_navigation_resets_question_timer() {
        let mut s = started(3, per_question(60));
        for _ in 0..10 {
            s.tick(now());
        }
        assert_eq!(s.question_remaining_secs(), Some(50));

        s.go_to(2).unwrap();
        assert_eq!(s.question_remaining_secs(), Some(60));
        s.go_to(0).unwrap();
        assert_eq!(s.current_index(), 0);
        assert_eq!(s.time_spent()[0], 10);
    }

    #[test]
    fn test_question_timeout_on_unanswered_charges_full_limit() {
        let mut s = started(2, per_question(60));
        s.go_to(1).unwrap();
        s.tick(now());
        s.go_to(0).unwrap();

        for _ in 0..60 {
            s.tick(now());
        }

        assert_eq!(s.current_index(), 1);
        assert_eq!(s.time_spent()[0], 60);
        assert_eq!(s.selected_options()[0], None);
    }

    #[test]
    fn test_question_timeout_on_answered_keeps_answer() {
        let mut s = started(3, per_question(30));
        s.select_option(3).unwrap();
        let spent_before = s.time_spent()[0];

        let step = s.expire_question(now()).unwrap();

        assert_eq!(step, Step::Continue);
        assert_eq!(s.selected_options()[0], Some(3));
        assert_eq!(s.time_spent()[0], spent_before);
        assert_eq!(s.current_index(), 1);
        assert_eq!(s.question_status()[0], QuestionStatus::Answered);
    }

    #[test]
    fn test_question_timeout_on_last_question_completes() {
        let mut s = started(1, per_question(5));
        let mut last = Step::Continue;
        for _ in 0..5 {
            last = s.tick(now());
        }
        assert!(last.completed().is_some());
        assert_eq!(s.completion(), Some(CompletionReason::QuestionTimeout));
    }

    #[test]
    fn test_total_timer_forces_completion() {
        let limits = TimeLimits {
            per_question_secs: Some(60),
            total_secs: Some(90),
        };
        let mut s = started(5, limits);
        s.select_option(2).unwrap();

        let mut outcome = None;
        for _ in 0..200 {
            if let Step::Completed(draft) = s.tick(now()) {
                outcome = Some(draft);
                break;
            }
        }

        let draft = outcome.unwrap();
        assert_eq!(s.completion(), Some(CompletionReason::TimeUp));
        assert_eq!(draft.time_spent, 90);
        assert_eq!(draft.total_questions, 5);
        assert_eq!(draft.score, 1);
        assert_eq!(draft.answers[4].selected_option, UNANSWERED);
        assert_eq!(s.remaining_secs(), Some(0));
    }

    #[test]
    fn test_ticks_accumulate_on_current_question() {
        let mut s = started(2, TimeLimits::default());
        s.tick(now());
        s.tick(now());
        s.go_to(1).unwrap();
        s.tick(now());

        assert_eq!(s.time_spent(), &[2, 1]);
        assert_eq!(s.elapsed_secs(), 3);
    }
}
