// src/engine/registry.rs

//! Live sessions of the running service.
//!
//! Each session sits behind its own async mutex; the outer map is only locked
//! long enough to look an entry up. A started session owns one ticker task
//! that is stopped on every exit path. Sessions nobody is working on are
//! evicted by [`SessionRegistry::sweep`].

use std::{collections::HashMap, sync::Arc, time::Duration};

use chrono::{DateTime, TimeDelta, Utc};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, MissedTickBehavior},
};
use uuid::Uuid;

use super::{
    clock::Clock,
    selection::SelectionWarning,
    session::{
        CompletionReason, QuestionStatus, SessionError, SessionPhase, Step, TestSession,
        TimeLimits,
    },
};
use crate::{
    models::{
        question::{OPTION_COUNT, PublicQuestion},
        scheduled_test::Unavailable,
        test_result::TestResultDraft,
    },
    store::{ResultStore, ScheduledTestStore, StoreError},
};

pub const SAVE_FAILED_WARNING: &str = "Test completed, but results may not be saved";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Session not found")]
    NotFound,

    #[error("Scheduled test not found")]
    TestNotFound,

    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// How long sessions are kept once nobody acts on them.
#[derive(Debug, Clone, Copy)]
pub struct Retention {
    /// Opened but never started.
    pub unstarted: TimeDelta,
    /// Finished; the outcome stays readable until then.
    pub completed: TimeDelta,
    /// Started sessions without any timer, which would otherwise never end.
    pub idle: TimeDelta,
    /// Open sessions one user may hold. Only sessions that are not in
    /// progress are evicted to make room.
    pub per_user: usize,
}

impl Default for Retention {
    fn default() -> Self {
        Self {
            unstarted: TimeDelta::minutes(30),
            completed: TimeDelta::minutes(10),
            idle: TimeDelta::hours(2),
            per_user: 5,
        }
    }
}

/// A completed session's scored result and whether it was persisted.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub result_id: Option<i64>,
    pub result: TestResultDraft,
    pub warning: Option<String>,
}

struct Entry {
    session: TestSession,
    warnings: Vec<SelectionWarning>,
    ticker: Option<JoinHandle<()>>,
    outcome: Option<SessionOutcome>,
    last_active: DateTime<Utc>,
}

impl Entry {
    fn stop_ticker(&mut self) {
        if let Some(handle) = self.ticker.take() {
            handle.abort();
        }
    }

    /// `None` while a timer is still going to end the session.
    fn expires_at(&self, retention: &Retention) -> Option<DateTime<Utc>> {
        let keep = match self.session.phase() {
            SessionPhase::NotStarted => retention.unstarted,
            SessionPhase::Complete => retention.completed,
            SessionPhase::InProgress => {
                let limits = self.session.limits();
                if limits.per_question_secs.is_some() || limits.total_secs.is_some() {
                    return None;
                }
                retention.idle
            }
        };
        Some(self.last_active + keep)
    }
}

#[derive(Clone)]
struct Slot {
    user_id: i64,
    entry: Arc<Mutex<Entry>>,
}

#[derive(Clone)]
pub struct SessionRegistry {
    entries: Arc<Mutex<HashMap<Uuid, Slot>>>,
    results: Arc<dyn ResultStore>,
    tests: Arc<dyn ScheduledTestStore>,
    clock: Arc<dyn Clock>,
    tick_period: Option<Duration>,
    retention: Retention,
}

impl SessionRegistry {
    pub fn new(
        results: Arc<dyn ResultStore>,
        tests: Arc<dyn ScheduledTestStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            results,
            tests,
            clock,
            tick_period: Some(Duration::from_secs(1)),
            retention: Retention::default(),
        }
    }

    /// No background tickers; time only moves through [`SessionRegistry::tick`].
    pub fn manual(
        results: Arc<dyn ResultStore>,
        tests: Arc<dyn ScheduledTestStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            tick_period: None,
            ..Self::new(results, tests, clock)
        }
    }

    pub fn with_retention(self, retention: Retention) -> Self {
        Self { retention, ..self }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Registers a freshly built session, first making room under the
    /// owner's session cap.
    pub async fn open(&self, session: TestSession, warnings: Vec<SelectionWarning>) -> SessionView {
        self.sweep().await;

        let id = session.id();
        let user_id = session.identity().user_id;
        let entry = Entry {
            session,
            warnings,
            ticker: None,
            outcome: None,
            last_active: self.clock.now(),
        };
        let view = SessionView::of(&entry);

        let mut entries = self.entries.lock().await;
        self.make_room(&mut entries, user_id);
        entries.insert(
            id,
            Slot {
                user_id,
                entry: Arc::new(Mutex::new(entry)),
            },
        );
        view
    }

    pub async fn view(&self, id: Uuid, user_id: i64) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let entry = entry.lock().await;
        Ok(SessionView::of(&entry))
    }

    /// Starts the clock. A scheduled test must still be available at this
    /// point, not only when the session was opened.
    pub async fn start(&self, id: Uuid, user_id: i64) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let mut entry = entry.lock().await;
        let now = self.clock.now();

        if entry.session.phase() == SessionPhase::NotStarted {
            if let Some(test_id) = entry.session.test_id() {
                self.check_available(test_id, now).await?;
            }
        }

        entry.session.start(now)?;
        entry.last_active = now;
        entry.ticker = self.spawn_ticker(id);
        tracing::info!("Session {} started by user {}", id, user_id);
        Ok(SessionView::of(&entry))
    }

    pub async fn select_option(
        &self,
        id: Uuid,
        user_id: i64,
        option: usize,
    ) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let mut entry = entry.lock().await;
        entry.session.select_option(option)?;
        entry.last_active = self.clock.now();
        Ok(SessionView::of(&entry))
    }

    pub async fn toggle_review(&self, id: Uuid, user_id: i64) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let mut entry = entry.lock().await;
        entry.session.toggle_review()?;
        entry.last_active = self.clock.now();
        Ok(SessionView::of(&entry))
    }

    pub async fn go_to(
        &self,
        id: Uuid,
        user_id: i64,
        index: usize,
    ) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let mut entry = entry.lock().await;
        entry.session.go_to(index)?;
        entry.last_active = self.clock.now();
        Ok(SessionView::of(&entry))
    }

    /// Advances, or finishes and scores the session from the last question.
    pub async fn next(&self, id: Uuid, user_id: i64) -> Result<SessionView, RegistryError> {
        let entry = self.entry(id, user_id).await?;
        let mut entry = entry.lock().await;
        let now = self.clock.now();
        if let Step::Completed(draft) = entry.session.next(now)? {
            entry.stop_ticker();
            self.finalize(&mut entry, draft).await;
        }
        entry.last_active = now;
        Ok(SessionView::of(&entry))
    }

    /// One second of session time. Returns `false` once the session no longer
    /// needs ticking (complete, or gone).
    pub async fn tick(&self, id: Uuid) -> bool {
        let Some(slot) = self.entries.lock().await.get(&id).cloned() else {
            return false;
        };
        let mut entry = slot.entry.lock().await;
        if entry.session.phase() != SessionPhase::InProgress {
            return false;
        }

        match entry.session.tick(self.clock.now()) {
            Step::Continue => true,
            Step::Completed(draft) => {
                // Runs inside the ticker itself, so detach rather than abort.
                drop(entry.ticker.take());
                tracing::info!(
                    "Session {} completed by timer ({:?})",
                    id,
                    entry.session.completion()
                );
                self.finalize(&mut entry, draft).await;
                false
            }
        }
    }

    /// Tears a session down without producing a result.
    pub async fn abandon(&self, id: Uuid, user_id: i64) -> Result<(), RegistryError> {
        let entry = self.entry(id, user_id).await?;
        self.entries.lock().await.remove(&id);
        entry.lock().await.stop_ticker();
        tracing::info!("Session {} abandoned by user {}", id, user_id);
        Ok(())
    }

    /// Drops every session past its retention. Sessions busy with a request
    /// are left for the next sweep. Returns how many were removed.
    pub async fn sweep(&self) -> usize {
        let now = self.clock.now();
        let slots: Vec<(Uuid, Arc<Mutex<Entry>>)> = self
            .entries
            .lock()
            .await
            .iter()
            .map(|(id, slot)| (*id, slot.entry.clone()))
            .collect();

        let mut expired = Vec::new();
        for (id, entry) in slots {
            let Ok(mut entry) = entry.try_lock_owned() else {
                continue;
            };
            if entry
                .expires_at(&self.retention)
                .is_some_and(|at| at <= now)
            {
                entry.stop_ticker();
                expired.push((id, entry));
            }
        }

        if expired.is_empty() {
            return 0;
        }
        let mut entries = self.entries.lock().await;
        for (id, _) in &expired {
            entries.remove(id);
        }
        tracing::info!("Evicted {} idle sessions", expired.len());
        expired.len()
    }

    /// Runs [`SessionRegistry::sweep`] every `every` until the task is aborted.
    pub fn spawn_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            let mut interval = time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                registry.sweep().await;
            }
        })
    }

    /// Looks a session up on behalf of `user_id`. Sessions of other users
    /// are reported as missing.
    async fn entry(&self, id: Uuid, user_id: i64) -> Result<Arc<Mutex<Entry>>, RegistryError> {
        let slot = self
            .entries
            .lock()
            .await
            .get(&id)
            .cloned()
            .ok_or(RegistryError::NotFound)?;

        if slot.user_id != user_id {
            tracing::warn!("User {} tried to access session {}", user_id, id);
            return Err(RegistryError::NotFound);
        }
        Ok(slot.entry)
    }

    async fn check_available(&self, test_id: i64, now: DateTime<Utc>) -> Result<(), RegistryError> {
        let test = self
            .tests
            .scheduled_test_by_id(test_id)
            .await?
            .ok_or(RegistryError::TestNotFound)?;

        test.availability(now).map_err(|reason| {
            tracing::warn!("Refused to start test {}: {}", test_id, reason);
            RegistryError::from(reason)
        })
    }

    /// Evicts the user's oldest sessions that are not in progress until one
    /// more fits under the cap.
    fn make_room(&self, entries: &mut HashMap<Uuid, Slot>, user_id: i64) {
        let held = entries.values().filter(|s| s.user_id == user_id).count();
        let excess = (held + 1).saturating_sub(self.retention.per_user);
        if excess == 0 {
            return;
        }

        let mut idle: Vec<(DateTime<Utc>, Uuid)> = entries
            .iter()
            .filter(|(_, slot)| slot.user_id == user_id)
            .filter_map(|(id, slot)| {
                let entry = slot.entry.try_lock().ok()?;
                (entry.session.phase() != SessionPhase::InProgress)
                    .then_some((entry.last_active, *id))
            })
            .collect();
        idle.sort();

        for (_, id) in idle.into_iter().take(excess) {
            entries.remove(&id);
            tracing::info!("Evicted session {} of user {} to stay under the cap", id, user_id);
        }
    }

    fn spawn_ticker(&self, id: Uuid) -> Option<JoinHandle<()>> {
        let period = self.tick_period?;
        let registry = self.clone();

        Some(tokio::spawn(async move {
            let mut interval = time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately.
            interval.tick().await;

            loop {
                interval.tick().await;
                if !registry.tick(id).await {
                    break;
                }
            }
        }))
    }

    async fn finalize(&self, entry: &mut Entry, draft: TestResultDraft) {
        let outcome = match self.results.save_result(&draft).await {
            Ok(result_id) => {
                tracing::info!(
                    "Saved result {} for user {}: {}/{}",
                    result_id,
                    draft.user_id,
                    draft.score,
                    draft.total_questions
                );
                SessionOutcome {
                    result_id: Some(result_id),
                    result: draft,
                    warning: None,
                }
            }
            Err(e) => {
                tracing::error!(
                    "Failed to save result for session {}: {}",
                    entry.session.id(),
                    e
                );
                SessionOutcome {
                    result_id: None,
                    result: draft,
                    warning: Some(SAVE_FAILED_WARNING.to_string()),
                }
            }
        };
        entry.outcome = Some(outcome);
        entry.last_active = self.clock.now();
    }
}

/// What the student sees of a session.
#[derive(Debug, Serialize)]
pub struct SessionView {
    pub id: Uuid,
    pub phase: SessionPhase,
    pub test_id: Option<i64>,
    pub total_questions: usize,
    pub current_index: usize,
    /// Only while the session is in progress.
    pub current_question: Option<PublicQuestion>,
    pub selected_option: Option<usize>,
    pub marked_for_review: bool,
    pub question_status: Vec<QuestionStatus>,
    pub limits: TimeLimits,
    pub elapsed_secs: u32,
    pub remaining_secs: Option<u32>,
    pub question_remaining_secs: Option<u32>,
    pub warnings: Vec<SelectionWarning>,
    pub outcome: Option<OutcomeView>,
}

#[derive(Debug, Serialize)]
pub struct OutcomeView {
    pub reason: Option<CompletionReason>,
    pub result_id: Option<i64>,
    pub warning: Option<String>,
    pub score: u32,
    pub total_questions: u32,
    pub percentage: f64,
    pub time_spent: u32,
    pub review: Vec<ReviewItem>,
}

/// One question of a finished test, answer key included.
#[derive(Debug, Serialize)]
pub struct ReviewItem {
    pub question_id: i64,
    pub text: String,
    pub options: [String; OPTION_COUNT],
    pub topic: Option<String>,
    pub correct_option: usize,
    pub selected_option: Option<usize>,
    pub is_correct: bool,
    pub explanation: Option<String>,
    pub time_spent: u32,
}

impl SessionView {
    fn of(entry: &Entry) -> Self {
        let s = &entry.session;
        let i = s.current_index();
        let in_progress = s.phase() == SessionPhase::InProgress;

        Self {
            id: s.id(),
            phase: s.phase(),
            test_id: s.test_id(),
            total_questions: s.len(),
            current_index: i,
            current_question: if in_progress { s.public_question(i) } else { None },
            selected_option: s.selected_options()[i],
            marked_for_review: s.marked_for_review()[i],
            question_status: s.question_status().to_vec(),
            limits: s.limits(),
            elapsed_secs: s.elapsed_secs(),
            remaining_secs: s.remaining_secs(),
            question_remaining_secs: s.question_remaining_secs(),
            warnings: entry.warnings.clone(),
            outcome: entry
                .outcome
                .as_ref()
                .map(|outcome| OutcomeView::of(s, outcome)),
        }
    }
}

impl OutcomeView {
    fn of(session: &TestSession, outcome: &SessionOutcome) -> Self {
        let result = &outcome.result;
        let review = session
            .questions()
            .iter()
            .zip(&result.answers)
            .map(|(q, a)| ReviewItem {
                question_id: q.id,
                text: q.text.clone(),
                options: q.options.clone(),
                topic: q.topic.clone(),
                correct_option: q.correct_option,
                selected_option: usize::try_from(a.selected_option).ok(),
                is_correct: a.is_correct,
                explanation: q.explanation.clone(),
                time_spent: a.time_spent,
            })
            .collect();

        Self {
            reason: session.completion(),
            result_id: outcome.result_id,
            warning: outcome.warning.clone(),
            score: result.score,
            total_questions: result.total_questions,
            percentage: result.percentage(),
            time_spent: result.time_spent,
            review,
        }
    }
}
