// src/engine/launch.rs

use chrono::{DateTime, Utc};

use super::{
    selection::{SelectionError, SelectionWarning, load_balanced},
    session::{SessionError, TestSession, TimeLimits},
};
use crate::{
    models::{scheduled_test::Unavailable, user::Identity},
    store::{QuestionBank, ScheduledTestStore, StoreError},
};

/// What the student asked to take.
#[derive(Debug, Clone)]
pub enum SessionRequest {
    /// A scheduled test, drawn from its topics with its duration.
    Scheduled { test_id: i64 },
    /// An unscheduled practice run over every known topic.
    Practice { question_count: usize },
}

/// Everything that can stop a session from opening. Resolved before the
/// student sees any question.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("Scheduled test not found")]
    TestNotFound,

    #[error(transparent)]
    Unavailable(#[from] Unavailable),

    #[error(transparent)]
    Selection(#[from] SelectionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// A freshly opened, not yet started session.
#[derive(Debug)]
pub struct Launched {
    pub session: TestSession,
    pub warnings: Vec<SelectionWarning>,
}

/// Looks up the test (if any), checks availability, selects questions and
/// builds the session.
pub async fn launch<S>(
    store: &S,
    identity: Identity,
    request: SessionRequest,
    per_question_secs: Option<u32>,
    now: DateTime<Utc>,
) -> Result<Launched, LaunchError>
where
    S: QuestionBank + ScheduledTestStore + ?Sized,
{
    let (test_id, topics, count, total_secs) = match request {
        SessionRequest::Scheduled { test_id } => {
            let test = store
                .scheduled_test_by_id(test_id)
                .await?
                .ok_or(LaunchError::TestNotFound)?;
            test.availability(now)?;

            let count = usize::try_from(test.question_count).unwrap_or(0);
            let total = test.duration_secs();
            (Some(test.id), test.topics, count, Some(total).filter(|t| *t > 0))
        }
        SessionRequest::Practice { question_count } => {
            let topics = store.all_topics().await?;
            if topics.is_empty() {
                return Err(SelectionError::NoQuestionsAvailable.into());
            }
            (None, topics, question_count, None)
        }
    };

    let selection = load_balanced(store, &topics, count).await?;
    let limits = TimeLimits {
        per_question_secs,
        total_secs,
    };
    let session = TestSession::new(identity, test_id, selection.questions, limits)?;

    tracing::info!(
        "Opened session {} for user {} with {} questions",
        session.id(),
        session.identity().user_id,
        session.len()
    );

    Ok(Launched {
        session,
        warnings: selection.warnings,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;
    use crate::{
        models::{question::NewQuestion, scheduled_test::NewScheduledTest},
        store::{MemoryStore, QuestionStore},
    };

    fn identity() -> Identity {
        Identity {
            user_id: 1,
            user_name: "Student".into(),
        }
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        let questions = [("Mathematics", 3), ("Science", 1)]
            .into_iter()
            .flat_map(|(topic, n)| {
                (0..n).map(move |i| NewQuestion {
                    text: format!("{topic} {i}"),
                    options: ["A", "B", "C", "D"].map(String::from),
                    correct_option: 0,
                    explanation: None,
                    topic: Some(topic.to_string()),
                })
            })
            .collect();
        store.create_questions(questions).await.unwrap();
        store
    }

    async fn schedule(store: &MemoryStore, is_active: bool, count: i32) -> i64 {
        store
            .create_scheduled_test(NewScheduledTest {
                title: "Aptitude".into(),
                description: None,
                start_date: noon() - Duration::hours(1),
                end_date: noon() + Duration::hours(1),
                duration: 30,
                topics: vec!["Mathematics".into(), "Science".into()],
                question_count: count,
                is_active,
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_scheduled_launch_uses_test_settings() {
        let store = seeded().await;
        let test_id = schedule(&store, true, 3).await;

        let launched = launch(
            &store,
            identity(),
            SessionRequest::Scheduled { test_id },
            Some(60),
            noon(),
        )
        .await
        .unwrap();

        let s = &launched.session;
        assert_eq!(s.len(), 3);
        assert_eq!(s.test_id(), Some(test_id));
        assert_eq!(s.limits().total_secs, Some(30 * 60));
        assert_eq!(s.limits().per_question_secs, Some(60));
        let science = s
            .questions()
            .iter()
            .filter(|q| q.topic.as_deref() == Some("Science"))
            .count();
        assert_eq!(science, 1);
        assert!(launched.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_launch_reports_unavailable_reason() {
        let store = seeded().await;
        let inactive = schedule(&store, false, 3).await;
        let active = schedule(&store, true, 3).await;

        let err = launch(
            &store,
            identity(),
            SessionRequest::Scheduled { test_id: inactive },
            None,
            noon(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LaunchError::Unavailable(Unavailable::Deactivated)));

        let err = launch(
            &store,
            identity(),
            SessionRequest::Scheduled { test_id: active },
            None,
            noon() + Duration::days(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LaunchError::Unavailable(Unavailable::Expired)));

        let err = launch(
            &store,
            identity(),
            SessionRequest::Scheduled { test_id: 999 },
            None,
            noon(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LaunchError::TestNotFound));
    }

    #[tokio::test]
    async fn test_practice_launch_draws_from_all_topics() {
        let store = seeded().await;

        let launched = launch(
            &store,
            identity(),
            SessionRequest::Practice { question_count: 10 },
            Some(60),
            noon(),
        )
        .await
        .unwrap();

        assert_eq!(launched.session.len(), 4);
        assert_eq!(launched.session.test_id(), None);
        assert_eq!(launched.session.limits().total_secs, None);
        assert_eq!(
            launched.warnings,
            vec![SelectionWarning::Undershoot {
                requested: 10,
                selected: 4
            }]
        );
    }

    #[tokio::test]
    async fn test_practice_on_empty_bank() {
        let store = MemoryStore::new();
        let err = launch(
            &store,
            identity(),
            SessionRequest::Practice { question_count: 10 },
            None,
            noon(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Selection(SelectionError::NoQuestionsAvailable)
        ));

        // Untagged questions belong to no topic and cannot be drawn.
        store
            .create_question(NewQuestion {
                text: "Loose".into(),
                options: ["A", "B", "C", "D"].map(String::from),
                correct_option: 0,
                explanation: None,
                topic: None,
            })
            .await
            .unwrap();
        let err = launch(
            &store,
            identity(),
            SessionRequest::Practice { question_count: 10 },
            None,
            noon(),
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err,
            LaunchError::Selection(SelectionError::NoQuestionsAvailable)
        ));
    }
}
