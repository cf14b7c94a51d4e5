// src/store/mod.rs

//! Persistence collaborators.
//!
//! The engine only talks to these traits. `PgStore` backs the running
//! service; `MemoryStore` keeps everything in process for tests and for
//! running without a database.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{
    question::{NewQuestion, OptionsError, Question, QuestionPatch},
    scheduled_test::{NewScheduledTest, ScheduledTest, ScheduledTestPatch},
    test_result::{TestResult, TestResultDraft},
    user::{NewUser, User},
};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Conflict(String),

    #[error("Invalid stored record {id}: {source}")]
    InvalidRecord {
        id: i64,
        #[source]
        source: OptionsError,
    },

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Read access used by question selection.
#[async_trait]
pub trait QuestionBank: Send + Sync {
    /// All questions tagged with `topic`. May be empty.
    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>, StoreError>;

    /// Distinct topic labels, sorted.
    async fn all_topics(&self) -> Result<Vec<String>, StoreError>;
}

/// Question administration.
#[async_trait]
pub trait QuestionStore: Send + Sync {
    /// Newest first.
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError>;

    async fn question_by_id(&self, id: i64) -> Result<Option<Question>, StoreError>;

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError>;

    /// Inserts all or nothing.
    async fn create_questions(&self, questions: Vec<NewQuestion>) -> Result<Vec<i64>, StoreError>;

    /// Returns `None` when no such question exists.
    async fn update_question(
        &self,
        id: i64,
        patch: QuestionPatch,
    ) -> Result<Option<Question>, StoreError>;

    /// Returns `false` when no such question exists.
    async fn delete_question(&self, id: i64) -> Result<bool, StoreError>;

    async fn count_questions(&self) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ScheduledTestStore: Send + Sync {
    /// Newest first.
    async fn list_scheduled_tests(&self) -> Result<Vec<ScheduledTest>, StoreError>;

    /// Active tests whose window contains `now`, earliest start first.
    async fn active_scheduled_tests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTest>, StoreError>;

    async fn scheduled_test_by_id(&self, id: i64) -> Result<Option<ScheduledTest>, StoreError>;

    async fn create_scheduled_test(
        &self,
        test: NewScheduledTest,
    ) -> Result<ScheduledTest, StoreError>;

    async fn update_scheduled_test(
        &self,
        id: i64,
        patch: ScheduledTestPatch,
    ) -> Result<Option<ScheduledTest>, StoreError>;

    async fn delete_scheduled_test(&self, id: i64) -> Result<bool, StoreError>;

    async fn count_scheduled_tests(&self) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Persists a scored attempt and returns its new id.
    async fn save_result(&self, draft: &TestResultDraft) -> Result<i64, StoreError>;

    /// Newest first, optionally limited to one user.
    async fn list_results(&self, user_id: Option<i64>) -> Result<Vec<TestResult>, StoreError>;

    async fn count_results(&self) -> Result<i64, StoreError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `StoreError::Conflict` when the username is taken.
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError>;

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError>;

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError>;

    /// Newest first.
    async fn list_users(&self) -> Result<Vec<User>, StoreError>;

    async fn count_users(&self, role: &str) -> Result<i64, StoreError>;

    /// Removes the account together with its results. Returns `false` when
    /// no such user exists.
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError>;
}

/// Everything the HTTP layer needs from one backend.
pub trait Store: QuestionBank + QuestionStore + ScheduledTestStore + ResultStore + UserStore {}

impl<T> Store for T where
    T: QuestionBank + QuestionStore + ScheduledTestStore + ResultStore + UserStore
{
}
