// src/store/memory.rs

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use super::{
    QuestionBank, QuestionStore, ResultStore, ScheduledTestStore, StoreError, UserStore,
};
use crate::models::{
    question::{NewQuestion, Question, QuestionPatch},
    scheduled_test::{NewScheduledTest, ScheduledTest, ScheduledTestPatch},
    test_result::{TestResult, TestResultDraft},
    user::{NewUser, User},
};

#[derive(Default)]
struct Tables {
    next_id: i64,
    questions: Vec<Question>,
    scheduled_tests: Vec<ScheduledTest>,
    results: Vec<TestResult>,
    users: Vec<User>,
}

impl Tables {
    fn id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert_question(&mut self, q: NewQuestion) -> Question {
        let question = Question {
            id: self.id(),
            text: q.text,
            options: q.options,
            correct_option: q.correct_option,
            explanation: q.explanation,
            topic: q.topic,
            created_at: Some(Utc::now()),
        };
        self.questions.push(question.clone());
        question
    }
}

/// In-process store. Rows are kept in insertion order; "newest first"
/// listings simply iterate backwards.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QuestionBank for MemoryStore {
    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .questions
            .iter()
            .filter(|q| q.topic.as_deref() == Some(topic))
            .cloned()
            .collect())
    }

    async fn all_topics(&self) -> Result<Vec<String>, StoreError> {
        let tables = self.tables.read().await;
        let topics: BTreeSet<&String> = tables
            .questions
            .iter()
            .filter_map(|q| q.topic.as_ref())
            .collect();
        Ok(topics.into_iter().cloned().collect())
    }
}

#[async_trait]
impl QuestionStore for MemoryStore {
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.questions.iter().rev().cloned().collect())
    }

    async fn question_by_id(&self, id: i64) -> Result<Option<Question>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.questions.iter().find(|q| q.id == id).cloned())
    }

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(tables.insert_question(question))
    }

    async fn create_questions(&self, questions: Vec<NewQuestion>) -> Result<Vec<i64>, StoreError> {
        let mut tables = self.tables.write().await;
        Ok(questions
            .into_iter()
            .map(|q| tables.insert_question(q).id)
            .collect())
    }

    async fn update_question(
        &self,
        id: i64,
        patch: QuestionPatch,
    ) -> Result<Option<Question>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(question) = tables.questions.iter_mut().find(|q| q.id == id) else {
            return Ok(None);
        };

        if let Some(text) = patch.text {
            question.text = text;
        }
        if let Some(options) = patch.options {
            question.options = options;
        }
        if let Some(correct) = patch.correct_option {
            question.correct_option = correct;
        }
        if let Some(explanation) = patch.explanation {
            question.explanation = Some(explanation);
        }
        if let Some(topic) = patch.topic {
            question.topic = Some(topic);
        }
        Ok(Some(question.clone()))
    }

    async fn delete_question(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.questions.len();
        tables.questions.retain(|q| q.id != id);
        Ok(tables.questions.len() != before)
    }

    async fn count_questions(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.questions.len() as i64)
    }
}

#[async_trait]
impl ScheduledTestStore for MemoryStore {
    async fn list_scheduled_tests(&self) -> Result<Vec<ScheduledTest>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.scheduled_tests.iter().rev().cloned().collect())
    }

    async fn active_scheduled_tests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTest>, StoreError> {
        let tables = self.tables.read().await;
        let mut active: Vec<ScheduledTest> = tables
            .scheduled_tests
            .iter()
            .filter(|t| t.is_available(now))
            .cloned()
            .collect();
        active.sort_by_key(|t| t.start_date);
        Ok(active)
    }

    async fn scheduled_test_by_id(&self, id: i64) -> Result<Option<ScheduledTest>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.scheduled_tests.iter().find(|t| t.id == id).cloned())
    }

    async fn create_scheduled_test(
        &self,
        test: NewScheduledTest,
    ) -> Result<ScheduledTest, StoreError> {
        let mut tables = self.tables.write().await;
        let test = ScheduledTest {
            id: tables.id(),
            title: test.title,
            description: test.description,
            start_date: test.start_date,
            end_date: test.end_date,
            duration: test.duration,
            topics: test.topics,
            question_count: test.question_count,
            is_active: test.is_active,
            created_at: Utc::now(),
        };
        tables.scheduled_tests.push(test.clone());
        Ok(test)
    }

    async fn update_scheduled_test(
        &self,
        id: i64,
        patch: ScheduledTestPatch,
    ) -> Result<Option<ScheduledTest>, StoreError> {
        let mut tables = self.tables.write().await;
        let Some(test) = tables.scheduled_tests.iter_mut().find(|t| t.id == id) else {
            return Ok(None);
        };
        let next = patch.apply_to(test);
        *test = next.clone();
        Ok(Some(next))
    }

    async fn delete_scheduled_test(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.scheduled_tests.len();
        tables.scheduled_tests.retain(|t| t.id != id);
        Ok(tables.scheduled_tests.len() != before)
    }

    async fn count_scheduled_tests(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.scheduled_tests.len() as i64)
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn save_result(&self, draft: &TestResultDraft) -> Result<i64, StoreError> {
        let mut tables = self.tables.write().await;
        let id = tables.id();
        tables.results.push(draft.clone().with_id(id));
        Ok(id)
    }

    async fn list_results(&self, user_id: Option<i64>) -> Result<Vec<TestResult>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables
            .results
            .iter()
            .rev()
            .filter(|r| user_id.is_none_or(|uid| r.draft.user_id == uid))
            .cloned()
            .collect())
    }

    async fn count_results(&self) -> Result<i64, StoreError> {
        Ok(self.tables.read().await.results.len() as i64)
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut tables = self.tables.write().await;
        if tables.users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Conflict(format!(
                "Username '{}' already exists",
                user.username
            )));
        }
        let user = User {
            id: tables.id(),
            username: user.username,
            password: user.password_hash,
            name: user.name,
            role: user.role,
            created_at: Some(Utc::now()),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().rev().cloned().collect())
    }

    async fn count_users(&self, role: &str) -> Result<i64, StoreError> {
        let tables = self.tables.read().await;
        Ok(tables.users.iter().filter(|u| u.role == role).count() as i64)
    }

    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let mut tables = self.tables.write().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }
        tables.results.retain(|r| r.draft.user_id != id);
        Ok(true)
    }
}
