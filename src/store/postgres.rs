// src/store/postgres.rs

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, types::Json};

use super::{
    QuestionBank, QuestionStore, ResultStore, ScheduledTestStore, StoreError, UserStore,
};
use crate::models::{
    question::{NewQuestion, OPTION_COUNT, OptionsError, Question, QuestionPatch, decode_options},
    scheduled_test::{NewScheduledTest, ScheduledTest, ScheduledTestPatch},
    test_result::{AnswerRecord, TestResult, TestResultDraft},
    user::{NewUser, User},
};

const QUESTION_COLUMNS: &str =
    "id, text, options, correct_option, explanation, topic, created_at";

const SCHEDULED_TEST_COLUMNS: &str = "id, title, description, start_date, end_date, duration, \
     topics, question_count, is_active, created_at";

const RESULT_COLUMNS: &str = "id, user_id, user_name, test_id, test_date, score, \
     total_questions, time_spent, answers";

/// Raw 'questions' row. `options` is decoded separately because older rows
/// store it in several shapes.
#[derive(Debug, FromRow)]
struct QuestionRow {
    id: i64,
    text: String,
    options: Json<Value>,
    correct_option: i32,
    explanation: Option<String>,
    topic: Option<String>,
    created_at: Option<DateTime<Utc>>,
}

impl TryFrom<QuestionRow> for Question {
    type Error = StoreError;

    fn try_from(row: QuestionRow) -> Result<Self, Self::Error> {
        let invalid = |source| StoreError::InvalidRecord { id: row.id, source };
        let options = decode_options(&row.options.0).map_err(invalid)?;
        let correct_option = usize::try_from(row.correct_option)
            .ok()
            .filter(|idx| *idx < OPTION_COUNT)
            .ok_or_else(|| invalid(OptionsError::AnswerOutOfRange(row.correct_option)))?;

        Ok(Question {
            id: row.id,
            text: row.text,
            options,
            correct_option,
            explanation: row.explanation,
            topic: row.topic,
            created_at: row.created_at,
        })
    }
}

/// Represents the 'scheduled_tests' table.
#[derive(Debug, FromRow)]
struct ScheduledTestRow {
    id: i64,
    title: String,
    description: Option<String>,
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    duration: i32,
    topics: Vec<String>,
    question_count: i32,
    is_active: bool,
    created_at: DateTime<Utc>,
}

impl From<ScheduledTestRow> for ScheduledTest {
    fn from(row: ScheduledTestRow) -> Self {
        Self {
            id: row.id,
            title: row.title,
            description: row.description,
            start_date: row.start_date,
            end_date: row.end_date,
            duration: row.duration,
            topics: row.topics,
            question_count: row.question_count,
            is_active: row.is_active,
            created_at: row.created_at,
        }
    }
}

/// Represents the 'test_results' table.
#[derive(Debug, FromRow)]
struct TestResultRow {
    id: i64,
    user_id: i64,
    user_name: String,
    test_id: Option<i64>,
    test_date: DateTime<Utc>,
    score: i32,
    total_questions: i32,
    time_spent: i32,
    answers: Json<Vec<AnswerRecord>>,
}

impl From<TestResultRow> for TestResult {
    fn from(row: TestResultRow) -> Self {
        TestResultDraft {
            user_id: row.user_id,
            user_name: row.user_name,
            test_id: row.test_id,
            test_date: row.test_date,
            score: row.score.max(0) as u32,
            total_questions: row.total_questions.max(0) as u32,
            time_spent: row.time_spent.max(0) as u32,
            answers: row.answers.0,
        }
        .with_id(row.id)
    }
}

/// Represents the 'users' table.
#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    username: String,
    password: String,
    name: Option<String>,
    role: String,
    created_at: Option<DateTime<Utc>>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            id: row.id,
            username: row.username,
            password: row.password,
            name: row.name,
            role: row.role,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL backend.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn decode_questions(rows: Vec<QuestionRow>) -> Result<Vec<Question>, StoreError> {
    rows.into_iter().map(Question::try_from).collect()
}

/// Like `decode_questions`, but a malformed row is logged and left out
/// instead of failing the whole batch.
fn decode_valid_questions(rows: Vec<QuestionRow>) -> Vec<Question> {
    rows.into_iter()
        .filter_map(|row| match Question::try_from(row) {
            Ok(question) => Some(question),
            Err(e) => {
                tracing::warn!("Skipping question: {}", e);
                None
            }
        })
        .collect()
}

async fn count(pool: &PgPool, sql: &str) -> Result<i64, StoreError> {
    let count: i64 = sqlx::query_scalar(sql).fetch_one(pool).await?;
    Ok(count)
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.is_unique_violation(),
        _ => false,
    }
}

#[async_trait]
impl QuestionBank for PgStore {
    async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>, StoreError> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE topic = $1"
        ))
        .bind(topic)
        .fetch_all(&self.pool)
        .await?;

        Ok(decode_valid_questions(rows))
    }

    async fn all_topics(&self) -> Result<Vec<String>, StoreError> {
        let topics = sqlx::query_scalar(
            "SELECT DISTINCT topic FROM questions WHERE topic IS NOT NULL ORDER BY topic",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(topics)
    }
}

#[async_trait]
impl QuestionStore for PgStore {
    async fn list_questions(&self) -> Result<Vec<Question>, StoreError> {
        let rows: Vec<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        decode_questions(rows)
    }

    async fn question_by_id(&self, id: i64) -> Result<Option<Question>, StoreError> {
        let row: Option<QuestionRow> = sqlx::query_as(&format!(
            "SELECT {QUESTION_COLUMNS} FROM questions WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Question::try_from).transpose()
    }

    async fn create_question(&self, question: NewQuestion) -> Result<Question, StoreError> {
        let row: QuestionRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO questions (text, options, correct_option, explanation, topic)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING {QUESTION_COLUMNS}
            "#
        ))
        .bind(&question.text)
        .bind(Json(&question.options))
        .bind(question.correct_option as i32)
        .bind(&question.explanation)
        .bind(&question.topic)
        .fetch_one(&self.pool)
        .await?;

        Question::try_from(row)
    }

    async fn create_questions(&self, questions: Vec<NewQuestion>) -> Result<Vec<i64>, StoreError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(questions.len());

        for question in &questions {
            let id: i64 = sqlx::query_scalar(
                r#"
                INSERT INTO questions (text, options, correct_option, explanation, topic)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING id
                "#,
            )
            .bind(&question.text)
            .bind(Json(&question.options))
            .bind(question.correct_option as i32)
            .bind(&question.explanation)
            .bind(&question.topic)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }

        tx.commit().await?;
        Ok(ids)
    }

    async fn update_question(
        &self,
        id: i64,
        patch: QuestionPatch,
    ) -> Result<Option<Question>, StoreError> {
        if patch.is_empty() {
            return self.question_by_id(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE questions SET ");
        let mut separated = builder.separated(", ");

        if let Some(text) = patch.text {
            separated.push("text = ");
            separated.push_bind_unseparated(text);
        }

        if let Some(options) = patch.options {
            separated.push("options = ");
            separated.push_bind_unseparated(Json(options));
        }

        if let Some(correct) = patch.correct_option {
            separated.push("correct_option = ");
            separated.push_bind_unseparated(correct as i32);
        }

        if let Some(explanation) = patch.explanation {
            separated.push("explanation = ");
            separated.push_bind_unseparated(explanation);
        }

        if let Some(topic) = patch.topic {
            separated.push("topic = ");
            separated.push_bind_unseparated(topic);
        }

        separated.push("updated_at = NOW()");

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {QUESTION_COLUMNS}"));

        let row: Option<QuestionRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        row.map(Question::try_from).transpose()
    }

    async fn delete_question(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM questions WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_questions(&self) -> Result<i64, StoreError> {
        count(&self.pool, "SELECT COUNT(*) FROM questions").await
    }
}

#[async_trait]
impl ScheduledTestStore for PgStore {
    async fn list_scheduled_tests(&self) -> Result<Vec<ScheduledTest>, StoreError> {
        let rows: Vec<ScheduledTestRow> = sqlx::query_as(&format!(
            "SELECT {SCHEDULED_TEST_COLUMNS} FROM scheduled_tests ORDER BY created_at DESC, id DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScheduledTest::from).collect())
    }

    async fn active_scheduled_tests(
        &self,
        now: DateTime<Utc>,
    ) -> Result<Vec<ScheduledTest>, StoreError> {
        let rows: Vec<ScheduledTestRow> = sqlx::query_as(&format!(
            r#"
            SELECT {SCHEDULED_TEST_COLUMNS}
            FROM scheduled_tests
            WHERE is_active = TRUE AND start_date <= $1 AND end_date >= $1
            ORDER BY start_date
            "#
        ))
        .bind(now)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(ScheduledTest::from).collect())
    }

    async fn scheduled_test_by_id(&self, id: i64) -> Result<Option<ScheduledTest>, StoreError> {
        let row: Option<ScheduledTestRow> = sqlx::query_as(&format!(
            "SELECT {SCHEDULED_TEST_COLUMNS} FROM scheduled_tests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(ScheduledTest::from))
    }

    async fn create_scheduled_test(
        &self,
        test: NewScheduledTest,
    ) -> Result<ScheduledTest, StoreError> {
        let row: ScheduledTestRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO scheduled_tests
            (title, description, start_date, end_date, duration, topics, question_count, is_active)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING {SCHEDULED_TEST_COLUMNS}
            "#
        ))
        .bind(&test.title)
        .bind(&test.description)
        .bind(test.start_date)
        .bind(test.end_date)
        .bind(test.duration)
        .bind(&test.topics)
        .bind(test.question_count)
        .bind(test.is_active)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_scheduled_test(
        &self,
        id: i64,
        patch: ScheduledTestPatch,
    ) -> Result<Option<ScheduledTest>, StoreError> {
        if patch.is_empty() {
            return self.scheduled_test_by_id(id).await;
        }

        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new("UPDATE scheduled_tests SET ");
        let mut separated = builder.separated(", ");

        if let Some(title) = patch.title {
            separated.push("title = ");
            separated.push_bind_unseparated(title);
        }

        if let Some(description) = patch.description {
            separated.push("description = ");
            separated.push_bind_unseparated(description);
        }

        if let Some(start_date) = patch.start_date {
            separated.push("start_date = ");
            separated.push_bind_unseparated(start_date);
        }

        if let Some(end_date) = patch.end_date {
            separated.push("end_date = ");
            separated.push_bind_unseparated(end_date);
        }

        if let Some(duration) = patch.duration {
            separated.push("duration = ");
            separated.push_bind_unseparated(duration);
        }

        if let Some(topics) = patch.topics {
            separated.push("topics = ");
            separated.push_bind_unseparated(topics);
        }

        if let Some(count) = patch.question_count {
            separated.push("question_count = ");
            separated.push_bind_unseparated(count);
        }

        if let Some(is_active) = patch.is_active {
            separated.push("is_active = ");
            separated.push_bind_unseparated(is_active);
        }

        builder.push(" WHERE id = ");
        builder.push_bind(id);
        builder.push(format!(" RETURNING {SCHEDULED_TEST_COLUMNS}"));

        let row: Option<ScheduledTestRow> = builder
            .build_query_as()
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(ScheduledTest::from))
    }

    async fn delete_scheduled_test(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scheduled_tests WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_scheduled_tests(&self) -> Result<i64, StoreError> {
        count(&self.pool, "SELECT COUNT(*) FROM scheduled_tests").await
    }
}

#[async_trait]
impl ResultStore for PgStore {
    async fn save_result(&self, draft: &TestResultDraft) -> Result<i64, StoreError> {
        let id = sqlx::query_scalar(
            r#"
            INSERT INTO test_results
            (user_id, user_name, test_id, test_date, score, total_questions, time_spent, answers)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(draft.user_id)
        .bind(&draft.user_name)
        .bind(draft.test_id)
        .bind(draft.test_date)
        .bind(draft.score as i32)
        .bind(draft.total_questions as i32)
        .bind(draft.time_spent as i32)
        .bind(Json(&draft.answers))
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn list_results(&self, user_id: Option<i64>) -> Result<Vec<TestResult>, StoreError> {
        let mut builder: QueryBuilder<Postgres> =
            QueryBuilder::new(format!("SELECT {RESULT_COLUMNS} FROM test_results"));

        if let Some(user_id) = user_id {
            builder.push(" WHERE user_id = ");
            builder.push_bind(user_id);
        }
        builder.push(" ORDER BY created_at DESC, id DESC");

        let rows: Vec<TestResultRow> = builder.build_query_as().fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(TestResult::from).collect())
    }

    async fn count_results(&self) -> Result<i64, StoreError> {
        count(&self.pool, "SELECT COUNT(*) FROM test_results").await
    }
}

#[async_trait]
impl UserStore for PgStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let row: UserRow = sqlx::query_as(
            r#"
            INSERT INTO users (username, password, name, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, username, password, name, role, created_at
            "#,
        )
        .bind(&user.username)
        .bind(&user.password_hash)
        .bind(&user.name)
        .bind(&user.role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("Username '{}' already exists", user.username))
            } else {
                StoreError::Database(e)
            }
        })?;

        Ok(row.into())
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password, name, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, StoreError> {
        let row: Option<UserRow> = sqlx::query_as(
            "SELECT id, username, password, name, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(User::from))
    }

    async fn list_users(&self) -> Result<Vec<User>, StoreError> {
        let rows: Vec<UserRow> = sqlx::query_as(
            "SELECT id, username, password, name, role, created_at FROM users ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(User::from).collect())
    }

    async fn count_users(&self, role: &str) -> Result<i64, StoreError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM users WHERE role = $1")
            .bind(role)
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    // test_results rows go with the user (ON DELETE CASCADE).
    async fn delete_user(&self, id: i64) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
