// src/engine/selection.rs

//! Topic-balanced question sampling.
//!
//! Each topic's candidates are shuffled independently, then consumed
//! round-robin in topic order: the first pass seeds one question per topic so
//! small topics are never starved, later passes fill up to the target.

use std::collections::{HashSet, VecDeque};

use rand::{Rng, seq::SliceRandom};
use serde::Serialize;

use crate::{
    models::{question::Question, scheduled_test::normalize_topics},
    store::{QuestionBank, StoreError},
};

/// Candidates for one requested topic.
#[derive(Debug, Clone)]
pub struct TopicPool {
    pub topic: String,
    pub questions: Vec<Question>,
}

/// Non-fatal conditions reported alongside a successful selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SelectionWarning {
    /// Some topic fetches failed; selection went ahead without them.
    PartialTopicFetchFailure { topics: Vec<String> },
    /// Fewer questions exist than were requested.
    Undershoot { requested: usize, selected: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum SelectionError {
    #[error("At least one topic is required")]
    NoTopics,

    #[error("Question count must be greater than zero")]
    ZeroCount,

    #[error("No questions available for the selected topics")]
    NoQuestionsAvailable,

    #[error("Failed to load questions for all {topics} topics")]
    Load {
        topics: usize,
        #[source]
        source: StoreError,
    },
}

#[derive(Debug)]
pub struct Selection {
    pub questions: Vec<Question>,
    pub warnings: Vec<SelectionWarning>,
}

/// Returns a uniformly shuffled copy; the input is left untouched.
pub fn shuffled<R: Rng + ?Sized>(questions: &[Question], rng: &mut R) -> Vec<Question> {
    let mut copy = questions.to_vec();
    copy.shuffle(rng);
    copy
}

/// Consumes the queues one question per topic per pass until `count` is
/// reached or every queue is empty. Ids already taken are skipped.
pub fn round_robin(queues: Vec<Vec<Question>>, count: usize) -> Vec<Question> {
    let total: usize = queues.iter().map(Vec::len).sum();
    let mut queues: Vec<VecDeque<Question>> = queues.into_iter().map(VecDeque::from).collect();
    let mut taken = HashSet::new();
    let mut selected = Vec::with_capacity(count.min(total));

    while selected.len() < count {
        let mut progressed = false;

        for queue in queues.iter_mut() {
            if selected.len() == count {
                break;
            }
            while let Some(question) = queue.pop_front() {
                if taken.insert(question.id) {
                    selected.push(question);
                    progressed = true;
                    break;
                }
            }
        }

        if !progressed {
            break;
        }
    }

    selected
}

/// Picks up to `count` distinct questions balanced across `pools`, in a
/// randomized presentation order.
pub fn balanced_selection<R: Rng + ?Sized>(
    pools: &[TopicPool],
    count: usize,
    rng: &mut R,
) -> Vec<Question> {
    let queues = pools
        .iter()
        .map(|pool| shuffled(&pool.questions, rng))
        .collect();

    let mut selected = round_robin(queues, count);
    selected.shuffle(rng);
    selected
}

/// Fetches every topic from `bank` and runs the balanced selection.
pub async fn load_balanced<B: QuestionBank + ?Sized>(
    bank: &B,
    topics: &[String],
    count: usize,
) -> Result<Selection, SelectionError> {
    let topics = normalize_topics(topics.to_vec());
    if topics.is_empty() {
        return Err(SelectionError::NoTopics);
    }
    if count == 0 {
        return Err(SelectionError::ZeroCount);
    }

    let mut pools = Vec::with_capacity(topics.len());
    let mut failed = Vec::new();
    let mut last_error = None;

    for topic in &topics {
        match bank.questions_by_topic(topic).await {
            Ok(questions) => {
                if questions.is_empty() {
                    tracing::debug!("Topic '{}' has no questions", topic);
                }
                pools.push(TopicPool {
                    topic: topic.clone(),
                    questions,
                });
            }
            Err(e) => {
                tracing::warn!("Failed to fetch questions for topic '{}': {}", topic, e);
                failed.push(topic.clone());
                last_error = Some(e);
            }
        }
    }

    if let (true, Some(source)) = (pools.is_empty(), last_error) {
        return Err(SelectionError::Load {
            topics: topics.len(),
            source,
        });
    }

    let questions = balanced_selection(&pools, count, &mut rand::rng());
    if questions.is_empty() {
        return Err(SelectionError::NoQuestionsAvailable);
    }

    let mut warnings = Vec::new();
    if !failed.is_empty() {
        warnings.push(SelectionWarning::PartialTopicFetchFailure { topics: failed });
    }
    if questions.len() < count {
        tracing::warn!(
            "Selected {} of {} requested questions across {:?}",
            questions.len(),
            count,
            topics
        );
        warnings.push(SelectionWarning::Undershoot {
            requested: count,
            selected: questions.len(),
        });
    }

    Ok(Selection {
        questions,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use async_trait::async_trait;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn question(id: i64, topic: &str) -> Question {
        Question {
            id,
            text: format!("Question {id}"),
            options: ["A", "B", "C", "D"].map(String::from),
            correct_option: 0,
            explanation: None,
            topic: Some(topic.to_string()),
            created_at: None,
        }
    }

    fn pool(topic: &str, ids: std::ops::Range<i64>) -> TopicPool {
        TopicPool {
            topic: topic.to_string(),
            questions: ids.map(|id| question(id, topic)).collect(),
        }
    }

    fn count_topic(selected: &[Question], topic: &str) -> usize {
        selected
            .iter()
            .filter(|q| q.topic.as_deref() == Some(topic))
            .count()
    }

    fn has_duplicates(selected: &[Question]) -> bool {
        let ids: HashSet<i64> = selected.iter().map(|q| q.id).collect();
        ids.len() != selected.len()
    }

    #[test]
    fn test_shuffled_leaves_input_untouched() {
        let original = pool("Mathematics", 1..21).questions;
        let before = original.clone();
        let mut rng = StdRng::seed_from_u64(7);

        let copy = shuffled(&original, &mut rng);

        assert_eq!(original, before);
        let mut sorted: Vec<i64> = copy.iter().map(|q| q.id).collect();
        sorted.sort();
        assert_eq!(sorted, (1..21).collect::<Vec<_>>());
    }

    #[test]
    fn test_round_robin_seeds_every_topic_first() {
        let queues = vec![
            vec![question(1, "A"), question(2, "A"), question(3, "A")],
            vec![question(10, "B")],
            vec![question(20, "C"), question(21, "C")],
        ];
        let ids: Vec<i64> = round_robin(queues, 5).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 10, 20, 2, 21]);
    }

    #[test]
    fn test_round_robin_skips_repeated_ids() {
        let queues = vec![
            vec![question(1, "A"), question(2, "A")],
            vec![question(1, "A"), question(3, "B")],
        ];
        let ids: Vec<i64> = round_robin(queues, 10).iter().map(|q| q.id).collect();
        assert_eq!(ids, vec![1, 3, 2]);
    }

    #[test]
    fn test_selection_size_is_min_of_target_and_supply() {
        let pools = vec![pool("A", 1..6), pool("B", 10..13)];
        let mut rng = StdRng::seed_from_u64(1);
        for target in [1, 2, 5, 8, 20] {
            let selected = balanced_selection(&pools, target, &mut rng);
            assert_eq!(selected.len(), target.min(8));
            assert!(!has_duplicates(&selected));
        }
    }

    #[test]
    fn test_every_topic_represented_when_target_allows() {
        let pools = vec![
            pool("A", 1..30),
            pool("B", 100..101),
            pool("C", 200..202),
            pool("D", 300..340),
        ];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = balanced_selection(&pools, 4, &mut rng);
            for topic in ["A", "B", "C", "D"] {
                assert_eq!(count_topic(&selected, topic), 1, "seed {seed}");
            }
        }
    }

    #[test]
    fn test_minority_topic_seeded_then_majority_fills() {
        let pools = vec![pool("Mathematics", 1..4), pool("Science", 10..11)];
        for seed in 0..20 {
            let mut rng = StdRng::seed_from_u64(seed);
            let selected = balanced_selection(&pools, 3, &mut rng);
            assert_eq!(selected.len(), 3);
            assert_eq!(count_topic(&selected, "Science"), 1);
            assert_eq!(count_topic(&selected, "Mathematics"), 2);
            assert!(!has_duplicates(&selected));
        }
    }

    #[test]
    fn test_representation_is_even_with_abundant_supply() {
        let pools = vec![pool("A", 1..50), pool("B", 100..150), pool("C", 200..250)];
        let mut rng = StdRng::seed_from_u64(3);
        let selected = balanced_selection(&pools, 10, &mut rng);
        let counts: Vec<usize> = ["A", "B", "C"]
            .iter()
            .map(|t| count_topic(&selected, t))
            .collect();
        assert_eq!(counts, vec![4, 3, 3]);
    }

    /// Question bank double; topics listed in `broken` fail to load.
    struct FakeBank {
        questions: HashMap<String, Vec<Question>>,
        broken: Vec<String>,
    }

    impl FakeBank {
        fn new(pools: Vec<TopicPool>, broken: &[&str]) -> Self {
            Self {
                questions: pools.into_iter().map(|p| (p.topic, p.questions)).collect(),
                broken: broken.iter().map(|t| t.to_string()).collect(),
            }
        }
    }

    #[async_trait]
    impl QuestionBank for FakeBank {
        async fn questions_by_topic(&self, topic: &str) -> Result<Vec<Question>, StoreError> {
            if self.broken.iter().any(|t| t == topic) {
                return Err(StoreError::Unavailable(format!("{topic} offline")));
            }
            Ok(self.questions.get(topic).cloned().unwrap_or_default())
        }

        async fn all_topics(&self) -> Result<Vec<String>, StoreError> {
            let mut topics: Vec<String> = self.questions.keys().cloned().collect();
            topics.sort();
            Ok(topics)
        }
    }

    fn topics(names: &[&str]) -> Vec<String> {
        names.iter().map(|t| t.to_string()).collect()
    }

    #[tokio::test]
    async fn test_load_reports_undershoot() {
        let bank = FakeBank::new(vec![pool("Mathematics", 1..3), pool("Science", 10..12)], &[]);

        let selection = load_balanced(&bank, &topics(&["Mathematics", "Science"]), 10)
            .await
            .unwrap();

        assert_eq!(selection.questions.len(), 4);
        assert_eq!(
            selection.warnings,
            vec![SelectionWarning::Undershoot {
                requested: 10,
                selected: 4
            }]
        );
    }

    #[tokio::test]
    async fn test_load_survives_partial_fetch_failure() {
        let bank = FakeBank::new(vec![pool("Mathematics", 1..6), pool("Science", 10..16)], &["Science"]);

        let selection = load_balanced(&bank, &topics(&["Mathematics", "Science"]), 5)
            .await
            .unwrap();

        assert_eq!(selection.questions.len(), 5);
        assert_eq!(count_topic(&selection.questions, "Mathematics"), 5);
        assert_eq!(
            selection.warnings,
            vec![SelectionWarning::PartialTopicFetchFailure {
                topics: topics(&["Science"])
            }]
        );
    }

    #[tokio::test]
    async fn test_load_fails_when_every_topic_fails() {
        let bank = FakeBank::new(vec![pool("Mathematics", 1..6)], &["Mathematics", "Science"]);

        let err = load_balanced(&bank, &topics(&["Mathematics", "Science"]), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, SelectionError::Load { topics: 2, .. }));
    }

    #[tokio::test]
    async fn test_load_without_candidates_is_no_questions() {
        let bank = FakeBank::new(vec![pool("Mathematics", 1..6)], &[]);

        let err = load_balanced(&bank, &topics(&["History"]), 5)
            .await
            .unwrap_err();

        assert!(matches!(err, SelectionError::NoQuestionsAvailable));
    }

    #[tokio::test]
    async fn test_load_rejects_empty_request() {
        let bank = FakeBank::new(vec![], &[]);
        assert!(matches!(
            load_balanced(&bank, &[], 5).await,
            Err(SelectionError::NoTopics)
        ));
        assert!(matches!(
            load_balanced(&bank, &topics(&["A"]), 0).await,
            Err(SelectionError::ZeroCount)
        ));
    }
}
