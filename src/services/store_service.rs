use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::category::ContentCategory;
use crate::models::item::Item;
use crate::models::subtopic::{parse_catalogue, Subtopic};
use crate::services::similarity::cosine_similarity;

#[derive(Clone, Debug, Default)]
pub struct SimilarityFilters {
    pub topic_id: Option<String>,
    pub subtopic_id: Option<String>,
    pub polarity: Option<bool>,
}

impl SimilarityFilters {
    pub fn topic(topic_id: &str) -> Self {
        Self {
            topic_id: Some(topic_id.to_string()),
            ..Default::default()
        }
    }

    fn matches(&self, item: &Item) -> bool {
        self.topic_id.as_deref().map_or(true, |t| item.topic_id == t)
            && self.subtopic_id.as_deref().map_or(true, |s| item.subtopic_id == s)
            && self.polarity.map_or(true, |p| item.polarity == p)
    }
}

#[derive(Clone, Debug)]
pub struct ScoredItem {
    pub item: Item,
    pub score: f32,
}

/// Storage for the content catalogue and the generated corpus.
#[async_trait]
pub trait CorpusStore: Send + Sync {
    /// Validated subtopics of a topic, in catalogue order.
    async fn load_subtopics(&self, topic_id: &str) -> Result<Vec<Subtopic>>;

    async fn query_corpus(&self, topic_id: &str, scope_id: Option<&str>) -> Result<Vec<Item>>;

    /// All-or-nothing insert; returns the stored items.
    async fn insert_batch(&self, items: &[Item]) -> Result<Vec<Item>>;

    /// Nearest neighbours above `threshold`, best first.
    async fn similarity_search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        filters: &SimilarityFilters,
    ) -> Result<Vec<ScoredItem>>;
}

/// Row shape of `quiz_items`.
#[derive(Debug, FromRow)]
struct ItemRow {
    id: Uuid,
    topic_id: String,
    subtopic_id: String,
    item_text: String,
    polarity: bool,
    explanation: String,
    source_reference: String,
    embedding_vector: Option<Vec<f32>>,
    semantic_hash: String,
    content_categories: Vec<String>,
    difficulty: i16,
    origin: String,
    created_at: DateTime<Utc>,
}

impl From<ItemRow> for Item {
    fn from(row: ItemRow) -> Self {
        Item {
            id: row.id,
            topic_id: row.topic_id,
            subtopic_id: row.subtopic_id,
            text: row.item_text,
            polarity: row.polarity,
            explanation: row.explanation,
            source_reference: row.source_reference,
            embedding_vector: row.embedding_vector,
            semantic_hash: row.semantic_hash,
            content_categories: row
                .content_categories
                .iter()
                .filter_map(|c| ContentCategory::parse(c))
                .collect(),
            difficulty: row.difficulty.clamp(1, 5) as u8,
            origin: row.origin,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ScoredItemRow {
    #[sqlx(flatten)]
    item: ItemRow,
    score: f32,
}

/// Row shape of `subtopics`; kind-specific fields live in `details`.
#[derive(Debug, FromRow)]
struct SubtopicRow {
    id: String,
    parent_topic_id: String,
    title: String,
    content: String,
    weight: f64,
    sort_order: i32,
    kind: String,
    details: Option<JsonValue>,
}

impl TryFrom<SubtopicRow> for Subtopic {
    type Error = Error;

    fn try_from(row: SubtopicRow) -> Result<Self> {
        let mut obj = match row.details {
            Some(JsonValue::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        obj.insert("id".into(), row.id.into());
        obj.insert("parent_topic_id".into(), row.parent_topic_id.into());
        obj.insert("title".into(), row.title.into());
        obj.insert("content".into(), row.content.into());
        obj.insert("weight".into(), row.weight.into());
        obj.insert("order".into(), row.sort_order.into());
        obj.insert("kind".into(), row.kind.into());

        let subtopic: Subtopic = serde_json::from_value(JsonValue::Object(obj))
            .map_err(|e| Error::Configuration(format!("Invalid subtopic row: {}", e)))?;
        subtopic.validate()?;
        Ok(subtopic)
    }
}

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

const ITEM_COLUMNS: &str = "id, topic_id, subtopic_id, item_text, polarity, explanation, source_reference, \
     embedding_vector, semantic_hash, content_categories, difficulty, origin, created_at";

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CorpusStore for PgStore {
    async fn load_subtopics(&self, topic_id: &str) -> Result<Vec<Subtopic>> {
        let rows = sqlx::query_as::<_, SubtopicRow>(
            r#"
            SELECT id, parent_topic_id, title, content, weight, sort_order, kind, details
            FROM subtopics
            WHERE parent_topic_id = $1
            ORDER BY sort_order ASC, id ASC
            "#,
        )
        .bind(topic_id)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Subtopic::try_from).collect()
    }

    async fn query_corpus(&self, topic_id: &str, scope_id: Option<&str>) -> Result<Vec<Item>> {
        let sql = format!(
            "SELECT {} FROM quiz_items WHERE topic_id = $1 AND ($2::text IS NULL OR subtopic_id = $2) \
             ORDER BY created_at ASC, id ASC",
            ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, ItemRow>(&sql)
            .bind(topic_id)
            .bind(scope_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(Item::from).collect())
    }

    async fn insert_batch(&self, items: &[Item]) -> Result<Vec<Item>> {
        let sql = format!(
            r#"
            INSERT INTO quiz_items (
                id, topic_id, subtopic_id, item_text, polarity, explanation, source_reference,
                embedding_vector, semantic_hash, content_categories, difficulty, origin, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            RETURNING {}
            "#,
            ITEM_COLUMNS
        );

        let persist = |e: sqlx::Error| Error::Persistence(format!("Failed to insert batch: {}", e));
        let mut tx = self.pool.begin().await.map_err(persist)?;
        let mut stored = Vec::with_capacity(items.len());
        for item in items {
            let categories: Vec<String> = item
                .content_categories
                .iter()
                .map(|c| c.as_str().to_string())
                .collect();
            let row = sqlx::query_as::<_, ItemRow>(&sql)
                .bind(item.id)
                .bind(&item.topic_id)
                .bind(&item.subtopic_id)
                .bind(&item.text)
                .bind(item.polarity)
                .bind(&item.explanation)
                .bind(&item.source_reference)
                .bind(item.embedding_vector.clone())
                .bind(&item.semantic_hash)
                .bind(categories)
                .bind(item.difficulty as i16)
                .bind(&item.origin)
                .bind(item.created_at)
                .fetch_one(&mut *tx)
                .await
                .map_err(persist)?;
            stored.push(Item::from(row));
        }
        tx.commit().await.map_err(persist)?;
        Ok(stored)
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        filters: &SimilarityFilters,
    ) -> Result<Vec<ScoredItem>> {
        let sql = format!(
            r#"
            SELECT * FROM (
                SELECT {cols}, (
                    SELECT SUM(a * b) / NULLIF(SQRT(SUM(a * a)) * SQRT(SUM(b * b)), 0)
                    FROM UNNEST(q.embedding_vector, $1::real[]) AS t(a, b)
                )::real AS score
                FROM quiz_items q
                WHERE q.embedding_vector IS NOT NULL
                  AND cardinality(q.embedding_vector) = cardinality($1::real[])
                  AND ($2::text IS NULL OR q.topic_id = $2)
                  AND ($3::text IS NULL OR q.subtopic_id = $3)
                  AND ($4::bool IS NULL OR q.polarity = $4)
            ) scored
            WHERE score > $5
            ORDER BY score DESC, created_at ASC
            LIMIT $6
            "#,
            cols = ITEM_COLUMNS
        );
        let rows = sqlx::query_as::<_, ScoredItemRow>(&sql)
            .bind(query.to_vec())
            .bind(filters.topic_id.as_deref())
            .bind(filters.subtopic_id.as_deref())
            .bind(filters.polarity)
            .bind(threshold)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows
            .into_iter()
            .map(|row| ScoredItem {
                item: Item::from(row.item),
                score: row.score,
            })
            .collect())
    }
}

/// Process-local store used when no database is configured.
#[derive(Default)]
pub struct MemoryStore {
    subtopics: RwLock<HashMap<String, Vec<Subtopic>>>,
    items: RwLock<Vec<Item>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_subtopics(subtopics: Vec<Subtopic>) -> Result<Self> {
        let mut by_topic: HashMap<String, Vec<Subtopic>> = HashMap::new();
        for subtopic in subtopics {
            subtopic.validate()?;
            by_topic
                .entry(subtopic.parent_topic_id.clone())
                .or_default()
                .push(subtopic);
        }
        for list in by_topic.values_mut() {
            list.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.id.cmp(&b.id)));
        }
        Ok(Self {
            subtopics: RwLock::new(by_topic),
            items: RwLock::new(Vec::new()),
        })
    }

    pub async fn from_catalogue_file(path: &str) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path).await?;
        let subtopics = parse_catalogue(&raw)?;
        tracing::info!(path, subtopics = subtopics.len(), "catalogue loaded");
        Self::with_subtopics(subtopics)
    }

    pub async fn item_count(&self) -> usize {
        self.items.read().await.len()
    }
}

#[async_trait]
impl CorpusStore for MemoryStore {
    async fn load_subtopics(&self, topic_id: &str) -> Result<Vec<Subtopic>> {
        Ok(self
            .subtopics
            .read()
            .await
            .get(topic_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn query_corpus(&self, topic_id: &str, scope_id: Option<&str>) -> Result<Vec<Item>> {
        Ok(self
            .items
            .read()
            .await
            .iter()
            .filter(|i| i.topic_id == topic_id && scope_id.map_or(true, |s| i.subtopic_id == s))
            .cloned()
            .collect())
    }

    async fn insert_batch(&self, items: &[Item]) -> Result<Vec<Item>> {
        let mut guard = self.items.write().await;
        if let Some(dup) = items.iter().find(|i| guard.iter().any(|g| g.id == i.id)) {
            return Err(Error::Persistence(format!("Item {} already stored", dup.id)));
        }
        guard.extend(items.iter().cloned());
        Ok(items.to_vec())
    }

    async fn similarity_search(
        &self,
        query: &[f32],
        threshold: f32,
        limit: usize,
        filters: &SimilarityFilters,
    ) -> Result<Vec<ScoredItem>> {
        let guard = self.items.read().await;
        let mut scored: Vec<ScoredItem> = guard
            .iter()
            .filter(|i| filters.matches(i))
            .map(|i| ScoredItem {
                score: cosine_similarity(Some(query), i.embedding_vector.as_deref()),
                item: i.clone(),
            })
            .filter(|s| s.score > threshold)
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::subtopic::SubtopicDetails;
    use chrono::Utc;
    use uuid::Uuid;

    fn item(topic: &str, subtopic: &str, vector: Option<Vec<f32>>) -> Item {
        Item {
            id: Uuid::new_v4(),
            topic_id: topic.into(),
            subtopic_id: subtopic.into(),
            text: "statement".into(),
            polarity: true,
            explanation: String::new(),
            source_reference: String::new(),
            embedding_vector: vector,
            semantic_hash: "abc".into(),
            content_categories: vec![],
            difficulty: 3,
            origin: "test".into(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn reads_see_previous_writes() {
        let store = MemoryStore::new();
        let batch = vec![item("t1", "s1", None), item("t1", "s2", None), item("t2", "s9", None)];
        store.insert_batch(&batch).await.unwrap();

        assert_eq!(store.query_corpus("t1", None).await.unwrap().len(), 2);
        assert_eq!(store.query_corpus("t1", Some("s2")).await.unwrap().len(), 1);
        assert_eq!(store.item_count().await, 3);

        let again = store.insert_batch(&batch[..1]).await.unwrap_err();
        assert!(matches!(again, Error::Persistence(_)));
        assert_eq!(store.item_count().await, 3);
    }

    #[tokio::test]
    async fn similarity_search_filters_and_orders() {
        let store = MemoryStore::new();
        store
            .insert_batch(&[
                item("t1", "s1", Some(vec![1.0, 0.0])),
                item("t1", "s1", Some(vec![0.9, 0.1])),
                item("t1", "s1", Some(vec![0.0, 1.0])),
                item("t2", "s1", Some(vec![1.0, 0.0])),
            ])
            .await
            .unwrap();
        let hits = store
            .similarity_search(&[1.0, 0.0], 0.5, 10, &SimilarityFilters::topic("t1"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert!(hits[0].score >= hits[1].score);
        assert!(hits.iter().all(|h| h.item.topic_id == "t1"));
    }

    #[tokio::test]
    async fn subtopics_are_grouped_and_ordered() {
        let make = |id: &str, order| Subtopic {
            id: id.into(),
            parent_topic_id: "t1".into(),
            title: id.into(),
            content: "content".into(),
            weight: 1.0,
            order,
            details: SubtopicDetails::General,
        };
        let store = MemoryStore::with_subtopics(vec![make("b", 2), make("a", 1)]).unwrap();
        let loaded = store.load_subtopics("t1").await.unwrap();
        assert_eq!(loaded[0].id, "a");
        assert!(store.load_subtopics("missing").await.unwrap().is_empty());
    }

    #[test]
    fn item_rows_map_into_items() {
        let row = ItemRow {
            id: Uuid::new_v4(),
            topic_id: "t1".into(),
            subtopic_id: "s1".into(),
            item_text: "A deposit is capped.".into(),
            polarity: false,
            explanation: "It is not.".into(),
            source_reference: "art 3".into(),
            embedding_vector: Some(vec![0.5, 0.5]),
            semantic_hash: "abc".into(),
            content_categories: vec!["deadline".into(), "unheard-of".into()],
            difficulty: 9,
            origin: "openai".into(),
            created_at: Utc::now(),
        };
        let item = Item::from(row);
        assert_eq!(item.text, "A deposit is capped.");
        assert_eq!(item.content_categories, vec![ContentCategory::Deadline]);
        assert_eq!(item.difficulty, 5);
    }

    #[test]
    fn subtopic_rows_merge_their_details() {
        let row = SubtopicRow {
            id: "s1".into(),
            parent_topic_id: "t1".into(),
            title: "Theft".into(),
            content: "Theft is the taking of movable property.".into(),
            weight: 2.0,
            sort_order: 4,
            kind: "concept".into(),
            details: Some(serde_json::json!({ "key_terms": ["movable"] })),
        };
        let subtopic = Subtopic::try_from(row).unwrap();
        assert_eq!(subtopic.order, 4);
        assert_eq!(
            subtopic.details,
            SubtopicDetails::Concept {
                key_terms: vec!["movable".into()]
            }
        );

        let invalid = SubtopicRow {
            id: "s2".into(),
            parent_topic_id: "t1".into(),
            title: "Broken".into(),
            content: "Content.".into(),
            weight: 1.0,
            sort_order: 0,
            kind: "no-such-kind".into(),
            details: None,
        };
        assert_eq!(Subtopic::try_from(invalid).unwrap_err().kind(), "configuration");
    }
}
