//! Repository pattern for database operations

use crate::{DbConnection, DbError, Result};
use graphrag_core::{Chunk, Entity, GraphFact};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, instrument};

/// Seed nodes considered per entity lookup
const MAX_SEED_NODES: usize = 2;

/// Characters with special meaning in full-text query syntax
const QUERY_SYNTAX_CHARS: &[char] = &[
    '+', '-', '&', '|', '!', '(', ')', '{', '}', '[', ']', '^', '"', '~', '*', '?', ':', '\\',
    '/',
];

/// Repository for all database operations
#[derive(Clone)]
pub struct Repository {
    db: DbConnection,
}

impl Repository {
    /// Create a new repository
    pub fn new(db: DbConnection) -> Self {
        Self { db }
    }

    // ==========================================
    // ENTITY OPERATIONS
    // ==========================================

    /// Create or update an entity by canonical name
    #[instrument(skip(self))]
    pub async fn upsert_entity(&self, entity: &Entity) -> Result<()> {
        if entity.canonical_name.is_empty() {
            return Err(DbError::QueryFailed("entity name is empty".into()));
        }

        self.db
            .query(
                "UPSERT type::thing('entity', $key) SET \
                    name = $name, canonical_name = $key, entity_type = $entity_type",
            )
            .bind(("key", entity.canonical_name.clone()))
            .bind(("name", entity.name.clone()))
            .bind(("entity_type", entity.entity_type.to_string()))
            .await?
            .check()?;

        Ok(())
    }

    /// Find up to two entity nodes matching a free-text name.
    ///
    /// An exact canonical match wins; otherwise nodes whose canonical name
    /// contains the (sanitized) query are returned.
    #[instrument(skip(self))]
    pub async fn find_seed_nodes(&self, name: &str) -> Result<Vec<String>> {
        let key = seed_key(name);
        if key.is_empty() {
            return Ok(Vec::new());
        }

        let exact: Vec<SeedRow> = self
            .db
            .query("SELECT canonical_name FROM entity WHERE canonical_name = $key LIMIT 1")
            .bind(("key", key.clone()))
            .await?
            .take(0)?;

        if !exact.is_empty() {
            return Ok(exact.into_iter().map(|r| r.canonical_name).collect());
        }

        let fuzzy: Vec<SeedRow> = self
            .db
            .query(
                r#"
                SELECT canonical_name FROM entity
                WHERE string::contains(canonical_name, $key)
                ORDER BY canonical_name
                LIMIT $limit
            "#,
            )
            .bind(("key", key))
            .bind(("limit", MAX_SEED_NODES))
            .await?
            .take(0)?;

        Ok(fuzzy.into_iter().map(|r| r.canonical_name).collect())
    }

    /// Whether any entity node matches the name
    #[instrument(skip(self))]
    pub async fn node_exists(&self, name: &str) -> Result<bool> {
        Ok(!self.find_seed_nodes(name).await?.is_empty())
    }

    // ==========================================
    // GRAPH OPERATIONS
    // ==========================================

    /// Record a relationship, creating missing endpoint nodes.
    ///
    /// Facts are keyed by (subject, relation, object); adding the same
    /// relationship twice updates it in place.
    #[instrument(skip(self, fact), fields(subject = %fact.subject, relation = %fact.relation))]
    pub async fn add_fact(&self, fact: &GraphFact) -> Result<()> {
        let subject_key = Entity::canonicalize(&fact.subject);
        let object_key = Entity::canonicalize(&fact.object);
        if subject_key.is_empty() || object_key.is_empty() || fact.relation.trim().is_empty() {
            return Err(DbError::QueryFailed(format!(
                "incomplete fact: {}",
                fact.statement()
            )));
        }

        self.db
            .query(
                r#"
                UPSERT type::thing('entity', $subject_key)
                    SET name = $subject, canonical_name = $subject_key;
                UPSERT type::thing('entity', $object_key)
                    SET name = $object, canonical_name = $object_key;
                UPSERT type::thing('fact', [$subject_key, $relation, $object_key]) SET
                    subject = $subject,
                    relation = $relation,
                    object = $object,
                    subject_key = $subject_key,
                    object_key = $object_key,
                    source_doc_id = $source_doc_id,
                    weight = $weight;
            "#,
            )
            .bind(("subject", fact.subject.trim().to_string()))
            .bind(("object", fact.object.trim().to_string()))
            .bind(("relation", fact.relation.trim().to_string()))
            .bind(("subject_key", subject_key))
            .bind(("object_key", object_key))
            .bind(("source_doc_id", fact.source_doc_id.clone()))
            .bind(("weight", fact.score))
            .await?
            .check()?;

        Ok(())
    }

    /// Breadth-first traversal from the nodes matching `seed`.
    ///
    /// Each hop is one query over edges touching the current frontier, in
    /// either direction. Every returned fact carries the hop at which it was
    /// first reached, so both endpoints lie within `max_depth` of a seed.
    #[instrument(skip(self))]
    pub async fn traverse(&self, seed: &str, max_depth: usize) -> Result<Vec<GraphFact>> {
        let seeds = self.find_seed_nodes(seed).await?;
        if seeds.is_empty() || max_depth == 0 {
            return Ok(Vec::new());
        }

        let mut visited: HashSet<String> = seeds.iter().cloned().collect();
        let mut seen_edges: HashSet<(String, String, String)> = HashSet::new();
        let mut frontier = seeds;
        let mut facts = Vec::new();

        for depth in 1..=max_depth {
            if frontier.is_empty() {
                break;
            }

            let rows: Vec<FactRecord> = self
                .db
                .query(
                    r#"
                    SELECT subject, relation, object, subject_key, object_key, source_doc_id, weight
                    FROM fact
                    WHERE subject_key IN $frontier OR object_key IN $frontier
                    ORDER BY subject_key, relation, object_key
                "#,
                )
                .bind(("frontier", frontier))
                .await?
                .take(0)?;

            let mut next = Vec::new();
            for row in rows {
                let edge_key = (
                    row.subject_key.clone(),
                    row.relation.clone(),
                    row.object_key.clone(),
                );
                if !seen_edges.insert(edge_key) {
                    continue;
                }

                for endpoint in [&row.subject_key, &row.object_key] {
                    if visited.insert(endpoint.clone()) {
                        next.push(endpoint.clone());
                    }
                }

                facts.push(row.into_fact(depth));
            }

            debug!("Depth {}: {} facts, {} new nodes", depth, facts.len(), next.len());
            frontier = next;
        }

        Ok(facts)
    }

    // ==========================================
    // CHUNK OPERATIONS
    // ==========================================

    /// Create or replace a chunk by id
    #[instrument(skip(self, chunk), fields(chunk_id = %chunk.id))]
    pub async fn upsert_chunk(&self, chunk: &Chunk) -> Result<()> {
        if !chunk.has_embedding() {
            return Err(DbError::QueryFailed(format!(
                "chunk {} has no embedding",
                chunk.id
            )));
        }

        self.db
            .query("UPSERT type::thing('chunk', $chunk_id) CONTENT $record")
            .bind(("chunk_id", chunk.id.clone()))
            .bind(("record", ChunkRecord::from(chunk)))
            .await?
            .check()?;

        Ok(())
    }

    /// Cosine-similarity search over chunk embeddings
    #[instrument(skip(self, embedding))]
    pub async fn search_chunks(&self, embedding: Vec<f32>, limit: usize) -> Result<Vec<ChunkHit>> {
        if embedding.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let dimension = embedding.len();
        let hits: Vec<ChunkHit> = self
            .db
            .query(
                r#"
                SELECT
                    chunk_id,
                    vector::similarity::cosine(embedding, $embedding) AS similarity
                FROM chunk
                WHERE array::len(embedding) = $dimension
                ORDER BY similarity DESC, chunk_id ASC
                LIMIT $limit
            "#,
            )
            .bind(("embedding", embedding))
            .bind(("dimension", dimension))
            .bind(("limit", limit))
            .await?
            .take(0)?;

        Ok(hits)
    }

    /// Get a chunk by id
    #[instrument(skip(self))]
    pub async fn fetch_chunk(&self, chunk_id: &str) -> Result<Option<Chunk>> {
        let rows: Vec<ChunkRecord> = self
            .db
            .query(
                "SELECT chunk_id, text, embedding, source_doc_id FROM chunk \
                 WHERE chunk_id = $chunk_id LIMIT 1",
            )
            .bind(("chunk_id", chunk_id.to_string()))
            .await?
            .take(0)?;

        Ok(rows.into_iter().next().map(Chunk::from))
    }

    // ==========================================
    // STATS / MAINTENANCE
    // ==========================================

    /// Get database statistics
    #[instrument(skip(self))]
    pub async fn get_stats(&self) -> Result<DbStats> {
        let stats: Option<DbStats> = self
            .db
            .query(
                r#"
                RETURN {
                    entity_count: array::len((SELECT id FROM entity)),
                    fact_count: array::len((SELECT id FROM fact)),
                    chunk_count: array::len((SELECT id FROM chunk))
                }
            "#,
            )
            .await?
            .take(0)?;

        stats.ok_or_else(|| DbError::QueryFailed("stats".into()))
    }

    /// Remove every entity, fact and chunk
    #[instrument(skip(self))]
    pub async fn clear(&self) -> Result<()> {
        self.db
            .query("DELETE fact; DELETE chunk; DELETE entity;")
            .await?
            .check()?;
        Ok(())
    }

    /// Connectivity check
    pub async fn health(&self) -> Result<()> {
        self.db
            .health()
            .await
            .map_err(|e| DbError::Connection(e.to_string()))
    }
}

/// Strip query-syntax characters and canonicalize
fn seed_key(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if QUERY_SYNTAX_CHARS.contains(&c) { ' ' } else { c })
        .collect();
    Entity::canonicalize(&cleaned)
}

// ==========================================
// RECORD TYPES
// ==========================================

#[derive(Debug, Deserialize)]
struct SeedRow {
    canonical_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FactRecord {
    subject: String,
    relation: String,
    object: String,
    subject_key: String,
    object_key: String,
    #[serde(default)]
    source_doc_id: String,
    #[serde(default)]
    weight: Option<f32>,
}

impl FactRecord {
    fn into_fact(self, depth: usize) -> GraphFact {
        let mut fact = GraphFact::new(self.subject, self.relation, self.object)
            .with_source(self.source_doc_id)
            .at_depth(depth);
        fact.score = self.weight;
        fact
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChunkRecord {
    chunk_id: String,
    text: String,
    embedding: Vec<f32>,
    #[serde(default)]
    source_doc_id: String,
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        Self {
            chunk_id: chunk.id.clone(),
            text: chunk.text.clone(),
            embedding: chunk.embedding.clone(),
            source_doc_id: chunk.source_doc_id.clone(),
        }
    }
}

impl From<ChunkRecord> for Chunk {
    fn from(record: ChunkRecord) -> Self {
        Chunk::new(record.chunk_id, record.text)
            .with_embedding(record.embedding)
            .with_source(record.source_doc_id)
    }
}

// ==========================================
// RESULT TYPES
// ==========================================

/// One similarity-search hit
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkHit {
    pub chunk_id: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DbStats {
    #[serde(default)]
    pub entity_count: i64,
    #[serde(default)]
    pub fact_count: i64,
    #[serde(default)]
    pub chunk_count: i64,
}
