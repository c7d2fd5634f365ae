//! SurrealDB schema definitions

use crate::{DbConnection, DbError, Result};
use tracing::info;

/// Initialize the database schema
pub async fn initialize_schema(db: &DbConnection) -> Result<()> {
    info!("Initializing database schema...");

    // Define tables and fields
    db.query(SCHEMA_DEFINITION)
        .await?
        .check()
        .map_err(|e| DbError::SchemaInit(e.to_string()))?;

    info!("Schema initialized successfully");
    Ok(())
}

const SCHEMA_DEFINITION: &str = r#"
-- ============================================
-- GRAPH NODES
-- ============================================

-- Canonical entities (one node per canonical name)
DEFINE TABLE IF NOT EXISTS entity SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS name ON entity TYPE string;
DEFINE FIELD IF NOT EXISTS canonical_name ON entity TYPE string;
DEFINE FIELD IF NOT EXISTS entity_type ON entity TYPE string DEFAULT 'concept';

-- ============================================
-- GRAPH EDGES
-- ============================================

-- Extracted relationships. Endpoints are stored by canonical name so a
-- traversal hop is a single indexed lookup on either side.
DEFINE TABLE IF NOT EXISTS fact SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS subject ON fact TYPE string;
DEFINE FIELD IF NOT EXISTS relation ON fact TYPE string;
DEFINE FIELD IF NOT EXISTS object ON fact TYPE string;
DEFINE FIELD IF NOT EXISTS subject_key ON fact TYPE string;
DEFINE FIELD IF NOT EXISTS object_key ON fact TYPE string;
DEFINE FIELD IF NOT EXISTS source_doc_id ON fact TYPE string DEFAULT '';
DEFINE FIELD IF NOT EXISTS weight ON fact TYPE option<float>;

-- ============================================
-- CHUNKS
-- ============================================

DEFINE TABLE IF NOT EXISTS chunk SCHEMAFULL;
DEFINE FIELD IF NOT EXISTS chunk_id ON chunk TYPE string;
DEFINE FIELD IF NOT EXISTS text ON chunk TYPE string;
DEFINE FIELD IF NOT EXISTS embedding ON chunk TYPE array<float>;
DEFINE FIELD IF NOT EXISTS source_doc_id ON chunk TYPE string DEFAULT '';

-- ============================================
-- INDEXES
-- ============================================

-- Entity lookups
DEFINE INDEX IF NOT EXISTS idx_entity_canonical ON entity FIELDS canonical_name UNIQUE;

-- Traversal hops
DEFINE INDEX IF NOT EXISTS idx_fact_subject ON fact FIELDS subject_key;
DEFINE INDEX IF NOT EXISTS idx_fact_object ON fact FIELDS object_key;

-- Chunk lookups
DEFINE INDEX IF NOT EXISTS idx_chunk_id ON chunk FIELDS chunk_id UNIQUE;
"#;
