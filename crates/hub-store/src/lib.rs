//! Postgres-backed persistence for every entity in `hub_core::domain`,
//! plus the pgvector cosine-similarity query behind the RAG engine.
//! Conversation access follows a cache-then-hydrate shape, built on plain
//! `sqlx::query`/`sqlx::query_as` against Postgres so the vector column
//! and `ON CONFLICT` upsert semantics are available.

mod error;

pub mod catalog;
pub mod conversations;
pub mod messages;
pub mod tools;
pub mod vectors;

pub use error::StoreError;
pub use vectors::ScoredChunk;

use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Handle to the connection pool, shared by every submodule as `&Store`.
#[derive(Clone)]
pub struct Store {
    pub(crate) pool: PgPool,
}

impl Store {
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        Ok(Store { pool })
    }

    /// For tests and embedding in a larger app that already owns a pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Store { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
