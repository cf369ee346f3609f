//! Embedding chunk persistence and the pgvector cosine-similarity query
//! behind `hub-rag`. The `<=>` operator is pgvector's cosine *distance*;
//! similarity is `1.0 - distance`.

use crate::{Store, StoreError};
use hub_core::domain::EmbeddingChunk;
use pgvector::Vector;
use sqlx::Row;
use uuid::Uuid;

/// A chunk returned from a similarity search, carrying its own similarity
/// score so callers can merge results from multiple KBs by score.
#[derive(Clone, Debug)]
pub struct ScoredChunk {
    pub chunk: EmbeddingChunk,
    pub similarity: f32,
}

impl Store {
    /// Inserts an embedding chunk after checking its vector length matches
    /// the KB's declared dimension — a mismatch is a fatal ingest error
    /// per `SPEC_FULL.md` §3.1, not silently truncated or padded.
    pub async fn insert_embedding_chunk(
        &self,
        chunk: &EmbeddingChunk,
        kb_dimension: usize,
    ) -> Result<(), StoreError> {
        if chunk.vector.len() != kb_dimension {
            return Err(StoreError::DimensionMismatch {
                expected: kb_dimension,
                actual: chunk.vector.len(),
            });
        }

        sqlx::query(
            "INSERT INTO embedding_chunks (id, document_id, kb_id, chunk_index, content, vector, token_count) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(chunk.id)
        .bind(chunk.document_id)
        .bind(chunk.kb_id)
        .bind(chunk.chunk_index)
        .bind(&chunk.content)
        .bind(Vector::from(chunk.vector.clone()))
        .bind(chunk.token_count)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Cosine-similarity search within one KB, honoring `threshold` and
    /// `max_results`. Returns results ordered by similarity descending.
    pub async fn similarity_search(
        &self,
        kb_id: Uuid,
        query_vector: &[f32],
        threshold: f32,
        max_results: usize,
    ) -> Result<Vec<ScoredChunk>, StoreError> {
        let query = Vector::from(query_vector.to_vec());
        let rows = sqlx::query(
            "SELECT id, document_id, kb_id, chunk_index, content, vector, token_count, \
             1 - (vector <=> $1) AS similarity \
             FROM embedding_chunks WHERE kb_id = $2 \
             AND 1 - (vector <=> $1) >= $3 \
             ORDER BY vector <=> $1 ASC LIMIT $4",
        )
        .bind(&query)
        .bind(kb_id)
        .bind(threshold)
        .bind(max_results as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r: sqlx::postgres::PgRow| {
                let vector: Vector = r.get("vector");
                ScoredChunk {
                    chunk: EmbeddingChunk {
                        id: r.get("id"),
                        document_id: r.get("document_id"),
                        kb_id: r.get("kb_id"),
                        chunk_index: r.get("chunk_index"),
                        content: r.get("content"),
                        vector: vector.to_vec(),
                        token_count: r.get("token_count"),
                    },
                    similarity: r.get("similarity"),
                }
            })
            .collect())
    }
}
