//! Retrieval-augmented generation: resolves the knowledge bases bound to
//! a flow, embeds the query, runs pgvector similarity search through
//! `hub-store`, and renders a prompt-ready context block.

mod engine;
mod error;

pub use engine::{RagContext, RagEngine, RetrievedChunk};
pub use error::RagError;
