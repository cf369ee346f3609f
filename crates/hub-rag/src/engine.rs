//! Knowledge-base resolution, query embedding, and similarity search.
//! Turns a user query into a prompt-ready context block. A RAG failure
//! must never fail the turn — callers get `Ok(None)` or an empty block
//! on any internal error, logged at `warn`.

use std::collections::HashMap;
use std::sync::Arc;

use hub_core::domain::{FlowKbBinding, KnowledgeBase};
use hub_embedder::ProviderConfig;
use hub_store::{ScoredChunk, Store};
use tracing::warn;
use uuid::Uuid;

use crate::RagError;

/// Default number of chunks kept after merging across KBs, per
/// `SPEC_FULL.md` §4.4 step 5.
const DEFAULT_TOP_N: usize = 8;

/// One chunk selected into the final context block, carrying enough
/// provenance to render a `[Source i] {title} / {content}` line.
#[derive(Clone, Debug)]
pub struct RetrievedChunk {
    pub kb_name: String,
    pub document_title: String,
    pub content: String,
    pub similarity: f32,
    pub binding_priority: i32,
}

/// Result of one retrieval pass: the formatted block ready to splice
/// into a system prompt, plus the chunks it was built from (for
/// analytics / debugging).
#[derive(Clone, Debug, Default)]
pub struct RagContext {
    pub block: String,
    pub chunks: Vec<RetrievedChunk>,
}

impl RagContext {
    pub fn empty() -> Self {
        RagContext::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

pub struct RagEngine {
    store: Arc<Store>,
    embedding_providers: HashMap<String, ProviderConfig>,
    top_n: usize,
}

impl RagEngine {
    pub fn new(store: Arc<Store>, embedding_providers: HashMap<String, ProviderConfig>) -> Self {
        RagEngine {
            store,
            embedding_providers,
            top_n: DEFAULT_TOP_N,
        }
    }

    pub fn with_top_n(mut self, top_n: usize) -> Self {
        self.top_n = top_n;
        self
    }

    /// Retrieves context for `query` within the KBs bound to `flow_id`.
    /// `kb_subset`, if given, restricts retrieval to that set of KB ids.
    /// Never propagates an error to the turn loop — internal failures are
    /// logged and an empty context returned instead.
    pub async fn retrieve(&self, flow_id: Uuid, query: &str, kb_subset: Option<&[Uuid]>) -> RagContext {
        match self.retrieve_inner(flow_id, query, kb_subset).await {
            Ok(ctx) => ctx,
            Err(e) => {
                warn!(flow_id = %flow_id, error = %e, "RAG retrieval failed, continuing without context");
                RagContext::empty()
            }
        }
    }

    async fn retrieve_inner(
        &self,
        flow_id: Uuid,
        query: &str,
        kb_subset: Option<&[Uuid]>,
    ) -> Result<RagContext, RagError> {
        let bindings = self.resolve_bindings(flow_id, kb_subset).await?;
        if bindings.is_empty() {
            return Ok(RagContext::empty());
        }

        let (bindings, kbs) = self.load_active_kbs(&bindings).await?;
        if kbs.is_empty() {
            return Ok(RagContext::empty());
        }

        let model = self.shared_embedding_model(&kbs)?;

        if query.trim().is_empty() {
            // Empty query short-circuits to a zero-vector result — never
            // call the embedding API with an empty string.
            return Ok(RagContext::empty());
        }

        let embedder = hub_embedder::create_provider(&model, &self.embedding_providers)?;
        let vectors = embedder.embed(&[query.to_string()], &model).await?;
        let query_vector = vectors.into_iter().next().unwrap_or_default();

        let mut candidates: Vec<RetrievedChunk> = Vec::new();
        for (binding, kb) in bindings.iter().zip(kbs.iter()) {
            let scored = self
                .store
                .similarity_search(kb.id, &query_vector, binding.similarity_threshold, binding.max_results)
                .await?;
            for ScoredChunk { chunk, similarity } in scored {
                let title = match self.store.get_document(chunk.document_id).await {
                    Ok(Some(doc)) => doc.source,
                    _ => chunk.document_id.to_string(),
                };
                candidates.push(RetrievedChunk {
                    kb_name: kb.name.clone(),
                    document_title: title,
                    content: chunk.content,
                    similarity,
                    binding_priority: binding.priority,
                });
            }
        }

        candidates.sort_by(|a, b| {
            a.binding_priority
                .cmp(&b.binding_priority)
                .then(b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal))
        });
        candidates.truncate(self.top_n);

        let block = format_context_block(&candidates);
        Ok(RagContext { block, chunks: candidates })
    }

    async fn resolve_bindings(
        &self,
        flow_id: Uuid,
        kb_subset: Option<&[Uuid]>,
    ) -> Result<Vec<FlowKbBinding>, RagError> {
        let mut bindings = self.store.flow_kb_bindings(flow_id).await?;
        if let Some(subset) = kb_subset {
            bindings.retain(|b| subset.contains(&b.kb_id));
        }
        Ok(bindings)
    }

    /// Loads the KB for each binding, dropping bindings whose KB is
    /// missing or inactive (and keeping the two lists index-aligned).
    async fn load_active_kbs(
        &self,
        bindings: &[FlowKbBinding],
    ) -> Result<(Vec<FlowKbBinding>, Vec<KnowledgeBase>), RagError> {
        let mut aligned_bindings = Vec::with_capacity(bindings.len());
        let mut kbs = Vec::with_capacity(bindings.len());
        for binding in bindings {
            if let Some(kb) = self.store.get_knowledge_base(binding.kb_id).await? {
                if kb.active {
                    aligned_bindings.push(binding.clone());
                    kbs.push(kb);
                }
            }
        }
        Ok((aligned_bindings, kbs))
    }

    fn shared_embedding_model(&self, kbs: &[KnowledgeBase]) -> Result<String, RagError> {
        let first = kbs.first().ok_or(RagError::NoKnowledgeBases)?;
        for other in &kbs[1..] {
            if other.embedding_model != first.embedding_model {
                return Err(RagError::MismatchedEmbeddingModel(
                    first.embedding_model.clone(),
                    other.embedding_model.clone(),
                ));
            }
        }
        Ok(first.embedding_model.clone())
    }
}

/// Renders the merged chunk list as `[Source i] {title} / {content}`
/// blocks, grouped under a per-KB header, separated by a stable rule.
fn format_context_block(chunks: &[RetrievedChunk]) -> String {
    if chunks.is_empty() {
        return String::new();
    }

    let mut out = String::new();
    let mut last_kb: Option<&str> = None;
    for (i, chunk) in chunks.iter().enumerate() {
        if last_kb != Some(chunk.kb_name.as_str()) {
            if last_kb.is_some() {
                out.push_str("---\n");
            }
            out.push_str(&format!("## Knowledge base: {}\n", chunk.kb_name));
            last_kb = Some(chunk.kb_name.as_str());
        }
        out.push_str(&format!(
            "[Source {}] {} / {}\n",
            i + 1,
            chunk.document_title,
            chunk.content
        ));
    }
    out
}
