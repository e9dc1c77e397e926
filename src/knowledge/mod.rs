//! Knowledge module - retrieval-augmented grounding
//!
//! Loads a site's manual and recorded action logs, chunks and embeds them,
//! and produces a grounded how-to for the task.

pub mod chunker;
pub mod document;
pub mod embedding;
pub mod index;
pub mod retriever;
pub mod splitter;

pub use chunker::{chunk_documents, Chunk, ChunkBody, Chunker, StepRange};
pub use document::{load_documents, DocumentKind, KnowledgeDocument};
pub use embedding::{Embedder, EmbeddingMode, Embeddings};
pub use index::{EmbeddingIndex, ScoredChunk};
pub use retriever::{RetrievedContext, Retriever};

/// Exact reply the grounding model gives when the knowledge base has nothing
pub const NO_DATA_SENTINEL: &str = "No data available";

/// Whether a grounding reply is the no-data signal
pub fn is_no_data(reply: &str) -> bool {
    reply.contains(NO_DATA_SENTINEL)
}
