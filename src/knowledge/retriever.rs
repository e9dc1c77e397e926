//! Retrieval of grounding context for a task
//!
//! Rewrites the task into a manual-style query, searches the site's
//! knowledge base and asks the model for a grounded how-to. Every failure
//! ends in `None`; retrieval never blocks a task.

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core::config::RagConfig;
use crate::core::{Message, Result};
use crate::knowledge::chunker::{Chunk, Chunker};
use crate::knowledge::document::load_documents;
use crate::knowledge::embedding::{Embedder, EmbeddingMode};
use crate::knowledge::index::EmbeddingIndex;
use crate::llm::{GenerateOptions, LLMProvider, TokenUsage};

const QUERY_REWRITE_PROMPT: &str = "Assume the role of a retrieval assistant. When a user provides a web-related task, analyze the task's intent and decide how to retrieve information from a corresponding operations manual. Remember, the manual typically won't include keywords specified in the task.

Analyze the user-given task and map it to potential retrieval actions using the general principles outlined in the manual.

# Steps
1. **Understand User Intent:** Identify the core task the user wants to accomplish.
2. **Generalize Keywords:** Convert specific keywords in the task into general concepts that can be found in the manual.
3. **Search Manual:** Identify relevant sections or instructions in the manual that align with these general concepts.
4. **Formulate Retrieval Queries:** Craft precise queries or actions needed based on the manual's contents to accomplish the user's task.

# Output Format
Provide clear instructions on which sections or topics of the manual the retrieval actions correspond to. Present the output in a concise list format, corresponding to each relevant action or inquiry.

# Examples
- **Task:** In Google, search for news related to neural networks for image processing within the year 2024 and compile the top 5 articles.
- **Website:** www.google.com
- **Output:**
  - Methods for Google searches.
  - Procedures for querying results within specified timeframes.";

const GROUNDING_PROMPT: &str = "You are an assistant designed to help other agents navigate and operate on a webpage. Based on the provided knowledge base, identify relevant information and infer detailed steps necessary to complete the operation. If no relevant information exists in the knowledge base, respond with \"No data available\" to prevent misleading the original agent's decision-making process.

# Knowledge Base Usage Guidelines
1. **Based on the Knowledge Base**: All responses must be grounded in the information provided in the knowledge base. If multiple relevant entries exist, select the most contextually appropriate one for your reply and reasoning.
2. **No Relevant Information**: If the knowledge base lacks the data to answer the query, reply with exactly: No data available
3. **Avoid Speculations**: Do not speculate about scenarios or details not mentioned in the knowledge base.
4. **Step-by-Step Reasoning**: Clearly outline all necessary steps to complete the operation based on the knowledge base and list these steps in a logical sequence.

# Response Format
1. **Relevant Knowledge Base Summary**: Include cited content and its contextual relevance.
2. **Operational Logic Reasoning**: Combine the knowledge base content to explain the overall thought process involved in the operation.
3. **Operational Steps**: List concrete and concise steps in sequential order.

The following is the knowledge base: {context} The above is the knowledge base.";

/// A grounded answer and how it was produced
#[derive(Debug, Clone)]
pub struct RetrievedContext {
    /// The grounding model's reply, possibly the no-data sentinel
    pub answer: String,
    pub query: String,
    pub mode: EmbeddingMode,
    pub chunks_searched: usize,
    /// Tokens spent on the rewrite and grounding calls
    pub usage: TokenUsage,
}

pub struct Retriever {
    llm: Arc<dyn LLMProvider>,
    model: String,
    embedder: Embedder,
    chunker: Chunker,
    knowledge_root: PathBuf,
    top_k: usize,
}

impl Retriever {
    pub fn new(
        llm: Arc<dyn LLMProvider>,
        model: impl Into<String>,
        embedder: Embedder,
        config: &RagConfig,
    ) -> Self {
        Self {
            llm,
            model: model.into(),
            embedder,
            chunker: Chunker::from_config(config),
            knowledge_root: config.knowledge_root.clone(),
            top_k: config.top_k,
        }
    }

    /// Grounding text for a task, or `None` when nothing usable was found
    pub async fn build_context(&self, task: &str, site_url: &str, site_name: &str) -> Option<String> {
        self.retrieve(task, site_url, site_name)
            .await
            .map(|context| context.answer)
    }

    /// Run the full pipeline, swallowing every error
    pub async fn retrieve(&self, task: &str, site_url: &str, site_name: &str) -> Option<RetrievedContext> {
        match self.try_retrieve(task, site_url, site_name).await {
            Ok(context) => context,
            Err(e) => {
                warn!(site = site_name, error = %e, "retrieval failed, continuing without context");
                None
            }
        }
    }

    async fn try_retrieve(
        &self,
        task: &str,
        site_url: &str,
        site_name: &str,
    ) -> Result<Option<RetrievedContext>> {
        let mut usage = TokenUsage::default();
        let query = self.rewrite_query(task, site_url, &mut usage).await;
        info!(query = %query, "retrieval query");

        let dir = self.knowledge_root.join(site_name);
        let documents = load_documents(&dir)?;
        if documents.is_empty() {
            info!(dir = %dir.display(), "no knowledge documents for site");
            return Ok(None);
        }

        let chunks = self.chunker.chunk_all(&documents);
        if chunks.is_empty() {
            return Ok(None);
        }

        let texts: Vec<String> = chunks.iter().map(Chunk::embedding_text).collect();
        let embeddings = self.embedder.embed(&texts).await;
        let query_vector = self.embedder.embed_query(&query, &embeddings).await;
        let mode = embeddings.mode;

        let index = EmbeddingIndex::build(chunks, embeddings.vectors)?;
        let hits = index.search(&query_vector, self.top_k)?;
        let hit_chunks: Vec<&Chunk> = hits.iter().map(|h| h.chunk).collect();
        let context = assemble_context(&hit_chunks);
        debug!(hits = hits.len(), ?mode, "assembled retrieval context");

        let messages = vec![
            Message::system(GROUNDING_PROMPT.replace("{context}", &context)),
            Message::user(task_question(task, site_url)),
        ];
        let response = self
            .llm
            .chat(&self.model, &messages, Some(GenerateOptions::default()))
            .await?;
        usage.accumulate(&response.usage_or_default());

        Ok(Some(RetrievedContext {
            answer: response.content.trim().to_string(),
            query,
            mode,
            chunks_searched: index.len(),
            usage,
        }))
    }

    /// Ask the model for a manual-style query; falls back to a template
    async fn rewrite_query(&self, task: &str, site_url: &str, usage: &mut TokenUsage) -> String {
        let messages = vec![
            Message::system(QUERY_REWRITE_PROMPT),
            Message::user(task_question(task, site_url)),
        ];
        match self.llm.chat(&self.model, &messages, None).await {
            Ok(response) if !response.content.trim().is_empty() => {
                usage.accumulate(&response.usage_or_default());
                response.content.trim().to_string()
            }
            Ok(_) => fallback_query(task, site_url),
            Err(e) => {
                warn!(error = %e, "query rewrite failed, using template query");
                fallback_query(task, site_url)
            }
        }
    }
}

fn task_question(task: &str, site_url: &str) -> String {
    format!(
        "I need to complete the task of '{}' on the '{}' website. What are the most likely methods to achieve this? \n",
        task, site_url
    )
}

pub fn fallback_query(task: &str, site_url: &str) -> String {
    format!("How to complete the task of '{}' on '{}' website", task, site_url)
}

/// Group hits by document in first-hit order, restore chunk order within
/// each document, and number the blocks
pub fn assemble_context(hits: &[&Chunk]) -> String {
    let mut groups: Vec<(&str, Vec<&Chunk>)> = Vec::new();
    for chunk in hits {
        match groups.iter_mut().find(|(document, _)| *document == chunk.document) {
            Some((_, members)) => members.push(chunk),
            None => groups.push((chunk.document.as_str(), vec![chunk])),
        }
    }

    let mut out = String::new();
    let mut n = 0;
    for (_, mut members) in groups {
        members.sort_by_key(|c| c.ordinal);
        for chunk in members {
            let block = chunk.render();
            if block.trim().is_empty() {
                continue;
            }
            n += 1;
            out.push_str(&format!("\n\n[DOCUMENT {}]\n{}", n, block));
        }
    }
    out
}
