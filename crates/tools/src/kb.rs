//! Knowledge-base tools over the crawled documentation store.
//!
//! Failures are reported back to the model as text instead of failing the
//! run, so it can still answer (or admit it found nothing).

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use ka_domain::error::{Error, Result};
use ka_domain::tool::ToolDefinition;
use ka_providers::{EmbeddingsRequest, LlmProvider};
use ka_vectorstore::{MatchRequest, VectorStore};
use serde::Deserialize;
use serde_json::Value;

use crate::tool::{parse_args, Tool, ToolError};

pub const NO_DOCUMENTATION: &str = "No relevant documentation found.";

/// Dependency bundle for the knowledge-base agent.
#[derive(Clone)]
pub struct KbDeps {
    pub store: Arc<dyn VectorStore>,
    pub embedder: Arc<dyn LlmProvider>,
    pub embedding_model: String,
    pub match_count: u32,
    /// Restrict every lookup to one `metadata.source`.
    pub source_filter: Option<String>,
}

impl KbDeps {
    /// Embed `text` with the configured embedding model.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let resp = self
            .embedder
            .embeddings(EmbeddingsRequest {
                input: vec![text.to_owned()],
                model: Some(self.embedding_model.clone()),
            })
            .await?;
        resp.embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider {
                provider: self.embedder.provider_id().to_owned(),
                message: "embeddings response contained no vectors".into(),
            })
    }

    fn source(&self) -> Option<&str> {
        self.source_filter.as_deref()
    }
}

/// The three knowledge-base tools, in the order they are advertised.
pub fn kb_tools() -> Vec<Arc<dyn Tool<KbDeps>>> {
    vec![
        Arc::new(RetrieveRelevantDocumentation),
        Arc::new(ListDocumentationPages),
        Arc::new(GetPageContent),
    ]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// retrieve_relevant_documentation
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct RetrieveRelevantDocumentation;

#[derive(Deserialize)]
struct RetrieveArgs {
    user_query: String,
}

impl RetrieveRelevantDocumentation {
    async fn retrieve(deps: &KbDeps, query: &str) -> Result<String> {
        let embedding = deps.embed(query).await?;
        let req = MatchRequest::new(embedding, deps.match_count).with_source(deps.source());
        let matches = deps.store.match_pages(req).await?;

        if matches.is_empty() {
            return Ok(NO_DOCUMENTATION.to_owned());
        }

        let chunks: Vec<String> = matches
            .iter()
            .map(|m| format!("# {}\n\n{}", m.title, m.content))
            .collect();
        Ok(chunks.join("\n\n---\n\n"))
    }
}

#[async_trait]
impl Tool<KbDeps> for RetrieveRelevantDocumentation {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "retrieve_relevant_documentation".into(),
            description: "Retrieve relevant documentation chunks based on the query with RAG."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "user_query": {
                        "type": "string",
                        "description": "The user's question or query"
                    }
                },
                "required": ["user_query"]
            }),
        }
    }

    async fn call(&self, deps: &KbDeps, args: Value) -> std::result::Result<Value, ToolError> {
        let args: RetrieveArgs = parse_args(args)?;
        let text = match Self::retrieve(deps, &args.user_query).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(error = %e, "documentation retrieval failed");
                format!("Error retrieving documentation: {e}")
            }
        };
        Ok(Value::String(text))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// list_documentation_pages
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct ListDocumentationPages;

#[async_trait]
impl Tool<KbDeps> for ListDocumentationPages {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "list_documentation_pages".into(),
            description: "Retrieve a list of all available documentation pages.".into(),
            parameters: serde_json::json!({"type": "object", "properties": {}}),
        }
    }

    async fn call(&self, deps: &KbDeps, _args: Value) -> std::result::Result<Value, ToolError> {
        let urls = match deps.store.list_page_urls(deps.source()).await {
            Ok(urls) => urls.into_iter().collect::<BTreeSet<_>>(),
            Err(e) => {
                tracing::warn!(error = %e, "listing documentation pages failed");
                BTreeSet::new()
            }
        };
        Ok(Value::Array(urls.into_iter().map(Value::String).collect()))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_page_content
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetPageContent;

#[derive(Deserialize)]
struct PageArgs {
    url: String,
}

impl GetPageContent {
    async fn page(deps: &KbDeps, url: &str) -> Result<String> {
        let mut chunks = deps.store.page_chunks(url, deps.source()).await?;
        if chunks.is_empty() {
            return Ok(format!("No content found for URL: {url}"));
        }
        chunks.sort_by_key(|c| c.chunk_number);

        // Chunk titles look like "<page> - <section>"; keep the page part.
        let page_title = chunks[0]
            .title
            .split(" - ")
            .next()
            .unwrap_or_default()
            .to_owned();

        let mut parts = vec![format!("# {page_title}\n")];
        parts.extend(chunks.into_iter().map(|c| c.content));
        Ok(parts.join("\n\n"))
    }
}

#[async_trait]
impl Tool<KbDeps> for GetPageContent {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_page_content".into(),
            description: "Retrieve the full content of a specific documentation page by \
                          combining all its chunks."
                .into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "url": {
                        "type": "string",
                        "description": "The URL of the page to retrieve"
                    }
                },
                "required": ["url"]
            }),
        }
    }

    async fn call(&self, deps: &KbDeps, args: Value) -> std::result::Result<Value, ToolError> {
        let args: PageArgs = parse_args(args)?;
        let text = match Self::page(deps, &args.url).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(url = %args.url, error = %e, "page content lookup failed");
                format!("Error retrieving page content: {e}")
            }
        };
        Ok(Value::String(text))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
