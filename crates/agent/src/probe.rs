//! Connectivity probe for the documentation store and the embedding API.
//!
//! Each check runs inside its own failure boundary; the only dependency
//! between them is the embedding vector, which the similarity search needs.

use std::sync::Arc;

use ka_domain::config::Config;
use ka_domain::error::Result;
use ka_providers::{EmbeddingsRequest, LlmProvider, OpenAiCompatProvider};
use ka_vectorstore::{MatchRequest, SupabaseClient, VectorStore};

/// Question embedded by the embedding check.
pub const PROBE_QUESTION: &str = "What student services are available at UNAK?";

/// Rows requested from the similarity search check.
pub const PROBE_MATCH_COUNT: u32 = 3;

#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    Passed(String),
    Failed(String),
    /// Not attempted because an earlier check produced nothing to work with.
    Skipped(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckResult {
    pub name: &'static str,
    pub outcome: CheckOutcome,
    /// Extra lines shown under the check (sample rows, warnings).
    pub details: Vec<String>,
}

impl CheckResult {
    fn passed(name: &'static str, detail: String, details: Vec<String>) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Passed(detail),
            details,
        }
    }

    fn failed(name: &'static str, detail: String) -> Self {
        Self {
            name,
            outcome: CheckOutcome::Failed(detail),
            details: Vec::new(),
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self.outcome, CheckOutcome::Failed(_))
    }
}

/// Whether one of the relevant settings is present.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvStatus {
    pub name: &'static str,
    pub set: bool,
}

#[derive(Debug, Clone)]
pub struct ProbeReport {
    /// Client construction; when it fails no other check runs.
    pub clients: CheckResult,
    pub checks: Vec<CheckResult>,
    pub env: Vec<EnvStatus>,
}

impl ProbeReport {
    pub fn all_passed(&self) -> bool {
        !self.clients.is_failure() && !self.checks.iter().any(CheckResult::is_failure)
    }
}

/// Everything the three checks talk to.
pub struct ProbeTargets<'a> {
    pub store: &'a dyn VectorStore,
    pub embedder: &'a dyn LlmProvider,
    pub table: &'a str,
    pub embedding_model: &'a str,
}

/// Build the real clients from `cfg` and run every check.
pub async fn run_probe(cfg: &Config) -> ProbeReport {
    let env = env_summary(cfg);

    let clients = match build_clients(cfg) {
        Ok(clients) => clients,
        Err(e) => {
            return ProbeReport {
                clients: CheckResult::failed("Client initialization", e.to_string()),
                checks: Vec::new(),
                env,
            };
        }
    };
    let (store, embedder) = clients;

    let checks = run_checks(ProbeTargets {
        store: store.as_ref(),
        embedder: embedder.as_ref(),
        table: &cfg.supabase.table,
        embedding_model: &cfg.llm.embedding_model,
    })
    .await;

    ProbeReport {
        clients: CheckResult::passed(
            "Client initialization",
            "clients initialized successfully".into(),
            Vec::new(),
        ),
        checks,
        env,
    }
}

fn build_clients(cfg: &Config) -> Result<(Arc<dyn VectorStore>, Arc<dyn LlmProvider>)> {
    let store = SupabaseClient::new(&cfg.supabase)?;
    let embedder = OpenAiCompatProvider::from_config(&cfg.llm)?;
    Ok((Arc::new(store), Arc::new(embedder)))
}

/// Row count, embedding, similarity search, in that order.
pub async fn run_checks(targets: ProbeTargets<'_>) -> Vec<CheckResult> {
    let mut results = Vec::with_capacity(3);

    results.push(check_rows(&targets).await);

    let (embedding_check, embedding) = check_embedding(&targets).await;
    results.push(embedding_check);

    results.push(match embedding {
        Some(vector) => check_search(&targets, vector).await,
        None => CheckResult {
            name: "Vector search",
            outcome: CheckOutcome::Skipped("no embedding vector to search with".into()),
            details: Vec::new(),
        },
    });

    results
}

async fn check_rows(t: &ProbeTargets<'_>) -> CheckResult {
    const NAME: &str = "Database query";

    let count = match t.store.count_rows(t.table).await {
        Ok(count) => count,
        Err(e) => return CheckResult::failed(NAME, format!("failed to query {}: {e}", t.table)),
    };

    let details = match t.store.sample_row(t.table).await {
        Ok(Some(row)) => vec![
            "Sample entry:".to_owned(),
            format!("ID: {}", row.id),
            format!("URL: {}", row.url),
            format!("Title: {}", row.title),
        ],
        Ok(None) => vec!["Table is empty! Need to run the crawler first.".to_owned()],
        Err(e) => vec![format!("Could not read a sample row: {e}")],
    };

    CheckResult::passed(
        NAME,
        format!("Connected to database. Found {count} rows in {} table", t.table),
        details,
    )
}

async fn check_embedding(t: &ProbeTargets<'_>) -> (CheckResult, Option<Vec<f32>>) {
    const NAME: &str = "Embedding generation";

    let req = EmbeddingsRequest {
        input: vec![PROBE_QUESTION.to_owned()],
        model: Some(t.embedding_model.to_owned()),
    };
    match t.embedder.embeddings(req).await {
        Ok(resp) => match resp.embeddings.into_iter().next() {
            Some(vector) => (
                CheckResult::passed(
                    NAME,
                    format!("Generated embedding vector of size {}", vector.len()),
                    Vec::new(),
                ),
                Some(vector),
            ),
            None => (
                CheckResult::failed(NAME, "response contained no embedding".into()),
                None,
            ),
        },
        Err(e) => (
            CheckResult::failed(NAME, format!("failed to generate embedding: {e}")),
            None,
        ),
    }
}

async fn check_search(t: &ProbeTargets<'_>, vector: Vec<f32>) -> CheckResult {
    const NAME: &str = "Vector search";

    match t
        .store
        .match_pages(MatchRequest::new(vector, PROBE_MATCH_COUNT))
        .await
    {
        Ok(matches) => {
            let details = match matches.first() {
                Some(m) => vec![
                    "Sample result:".to_owned(),
                    format!("Title: {}", m.title),
                    format!("URL: {}", m.url),
                    format!("Similarity: {:.2}", m.similarity),
                ],
                None => Vec::new(),
            };
            CheckResult::passed(
                NAME,
                format!("Vector search successful. Found {} matches", matches.len()),
                details,
            )
        }
        Err(e) => CheckResult::failed(NAME, format!("failed to perform vector search: {e}")),
    }
}

/// `Set` / `Not set` for the settings the probe depends on.
pub fn env_summary(cfg: &Config) -> Vec<EnvStatus> {
    use ka_domain::config::{ENV_OPENAI_API_KEY, ENV_SUPABASE_SERVICE_KEY, ENV_SUPABASE_URL};

    vec![
        EnvStatus {
            name: ENV_SUPABASE_URL,
            set: cfg.supabase.url.is_some(),
        },
        EnvStatus {
            name: ENV_SUPABASE_SERVICE_KEY,
            set: cfg.supabase.service_key.is_some(),
        },
        EnvStatus {
            name: ENV_OPENAI_API_KEY,
            set: cfg.llm.api_key.is_some(),
        },
    ]
}
