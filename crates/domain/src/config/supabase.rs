use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Supabase (PostgREST) vector store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupabaseConfig {
    /// Project URL, e.g. `https://xyz.supabase.co`. Overridden by `SUPABASE_URL`.
    #[serde(default)]
    pub url: Option<String>,
    /// Service-role key. Overridden by `SUPABASE_SERVICE_KEY`.
    #[serde(default)]
    pub service_key: Option<String>,
    /// Table holding the crawled page chunks.
    #[serde(default = "d_table")]
    pub table: String,
    /// Postgres function performing the similarity search.
    #[serde(default = "d_match_function")]
    pub match_function: String,
    /// Number of chunks the retrieval tool asks for.
    #[serde(default = "d_5")]
    pub match_count: u32,
    /// Value of `metadata->>source` to restrict retrieval to.
    /// `None` searches every source.
    #[serde(default)]
    pub source_filter: Option<String>,
    #[serde(default = "d_8000")]
    pub timeout_ms: u64,
    #[serde(default = "d_3")]
    pub max_retries: u32,
}

impl Default for SupabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            service_key: None,
            table: d_table(),
            match_function: d_match_function(),
            match_count: 5,
            source_filter: None,
            timeout_ms: 8000,
            max_retries: 3,
        }
    }
}

fn d_table() -> String {
    "site_pages".into()
}

fn d_match_function() -> String {
    "match_site_pages".into()
}

fn d_5() -> u32 {
    5
}

fn d_8000() -> u64 {
    8000
}

fn d_3() -> u32 {
    3
}
