//! The `VectorStore` trait defines the interface for every documentation
//! store backend (Supabase REST, in-memory test doubles).

use async_trait::async_trait;
use ka_domain::error::Result;

use crate::types::{MatchRequest, PageChunk, PageMatch, SampleRow};

/// Abstraction over the page-chunk table and its similarity-search RPC.
///
/// All methods return `ka_domain::error::Result`.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Total number of rows in `table`.
    async fn count_rows(&self, table: &str) -> Result<u64>;

    /// First row of `table` (`id, url, title`), or `None` when it is empty.
    async fn sample_row(&self, table: &str) -> Result<Option<SampleRow>>;

    /// Similarity search, ranked by descending similarity.
    async fn match_pages(&self, req: MatchRequest) -> Result<Vec<PageMatch>>;

    /// Every page URL, optionally restricted to one `metadata.source`.
    /// May contain duplicates (one entry per chunk).
    async fn list_page_urls(&self, source: Option<&str>) -> Result<Vec<String>>;

    /// All chunks stored for `url`, optionally restricted to one source.
    async fn page_chunks(&self, url: &str, source: Option<&str>) -> Result<Vec<PageChunk>>;
}
