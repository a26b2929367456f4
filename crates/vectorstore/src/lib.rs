//! `ka-vectorstore`: access to the crawled documentation store.
//!
//! Provides the [`VectorStore`] trait that abstracts over the page-chunk
//! table and its similarity-search function, a Supabase/PostgREST
//! implementation ([`SupabaseClient`]), and the typed rows it returns.
//!
//! # Quick start
//!
//! ```rust,no_run
//! use ka_domain::config::SupabaseConfig;
//! use ka_vectorstore::{MatchRequest, SupabaseClient, VectorStore};
//!
//! # async fn example(embedding: Vec<f32>) -> ka_domain::error::Result<()> {
//! let cfg = SupabaseConfig {
//!     url: Some("https://xyz.supabase.co".into()),
//!     service_key: Some("service-role-key".into()),
//!     ..Default::default()
//! };
//! let client = SupabaseClient::new(&cfg)?;
//!
//! let matches = client
//!     .match_pages(MatchRequest::new(embedding, 3))
//!     .await?;
//!
//! println!("found {} chunks", matches.len());
//! # Ok(())
//! # }
//! ```

pub mod store;
pub mod supabase;
pub mod types;

pub use store::VectorStore;
pub use supabase::SupabaseClient;
pub use types::{MatchRequest, PageChunk, PageMatch, SampleRow};
