//! Typed rows and request bodies for the documentation store.

use serde::{Deserialize, Serialize};

// ── Similarity search ────────────────────────────────────────────────

/// Arguments of the `match_site_pages` function.
#[derive(Debug, Clone, Serialize)]
pub struct MatchRequest {
    pub query_embedding: Vec<f32>,
    pub match_count: u32,
    /// JSONB containment filter on `metadata`, `{}` for none.
    pub filter: serde_json::Value,
}

impl MatchRequest {
    /// A request with an empty filter.
    pub fn new(query_embedding: Vec<f32>, match_count: u32) -> Self {
        Self {
            query_embedding,
            match_count,
            filter: serde_json::json!({}),
        }
    }

    /// Restrict matches to chunks whose `metadata.source` equals `source`.
    pub fn with_source(mut self, source: Option<&str>) -> Self {
        self.filter = match source {
            Some(s) => serde_json::json!({ "source": s }),
            None => serde_json::json!({}),
        };
        self
    }
}

/// A ranked row returned by the similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageMatch {
    #[serde(default)]
    pub id: Option<serde_json::Value>,
    pub url: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub similarity: f64,
    #[serde(default)]
    pub chunk_number: Option<i64>,
}

// ── Table reads ──────────────────────────────────────────────────────

/// `id, url, title` of one row, used as a connectivity sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleRow {
    pub id: serde_json::Value,
    pub url: String,
    #[serde(default)]
    pub title: String,
}

/// One stored chunk of a crawled page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageChunk {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub chunk_number: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_request_serializes_filter() {
        let req = MatchRequest::new(vec![0.1, 0.2], 3);
        let v = serde_json::to_value(&req).unwrap();
        assert_eq!(v["match_count"], 3);
        assert_eq!(v["filter"], serde_json::json!({}));

        let v = serde_json::to_value(req.with_source(Some("unak_docs"))).unwrap();
        assert_eq!(v["filter"]["source"], "unak_docs");
    }

    #[test]
    fn page_match_tolerates_missing_optional_columns() {
        let m: PageMatch = serde_json::from_str(
            r#"{"url":"https://unak.is/en","title":"Home","similarity":0.83}"#,
        )
        .unwrap();
        assert_eq!(m.url, "https://unak.is/en");
        assert!(m.content.is_empty());
        assert!(m.chunk_number.is_none());
    }
}
