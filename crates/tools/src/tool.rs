use async_trait::async_trait;
use ka_domain::error::Error;
use ka_domain::tool::ToolDefinition;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// How a tool invocation went wrong.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// The model should fix its call and try again (bad arguments, a
    /// location that could not be found, ...).
    #[error("{0}")]
    Retry(String),

    /// Unrecoverable; the whole agent run fails with this error.
    #[error(transparent)]
    Failed(#[from] Error),
}

/// A callable tool bound to a dependency bundle `D`.
///
/// The bundle is borrowed for each call, so tools hold no connection state
/// of their own.
#[async_trait]
pub trait Tool<D: Sync>: Send + Sync {
    /// Name, description and JSON Schema advertised to the model.
    fn definition(&self) -> ToolDefinition;

    async fn call(&self, deps: &D, args: Value) -> Result<Value, ToolError>;

    fn name(&self) -> String {
        self.definition().name
    }
}

/// Deserialize tool arguments, asking the model to retry on mismatch.
pub fn parse_args<T: DeserializeOwned>(args: Value) -> Result<T, ToolError> {
    serde_json::from_value(args).map_err(|e| ToolError::Retry(format!("invalid arguments: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(serde::Deserialize)]
    struct Args {
        url: String,
    }

    #[test]
    fn parse_args_accepts_matching_shape() {
        let args: Args = parse_args(serde_json::json!({"url": "https://unak.is"})).unwrap();
        assert_eq!(args.url, "https://unak.is");
    }

    #[test]
    fn parse_args_mismatch_is_retry() {
        let err = parse_args::<Args>(serde_json::json!({"link": 1})).err().unwrap();
        assert!(matches!(err, ToolError::Retry(msg) if msg.contains("url")));
    }
}
