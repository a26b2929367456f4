//! Shared utility functions for provider adapters.

use ka_domain::error::Error;

/// Convert a [`reqwest::Error`] into the domain [`Error`] type.
///
/// Timeout errors map to [`Error::Timeout`]; everything else maps to
/// [`Error::Http`].
pub fn from_reqwest(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Mask a secret for display: the first `visible` characters followed by `...`.
///
/// Short secrets are fully masked.
pub fn mask_secret(secret: &str, visible: usize) -> String {
    if secret.chars().count() <= visible {
        return "***".into();
    }
    let prefix: String = secret.chars().take(visible).collect();
    format!("{prefix}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mask_keeps_prefix() {
        assert_eq!(mask_secret("sk-proj-abcdefgh", 8), "sk-proj-...");
    }

    #[test]
    fn mask_hides_short_secret() {
        assert_eq!(mask_secret("short", 8), "***");
    }

    #[tokio::test]
    async fn request_errors_map_to_http() {
        let err = reqwest::Client::new()
            .get("not a url")
            .send()
            .await
            .map_err(from_reqwest)
            .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "{err:?}");
    }
}
