pub mod chat;
pub mod probe;
pub mod weather;

use std::path::Path;

use anyhow::Context;
use clap::{Parser, Subcommand};

use ka_domain::config::{Config, ConfigSeverity};

/// kbagent: a documentation RAG chat, a weather agent and a connectivity probe.
#[derive(Debug, Parser)]
#[command(name = "kbagent", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Chat with the knowledge-base expert (default when no subcommand is given).
    Chat,
    /// Ask the weather agent one question and print the answer.
    Weather {
        /// The question to ask. Defaults to `weather.default_question`.
        question: Option<String>,
    },
    /// Check connectivity to the vector store and the embedding API.
    Probe,
    /// Print version information.
    Version,
}

// ── Config loading helper ─────────────────────────────────────────────

/// Load the configuration from the path in `KA_CONFIG` (or `config.toml`),
/// after pulling a `.env` file into the environment. Environment variables
/// override values from the file.
pub fn load_config() -> anyhow::Result<(Config, String)> {
    dotenvy::dotenv().ok();

    let config_path = std::env::var("KA_CONFIG").unwrap_or_else(|_| "config.toml".into());
    let config = load_config_from(Path::new(&config_path), |name| std::env::var(name).ok())?;

    Ok((config, config_path))
}

/// Parse `path` when it exists (defaults otherwise) and overlay `lookup`.
///
/// Fails when validation reports any error-severity issue; warnings are
/// printed and loading continues.
pub fn load_config_from(
    path: &Path,
    lookup: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Config> {
    let mut config = if path.exists() {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
    } else {
        Config::default()
    };

    config.apply_env_with(lookup);

    // Tracing is not up yet, so issues go straight to stderr.
    let issues = config.validate();
    for issue in &issues {
        eprintln!("config: {issue}");
    }
    let errors: Vec<&str> = issues
        .iter()
        .filter(|i| i.severity == ConfigSeverity::Error)
        .map(|i| i.field.as_str())
        .collect();
    if !errors.is_empty() {
        anyhow::bail!(
            "config validation failed with {} error(s): {}",
            errors.len(),
            errors.join(", ")
        );
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml"), |_| None).unwrap();
        assert_eq!(cfg.supabase.table, "site_pages");
        assert!(cfg.llm.api_key.is_none());
    }

    #[test]
    fn env_overrides_file_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[llm]\nmodel = \"gpt-4o\"\n\n[supabase]\nurl = \"https://file.supabase.co\"\n",
        )
        .unwrap();

        let cfg = load_config_from(&path, |name| match name {
            "SUPABASE_URL" => Some("https://env.supabase.co".into()),
            _ => None,
        })
        .unwrap();

        assert_eq!(cfg.llm.model, "gpt-4o");
        assert_eq!(cfg.supabase.url.as_deref(), Some("https://env.supabase.co"));
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[llm\nmodel = ").unwrap();

        let err = load_config_from(&path, |_| None).unwrap_err();
        assert!(err.to_string().starts_with("parsing"));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "[supabase]\nmatch_count = 0\n\n[observability]\nsample_rate = 5.0\n",
        )
        .unwrap();

        let err = load_config_from(&path, |_| None).unwrap_err().to_string();
        assert!(err.starts_with("config validation failed with 2 error(s)"), "{err}");
        assert!(err.contains("supabase.match_count"), "{err}");
        assert!(err.contains("observability.sample_rate"), "{err}");
    }

    #[test]
    fn warnings_alone_do_not_block_loading() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config_from(&dir.path().join("absent.toml"), |_| None).unwrap();
        assert!(cfg
            .validate()
            .iter()
            .all(|i| i.severity == ConfigSeverity::Warning));
    }

    #[test]
    fn cli_defaults_to_no_subcommand() {
        let cli = Cli::try_parse_from(["kbagent"]).unwrap();
        assert!(cli.command.is_none());

        let cli = Cli::try_parse_from(["kbagent", "weather", "Is it raining in Reykjavik?"]).unwrap();
        match cli.command {
            Some(Command::Weather { question }) => {
                assert_eq!(question.as_deref(), Some("Is it raining in Reykjavik?"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
