//! The two agents the binary ships: a knowledge-base expert and a weather
//! assistant.

use std::sync::Arc;

use ka_domain::config::Config;
use ka_providers::LlmProvider;
use ka_tools::{kb_tools, weather_tools, KbDeps, WeatherDeps};
use ka_vectorstore::VectorStore;

use crate::agent::ToolAgent;

pub const WEATHER_SYSTEM_PROMPT: &str = "Be concise, reply with one sentence. \
    Use the `get_lat_lng` tool to get the latitude and longitude of the locations, \
    then use the `get_weather` tool to get the weather.";

/// System prompt for the documentation expert over the knowledge base `title`.
pub fn kb_system_prompt(title: &str) -> String {
    format!(
        "You are an expert on the {title}, a documentation knowledge base built \
         from crawled web pages. You have access to all of its pages, including \
         examples, reference material and other resources, to help answer questions.\n\n\
         Your only job is to assist with this knowledge base; don't answer questions \
         about anything else.\n\n\
         Don't ask the user before taking an action, just do it. Always make sure you \
         look at the documentation with the provided tools before answering, unless \
         you have already done so.\n\n\
         Start with retrieve_relevant_documentation (RAG). Also check the list of \
         available documentation pages and fetch the content of a page when that \
         helps.\n\n\
         Always let the user know when you didn't find the answer in the \
         documentation or the right URL - be honest."
    )
}

/// The RAG expert agent, configured from the `[llm]` and `[chat]` sections.
pub fn kb_agent(provider: Arc<dyn LlmProvider>, cfg: &Config) -> ToolAgent<KbDeps> {
    let prompt = cfg
        .chat
        .system_prompt
        .clone()
        .unwrap_or_else(|| kb_system_prompt(&cfg.chat.title));

    ToolAgent::new(provider, prompt)
        .with_model(cfg.llm.model.clone())
        .with_temperature(cfg.llm.temperature)
        .with_tools(kb_tools())
        .with_max_retries(cfg.chat.max_tool_retries)
}

/// Dependency bundle for [`kb_agent`]. Built once per chat session.
pub fn kb_deps(
    cfg: &Config,
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn LlmProvider>,
) -> KbDeps {
    KbDeps {
        store,
        embedder,
        embedding_model: cfg.llm.embedding_model.clone(),
        match_count: cfg.supabase.match_count,
        source_filter: cfg.supabase.source_filter.clone(),
    }
}

/// The weather agent. Uses `weather.model` when set, else `llm.model`.
pub fn weather_agent(provider: Arc<dyn LlmProvider>, cfg: &Config) -> ToolAgent<WeatherDeps> {
    ToolAgent::new(provider, WEATHER_SYSTEM_PROMPT)
        .with_model(cfg.weather_model())
        .with_temperature(cfg.llm.temperature)
        .with_tools(weather_tools())
        .with_max_retries(crate::agent::DEFAULT_MAX_RETRIES)
}
