//! `kbagent weather`: one question to the weather agent, answer on stdout.

use std::sync::Arc;

use anyhow::Context;

use ka_agent::{weather_agent, Agent};
use ka_domain::config::Config;
use ka_providers::util::mask_secret;
use ka_providers::OpenAiCompatProvider;
use ka_tools::WeatherDeps;

pub async fn run(config: &Config, question: Option<String>) -> anyhow::Result<()> {
    match &config.llm.api_key {
        Some(key) => eprintln!("OpenAI API Key loaded: {}", mask_secret(key, 8)),
        None => eprintln!("No OpenAI API Key found!"),
    }

    let question = question.unwrap_or_else(|| config.weather.default_question.clone());

    let provider = OpenAiCompatProvider::from_config(&config.llm).context("building the LLM client")?;
    let agent = weather_agent(Arc::new(provider), config);
    let deps = WeatherDeps::from_config(&config.weather).context("building the weather client")?;

    let answer = agent.run(&question, &deps, Vec::new()).await?;
    println!("Response: {answer}");
    Ok(())
}
