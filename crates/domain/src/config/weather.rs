use serde::{Deserialize, Serialize};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Weather agent (geocode.maps.co + tomorrow.io)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherConfig {
    #[serde(default = "d_geocode_url")]
    pub geocode_url: String,
    #[serde(default = "d_weather_url")]
    pub weather_url: String,
    /// Overridden by `GEOCODE_API_KEY`. When absent the geocoding tool
    /// answers with a fixed dummy coordinate.
    #[serde(default)]
    pub geocode_api_key: Option<String>,
    /// Overridden by `TOMORROW_IO_API_KEY`. When absent the weather tool
    /// answers with a fixed dummy forecast.
    #[serde(default)]
    pub weather_api_key: Option<String>,
    /// Chat model override for the weather agent. Falls back to `llm.model`.
    #[serde(default)]
    pub model: Option<String>,
    /// Question asked when `kbagent weather` is run without one.
    #[serde(default = "d_question")]
    pub default_question: String,
    #[serde(default = "d_20000")]
    pub timeout_ms: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            geocode_url: d_geocode_url(),
            weather_url: d_weather_url(),
            geocode_api_key: None,
            weather_api_key: None,
            model: None,
            default_question: d_question(),
            timeout_ms: 20_000,
        }
    }
}

fn d_geocode_url() -> String {
    "https://geocode.maps.co/search".into()
}

fn d_weather_url() -> String {
    "https://api.tomorrow.io/v4/weather/realtime".into()
}

fn d_question() -> String {
    "What is the weather like in London and in Wiltshire?".into()
}

fn d_20000() -> u64 {
    20_000
}
