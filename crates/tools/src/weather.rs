//! Weather tools: geocode.maps.co for coordinates, tomorrow.io for current
//! conditions.
//!
//! A missing API key is not an error: each tool answers with a fixed dummy
//! value and makes no network call.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ka_domain::config::WeatherConfig;
use ka_domain::error::{Error, Result};
use ka_domain::tool::ToolDefinition;
use ka_providers::util::from_reqwest;
use serde::Deserialize;
use serde_json::Value;
use tracing::Instrument;

use crate::tool::{parse_args, Tool, ToolError};

/// Coordinates returned when no geocoding key is configured.
pub const DUMMY_LAT: f64 = 51.1;
pub const DUMMY_LNG: f64 = -0.1;

/// Dependency bundle for the weather agent.
#[derive(Debug, Clone)]
pub struct WeatherDeps {
    pub client: reqwest::Client,
    pub geocode_url: String,
    pub weather_url: String,
    pub geo_api_key: Option<String>,
    pub weather_api_key: Option<String>,
}

impl WeatherDeps {
    pub fn from_config(cfg: &WeatherConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(from_reqwest)?;

        Ok(Self {
            client,
            geocode_url: cfg.geocode_url.clone(),
            weather_url: cfg.weather_url.clone(),
            geo_api_key: cfg.geocode_api_key.clone(),
            weather_api_key: cfg.weather_api_key.clone(),
        })
    }

    async fn get_json(&self, url: &str, params: &[(&str, String)]) -> Result<Value> {
        let resp = self
            .client
            .get(url)
            .query(params)
            .send()
            .await
            .map_err(from_reqwest)?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(Error::Http(format!("{url} returned {}: {body}", status.as_u16())));
        }
        resp.json().await.map_err(from_reqwest)
    }
}

/// `get_lat_lng` then `get_weather`.
pub fn weather_tools() -> Vec<Arc<dyn Tool<WeatherDeps>>> {
    vec![Arc::new(GetLatLng), Arc::new(GetWeather)]
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_lat_lng
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetLatLng;

#[derive(Deserialize)]
struct LatLngArgs {
    location_description: String,
}

#[async_trait]
impl Tool<WeatherDeps> for GetLatLng {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_lat_lng".into(),
            description: "Get the latitude and longitude of a location.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "location_description": {
                        "type": "string",
                        "description": "A description of a location."
                    }
                },
                "required": ["location_description"]
            }),
        }
    }

    async fn call(&self, deps: &WeatherDeps, args: Value) -> std::result::Result<Value, ToolError> {
        let args: LatLngArgs = parse_args(args)?;

        let Some(key) = deps.geo_api_key.as_deref() else {
            return Ok(serde_json::json!({"lat": DUMMY_LAT, "lng": DUMMY_LNG}));
        };

        let params = [
            ("q", args.location_description.clone()),
            ("api_key", key.to_owned()),
        ];
        let data = deps
            .get_json(&deps.geocode_url, &params)
            .instrument(tracing::debug_span!(
                "geocode.call",
                location = %args.location_description
            ))
            .await?;

        match first_candidate(&data) {
            Some(Ok((lat, lng))) => Ok(serde_json::json!({"lat": lat, "lng": lng})),
            Some(Err(e)) => Err(ToolError::Failed(e)),
            None => Err(ToolError::Retry("Could not find the location".into())),
        }
    }
}

/// Coordinates of the first geocoding candidate. `None` when there is none.
///
/// geocode.maps.co reports `lat`/`lon` as strings; numbers are accepted too.
fn first_candidate(data: &Value) -> Option<Result<(f64, f64)>> {
    let first = data.as_array()?.first()?;
    let coords = coordinate(first.get("lat")).zip(coordinate(first.get("lon")));
    Some(coords.ok_or_else(|| Error::Tool {
        tool: "get_lat_lng".into(),
        message: format!("geocode candidate without usable coordinates: {first}"),
    }))
}

fn coordinate(v: Option<&Value>) -> Option<f64> {
    match v? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// get_weather
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct GetWeather;

#[async_trait]
impl Tool<WeatherDeps> for GetWeather {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: "get_weather".into(),
            description: "Get the weather at a location.".into(),
            parameters: serde_json::json!({
                "type": "object",
                "properties": {
                    "lat": {"type": "number", "description": "Latitude of the location."},
                    "lng": {"type": "number", "description": "Longitude of the location."}
                },
                "required": ["lat", "lng"]
            }),
        }
    }

    async fn call(&self, deps: &WeatherDeps, args: Value) -> std::result::Result<Value, ToolError> {
        let (Some(lat), Some(lng)) = (coordinate(args.get("lat")), coordinate(args.get("lng")))
        else {
            return Err(ToolError::Retry(
                "invalid arguments: `lat` and `lng` must be numbers".into(),
            ));
        };

        let Some(key) = deps.weather_api_key.as_deref() else {
            return Ok(serde_json::json!({"temperature": "21 °C", "description": "Sunny"}));
        };

        let params = [
            ("apikey", key.to_owned()),
            ("location", format!("{lat},{lng}")),
            ("units", "metric".to_owned()),
        ];
        let data = deps
            .get_json(&deps.weather_url, &params)
            .instrument(tracing::debug_span!("weather.call", lat, lng))
            .await?;

        let values = &data["data"]["values"];
        let apparent = values["temperatureApparent"].as_f64().ok_or_else(|| Error::Tool {
            tool: "get_weather".into(),
            message: "response has no data.values.temperatureApparent".into(),
        })?;
        let description = values["weatherCode"]
            .as_i64()
            .map(weather_description)
            .unwrap_or("Unknown");

        Ok(serde_json::json!({
            "temperature": format_temperature(apparent),
            "description": description,
        }))
    }
}

pub fn format_temperature(celsius: f64) -> String {
    format!("{celsius:.0}°C")
}

/// tomorrow.io weather code → human description.
pub fn weather_description(code: i64) -> &'static str {
    match code {
        1000 => "Clear, Sunny",
        1100 => "Mostly Clear",
        1101 => "Partly Cloudy",
        1102 => "Mostly Cloudy",
        1001 => "Cloudy",
        2000 => "Fog",
        2100 => "Light Fog",
        4000 => "Drizzle",
        4001 => "Rain",
        4200 => "Light Rain",
        4201 => "Heavy Rain",
        5000 => "Snow",
        5001 => "Flurries",
        5100 => "Light Snow",
        5101 => "Heavy Snow",
        6000 => "Freezing Drizzle",
        6001 => "Freezing Rain",
        6200 => "Light Freezing Rain",
        6201 => "Heavy Freezing Rain",
        7000 => "Ice Pellets",
        7101 => "Heavy Ice Pellets",
        7102 => "Light Ice Pellets",
        8000 => "Thunderstorm",
        _ => "Unknown",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Tests
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
