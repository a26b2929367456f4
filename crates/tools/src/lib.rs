//! Tools the agents can call.
//!
//! - [`kb`]: knowledge-base lookups over the crawled documentation store
//!   (`retrieve_relevant_documentation`, `list_documentation_pages`,
//!   `get_page_content`)
//! - [`weather`]: geocoding and current conditions (`get_lat_lng`,
//!   `get_weather`), answering with fixed values when no API key is set

pub mod kb;
pub mod tool;
pub mod weather;

pub use kb::{kb_tools, KbDeps};
pub use tool::{parse_args, Tool, ToolError};
pub use weather::{weather_tools, WeatherDeps};
