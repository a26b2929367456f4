//! Agents and the conversational turn loop.
//!
//! - [`agent`]: the [`Agent`] streaming contract and [`ToolAgent`], a
//!   tool-calling loop over any [`ka_providers::LlmProvider`]
//! - [`presets`]: the knowledge-base expert and the weather agent
//! - [`turn`]: one user→assistant round-trip against a [`SessionHistory`]
//! - [`probe`]: connectivity checks for the store and the embedding API
//!
//! [`SessionHistory`]: ka_sessions::SessionHistory

pub mod agent;
pub mod presets;
pub mod probe;
pub mod turn;

pub use agent::{Agent, ToolAgent, MAX_TOOL_LOOPS};
pub use presets::{kb_agent, kb_deps, weather_agent, WEATHER_SYSTEM_PROMPT};
pub use probe::{run_checks, run_probe, CheckOutcome, CheckResult, ProbeReport, ProbeTargets};
pub use turn::{run_turn, TurnOptions, TurnOutcome, TurnRenderer};
