//! Simulation timing parameters.
//!
//! The engine consumes a resolved `SimConfig` value. Hosts that keep a
//! `config.toml` can build one with `SimConfig::load_or_default`, which
//! reads the `[speed]` table and falls back to defaults for anything
//! missing. Values are used as given, never range-checked.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ── Public Config Struct ──

/// All durations are in ticks except `tick_rate_ms`.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Serialize, Deserialize)]
pub struct SimConfig {
    /// Wall-clock length of one tick, for the host loop.
    pub tick_rate_ms: u64,
    pub player_move_rate: u32,
    pub guard_move_rate: u32,
    pub dig_duration: u32,
    /// Age at which an open hole seals again.
    pub hole_regen_ticks: u32,
    pub trap_escape_ticks: u32,
    pub guard_respawn_ticks: u32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            tick_rate_ms: default_tick_rate(),
            player_move_rate: default_player_move(),
            guard_move_rate: default_guard_move(),
            dig_duration: default_dig_duration(),
            hole_regen_ticks: DEFAULT_HOLE_OPEN + DEFAULT_HOLE_CLOSE,
            trap_escape_ticks: default_trap_escape(),
            guard_respawn_ticks: default_guard_respawn(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },
    #[error("bad config: {0}")]
    Parse(#[from] toml::de::Error),
}

// ── TOML Schema (with serde defaults) ──

#[derive(Deserialize, Debug, Default)]
struct TomlConfig {
    #[serde(default)]
    speed: TomlSpeed,
}

#[derive(Deserialize, Debug)]
struct TomlSpeed {
    #[serde(default = "default_tick_rate")]
    tick_rate_ms: u64,
    #[serde(default = "default_player_move")]
    player_move_rate: u32,
    #[serde(default = "default_guard_move")]
    guard_move_rate: u32,
    #[serde(default = "default_dig_duration")]
    dig_duration: u32,
    hole_regen_ticks: Option<u32>,
    // older config files split the hole lifetime in two phases
    hole_open_ticks: Option<u32>,
    hole_close_ticks: Option<u32>,
    #[serde(default = "default_trap_escape")]
    trap_escape_ticks: u32,
    #[serde(default = "default_guard_respawn")]
    guard_respawn_ticks: u32,
}

// ── Defaults ──

const DEFAULT_HOLE_OPEN: u32 = 100;
const DEFAULT_HOLE_CLOSE: u32 = 20;

fn default_tick_rate() -> u64 { 75 }
fn default_player_move() -> u32 { 2 }
fn default_guard_move() -> u32 { 5 }
fn default_dig_duration() -> u32 { 5 }
fn default_trap_escape() -> u32 { 70 }   // escapes well before the hole seals
fn default_guard_respawn() -> u32 { 40 }

impl Default for TomlSpeed {
    fn default() -> Self {
        TomlSpeed {
            tick_rate_ms: default_tick_rate(),
            player_move_rate: default_player_move(),
            guard_move_rate: default_guard_move(),
            dig_duration: default_dig_duration(),
            hole_regen_ticks: None,
            hole_open_ticks: None,
            hole_close_ticks: None,
            trap_escape_ticks: default_trap_escape(),
            guard_respawn_ticks: default_guard_respawn(),
        }
    }
}

impl From<TomlSpeed> for SimConfig {
    fn from(s: TomlSpeed) -> Self {
        let hole_regen_ticks = match (s.hole_regen_ticks, s.hole_open_ticks, s.hole_close_ticks) {
            (Some(regen), _, _) => regen,
            (None, None, None) => DEFAULT_HOLE_OPEN + DEFAULT_HOLE_CLOSE,
            (None, open, close) => {
                open.unwrap_or(DEFAULT_HOLE_OPEN) + close.unwrap_or(DEFAULT_HOLE_CLOSE)
            }
        };
        SimConfig {
            tick_rate_ms: s.tick_rate_ms,
            player_move_rate: s.player_move_rate,
            guard_move_rate: s.guard_move_rate,
            dig_duration: s.dig_duration,
            hole_regen_ticks,
            trap_escape_ticks: s.trap_escape_ticks,
            guard_respawn_ticks: s.guard_respawn_ticks,
        }
    }
}

// ── Loading ──

impl SimConfig {
    /// Parse config text. Unknown tables and keys are ignored.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let parsed: TomlConfig = toml::from_str(text)?;
        Ok(parsed.speed.into())
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.to_path_buf(), source })?;
        Self::from_toml_str(&text)
    }

    /// Like `load_from`, but any failure yields the defaults.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load_from(path) {
            Ok(config) => {
                log::debug!("loaded config from {}", path.display());
                config
            }
            Err(e) => {
                log::warn!("{e}; using default speeds");
                SimConfig::default()
            }
        }
    }
}
