//! # Node Runner simulation core
//!
//! Deterministic tick engine for a tile-grid action puzzle: dig through
//! firewalls, collect tokens, dodge sentinels, climb out at the top.
//!
//! ```text
//!   host input ──▶ Intent ──▶ step(&mut World, Intent) ──▶ Vec<Event> ──▶ host render/sound
//!                                   │
//!                              SaveStore (slots 1-4, legacy save.dat)
//! ```
//!
//! The crate does no rendering, input or audio. Hosts build a `Level`,
//! resolve a `SimConfig`, construct a `World` and call `step` once per
//! `tick_rate_ms`. Logging goes through the `log` facade; install any
//! logger to see events at `debug`.

pub mod config;
pub mod domain;
pub mod sim;

#[cfg(test)]
mod testutil;

pub use config::{ConfigError, SimConfig};
pub use domain::entity::{ActorState, EntityId, EntityRef, Facing, Intent};
pub use domain::tile::{Cell, Grid, Tile};
pub use sim::event::{DeathCause, Event};
pub use sim::level::{Level, LevelError};
pub use sim::save::{LegacySave, PersistError, SaveStore, Slot};
pub use sim::step::step;
pub use sim::world::{Outcome, World};
