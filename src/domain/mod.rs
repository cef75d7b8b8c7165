//! Pure game model: tiles, entities, terrain queries, rules and AI.
//! Nothing here mutates a world; `sim::step` applies the results.

pub mod ai;
pub mod entity;
pub mod physics;
pub mod rules;
pub mod tile;
