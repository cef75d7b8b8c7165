//! World state, the tick step, events and persistence.

pub mod event;
pub mod level;
pub mod save;
pub mod step;
pub mod world;
