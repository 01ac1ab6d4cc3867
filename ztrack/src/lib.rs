// The changes suggested by this lint usually make the code more cluttered and less clear:
#![allow(clippy::needless_range_loop)]

pub mod dungeon;
pub mod graph;
pub mod prize;
mod propagate;
pub mod requirements;
pub mod sections;
pub mod settings;
pub mod tracker;

pub use settings::TrackerSettings;
pub use tracker::{StateChange, Tracker, TrackerEvent};
