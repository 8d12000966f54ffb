//! Typed-particle simulation on a toroidal single-occupancy grid.
//!
//! Particles belong to groups; every ordered pair of groups has a rule whose
//! strength pulls or pushes one group relative to the other. A tick applies
//! all rules in parallel, then moves particles one by one onto free cells.

pub mod app_settings;
pub mod clock;
pub mod engine;
pub mod error;
pub mod particle;
pub mod physics;

pub use app_settings::EngineSettings;
pub use engine::{SimulationEngine, WorldUpdateListener};
pub use error::{EngineError, IndexKind, Result};
pub use particle::{Particle, ParticleType, Position, Velocity, UNCAPPED};
pub use physics::{World, WorldSnapshot};
