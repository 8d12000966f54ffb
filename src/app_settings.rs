use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::error::{EngineError, Result};

/// Settings that control the world layout, the default group parameters and
/// the runner loop.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineSettings {
    /// Width of the toroidal world in cells
    pub width: usize,
    /// Height of the toroidal world in cells
    pub height: usize,
    /// Number of particle groups; the rule set holds `groups * groups` rules
    pub groups: usize,
    /// Initial velocity cap of every group (-1 disables the cap)
    pub velocity_cap: f64,
    /// Lower bound of the interaction range of every group
    pub range_min: f64,
    /// Initial upper bound of the interaction range of every group
    pub range_max: f64,
    /// Particles spawned per group when the world is created
    pub initial_particles: usize,
    /// Divisor applied to integer rule values before they become strengths
    pub rule_scale: f64,
    /// Velocity multiplier applied to every particle after each tick
    pub friction: f64,
    /// Threads in the rule worker pool, `None` uses one per logical CPU
    pub worker_threads: Option<usize>,
    /// Seed for cell sampling, `None` seeds from the OS
    pub seed: Option<u64>,
    /// Consecutive failed samples before an add gives up, `None` scales with the grid
    pub max_spawn_attempts: Option<usize>,
    /// Ticks the headless runner executes before exiting
    pub run_ticks: u64,
    /// Tick rate the headless runner paces itself to
    pub target_tps: f64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            width: 1200,
            height: 900,
            groups: 5,
            velocity_cap: 5.0,
            range_min: 0.0,
            range_max: 90.0,
            initial_particles: 0,
            rule_scale: 200.0,
            friction: 0.9,
            worker_threads: None,
            seed: None,
            max_spawn_attempts: None,
            run_ticks: 600,
            target_tps: 60.0,
        }
    }
}

impl EngineSettings {
    const SETTINGS_FILE: &'static str = "settings.toml";

    /// Loads settings from `settings.toml`, or returns defaults if the file doesn't exist
    pub fn load() -> Result<Self> {
        Self::load_from(Self::SETTINGS_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let settings = if path.exists() {
            let contents = fs::read_to_string(path)?;
            Self::from_toml(&contents)?
        } else {
            log::info!("{} not found, using default settings", path.display());
            Self::default()
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 {
            return Err(EngineError::Settings(format!(
                "world must have non-zero dimensions, got {}x{}",
                self.width, self.height
            )));
        }
        // type ids are stored as u8 in snapshots, 0 meaning empty
        if self.groups == 0 || self.groups > u8::MAX as usize {
            return Err(EngineError::Settings(format!(
                "groups must be within 1..=255, got {}",
                self.groups
            )));
        }
        if !(self.rule_scale > 0.0) {
            return Err(EngineError::Settings(format!(
                "rule_scale must be positive, got {}",
                self.rule_scale
            )));
        }
        if self.worker_threads == Some(0) {
            return Err(EngineError::Settings("worker_threads must be at least 1".into()));
        }
        // a particle sits at distance zero from itself, so the lower bound must exclude it
        if !(self.range_min >= 0.0 && self.range_min.is_finite()) {
            return Err(EngineError::Settings(format!(
                "range_min must be a finite non-negative distance, got {}",
                self.range_min
            )));
        }
        if self.range_max.is_nan() {
            return Err(EngineError::Settings("range_max must be a number".into()));
        }
        if !self.velocity_cap.is_finite() {
            return Err(EngineError::Settings(format!(
                "velocity_cap must be finite, got {}",
                self.velocity_cap
            )));
        }
        if !self.friction.is_finite() {
            return Err(EngineError::Settings(format!("friction must be finite, got {}", self.friction)));
        }
        if !(self.target_tps > 0.0 && self.target_tps.is_finite()) {
            return Err(EngineError::Settings(format!(
                "target_tps must be positive and finite, got {}",
                self.target_tps
            )));
        }
        Ok(())
    }

    pub fn cell_count(&self) -> usize {
        self.width * self.height
    }

    pub fn rule_count(&self) -> usize {
        self.groups * self.groups
    }

    pub fn spawn_attempts(&self) -> usize {
        self.max_spawn_attempts
            .unwrap_or_else(|| self.cell_count().saturating_mul(8).max(64))
    }

    pub fn worker_threads(&self) -> usize {
        self.worker_threads.unwrap_or_else(num_cpus::get)
    }
}
