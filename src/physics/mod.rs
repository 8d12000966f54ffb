//! The world: particle groups, occupancy grid and the tick that moves them.

pub mod grid;
pub mod parameters;
pub mod rule;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use std::sync::Arc;
use std::time::Instant;

use crate::app_settings::EngineSettings;
use crate::error::{EngineError, Result};
use crate::particle::{Particle, Position};

pub use grid::{wrap, OccupancyGrid, ParticleHandle};
pub use parameters::Parameters;
pub use rule::{compute_delta, Rule, RuleSet};

/// Dense copy of the grid taken after a tick: 0 marks an empty cell, any
/// other value is the id of the occupying particle's type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorldSnapshot {
    pub tick: u64,
    pub width: usize,
    pub height: usize,
    pub cells: Vec<u8>,
    /// Particle count per group, in group order.
    pub population: Vec<usize>,
}

impl WorldSnapshot {
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.cells[y * self.width + x]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[u8]> + '_ {
        self.cells.chunks(self.width)
    }

    pub fn to_rows(&self) -> Vec<Vec<u8>> {
        self.rows().map(<[u8]>::to_vec).collect()
    }

    pub fn count_of(&self, type_id: u8) -> usize {
        self.cells.iter().filter(|&&cell| cell == type_id).count()
    }

    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell != 0).count()
    }
}

pub struct World {
    groups: Vec<Vec<Particle>>,
    params: Arc<Parameters>,
    grid: OccupancyGrid,
    pool: rayon::ThreadPool,
    rng: StdRng,
    friction: f64,
    spawn_attempts: usize,
    tick_count: u64,
}

impl World {
    /// Builds an empty world and spawns `initial_particles` in every group.
    pub fn new(settings: &EngineSettings) -> Result<Self> {
        let rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(settings, rng)
    }

    pub fn with_rng(settings: &EngineSettings, rng: StdRng) -> Result<Self> {
        settings.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.worker_threads())
            .thread_name(|i| format!("rule-worker-{}", i))
            .build()?;

        let mut world = Self {
            groups: (0..settings.groups).map(|_| Vec::new()).collect(),
            params: Arc::new(Parameters::new(settings)),
            grid: OccupancyGrid::new(settings.width, settings.height),
            pool,
            rng,
            friction: settings.friction,
            spawn_attempts: settings.spawn_attempts(),
            tick_count: 0,
        };

        for group in 0..settings.groups {
            world.add_particles(group, settings.initial_particles)?;
        }
        log::info!(
            "world {}x{} with {} groups on {} rule workers",
            settings.width,
            settings.height,
            settings.groups,
            world.pool.current_num_threads()
        );
        Ok(world)
    }

    pub fn width(&self) -> usize {
        self.grid.width()
    }

    pub fn height(&self) -> usize {
        self.grid.height()
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    pub fn tick_count(&self) -> u64 {
        self.tick_count
    }

    pub fn params(&self) -> &Arc<Parameters> {
        &self.params
    }

    pub fn grid(&self) -> &OccupancyGrid {
        &self.grid
    }

    pub fn group(&self, group: usize) -> Result<&[Particle]> {
        self.groups
            .get(group)
            .map(Vec::as_slice)
            .ok_or_else(|| EngineError::group(group, self.groups.len()))
    }

    pub fn particle(&self, handle: ParticleHandle) -> Option<&Particle> {
        self.groups.get(handle.group)?.get(handle.index)
    }

    pub fn population(&self) -> Vec<usize> {
        self.groups.iter().map(Vec::len).collect()
    }

    pub fn total_particles(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    /// Runs one tick and returns the resulting snapshot.
    pub fn compute(&mut self) -> WorldSnapshot {
        self.tick();
        self.snapshot()
    }

    /// Applies every rule in parallel, then moves particles one by one.
    pub fn tick(&mut self) {
        let started = Instant::now();
        self.apply_rules();
        let rules_done = Instant::now();
        let moved = self.move_particles();
        self.tick_count += 1;

        log::debug!(
            "tick {}: rules {:.2}ms, movement {:.2}ms, {} of {} particles moved",
            self.tick_count,
            (rules_done - started).as_secs_f64() * 1000.0,
            rules_done.elapsed().as_secs_f64() * 1000.0,
            moved,
            self.total_particles()
        );
    }

    /// Returns once every rule has finished.
    fn apply_rules(&self) {
        let groups = &self.groups;
        let rules = self.params.rules();
        let width = self.grid.width() as f64;
        let height = self.grid.height() as f64;

        self.pool.install(|| {
            rules
                .as_slice()
                .par_iter()
                .for_each(|rule| rule.apply(groups, width, height));
        });
    }

    /// Moves each particle towards its tendency in group then insertion
    /// order. A move onto a cell held by another particle is vetoed and
    /// leaves position and tendency untouched. Friction applies either way.
    fn move_particles(&mut self) -> usize {
        let width = self.grid.width();
        let height = self.grid.height();
        let mut moved = 0;

        for (group, particles) in self.groups.iter_mut().enumerate() {
            for (index, particle) in particles.iter_mut().enumerate() {
                let handle = ParticleHandle { group, index };
                let tendency = particle.tendency();
                let target = (wrap(tendency.x, width), wrap(tendency.y, height));
                let current = particle.cell();

                match self.grid.get(target.0, target.1) {
                    Some(other) if other != handle => {}
                    _ => {
                        if self.grid.get(current.0, current.1) == Some(handle) {
                            self.grid.clear_cell(current.0, current.1);
                        }
                        self.grid.set(target.0, target.1, handle);
                        particle.move_to(target);
                        if target != current {
                            moved += 1;
                        }
                    }
                }

                particle.friction(self.friction);
            }
        }
        moved
    }

    pub fn snapshot(&self) -> WorldSnapshot {
        let mut cells = vec![0u8; self.grid.width() * self.grid.height()];
        for (x, y, handle) in self.grid.iter_occupied() {
            if let Some(particle) = self.particle(handle) {
                cells[y * self.grid.width() + x] = particle.kind().id();
            }
        }

        WorldSnapshot {
            tick: self.tick_count,
            width: self.grid.width(),
            height: self.grid.height(),
            cells,
            population: self.population(),
        }
    }

    /// Spawns `amount` particles of `group` on random free cells.
    ///
    /// Fails with `WorldFull` once no free cell can be found; particles
    /// placed before that point stay in the world.
    pub fn add_particles(&mut self, group: usize, amount: usize) -> Result<usize> {
        let kind = self.params.kind(group)?.clone();
        let width = self.grid.width();
        let height = self.grid.height();

        for placed in 0..amount {
            let full = || EngineError::WorldFull {
                group,
                placed,
                requested: amount,
            };
            if self.grid.is_full() {
                return Err(full());
            }

            let mut attempts = 0;
            let cell = loop {
                let x = self.rng.gen_range(0..width);
                let y = self.rng.gen_range(0..height);
                if self.grid.is_free(x, y) {
                    break (x, y);
                }
                attempts += 1;
                if attempts >= self.spawn_attempts {
                    return Err(full());
                }
            };

            let particles = &mut self.groups[group];
            let handle = ParticleHandle {
                group,
                index: particles.len(),
            };
            particles.push(Particle::new(kind.clone(), Position::new(cell.0 as f64, cell.1 as f64)));
            self.grid.set(cell.0, cell.1, handle);
        }

        if amount > 0 {
            log::info!("added {} particles to group {} ({} total)", amount, group, self.groups[group].len());
        }
        Ok(amount)
    }

    /// Places one particle of `group` on a chosen cell.
    pub fn insert_particle(&mut self, group: usize, cell: (usize, usize)) -> Result<ParticleHandle> {
        let kind = self.params.kind(group)?.clone();
        let (x, y) = cell;
        if x >= self.grid.width() || y >= self.grid.height() || !self.grid.is_free(x, y) {
            return Err(EngineError::CellUnavailable { x, y });
        }

        let particles = &mut self.groups[group];
        let handle = ParticleHandle {
            group,
            index: particles.len(),
        };
        particles.push(Particle::new(kind, Position::new(x as f64, y as f64)));
        self.grid.set(x, y, handle);
        Ok(handle)
    }

    /// Evicts up to `amount` of the oldest particles of `group` and rebuilds
    /// the grid from the survivors. Returns how many were removed.
    pub fn remove_particles(&mut self, group: usize, amount: usize) -> Result<usize> {
        let particles = self
            .groups
            .get_mut(group)
            .ok_or_else(|| EngineError::group(group, self.params.groups()))?;
        let removed = amount.min(particles.len());
        particles.drain(..removed);

        self.rebuild_grid();
        if removed > 0 {
            log::info!("removed {} particles from group {} ({} left)", removed, group, self.groups[group].len());
        }
        Ok(removed)
    }

    fn rebuild_grid(&mut self) {
        self.grid.clear();
        for (group, particles) in self.groups.iter().enumerate() {
            for (index, particle) in particles.iter().enumerate() {
                let (x, y) = particle.cell();
                if self.grid.is_free(x, y) {
                    self.grid.set(x, y, ParticleHandle { group, index });
                } else {
                    log::warn!("particle {}/{} shares cell ({}, {}) during rebuild", group, index, x, y);
                }
            }
        }
    }

    /// Checks that every particle sits on its own cell and every occupied
    /// cell points back at the particle resting there.
    pub fn grid_is_consistent(&self) -> bool {
        let mut seen = 0;
        for (x, y, handle) in self.grid.iter_occupied() {
            match self.particle(handle) {
                Some(particle) if particle.cell() == (x, y) => seen += 1,
                _ => return false,
            }
        }
        seen == self.total_particles()
    }

    pub fn change_rule(&self, index: usize, value: i32) -> Result<()> {
        self.params.change_rule(index, value)
    }

    pub fn change_velocity_cap(&self, group: usize, value: i32) -> Result<()> {
        self.params.change_velocity_cap(group, value)
    }

    pub fn change_range(&self, group: usize, value: i32) -> Result<()> {
        self.params.change_range(group, value)
    }
}
