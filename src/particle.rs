//! Particles, their group types and the per-particle velocity update.

use nalgebra::Vector2;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

pub type Position = Vector2<f64>;
pub type Velocity = Vector2<f64>;

/// Velocity cap value that disables clamping.
pub const UNCAPPED: f64 = -1.0;

/// An `f64` that can be read and replaced from any thread without locking.
pub(crate) struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub(crate) fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub(crate) fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub(crate) fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl fmt::Debug for AtomicF64 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.load(), f)
    }
}

/// Parameters shared by every particle of one group.
///
/// `velocity_cap` and `range_max` can change while a tick is running; readers
/// see either the old or the new value.
#[derive(Debug)]
pub struct ParticleType {
    id: u8,
    velocity_cap: AtomicF64,
    range_min: f64,
    range_max: AtomicF64,
}

impl ParticleType {
    pub fn new(id: u8, velocity_cap: f64, range_min: f64, range_max: f64) -> Self {
        Self {
            id,
            velocity_cap: AtomicF64::new(velocity_cap),
            range_min,
            range_max: AtomicF64::new(range_max),
        }
    }

    pub fn id(&self) -> u8 {
        self.id
    }

    pub fn velocity_cap(&self) -> f64 {
        self.velocity_cap.load()
    }

    pub fn set_velocity_cap(&self, velocity_cap: f64) {
        self.velocity_cap.store(velocity_cap);
    }

    pub fn range_min(&self) -> f64 {
        self.range_min
    }

    pub fn range_max(&self) -> f64 {
        self.range_max.load()
    }

    pub fn set_range_max(&self, range_max: f64) {
        self.range_max.store(range_max);
    }

    /// Whether a particle of this type at `distance` exerts force.
    pub fn in_range(&self, distance: f64) -> bool {
        distance > self.range_min && distance < self.range_max()
    }

    /// Clamps one velocity component to the cap. Negative caps disable clamping.
    pub fn cap(&self, v: f64) -> f64 {
        let cap = self.velocity_cap();
        if cap < 0.0 {
            v
        } else {
            v.clamp(-cap, cap)
        }
    }
}

/// The part of a particle that rules mutate concurrently.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Motion {
    pub velocity: Velocity,
    /// Accumulated target position; only reconciled with the grid on a successful move.
    pub tendency: Position,
}

#[derive(Debug)]
pub struct Particle {
    kind: Arc<ParticleType>,
    position: Position,
    motion: Mutex<Motion>,
}

impl Particle {
    pub fn new(kind: Arc<ParticleType>, position: Position) -> Self {
        Self::with_velocity(kind, position, Velocity::zeros())
    }

    pub fn with_velocity(kind: Arc<ParticleType>, position: Position, velocity: Velocity) -> Self {
        Self {
            kind,
            position,
            motion: Mutex::new(Motion {
                velocity,
                tendency: position,
            }),
        }
    }

    pub fn kind(&self) -> &Arc<ParticleType> {
        &self.kind
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The grid cell the particle currently rests on.
    pub fn cell(&self) -> (usize, usize) {
        (self.position.x.floor() as usize, self.position.y.floor() as usize)
    }

    pub fn motion(&self) -> Motion {
        *self.lock_motion()
    }

    pub fn velocity(&self) -> Velocity {
        self.lock_motion().velocity
    }

    pub fn tendency(&self) -> Position {
        self.lock_motion().tendency
    }

    fn lock_motion(&self) -> MutexGuard<'_, Motion> {
        self.motion.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Blends `force * strength` into the velocity, clamps it to the type's
    /// cap and advances the tendency by the result.
    ///
    /// Safe to call from several rules at once; the update is serialized per particle.
    pub fn influence_velocity(&self, force: Velocity, strength: f64) {
        let mut motion = self.lock_motion();
        let blended = (motion.velocity + force * strength) / 2.0;
        motion.velocity = blended.map(|v| self.kind.cap(v));
        let step = motion.velocity;
        motion.tendency += step;
    }

    pub fn friction(&mut self, factor: f64) {
        let motion = self.motion.get_mut().unwrap_or_else(|poisoned| poisoned.into_inner());
        motion.velocity *= factor;
    }

    /// Snaps the position onto a grid cell. Tendency is left alone.
    pub(crate) fn move_to(&mut self, cell: (usize, usize)) {
        self.position = Position::new(cell.0 as f64, cell.1 as f64);
    }
}
