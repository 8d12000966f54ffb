//! Directed force rules between particle groups.

use crate::particle::{AtomicF64, Particle, Velocity};

/// Signed displacement from `src` to `dst` along the shorter way around a
/// wrap-around axis of length `map_size`. Equal lengths resolve to the
/// positive direction.
pub fn compute_delta(src: f64, dst: f64, map_size: f64) -> f64 {
    let (increasing, decreasing) = if dst < src {
        (map_size + dst - src, src - dst)
    } else {
        (dst - src, map_size + src - dst)
    };

    if increasing <= decreasing {
        increasing
    } else {
        -decreasing
    }
}

/// Moves every particle of `source` in response to every particle of `influence`.
#[derive(Debug)]
pub struct Rule {
    source: usize,
    influence: usize,
    strength: AtomicF64,
}

impl Rule {
    pub fn new(source: usize, influence: usize, strength: f64) -> Self {
        Self {
            source,
            influence,
            strength: AtomicF64::new(strength),
        }
    }

    pub fn source(&self) -> usize {
        self.source
    }

    pub fn influence(&self) -> usize {
        self.influence
    }

    pub fn strength(&self) -> f64 {
        self.strength.load()
    }

    pub fn set_strength(&self, strength: f64) {
        self.strength.store(strength);
    }

    /// Sums unit vectors towards every in-range influence particle and feeds
    /// the total into each source particle. Range is taken from the
    /// influence particle's type. A zero strength still walks every pair.
    ///
    /// Coincident particles have no direction and are skipped whatever the range.
    pub fn apply(&self, groups: &[Vec<Particle>], width: f64, height: f64) {
        let strength = self.strength();
        let sources = &groups[self.source];
        let influences = &groups[self.influence];

        for a in sources {
            let pos_a = a.position();
            let mut force = Velocity::zeros();

            for b in influences {
                let pos_b = b.position();
                let delta = Velocity::new(
                    compute_delta(pos_a.x, pos_b.x, width),
                    compute_delta(pos_a.y, pos_b.y, height),
                );
                let distance = delta.norm();

                if distance > 0.0 && b.kind().in_range(distance) {
                    force += delta / distance;
                }
            }

            a.influence_velocity(force, strength);
        }
    }
}

/// All `groups * groups` rules, indexed `source * groups + influence`.
#[derive(Debug)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(groups: usize) -> Self {
        let rules = (0..groups)
            .flat_map(|source| (0..groups).map(move |influence| Rule::new(source, influence, 0.0)))
            .collect();
        Self { rules }
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Rule> {
        self.rules.get(index)
    }

    pub fn as_slice(&self) -> &[Rule] {
        &self.rules
    }
}
