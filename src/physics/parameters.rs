//! Tunable parameters shared between the world and whoever steers it.

use std::sync::Arc;

use crate::app_settings::EngineSettings;
use crate::error::{EngineError, Result};
use crate::particle::ParticleType;
use crate::physics::rule::RuleSet;

/// Group types and rule strengths.
///
/// Every setter writes through atomics, so changes land without waiting for
/// a running tick and are picked up by the next one at the latest.
#[derive(Debug)]
pub struct Parameters {
    types: Vec<Arc<ParticleType>>,
    rules: RuleSet,
    rule_scale: f64,
}

impl Parameters {
    pub fn new(settings: &EngineSettings) -> Self {
        let types = (0..settings.groups)
            .map(|group| {
                Arc::new(ParticleType::new(
                    (group + 1) as u8,
                    settings.velocity_cap,
                    settings.range_min,
                    settings.range_max,
                ))
            })
            .collect();

        Self {
            types,
            rules: RuleSet::new(settings.groups),
            rule_scale: settings.rule_scale,
        }
    }

    pub fn groups(&self) -> usize {
        self.types.len()
    }

    pub fn rule_scale(&self) -> f64 {
        self.rule_scale
    }

    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    pub fn types(&self) -> &[Arc<ParticleType>] {
        &self.types
    }

    pub fn kind(&self, group: usize) -> Result<&Arc<ParticleType>> {
        self.types
            .get(group)
            .ok_or_else(|| EngineError::group(group, self.types.len()))
    }

    /// Sets rule `index` to `value / rule_scale`.
    pub fn change_rule(&self, index: usize, value: i32) -> Result<()> {
        let rule = self
            .rules
            .get(index)
            .ok_or_else(|| EngineError::rule(index, self.rules.len()))?;
        rule.set_strength(value as f64 / self.rule_scale);
        log::debug!(
            "rule {} ({} -> {}) strength set to {}",
            index,
            rule.source(),
            rule.influence(),
            rule.strength()
        );
        Ok(())
    }

    /// `-1` removes the cap.
    pub fn change_velocity_cap(&self, group: usize, value: i32) -> Result<()> {
        self.kind(group)?.set_velocity_cap(value as f64);
        log::debug!("group {} velocity cap set to {}", group, value);
        Ok(())
    }

    pub fn change_range(&self, group: usize, value: i32) -> Result<()> {
        let kind = self.kind(group)?;
        if (value as f64) <= kind.range_min() {
            log::warn!(
                "group {} range {} is not above its minimum {}, it will exert no force",
                group,
                value,
                kind.range_min()
            );
        }
        kind.set_range_max(value as f64);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::IndexKind;

    fn params() -> Parameters {
        Parameters::new(&EngineSettings::default())
    }

    #[test]
    fn defaults_follow_settings() {
        let params = params();
        assert_eq!(params.groups(), 5);
        assert_eq!(params.rules().len(), 25);
        let ids: Vec<u8> = params.types().iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec![1, 2, 3, 4, 5]);
        assert_eq!(params.types()[0].velocity_cap(), 5.0);
        assert_eq!(params.types()[0].range_max(), 90.0);
    }

    #[test]
    fn change_rule_scales_value() {
        let params = params();
        params.change_rule(7, 100).expect("rule 7 exists");
        assert_eq!(params.rules().get(7).map(|r| r.strength()), Some(0.5));
        params.change_rule(24, -999).expect("rule 24 exists");
        assert_eq!(params.rules().get(24).map(|r| r.strength()), Some(-4.995));
    }

    #[test]
    fn out_of_range_indices_are_rejected() {
        let params = params();
        assert!(matches!(
            params.change_rule(25, 1),
            Err(EngineError::InvalidIndex { kind: IndexKind::Rule, index: 25, limit: 25 })
        ));
        assert!(matches!(
            params.change_velocity_cap(5, 1),
            Err(EngineError::InvalidIndex { kind: IndexKind::Group, index: 5, limit: 5 })
        ));
        assert!(params.change_range(9, 1).is_err());
    }

    #[test]
    fn cap_and_range_are_written_through() {
        let params = params();
        params.change_velocity_cap(2, -1).expect("group 2 exists");
        params.change_range(2, 40).expect("group 2 exists");
        assert_eq!(params.types()[2].velocity_cap(), -1.0);
        assert_eq!(params.types()[2].range_max(), 40.0);
        assert_eq!(params.types()[1].range_max(), 90.0);
    }
}
