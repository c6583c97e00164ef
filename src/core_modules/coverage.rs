// THEORY:
// Input coverage answers "how much did we actually get to work with" before
// any cycle is reconstructed. It counts raw rows per stream over every window
// of the run, and which entities and intersections reported at all.
//
// Both color heads count as color observations here, whichever head the
// analysis selects. An intersection is the part of an entity name before the
// first `_` (`K12_3` belongs to `K12`).
//
// A `CoverageTally` is filled by one weekday partition and merged after the
// join; the sets keep an entity seen on several days from counting twice.

use crate::core_modules::observation::observation::SignalKind;
use serde::Serialize;
use std::collections::BTreeSet;

/// The intersection an entity belongs to.
pub fn intersection_of(entity: &str) -> &str {
    entity.split_once('_').map_or(entity, |(intersection, _)| intersection)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CoverageTally {
    color_observations: u64,
    cycle_second_observations: u64,
    entities: BTreeSet<String>,
}

impl CoverageTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, entity: &str, kind: SignalKind) {
        if kind.is_color() {
            self.color_observations += 1;
        } else {
            self.cycle_second_observations += 1;
        }
        if !self.entities.contains(entity) {
            self.entities.insert(entity.to_owned());
        }
    }

    pub fn absorb(&mut self, other: CoverageTally) {
        self.color_observations += other.color_observations;
        self.cycle_second_observations += other.cycle_second_observations;
        self.entities.extend(other.entities);
    }

    pub fn summary(&self) -> InputCoverage {
        let intersections: BTreeSet<&str> =
            self.entities.iter().map(|e| intersection_of(e)).collect();
        InputCoverage {
            color_observations: self.color_observations,
            cycle_second_observations: self.cycle_second_observations,
            entities_with_observations: self.entities.len(),
            intersections_with_observations: intersections.len(),
        }
    }
}

/// Serializable coverage of a whole run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InputCoverage {
    /// Rows of either color head.
    pub color_observations: u64,
    pub cycle_second_observations: u64,
    pub entities_with_observations: usize,
    pub intersections_with_observations: usize,
}
