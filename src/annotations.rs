use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation keys shared between the boundary, the charts, the killers and
/// the recorders. Values are numeric; flags are stored as 0.0/1.0.
pub mod keys {
    pub const IS_LEADER_CELL: &str = "IsLeaderCell";
    pub const DISTANCE_FROM_LEADER: &str = "DistanceFromLeader";
    pub const PREVIOUS_CLOSEST_PATH_INDEX: &str = "PreviousClosestPathIndex";
    pub const RADIUS: &str = "Radius";
    pub const MAX_RADIUS: &str = "MaxRadius";
    pub const CELL_CYCLE_PHASE: &str = "CellCyclePhase";
    pub const DNA_CONTENT: &str = "DNAContent";
    pub const ARRESTED_FOR: &str = "ArrestedFor";
    pub const SPERM_FATED: &str = "SpermFated";
    pub const OOCYTE_FATED: &str = "OocyteFated";
    pub const DIFFERENTIATION_SPERM: &str = "Differentiation_Sperm";
    pub const DIFFERENTIATION_OOCYTE: &str = "Differentiation_Oocyte";
    pub const IN_PROXIMAL_ARM: &str = "InProximalArm";
    pub const VOLUME: &str = "volume";
    pub const APOPTOSIS: &str = "Apoptosis";
}

/// Numeric codes written to `CellCyclePhase`.
pub mod phase_codes {
    pub const G1: f64 = 1.0;
    pub const S: f64 = 2.0;
    pub const G2: f64 = 3.0;
    pub const M: f64 = 4.0;
    pub const MEIOTIC_S: f64 = 2.5;
    pub const MEIOSIS: f64 = -1.0;
}

/// A cell's string-keyed annotation record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CellData {
    items: BTreeMap<String, f64>,
}

impl CellData {
    pub fn new() -> Self {
        Self::default()
    }

    /// The record every germ cell starts with.
    pub fn for_germ_cell(radius: f64, max_radius: f64, is_leader: bool) -> Self {
        let mut data = CellData::new();
        data.set_flag(keys::IS_LEADER_CELL, is_leader);
        data.set(keys::DISTANCE_FROM_LEADER, 0.0);
        data.set(keys::PREVIOUS_CLOSEST_PATH_INDEX, -1.0);
        data.set(keys::RADIUS, radius);
        data.set(keys::MAX_RADIUS, max_radius);
        data.set(keys::CELL_CYCLE_PHASE, 0.0);
        data.set(keys::DNA_CONTENT, 1.0);
        data.set(keys::ARRESTED_FOR, 0.0);
        data.set(keys::SPERM_FATED, 0.0);
        data.set(keys::OOCYTE_FATED, 0.0);
        data.set(keys::DIFFERENTIATION_SPERM, 0.0);
        data.set(keys::DIFFERENTIATION_OOCYTE, 0.0);
        data.set(keys::IN_PROXIMAL_ARM, 1.0);
        data.set(keys::APOPTOSIS, 0.0);
        data
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.items.get(key).copied()
    }

    /// Value of `key`, or 0.0 when it was never written.
    pub fn value(&self, key: &str) -> f64 {
        self.get(key).unwrap_or(0.0)
    }

    pub fn set(&mut self, key: &str, value: f64) {
        match self.items.get_mut(key) {
            Some(slot) => *slot = value,
            None => {
                self.items.insert(key.to_string(), value);
            }
        }
    }

    pub fn flag(&self, key: &str) -> bool {
        self.value(key) == 1.0
    }

    pub fn set_flag(&mut self, key: &str, on: bool) {
        self.set(key, if on { 1.0 } else { 0.0 });
    }

    pub fn add(&mut self, key: &str, delta: f64) {
        let current = self.value(key);
        self.set(key, current + delta);
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.items.keys().map(|k| k.as_str())
    }

    // Convenience accessors for the hot keys.

    pub fn is_leader(&self) -> bool {
        self.flag(keys::IS_LEADER_CELL)
    }

    pub fn radius(&self) -> f64 {
        self.value(keys::RADIUS)
    }

    pub fn distance_from_leader(&self) -> f64 {
        self.value(keys::DISTANCE_FROM_LEADER)
    }

    /// Cached closest path index, `None` while unsearched.
    pub fn previous_closest_index(&self) -> Option<usize> {
        match self.get(keys::PREVIOUS_CLOSEST_PATH_INDEX) {
            Some(v) if v >= 0.0 => Some(v as usize),
            _ => None,
        }
    }

    pub fn is_dying(&self) -> bool {
        self.flag(keys::APOPTOSIS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn germ_cell_record_starts_unsearched() {
        let data = CellData::for_germ_cell(2.5, 6.0, false);
        assert_eq!(data.previous_closest_index(), None);
        assert_eq!(data.value(keys::PREVIOUS_CLOSEST_PATH_INDEX), -1.0);
        assert_eq!(data.radius(), 2.5);
        assert!(!data.is_leader());
        assert!(data.keys().any(|k| k == "Differentiation_Oocyte"));
    }

    #[test]
    fn missing_keys_read_as_zero() {
        let mut data = CellData::new();
        assert_eq!(data.get(keys::VOLUME), None);
        assert_eq!(data.value(keys::ARRESTED_FOR), 0.0);
        data.add(keys::ARRESTED_FOR, 0.5);
        data.add(keys::ARRESTED_FOR, 0.25);
        assert_eq!(data.value(keys::ARRESTED_FOR), 0.75);
    }
}
