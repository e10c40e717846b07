//! Orthogonal regions of the germ cell chart and their leaf states.

use germline_common::FateModel;
use serde::{Deserialize, Serialize};

use crate::error::GermlineError;

/// GLP-1 Notch receptor, bound by the leader cell's ligand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Glp1 {
    Unbound,
    Bound,
    /// Out of signalling range for good.
    Absent,
    /// Bound, waiting one step before signalling. Spatial-threshold model only.
    Inactive,
    /// Signalling to LAG-1. Spatial-threshold model only.
    Active,
}

/// LAG-1 transcription factor, downstream of GLP-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Lag1 {
    Inactive,
    Active,
}

/// GLD-1 meiotic-entry regulator, repressed by LAG-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gld1 {
    Inactive,
    Active,
}

/// GLD-2 meiotic-entry regulator, repressed by LAG-1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Gld2 {
    Inactive,
    Active,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CyclePhase {
    MitosisG1,
    MitosisS,
    MitosisG2,
    MitosisM,
    /// G1 of a cell that has left the mitotic cycle.
    ExitedG1,
    MeioticS,
    Meiosis,
}

impl CyclePhase {
    pub fn is_mitotic(self) -> bool {
        matches!(
            self,
            CyclePhase::MitosisG1 | CyclePhase::MitosisS | CyclePhase::MitosisG2 | CyclePhase::MitosisM
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Fate {
    Precursor,
    SpermFated,
    OocyteFated,
    Sperm,
    Oocyte,
    /// Meiotic prophase before a fate is read from the effectors.
    EarlyMeiosis,
    /// Fate taken from the effectors, not yet terminal.
    LateMeiosis,
}

impl Fate {
    pub fn is_terminal(self) -> bool {
        matches!(self, Fate::Sperm | Fate::Oocyte)
    }
}

/// Sperm or oocyte effector of the spatial-threshold model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effector {
    Inactive,
    Active,
}

/// The two effector regions, present only in the spatial-threshold model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Effectors {
    pub oocyte: Effector,
    pub sperm: Effector,
}

impl Default for Effectors {
    fn default() -> Self {
        Effectors { oocyte: Effector::Inactive, sperm: Effector::Inactive }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Region {
    Glp1,
    Lag1,
    Gld1,
    Gld2,
    CellCycle,
    Differentiation,
    OocyteEffector,
    SpermEffector,
}

impl Region {
    pub const ALL: [Region; 8] = [
        Region::Glp1,
        Region::Lag1,
        Region::Gld1,
        Region::Gld2,
        Region::CellCycle,
        Region::Differentiation,
        Region::OocyteEffector,
        Region::SpermEffector,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Region::Glp1 => "GLP1",
            Region::Lag1 => "LAG1",
            Region::Gld1 => "GLD1",
            Region::Gld2 => "GLD2",
            Region::CellCycle => "CellCycle",
            Region::Differentiation => "Differentiation",
            Region::OocyteEffector => "OocyteEffector",
            Region::SpermEffector => "SpermEffector",
        }
    }

    fn is_effector(self) -> bool {
        matches!(self, Region::OocyteEffector | Region::SpermEffector)
    }
}

/// A leaf state tagged with its region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LeafState {
    Glp1(Glp1),
    Lag1(Lag1),
    Gld1(Gld1),
    Gld2(Gld2),
    Cycle(CyclePhase),
    Fate(Fate),
    OocyteEffector(Effector),
    SpermEffector(Effector),
}

impl LeafState {
    /// Every leaf, in bit order.
    pub const ALL: [LeafState; 29] = [
        LeafState::Glp1(Glp1::Unbound),
        LeafState::Glp1(Glp1::Bound),
        LeafState::Glp1(Glp1::Absent),
        LeafState::Glp1(Glp1::Inactive),
        LeafState::Glp1(Glp1::Active),
        LeafState::Lag1(Lag1::Inactive),
        LeafState::Lag1(Lag1::Active),
        LeafState::Gld1(Gld1::Inactive),
        LeafState::Gld1(Gld1::Active),
        LeafState::Gld2(Gld2::Inactive),
        LeafState::Gld2(Gld2::Active),
        LeafState::Cycle(CyclePhase::MitosisG1),
        LeafState::Cycle(CyclePhase::MitosisS),
        LeafState::Cycle(CyclePhase::MitosisG2),
        LeafState::Cycle(CyclePhase::MitosisM),
        LeafState::Cycle(CyclePhase::ExitedG1),
        LeafState::Cycle(CyclePhase::MeioticS),
        LeafState::Cycle(CyclePhase::Meiosis),
        LeafState::Fate(Fate::Precursor),
        LeafState::Fate(Fate::SpermFated),
        LeafState::Fate(Fate::OocyteFated),
        LeafState::Fate(Fate::Sperm),
        LeafState::Fate(Fate::Oocyte),
        LeafState::Fate(Fate::EarlyMeiosis),
        LeafState::Fate(Fate::LateMeiosis),
        LeafState::OocyteEffector(Effector::Inactive),
        LeafState::OocyteEffector(Effector::Active),
        LeafState::SpermEffector(Effector::Inactive),
        LeafState::SpermEffector(Effector::Active),
    ];

    pub fn region(self) -> Region {
        match self {
            LeafState::Glp1(_) => Region::Glp1,
            LeafState::Lag1(_) => Region::Lag1,
            LeafState::Gld1(_) => Region::Gld1,
            LeafState::Gld2(_) => Region::Gld2,
            LeafState::Cycle(_) => Region::CellCycle,
            LeafState::Fate(_) => Region::Differentiation,
            LeafState::OocyteEffector(_) => Region::OocyteEffector,
            LeafState::SpermEffector(_) => Region::SpermEffector,
        }
    }

    /// Bit position of this leaf in a [`StateBits`] word.
    pub fn bit(self) -> u32 {
        match self {
            LeafState::Glp1(Glp1::Unbound) => 0,
            LeafState::Glp1(Glp1::Bound) => 1,
            LeafState::Glp1(Glp1::Absent) => 2,
            LeafState::Glp1(Glp1::Inactive) => 3,
            LeafState::Glp1(Glp1::Active) => 4,
            LeafState::Lag1(Lag1::Inactive) => 5,
            LeafState::Lag1(Lag1::Active) => 6,
            LeafState::Gld1(Gld1::Inactive) => 7,
            LeafState::Gld1(Gld1::Active) => 8,
            LeafState::Gld2(Gld2::Inactive) => 9,
            LeafState::Gld2(Gld2::Active) => 10,
            LeafState::Cycle(CyclePhase::MitosisG1) => 11,
            LeafState::Cycle(CyclePhase::MitosisS) => 12,
            LeafState::Cycle(CyclePhase::MitosisG2) => 13,
            LeafState::Cycle(CyclePhase::MitosisM) => 14,
            LeafState::Cycle(CyclePhase::ExitedG1) => 15,
            LeafState::Cycle(CyclePhase::MeioticS) => 16,
            LeafState::Cycle(CyclePhase::Meiosis) => 17,
            LeafState::Fate(Fate::Precursor) => 18,
            LeafState::Fate(Fate::SpermFated) => 19,
            LeafState::Fate(Fate::OocyteFated) => 20,
            LeafState::Fate(Fate::Sperm) => 21,
            LeafState::Fate(Fate::Oocyte) => 22,
            LeafState::Fate(Fate::EarlyMeiosis) => 23,
            LeafState::Fate(Fate::LateMeiosis) => 24,
            LeafState::OocyteEffector(Effector::Inactive) => 25,
            LeafState::OocyteEffector(Effector::Active) => 26,
            LeafState::SpermEffector(Effector::Inactive) => 27,
            LeafState::SpermEffector(Effector::Active) => 28,
        }
    }
}

/// The active leaf of every region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveStates {
    pub glp1: Glp1,
    pub lag1: Lag1,
    pub gld1: Gld1,
    pub gld2: Gld2,
    pub cycle: CyclePhase,
    pub fate: Fate,
    pub effectors: Option<Effectors>,
}

impl Default for ActiveStates {
    fn default() -> Self {
        ActiveStates {
            glp1: Glp1::Unbound,
            lag1: Lag1::Inactive,
            gld1: Gld1::Active,
            gld2: Gld2::Active,
            cycle: CyclePhase::MitosisG1,
            fate: Fate::Precursor,
            effectors: None,
        }
    }
}

impl ActiveStates {
    /// Default leaves of every region `model` runs.
    pub fn initial(model: FateModel) -> Self {
        let effectors = match model {
            FateModel::SpatialThreshold => Some(Effectors::default()),
            FateModel::Coupled | FateModel::Uncoupled => None,
        };
        ActiveStates { effectors, ..ActiveStates::default() }
    }

    pub fn leaves(&self) -> Vec<LeafState> {
        let mut leaves = vec![
            LeafState::Glp1(self.glp1),
            LeafState::Lag1(self.lag1),
            LeafState::Gld1(self.gld1),
            LeafState::Gld2(self.gld2),
            LeafState::Cycle(self.cycle),
            LeafState::Fate(self.fate),
        ];
        if let Some(effectors) = self.effectors {
            leaves.push(LeafState::OocyteEffector(effectors.oocyte));
            leaves.push(LeafState::SpermEffector(effectors.sperm));
        }
        leaves
    }

    pub fn is_active(&self, leaf: LeafState) -> bool {
        self.leaves().contains(&leaf)
    }

    /// Makes `leaf` the active state of its region without running entry
    /// actions. Setting an effector leaf adds the effector regions.
    pub fn set(&mut self, leaf: LeafState) {
        match leaf {
            LeafState::Glp1(s) => self.glp1 = s,
            LeafState::Lag1(s) => self.lag1 = s,
            LeafState::Gld1(s) => self.gld1 = s,
            LeafState::Gld2(s) => self.gld2 = s,
            LeafState::Cycle(s) => self.cycle = s,
            LeafState::Fate(s) => self.fate = s,
            LeafState::OocyteEffector(s) => self.effectors.get_or_insert_with(Effectors::default).oocyte = s,
            LeafState::SpermEffector(s) => self.effectors.get_or_insert_with(Effectors::default).sperm = s,
        }
    }

    pub fn encode(&self) -> StateBits {
        StateBits(self.leaves().iter().fold(0u32, |bits, leaf| bits | (1 << leaf.bit())))
    }

    /// Rebuilds the active states from a bitset. Each region needs exactly one
    /// bit, except that the two effector regions may both be empty.
    pub fn decode(bits: StateBits) -> Result<Self, GermlineError> {
        let unknown = bits.0 >> LeafState::ALL.len();
        if unknown != 0 {
            return Err(GermlineError::InvalidStateEncoding { bits: bits.0, region: "none", active: unknown.count_ones() });
        }
        let has_effectors = LeafState::ALL.iter().any(|leaf| leaf.region().is_effector() && bits.contains(*leaf));

        let mut states = ActiveStates::default();
        for region in Region::ALL {
            if region.is_effector() && !has_effectors {
                continue;
            }
            let active: Vec<LeafState> = LeafState::ALL
                .iter()
                .copied()
                .filter(|leaf| leaf.region() == region && bits.contains(*leaf))
                .collect();
            if active.len() != 1 {
                return Err(GermlineError::InvalidStateEncoding {
                    bits: bits.0,
                    region: region.name(),
                    active: active.len() as u32,
                });
            }
            states.set(active[0]);
        }
        Ok(states)
    }
}

/// One bit per leaf state, independent of region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateBits(pub u32);

impl StateBits {
    pub fn contains(&self, leaf: LeafState) -> bool {
        self.0 & (1 << leaf.bit()) != 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leaf_bits_follow_the_leaf_table() {
        for (idx, leaf) in LeafState::ALL.iter().enumerate() {
            assert_eq!(leaf.bit(), idx as u32, "{:?}", leaf);
        }
        let all = LeafState::ALL.iter().fold(0u32, |bits, leaf| bits | (1 << leaf.bit()));
        assert_eq!(all.count_ones(), 29);
    }

    #[test]
    fn default_states_encode_one_bit_per_region() {
        let bits = ActiveStates::default().encode();
        assert_eq!(bits.0.count_ones(), 6);
        assert!(bits.contains(LeafState::Gld1(Gld1::Active)));
        assert!(bits.contains(LeafState::Cycle(CyclePhase::MitosisG1)));
        assert_eq!(ActiveStates::decode(bits).unwrap(), ActiveStates::default());
    }

    #[test]
    fn spatial_threshold_states_carry_eight_regions() {
        let states = ActiveStates::initial(FateModel::SpatialThreshold);
        let bits = states.encode();
        assert_eq!(bits.0.count_ones(), 8);
        assert!(bits.contains(LeafState::OocyteEffector(Effector::Inactive)));
        assert!(bits.contains(LeafState::SpermEffector(Effector::Inactive)));
        assert_eq!(ActiveStates::decode(bits).unwrap(), states);
        assert_eq!(ActiveStates::initial(FateModel::Coupled), ActiveStates::default());
    }

    #[test]
    fn decode_rejects_two_leaves_in_one_region() {
        let mut bits = ActiveStates::default().encode();
        bits.0 |= 1 << LeafState::Fate(Fate::Sperm).bit();
        match ActiveStates::decode(bits) {
            Err(GermlineError::InvalidStateEncoding { region, active, .. }) => {
                assert_eq!(region, "Differentiation");
                assert_eq!(active, 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_missing_region() {
        let mut bits = ActiveStates::default().encode();
        bits.0 &= !(1 << LeafState::Glp1(Glp1::Unbound).bit());
        assert!(ActiveStates::decode(bits).is_err());
    }

    #[test]
    fn decode_rejects_a_lone_effector() {
        let mut bits = ActiveStates::default().encode();
        bits.0 |= 1 << LeafState::SpermEffector(Effector::Active).bit();
        match ActiveStates::decode(bits) {
            Err(GermlineError::InvalidStateEncoding { region, active, .. }) => {
                assert_eq!(region, "OocyteEffector");
                assert_eq!(active, 0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn decode_rejects_bits_past_the_last_leaf() {
        let mut bits = ActiveStates::default().encode();
        bits.0 |= 1 << 29;
        assert!(ActiveStates::decode(bits).is_err());
    }

    #[test]
    fn every_combination_survives_encoding() {
        let mut states = ActiveStates::default();
        for cycle in [CyclePhase::MitosisM, CyclePhase::MeioticS, CyclePhase::Meiosis] {
            for fate in [Fate::SpermFated, Fate::Oocyte, Fate::LateMeiosis] {
                states.cycle = cycle;
                states.fate = fate;
                states.glp1 = Glp1::Absent;
                states.lag1 = Lag1::Active;
                states.gld2 = Gld2::Inactive;
                assert_eq!(ActiveStates::decode(states.encode()).unwrap(), states);
            }
        }
        states.glp1 = Glp1::Inactive;
        states.effectors = Some(Effectors { oocyte: Effector::Active, sperm: Effector::Inactive });
        assert_eq!(ActiveStates::decode(states.encode()).unwrap(), states);
    }
}
