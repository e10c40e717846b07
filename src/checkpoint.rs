use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use anyhow::{Context, Result};
use germline_common::Vec3;
use serde::{Deserialize, Serialize};

use crate::annotations::CellData;
use crate::error::GermlineError;
use crate::leader::LeaderCheckpoint;
use crate::population::Cell;
use crate::statechart::{ChartCellCycle, ChartVariables, StateBits};

/// Persisted form of one cell. The chart is stored as its leaf bitset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CellCheckpoint {
    pub id: u64,
    pub position: Vec3,
    pub data: CellData,
    pub chart_states: StateBits,
    pub chart_variables: ChartVariables,
    pub ready_to_divide: bool,
    pub apoptosis_started_at: Option<f64>,
}

impl CellCheckpoint {
    pub fn capture(cell: &Cell) -> Self {
        CellCheckpoint {
            id: cell.id,
            position: cell.position,
            data: cell.data.clone(),
            chart_states: cell.cycle.chart().encode(),
            chart_variables: cell.cycle.chart().vars.clone(),
            ready_to_divide: cell.cycle.is_ready_to_divide(),
            apoptosis_started_at: cell.apoptosis_started_at,
        }
    }

    pub fn restore(self) -> Result<Cell, GermlineError> {
        let cycle = ChartCellCycle::from_parts(self.chart_states, self.chart_variables, self.ready_to_divide)?;
        Ok(Cell {
            id: self.id,
            position: self.position,
            data: self.data,
            cycle,
            apoptosis_started_at: self.apoptosis_started_at,
        })
    }
}

/// Complete simulation state at a step boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationCheckpoint {
    pub steps_elapsed: u32,
    pub leader: LeaderCheckpoint,
    pub tube_radius: f64,
    pub next_cell_id: u64,
    pub cells: Vec<CellCheckpoint>,
}

impl SimulationCheckpoint {
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .with_context(|| format!("Failed to create checkpoint file: {}", path.display()))?;
        bincode::serialize_into(BufWriter::new(file), self)
            .with_context(|| format!("Failed to write checkpoint: {}", path.display()))?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("Failed to open checkpoint file: {}", path.display()))?;
        let checkpoint = bincode::deserialize_from(BufReader::new(file))
            .with_context(|| format!("Failed to parse checkpoint: {}", path.display()))?;
        Ok(checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statechart::{ChartContext, CyclePhase, Fate, LeafState};
    use germline_common::{SimClock, SimulationConfig};
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn sample_cell() -> Cell {
        let params = SimulationConfig::default().get_sim_params();
        let mut rng = StdRng::seed_from_u64(8);
        let mut data = CellData::for_germ_cell(2.5, 6.0, false);
        let mut ctx = ChartContext { data: &mut data, params: &params, clock: SimClock::new(10, params.dt), rng: &mut rng };
        let mut cycle = ChartCellCycle::new(&mut ctx).unwrap();
        cycle.chart_mut().go_to(LeafState::Cycle(CyclePhase::Meiosis), &mut ctx).unwrap();
        cycle.chart_mut().go_to(LeafState::Fate(Fate::SpermFated), &mut ctx).unwrap();
        cycle.chart_mut().vars.sperm_development_delay = 0.75;
        Cell { id: 12, position: Vec3::new(1.0, -2.0, 3.0), data, cycle, apoptosis_started_at: Some(4.5) }
    }

    #[test]
    fn cell_survives_capture_and_restore() {
        let cell = sample_cell();
        let restored = CellCheckpoint::capture(&cell).restore().unwrap();
        assert_eq!(restored.id, cell.id);
        assert_eq!(restored.position, cell.position);
        assert_eq!(restored.data, cell.data);
        assert_eq!(restored.cycle, cell.cycle);
        assert_eq!(restored.apoptosis_started_at, Some(4.5));
    }

    #[test]
    fn corrupt_chart_bits_are_rejected() {
        let mut checkpoint = CellCheckpoint::capture(&sample_cell());
        checkpoint.chart_states = StateBits(0);
        assert!(matches!(checkpoint.restore(), Err(GermlineError::InvalidStateEncoding { .. })));
    }

    #[test]
    fn checkpoint_file_round_trips() {
        let checkpoint = SimulationCheckpoint {
            steps_elapsed: 250,
            leader: LeaderCheckpoint {
                turn_gene: true,
                halt_gene: false,
                time_since_last_stretch: 0.3,
                path_points: vec![Vec3::zero(), Vec3::new(0.0, 0.0, 2.0)],
                path_types: vec![0, 1],
                position: Vec3::new(0.0, 0.0, 3.0),
                point_spacing: 2.0,
            },
            tube_radius: 6.5,
            next_cell_id: 13,
            cells: vec![CellCheckpoint::capture(&sample_cell())],
        };
        let file = tempfile::NamedTempFile::new().unwrap();
        checkpoint.save(file.path()).unwrap();
        assert_eq!(SimulationCheckpoint::load(file.path()).unwrap(), checkpoint);
    }

    #[test]
    fn missing_checkpoint_names_the_file() {
        let err = SimulationCheckpoint::load("no_such_checkpoint.bin").unwrap_err();
        assert!(err.to_string().contains("no_such_checkpoint.bin"));
    }
}
