use germline_common::{SimClock, SimParams, Vec3};
use log::{debug, trace};
use rand::rngs::StdRng;
use rand_distr::{Distribution, UnitSphere};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

use crate::annotations::{keys, CellData};
use crate::error::GermlineError;
use crate::statechart::{ChartCellCycle, ChartContext};

/// How cells in a population are represented spatially.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PopulationLayout {
    /// Free-floating cell centres.
    NodeBased,
    /// Cells defined by a shared mesh; positions cannot be moved independently.
    MeshBased,
}

/// A single germ cell (or the leader cell).
#[derive(Debug, Clone)]
pub struct Cell {
    pub id: u64,
    pub position: Vec3,
    pub data: CellData,
    pub cycle: ChartCellCycle,
    /// Simulated time at which apoptosis started, if it has.
    pub apoptosis_started_at: Option<f64>,
}

impl Cell {
    pub fn is_dying(&self) -> bool {
        self.apoptosis_started_at.is_some()
    }

    pub fn start_apoptosis(&mut self, time: f64) {
        if self.apoptosis_started_at.is_none() {
            self.apoptosis_started_at = Some(time);
            self.data.set_flag(keys::APOPTOSIS, true);
        }
    }
}

/// Holds every cell of the simulation.
#[derive(Debug, Clone)]
pub struct Population {
    layout: PopulationLayout,
    dimension: usize,
    cells: Vec<Cell>,
    next_id: u64,
}

impl Population {
    pub fn new(layout: PopulationLayout, dimension: usize) -> Self {
        Population { layout, dimension, cells: Vec::new(), next_id: 0 }
    }

    /// An empty three-dimensional node-based population.
    pub fn node_based() -> Self {
        Population::new(PopulationLayout::NodeBased, 3)
    }

    /// Rebuilds a population from checkpointed cells.
    pub fn from_cells(cells: Vec<Cell>, next_id: u64) -> Self {
        let next_id = cells.iter().map(|c| c.id + 1).max().unwrap_or(0).max(next_id);
        Population { layout: PopulationLayout::NodeBased, dimension: 3, cells, next_id }
    }

    pub fn layout(&self) -> PopulationLayout {
        self.layout
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Adds a cell and returns its id.
    pub fn add_cell(&mut self, position: Vec3, data: CellData, cycle: ChartCellCycle) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.cells.push(Cell { id, position, data, cycle, apoptosis_started_at: None });
        id
    }

    pub fn cells(&self) -> &[Cell] {
        &self.cells
    }

    pub fn cells_mut(&mut self) -> &mut [Cell] {
        &mut self.cells
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell(&self, id: u64) -> Option<&Cell> {
        self.cells.iter().find(|c| c.id == id)
    }

    pub fn leader(&self) -> Option<&Cell> {
        self.cells.iter().find(|c| c.data.is_leader())
    }

    pub fn leader_mut(&mut self) -> Option<&mut Cell> {
        self.cells.iter_mut().find(|c| c.data.is_leader())
    }

    /// Largest arc-length distance from the leader over all cells.
    pub fn max_distance_from_leader(&self) -> f64 {
        self.cells.iter().map(|c| c.data.distance_from_leader()).fold(0.0, f64::max)
    }

    /// Writes each cell's compressed volume. Every overlapping neighbour
    /// shortens the cell's effective radius by half the overlap; the
    /// effective radius is averaged over those neighbours and left at the
    /// cell's own radius when nothing overlaps.
    pub fn track_volumes(&mut self) {
        let spheres: Vec<(u64, Vec3, f64)> = self.cells.iter().map(|c| (c.id, c.position, c.data.radius())).collect();
        self.cells.par_iter_mut().for_each(|cell| {
            let radius = cell.data.radius();
            let (sum, overlaps) = spheres
                .iter()
                .filter(|(id, _, _)| *id != cell.id)
                .filter_map(|(_, position, other)| {
                    let overlap = radius + other - cell.position.distance(*position);
                    (overlap > 0.0).then(|| radius - 0.5 * overlap)
                })
                .fold((0.0, 0usize), |(sum, n), effective| (sum + effective, n + 1));
            let effective = if overlaps > 0 { sum / overlaps as f64 } else { radius };
            cell.data.set(keys::VOLUME, 4.0 / 3.0 * PI * effective.powi(3));
        });
        trace!("Tracked volumes of {} cells.", self.cells.len());
    }

    /// Steps every living cell's chart and returns the indices of cells ready to divide.
    pub fn update_cycles(
        &mut self,
        clock: &SimClock,
        params: &SimParams,
        rng: &mut StdRng,
    ) -> Result<Vec<usize>, GermlineError> {
        let mut ready = Vec::new();
        for (idx, cell) in self.cells.iter_mut().enumerate() {
            if cell.is_dying() {
                continue;
            }
            let Cell { data, cycle, .. } = cell;
            let mut ctx = ChartContext { data, params, clock: *clock, rng: &mut *rng };
            if cycle.ready_to_divide(&mut ctx)? {
                ready.push(idx);
            }
        }
        Ok(ready)
    }

    /// Divides the cell at `parent_idx`. Parent and daughter are pushed apart
    /// along a random direction; the daughter inherits annotations and chart.
    pub fn divide(&mut self, parent_idx: usize, separation: f64, rng: &mut StdRng) -> Option<u64> {
        let dimension = self.dimension;
        let parent = self.cells.get_mut(parent_idx)?;

        let [x, y, z]: [f64; 3] = UnitSphere.sample(rng);
        let direction = if dimension == 2 {
            Vec3::new(x, y, 0.0).normalize_or_zero()
        } else {
            Vec3::new(x, y, z)
        };
        let offset = direction * (0.5 * separation);

        let daughter_position = parent.position + offset;
        parent.position = parent.position - offset;
        let daughter_data = parent.data.clone();
        let daughter_cycle = parent.cycle.create_daughter();
        parent.cycle.reset_for_division();
        let parent_id = parent.id;

        let daughter_id = self.add_cell(daughter_position, daughter_data, daughter_cycle);
        debug!("Cell {} divided; daughter {}.", parent_id, daughter_id);
        Some(daughter_id)
    }

    /// Removes cells whose apoptosis has run its course. Returns how many were removed.
    pub fn remove_dead(&mut self, time: f64, apoptosis_duration: f64) -> usize {
        let before = self.cells.len();
        self.cells.retain(|c| match c.apoptosis_started_at {
            Some(start) => time - start < apoptosis_duration,
            None => true,
        });
        before - self.cells.len()
    }
}
