use std::f64::consts::PI;
use std::path::Path;

use anyhow::{Context, Result};
use germline_common::{GonadSnapshot, SimParams, TrackingRow};
use log::info;

use crate::annotations::{keys, phase_codes, CellData};
use crate::population::Population;
use crate::statechart::mean_durations;

/// Number of cell rows binned along the distal arm.
pub const ROW_BINS: usize = 128;
/// Cells further than this from the leader are not binned into rows.
const ROW_RANGE: f64 = 150.0;
/// Cells closer than this to the leader set the row width.
const ROW_WIDTH_RANGE: f64 = 75.0;

fn diameter(data: &CellData) -> f64 {
    let r = data.radius();
    let volume = data.get(keys::VOLUME).unwrap_or(4.0 / 3.0 * PI * r * r * r);
    2.0 * (volume * 3.0 / (4.0 * PI)).cbrt()
}

/// Aggregates gonad-arm metrics from the population at recording times.
#[derive(Debug, Clone, Default)]
pub struct GonadArmRecorder {
    deaths_since_sample: usize,
    last_sample_time: Option<f64>,
}

impl GonadArmRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts cells that entered apoptosis since the last sample.
    pub fn note_deaths(&mut self, count: usize) {
        self.deaths_since_sample += count;
    }

    pub fn sample(
        &mut self,
        population: &Population,
        time: f64,
        params: &SimParams,
        include_positions: bool,
    ) -> GonadSnapshot {
        let cells = population.cells();

        let (width_sum, width_count) = cells
            .iter()
            .filter(|c| !c.data.is_leader() && c.data.distance_from_leader() < ROW_WIDTH_RANGE)
            .fold((0.0, 0usize), |(sum, n), c| (sum + diameter(&c.data), n + 1));
        let row_width = if width_count > 0 { width_sum / width_count as f64 } else { 0.0 };

        let mut meiotic_rows = [0u32; ROW_BINS];
        let mut mitotic_rows = [0u32; ROW_BINS];
        let mut snapshot = GonadSnapshot {
            time,
            gonad_length: 0.0,
            mean_cycle_duration: 0.0,
            sperm_count: 0,
            proliferative_count: 0,
            death_rate: 0.0,
            total_cells: cells.len() as u32,
            last_proliferative_distance: 0.0,
            first_meiotic_distance: f64::MAX,
            g1_count: 0,
            s_count: 0,
            g2_count: 0,
            m_count: 0,
            meiotic_s_count: 0,
            first_meiotic_row: ROW_BINS as u32,
            last_mitotic_row: 0,
            positions: None,
        };
        let mut time_arrested = 0.0;

        for cell in cells {
            let distance = cell.data.distance_from_leader();
            let phase = cell.data.value(keys::CELL_CYCLE_PHASE);
            let meiotic = phase == phase_codes::MEIOSIS;

            if row_width > 0.0 && distance < ROW_RANGE {
                let row = (distance / row_width).round() as usize;
                if row < ROW_BINS {
                    if phase < 0.0 {
                        meiotic_rows[row] += 1;
                    } else {
                        mitotic_rows[row] += 1;
                    }
                }
            }

            snapshot.gonad_length = snapshot.gonad_length.max(distance);
            if cell.data.flag(keys::DIFFERENTIATION_SPERM) {
                snapshot.sperm_count += 1;
            }
            if meiotic {
                snapshot.first_meiotic_distance = snapshot.first_meiotic_distance.min(distance);
            } else {
                snapshot.proliferative_count += 1;
                snapshot.last_proliferative_distance = snapshot.last_proliferative_distance.max(distance);
            }

            let arrested = cell.data.value(keys::ARRESTED_FOR);
            if phase == phase_codes::G1 {
                snapshot.g1_count += 1;
                time_arrested += arrested;
            } else if phase == phase_codes::S {
                snapshot.s_count += 1;
                time_arrested += arrested;
            } else if phase == phase_codes::G2 {
                snapshot.g2_count += 1;
                time_arrested += arrested;
            } else if phase == phase_codes::M {
                snapshot.m_count += 1;
                time_arrested += arrested;
            } else if phase == phase_codes::MEIOTIC_S {
                snapshot.meiotic_s_count += 1;
            }
        }

        if let Some(row) = meiotic_rows.iter().position(|&n| n > 1) {
            snapshot.first_meiotic_row = row as u32;
        }
        if let Some(row) = mitotic_rows.iter().rposition(|&n| n > 0) {
            snapshot.last_mitotic_row = row as u32;
        }

        let cycling = snapshot.g1_count + snapshot.s_count + snapshot.g2_count + snapshot.m_count;
        snapshot.mean_cycle_duration = mean_durations(time, params).total();
        if cycling > 0 {
            snapshot.mean_cycle_duration += time_arrested / cycling as f64;
        }

        let elapsed = time - self.last_sample_time.unwrap_or(0.0);
        if elapsed > 0.0 {
            snapshot.death_rate = self.deaths_since_sample as f64 / elapsed;
        }
        self.deaths_since_sample = 0;
        self.last_sample_time = Some(time);

        if include_positions {
            snapshot.positions = Some(cells.iter().map(|c| (c.position.x, c.position.y, c.position.z)).collect());
        }
        snapshot
    }
}

/// Positions of every cell whose id is a non-zero multiple of `id_interval`.
pub fn tracking_rows(population: &Population, time: f64, id_interval: u64) -> Vec<TrackingRow> {
    population
        .cells()
        .iter()
        .filter(|c| c.id != 0 && id_interval > 0 && c.id % id_interval == 0)
        .map(|c| TrackingRow { time, cell_id: c.id, x: c.position.x, y: c.position.y, z: c.position.z })
        .collect()
}

fn tsv_writer(path: &Path) -> Result<csv::Writer<std::fs::File>> {
    csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to create output file: {}", path.display()))
}

/// Writes one tab-separated row per snapshot, without a header.
pub fn write_gonad_data(path: &Path, snapshots: &[GonadSnapshot]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    for s in snapshots {
        writer.write_record(&[
            s.time.to_string(),
            s.gonad_length.to_string(),
            s.mean_cycle_duration.to_string(),
            s.sperm_count.to_string(),
            s.proliferative_count.to_string(),
            s.death_rate.to_string(),
            s.total_cells.to_string(),
            s.last_proliferative_distance.to_string(),
            s.first_meiotic_distance.to_string(),
            s.g1_count.to_string(),
            s.s_count.to_string(),
            s.g2_count.to_string(),
            s.m_count.to_string(),
            s.meiotic_s_count.to_string(),
            s.first_meiotic_row.to_string(),
            s.last_mitotic_row.to_string(),
        ])?;
    }
    writer.flush()?;
    info!("Gonad data ({} rows) saved to {}", snapshots.len(), path.display());
    Ok(())
}

pub fn write_tracking_data(path: &Path, rows: &[TrackingRow]) -> Result<()> {
    let mut writer = tsv_writer(path)?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    info!("Tracking data ({} rows) saved to {}", rows.len(), path.display());
    Ok(())
}
