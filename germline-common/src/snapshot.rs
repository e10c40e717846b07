use serde::{Serialize, Deserialize};

/// Aggregate gonad-arm metrics at a specific time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GonadSnapshot {
    /// The simulation time (in hours) at which the snapshot was taken.
    pub time: f64,
    /// Arc-length proxy from the leader cell to the most proximal cell.
    pub gonad_length: f64,
    /// Mean sampled cycle length of proliferating cells, plus their mean contact-inhibition arrest.
    pub mean_cycle_duration: f64,
    pub sperm_count: u32,
    pub proliferative_count: u32,
    /// Cells entering apoptosis per hour since the previous snapshot.
    pub death_rate: f64,
    pub total_cells: u32,
    /// Largest `DistanceFromLeader` among mitotic cells.
    pub last_proliferative_distance: f64,
    /// Smallest `DistanceFromLeader` among meiotic cells.
    pub first_meiotic_distance: f64,
    pub g1_count: u32,
    pub s_count: u32,
    pub g2_count: u32,
    pub m_count: u32,
    pub meiotic_s_count: u32,
    /// Row index (in cell diameters from the leader) of the first row holding more than one meiotic cell.
    pub first_meiotic_row: u32,
    /// Row index of the last row that still holds a mitotic cell.
    pub last_mitotic_row: u32,
    #[serde(skip_serializing_if = "Option::is_none")] // Don't write "positions": null
    pub positions: Option<Vec<(f64, f64, f64)>>,
}

/// One tracked cell position.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TrackingRow {
    pub time: f64,
    pub cell_id: u64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}
