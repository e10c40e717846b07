//! Confinement of germ cells to a tube of growing radius around the leader's path.

use germline_common::{SimClock, SimParams, Vec3};
use log::trace;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::annotations::keys;
use crate::error::GermlineError;
use crate::path::{PathTracker, SegmentType};
use crate::population::{Cell, Population, PopulationLayout};

/// Extra points searched either side of the cached index. Covers point
/// spacing changes caused by stretch insertions.
const SEARCH_MARGIN: usize = 5;

/// Distances closer than this to the wall count as on the wall.
const WALL_TOLERANCE: f64 = 1e-9;

/// Search-and-correct rounds tried before a cell is left where it is.
const MAX_CORRECTIONS: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TubeGeometry {
    pub radius: f64,
}

#[derive(Debug, Clone)]
pub struct TubeBoundary {
    geometry: TubeGeometry,
    search_half_width: usize,
}

/// What a cell is rescaled about: a cap centre or the line through two path points.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Support {
    Point(Vec3),
    Line(Vec3, Vec3),
}

/// Half-width of the windowed closest-point search.
pub fn search_half_width(max_movement_per_step: f64, spacing: f64) -> usize {
    if spacing <= 0.0 {
        return SEARCH_MARGIN;
    }
    (max_movement_per_step / spacing) as usize + SEARCH_MARGIN
}

/// Nearest path point by a scan over every point. Ties go to the lower index.
pub fn closest_point_full(points: &[Vec3], position: Vec3) -> Option<(usize, f64)> {
    closest_in_range(points, position, 0, points.len().checked_sub(1)?)
}

/// Nearest path point within `half_width` indices of `centre`.
pub fn closest_point_windowed(
    points: &[Vec3],
    position: Vec3,
    centre: usize,
    half_width: usize,
) -> Option<(usize, f64)> {
    let last = points.len().checked_sub(1)?;
    let centre = centre.min(last);
    let lo = centre.saturating_sub(half_width);
    let hi = (centre + half_width).min(last);
    closest_in_range(points, position, lo, hi)
}

fn closest_in_range(points: &[Vec3], position: Vec3, lo: usize, hi: usize) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (idx, point) in points.iter().enumerate().take(hi + 1).skip(lo) {
        let distance = position.distance(*point);
        match best {
            Some((_, d)) if distance >= d => {}
            _ => best = Some((idx, distance)),
        }
    }
    best
}

/// Re-centres the windowed search until the window's nearest point is its own centre.
fn settle_closest(points: &[Vec3], position: Vec3, mut centre: usize, half_width: usize) -> Option<usize> {
    loop {
        let (idx, _) = closest_point_windowed(points, position, centre, half_width)?;
        if idx == centre {
            return Some(idx);
        }
        centre = idx;
    }
}

/// Moves `position` onto the sphere of radius `allowed` around `centre` when
/// it lies further out, or always when `confined`.
fn rescale_about(centre: Vec3, position: Vec3, allowed: f64, confined: bool) -> Vec3 {
    let offset = position - centre;
    let distance = offset.length();
    if distance <= WALL_TOLERANCE || (distance - allowed).abs() <= WALL_TOLERANCE {
        return position;
    }
    if distance > allowed || confined {
        centre + offset * (allowed / distance)
    } else {
        position
    }
}

/// Perpendicular projection onto the line through `a` and `b`, then radial correction.
fn rescale_about_line(a: Vec3, b: Vec3, position: Vec3, allowed: f64, confined: bool) -> Vec3 {
    let axis = b - a;
    let length_sq = axis.length_squared();
    if length_sq <= WALL_TOLERANCE {
        return rescale_about(a, position, allowed, confined);
    }
    let foot = a + axis * ((position - a).dot(axis) / length_sq);
    rescale_about(foot, position, allowed, confined)
}

fn rescale(support: Support, position: Vec3, allowed: f64, confined: bool) -> Vec3 {
    match support {
        Support::Point(centre) => rescale_about(centre, position, allowed, confined),
        Support::Line(a, b) => rescale_about_line(a, b, position, allowed, confined),
    }
}

/// Support for a cell whose nearest path point is `closest`, and whether the
/// cell is pinned to the wall there.
fn support_for(points: &[Vec3], segments: &[SegmentType], position: Vec3, closest: usize) -> (Support, bool) {
    let n = points.len();
    if n == 1 {
        return (Support::Point(points[0]), segments[0].is_confined());
    }
    let last = n - 1;

    if closest == last {
        let end = points[last];
        let before = points[last - 1];
        let ghost = end + (end - before);
        if position.distance(ghost) < position.distance(before) {
            // Beyond the distal end: hemispherical cap.
            return (Support::Point(end), segments[last].is_confined());
        }
        return (Support::Line(before, end), segments[last].is_confined());
    }

    if closest == 0 {
        let start = points[0];
        let after = points[1];
        let ghost = start + (start - after);
        if position.distance(ghost) < position.distance(after) {
            return (Support::Point(start), segments[0] == SegmentType::DistalCap);
        }
        return (Support::Line(after, start), segments[0].is_confined());
    }

    let previous = points[closest - 1];
    let next = points[closest + 1];
    let neighbour = if position.distance(previous) < position.distance(next) { previous } else { next };
    (Support::Line(points[closest], neighbour), segments[closest].is_confined())
}

/// Corrected position for a cell whose nearest path point is `closest`.
pub fn confine_position(
    points: &[Vec3],
    segments: &[SegmentType],
    position: Vec3,
    closest: usize,
    allowed: f64,
) -> Vec3 {
    let (support, confined) = support_for(points, segments, position, closest);
    rescale(support, position, allowed, confined)
}

/// Point nearest `position` on the ridge where the walls of two lines through
/// a shared path point meet. `None` unless both supports are such lines.
fn ridge_point(first: Support, second: Support, position: Vec3, allowed: f64) -> Option<Vec3> {
    let (Support::Line(a0, a1), Support::Line(b0, b1)) = (first, second) else {
        return None;
    };
    let vertex = [a0, a1].into_iter().find(|p| *p == b0 || *p == b1)?;
    let u = (a1 - a0).normalize_or_zero();
    let w = (b1 - b0).normalize_or_zero();
    let bisectors = [(u + w).normalize_or_zero(), (u - w).normalize_or_zero()];
    if u == Vec3::zero() || w == Vec3::zero() || bisectors.contains(&Vec3::zero()) {
        return None;
    }

    // Both bisector planes hold the points equidistant from the two lines.
    let offset = position - vertex;
    let normal = if offset.dot(bisectors[0]).abs() <= offset.dot(bisectors[1]).abs() {
        bisectors[0]
    } else {
        bisectors[1]
    };
    let in_plane = offset - normal * offset.dot(normal);
    let axial = in_plane.dot(u);
    let radial_sq = in_plane.length_squared() - axial * axial;
    if radial_sq <= WALL_TOLERANCE {
        return None;
    }
    Some(vertex + in_plane * (allowed / radial_sq.sqrt()))
}

/// Read-only view of the path shared by the parallel per-cell pass.
struct Confinement<'a> {
    points: &'a [Vec3],
    segments: &'a [SegmentType],
    spacing: f64,
    tube_radius: f64,
    search_half_width: usize,
}

impl Confinement<'_> {
    fn apply(&self, cell: &mut Cell) {
        let start = match cell.data.previous_closest_index() {
            None => closest_point_full(self.points, cell.position).map(|(idx, _)| idx),
            Some(previous) => Some(previous),
        };
        let Some(start) = start else {
            return;
        };
        let allowed = (self.tube_radius - cell.data.radius()).max(0.0);
        let Some((position, closest)) = self.correct(cell.position, start, allowed) else {
            return;
        };
        cell.position = position;

        let arc_length = self.spacing * (self.points.len() - 1 - closest) as f64;
        cell.data.set(keys::PREVIOUS_CLOSEST_PATH_INDEX, closest as f64);
        cell.data.set(keys::DISTANCE_FROM_LEADER, arc_length);
        cell.data.set(keys::MAX_RADIUS, self.tube_radius);
        cell.data.set_flag(keys::IN_PROXIMAL_ARM, self.segments[closest] == SegmentType::Straight);
    }

    /// Searches and corrects until a correction leaves the cell where it is,
    /// so a second pass over the result changes nothing. A cell that keeps
    /// alternating between two segments is placed where their walls meet, or
    /// left in place when that fails.
    fn correct(&self, position: Vec3, start: usize, allowed: f64) -> Option<(Vec3, usize)> {
        let first = settle_closest(self.points, position, start, self.search_half_width)?;
        let mut current = position;
        let mut closest = first;
        let mut recent: [Option<Support>; 2] = [None, None];

        for _ in 0..MAX_CORRECTIONS {
            let (support, confined) = support_for(self.points, self.segments, current, closest);
            let corrected = rescale(support, current, allowed, confined);
            if corrected == current {
                return Some((current, closest));
            }
            recent = [recent[1], Some(support)];
            current = corrected;
            closest = settle_closest(self.points, current, closest, self.search_half_width)?;
        }

        if let [Some(a), Some(b)] = recent {
            if let Some(ridge) = ridge_point(a, b, current, allowed) {
                let ridge_closest = settle_closest(self.points, ridge, closest, self.search_half_width)?;
                if confine_position(self.points, self.segments, ridge, ridge_closest, allowed) == ridge {
                    return Some((ridge, ridge_closest));
                }
            }
        }
        trace!("Correction did not settle at {:?}; cell left in place.", position);
        Some((position, first))
    }
}

impl TubeBoundary {
    /// Rejects populations the tube cannot act on.
    pub fn new(population: &Population, initial_radius: f64, params: &SimParams) -> Result<Self, GermlineError> {
        if population.layout() != PopulationLayout::NodeBased {
            return Err(GermlineError::UnsupportedPopulation);
        }
        if population.dimension() == 1 {
            return Err(GermlineError::OneDimensional);
        }
        Ok(TubeBoundary {
            geometry: TubeGeometry { radius: initial_radius },
            search_half_width: search_half_width(params.max_movement_per_step, params.path_spacing),
        })
    }

    pub fn radius(&self) -> f64 {
        self.geometry.radius
    }

    pub fn geometry(&self) -> TubeGeometry {
        self.geometry
    }

    pub fn set_radius(&mut self, radius: f64) {
        self.geometry.radius = radius;
    }

    /// Growth rate for the developmental window containing `time`; zero outside all windows.
    pub fn growth_rate(time: f64, params: &SimParams) -> f64 {
        let edges = params.tube_growth_window_edges;
        (0..3)
            .find(|&i| time > edges[i] && time <= edges[i + 1])
            .map(|i| params.tube_growth_rates[i])
            .unwrap_or(0.0)
    }

    /// Widens the tube for this step. Never narrows it.
    pub fn grow(&mut self, clock: &SimClock, params: &SimParams) {
        let increment = Self::growth_rate(clock.time(), params) * clock.dt;
        if increment > 0.0 {
            self.geometry.radius += increment;
        }
    }

    /// Confines every non-leader cell to the tube and refreshes its path
    /// annotations. Does nothing until the path has a point.
    pub fn apply(&self, population: &mut Population, path: &PathTracker) {
        if path.is_empty() {
            return;
        }
        let confinement = Confinement {
            points: path.points(),
            segments: path.segments(),
            spacing: path.spacing(),
            tube_radius: self.geometry.radius,
            search_half_width: self.search_half_width,
        };
        population
            .cells_mut()
            .par_iter_mut()
            .filter(|cell| !cell.data.is_leader())
            .for_each(|cell| confinement.apply(cell));
        trace!("Tube boundary applied with radius {:.3} over {} path points.", self.geometry.radius, path.len());
    }
}
