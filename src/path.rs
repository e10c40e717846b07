use germline_common::Vec3;
use serde::{Deserialize, Serialize};

use crate::error::GermlineError;

/// Classification of a path point by the migration phase that laid it down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SegmentType {
    /// Ventral run before the turn.
    Straight,
    /// The circular turn from ventral to dorsal side.
    Turn,
    /// Dorsal run back towards the midbody, ending at the distal tip.
    DistalCap,
}

impl SegmentType {
    /// Integer code used in leader checkpoints.
    pub fn code(self) -> i32 {
        match self {
            SegmentType::Straight => 0,
            SegmentType::Turn => 1,
            SegmentType::DistalCap => 2,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, GermlineError> {
        match code {
            0 => Ok(SegmentType::Straight),
            1 => Ok(SegmentType::Turn),
            2 => Ok(SegmentType::DistalCap),
            other => Err(GermlineError::UnknownSegmentCode(other)),
        }
    }

    /// Segments whose lumen is enforced regardless of the radius margin.
    pub fn is_confined(self) -> bool {
        matches!(self, SegmentType::Turn | SegmentType::DistalCap)
    }
}

/// The discretised trajectory of the leader cell, from the proximal end
/// (index 0) to the leader's most recent position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathTracker {
    points: Vec<Vec3>,
    segments: Vec<SegmentType>,
    spacing: f64,
    time_since_last_insertion: f64,
}

impl PathTracker {
    pub fn new(spacing: f64) -> Self {
        PathTracker {
            points: Vec::new(),
            segments: Vec::new(),
            spacing,
            time_since_last_insertion: 0.0,
        }
    }

    /// Rebuilds a path from parallel point and segment-code sequences.
    pub fn from_parts(
        points: Vec<Vec3>,
        codes: &[i32],
        spacing: f64,
        time_since_last_insertion: f64,
    ) -> Result<Self, GermlineError> {
        if points.len() != codes.len() {
            return Err(GermlineError::PathLengthMismatch { points: points.len(), types: codes.len() });
        }
        let segments = codes
            .iter()
            .map(|c| SegmentType::from_code(*c))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(PathTracker { points, segments, spacing, time_since_last_insertion })
    }

    /// Straight path along `(0, y, z)` from `z = 0` up to (not including) `length`.
    pub fn straight(y: f64, length: f64, spacing: f64) -> Self {
        let mut path = PathTracker::new(spacing);
        let mut z = 0.0;
        while z < length {
            path.append(Vec3::new(0.0, y, z), SegmentType::Straight);
            z += spacing;
        }
        path
    }

    /// Adds a point at the travelling end of the path.
    pub fn append(&mut self, point: Vec3, segment: SegmentType) {
        self.points.push(point);
        self.segments.push(segment);
    }

    /// Indices `(a, b)` where `a` is the last Straight point before the turn
    /// and `b` the last Turn point before the distal cap.
    pub fn locate_turn_boundaries(&self) -> Result<(usize, usize), GermlineError> {
        let mut turn_start = None;
        let mut turn_end = None;
        for i in 1..self.segments.len() {
            match (self.segments[i - 1], self.segments[i]) {
                (SegmentType::Straight, SegmentType::Turn) => turn_start = Some(i - 1),
                (SegmentType::Turn, SegmentType::DistalCap) => turn_end = Some(i - 1),
                _ => {}
            }
        }
        let start = turn_start
            .ok_or(GermlineError::TurnBoundaryNotFound("straight-to-turn", self.points.len()))?;
        let end = turn_end
            .ok_or(GermlineError::TurnBoundaryNotFound("turn-to-cap", self.points.len()))?;
        Ok((start, end))
    }

    /// Grows the path by intercalation on both sides of the turn: every Turn
    /// point moves `spacing_delta` along the long axis and one new point is
    /// inserted at each turn boundary. The turn keeps its shape.
    pub fn insert_stretch_pair(&mut self, spacing_delta: f64) -> Result<(), GermlineError> {
        let (turn_start, turn_end) = self.locate_turn_boundaries()?;

        for (point, segment) in self.points.iter_mut().zip(&self.segments) {
            if *segment == SegmentType::Turn {
                *point = point.offset_z(spacing_delta);
            }
        }

        let ventral_point = self.points[turn_start].offset_z(spacing_delta);
        let dorsal_point = self.points[turn_end + 1].offset_z(spacing_delta);

        // Higher index first so the lower insertion position stays valid.
        self.points.insert(turn_end + 1, dorsal_point);
        self.segments.insert(turn_end + 1, SegmentType::DistalCap);
        self.points.insert(turn_start + 1, ventral_point);
        self.segments.insert(turn_start + 1, SegmentType::Straight);
        Ok(())
    }

    pub fn points(&self) -> &[Vec3] {
        &self.points
    }

    pub fn segments(&self) -> &[SegmentType] {
        &self.segments
    }

    pub fn segment_codes(&self) -> Vec<i32> {
        self.segments.iter().map(|s| s.code()).collect()
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn last_point(&self) -> Option<Vec3> {
        self.points.last().copied()
    }

    pub fn last_segment(&self) -> Option<SegmentType> {
        self.segments.last().copied()
    }

    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    pub fn time_since_last_insertion(&self) -> f64 {
        self.time_since_last_insertion
    }

    pub fn advance_stretch_clock(&mut self, dt: f64) {
        self.time_since_last_insertion += dt;
    }

    pub fn reset_stretch_clock(&mut self) {
        self.time_since_last_insertion = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Ventral run, a three-point turn, then a dorsal run.
    fn turned_path() -> PathTracker {
        let mut path = PathTracker::new(2.0);
        for z in [0.0, 2.0, 4.0] {
            path.append(Vec3::new(0.0, -10.0, z), SegmentType::Straight);
        }
        path.append(Vec3::new(7.0, -7.0, 5.0), SegmentType::Turn);
        path.append(Vec3::new(10.0, 0.0, 5.0), SegmentType::Turn);
        path.append(Vec3::new(7.0, 7.0, 5.0), SegmentType::Turn);
        for z in [4.0, 2.0] {
            path.append(Vec3::new(0.0, 10.0, z), SegmentType::DistalCap);
        }
        path
    }

    #[test]
    fn straight_path_is_evenly_spaced() {
        let path = PathTracker::straight(-10.0, 32.0, 2.0);
        assert_eq!(path.len(), 16);
        assert_eq!(path.last_point(), Some(Vec3::new(0.0, -10.0, 30.0)));
        for pair in path.points().windows(2) {
            assert!((pair[0].distance(pair[1]) - 2.0).abs() < 1e-12);
        }
    }

    #[test]
    fn stretch_pair_inserts_at_both_turn_boundaries() {
        let mut path = turned_path();
        let before = path.clone();
        path.insert_stretch_pair(2.0).unwrap();

        assert_eq!(path.len(), before.len() + 2);
        let segments = path.segments();
        assert_eq!(segments[3], SegmentType::Straight);
        assert_eq!(path.points()[3], Vec3::new(0.0, -10.0, 6.0));
        // Turn points shifted, still contiguous.
        for i in 4..7 {
            assert_eq!(segments[i], SegmentType::Turn);
            assert_eq!(path.points()[i], before.points()[i - 1].offset_z(2.0));
        }
        assert_eq!(segments[7], SegmentType::DistalCap);
        assert_eq!(path.points()[7], Vec3::new(0.0, 10.0, 6.0));
        assert_eq!(path.points()[8], before.points()[6]);
        assert_eq!(path.points()[9], before.points()[7]);
    }

    #[test]
    fn stretch_without_turn_is_an_error() {
        let mut path = PathTracker::straight(-10.0, 10.0, 2.0);
        let err = path.insert_stretch_pair(2.0).unwrap_err();
        assert!(matches!(err, GermlineError::TurnBoundaryNotFound(_, 5)));
        assert_eq!(path.len(), 5);
    }

    #[test]
    fn from_parts_rejects_mismatched_lengths() {
        let points = vec![Vec3::zero(), Vec3::unit_z()];
        assert!(matches!(
            PathTracker::from_parts(points.clone(), &[0], 2.0, 0.0),
            Err(GermlineError::PathLengthMismatch { points: 2, types: 1 })
        ));
        assert!(matches!(
            PathTracker::from_parts(points, &[0, 3], 2.0, 0.0),
            Err(GermlineError::UnknownSegmentCode(3))
        ));
    }

    #[test]
    fn segment_codes_round_trip_through_from_parts() {
        let path = turned_path();
        let rebuilt =
            PathTracker::from_parts(path.points().to_vec(), &path.segment_codes(), 2.0, 0.0).unwrap();
        assert_eq!(rebuilt, path);
    }
}
