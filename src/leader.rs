//! Migration of the distal tip cell and the path it lays down.

use germline_common::{SimClock, SimParams, Vec3};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::GermlineError;
use crate::path::{PathTracker, SegmentType};
use crate::population::Population;

/// Tolerance for the spacing comparison on accumulated float steps.
const SPACING_EPSILON: f64 = 1e-9;

/// Everything needed to build (or rehydrate) a leader cell mover.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderCheckpoint {
    pub turn_gene: bool,
    pub halt_gene: bool,
    pub time_since_last_stretch: f64,
    pub path_points: Vec<Vec3>,
    pub path_types: Vec<i32>,
    pub position: Vec3,
    pub point_spacing: f64,
}

/// What happened during one leader step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LeaderStep {
    pub position: Vec3,
    pub speed: f64,
    pub appended: bool,
    pub stretched: bool,
}

#[derive(Debug, Clone)]
pub struct LeaderCellMover {
    position: Vec3,
    turn_gene: bool,
    halt_gene: bool,
    turn_completed: bool,
    body_radius: f64,
    stretch_rate: f64,
    /// Reference for the first spacing check while the path is empty.
    path_anchor: Vec3,
    path: PathTracker,
}

impl LeaderCellMover {
    pub fn new(init: LeaderCheckpoint, params: &SimParams) -> Result<Self, GermlineError> {
        let path = PathTracker::from_parts(
            init.path_points,
            &init.path_types,
            init.point_spacing,
            init.time_since_last_stretch,
        )?;
        Ok(LeaderCellMover {
            position: init.position,
            turn_gene: init.turn_gene,
            halt_gene: init.halt_gene,
            turn_completed: false,
            body_radius: params.body_radius,
            stretch_rate: params.stretch_rate,
            path_anchor: init.position,
            path,
        })
    }

    pub fn checkpoint(&self) -> LeaderCheckpoint {
        LeaderCheckpoint {
            turn_gene: self.turn_gene,
            halt_gene: self.halt_gene,
            time_since_last_stretch: self.path.time_since_last_insertion(),
            path_points: self.path.points().to_vec(),
            path_types: self.path.segment_codes(),
            position: self.position,
            point_spacing: self.path.spacing(),
        }
    }

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn path(&self) -> &PathTracker {
        &self.path
    }

    pub fn turn_gene(&self) -> bool {
        self.turn_gene
    }

    pub fn halt_gene(&self) -> bool {
        self.halt_gene
    }

    pub fn turn_completed(&self) -> bool {
        self.turn_completed
    }

    /// Switches the gene flags on once the worm is old enough. Never switches them off.
    pub fn update_genes(&mut self, time: f64, params: &SimParams) {
        let age = time + params.worm_age_offset;
        if !self.turn_gene && age > params.turn_gene_age {
            self.turn_gene = true;
            info!("Leader cell turn gene activated at t={:.2} h (age {:.2} h).", time, age);
        }
        if !self.halt_gene && age > params.halt_gene_age {
            self.halt_gene = true;
            info!("Leader cell halt gene activated at t={:.2} h (age {:.2} h).", time, age);
        }
    }

    /// Speed for the developmental window containing `time`.
    pub fn scheduled_speed(time: f64, params: &SimParams) -> f64 {
        let window = params
            .speed_window_ends
            .iter()
            .take_while(|end| time >= **end)
            .count();
        params.leader_speeds[window]
    }

    /// True if some follower is close behind the leader, or halting is disabled.
    pub fn is_being_pushed(population: &Population, params: &SimParams) -> bool {
        !params.halting_enabled
            || population
                .cells()
                .iter()
                .any(|c| !c.data.is_leader() && c.data.distance_from_leader() < params.push_proximity)
    }

    /// Advances the leader by one step and updates the path.
    pub fn step(
        &mut self,
        clock: &SimClock,
        being_pushed: bool,
        params: &SimParams,
    ) -> Result<LeaderStep, GermlineError> {
        let time = clock.time();
        let dt = clock.dt;

        // --- 1. Gene flags ---
        self.update_genes(time, params);

        // --- 2./3. Speed ---
        let speed = if self.halt_gene || !being_pushed {
            0.0
        } else {
            Self::scheduled_speed(time, params)
        };

        // --- 4./5. Move ---
        let mut segment = None;
        if speed > 0.0 {
            segment = Some(if self.turn_gene {
                self.turn_or_retreat(speed * dt, params)
            } else {
                self.position.z += speed * dt;
                SegmentType::Straight
            });
        }

        // --- 7. Path points ---
        let mut appended = false;
        if let Some(segment) = segment {
            let reference = self.path.last_point().unwrap_or(self.path_anchor);
            let moved = self.position.distance(reference);
            let spacing = self.path.spacing();
            if moved + SPACING_EPSILON >= spacing {
                if moved - spacing > params.spacing_overshoot_tolerance {
                    warn!(
                        "Leader moved {:.3} since the last path point (spacing {:.3}) at t={:.2} h; timestep is likely too large.",
                        moved, spacing, time
                    );
                }
                self.path.append(self.position, segment);
                appended = true;
            }
        }

        // --- 8. Stretching ---
        let stretched = self.stretch_if_due(time, dt, params)?;

        Ok(LeaderStep { position: self.position, speed, appended, stretched })
    }

    /// Leader step wired to a population: reads pushing cells, writes the leader position back.
    pub fn step_population(
        &mut self,
        population: &mut Population,
        clock: &SimClock,
        params: &SimParams,
    ) -> Result<LeaderStep, GermlineError> {
        let pushed = Self::is_being_pushed(population, params);
        let outcome = self.step(clock, pushed, params)?;
        // --- 6. Record position ---
        if let Some(leader) = population.leader_mut() {
            leader.position = outcome.position;
        }
        Ok(outcome)
    }

    /// Angular position on the body cross-section, zero at the dorsal side.
    pub fn cross_section_angle(&self) -> f64 {
        let ratio = (self.position.x / self.body_radius).clamp(-1.0, 1.0);
        let principal = ratio.asin();
        let (x, y) = (self.position.x, self.position.y);
        if y <= 0.0 && x >= 0.0 {
            std::f64::consts::PI - principal
        } else if y <= 0.0 && x < 0.0 {
            -std::f64::consts::PI - principal
        } else {
            principal
        }
    }

    /// One constant-arc-length step around the body, or an axial retreat once the turn is done.
    fn turn_or_retreat(&mut self, distance: f64, params: &SimParams) -> SegmentType {
        let theta = if self.turn_completed { 0.0 } else { self.cross_section_angle() };
        let band = params.turn_completion_band;

        if theta.abs() <= band {
            if !self.turn_completed {
                debug!("Leader turn complete at z={:.2}.", self.position.z);
            }
            self.turn_completed = true;
            self.position.z -= distance;
            return SegmentType::DistalCap;
        }

        let increment = distance / self.body_radius;
        // Clamped at zero so the angle never swings past the dorsal side.
        let new_theta = if theta > 0.0 {
            (theta - increment).max(0.0)
        } else {
            (theta + increment).min(0.0)
        };
        self.position.x = self.body_radius * new_theta.sin();
        self.position.y = self.body_radius * new_theta.cos();
        SegmentType::Turn
    }

    fn stretch_if_due(&mut self, time: f64, dt: f64, params: &SimParams) -> Result<bool, GermlineError> {
        let in_window = time > params.stretch_window_start && time < params.stretch_window_end;
        if !in_window || self.path.last_segment() != Some(SegmentType::DistalCap) {
            return Ok(false);
        }
        if self.path.time_since_last_insertion() > self.path.spacing() / self.stretch_rate {
            self.path.insert_stretch_pair(self.path.spacing())?;
            self.path.reset_stretch_clock();
            info!("Stretched gonad path at t={:.2} h; {} points.", time, self.path.len());
            Ok(true)
        } else {
            self.path.advance_stretch_clock(dt);
            Ok(false)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use germline_common::SimulationConfig;

    fn params(body_radius: f64, spacing: f64, speed: f64) -> SimParams {
        let mut params = SimulationConfig::default().get_sim_params();
        params.body_radius = body_radius;
        params.path_spacing = spacing;
        params.leader_speeds = [speed; 4];
        params.turn_gene_age = f64::INFINITY;
        params.halt_gene_age = f64::INFINITY;
        params.stretch_window_start = f64::INFINITY;
        params
    }

    fn mover_at(position: Vec3, turn_gene: bool, spacing: f64, params: &SimParams) -> LeaderCellMover {
        let init = LeaderCheckpoint {
            turn_gene,
            halt_gene: false,
            time_since_last_stretch: 0.0,
            path_points: Vec::new(),
            path_types: Vec::new(),
            position,
            point_spacing: spacing,
        };
        LeaderCellMover::new(init, params).unwrap()
    }

    #[test]
    fn stationary_without_pushing_cells() {
        let params = params(10.0, 2.0, 1.0);
        let mut mover = mover_at(Vec3::zero(), false, 2.0, &params);
        for step in 0..20 {
            let outcome = mover.step(&SimClock::new(step, 1.0), false, &params).unwrap();
            assert_eq!(outcome.speed, 0.0);
        }
        assert_eq!(mover.position(), Vec3::zero());
        assert!(mover.path().is_empty());
    }

    #[test]
    fn pushed_leader_advances_and_lays_points() {
        let params = params(10.0, 2.0, 1.0);
        let mut mover = mover_at(Vec3::zero(), false, 2.0, &params);
        for step in 0..20 {
            mover.step(&SimClock::new(step, 1.0), true, &params).unwrap();
        }
        assert!((mover.position().z - 20.0).abs() < 1e-9);
        assert_eq!(mover.path().len(), 10);
        assert!(mover.path().segments().iter().all(|s| *s == SegmentType::Straight));
        assert!((mover.path().last_point().unwrap().z - 20.0).abs() < 1e-9);
    }

    #[test]
    fn consecutive_points_stay_within_spacing_tolerance() {
        let params = params(10.0, 2.0, 10.0);
        let mut mover = mover_at(Vec3::new(0.0, -10.0, 0.0), false, 2.0, &params);
        let dt = 0.001;
        for step in 0..12000 {
            if step == 3000 {
                mover.turn_gene = true;
            }
            mover.step(&SimClock::new(step, dt), true, &params).unwrap();
        }
        let points = mover.path().points();
        assert!(points.len() > 10);
        for pair in points.windows(2) {
            let gap = pair[0].distance(pair[1]);
            assert!(gap <= 2.0 + params.spacing_overshoot_tolerance, "gap {}", gap);
        }
    }

    #[test]
    fn turn_angle_never_grows() {
        let params = params(10.0, 2.0, 5.0);
        for start in [
            Vec3::new(0.0, -10.0, 0.0),
            Vec3::new(6.0, -8.0, 0.0),
            Vec3::new(-6.0, -8.0, 0.0),
            Vec3::new(8.0, 6.0, 0.0),
            Vec3::new(-8.0, 6.0, 0.0),
        ] {
            let mut mover = mover_at(start, true, 2.0, &params);
            let mut previous = mover.cross_section_angle().abs();
            for step in 0..400 {
                mover.step(&SimClock::new(step, 0.05), true, &params).unwrap();
                let theta = if mover.turn_completed() { 0.0 } else { mover.cross_section_angle().abs() };
                assert!(theta <= previous + 1e-9, "angle grew from {} to {} starting at {:?}", previous, theta, start);
                previous = theta;
            }
            assert!(mover.turn_completed(), "turn never completed from {:?}", start);
        }
    }

    #[test]
    fn turn_ends_on_dorsal_side_and_retreats() {
        let params = params(10.0, 2.0, 5.0);
        let mut mover = mover_at(Vec3::new(0.0, -10.0, 30.0), true, 2.0, &params);
        for step in 0..400 {
            mover.step(&SimClock::new(step, 0.05), true, &params).unwrap();
        }
        let position = mover.position();
        assert!(position.y > 9.9);
        assert!(position.z < 30.0);
        assert_eq!(mover.path().last_segment(), Some(SegmentType::DistalCap));
    }

    #[test]
    fn speed_schedule_uses_open_ended_last_window() {
        let mut params = params(10.0, 2.0, 1.0);
        params.leader_speeds = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(LeaderCellMover::scheduled_speed(0.0, &params), 1.0);
        assert_eq!(LeaderCellMover::scheduled_speed(3.5, &params), 2.0);
        assert_eq!(LeaderCellMover::scheduled_speed(10.0, &params), 3.0);
        assert_eq!(LeaderCellMover::scheduled_speed(16.0, &params), 4.0);
        assert_eq!(LeaderCellMover::scheduled_speed(40.0, &params), 4.0);
    }

    #[test]
    fn halt_gene_stops_a_pushed_leader() {
        let mut params = params(10.0, 2.0, 1.0);
        params.halt_gene_age = params.worm_age_offset + 5.5;
        let mut mover = mover_at(Vec3::zero(), false, 2.0, &params);
        for step in 0..20 {
            mover.step(&SimClock::new(step, 1.0), true, &params).unwrap();
        }
        assert!(mover.halt_gene());
        assert!((mover.position().z - 6.0).abs() < 1e-9);
    }

    #[test]
    fn stretch_fires_once_cap_points_exist() {
        let mut params = params(10.0, 2.0, 5.0);
        params.stretch_rate = 4.0;
        params.stretch_window_start = 0.0;
        params.stretch_window_end = 100.0;
        let mut points = Vec::new();
        let mut codes = Vec::new();
        for z in [0.0, 2.0, 4.0] {
            points.push(Vec3::new(0.0, -10.0, z));
            codes.push(0);
        }
        points.push(Vec3::new(10.0, 0.0, 4.0));
        codes.push(1);
        points.push(Vec3::new(0.0, 10.0, 4.0));
        codes.push(2);
        let init = LeaderCheckpoint {
            turn_gene: true,
            halt_gene: false,
            time_since_last_stretch: 0.0,
            path_points: points,
            path_types: codes,
            position: Vec3::new(0.0, 10.0, 4.0),
            point_spacing: 2.0,
        };
        let mut mover = LeaderCellMover::new(init, &params).unwrap();
        let mut stretches = 0;
        // Halted: only the stretch clock runs.
        for step in 0..12 {
            let outcome = mover.step(&SimClock::new(step, 0.1), false, &params).unwrap();
            if outcome.stretched {
                stretches += 1;
            }
        }
        assert_eq!(stretches, 1);
        assert_eq!(mover.path().len(), 7);
        assert!(mover.path().time_since_last_insertion() <= 0.5 + 1e-9);
    }

    #[test]
    fn checkpoint_rehydrates_identical_mover() {
        let params = params(10.0, 2.0, 1.0);
        let mut mover = mover_at(Vec3::zero(), false, 2.0, &params);
        for step in 0..7 {
            mover.step(&SimClock::new(step, 1.0), true, &params).unwrap();
        }
        let saved = mover.checkpoint();
        let restored = LeaderCellMover::new(saved.clone(), &params).unwrap();
        assert_eq!(restored.checkpoint(), saved);
        assert_eq!(restored.path(), mover.path());
    }
}
