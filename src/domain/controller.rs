//! Orientation to movement mapping
//!
//! Turns device orientation samples into [`Movement`] vectors relative to a
//! calibrated center pose.

use crate::domain::angle::angle_diff;
use crate::domain::models::{Axis, Movement, Orientation, MAX_AXIS};
use crate::domain::settings::ControllerSettings;

pub struct OrientationMapper {
    settings: ControllerSettings,
    center: Option<Orientation>,
    // Last computed deviations, kept for display/debug
    diff: Orientation,
    enabled: bool,
    altitude: i8,
    last_emitted: Option<Movement>,
}

impl OrientationMapper {
    pub fn new(settings: ControllerSettings) -> Self {
        Self {
            settings,
            center: None,
            diff: Orientation::default(),
            enabled: false,
            altitude: 0,
            last_emitted: None,
        }
    }

    /// Forget the center pose; the next sample becomes the new center
    pub fn calibrate(&mut self) {
        self.center = None;
        tracing::debug!("Orientation calibration requested");
    }

    /// Open or close the movement gate.
    ///
    /// Enabling always recalibrates and re-emits the zero baseline.
    pub fn set_enabled(&mut self, enabled: bool) {
        if enabled {
            self.calibrate();
            self.last_emitted = None;
        }
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn center(&self) -> Option<Orientation> {
        self.center
    }

    pub fn diff(&self) -> Orientation {
        self.diff
    }

    /// Last emitted movement; zero while calibration is pending or the gate is closed
    pub fn movement(&self) -> Movement {
        match (self.enabled, self.last_emitted) {
            (true, Some(movement)) => movement,
            _ => Movement::ZERO,
        }
    }

    /// Map a sample, returning a movement only when it differs from the previous one
    pub fn map(&mut self, sample: &Orientation) -> Option<Movement> {
        if !self.enabled {
            return None;
        }

        let movement = self.compute(sample);
        if self.last_emitted == Some(movement) {
            return None;
        }

        self.last_emitted = Some(movement);
        Some(movement)
    }

    /// Update the altitude control input
    pub fn set_altitude(&mut self, altitude: i32) -> Option<Movement> {
        self.altitude = altitude.clamp(-(MAX_AXIS as i32), MAX_AXIS as i32) as i8;

        if !self.enabled {
            return None;
        }
        let last = self.last_emitted?;
        let updated = last.with(Axis::Altitude, self.altitude as i32);
        if updated == last {
            return None;
        }

        self.last_emitted = Some(updated);
        Some(updated)
    }

    fn compute(&mut self, sample: &Orientation) -> Movement {
        let center = *self.center.get_or_insert(*sample);

        self.diff = Orientation {
            alpha: angle_diff(center.alpha, sample.alpha),
            beta: angle_diff(center.beta, sample.beta),
            gamma: angle_diff(center.gamma, sample.gamma),
        };

        let sensitivity = self.settings.sensitivity;
        let max_diff = self.settings.max_diff;
        let max_speed = self.settings.max_speed.min(MAX_AXIS as u8) as i32;

        let pitch = proportional(self.diff.beta, sensitivity.pitch, max_diff.pitch, max_speed);
        // Tilting right raises gamma, so the diff is negative for a right bank
        let roll = -proportional(self.diff.gamma, sensitivity.roll, max_diff.roll, max_speed);
        // Roll wins over yaw so the drone never banks and turns at once
        let yaw = if roll == 0 {
            proportional(self.diff.alpha, sensitivity.yaw, max_diff.yaw, max_speed)
        } else {
            0
        };

        Movement::new(yaw, pitch, roll, self.altitude as i32)
    }
}

/// Dead zone below `sensitivity`, saturation at `max_diff`, linear in between
fn proportional(diff: f64, sensitivity: f64, max_diff: f64, max_speed: i32) -> i32 {
    let magnitude = diff.abs();
    if magnitude < sensitivity {
        return 0;
    }

    let speed = if magnitude >= max_diff {
        max_speed
    } else {
        ((magnitude - sensitivity) / (max_diff - sensitivity) * max_speed as f64).floor() as i32
    };

    if diff < 0.0 {
        -speed
    } else {
        speed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::AxisThresholds;

    fn settings(max_speed: u8) -> ControllerSettings {
        ControllerSettings {
            sensitivity: AxisThresholds {
                yaw: 20.0,
                pitch: 15.0,
                roll: 20.0,
            },
            max_diff: AxisThresholds {
                yaw: 60.0,
                pitch: 50.0,
                roll: 50.0,
            },
            max_speed,
        }
    }

    fn enabled_mapper(max_speed: u8) -> OrientationMapper {
        let mut mapper = OrientationMapper::new(settings(max_speed));
        mapper.set_enabled(true);
        mapper
    }

    #[test]
    fn test_first_sample_after_calibration_is_zero() {
        let mut mapper = enabled_mapper(100);
        let first = mapper.map(&Orientation::new(120.0, 33.0, -12.0));
        assert_eq!(first, Some(Movement::ZERO));
        assert_eq!(mapper.center(), Some(Orientation::new(120.0, 33.0, -12.0)));

        mapper.map(&Orientation::new(120.0, 80.0, -12.0));
        mapper.calibrate();
        let recentered = mapper.map(&Orientation::new(10.0, 10.0, 10.0));
        assert_eq!(recentered, Some(Movement::ZERO));
    }

    #[test]
    fn test_pitch_scenario() {
        let mut mapper = enabled_mapper(100);
        mapper.map(&Orientation::new(0.0, 0.0, 0.0));

        // diff is center - current, so leaning back by 40 gives -40
        let movement = mapper.map(&Orientation::new(10.0, 40.0, 0.0)).unwrap();
        assert_eq!(mapper.diff().beta, -40.0);
        assert_eq!(movement.pitch(), -71);
        // alpha diff of 10 is inside the yaw dead zone
        assert_eq!(movement.yaw(), 0);

        let mut mapper = enabled_mapper(100);
        mapper.map(&Orientation::new(0.0, 40.0, 0.0));
        let movement = mapper.map(&Orientation::new(10.0, 0.0, 0.0)).unwrap();
        assert_eq!(mapper.diff().beta, 40.0);
        assert_eq!(movement.pitch(), 71);
    }

    #[test]
    fn test_pitch_thresholds_and_monotonic_scale() {
        assert_eq!(proportional(14.0, 15.0, 50.0, 100), 0);
        assert_eq!(proportional(15.0, 15.0, 50.0, 100), 0);
        assert_eq!(proportional(50.0, 15.0, 50.0, 100), 100);
        assert_eq!(proportional(90.0, 15.0, 50.0, 100), 100);
        assert_eq!(proportional(40.0, 15.0, 50.0, 100), 71);
        assert_eq!(proportional(-40.0, 15.0, 50.0, 100), -71);

        let mut previous = 0;
        for beta in 15..=50 {
            let speed = proportional(beta as f64, 15.0, 50.0, 100);
            assert!(speed >= previous);
            previous = speed;
        }
    }

    #[test]
    fn test_pitch_through_mapper_boundaries() {
        let mut mapper = enabled_mapper(60);
        mapper.map(&Orientation::new(0.0, 50.0, 0.0));

        // diff.beta = center - current = 14
        let below = mapper.map(&Orientation::new(0.0, 36.0, 0.0));
        assert_eq!(below, None, "still zero, suppressed as unchanged");
        assert_eq!(mapper.movement().pitch(), 0);

        let saturated = mapper.map(&Orientation::new(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(saturated.pitch(), 60);
    }

    #[test]
    fn test_roll_has_priority_over_yaw() {
        let mut mapper = enabled_mapper(100);
        mapper.map(&Orientation::new(100.0, 0.0, 0.0));

        // Large alpha diff alone yields yaw
        let turning = mapper.map(&Orientation::new(40.0, 0.0, 0.0)).unwrap();
        assert_eq!(turning.yaw(), 100);
        assert_eq!(turning.roll(), 0);

        // Same alpha diff while banking: yaw forced to zero
        let banking = mapper.map(&Orientation::new(40.0, 0.0, 35.0)).unwrap();
        assert_eq!(banking.roll(), 50);
        assert_eq!(banking.yaw(), 0);
    }

    #[test]
    fn test_roll_sign_follows_tilt() {
        let mut mapper = enabled_mapper(100);
        mapper.map(&Orientation::new(0.0, 0.0, 0.0));

        let right = mapper.map(&Orientation::new(0.0, 0.0, 50.0)).unwrap();
        assert_eq!(right.roll(), 100);
        let left = mapper.map(&Orientation::new(0.0, 0.0, -50.0)).unwrap();
        assert_eq!(left.roll(), -100);
    }

    #[test]
    fn test_unchanged_movement_is_suppressed() {
        let mut mapper = enabled_mapper(100);
        assert!(mapper.map(&Orientation::new(0.0, 0.0, 0.0)).is_some());
        assert!(mapper.map(&Orientation::new(0.0, 1.0, 0.0)).is_none());
        assert!(mapper.map(&Orientation::new(0.0, -5.0, 2.0)).is_none());
        assert!(mapper.map(&Orientation::new(0.0, -30.0, 0.0)).is_some());
        assert!(mapper.map(&Orientation::new(0.0, -30.0, 0.0)).is_none());
    }

    #[test]
    fn test_gate_defers_calibration() {
        let mut mapper = OrientationMapper::new(settings(100));
        assert_eq!(mapper.map(&Orientation::new(10.0, 10.0, 10.0)), None);
        assert_eq!(mapper.center(), None);
        assert_eq!(mapper.movement(), Movement::ZERO);

        mapper.set_enabled(true);
        assert_eq!(
            mapper.map(&Orientation::new(50.0, 50.0, 50.0)),
            Some(Movement::ZERO)
        );
        assert_eq!(mapper.center(), Some(Orientation::new(50.0, 50.0, 50.0)));

        mapper.set_enabled(false);
        assert_eq!(mapper.map(&Orientation::new(0.0, 0.0, 0.0)), None);
        assert_eq!(mapper.movement(), Movement::ZERO);

        // Re-enabling recaptures the center and re-emits the baseline
        mapper.set_enabled(true);
        assert_eq!(
            mapper.map(&Orientation::new(0.0, 0.0, 0.0)),
            Some(Movement::ZERO)
        );
    }

    #[test]
    fn test_altitude_control_input() {
        let mut mapper = enabled_mapper(100);
        assert_eq!(mapper.set_altitude(30), None, "nothing emitted yet");

        let first = mapper.map(&Orientation::new(0.0, 0.0, 0.0)).unwrap();
        assert_eq!(first.altitude(), 30);

        let lowered = mapper.set_altitude(-250).unwrap();
        assert_eq!(lowered.altitude(), -100);
        assert_eq!(mapper.set_altitude(-100), None);
    }
}
