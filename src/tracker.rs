//! Change detection for synchronized entities.
//!
//! [`MovementTracker`] decides when a source or listener pose is worth
//! resending. [`GeometryTracker`] collects room edits as they happen and
//! releases them at most once per update interval.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use glam::{EulerRot, Mat4, Vec3};

/// Default translation threshold in meters.
pub const DEFAULT_THRESHOLD_LOC: f32 = 0.1;
/// Default rotation threshold in degrees.
pub const DEFAULT_THRESHOLD_ROT: f32 = 1.0;

/// Pose-delta detector for movable entities.
#[derive(Debug, Clone)]
pub struct MovementTracker {
    threshold_loc: f32,
    threshold_rot: f32,
    baseline: Option<Mat4>,
}

impl Default for MovementTracker {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD_LOC, DEFAULT_THRESHOLD_ROT)
    }
}

impl MovementTracker {
    /// Negative thresholds are clamped to zero.
    pub fn new(threshold_loc: f32, threshold_rot: f32) -> Self {
        Self {
            threshold_loc: threshold_loc.max(0.0),
            threshold_rot: threshold_rot.max(0.0),
            baseline: None,
        }
    }

    pub fn thresholds(&self) -> (f32, f32) {
        (self.threshold_loc, self.threshold_rot)
    }

    /// Compare `current` with the last confirmed pose.
    ///
    /// Always true when there is no baseline yet. When true, `current`
    /// becomes the new baseline; otherwise the baseline is kept, so slow
    /// drift still trips the threshold eventually.
    pub fn has_moved(&mut self, current: Mat4) -> bool {
        let moved = match &self.baseline {
            None => true,
            Some(baseline) => pose_differs(&current, baseline, self.threshold_loc, self.threshold_rot),
        };
        if moved {
            self.baseline = Some(current);
        }
        moved
    }

    /// Forget the baseline so the next check reports movement.
    pub fn reset(&mut self) {
        self.baseline = None;
    }
}

/// Per-axis pose comparison.
///
/// True if any translation axis differs by more than `threshold_loc` or any
/// Euler angle differs by more than `threshold_rot` degrees.
pub fn pose_differs(a: &Mat4, b: &Mat4, threshold_loc: f32, threshold_rot: f32) -> bool {
    let (ta, ra) = translation_and_euler(a);
    let (tb, rb) = translation_and_euler(b);

    (0..3).any(|axis| {
        let loc_delta = (ta[axis] - tb[axis]).abs();
        let rot_delta = wrap_degrees(ra[axis] - rb[axis]).abs();
        loc_delta > threshold_loc || rot_delta > threshold_rot
    })
}

/// Translation and XYZ Euler angles (degrees, indexed x/y/z) of a transform.
fn translation_and_euler(m: &Mat4) -> (Vec3, Vec3) {
    let (_scale, rotation, translation) = m.to_scale_rotation_translation();
    let (z, y, x) = rotation.to_euler(EulerRot::ZYX);
    (
        translation,
        Vec3::new(x.to_degrees(), y.to_degrees(), z.to_degrees()),
    )
}

/// Map an angle difference into [-180, 180] so that 359° vs -1° compare equal.
fn wrap_degrees(delta: f32) -> f32 {
    let wrapped = (delta + 180.0).rem_euclid(360.0) - 180.0;
    if wrapped == -180.0 {
        180.0
    } else {
        wrapped
    }
}

/// Throttled dirty flag for room geometry.
///
/// Edits set a shared *pending* flag, typically from a scene mutation
/// callback. [`poll`](Self::poll) promotes *pending* to *confirmed* once the
/// current time reaches the next allowed update, then pushes that time one
/// interval ahead.
#[derive(Debug)]
pub struct GeometryTracker {
    pending: Arc<AtomicBool>,
    confirmed: bool,
    interval: f64,
    next_update_time: f64,
    material_snapshot: Vec<Vec<String>>,
}

impl GeometryTracker {
    /// A new tracker starts pending so the first poll releases an update.
    pub fn new(interval: f64) -> Self {
        Self {
            pending: Arc::new(AtomicBool::new(true)),
            confirmed: false,
            interval: interval.max(0.0),
            next_update_time: f64::NEG_INFINITY,
            material_snapshot: Vec::new(),
        }
    }

    /// Shared handle to the pending flag, for use inside mutation callbacks.
    pub fn pending_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.pending)
    }

    pub fn mark_pending(&self) {
        self.pending.store(true, Ordering::SeqCst);
    }

    pub fn is_pending(&self) -> bool {
        self.pending.load(Ordering::SeqCst)
    }

    /// Record the material slots of every room object, marking the room
    /// pending when they differ from the previous snapshot.
    pub fn observe_materials(&mut self, slots: Vec<Vec<String>>) {
        if slots != self.material_snapshot {
            if !self.material_snapshot.is_empty() {
                log::debug!("room material slots changed");
                self.mark_pending();
            }
            self.material_snapshot = slots;
        }
    }

    /// Run the time gate. Returns true when a confirmed update is waiting.
    pub fn poll(&mut self, now: f64) -> bool {
        if now >= self.next_update_time && self.pending.swap(false, Ordering::SeqCst) {
            self.confirmed = true;
            self.next_update_time = now + self.interval;
        }
        self.confirmed
    }

    /// Consume the confirmed flag.
    pub fn take_confirmed(&mut self) -> bool {
        std::mem::take(&mut self.confirmed)
    }

    pub fn next_update_time(&self) -> f64 {
        self.next_update_time
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    fn pose(x: f32, y: f32, z: f32, yaw_degrees: f32) -> Mat4 {
        Mat4::from_rotation_translation(
            Quat::from_rotation_z(yaw_degrees.to_radians()),
            Vec3::new(x, y, z),
        )
    }

    #[test]
    fn test_first_check_always_moves() {
        let mut tracker = MovementTracker::new(100.0, 100.0);
        assert!(tracker.has_moved(Mat4::IDENTITY));
        assert!(!tracker.has_moved(Mat4::IDENTITY));
    }

    #[test]
    fn test_below_thresholds_is_not_movement() {
        let mut tracker = MovementTracker::new(0.1, 1.0);
        tracker.has_moved(pose(0.0, 0.0, 0.0, 0.0));
        assert!(!tracker.has_moved(pose(0.05, -0.05, 0.09, 0.5)));
    }

    #[test]
    fn test_single_axis_over_threshold_moves() {
        let mut tracker = MovementTracker::new(0.1, 1.0);
        tracker.has_moved(pose(0.0, 0.0, 0.0, 0.0));
        assert!(tracker.has_moved(pose(0.0, 0.2, 0.0, 0.0)));

        // Rotation alone also counts
        assert!(tracker.has_moved(pose(0.0, 0.2, 0.0, 1.5)));
    }

    #[test]
    fn test_baseline_kept_until_threshold_crossed() {
        let mut tracker = MovementTracker::new(0.1, 1.0);
        tracker.has_moved(pose(0.0, 0.0, 0.0, 0.0));

        // Two small steps: each under threshold relative to the first pose,
        // the second one crosses it
        assert!(!tracker.has_moved(pose(0.06, 0.0, 0.0, 0.0)));
        assert!(tracker.has_moved(pose(0.12, 0.0, 0.0, 0.0)));
        // New baseline is 0.12
        assert!(!tracker.has_moved(pose(0.15, 0.0, 0.0, 0.0)));
    }

    #[test]
    fn test_diagonal_under_per_axis_threshold() {
        // Each axis moves 0.09, the norm is larger than 0.1 but no axis crosses
        let mut tracker = MovementTracker::new(0.1, 1.0);
        tracker.has_moved(pose(0.0, 0.0, 0.0, 0.0));
        assert!(!tracker.has_moved(pose(0.09, 0.09, 0.09, 0.0)));
    }

    #[test]
    fn test_scale_is_ignored() {
        let mut tracker = MovementTracker::new(0.1, 1.0);
        tracker.has_moved(Mat4::IDENTITY);
        assert!(!tracker.has_moved(Mat4::from_scale(Vec3::splat(3.0))));
    }

    #[test]
    fn test_reset_forces_update() {
        let mut tracker = MovementTracker::default();
        tracker.has_moved(Mat4::IDENTITY);
        tracker.reset();
        assert!(tracker.has_moved(Mat4::IDENTITY));
    }

    #[test]
    fn test_negative_thresholds_clamped() {
        let tracker = MovementTracker::new(-1.0, -5.0);
        assert_eq!(tracker.thresholds(), (0.0, 0.0));
    }

    #[test]
    fn test_wrap_degrees() {
        assert!((wrap_degrees(360.0 - 0.5) - (-0.5)).abs() < 1e-4);
        assert!((wrap_degrees(-359.0) - 1.0).abs() < 1e-4);
        assert_eq!(wrap_degrees(180.0), 180.0);
    }

    #[test]
    fn test_geometry_first_poll_releases_update() {
        let mut tracker = GeometryTracker::new(1.0);
        assert!(tracker.poll(0.0));
        assert!(tracker.take_confirmed());
        assert!(!tracker.poll(0.05));
    }

    #[test]
    fn test_geometry_throttled_to_interval() {
        let mut tracker = GeometryTracker::new(1.0);
        tracker.poll(0.0);
        tracker.take_confirmed();

        // Edits inside the interval stay pending
        tracker.mark_pending();
        assert!(!tracker.poll(0.5));
        assert!(tracker.is_pending());

        // Gate opens at t = 1.0
        assert!(tracker.poll(1.0));
        assert!(tracker.take_confirmed());
        assert!(!tracker.is_pending());
        assert_eq!(tracker.next_update_time(), 2.0);
    }

    #[test]
    fn test_geometry_idle_gate_does_not_push_timer() {
        let mut tracker = GeometryTracker::new(1.0);
        tracker.poll(0.0);
        tracker.take_confirmed();

        // Nothing pending at t = 5, so the timer does not move
        assert!(!tracker.poll(5.0));
        assert_eq!(tracker.next_update_time(), 1.0);

        tracker.mark_pending();
        assert!(tracker.poll(5.1));
    }

    #[test]
    fn test_material_snapshot_changes_mark_pending() {
        let mut tracker = GeometryTracker::new(0.0);
        tracker.poll(0.0);
        tracker.take_confirmed();

        tracker.observe_materials(vec![vec!["Brick".to_string()]]);
        // First snapshot is only a baseline
        assert!(!tracker.is_pending());

        tracker.observe_materials(vec![vec!["Brick".to_string()]]);
        assert!(!tracker.is_pending());

        tracker.observe_materials(vec![vec!["Carpet".to_string()]]);
        assert!(tracker.is_pending());
    }

    #[test]
    fn test_pending_flag_is_shared() {
        let mut tracker = GeometryTracker::new(0.0);
        tracker.poll(0.0);
        tracker.take_confirmed();

        let flag = tracker.pending_flag();
        flag.store(true, Ordering::SeqCst);
        assert!(tracker.poll(0.1));
    }
}
