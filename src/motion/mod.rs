//! Device Motion Layer
//!
//! Samples gravity at a fixed interval and publishes the derived frame
//! rotation through a lock-free cell. Readers may see a value up to one
//! sampling interval old.

pub mod gravity;

use std::f64::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{info, trace};

pub use gravity::{FixedGravity, GravitySource, GravityVector, RecordedGravity};

/// Frame rotation implied by a gravity sample, in radians.
///
/// An upright device yields 2π (equivalently 0); a device tilted clockwise
/// by θ yields θ. The result lies in [0, 2π].
pub fn rotation_from_gravity(gravity: GravityVector) -> f64 {
    gravity.x.atan2(gravity.y) + PI
}

/// Wrap an angle into (-π, π]
pub fn wrap_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(2.0 * PI);
    if wrapped > PI {
        wrapped - 2.0 * PI
    } else {
        wrapped
    }
}

/// Last-writer-wins rotation cell shared between the motion thread and the
/// frame worker
#[derive(Debug, Default)]
pub struct RotationCell {
    bits: AtomicU64,
}

impl RotationCell {
    pub fn new(initial: f64) -> Self {
        Self {
            bits: AtomicU64::new(initial.to_bits()),
        }
    }

    /// Latest published rotation
    pub fn load(&self) -> f64 {
        f64::from_bits(self.bits.load(Ordering::Relaxed))
    }

    /// Publish a new rotation
    pub fn store(&self, rotation: f64) {
        self.bits.store(rotation.to_bits(), Ordering::Relaxed);
    }
}

/// Motion update configuration
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct MotionConfig {
    /// Sampling interval in milliseconds
    pub update_interval_ms: u64,
    /// Recorded gravity samples (`x,y,z` CSV)
    pub gravity_file: Option<std::path::PathBuf>,
    /// Fixed device tilt in degrees, used when no recording is given
    pub fixed_tilt_degrees: Option<f64>,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            update_interval_ms: 10,
            gravity_file: None,
            fixed_tilt_degrees: None,
        }
    }
}

impl MotionConfig {
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_interval_ms.max(1))
    }
}

/// Periodic gravity sampler
pub struct MotionManager;

impl MotionManager {
    /// Start sampling `source` every `interval`, writing rotations into `cell`
    pub fn start(
        mut source: Box<dyn GravitySource>,
        interval: Duration,
        cell: Arc<RotationCell>,
    ) -> std::io::Result<MotionHandle> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();

        let thread = std::thread::Builder::new()
            .name("motion".to_string())
            .spawn(move || {
                info!("Motion updates every {:?}", interval);
                while flag.load(Ordering::Acquire) {
                    if let Some(gravity) = source.sample() {
                        let rotation = rotation_from_gravity(gravity);
                        trace!("gravity {:?} -> rotation {:.3}", gravity, rotation);
                        cell.store(rotation);
                    }
                    std::thread::sleep(interval);
                }
            })?;

        Ok(MotionHandle {
            running,
            thread: Some(thread),
        })
    }
}

/// Handle to the motion sampling thread
pub struct MotionHandle {
    running: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl MotionHandle {
    /// Stop sampling and join the thread
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.thread.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MotionHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_rotation_matches_formula() {
        let samples = [
            GravityVector::new(0.3, -0.9, 0.1),
            GravityVector::new(-0.7, 0.2, 0.0),
            GravityVector::new(1.0, 0.0, 0.0),
            GravityVector::new(-0.0001, -1.0, 0.0),
        ];
        for g in samples {
            let expected = g.x.atan2(g.y) + PI;
            assert_eq!(rotation_from_gravity(g), expected);
        }
    }

    #[test]
    fn test_rotation_range() {
        for step in 0..360 {
            let g = GravityVector::from_tilt_degrees(step as f64);
            let r = rotation_from_gravity(g);
            assert!(r >= 0.0 && r <= 2.0 * PI + 1e-12, "{} out of range", r);
        }
    }

    #[test]
    fn test_tilt_round_trips_through_rotation() {
        for degrees in [-60.0f64, -10.0, 5.0, 30.0, 89.0] {
            let r = rotation_from_gravity(GravityVector::from_tilt_degrees(degrees));
            assert!((wrap_angle(r) - degrees.to_radians()).abs() < 1e-9);
        }
    }

    #[test]
    fn test_upright_is_no_correction() {
        let r = rotation_from_gravity(GravityVector::new(0.0, -1.0, 0.0));
        assert!(wrap_angle(r).abs() < 1e-12);
    }

    #[test]
    fn test_wrap_angle() {
        assert!((wrap_angle(3.0 * PI / 2.0) + PI / 2.0).abs() < 1e-12);
        assert!((wrap_angle(PI) - PI).abs() < 1e-12);
        assert!((wrap_angle(-PI / 4.0) + PI / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_rotation_cell_last_writer_wins() {
        let cell = RotationCell::default();
        assert_eq!(cell.load(), 0.0);
        cell.store(1.25);
        cell.store(-0.5);
        assert_eq!(cell.load(), -0.5);
    }

    struct SilentGravity;

    impl GravitySource for SilentGravity {
        fn sample(&mut self) -> Option<GravityVector> {
            None
        }
    }

    #[test]
    fn test_manager_publishes_rotation() {
        let cell = Arc::new(RotationCell::default());
        let source = Box::new(FixedGravity(GravityVector::from_tilt_degrees(30.0)));
        let mut handle = MotionManager::start(source, Duration::from_millis(1), cell.clone()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while cell.load() == 0.0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        handle.stop();

        assert!((cell.load() - 30f64.to_radians()).abs() < 1e-9);
    }

    #[test]
    fn test_missing_samples_leave_cell_untouched() {
        let cell = Arc::new(RotationCell::new(0.75));
        let mut handle =
            MotionManager::start(Box::new(SilentGravity), Duration::from_millis(1), cell.clone()).unwrap();
        std::thread::sleep(Duration::from_millis(10));
        handle.stop();

        assert_eq!(cell.load(), 0.75);
    }
}
