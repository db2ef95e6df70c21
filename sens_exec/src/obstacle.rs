//! # Obstacle monitor
//!
//! Samples the left and right ultrasonic rangers in a background thread and keeps a debounced
//! view of whether there is an obstacle in front of the robot. Each side has its own debouncer,
//! the obstacle is reported if either side is unsafe.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use serde::Serialize;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::debounce::{HysteresisDebouncer, Sample};
use crate::params::ObstacleParams;
use crate::ultrasonic::{read_or_sentinel, DistanceSensor};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Snapshot of the obstacle state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ObstacleStatus {
    /// Last left range.
    ///
    /// Units: centimeters
    pub left_cm: f64,

    /// Last right range.
    ///
    /// Units: centimeters
    pub right_cm: f64,

    /// Debounced obstacle state, either side
    pub obstacle_detected: bool,

    /// Instantaneous left reading within the danger distance
    pub obstacle_left: bool,

    /// Instantaneous right reading within the danger distance
    pub obstacle_right: bool,

    pub safe_to_move: bool,
}

/// Debouncing of both rangers, without any I/O.
pub struct ObstacleFilter {
    left: HysteresisDebouncer,
    right: HysteresisDebouncer,
    danger_cm: f64,
    clear_margin_cm: f64,
}

/// Read-only view of the monitor's latest status.
#[derive(Clone)]
pub struct StatusView {
    status: Arc<Mutex<ObstacleStatus>>,
}

/// Handle to the running monitor thread.
pub struct ObstacleMonitor {
    view: StatusView,
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl ObstacleStatus {
    /// Status before any reading, both sides at maximum range.
    pub fn clear(max_range_cm: f64) -> Self {
        Self {
            left_cm: max_range_cm,
            right_cm: max_range_cm,
            obstacle_detected: false,
            obstacle_left: false,
            obstacle_right: false,
            safe_to_move: true,
        }
    }
}

impl ObstacleFilter {
    pub fn new(params: &ObstacleParams) -> Self {
        Self {
            left: HysteresisDebouncer::new(&params.debounce),
            right: HysteresisDebouncer::new(&params.debounce),
            danger_cm: params.danger_cm,
            clear_margin_cm: params.clear_margin_cm,
        }
    }

    /// Feed one pair of readings.
    pub fn update(&mut self, left_cm: f64, right_cm: f64) -> ObstacleStatus {
        let left = self
            .left
            .update(Sample::below(left_cm, self.danger_cm, self.clear_margin_cm));
        let right = self
            .right
            .update(Sample::below(right_cm, self.danger_cm, self.clear_margin_cm));

        let obstacle_detected = left || right;

        ObstacleStatus {
            left_cm,
            right_cm,
            obstacle_detected,
            obstacle_left: left_cm < self.danger_cm,
            obstacle_right: right_cm < self.danger_cm,
            safe_to_move: !obstacle_detected,
        }
    }
}

impl StatusView {
    pub fn get(&self) -> Option<ObstacleStatus> {
        self.status.lock().ok().map(|s| *s)
    }

    /// Debounced obstacle state, a poisoned status counts as an obstacle.
    pub fn obstacle_detected(&self) -> bool {
        self.get().map(|s| s.obstacle_detected).unwrap_or(true)
    }
}

impl ObstacleMonitor {
    /// Start sampling the two rangers.
    pub fn start<L, R>(left: L, right: R, params: &ObstacleParams) -> std::io::Result<Self>
    where
        L: DistanceSensor + Send + 'static,
        R: DistanceSensor + Send + 'static,
    {
        let view = StatusView {
            status: Arc::new(Mutex::new(ObstacleStatus::clear(params.max_range_cm))),
        };
        let shutdown = Arc::new(AtomicBool::new(false));

        let thread_view = view.clone();
        let thread_shutdown = shutdown.clone();
        let thread_params = params.clone();

        let join_handle = thread::Builder::new()
            .name("obstacle_monitor".into())
            .spawn(move || monitor_loop(left, right, thread_params, thread_view, thread_shutdown))?;

        debug!("Obstacle monitor started");

        Ok(Self {
            view,
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn view(&self) -> StatusView {
        self.view.clone()
    }

    pub fn status(&self) -> Option<ObstacleStatus> {
        self.view.get()
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(h) = self.join_handle.take() {
            if h.join().is_err() {
                warn!("Obstacle monitor thread panicked");
            }
        }
    }
}

impl Drop for ObstacleMonitor {
    fn drop(&mut self) {
        self.halt();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn monitor_loop<L: DistanceSensor, R: DistanceSensor>(
    mut left: L,
    mut right: R,
    params: ObstacleParams,
    view: StatusView,
    shutdown: Arc<AtomicBool>,
) {
    let mut filter = ObstacleFilter::new(&params);
    let mut detected = false;

    while !shutdown.load(Ordering::Relaxed) {
        let left_cm = read_or_sentinel(&mut left, params.max_range_cm);
        thread::sleep(Duration::from_millis(params.inter_sensor_ms));
        let right_cm = read_or_sentinel(&mut right, params.max_range_cm);

        let status = filter.update(left_cm, right_cm);

        if status.obstacle_detected != detected {
            detected = status.obstacle_detected;
            if detected {
                warn!(
                    "Obstacle detected, left {:.1} cm, right {:.1} cm",
                    left_cm, right_cm
                );
            } else {
                info!(
                    "Obstacle cleared, left {:.1} cm, right {:.1} cm",
                    left_cm, right_cm
                );
            }
        }

        match view.status.lock() {
            Ok(mut s) => *s = status,
            Err(_) => {
                warn!("Obstacle status poisoned, stopping the monitor");
                break;
            }
        }

        thread::sleep(Duration::from_millis(params.cycle_ms));
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::ultrasonic::SimDistanceSensor;
    use std::time::Instant;

    #[test]
    fn test_filter_per_side() {
        let mut f = ObstacleFilter::new(&ObstacleParams::default());

        // A close reading alternating between sides never builds a count on either
        for i in 0..10 {
            let s = if i % 2 == 0 {
                f.update(10.0, 100.0)
            } else {
                f.update(100.0, 10.0)
            };
            assert!(!s.obstacle_detected);
            assert!(s.obstacle_left || s.obstacle_right);
        }

        f.update(100.0, 10.0);
        f.update(100.0, 10.0);
        let s = f.update(100.0, 10.0);
        assert!(s.obstacle_detected);
        assert!(!s.safe_to_move);
        assert!(!s.obstacle_left);
        assert!(s.obstacle_right);

        // Right side in the grey zone keeps the obstacle
        for _ in 0..10 {
            assert!(f.update(100.0, 22.0).obstacle_detected);
        }
        for _ in 0..4 {
            assert!(f.update(100.0, 30.0).obstacle_detected);
        }
        let s = f.update(100.0, 30.0);
        assert!(!s.obstacle_detected);
        assert!(s.safe_to_move);
    }

    #[test]
    fn test_timeouts_are_clear() {
        let mut f = ObstacleFilter::new(&ObstacleParams::default());
        let mut s = SimDistanceSensor::new(400.0);

        for _ in 0..3 {
            s.push(None);
        }
        for _ in 0..3 {
            let d = read_or_sentinel(&mut s, 400.0);
            assert!(!f.update(d, d).obstacle_detected);
        }
    }

    #[test]
    fn test_monitor_thread() {
        let left = SimDistanceSensor::new(200.0);
        let right = SimDistanceSensor::new(200.0);

        let params = ObstacleParams {
            cycle_ms: 5,
            inter_sensor_ms: 1,
            ..ObstacleParams::default()
        };

        let monitor = ObstacleMonitor::start(left.clone(), right.clone(), &params).unwrap();
        let view = monitor.view();

        left.set_resting(8.0);

        let start = Instant::now();
        while !view.obstacle_detected() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }

        let status = monitor.status().unwrap();
        assert!(status.obstacle_detected);
        assert_eq!(status.left_cm, 8.0);
        assert_eq!(status.right_cm, 200.0);

        left.set_resting(200.0);

        let start = Instant::now();
        while view.obstacle_detected() && start.elapsed() < Duration::from_secs(2) {
            thread::sleep(Duration::from_millis(5));
        }
        assert!(!view.obstacle_detected());

        monitor.stop();
    }
}
