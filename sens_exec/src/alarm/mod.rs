//! # Obstacle alarm
//!
//! Beeps while an obstacle is detected: the buzzer sounds for the beep time, then stays silent for
//! the silence time. The silence is cut short as soon as the obstacle clears.

// ------------------------------------------------------------------------------------------------
// MODULES
// ------------------------------------------------------------------------------------------------

/// PWM buzzer on a Raspberry Pi GPIO pin.
#[cfg(feature = "hw")]
pub mod gpio;

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, trace, warn};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::params::AlarmParams;

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait Buzzer {
    fn set_on(&mut self, on: bool) -> Result<(), BuzzerError>;
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Buzzer which records when it was switched. Clones share the record.
#[derive(Clone, Default)]
pub struct SimBuzzer {
    history: Arc<Mutex<Vec<(Instant, bool)>>>,
}

/// Handle to the running alarm thread.
pub struct Alarm {
    shutdown: Arc<AtomicBool>,
    join_handle: Option<JoinHandle<()>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum BuzzerError {
    #[error("Could not access the GPIO peripheral: {0}")]
    Gpio(String),

    #[error("Could not set the buzzer PWM: {0}")]
    Pwm(String),
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimBuzzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn history(&self) -> Vec<(Instant, bool)> {
        self.history.lock().map(|h| h.clone()).unwrap_or_default()
    }

    /// Number of times the buzzer was switched on.
    pub fn num_beeps(&self) -> usize {
        self.history().iter().filter(|(_, on)| *on).count()
    }

    pub fn is_on(&self) -> bool {
        self.history().last().map(|(_, on)| *on).unwrap_or(false)
    }
}

impl Buzzer for SimBuzzer {
    fn set_on(&mut self, on: bool) -> Result<(), BuzzerError> {
        trace!("Sim buzzer {}", if on { "on" } else { "off" });
        if let Ok(mut h) = self.history.lock() {
            h.push((Instant::now(), on));
        }
        Ok(())
    }
}

impl Alarm {
    /// Start the alarm thread, beeping while `active` returns true.
    pub fn start<B, F>(buzzer: B, active: F, params: &AlarmParams) -> std::io::Result<Self>
    where
        B: Buzzer + Send + 'static,
        F: Fn() -> bool + Send + 'static,
    {
        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let params = params.clone();

        let join_handle = thread::Builder::new()
            .name("alarm".into())
            .spawn(move || alarm_loop(buzzer, active, params, thread_shutdown))?;

        debug!("Alarm started");

        Ok(Self {
            shutdown,
            join_handle: Some(join_handle),
        })
    }

    pub fn stop(mut self) {
        self.halt();
    }

    fn halt(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);

        if let Some(h) = self.join_handle.take() {
            if h.join().is_err() {
                warn!("Alarm thread panicked");
            }
        }
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.halt();
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

fn alarm_loop<B: Buzzer, F: Fn() -> bool>(
    mut buzzer: B,
    active: F,
    params: AlarmParams,
    shutdown: Arc<AtomicBool>,
) {
    let step = Duration::from_millis(params.silence_step_ms.max(1));
    let num_steps = params.silence_ms / params.silence_step_ms.max(1);

    while !shutdown.load(Ordering::Relaxed) {
        if !active() {
            thread::sleep(step);
            continue;
        }

        set_buzzer(&mut buzzer, true);
        thread::sleep(Duration::from_millis(params.beep_ms));
        set_buzzer(&mut buzzer, false);

        for _ in 0..num_steps {
            thread::sleep(step);
            if !active() || shutdown.load(Ordering::Relaxed) {
                break;
            }
        }
    }

    set_buzzer(&mut buzzer, false);
}

fn set_buzzer<B: Buzzer>(buzzer: &mut B, on: bool) {
    if let Err(e) = buzzer.set_on(on) {
        warn!("Could not switch the buzzer {}: {}", if on { "on" } else { "off" }, e);
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn fast_params() -> AlarmParams {
        AlarmParams {
            beep_ms: 20,
            silence_ms: 200,
            silence_step_ms: 10,
            ..AlarmParams::default()
        }
    }

    #[test]
    fn test_silent_without_obstacle() {
        let buzzer = SimBuzzer::new();
        let alarm = Alarm::start(buzzer.clone(), || false, &fast_params()).unwrap();

        thread::sleep(Duration::from_millis(100));
        alarm.stop();

        assert_eq!(buzzer.num_beeps(), 0);
        assert!(!buzzer.is_on());
    }

    #[test]
    fn test_beep_pattern() {
        let buzzer = SimBuzzer::new();
        let alarm = Alarm::start(buzzer.clone(), || true, &fast_params()).unwrap();

        thread::sleep(Duration::from_millis(330));
        alarm.stop();

        let history = buzzer.history();
        assert!(buzzer.num_beeps() >= 1 && buzzer.num_beeps() <= 2);
        assert!(!buzzer.is_on());

        // Beep then silence
        let on = history.iter().position(|(_, on)| *on).unwrap();
        let off = &history[on + 1];
        assert!(!off.1);
        assert!(off.0 - history[on].0 >= Duration::from_millis(20));
    }

    #[test]
    fn test_silence_ends_when_cleared() {
        let buzzer = SimBuzzer::new();
        let active = Arc::new(AtomicBool::new(true));

        let flag = active.clone();
        let alarm = Alarm::start(
            buzzer.clone(),
            move || flag.load(Ordering::Relaxed),
            &fast_params(),
        )
        .unwrap();

        thread::sleep(Duration::from_millis(40));
        active.store(false, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(40));

        // Back within one step, well before the silence would have ended
        let before = buzzer.num_beeps();
        active.store(true, Ordering::Relaxed);
        thread::sleep(Duration::from_millis(60));
        alarm.stop();

        assert!(buzzer.num_beeps() > before);
    }
}
