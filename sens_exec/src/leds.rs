//! # Status LEDs
//!
//! The RGB strip under the robot shows what the line follower is doing.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::trace;
use serde::Serialize;
use std::sync::{Arc, Mutex};

// ------------------------------------------------------------------------------------------------
// TRAITS
// ------------------------------------------------------------------------------------------------

pub trait StatusLeds {
    fn num_pixels(&self) -> usize;

    /// Set one pixel, shown on the next call to [`StatusLeds::show`].
    fn set_pixel(&mut self, index: usize, colour: Rgb);

    fn show(&mut self);

    fn set_all(&mut self, colour: Rgb) {
        for i in 0..self.num_pixels() {
            self.set_pixel(i, colour);
        }
        self.show();
    }
}

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// LED strip which keeps the shown colours in memory. Clones share the strip.
#[derive(Clone)]
pub struct SimLeds {
    pending: Vec<Rgb>,
    shown: Arc<Mutex<Vec<Rgb>>>,
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// Solid colours shown for each state of the follower.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LedMode {
    Ready,
    Calibrating,
    Following,
    Stopped,
    Off,
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl LedMode {
    pub fn colour(&self) -> Rgb {
        match self {
            LedMode::Ready => Rgb(100, 100, 0),
            LedMode::Calibrating => Rgb(0, 0, 100),
            LedMode::Following => Rgb(0, 100, 0),
            LedMode::Stopped => Rgb(100, 0, 0),
            LedMode::Off => Rgb(0, 0, 0),
        }
    }
}

impl SimLeds {
    pub fn new(num_pixels: usize) -> Self {
        Self {
            pending: vec![Rgb::default(); num_pixels],
            shown: Arc::new(Mutex::new(vec![Rgb::default(); num_pixels])),
        }
    }

    /// Colours currently shown.
    pub fn shown(&self) -> Vec<Rgb> {
        self.shown.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

impl StatusLeds for SimLeds {
    fn num_pixels(&self) -> usize {
        self.pending.len()
    }

    fn set_pixel(&mut self, index: usize, colour: Rgb) {
        if let Some(p) = self.pending.get_mut(index) {
            *p = colour;
        }
    }

    fn show(&mut self) {
        trace!("LEDs: {:?}", self.pending);
        if let Ok(mut s) = self.shown.lock() {
            s.clone_from(&self.pending);
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Colour wheel, red to green to blue and back as `pos` goes from 0 to 255.
pub fn wheel(pos: u8) -> Rgb {
    match pos {
        0..=84 => Rgb(pos * 3, 255 - pos * 3, 0),
        85..=169 => {
            let p = pos - 85;
            Rgb(255 - p * 3, 0, p * 3)
        }
        _ => {
            let p = pos - 170;
            Rgb(0, p * 3, 255 - p * 3)
        }
    }
}

/// Rainbow frame `step` over a strip of `num_pixels`.
pub fn show_rainbow<L: StatusLeds + ?Sized>(leds: &mut L, step: u32) {
    let n = leds.num_pixels().max(1);

    for i in 0..n {
        let pos = ((i * 256 / n) as u32 + step) & 255;
        leds.set_pixel(i, wheel(pos as u8));
    }

    leds.show();
}
