//! TSL Tally Tester - tally controller and exercise sequences
//!
//! The controller owns the 80-input tally bank and sends every change as a
//! TSL 3.1 frame. The sequence engine drives the demo, chase and random
//! exercises on a timer thread.

pub mod config;
pub mod sequence;
pub mod runner;
pub mod controller;

pub use config::*;
pub use sequence::*;
pub use runner::*;
pub use controller::*;

// Re-export common types from tslcore
pub use tslcore::{
    ConfigSnapshot, Destination, InputState, LabelPreset, TallyBank, TallyState, TslError,
    TslResult, BANK_SIZE,
};
