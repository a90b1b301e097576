//! Exercise sequences over the tally bank
//!
//! The engine is a plain state machine: `start` applies a mode's first step,
//! `tick` applies the next one, and both report which addresses changed so
//! only those inputs need to be sent. Timing lives in [`crate::runner`].
//!
//! Step rules:
//!
//! | Mode   | Inputs | Each step                                                |
//! |--------|--------|----------------------------------------------------------|
//! | Demo   | 1-8    | input k = PGM, input k+1 (wrapping) = PVW, rest of 1-8 OFF |
//! | Chase  | 1-80   | input k = PGM, every other input OFF                     |
//! | Random | 1-80   | all OFF, then one random PGM and one random PVW (may coincide) |

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use rand::seq::index;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tslcore::{TallyBank, TallyState, TslError, TslResult, BANK_SIZE};

use crate::config::constants::{CHASE_INTERVAL, DEMO_INTERVAL, RANDOM_INTERVAL};

/// Number of inputs cycled by the demo sequence
pub const DEMO_INPUTS: u8 = 8;

/// Sequence selected by the operator
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum SequenceMode {
    Demo,
    Chase,
    Random,
}

impl fmt::Display for SequenceMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SequenceMode::Demo => "demo",
            SequenceMode::Chase => "chase",
            SequenceMode::Random => "random",
        };
        f.write_str(s)
    }
}

impl FromStr for SequenceMode {
    type Err = TslError;

    fn from_str(s: &str) -> TslResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "demo" => Ok(SequenceMode::Demo),
            "chase" => Ok(SequenceMode::Chase),
            "random" => Ok(SequenceMode::Random),
            _ => Err(TslError::Config(format!("Invalid sequence: {}", s))),
        }
    }
}

/// Tick interval per mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceIntervals {
    pub demo: Duration,
    pub chase: Duration,
    pub random: Duration,
}

impl SequenceIntervals {
    pub fn for_mode(&self, mode: SequenceMode) -> Duration {
        match mode {
            SequenceMode::Demo => self.demo,
            SequenceMode::Chase => self.chase,
            SequenceMode::Random => self.random,
        }
    }
}

impl Default for SequenceIntervals {
    fn default() -> Self {
        Self {
            demo: DEMO_INTERVAL,
            chase: CHASE_INTERVAL,
            random: RANDOM_INTERVAL,
        }
    }
}

/// Running mode with its cursor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// `step` is the demo input currently on program
    Demo { step: u8 },
    /// `lit` is the address currently on program
    Chase { lit: u8 },
    Random,
}

impl RunMode {
    fn first(mode: SequenceMode) -> Self {
        match mode {
            SequenceMode::Demo => RunMode::Demo { step: 0 },
            SequenceMode::Chase => RunMode::Chase { lit: 0 },
            SequenceMode::Random => RunMode::Random,
        }
    }

    fn advance(self) -> Self {
        match self {
            RunMode::Demo { step } => RunMode::Demo {
                step: (step + 1) % DEMO_INPUTS,
            },
            RunMode::Chase { lit } => RunMode::Chase {
                lit: ((lit as usize + 1) % BANK_SIZE) as u8,
            },
            RunMode::Random => RunMode::Random,
        }
    }

    pub fn mode(&self) -> SequenceMode {
        match self {
            RunMode::Demo { .. } => SequenceMode::Demo,
            RunMode::Chase { .. } => SequenceMode::Chase,
            RunMode::Random => SequenceMode::Random,
        }
    }
}

/// Engine state: at most one run at a time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Idle,
    Running(RunMode),
}

/// Set each listed input to its target state and return the addresses that changed
fn apply<I>(bank: &mut TallyBank, targets: I) -> Vec<u8>
where
    I: IntoIterator<Item = (u8, TallyState)>,
{
    let mut changed = Vec::new();
    for (address, state) in targets {
        let current = match bank.get(address as usize) {
            Ok(input) => input.state(),
            Err(_) => continue,
        };
        if current != state && bank.set_state(address as usize, state).is_ok() {
            changed.push(address);
        }
    }
    changed
}

fn demo_step(bank: &mut TallyBank, step: u8) -> Vec<u8> {
    let preview = (step + 1) % DEMO_INPUTS;
    apply(
        bank,
        (0..DEMO_INPUTS).map(|address| {
            let state = if address == step {
                TallyState::Program
            } else if address == preview {
                TallyState::Preview
            } else {
                TallyState::Off
            };
            (address, state)
        }),
    )
}

fn chase_step(bank: &mut TallyBank, lit: u8) -> Vec<u8> {
    apply(
        bank,
        (0..BANK_SIZE as u8).map(|address| {
            let state = if address == lit { TallyState::Program } else { TallyState::Off };
            (address, state)
        }),
    )
}

/// Clear the bank, then put one random input on program and one on preview
pub fn random_step<R: Rng + ?Sized>(bank: &mut TallyBank, rng: &mut R) -> Vec<u8> {
    let program = rng.gen_range(0..BANK_SIZE) as u8;
    let preview = rng.gen_range(0..BANK_SIZE) as u8;
    apply(
        bank,
        (0..BANK_SIZE as u8)
            .map(|address| (address, TallyState::from_flags(address == program, address == preview))),
    )
}

/// One-shot pick: clear the bank, then put two different random inputs on
/// program and preview
pub fn shuffle_step<R: Rng + ?Sized>(bank: &mut TallyBank, rng: &mut R) -> Vec<u8> {
    let picks = index::sample(rng, BANK_SIZE, 2);
    let program = picks.index(0) as u8;
    let preview = picks.index(1) as u8;
    apply(
        bank,
        (0..BANK_SIZE as u8)
            .map(|address| (address, TallyState::from_flags(address == program, address == preview))),
    )
}

/// Sequence state machine
#[derive(Debug)]
pub struct SequenceEngine {
    state: EngineState,
}

impl SequenceEngine {
    pub fn new() -> Self {
        Self {
            state: EngineState::Idle,
        }
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn mode(&self) -> Option<SequenceMode> {
        match self.state {
            EngineState::Idle => None,
            EngineState::Running(run) => Some(run.mode()),
        }
    }

    pub fn is_running(&self) -> bool {
        self.state != EngineState::Idle
    }

    /// Address on program in a chase run
    pub fn chase_position(&self) -> Option<u8> {
        match self.state {
            EngineState::Running(RunMode::Chase { lit }) => Some(lit),
            _ => None,
        }
    }

    /// Replace any current run with `mode` and apply its first step
    pub fn start<R: Rng + ?Sized>(
        &mut self,
        mode: SequenceMode,
        bank: &mut TallyBank,
        rng: &mut R,
    ) -> Vec<u8> {
        self.cancel();
        let run = RunMode::first(mode);
        self.state = EngineState::Running(run);
        Self::step(run, bank, rng)
    }

    /// Apply the next step of the current run; no-op when idle
    pub fn tick<R: Rng + ?Sized>(&mut self, bank: &mut TallyBank, rng: &mut R) -> Vec<u8> {
        match self.state {
            EngineState::Idle => Vec::new(),
            EngineState::Running(run) => {
                let next = run.advance();
                self.state = EngineState::Running(next);
                Self::step(next, bank, rng)
            }
        }
    }

    /// Stop the current run. Returns false if nothing was running.
    pub fn cancel(&mut self) -> bool {
        let was_running = self.is_running();
        self.state = EngineState::Idle;
        was_running
    }

    fn step<R: Rng + ?Sized>(run: RunMode, bank: &mut TallyBank, rng: &mut R) -> Vec<u8> {
        match run {
            RunMode::Demo { step } => demo_step(bank, step),
            RunMode::Chase { lit } => chase_step(bank, lit),
            RunMode::Random => random_step(bank, rng),
        }
    }
}

impl Default for SequenceEngine {
    fn default() -> Self {
        Self::new()
    }
}
