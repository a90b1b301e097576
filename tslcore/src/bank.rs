//! Tally inputs and the bank holding all of them
//!
//! The bank is the authoritative in-memory model: exactly [`BANK_SIZE`]
//! inputs, indexed by their 0-based address. Labels are stored as typed;
//! the 14-character wire limit is applied only when a frame is encoded.

use crate::error::{TslError, TslResult};
use crate::protocol::{self, Frame, MAX_ADDRESS};
use crate::types::{LabelPreset, TallyState};

/// Number of inputs managed by the tester
pub const BANK_SIZE: usize = 80;

/// Tally and label state of one input
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputState {
    address: u8,
    program: bool,
    preview: bool,
    label: String,
}

impl InputState {
    /// Create an input with both tallies off and an empty label
    pub fn new(address: u8) -> TslResult<Self> {
        if address > MAX_ADDRESS {
            return Err(TslError::InvalidAddress(address));
        }
        Ok(Self {
            address,
            program: false,
            preview: false,
            label: String::new(),
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    /// Tally 1 (red)
    pub fn program(&self) -> bool {
        self.program
    }

    /// Tally 2 (green)
    pub fn preview(&self) -> bool {
        self.preview
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn state(&self) -> TallyState {
        TallyState::from_flags(self.program, self.preview)
    }

    pub fn set_flags(&mut self, program: bool, preview: bool) {
        self.program = program;
        self.preview = preview;
    }

    pub fn set_state(&mut self, state: TallyState) {
        let (program, preview) = state.flags();
        self.set_flags(program, preview);
    }

    pub fn set_label(&mut self, label: impl Into<String>) {
        self.label = label.into();
    }

    /// 1-based input number shown to operators
    pub fn number(&self) -> u32 {
        self.address as u32 + 1
    }

    /// Encode this input as a wire frame
    pub fn encode(&self) -> TslResult<Frame> {
        protocol::encode(self)
    }
}

/// All inputs, one per address 0..80
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TallyBank {
    inputs: Vec<InputState>,
}

impl TallyBank {
    /// Fresh bank: every tally off, labels "INPUT n"
    pub fn new() -> Self {
        let inputs = (0..BANK_SIZE as u8)
            .map(|address| InputState {
                address,
                program: false,
                preview: false,
                label: LabelPreset::InputNumber.label_for(address),
            })
            .collect();
        Self { inputs }
    }

    /// Build a bank from exactly [`BANK_SIZE`] inputs in address order
    pub fn from_inputs(inputs: Vec<InputState>) -> TslResult<Self> {
        if inputs.len() != BANK_SIZE {
            return Err(TslError::InvalidSnapshot(format!(
                "expected {} inputs, got {}",
                BANK_SIZE,
                inputs.len()
            )));
        }
        for (index, input) in inputs.iter().enumerate() {
            if input.address as usize != index {
                return Err(TslError::InvalidSnapshot(format!(
                    "input at position {} has address {}",
                    index, input.address
                )));
            }
        }
        Ok(Self { inputs })
    }

    fn slot(&self, address: usize) -> TslResult<&InputState> {
        self.inputs.get(address).ok_or(TslError::AddressOutOfRange(address))
    }

    fn slot_mut(&mut self, address: usize) -> TslResult<&mut InputState> {
        self.inputs.get_mut(address).ok_or(TslError::AddressOutOfRange(address))
    }

    pub fn len(&self) -> usize {
        self.inputs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inputs.is_empty()
    }

    pub fn get(&self, address: usize) -> TslResult<&InputState> {
        self.slot(address)
    }

    pub fn iter(&self) -> impl Iterator<Item = &InputState> {
        self.inputs.iter()
    }

    /// Absolute set of both tally flags
    pub fn set_tally(&mut self, address: usize, program: bool, preview: bool) -> TslResult<()> {
        self.slot_mut(address)?.set_flags(program, preview);
        Ok(())
    }

    pub fn set_state(&mut self, address: usize, state: TallyState) -> TslResult<()> {
        self.slot_mut(address)?.set_state(state);
        Ok(())
    }

    /// Advance OFF -> PGM -> PVW -> BOTH -> OFF and return the new state
    pub fn cycle_state(&mut self, address: usize) -> TslResult<TallyState> {
        let input = self.slot_mut(address)?;
        let next = input.state().next();
        input.set_state(next);
        Ok(next)
    }

    /// Store the label as given; truncation happens at encode time
    pub fn set_label(&mut self, address: usize, text: impl Into<String>) -> TslResult<()> {
        self.slot_mut(address)?.set_label(text);
        Ok(())
    }

    pub fn apply_label_preset(&mut self, preset: LabelPreset) {
        for input in self.inputs.iter_mut() {
            input.label = preset.label_for(input.address);
        }
    }

    /// Turn off every tally, leaving labels alone
    pub fn all_off(&mut self) {
        for input in self.inputs.iter_mut() {
            input.set_flags(false, false);
        }
    }

    /// Frame for one input
    pub fn encode(&self, address: usize) -> TslResult<Frame> {
        self.slot(address)?.encode()
    }

    /// Frames for every input, in address order
    pub fn encode_all(&self) -> TslResult<Vec<Frame>> {
        self.inputs.iter().map(InputState::encode).collect()
    }
}

impl Default for TallyBank {
    fn default() -> Self {
        Self::new()
    }
}
