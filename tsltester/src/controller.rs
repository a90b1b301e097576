//! Tally controller
//!
//! The controller is the single owner of the tally bank. Operator commands
//! and sequence runs both go through it; the last write to an input wins.
//! While sending is disabled, commands still update the bank but nothing
//! reaches the network and no sequence may run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};

use log::{debug, info};
use rand::thread_rng;
use tslcore::{
    ConfigSnapshot, Destination, Frame, InputState, LabelPreset, TallyBank, TallyState, TslError,
    TslResult,
};
use tsllink::{Dispatcher, RunToken, SendJob, SendOutcome, SendStatistics, Transport, UdpTransport};

use crate::config::Settings;
use crate::runner::{RunContext, SequenceRunner};
use crate::sequence::{shuffle_step, SequenceEngine, SequenceIntervals, SequenceMode};

fn lock<T>(mutex: &Mutex<T>) -> TslResult<MutexGuard<'_, T>> {
    mutex
        .lock()
        .map_err(|_| TslError::Channel("Lock poisoned".to_string()))
}

/// Owner of the bank, the sequence engine, and the send path
pub struct TallyController {
    ctx: RunContext,
    intervals: SequenceIntervals,
    runner: Option<SequenceRunner>,
}

impl TallyController {
    /// Create a controller sending through `transport`
    pub fn new(transport: Box<dyn Transport>, settings: &Settings) -> TslResult<Self> {
        let destination = settings.destination()?;
        let dispatcher = Dispatcher::new(transport, settings.send_queue_size);

        Ok(Self {
            ctx: RunContext {
                bank: Arc::new(Mutex::new(TallyBank::new())),
                engine: Arc::new(Mutex::new(SequenceEngine::new())),
                destination: Arc::new(Mutex::new(destination)),
                enabled: Arc::new(AtomicBool::new(settings.enabled)),
                dispatcher: Arc::new(dispatcher),
            },
            intervals: settings.intervals(),
            runner: None,
        })
    }

    /// Create a controller sending over UDP
    pub fn with_udp(settings: &Settings) -> TslResult<Self> {
        let transport = UdpTransport::new(settings.send_timeout())?;
        Self::new(Box::new(transport), settings)
    }

    fn send_frames(&self, frames: Vec<Frame>) -> TslResult<usize> {
        if !self.is_enabled() {
            debug!("Sending disabled, {} frames not sent", frames.len());
            return Ok(0);
        }
        let destination = lock(&self.ctx.destination)?.clone();
        Ok(frames
            .into_iter()
            .filter(|frame| self.ctx.dispatcher.dispatch(SendJob::new(destination.clone(), *frame)))
            .count())
    }

    /// Mutate one input and send its new frame
    fn update_input<F, T>(&self, address: usize, update: F) -> TslResult<T>
    where
        F: FnOnce(&mut TallyBank) -> TslResult<T>,
    {
        let (result, frame) = {
            let mut bank = lock(&self.ctx.bank)?;
            let result = update(&mut *bank)?;
            (result, bank.encode(address)?)
        };
        self.send_frames(vec![frame])?;
        Ok(result)
    }

    pub fn is_enabled(&self) -> bool {
        self.ctx.enabled.load(Ordering::SeqCst)
    }

    /// Turn sending on or off. Turning it off stops any running sequence.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.ctx.enabled.store(enabled, Ordering::SeqCst);
        info!("Sending {}", if enabled { "enabled" } else { "disabled" });
        if !enabled {
            self.cancel_sequence();
        }
    }

    pub fn destination(&self) -> TslResult<Destination> {
        Ok(lock(&self.ctx.destination)?.clone())
    }

    pub fn set_destination(&self, destination: Destination) -> TslResult<()> {
        destination.validate()?;
        info!("Destination set to {}", destination);
        *lock(&self.ctx.destination)? = destination;
        Ok(())
    }

    /// Copy of the whole bank, for display
    pub fn bank(&self) -> TslResult<TallyBank> {
        Ok(lock(&self.ctx.bank)?.clone())
    }

    pub fn input(&self, address: usize) -> TslResult<InputState> {
        Ok(lock(&self.ctx.bank)?.get(address)?.clone())
    }

    pub fn set_tally(&self, address: usize, program: bool, preview: bool) -> TslResult<()> {
        self.update_input(address, |bank| bank.set_tally(address, program, preview))
    }

    pub fn set_state(&self, address: usize, state: TallyState) -> TslResult<()> {
        self.update_input(address, |bank| bank.set_state(address, state))
    }

    pub fn cycle_state(&self, address: usize) -> TslResult<TallyState> {
        self.update_input(address, |bank| bank.cycle_state(address))
    }

    /// Set a label and send the input so the display picks it up
    pub fn set_label(&self, address: usize, text: impl Into<String>) -> TslResult<()> {
        let text = text.into();
        self.update_input(address, |bank| bank.set_label(address, text))
    }

    /// Relabel every input. Nothing is sent until [`Self::send_labels`].
    pub fn apply_label_preset(&self, preset: LabelPreset) -> TslResult<()> {
        lock(&self.ctx.bank)?.apply_label_preset(preset);
        info!("Applied label preset {:?}", preset);
        Ok(())
    }

    /// Turn every tally off and send all inputs
    pub fn all_off(&self) -> TslResult<usize> {
        let frames = {
            let mut bank = lock(&self.ctx.bank)?;
            bank.all_off();
            bank.encode_all()?
        };
        self.send_frames(frames)
    }

    /// Send the current state of every input
    pub fn send_labels(&self) -> TslResult<usize> {
        let frames = lock(&self.ctx.bank)?.encode_all()?;
        self.send_frames(frames)
    }

    /// One random program/preview pick on two different inputs, without
    /// starting a run
    pub fn shuffle(&self) -> TslResult<usize> {
        let frames = {
            let mut bank = lock(&self.ctx.bank)?;
            let changed = shuffle_step(&mut bank, &mut thread_rng());
            changed
                .iter()
                .map(|&address| bank.encode(address as usize))
                .collect::<TslResult<Vec<Frame>>>()?
        };
        self.send_frames(frames)
    }

    /// Start a sequence, stopping any run already in progress
    pub fn start_sequence(&mut self, mode: SequenceMode) -> TslResult<()> {
        if !self.is_enabled() {
            return Err(TslError::NotEnabled);
        }
        self.cancel_sequence();

        let token = RunToken::new();
        let mut rng = thread_rng();
        self.ctx
            .run_step(&token, |engine, bank| engine.start(mode, bank, &mut rng))?;

        let interval = self.intervals.for_mode(mode);
        self.runner = Some(SequenceRunner::spawn(self.ctx.clone(), mode, interval, token));
        Ok(())
    }

    /// Stop the running sequence, if any. Returns whether one was running.
    pub fn cancel_sequence(&mut self) -> bool {
        let had_runner = match self.runner.take() {
            Some(mut runner) => {
                runner.cancel();
                true
            }
            None => false,
        };
        let was_running = match self.ctx.engine.lock() {
            Ok(mut engine) => engine.cancel(),
            Err(_) => false,
        };
        had_runner || was_running
    }

    pub fn running_mode(&self) -> Option<SequenceMode> {
        self.ctx.engine.lock().ok().and_then(|engine| engine.mode())
    }

    pub fn capture(&self) -> TslResult<ConfigSnapshot> {
        let bank = lock(&self.ctx.bank)?;
        let destination = lock(&self.ctx.destination)?;
        Ok(ConfigSnapshot::capture(&bank, &destination))
    }

    /// Replace bank and destination from a snapshot. On error nothing changes.
    pub fn restore(&mut self, snapshot: &ConfigSnapshot) -> TslResult<()> {
        let (bank, destination) = snapshot.restore()?;
        self.cancel_sequence();
        *lock(&self.ctx.bank)? = bank;
        *lock(&self.ctx.destination)? = destination;
        info!("Configuration restored");
        Ok(())
    }

    pub fn statistics(&self) -> SendStatistics {
        self.ctx.dispatcher.statistics()
    }

    /// Outcomes of every frame sent from now on
    pub fn subscribe(&self) -> Receiver<SendOutcome> {
        self.ctx.dispatcher.subscribe()
    }

    /// Stop any run and wait for queued frames to be sent
    pub fn shutdown(&mut self) {
        self.cancel_sequence();
        if let Some(dispatcher) = Arc::get_mut(&mut self.ctx.dispatcher) {
            dispatcher.shutdown();
        }
    }
}

impl Drop for TallyController {
    fn drop(&mut self) {
        self.cancel_sequence();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;
    use tslcore::{decode, BANK_SIZE};

    #[derive(Clone, Default)]
    struct Recorder {
        frames: Arc<Mutex<Vec<Frame>>>,
        fail: Arc<AtomicBool>,
    }

    impl Transport for Recorder {
        fn send(&mut self, _host: &str, _port: u16, frame: &Frame) -> TslResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(TslError::TransportFailure("network down".to_string()));
            }
            self.frames.lock().unwrap().push(*frame);
            Ok(())
        }
    }

    fn settings(interval_ms: u64) -> Settings {
        Settings {
            host: "127.0.0.1".to_string(),
            enabled: true,
            demo_interval_ms: interval_ms,
            chase_interval_ms: interval_ms,
            random_interval_ms: interval_ms,
            ..Settings::default()
        }
    }

    fn controller(interval_ms: u64) -> (TallyController, Recorder) {
        let recorder = Recorder::default();
        let controller = TallyController::new(Box::new(recorder.clone()), &settings(interval_ms)).unwrap();
        (controller, recorder)
    }

    #[test]
    fn test_direct_commands_send_frames() {
        let (mut controller, recorder) = controller(1000);
        controller.set_tally(5, true, false).unwrap();
        controller.set_label(5, "CAM 6").unwrap();
        assert_eq!(controller.cycle_state(5).unwrap(), TallyState::Preview);
        controller.shutdown();

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 3);
        let mut expected = vec![0x80, 0x05, 0x01, 0x00, b'C', b'A', b'M', b' ', b'6'];
        expected.extend_from_slice(&[b' '; 9]);
        assert_eq!(frames[1].to_vec(), expected);
        assert!(decode(&frames[2]).unwrap().preview());
        assert_eq!(controller.statistics().packets_sent, 3);
    }

    #[test]
    fn test_invalid_address_changes_nothing() {
        let (mut controller, recorder) = controller(1000);
        let before = controller.bank().unwrap();
        assert!(matches!(controller.set_tally(80, true, true), Err(TslError::AddressOutOfRange(80))));
        assert!(controller.cycle_state(99).is_err());
        controller.shutdown();
        assert_eq!(controller.bank().unwrap(), before);
        assert!(recorder.frames.lock().unwrap().is_empty());
    }

    #[test]
    fn test_disabled_sends_nothing() {
        let (mut controller, recorder) = controller(1000);
        controller.set_enabled(false);
        controller.set_tally(1, true, false).unwrap();
        assert_eq!(controller.all_off().unwrap(), 0);
        assert!(matches!(controller.start_sequence(SequenceMode::Chase), Err(TslError::NotEnabled)));
        controller.shutdown();

        assert!(recorder.frames.lock().unwrap().is_empty());
        assert!(!controller.input(1).unwrap().program());
    }

    #[test]
    fn test_all_off_and_send_labels() {
        let (mut controller, recorder) = controller(1000);
        controller.apply_label_preset(LabelPreset::SourceNumber).unwrap();
        assert!(recorder.frames.lock().unwrap().is_empty());

        assert_eq!(controller.send_labels().unwrap(), BANK_SIZE);
        assert_eq!(controller.all_off().unwrap(), BANK_SIZE);
        controller.shutdown();

        let frames = recorder.frames.lock().unwrap();
        assert_eq!(frames.len(), 2 * BANK_SIZE);
        assert_eq!(decode(&frames[79]).unwrap().label(), "SOURCE 80");
    }

    #[test]
    fn test_shuffle_sets_one_pgm_one_pvw() {
        let (mut controller, _recorder) = controller(1000);
        controller.shuffle().unwrap();
        let bank = controller.bank().unwrap();
        assert_eq!(bank.iter().filter(|i| i.program()).count(), 1);
        assert_eq!(bank.iter().filter(|i| i.preview()).count(), 1);
        assert!(bank.iter().all(|i| i.state() != TallyState::Both));
        controller.shutdown();
    }

    #[test]
    fn test_chase_run_and_cancel() {
        let (mut controller, recorder) = controller(10);
        controller.start_sequence(SequenceMode::Chase).unwrap();
        assert_eq!(controller.running_mode(), Some(SequenceMode::Chase));
        thread::sleep(Duration::from_millis(100));

        assert!(controller.cancel_sequence());
        assert_eq!(controller.running_mode(), None);
        let sent_at_cancel = recorder.frames.lock().unwrap().len();
        thread::sleep(Duration::from_millis(50));
        controller.shutdown();

        let frames = recorder.frames.lock().unwrap();
        assert!(frames.len() >= 2);
        // At most one send already in flight when the run was cancelled
        assert!(frames.len() <= sent_at_cancel + 1);
        // First step lights input 1
        let first = decode(&frames[0]).unwrap();
        assert_eq!(first.address(), 0);
        assert!(first.program());
    }

    #[test]
    fn test_new_sequence_replaces_old() {
        let (mut controller, _recorder) = controller(10);
        controller.start_sequence(SequenceMode::Chase).unwrap();
        controller.start_sequence(SequenceMode::Demo).unwrap();
        thread::sleep(Duration::from_millis(50));
        assert_eq!(controller.running_mode(), Some(SequenceMode::Demo));

        assert!(controller.cancel_sequence());
        assert_eq!(controller.running_mode(), None);
        let bank = controller.bank().unwrap();
        let demo_programs = bank.iter().take(8).filter(|i| i.program()).count();
        let demo_previews = bank.iter().take(8).filter(|i| i.preview()).count();
        assert_eq!(demo_programs, 1);
        assert_eq!(demo_previews, 1);
        controller.shutdown();
    }

    #[test]
    fn test_transport_failure_does_not_stop_run() {
        let (mut controller, recorder) = controller(10);
        recorder.fail.store(true, Ordering::SeqCst);
        controller.start_sequence(SequenceMode::Random).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert_eq!(controller.running_mode(), Some(SequenceMode::Random));
        assert!(controller.statistics().send_failures > 0);
        controller.shutdown();
    }

    #[test]
    fn test_restore_all_or_nothing() {
        let (mut controller, _recorder) = controller(1000);
        controller.set_label(0, "ORIGINAL").unwrap();
        let before = controller.capture().unwrap();

        let mut short = before.clone();
        short.inputs.truncate(79);
        assert!(matches!(controller.restore(&short), Err(TslError::InvalidSnapshot(_))));
        assert_eq!(controller.capture().unwrap(), before);

        let mut changed = before.clone();
        changed.inputs[0].label = "RESTORED".to_string();
        changed.destination = Destination::new("10.9.8.7", 7000).unwrap();
        controller.restore(&changed).unwrap();
        assert_eq!(controller.input(0).unwrap().label(), "RESTORED");
        assert_eq!(controller.destination().unwrap().port, 7000);
        controller.shutdown();
    }

    #[test]
    fn test_direct_command_during_run_last_writer_wins() {
        let (mut controller, recorder) = controller(200);
        controller.start_sequence(SequenceMode::Chase).unwrap();
        controller.set_tally(40, true, true).unwrap();
        assert_eq!(controller.input(40).unwrap().state(), TallyState::Both);

        // Next chase tick forces every unlit input off, input 40 included
        thread::sleep(Duration::from_millis(300));
        controller.cancel_sequence();
        controller.shutdown();

        assert_eq!(controller.input(40).unwrap().state(), TallyState::Off);
        let states: Vec<TallyState> = recorder
            .frames
            .lock()
            .unwrap()
            .iter()
            .map(|frame| decode(frame).unwrap())
            .filter(|input| input.address() == 40)
            .map(|input| input.state())
            .collect();
        assert_eq!(states, vec![TallyState::Both, TallyState::Off]);
    }

    #[test]
    fn test_outcomes_published() {
        let (mut controller, recorder) = controller(1000);
        let outcomes = controller.subscribe();
        controller.set_tally(2, true, true).unwrap();
        let first = outcomes.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(first, SendOutcome::Sent { address: 2 });

        recorder.fail.store(true, Ordering::SeqCst);
        controller.set_tally(3, true, true).unwrap();
        controller.shutdown();

        let received: Vec<SendOutcome> = outcomes.try_iter().collect();
        assert_eq!(received.len(), 1);
        assert!(matches!(received[0], SendOutcome::Failed { address: 3, .. }));
        assert_eq!(controller.statistics().errors(), 1);
    }
}
