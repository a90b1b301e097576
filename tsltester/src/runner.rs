/*
 * Drives a sequence run on its own thread.
 *
 * The thread sleeps on a condvar until the next tick is due or until it is
 * told to stop. Each tick locks the engine and then the bank, applies one
 * step, encodes the changed inputs, and releases both locks before handing
 * the frames to the dispatcher. No lock is held across a send.
 *
 * Cancelling marks the run's token first, so frames already queued for the
 * dispatcher are discarded rather than sent.
 */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tslcore::{Destination, Frame, TallyBank, TslError, TslResult};
use tsllink::{Dispatcher, RunToken, SendJob};

use crate::sequence::{SequenceEngine, SequenceMode};

/// Shared state a run works on
#[derive(Clone)]
pub struct RunContext {
    pub bank: Arc<Mutex<TallyBank>>,
    pub engine: Arc<Mutex<SequenceEngine>>,
    pub destination: Arc<Mutex<Destination>>,
    pub enabled: Arc<AtomicBool>,
    pub dispatcher: Arc<Dispatcher>,
}

impl RunContext {
    /// Apply one step with `step` and queue the changed inputs under `token`.
    /// Returns the number of frames queued.
    pub fn run_step<F>(&self, token: &RunToken, step: F) -> TslResult<usize>
    where
        F: FnOnce(&mut SequenceEngine, &mut TallyBank) -> Vec<u8>,
    {
        let frames = {
            let mut engine = self
                .engine
                .lock()
                .map_err(|_| TslError::Channel("Lock poisoned".to_string()))?;
            let mut bank = self
                .bank
                .lock()
                .map_err(|_| TslError::Channel("Lock poisoned".to_string()))?;
            if token.is_cancelled() {
                return Ok(0);
            }
            let changed = step(&mut *engine, &mut *bank);
            changed
                .iter()
                .map(|&address| bank.encode(address as usize))
                .collect::<TslResult<Vec<Frame>>>()?
        };

        if !self.enabled.load(Ordering::SeqCst) {
            return Ok(0);
        }
        let destination = self
            .destination
            .lock()
            .map_err(|_| TslError::Channel("Lock poisoned".to_string()))?
            .clone();

        let mut queued = 0;
        for frame in frames {
            if self
                .dispatcher
                .dispatch(SendJob::for_run(destination.clone(), frame, token.clone()))
            {
                queued += 1;
            }
        }
        Ok(queued)
    }
}

struct CondPair {
    lock: Mutex<bool>,
    cvar: Condvar,
}

/// Handle to a running sequence thread
pub struct SequenceRunner {
    mode: SequenceMode,
    token: RunToken,
    pair: Arc<CondPair>,
    thread_handle: Option<JoinHandle<()>>,
}

impl SequenceRunner {
    /// Start ticking `mode` every `interval`. The engine must already be
    /// running `mode` with its first step applied.
    pub fn spawn(ctx: RunContext, mode: SequenceMode, interval: Duration, token: RunToken) -> Self {
        let pair = Arc::new(CondPair {
            lock: Mutex::new(false),
            cvar: Condvar::new(),
        });

        let thread_pair = pair.clone();
        let thread_token = token.clone();
        let handle = thread::spawn(move || {
            let mut rng = StdRng::from_entropy();
            run_loop(&ctx, &thread_pair, &thread_token, interval, &mut rng);
            debug!("Sequence {} thread exiting", mode);
        });

        info!("Sequence {} started, tick every {:?}", mode, interval);
        Self {
            mode,
            token,
            pair,
            thread_handle: Some(handle),
        }
    }

    pub fn mode(&self) -> SequenceMode {
        self.mode
    }

    pub fn token(&self) -> &RunToken {
        &self.token
    }

    /// Stop the thread and wait for it to exit
    pub fn cancel(&mut self) {
        self.token.cancel();
        if let Ok(mut stop) = self.pair.lock.lock() {
            *stop = true;
        }
        self.pair.cvar.notify_all();

        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                warn!("Sequence {} thread panicked", self.mode);
            }
            info!("Sequence {} cancelled", self.mode);
        }
    }

    pub fn is_finished(&self) -> bool {
        self.thread_handle.as_ref().map_or(true, JoinHandle::is_finished)
    }
}

impl Drop for SequenceRunner {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn run_loop<R: Rng>(
    ctx: &RunContext,
    pair: &CondPair,
    token: &RunToken,
    interval: Duration,
    rng: &mut R,
) {
    let mut deadline = Instant::now() + interval;

    loop {
        {
            let mut stop = match pair.lock.lock() {
                Ok(guard) => guard,
                Err(_) => return,
            };
            loop {
                if *stop {
                    return;
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                stop = match pair.cvar.wait_timeout(stop, deadline - now) {
                    Ok((guard, _)) => guard,
                    Err(_) => return,
                };
            }
        }

        if token.is_cancelled() {
            return;
        }

        match ctx.run_step(token, |engine, bank| engine.tick(bank, rng)) {
            Ok(queued) => debug!("Tick queued {} frames", queued),
            Err(e) => warn!("Sequence tick failed: {}", e),
        }

        deadline += interval;
        let now = Instant::now();
        if deadline < now {
            // Fell behind; skip missed ticks rather than bursting
            deadline = now + interval;
        }
    }
}
