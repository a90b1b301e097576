//! Asynchronous frame dispatch
//!
//! Sends run on a worker thread fed by a bounded queue, so a slow or failing
//! send never holds up tally-state changes or the next sequence tick. A full
//! queue drops the frame rather than blocking the caller.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TrySendError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use log::{debug, warn};
use serde::Serialize;
use tslcore::{Destination, Frame};

use crate::transport::Transport;

/// Cancellation flag shared between a sequence run and its queued frames
#[derive(Debug, Clone, Default)]
pub struct RunToken(Arc<AtomicBool>);

impl RunToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One frame waiting to be sent
#[derive(Debug, Clone)]
pub struct SendJob {
    pub destination: Destination,
    pub frame: Frame,
    /// Set for frames produced by a sequence run
    pub token: Option<RunToken>,
}

impl SendJob {
    pub fn new(destination: Destination, frame: Frame) -> Self {
        Self {
            destination,
            frame,
            token: None,
        }
    }

    pub fn for_run(destination: Destination, frame: Frame, token: RunToken) -> Self {
        Self {
            destination,
            frame,
            token: Some(token),
        }
    }

    /// Address byte of the frame
    pub fn address(&self) -> u8 {
        self.frame[1]
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(RunToken::is_cancelled)
    }
}

/// Result of one dispatched frame, published to subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { address: u8 },
    Failed { address: u8, reason: String },
    Dropped { address: u8 },
}

impl SendOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SendOutcome::Sent { .. })
    }
}

/// Counters for dispatched frames
#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SendStatistics {
    /// Frames handed to the network
    pub packets_sent: u64,
    /// Transport errors
    pub send_failures: u64,
    /// Frames lost to a full or closed queue
    pub dropped: u64,
    /// Frames from cancelled runs that were never sent
    pub discarded: u64,
}

impl SendStatistics {
    /// Failures of any kind, as shown to the operator
    pub fn errors(&self) -> u64 {
        self.send_failures + self.dropped
    }
}

#[derive(Default)]
struct Counters {
    sent: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    discarded: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> SendStatistics {
        SendStatistics {
            packets_sent: self.sent.load(Ordering::Relaxed),
            send_failures: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

type Subscribers = Arc<Mutex<Vec<Sender<SendOutcome>>>>;

fn publish(subscribers: &Subscribers, outcome: SendOutcome) {
    if let Ok(mut subs) = subscribers.lock() {
        subs.retain(|s| s.send(outcome.clone()).is_ok());
    }
}

/// Worker thread owning a [`Transport`]
pub struct Dispatcher {
    queue: Option<SyncSender<SendJob>>,
    counters: Arc<Counters>,
    subscribers: Subscribers,
    thread_handle: Option<JoinHandle<()>>,
}

impl Dispatcher {
    /// Start the worker thread
    pub fn new(transport: Box<dyn Transport>, queue_size: usize) -> Self {
        let (tx, rx) = mpsc::sync_channel::<SendJob>(queue_size.max(1));
        let counters = Arc::new(Counters::default());
        let subscribers: Subscribers = Arc::new(Mutex::new(Vec::new()));

        let worker_counters = counters.clone();
        let worker_subscribers = subscribers.clone();
        let handle = thread::spawn(move || {
            run_worker(transport, rx, worker_counters, worker_subscribers);
        });

        Self {
            queue: Some(tx),
            counters,
            subscribers,
            thread_handle: Some(handle),
        }
    }

    /// Queue a frame without blocking. Returns false if it was not queued.
    pub fn dispatch(&self, job: SendJob) -> bool {
        if job.is_cancelled() {
            self.counters.discarded.fetch_add(1, Ordering::Relaxed);
            return false;
        }

        let address = job.address();
        let queue = match &self.queue {
            Some(q) => q,
            None => {
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                publish(&self.subscribers, SendOutcome::Dropped { address });
                return false;
            }
        };

        match queue.try_send(job) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                warn!("Send queue unavailable, dropping frame for address {}", address);
                self.counters.dropped.fetch_add(1, Ordering::Relaxed);
                publish(&self.subscribers, SendOutcome::Dropped { address });
                false
            }
        }
    }

    pub fn statistics(&self) -> SendStatistics {
        self.counters.snapshot()
    }

    /// Receive an outcome for every frame dispatched from now on
    pub fn subscribe(&self) -> Receiver<SendOutcome> {
        let (tx, rx) = mpsc::channel();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Close the queue and wait for queued frames to be handled
    pub fn shutdown(&mut self) {
        self.queue.take();
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(
    mut transport: Box<dyn Transport>,
    rx: Receiver<SendJob>,
    counters: Arc<Counters>,
    subscribers: Subscribers,
) {
    for job in rx {
        if job.is_cancelled() {
            counters.discarded.fetch_add(1, Ordering::Relaxed);
            continue;
        }

        let address = job.address();
        let dest = &job.destination;
        let outcome = match transport.send(&dest.host, dest.port, &job.frame) {
            Ok(()) => {
                debug!("Sent frame for address {} to {}", address, dest);
                counters.sent.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Sent { address }
            }
            Err(e) => {
                warn!("Failed to send frame for address {}: {}", address, e);
                counters.failed.fetch_add(1, Ordering::Relaxed);
                SendOutcome::Failed {
                    address,
                    reason: e.to_string(),
                }
            }
        };
        publish(&subscribers, outcome);
    }
}
