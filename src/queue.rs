//! Command inbox of the [`Session`](crate::session::Session).
//!
//! Gestures, device callbacks and worker threads never touch the models. They
//! post a [`Command`] through a [`CommandSender`]; the session drains the queue
//! once per tick and applies every command in FIFO order on its own thread.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::arrange::ArrangeResult;
use crate::data::channels::ChannelId;
use crate::device::{DataFrame, ScopeDevice};
use crate::error::{PanoscopeError, Result};

/// Everything the session can be asked to do.
pub enum Command {
    // ── Gestures (already resolved to zoom/pan/anchor) ───────────────────────
    ZoomViewportFromGrid { zoom: f64, pan: f64, anchor: f64 },
    ZoomPanoramaFromGrid { zoom: f64, pan: f64, anchor: f64 },
    ZoomViewportFromPanorama { zoom: f64, pan: f64, center: f64 },
    ZoomPanoramaFromPanorama { zoom: f64, pan: f64, center: f64 },

    // ── Explicit settings ────────────────────────────────────────────────────
    SetTimePerDivision(f64),
    SetAcquisitionLength { time: f64, rolling: bool },
    SetViewport { center: f64, timespan: f64 },
    SetHoldoff(f64),
    MinimizeAcquisitionLength { timespan: f64 },
    SetPanoramaVisible(bool),
    SetRunning(bool),

    // ── Automation ───────────────────────────────────────────────────────────
    AutoEverything { channel: ChannelId, also_arrange: bool },
    CancelAutoTrigger,
    StartAutoArrange,
    ArrangeProgress(f64),
    ArrangeComplete(ArrangeResult),

    // ── Device ───────────────────────────────────────────────────────────────
    NewData(DataFrame),
    DeviceConnected(Box<dyn ScopeDevice>),
    DeviceFailed(String),
}

impl Command {
    /// Short name for log lines.
    pub fn label(&self) -> &'static str {
        match self {
            Command::ZoomViewportFromGrid { .. } => "zoom-viewport-from-grid",
            Command::ZoomPanoramaFromGrid { .. } => "zoom-panorama-from-grid",
            Command::ZoomViewportFromPanorama { .. } => "zoom-viewport-from-panorama",
            Command::ZoomPanoramaFromPanorama { .. } => "zoom-panorama-from-panorama",
            Command::SetTimePerDivision(_) => "set-time-per-division",
            Command::SetAcquisitionLength { .. } => "set-acquisition-length",
            Command::SetViewport { .. } => "set-viewport",
            Command::SetHoldoff(_) => "set-holdoff",
            Command::MinimizeAcquisitionLength { .. } => "minimize-acquisition-length",
            Command::SetPanoramaVisible(_) => "set-panorama-visible",
            Command::SetRunning(_) => "set-running",
            Command::AutoEverything { .. } => "auto-everything",
            Command::CancelAutoTrigger => "cancel-auto-trigger",
            Command::StartAutoArrange => "start-auto-arrange",
            Command::ArrangeProgress(_) => "arrange-progress",
            Command::ArrangeComplete(_) => "arrange-complete",
            Command::NewData(_) => "new-data",
            Command::DeviceConnected(_) => "device-connected",
            Command::DeviceFailed(_) => "device-failed",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

struct Envelope {
    ticket: u64,
    command: Command,
}

/// A dequeued command and the ticket to [`complete`](CommandQueue::complete).
pub struct Ticketed {
    pub ticket: u64,
    pub command: Command,
}

struct Outbox {
    next_ticket: u64,
    tx: Sender<Envelope>,
}

struct Shared {
    // ticket issue and enqueue happen under one lock so tickets follow FIFO order
    outbox: Mutex<Outbox>,
    executed: AtomicU64,
    closed: AtomicBool,
    poll: Duration,
}

/// Producer side; cheap to clone and `Send`.
#[derive(Clone)]
pub struct CommandSender {
    shared: Arc<Shared>,
}

impl CommandSender {
    /// Enqueue and return the command's ticket.
    pub fn send(&self, command: Command) -> Result<u64> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(PanoscopeError::QueueClosed);
        }
        let mut outbox = self
            .shared
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        outbox.next_ticket += 1;
        let ticket = outbox.next_ticket;
        outbox
            .tx
            .send(Envelope { ticket, command })
            .map_err(|_| PanoscopeError::QueueClosed)?;
        Ok(ticket)
    }

    /// Enqueue and wait until the consumer has executed the command.
    ///
    /// Must not be called from the consumer thread; it would wait forever.
    pub fn send_blocking(&self, command: Command) -> Result<()> {
        let ticket = self.send(command)?;
        while self.shared.executed.load(Ordering::Acquire) < ticket {
            if self.shared.closed.load(Ordering::Acquire) {
                return Err(PanoscopeError::QueueClosed);
            }
            std::thread::sleep(self.shared.poll);
        }
        Ok(())
    }
}

/// Consumer side, owned by the session.
pub struct CommandQueue {
    rx: Receiver<Envelope>,
    shared: Arc<Shared>,
}

impl CommandQueue {
    pub fn new(poll: Duration) -> Self {
        let (tx, rx) = std::sync::mpsc::channel();
        Self {
            rx,
            shared: Arc::new(Shared {
                outbox: Mutex::new(Outbox { next_ticket: 0, tx }),
                executed: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                poll,
            }),
        }
    }

    pub fn sender(&self) -> CommandSender {
        CommandSender {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Take every command pending right now. Commands posted while the
    /// batch is applied wait for the next drain.
    pub fn take_pending(&self) -> Vec<Ticketed> {
        self.rx
            .try_iter()
            .map(|Envelope { ticket, command }| Ticketed { ticket, command })
            .collect()
    }

    /// Mark a ticket executed, releasing its blocking sender.
    pub fn complete(&self, ticket: u64) {
        self.shared.executed.fetch_max(ticket, Ordering::AcqRel);
    }

    /// Apply the pending batch in order. Returns the number applied.
    pub fn drain(&self, mut apply: impl FnMut(Command)) -> usize {
        let batch = self.take_pending();
        let count = batch.len();
        for Ticketed { ticket, command } in batch {
            apply(command);
            self.complete(ticket);
        }
        count
    }

    /// Tickets issued but not yet executed.
    pub fn pending(&self) -> u64 {
        let issued = self
            .shared
            .outbox
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .next_ticket;
        issued - self.shared.executed.load(Ordering::Acquire)
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        self.shared.closed.store(true, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_in_fifo_order() {
        let queue = CommandQueue::new(Duration::from_millis(1));
        let tx = queue.sender();
        tx.send(Command::SetHoldoff(1.0)).unwrap();
        tx.send(Command::SetHoldoff(2.0)).unwrap();
        assert_eq!(queue.pending(), 2);
        let mut seen = Vec::new();
        let n = queue.drain(|cmd| {
            if let Command::SetHoldoff(h) = cmd {
                seen.push(h);
            }
        });
        assert_eq!(n, 2);
        assert_eq!(seen, vec![1.0, 2.0]);
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn send_after_drop_fails() {
        let queue = CommandQueue::new(Duration::from_millis(1));
        let tx = queue.sender();
        drop(queue);
        assert!(matches!(
            tx.send(Command::CancelAutoTrigger),
            Err(PanoscopeError::QueueClosed)
        ));
    }

    #[test]
    fn label_is_stable() {
        assert_eq!(format!("{:?}", Command::SetRunning(true)), "set-running");
    }
}
