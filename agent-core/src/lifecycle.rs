use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;

/// Single-slot, offer-or-drop wake signal (spec.md §4.4, §9 "Offer-or-drop signal"). Writers
/// never block: if the slot is already full the event is coalesced into the one already
/// pending. The reader blocks until a token is available.
pub type WakeSender = mpsc::Sender<()>;
pub type WakeReceiver = mpsc::Receiver<()>;

pub fn wake_channel() -> (WakeSender, WakeReceiver) {
    mpsc::channel(1)
}

pub fn try_wake(tx: &WakeSender) {
    let _ = tx.try_send(());
}

/// One shared cancellation handle passed to every watcher, the coordinator, and the transport
/// (spec.md §9 "Global mutable context + cancel" redesign: an explicit context object rather
/// than package-level state). `reset()` clears the cancelled flag for reuse without touching the
/// buffer.
#[derive(Clone)]
pub struct LifecycleHandle {
    cancelled: Arc<AtomicBool>,
    wake_tx: WakeSender,
    reset_senders: Arc<Mutex<Vec<mpsc::Sender<()>>>>,
}

impl LifecycleHandle {
    pub fn new(wake_tx: WakeSender) -> LifecycleHandle {
        LifecycleHandle { cancelled: Arc::new(AtomicBool::new(false)), wake_tx, reset_senders: Arc::new(Mutex::new(Vec::new())) }
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Idempotent: sets the cancelled flag, releases the coordinator via the wake channel.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        try_wake(&self.wake_tx);
    }

    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Each kind watcher calls this once at startup to get its own `newStateChan`
    /// (spec.md §4.6). The returned receiver fires when an administrative "force new state
    /// report" broadcast goes out, driving that watcher's STREAMING -> DRAINED transition.
    pub fn register_watcher(&self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel(1);
        self.reset_senders.lock().unwrap().push(tx);
        rx
    }

    /// Broadcasts a "start a new state report" signal to every registered watcher. Non-blocking
    /// per watcher, same offer-or-drop semantics as the coordinator's wake channel.
    pub fn broadcast_new_state(&self) {
        for tx in self.reset_senders.lock().unwrap().iter() {
            let _ = tx.try_send(());
        }
    }
}
