//! Bounded command queue between peer workers and the target worker
//!
//! Peers enqueue commands and block while the queue is full. Exactly one
//! target worker consumes at a time: it holds a [`TargetLease`], which owns
//! the receiving end. Attaching a new target cancels the current lease and
//! waits for it to be released, so the newest registration always wins.

mod command;

pub use command::{Command, DeliveryError, PendingReply, Reply, ReplySlot};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use tokio::sync::{mpsc, Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

/// FIFO of commands awaiting the target
pub struct CommandQueue {
    tx: mpsc::Sender<Command>,
    rx: Arc<Mutex<mpsc::Receiver<Command>>>,
    capacity: usize,
    registry: TargetRegistry,
}

impl CommandQueue {
    /// Create a queue holding at most `capacity` commands (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (tx, rx) = mpsc::channel(capacity);

        Self {
            tx,
            rx: Arc::new(Mutex::new(rx)),
            capacity,
            registry: TargetRegistry::default(),
        }
    }

    /// Maximum number of queued commands
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Commands currently queued
    pub fn len(&self) -> usize {
        self.capacity - self.tx.capacity()
    }

    /// Whether no command is queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Append a command, waiting while the queue is full
    ///
    /// The receiver lives as long as the queue, so sending can only fail
    /// during teardown. The command is then dropped and its peer sees
    /// [`DeliveryError::Dropped`].
    pub async fn enqueue(&self, command: Command) {
        if self.tx.send(command).await.is_err() {
            tracing::debug!("Command queue closed, command dropped");
        }
    }

    /// Become the consuming target, displacing any current one
    pub async fn attach_target(&self) -> TargetLease {
        let (id, displaced) = self.registry.register();
        let rx = Arc::clone(&self.rx).lock_owned().await;
        tracing::debug!("Target registration {} holds the command queue", id);

        TargetLease { id, rx, displaced }
    }
}

/// Exclusive consumer access to the queue for one target session
pub struct TargetLease {
    id: u64,
    rx: OwnedMutexGuard<mpsc::Receiver<Command>>,
    displaced: CancellationToken,
}

impl TargetLease {
    /// Registration number, increasing with each attach
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Next queued command; `None` once the queue is gone
    pub async fn next_command(&mut self) -> Option<Command> {
        self.rx.recv().await
    }

    /// Token cancelled when a newer target attaches
    pub fn displacement_token(&self) -> CancellationToken {
        self.displaced.clone()
    }

    /// A newer target has attached
    pub fn is_displaced(&self) -> bool {
        self.displaced.is_cancelled()
    }

    /// Fail every queued command; returns how many were failed
    pub fn fail_pending(&mut self, reason: DeliveryError) -> usize {
        let mut failed = 0;
        while let Ok(command) = self.rx.try_recv() {
            command.fail(reason);
            failed += 1;
        }
        failed
    }
}

/// Tracks which registration is current
#[derive(Default)]
struct TargetRegistry {
    next_id: AtomicU64,
    current: StdMutex<Option<CancellationToken>>,
}

impl TargetRegistry {
    fn register(&self) -> (u64, CancellationToken) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let token = CancellationToken::new();

        let previous = match self.current.lock() {
            Ok(mut current) => current.replace(token.clone()),
            Err(poisoned) => poisoned.into_inner().replace(token.clone()),
        };
        if let Some(previous) = previous {
            tracing::info!("Target registration {} displaces the previous target", id);
            previous.cancel();
        }

        (id, token)
    }
}
