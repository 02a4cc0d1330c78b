//! Catalog event fan-out.
//!
//! Listeners get their own unbounded channel, so emission never blocks and a
//! dropped listener never breaks the emitter. Events arrive at each listener
//! in emission order; fan-out follows subscription order.

use crate::book::Book;
use std::sync::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// Something happened to one book.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookEventKind {
    /// The book entered the live index (discovered, hydrated, or revived).
    Added,
    /// Metadata of an indexed book changed.
    Updated,
    /// The book left the index and its row is gone.
    Removed,
}

/// Lifecycle of a reconciliation pass.
///
/// A requested pass emits either `NotStarted` (another pass holds the flag)
/// or `Started … {Succeeded | Failed} … Completed`. `Completed` always fires
/// last, even when the pass panicked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildEventKind {
    Started,
    NotStarted,
    Succeeded,
    Failed,
    Completed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogEvent {
    Book(BookEventKind, Book),
    Build(BuildEventKind),
}

/// Per-listener channel fan-out for [`CatalogEvent`]s.
#[derive(Debug, Default)]
pub struct EventBus {
    senders: Mutex<Vec<UnboundedSender<CatalogEvent>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener. Events emitted before subscription are not
    /// replayed. Dropping the receiver unsubscribes; the bus prunes the dead
    /// channel on the next emission.
    pub fn subscribe(&self) -> UnboundedReceiver<CatalogEvent> {
        let (sender, receiver) = unbounded_channel();
        self.lock().push(sender);
        receiver
    }

    pub(crate) fn emit(&self, event: CatalogEvent) {
        // Unbounded sends cannot block, so holding the lock across the
        // fan-out is fine and keeps emissions totally ordered.
        self.lock().retain(|sender| sender.send(event.clone()).is_ok());
    }

    pub(crate) fn emit_book(&self, kind: BookEventKind, book: Book) {
        self.emit(CatalogEvent::Book(kind, book));
    }

    pub(crate) fn emit_build(&self, kind: BuildEventKind) {
        self.emit(CatalogEvent::Build(kind));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<UnboundedSender<CatalogEvent>>> {
        self.senders.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}
