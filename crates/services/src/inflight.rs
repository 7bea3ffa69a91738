//! Cancellation of superseded and abandoned requests.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::ApiError;

/// Handle for one in-flight operation.
#[derive(Debug, Clone)]
pub struct Ticket {
    slot: String,
    generation: u64,
    token: CancellationToken,
}

impl Ticket {
    #[must_use]
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

#[derive(Default)]
struct Slots {
    next_generation: u64,
    active: HashMap<String, (u64, CancellationToken)>,
}

/// Per-store registry of in-flight operations keyed by slot.
///
/// Starting an operation in a slot cancels the one already running there;
/// [`InFlight::cancel_pending`] cancels everything. All tokens are children
/// of one root, so [`InFlight::shutdown`] stops current and future work.
pub struct InFlight {
    root: CancellationToken,
    slots: Mutex<Slots>,
}

impl Default for InFlight {
    fn default() -> Self {
        Self::new(CancellationToken::new())
    }
}

impl InFlight {
    #[must_use]
    pub fn new(root: CancellationToken) -> Self {
        Self {
            root,
            slots: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new operation in `slot`, superseding the previous one.
    pub fn begin(&self, slot: impl Into<String>) -> Ticket {
        let slot = slot.into();
        let token = self.root.child_token();
        let mut slots = self.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        if let Some((_, previous)) = slots.active.insert(slot.clone(), (generation, token.clone())) {
            debug!(%slot, "superseding in-flight request");
            previous.cancel();
        }
        Ticket {
            slot,
            generation,
            token,
        }
    }

    /// Register an operation under a fresh slot derived from `prefix`. It is
    /// never superseded; only [`InFlight::cancel_pending`] and
    /// [`InFlight::shutdown`] cancel it.
    pub fn begin_alongside(&self, prefix: &str) -> Ticket {
        let token = self.root.child_token();
        let mut slots = self.lock();
        slots.next_generation += 1;
        let generation = slots.next_generation;
        let slot = format!("{prefix}#{generation}");
        slots.active.insert(slot.clone(), (generation, token.clone()));
        Ticket {
            slot,
            generation,
            token,
        }
    }

    /// Forget `ticket` if it is still the slot's current operation.
    pub fn finish(&self, ticket: &Ticket) {
        let mut slots = self.lock();
        if slots
            .active
            .get(&ticket.slot)
            .is_some_and(|(generation, _)| *generation == ticket.generation)
        {
            slots.active.remove(&ticket.slot);
        }
    }

    /// Run `operation` in `slot`. If the slot is superseded or cancelled
    /// before it completes, the operation is dropped and its result never
    /// observed.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Cancelled` on cancellation, otherwise whatever
    /// `operation` returns.
    pub async fn run<T, F>(&self, slot: impl Into<String>, operation: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self.begin(slot);
        self.drive(ticket, operation).await
    }

    /// Like [`InFlight::run`], but concurrent operations sharing `prefix`
    /// do not supersede each other.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::Cancelled` on cancellation, otherwise whatever
    /// `operation` returns.
    pub async fn run_alongside<T, F>(&self, prefix: &str, operation: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let ticket = self.begin_alongside(prefix);
        self.drive(ticket, operation).await
    }

    async fn drive<T, F>(&self, ticket: Ticket, operation: F) -> Result<T, ApiError>
    where
        F: Future<Output = Result<T, ApiError>>,
    {
        let result = tokio::select! {
            biased;
            () = ticket.token.cancelled() => Err(ApiError::Cancelled),
            result = operation => result,
        };
        self.finish(&ticket);
        result
    }

    /// Cancel every pending operation. New operations may start afterwards.
    pub fn cancel_pending(&self) {
        let mut slots = self.lock();
        for (slot, (_, token)) in slots.active.drain() {
            debug!(%slot, "cancelling in-flight request");
            token.cancel();
        }
    }

    /// Cancel everything, permanently.
    pub fn shutdown(&self) {
        self.root.cancel();
        self.lock().active.clear();
    }

    #[must_use]
    pub fn pending(&self) -> usize {
        self.lock().active.len()
    }
}
