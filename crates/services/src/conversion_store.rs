use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::{debug, info, warn};

use portal_core::model::{
    ConversionHistoryEntry, ConversionOptions, ConversionStats, HistoryId, OptionsPatch,
    Provenance, RecentConversion,
};
use portal_core::translate;
use storage::{Mirror, MirrorKey};

use crate::Clock;
use crate::api::converter as api;
use crate::error::{ApiError, ConversionError};
use crate::http::ApiClient;
use crate::inflight::InFlight;

/// Number of entries requested from the server history endpoint.
pub const HISTORY_PAGE_SIZE: u32 = 50;

#[derive(Default)]
struct ConversionSlice {
    source: String,
    target: String,
    history: Vec<ConversionHistoryEntry>,
    options: ConversionOptions,
}

/// Java-to-Python conversion workspace, its options and history.
pub struct ConversionStore {
    client: Arc<ApiClient>,
    mirror: Mirror,
    clock: Clock,
    inflight: InFlight,
    state: Mutex<ConversionSlice>,
}

impl ConversionStore {
    #[must_use]
    pub fn new(client: Arc<ApiClient>, mirror: Mirror, clock: Clock, inflight: InFlight) -> Self {
        Self {
            client,
            mirror,
            clock,
            inflight,
            state: Mutex::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, ConversionSlice> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn history(&self) -> Vec<ConversionHistoryEntry> {
        self.lock().history.clone()
    }

    #[must_use]
    pub fn options(&self) -> ConversionOptions {
        self.lock().options
    }

    /// The workspace's current source and target text.
    #[must_use]
    pub fn workspace(&self) -> (String, String) {
        let slice = self.lock();
        (slice.source.clone(), slice.target.clone())
    }

    #[must_use]
    pub fn stats(&self) -> ConversionStats {
        ConversionStats::from_history(&self.lock().history)
    }

    /// Latest `limit` entries, newest first, with truncated texts.
    #[must_use]
    pub fn recent(&self, limit: usize) -> Vec<RecentConversion> {
        self.lock()
            .history
            .iter()
            .rev()
            .take(limit)
            .map(ConversionHistoryEntry::preview)
            .collect()
    }

    pub fn cancel_pending(&self) {
        self.inflight.cancel_pending();
    }

    /// Convert `source`, falling back to the local approximation whenever the
    /// server cannot do it. Every call that gets past validation appends one
    /// history entry.
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::EmptySource` for blank input, and
    /// `ConversionError::Cancelled` if a newer conversion superseded this one
    /// or pending work was cancelled.
    pub async fn convert(
        &self,
        source: &str,
        options: Option<ConversionOptions>,
    ) -> Result<ConversionHistoryEntry, ConversionError> {
        if source.trim().is_empty() {
            return Err(ConversionError::EmptySource);
        }
        let options = options.unwrap_or_else(|| self.options());

        let started = Instant::now();
        let result = self
            .inflight
            .run("convert", api::convert(&self.client, source, &options))
            .await;

        let (target, provenance) = match result {
            Ok(response) => (response.python_code, Provenance::Server),
            Err(ApiError::Cancelled) => return Err(ConversionError::Cancelled),
            Err(err) => {
                warn!(error = %err, "conversion service unavailable; using local approximation");
                (
                    translate::approximate(source, &options),
                    Provenance::LocalApproximation,
                )
            }
        };
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let entry = ConversionHistoryEntry::new(
            source.to_string(),
            target,
            duration_ms,
            self.clock.now(),
            provenance,
        );

        let mut slice = self.lock();
        slice.source = entry.source.clone();
        slice.target = entry.target.clone();
        slice.history.push(entry.clone());
        self.mirror.save(MirrorKey::ConversionHistory, &slice.history);
        debug!(id = %entry.id, ?provenance, duration_ms, "conversion recorded");
        Ok(entry)
    }

    /// Empty the workspace. History is kept.
    pub fn clear(&self) {
        let mut slice = self.lock();
        slice.source.clear();
        slice.target.clear();
    }

    /// Remove one entry. Unknown ids are ignored. Returns whether an entry
    /// was removed.
    pub fn delete_history_entry(&self, id: &HistoryId) -> bool {
        let mut slice = self.lock();
        let before = slice.history.len();
        slice.history.retain(|entry| &entry.id != id);
        if slice.history.len() == before {
            debug!(%id, "no history entry to delete");
            return false;
        }
        self.mirror.save(MirrorKey::ConversionHistory, &slice.history);
        true
    }

    pub fn clear_history(&self) {
        let mut slice = self.lock();
        slice.history.clear();
        self.mirror.save(MirrorKey::ConversionHistory, &slice.history);
        info!("conversion history cleared");
    }

    /// Shallow-merge `patch` into the options and persist them whole.
    pub fn update_options(&self, patch: OptionsPatch) -> ConversionOptions {
        let mut slice = self.lock();
        slice.options = slice.options.merged(patch);
        self.mirror.save(MirrorKey::ConversionOptions, &slice.options);
        slice.options
    }

    /// Reload history and options from the mirror.
    pub fn initialize(&self) {
        let history: Vec<ConversionHistoryEntry> =
            self.mirror.load(MirrorKey::ConversionHistory).unwrap_or_default();
        let options: ConversionOptions =
            self.mirror.load(MirrorKey::ConversionOptions).unwrap_or_default();
        let mut slice = self.lock();
        slice.history = history;
        slice.options = options;
    }

    /// History as the server knows it, or the local list if the server
    /// cannot be reached. The local list is not modified.
    ///
    /// # Errors
    ///
    /// Returns `ConversionError::Cancelled` if the fetch was cancelled.
    pub async fn fetch_history(&self) -> Result<Vec<ConversionHistoryEntry>, ConversionError> {
        match self
            .inflight
            .run("history", api::history(&self.client, HISTORY_PAGE_SIZE))
            .await
        {
            Ok(page) => Ok(page.items),
            Err(ApiError::Cancelled) => Err(ConversionError::Cancelled),
            Err(err) => {
                warn!(error = %err, "could not fetch server history; using local list");
                Ok(self.history())
            }
        }
    }
}
