//! Live-polling tables.
//!
//! A [`LiveTable`] owns the engine state of one view: the reconciliation
//! snapshot, the displayed table, a request gate and the last fetch error.
//! Refreshes that finish after a newer one started are dropped.

use crate::cache::CollectionCache;
use crate::entities::Record;
use crate::gate::{RequestGate, Ticket};
use crate::reconciliation::{Diff, ReconciliationEngine, TableModel};
use crate::source::{CollectionSource, FetchError};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);

struct ViewState<R> {
    engine: ReconciliationEngine<R>,
    last_error: Option<String>,
}

pub struct LiveTable<R, S> {
    cache: Arc<CollectionCache<S>>,
    state: Arc<Mutex<ViewState<R>>>,
    gate: RequestGate,
}

impl<R, S> Clone for LiveTable<R, S> {
    fn clone(&self) -> Self {
        LiveTable {
            cache: Arc::clone(&self.cache),
            state: Arc::clone(&self.state),
            gate: self.gate.clone(),
        }
    }
}

impl<R: Record, S: CollectionSource> LiveTable<R, S> {
    pub fn new(cache: Arc<CollectionCache<S>>) -> Self {
        LiveTable {
            cache,
            state: Arc::new(Mutex::new(ViewState {
                engine: ReconciliationEngine::new(),
                last_error: None,
            })),
            gate: RequestGate::new(),
        }
    }

    /// Fetch the collection and reconcile the table with it.
    ///
    /// Returns `Ok(None)` when a newer refresh started while this one was in
    /// flight; its rows are discarded.
    pub async fn refresh(&self) -> Result<Option<Diff<R>>, FetchError> {
        let ticket = self.gate.issue();
        let fetched = self.cache.refresh::<R>().await;
        self.settle(ticket, fetched)
    }

    fn settle(
        &self,
        ticket: Ticket,
        fetched: Result<Arc<Vec<R>>, FetchError>,
    ) -> Result<Option<Diff<R>>, FetchError> {
        if !self.gate.is_current(ticket) {
            debug!(domain = R::DOMAIN.as_str(), "stale refresh dropped");
            return Ok(None);
        }

        let mut state = self.lock();
        match fetched {
            Ok(rows) => {
                state.last_error = None;
                let diff = state.engine.reconcile(rows.as_ref().clone());
                if !diff.is_empty() {
                    debug!(domain = R::DOMAIN.as_str(), changes = %diff.summary(), "table reconciled");
                }
                Ok(Some(diff))
            }
            Err(err) => {
                state.last_error = Some(err.to_string());
                Err(err)
            }
        }
    }

    /// Run `f` against the displayed table.
    pub fn view<T>(&self, f: impl FnOnce(&TableModel<R>) -> T) -> T {
        f(self.lock().engine.table())
    }

    pub fn rows(&self) -> Vec<R> {
        self.view(|table| table.rows().to_vec())
    }

    pub fn selected_row(&self) -> Option<R> {
        self.view(|table| table.selected_row().cloned())
    }

    pub fn move_selection(&self, delta: isize) {
        self.lock().engine.table_mut().move_selection(delta);
    }

    pub fn select(&self, key: Option<i64>) {
        self.lock().engine.table_mut().select(key);
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn dismiss_error(&self) {
        self.lock().last_error = None;
    }

    /// Refresh now and then every `interval` until the handle is dropped.
    /// Failed polls are logged and retried on the next tick.
    pub fn spawn_polling(&self, interval: Duration) -> PollHandle {
        let table = self.clone();
        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(err) = table.refresh().await {
                    warn!(domain = R::DOMAIN.as_str(), error = %err, "poll failed");
                }
            }
        });

        PollHandle { task }
    }

    fn lock(&self) -> MutexGuard<'_, ViewState<R>> {
        // State stays consistent between statements, so a poisoned lock is still usable.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Stops the polling task when dropped.
#[derive(Debug)]
pub struct PollHandle {
    task: JoinHandle<()>,
}

impl PollHandle {
    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

impl Drop for PollHandle {
    fn drop(&mut self) {
        self.task.abort();
    }
}
