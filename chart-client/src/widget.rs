use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use chart_core::{ViewData, WidgetState};

use crate::slot::FetchSlot;
use crate::{CancellationToken, ClientError};

/// Receives fetch failures that end up in [`WidgetState::Failed`].
pub trait ErrorReporter: Send + Sync {
    fn report(&self, widget: &str, error: &ClientError);
}

/// Logs failures with `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, widget: &str, error: &ClientError) {
        tracing::error!(widget, %error, "widget fetch failed");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The key is already loaded or loading, or the widget is unmounted.
    Skipped,
    Committed,
    Failed,
    /// A newer load or an unmount superseded this one.
    Stale,
}

/// One data dependency of a chart widget.
///
/// `load` is keyed by the dependency (usually the patient uuid): a new key
/// aborts the previous fetch, the same key is loaded once until
/// [`Widget::invalidate`].
pub struct Widget<T> {
    name: String,
    slot: FetchSlot<String>,
    state: Mutex<WidgetState<T>>,
    reporter: Arc<dyn ErrorReporter>,
}

impl<T: ViewData + Clone> Widget<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_reporter(name, Arc::new(TracingReporter))
    }

    pub fn with_reporter(name: impl Into<String>, reporter: Arc<dyn ErrorReporter>) -> Self {
        Self {
            name: name.into(),
            slot: FetchSlot::new(),
            state: Mutex::new(WidgetState::Loading),
            reporter,
        }
    }

    fn lock(&self) -> MutexGuard<'_, WidgetState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn load<F, Fut>(&self, key: impl Into<String>, fetch: F) -> LoadOutcome
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let key = key.into();
        let ticket = {
            let mut state = self.lock();
            match self.slot.begin(key.clone()) {
                Some(ticket) => {
                    *state = WidgetState::Loading;
                    ticket
                }
                None => return LoadOutcome::Skipped,
            }
        };
        tracing::debug!(widget = %self.name, %key, generation = ticket.generation(), "loading");

        let result = fetch(ticket.token().clone()).await;

        let mut state = self.lock();
        match result {
            Ok(data) if self.slot.commit(&ticket) => {
                *state = WidgetState::from_data(data);
                LoadOutcome::Committed
            }
            // Only a current ticket can fail; one cancelled by the slot is stale.
            Err(error) if self.slot.fail(&ticket) => {
                self.reporter.report(&self.name, &error);
                *state = WidgetState::Failed(error.to_string());
                LoadOutcome::Failed
            }
            _ => {
                tracing::debug!(widget = %self.name, %key, "dropping stale result");
                LoadOutcome::Stale
            }
        }
    }

    pub fn state(&self) -> WidgetState<T> {
        self.lock().clone()
    }

    /// Force the next `load` to fetch again, cancelling any fetch in flight.
    pub fn invalidate(&self) {
        let _state = self.lock();
        self.slot.reset();
    }

    /// Cancel pending work; later loads are skipped.
    pub fn unmount(&self) {
        let _state = self.lock();
        self.slot.teardown();
    }
}
