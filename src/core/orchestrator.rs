use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::{
    sync::watch,
    time::{timeout, Instant},
};
use tracing::{debug, info, warn};

use super::{
    progress::ProgressReporter,
    state::{GenerationOutcome, GenerationPath, GenerationState},
    store::TripStore,
};
use crate::{
    config::OrchestratorConfig,
    error::{GenerationError, Result},
    services::{
        backend::{upstream_error_message, GenerationBackend},
        normalizer::normalize,
    },
    types::{itinerary::Itinerary, request::TripRequest},
};

/// Drives one generation attempt at a time through
/// `Idle → Requesting → {Succeeded, TimedOut → FallbackRequesting → {Succeeded, Failed}, Failed}`.
///
/// A new submission supersedes any attempt still in flight: the older attempt
/// returns [`GenerationError::Superseded`] and can no longer touch the store, the
/// progress reporter or the state.
#[derive(Debug)]
pub struct Orchestrator {
    backend: Arc<dyn GenerationBackend>,
    store: Arc<TripStore>,
    progress: Arc<ProgressReporter>,
    config: OrchestratorConfig,
    /// Id of the attempt that currently owns the store; guards every write
    epoch: Mutex<u64>,
    epoch_tx: watch::Sender<u64>,
    state: watch::Sender<GenerationState>,
}

/// Handle held by a running attempt
struct Attempt {
    id: u64,
    epochs: watch::Receiver<u64>,
}

impl Orchestrator {
    pub fn new(backend: impl GenerationBackend + 'static) -> Self {
        Self::from_shared(Arc::new(backend))
    }

    pub fn from_shared(backend: Arc<dyn GenerationBackend>) -> Self {
        let config = OrchestratorConfig::default();
        let (epoch_tx, _) = watch::channel(0);
        let (state, _) = watch::channel(GenerationState::Idle);
        Self {
            backend,
            store: Arc::new(TripStore::in_memory()),
            progress: Arc::new(ProgressReporter::new(config.progress.clone())),
            config,
            epoch: Mutex::new(0),
            epoch_tx,
            state,
        }
    }

    pub fn with_store(mut self, store: Arc<TripStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.progress = Arc::new(ProgressReporter::new(config.progress.clone()));
        self.config = config;
        self
    }

    pub fn store(&self) -> &Arc<TripStore> {
        &self.store
    }

    pub fn progress(&self) -> &Arc<ProgressReporter> {
        &self.progress
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn state(&self) -> GenerationState {
        *self.state.borrow()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<GenerationState> {
        self.state.subscribe()
    }

    /// Run a full generation attempt for `request`.
    ///
    /// On success the normalized itinerary has been written to the trip store. On
    /// failure the store keeps its previous value and the error is the single
    /// message to surface.
    pub async fn submit(&self, request: &TripRequest) -> Result<GenerationOutcome> {
        let request = request.validated()?;
        let attempt = self.begin_attempt();
        let started = Instant::now();

        info!(
            target: "tripgen::orchestrator",
            attempt = attempt.id,
            city = %request.city,
            days = request.days,
            "starting generation attempt"
        );

        match self.run_attempt(&attempt, &request).await {
            Ok((path, itinerary)) => self.commit(&attempt, path, itinerary, started),
            Err(GenerationError::Superseded) => {
                debug!(target: "tripgen::orchestrator", attempt = attempt.id, "attempt superseded");
                Err(GenerationError::Superseded)
            }
            Err(err) => {
                self.fail(&attempt, &err);
                Err(err)
            }
        }
    }

    async fn run_attempt(
        &self,
        attempt: &Attempt,
        request: &TripRequest,
    ) -> Result<(GenerationPath, Itinerary)> {
        let primary = self
            .guarded(
                attempt,
                timeout(self.config.primary_timeout, self.backend.generate_trip(request)),
            )
            .await?;

        let (path, body) = match primary {
            Ok(Ok(body)) => (GenerationPath::Primary, body),
            Ok(Err(err)) if !err.is_recoverable() => return Err(err),
            Ok(Err(err)) => {
                warn!(target: "tripgen::orchestrator", attempt = attempt.id, error = %err, "primary request timed out");
                (GenerationPath::Fallback, self.run_fallback(attempt, request).await?)
            }
            Err(_) => {
                warn!(
                    target: "tripgen::orchestrator",
                    attempt = attempt.id,
                    budget_ms = self.config.primary_timeout.as_millis() as u64,
                    "primary request exceeded its wait budget"
                );
                (GenerationPath::Fallback, self.run_fallback(attempt, request).await?)
            }
        };

        check_body(&body)?;
        self.transition(attempt, GenerationState::Succeeded)?;

        let itinerary = normalize(&body, request)?;
        Ok((path, itinerary))
    }

    /// Single fallback hop. The primary future has already been dropped, so its
    /// response can never reach the store.
    async fn run_fallback(&self, attempt: &Attempt, request: &TripRequest) -> Result<Value> {
        self.transition(attempt, GenerationState::TimedOut)?;
        self.transition(attempt, GenerationState::FallbackRequesting)?;

        let fallback = self
            .guarded(
                attempt,
                timeout(
                    self.config.fallback_timeout,
                    self.backend.generate_itinerary(request),
                ),
            )
            .await?;

        match fallback {
            Ok(result) => result,
            Err(_) => Err(GenerationError::Timeout(format!(
                "fallback generation did not complete within {}s",
                self.config.fallback_timeout.as_secs_f64()
            ))),
        }
    }

    /// Race `future` against supersession of the attempt
    async fn guarded<F>(&self, attempt: &Attempt, future: F) -> Result<F::Output>
    where
        F: Future,
    {
        let mut epochs = attempt.epochs.clone();
        let id = attempt.id;
        tokio::select! {
            biased;
            _ = wait_superseded(&mut epochs, id) => Err(GenerationError::Superseded),
            output = future => Ok(output),
        }
    }

    fn begin_attempt(&self) -> Attempt {
        let mut epoch = self.epoch.lock();

        let previous = *self.state.borrow();
        if previous.is_in_flight() {
            info!(
                target: "tripgen::orchestrator",
                superseded = *epoch,
                state = %previous,
                "new submission cancels the attempt in flight"
            );
        }
        self.state.send_replace(GenerationState::Idle);

        *epoch += 1;
        let id = *epoch;
        self.epoch_tx.send_replace(id);

        self.progress.start();
        self.state.send_replace(GenerationState::Requesting);
        debug!(target: "tripgen::orchestrator", attempt = id, state = %GenerationState::Requesting, "transition");

        Attempt {
            id,
            epochs: self.epoch_tx.subscribe(),
        }
    }

    fn transition(&self, attempt: &Attempt, next: GenerationState) -> Result<()> {
        let epoch = self.epoch.lock();
        if *epoch != attempt.id {
            return Err(GenerationError::Superseded);
        }

        let current = *self.state.borrow();
        if !current.can_transition_to(next) {
            warn!(
                target: "tripgen::orchestrator",
                attempt = attempt.id,
                from = %current,
                to = %next,
                "unexpected state transition"
            );
        }
        self.state.send_replace(next);
        debug!(target: "tripgen::orchestrator", attempt = attempt.id, from = %current, to = %next, "transition");
        Ok(())
    }

    fn commit(
        &self,
        attempt: &Attempt,
        path: GenerationPath,
        itinerary: Itinerary,
        started: Instant,
    ) -> Result<GenerationOutcome> {
        let epoch = self.epoch.lock();
        if *epoch != attempt.id {
            return Err(GenerationError::Superseded);
        }

        let itinerary = self.store.set(itinerary);
        self.progress.stop(true);
        drop(epoch);

        let elapsed = started.elapsed();
        info!(
            target: "tripgen::orchestrator",
            attempt = attempt.id,
            path = ?path,
            elapsed_ms = elapsed.as_millis() as u64,
            "generation attempt succeeded"
        );

        Ok(GenerationOutcome {
            itinerary,
            path,
            elapsed,
        })
    }

    fn fail(&self, attempt: &Attempt, err: &GenerationError) {
        let epoch = self.epoch.lock();
        if *epoch != attempt.id {
            return;
        }

        self.progress.stop(false);
        let previous = self.state.send_replace(GenerationState::Failed);
        drop(epoch);

        warn!(
            target: "tripgen::orchestrator",
            attempt = attempt.id,
            from = %previous,
            code = err.error_code(),
            error = %err,
            "generation attempt failed"
        );
    }
}

/// A resolved body that carries an `error` field is an upstream failure
fn check_body(body: &Value) -> Result<()> {
    match upstream_error_message(body) {
        Some(message) => Err(GenerationError::upstream(None, message)),
        None => Ok(()),
    }
}

async fn wait_superseded(epochs: &mut watch::Receiver<u64>, id: u64) {
    if epochs.wait_for(|epoch| *epoch != id).await.is_err() {
        std::future::pending::<()>().await;
    }
}
