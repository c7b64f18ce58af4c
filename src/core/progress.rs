use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rand::Rng;
use tokio::{sync::watch, task::JoinHandle, time::Instant};
use tracing::trace;

/// Tuning for the simulated progress ticker
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressConfig {
    /// Value shown as soon as the reporter starts
    pub initial: f64,
    /// Highest value the ticker reaches on its own
    pub ceiling: f64,
    /// Tick cadence
    pub tick: Duration,
    /// Lower bound of the random per-tick increment (inclusive)
    pub min_increment: f64,
    /// Upper bound of the random per-tick increment (exclusive)
    pub max_increment: f64,
    /// How long 100% stays visible after a successful stop
    pub finish_linger: Duration,
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            initial: 5.0,
            ceiling: 95.0,
            tick: Duration::from_millis(700),
            min_increment: 3.0,
            max_increment: 13.0,
            finish_linger: Duration::from_millis(500),
        }
    }
}

/// What a progress bar should display
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressSnapshot {
    /// Percentage in [0, 100]
    pub value: f64,
    pub visible: bool,
}

impl ProgressSnapshot {
    pub const HIDDEN: ProgressSnapshot = ProgressSnapshot {
        value: 0.0,
        visible: false,
    };
}

/// Simulated progress for a generation attempt.
///
/// The server reports no real progress, so the value creeps up on a timer and only
/// reaches 100 through `stop(true)`.
#[derive(Debug)]
pub struct ProgressReporter {
    config: ProgressConfig,
    sender: Arc<watch::Sender<ProgressSnapshot>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ProgressReporter {
    pub fn new(config: ProgressConfig) -> Self {
        let (sender, _) = watch::channel(ProgressSnapshot::HIDDEN);
        Self {
            config,
            sender: Arc::new(sender),
            task: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &ProgressConfig {
        &self.config
    }

    /// Start ticking from the initial value, restarting if already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut task = self.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        self.sender.send_replace(ProgressSnapshot {
            value: self.config.initial,
            visible: true,
        });

        let sender = Arc::clone(&self.sender);
        let config = self.config.clone();
        *task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + config.tick, config.tick);
            loop {
                ticker.tick().await;
                let increment = sample_increment(&config);
                sender.send_modify(|snapshot| {
                    if snapshot.value < config.ceiling {
                        snapshot.value = (snapshot.value + increment).min(config.ceiling);
                    }
                    trace!(target: "tripgen::progress", value = snapshot.value, "tick");
                });
            }
        }));
    }

    /// Stop ticking. On success the bar shows 100 for the linger period before
    /// hiding; on failure it hides immediately.
    pub fn stop(&self, success: bool) {
        let mut task = self.task.lock();
        if let Some(handle) = task.take() {
            handle.abort();
        }

        if !success {
            self.sender.send_replace(ProgressSnapshot::HIDDEN);
            return;
        }

        self.sender.send_replace(ProgressSnapshot {
            value: 100.0,
            visible: true,
        });

        let sender = Arc::clone(&self.sender);
        let linger = self.config.finish_linger;
        *task = Some(tokio::spawn(async move {
            tokio::time::sleep(linger).await;
            sender.send_replace(ProgressSnapshot::HIDDEN);
        }));
    }

    pub fn current(&self) -> ProgressSnapshot {
        *self.sender.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
        self.sender.subscribe()
    }

    /// True while the ticker or the completion linger is active
    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .map(|handle| !handle.is_finished())
            .unwrap_or(false)
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new(ProgressConfig::default())
    }
}

impl Drop for ProgressReporter {
    fn drop(&mut self) {
        if let Some(handle) = self.task.lock().take() {
            handle.abort();
        }
    }
}

fn sample_increment(config: &ProgressConfig) -> f64 {
    if config.max_increment <= config.min_increment {
        return config.min_increment;
    }
    rand::thread_rng().gen_range(config.min_increment..config.max_increment)
}
