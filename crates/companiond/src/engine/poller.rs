use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::AbortHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::entity::Sink;
use super::executor;
use super::parser::ParserChain;

/// What a poller runs and how often.
#[derive(Debug, Clone)]
pub struct PollSpec {
    pub command: String,
    pub shell: PathBuf,
    /// Wait between the end of one tick and the start of the next
    pub interval: Duration,
}

impl PollSpec {
    /// Interval for a rate in Hz, or None when the rate is not positive and finite or
    /// the interval does not fit a [`Duration`].
    pub fn interval_for_rate(rate_hz: f64) -> Option<Duration> {
        if !(rate_hz.is_finite() && rate_hz > 0.0) {
            return None;
        }
        Duration::try_from_secs_f64(1.0 / rate_hz).ok()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Running,
    /// Stop was requested; the current tick is still finishing
    Stopping,
    Stopped,
}

/// Runs a command periodically on its own task and feeds the parsed result to a sink.
///
/// The poller starts ticking as soon as it is created. Dropping it requests a stop.
pub struct Poller {
    name: String,
    shutdown_tx: watch::Sender<bool>,
    done_rx: watch::Receiver<bool>,
    task: AbortHandle,
}

impl Poller {
    /// Spawn the polling task. The first tick runs immediately.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(
        name: impl Into<String>,
        spec: PollSpec,
        chain: ParserChain,
        sink: Arc<dyn Sink>,
    ) -> Self {
        let name = name.into();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (done_tx, done_rx) = watch::channel(false);

        let task_name = name.clone();
        let handle = tokio::spawn(async move {
            poll_loop(&task_name, &spec, &chain, sink.as_ref(), shutdown_rx).await;
            let _ = done_tx.send(true);
        });

        Self {
            name,
            shutdown_tx,
            done_rx,
            task: handle.abort_handle(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Request the poller to stop.
    ///
    /// A pending wait wakes immediately; a running command finishes first. Safe to
    /// call any number of times from any thread.
    pub fn stop(&self) {
        let was_stopped = self.shutdown_tx.send_replace(true);
        if !was_stopped {
            debug!("[{}] Stop requested", self.name);
        }
    }

    /// Wait for the polling task to exit.
    pub async fn join(&self) {
        let mut done = self.done_rx.clone();
        // An error means the task went away without reporting (aborted or panicked)
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Kill the polling task, including a command it may be waiting on.
    pub fn abort(&self) {
        if !self.task.is_finished() {
            warn!("[{}] Aborting poller", self.name);
            self.task.abort();
        }
    }

    pub fn state(&self) -> PollerState {
        if *self.done_rx.borrow() || self.task.is_finished() {
            PollerState::Stopped
        } else if *self.shutdown_tx.borrow() {
            PollerState::Stopping
        } else {
            PollerState::Running
        }
    }

    pub fn is_running(&self) -> bool {
        self.state() == PollerState::Running
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        self.shutdown_tx.send_replace(true);
    }
}

async fn poll_loop(
    name: &str,
    spec: &PollSpec,
    chain: &ParserChain,
    sink: &dyn Sink,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    info!(
        "[{}] Starting command poller (every {:?}, shell {})",
        name,
        spec.interval,
        spec.shell.display()
    );

    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        tick(name, spec, chain, sink).await;

        let stopped = tokio::select! {
            _ = tokio::time::sleep(spec.interval) => false,
            changed = shutdown_rx.changed() => changed.is_err() || *shutdown_rx.borrow(),
        };
        if stopped {
            break;
        }
    }

    info!("[{}] Command poller stopped", name);
}

/// One execution: run, parse, update. Every failure is confined to this tick.
async fn tick(name: &str, spec: &PollSpec, chain: &ParserChain, sink: &dyn Sink) {
    let raw = match executor::run(&spec.command, &spec.shell).await {
        Ok(raw) => raw,
        Err(e) => {
            error!("[{}] {}", name, e);
            return;
        }
    };

    let value = match chain.apply(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!("[{}] Dropping update: {}", name, e);
            return;
        }
    };

    debug!("[{}] Raw value: {:?}, parsed value: {:?}", name, raw, value);

    if let Err(e) = sink.update(value) {
        warn!("[{}] Dropping update: {}", name, e);
    }
}
