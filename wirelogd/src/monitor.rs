// Peer polling loop

//! Polling loop
//!
//! Each cycle fetches the peer table, parses it, steps the activity tracker
//! and hands the resulting transitions to an [`EventSink`]. Cycles run one at
//! a time, separated by the refresh interval, until the shutdown future
//! completes or a fetch/parse error ends the loop.

use crate::config::Settings;
use crate::logging::{render_event, LogFormat, EVENT_TARGET};
use crate::names::NameDirectory;
use crate::snapshot::{parse_snapshot, ParseError};
use crate::state::{unix_now, ActivityTracker};
use crate::types::{PeerRecord, TransitionEvent};
use crate::wg_status::{FetchError, StatusSource};
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Receiver of transition events
pub trait EventSink {
    /// Record one transition; called in emission order
    fn emit(&mut self, event: &TransitionEvent);
}

/// Writes each transition as an `info` log line
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink {
    format: LogFormat,
}

impl LogSink {
    /// Sink rendering events in `format`
    pub fn new(format: LogFormat) -> Self {
        Self { format }
    }
}

impl EventSink for LogSink {
    fn emit(&mut self, event: &TransitionEvent) {
        log::info!(target: EVENT_TARGET, "{}", render_event(event, self.format));
    }
}

/// Errors that end the polling loop
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Peer table could not be fetched
    #[error(transparent)]
    Fetch(#[from] FetchError),
    /// Peer table could not be parsed
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Drives the activity tracker from a status source
pub struct Monitor<S, K> {
    source: S,
    sink: K,
    tracker: ActivityTracker,
    names: Option<NameDirectory>,
    refresh: Duration,
    clock: fn() -> f64,
}

impl<S: StatusSource, K: EventSink> Monitor<S, K> {
    /// Create a monitor configured from `settings`
    pub fn new(source: S, sink: K, settings: &Settings) -> Self {
        let names = (settings.wg_gen_web && !settings.wg_gen_web_path.as_os_str().is_empty())
            .then(|| NameDirectory::new(&settings.wg_gen_web_path));

        Self {
            source,
            sink,
            tracker: ActivityTracker::new(settings.timeout),
            names,
            refresh: settings.refresh,
            clock: unix_now,
        }
    }

    /// Replace the wall clock (Unix seconds)
    pub fn with_clock(mut self, clock: fn() -> f64) -> Self {
        self.clock = clock;
        self
    }

    /// Activity state built so far
    pub fn tracker(&self) -> &ActivityTracker {
        &self.tracker
    }

    /// Sink receiving the transitions
    pub fn sink(&self) -> &K {
        &self.sink
    }

    /// Run a single cycle and return the number of transitions emitted
    pub async fn poll_once(&mut self) -> Result<usize, MonitorError> {
        let raw = self.source.fetch().await?;
        let peers = parse_snapshot(&raw, self.names.as_mut()).collect::<Result<Vec<_>, _>>()?;
        log_peers(&peers);

        let events = self.tracker.observe(&peers, (self.clock)());
        for event in &events {
            self.sink.emit(event);
        }

        Ok(events.len())
    }

    /// Poll until `shutdown` completes (`Ok`) or a cycle fails (`Err`)
    ///
    /// Shutdown is checked before each cycle, while fetching and while
    /// sleeping; transitions already emitted by a cycle are kept.
    pub async fn run<F>(&mut self, shutdown: F) -> Result<(), MonitorError>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(()),
                result = self.poll_once() => {
                    result?;
                }
            }

            tokio::select! {
                biased;
                _ = &mut shutdown => return Ok(()),
                _ = tokio::time::sleep(self.refresh) => {}
            }
        }
    }
}

fn log_peers(peers: &[PeerRecord]) {
    if !log::log_enabled!(log::Level::Debug) {
        return;
    }
    match serde_json::to_string(peers) {
        Ok(json) => log::debug!("peers: {}", json),
        Err(e) => log::debug!("peers: <unserializable: {}>", e),
    }
}
