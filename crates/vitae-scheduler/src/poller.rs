//! Lease-based polling over a table of due documents.
//!
//! A [`CronPoller`] repeatedly claims one eligible document from its
//! [`LeaseStore`] and runs its [`DocumentHandler`] on it as an independent
//! tokio task. The poller never changes what happens to a document; it only
//! takes and gives back the lease. Handlers decide whether the document is
//! deleted, rescheduled or left for another attempt.
//!
//! Leases bound how long a claim is honoured. A handler that outlives its
//! lease is not cancelled, so the same document can be processed twice;
//! this shows up as a `lease lost` warning when the slow worker finishes.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use vitae_core::config::PollerSettings;
use vitae_core::lease::Lease;

use crate::clock::{Clock, SystemClock};
use crate::error::Result;
use crate::store::Claim;

/// A table the poller can claim documents from.
pub trait LeaseStore: Send + Sync + 'static {
    type Doc: Send + 'static;

    /// Claim the most overdue eligible document.
    fn claim(&self, now: DateTime<Utc>, lease_for: Duration) -> Result<Option<Claim<Self::Doc>>>;

    /// Give the lease back, keeping the document ineligible until `retry_at`.
    /// Returns false when the lease no longer matches.
    fn release(&self, lease: &Lease, retry_at: DateTime<Utc>) -> Result<bool>;
}

/// What a handler did with the document it was given.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Still in the store (rescheduled or untouched); the lease is released.
    Retained,
    /// Deleted; there is no lease left to release.
    Removed,
}

#[async_trait]
pub trait DocumentHandler<D>: Send + Sync + 'static {
    async fn process(&self, doc: D, now: DateTime<Utc>) -> Result<Disposition>;
}

/// Poller cadence. All fields are required; see [`PollerSettings`] for the
/// configured defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollerConfig {
    /// Pause after a successful claim before the next one.
    pub next_delay: StdDuration,
    /// Cool-down a document gets after its handler returns.
    pub reprocess_delay: StdDuration,
    /// Pause when nothing is due or the store failed.
    pub idle_delay: StdDuration,
    /// Lease length.
    pub lock_duration: StdDuration,
    /// Handlers allowed to run at once.
    pub max_in_flight: usize,
}

impl From<&PollerSettings> for PollerConfig {
    fn from(s: &PollerSettings) -> Self {
        Self {
            next_delay: StdDuration::from_millis(s.next_delay_ms),
            reprocess_delay: StdDuration::from_millis(s.reprocess_delay_ms),
            idle_delay: StdDuration::from_millis(s.idle_delay_ms),
            lock_duration: StdDuration::from_millis(s.lock_duration_ms),
            max_in_flight: s.max_in_flight.max(1),
        }
    }
}

fn chrono_duration(d: StdDuration) -> Duration {
    Duration::from_std(d).unwrap_or(Duration::MAX)
}

pub struct CronPoller<S, H>
where
    S: LeaseStore,
    H: DocumentHandler<S::Doc>,
{
    name: String,
    store: Arc<S>,
    handler: Arc<H>,
    config: PollerConfig,
    clock: Arc<dyn Clock>,
}

impl<S, H> CronPoller<S, H>
where
    S: LeaseStore,
    H: DocumentHandler<S::Doc>,
{
    pub fn new(name: impl Into<String>, store: S, handler: H, config: PollerConfig) -> Self {
        Self {
            name: name.into(),
            store: Arc::new(store),
            handler: Arc::new(handler),
            config,
            clock: Arc::new(SystemClock),
        }
    }

    /// Replace the wall clock, e.g. with a [`crate::clock::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run until `shutdown` becomes `true` (or its sender is dropped).
    /// In-flight handlers are allowed to finish before this returns.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let collection = self.name.as_str();
        info!(collection, max_in_flight = self.config.max_in_flight, "poller started");

        let permits = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut in_flight: JoinSet<()> = JoinSet::new();

        loop {
            if *shutdown.borrow() {
                break;
            }
            while let Some(done) = in_flight.try_join_next() {
                log_join(collection, done);
            }

            let permit = tokio::select! {
                permit = permits.clone().acquire_owned() => match permit {
                    Ok(p) => p,
                    Err(_) => break,
                },
                stop = shutdown.changed() => {
                    if stop.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let now = self.clock.now();
            let delay = match self
                .store
                .claim(now, chrono_duration(self.config.lock_duration))
            {
                Ok(Some(claim)) => {
                    debug!(collection, doc_id = %claim.lease.id, "claimed");
                    self.spawn_unit(&mut in_flight, claim, permit);
                    self.config.next_delay
                }
                Ok(None) => {
                    drop(permit);
                    debug!(collection, "idle");
                    self.config.idle_delay
                }
                Err(e) => {
                    drop(permit);
                    error!(collection, error = %e, "claim failed");
                    self.config.idle_delay
                }
            };

            if sleep_or_shutdown(delay, &mut shutdown).await {
                break;
            }
        }

        info!(collection, in_flight = in_flight.len(), "poller stopping");
        while let Some(done) = in_flight.join_next().await {
            log_join(collection, done);
        }
        info!(collection, "poller stopped");
    }

    fn spawn_unit(
        &self,
        in_flight: &mut JoinSet<()>,
        claim: Claim<S::Doc>,
        permit: tokio::sync::OwnedSemaphorePermit,
    ) {
        let store = self.store.clone();
        let handler = self.handler.clone();
        let clock = self.clock.clone();
        let collection = self.name.clone();
        let reprocess = chrono_duration(self.config.reprocess_delay);

        in_flight.spawn(async move {
            let _permit = permit;
            let Claim { lease, doc } = claim;
            let started = clock.now();

            let disposition = match handler.process(doc, started).await {
                Ok(d) => d,
                Err(e) => {
                    warn!(collection = %collection, doc_id = %lease.id, error = %e, "handler failed");
                    Disposition::Retained
                }
            };
            if disposition == Disposition::Removed {
                return;
            }

            let retry_at = clock.now() + reprocess;
            match store.release(&lease, retry_at) {
                Ok(true) => {}
                Ok(false) => warn!(
                    collection = %collection,
                    doc_id = %lease.id,
                    "lease lost before release; document may have been processed twice"
                ),
                Err(e) => error!(collection = %collection, doc_id = %lease.id, error = %e, "release failed"),
            }
        });
    }
}

/// Sleep for `delay`. Returns true if shutdown was requested meanwhile.
async fn sleep_or_shutdown(delay: StdDuration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(delay) => *shutdown.borrow(),
        changed = shutdown.changed() => changed.is_err() || *shutdown.borrow(),
    }
}

fn log_join(collection: &str, done: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = done {
        if e.is_panic() {
            error!(collection, "handler panicked; lease will expire");
        } else {
            warn!(collection, error = %e, "handler task cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_from_settings_uses_milliseconds() {
        let cfg = PollerConfig::from(&PollerSettings::default());
        assert_eq!(cfg.next_delay, StdDuration::from_secs(1));
        assert_eq!(cfg.reprocess_delay, StdDuration::from_secs(1));
        assert_eq!(cfg.idle_delay, StdDuration::from_secs(10));
        assert_eq!(cfg.lock_duration, StdDuration::from_secs(600));
        assert_eq!(cfg.max_in_flight, 8);
    }

    #[test]
    fn zero_in_flight_is_clamped() {
        let settings = PollerSettings {
            max_in_flight: 0,
            ..PollerSettings::default()
        };
        assert_eq!(PollerConfig::from(&settings).max_in_flight, 1);
    }
}
