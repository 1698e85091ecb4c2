// ── Background polling ──
//
// The vendor exposes no push channel the client can rely on, so state is
// polled: every cycle fetches `homesdata`, then every home's status, and
// publishes one immutable `Snapshot`. Subscribers hold a `watch` receiver
// and always see the latest complete snapshot; a failed cycle leaves the
// previous one in place.

use std::collections::HashSet;
use std::sync::{Arc, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use indexmap::IndexMap;
use netatmo_api::models::{HomeStatus, HomesData};
use netatmo_api::devices::home_devices;
use netatmo_api::{Device, HomeId, NetatmoClient};
use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::CoreError;
use crate::home::HomesIndex;

/// Default polling cycle (9 minutes), well inside the vendor's rate limits.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(540);

/// Account state as of one polling cycle.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub fetched_at: DateTime<Utc>,
    pub homes: HomesData,
    /// Live status per home, in listing order.
    pub statuses: IndexMap<HomeId, HomeStatus>,
}

impl Snapshot {
    pub fn status(&self, home_id: &HomeId) -> Option<&HomeStatus> {
        self.statuses.get(home_id)
    }

    /// Homes with their timezones resolved.
    pub fn index(&self) -> Result<HomesIndex, CoreError> {
        HomesIndex::new(self.homes.clone())
    }

    /// Devices of every home, merged the same way `list_devices` does.
    pub fn devices(&self) -> Vec<Device> {
        let mut seen = HashSet::new();
        self.homes
            .homes
            .iter()
            .filter_map(|home| Some(home_devices(home, self.statuses.get(&home.id)?.clone())))
            .flatten()
            .filter(|d| seen.insert(d.id.clone()))
            .collect()
    }
}

/// Polls the account in the background and publishes snapshots.
///
/// Cheaply cloneable; clones control the same task. The task only holds a
/// weak reference, so dropping the last handle ends polling as well.
#[derive(Clone)]
pub struct Monitor {
    inner: Arc<MonitorInner>,
}

struct MonitorInner {
    client: NetatmoClient,
    interval: Duration,
    snapshot: watch::Sender<Option<Arc<Snapshot>>>,
    task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl Monitor {
    /// Create a monitor. Does NOT poll -- call [`start()`](Self::start).
    pub fn new(client: NetatmoClient, interval: Duration) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            inner: Arc::new(MonitorInner {
                client,
                interval,
                snapshot,
                task: Mutex::new(None),
            }),
        }
    }

    pub fn client(&self) -> &NetatmoClient {
        &self.inner.client
    }

    /// Run a first cycle, then keep polling every interval until
    /// [`stop()`](Self::stop). The first cycle's error is returned; later
    /// ones are only logged. Calling `start` on a running monitor is a no-op.
    ///
    /// A zero interval is rejected with `CoreError::Config`.
    pub async fn start(&self) -> Result<(), CoreError> {
        if self.inner.interval.is_zero() {
            return Err(CoreError::Config {
                message: "poll interval must be greater than zero".into(),
            });
        }

        let mut task = self.inner.task.lock().await;
        if task.is_some() {
            debug!("monitor already running");
            return Ok(());
        }

        self.poll_once().await?;

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(poll_task(
            Arc::downgrade(&self.inner),
            self.inner.interval,
            cancel.clone(),
        ));
        *task = Some((cancel, handle));
        info!(interval_secs = self.inner.interval.as_secs(), "monitor started");
        Ok(())
    }

    /// Cancel the polling task and wait for it to finish.
    pub async fn stop(&self) {
        let Some((cancel, handle)) = self.inner.task.lock().await.take() else {
            return;
        };
        cancel.cancel();
        if let Err(e) = handle.await {
            warn!(error = %e, "polling task ended abnormally");
        }
        info!("monitor stopped");
    }

    /// Subscribe to snapshot updates. `None` until the first cycle succeeds.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Snapshot>>> {
        self.inner.snapshot.subscribe()
    }

    /// The latest published snapshot.
    pub fn snapshot(&self) -> Option<Arc<Snapshot>> {
        self.inner.snapshot.borrow().clone()
    }

    /// Run one cycle now and publish its snapshot.
    ///
    /// On error nothing is published and the previous snapshot stays.
    pub async fn poll_once(&self) -> Result<Arc<Snapshot>, CoreError> {
        let client = &self.inner.client;
        let homes = client.homes_data().await?;

        let statuses = try_join_all(homes.homes.iter().map(|home| async move {
            client.home_status(&home.id).await.map(|s| (home.id, s))
        }))
        .await?;

        let snapshot = Arc::new(Snapshot {
            fetched_at: Utc::now(),
            statuses: statuses.into_iter().collect(),
            homes,
        });
        debug!(
            homes = snapshot.homes.homes.len(),
            "snapshot published"
        );
        self.inner.snapshot.send_replace(Some(Arc::clone(&snapshot)));
        Ok(snapshot)
    }
}

// ── Background task ──────────────────────────────────────────────────

impl Drop for MonitorInner {
    fn drop(&mut self) {
        if let Some((cancel, _)) = self.task.get_mut().take() {
            cancel.cancel();
        }
    }
}

async fn poll_task(inner: Weak<MonitorInner>, period: Duration, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await; // consume the immediate first tick

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(inner) = inner.upgrade() else {
                    debug!("monitor dropped, polling ends");
                    break;
                };
                let monitor = Monitor { inner };
                if let Err(e) = monitor.poll_once().await {
                    warn!(error = %e, "polling cycle failed, keeping previous snapshot");
                }
            }
        }
    }
}
