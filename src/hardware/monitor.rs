//! Async service around the discovery/reading core.
//!
//! One task owns the `Subsystem`; requests it issues are executed against a
//! `BmcEndpoint` on spawned tasks and their responses are fed back through a
//! channel, so the core itself never awaits.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::bmc::message::{RequestHandle, Response, CC_UNSPECIFIED};
use crate::bmc::subsystem::Subsystem;
use crate::bmc::transport::{ChannelTransport, Transport};
use crate::config::types::MonitorConfig;
use crate::hardware::types::SensorSnapshot;
use crate::hardware::BmcEndpoint;

pub struct BmcSensorMonitor {
    config: MonitorConfig,
    endpoint: Arc<dyn BmcEndpoint>,
}

/// Control side of a running monitor.
pub struct MonitorHandle {
    snapshots: watch::Receiver<SensorSnapshot>,
    refresh_tx: mpsc::UnboundedSender<()>,
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn subscribe(&self) -> watch::Receiver<SensorSnapshot> {
        self.snapshots.clone()
    }

    pub fn latest(&self) -> SensorSnapshot {
        self.snapshots.borrow().clone()
    }

    /// Ask for fresh readings; ignored while the cache is still fresh.
    pub fn request_refresh(&self) {
        let _ = self.refresh_tx.send(());
    }

    /// Stop the service and wait for it. The registry is discarded.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        if let Err(e) = self.task.await {
            warn!("Monitor task ended abnormally: {}", e);
        }
    }
}

fn now() -> Instant {
    tokio::time::Instant::now().into_std()
}

fn snapshot<T: Transport>(subsystem: &Subsystem<T>, pass: u64) -> SensorSnapshot {
    SensorSnapshot {
        timestamp: chrono::Utc::now().to_rfc3339(),
        discovery_complete: subsystem.discovery_complete(),
        pass,
        sensors: subsystem.surface(),
    }
}

impl BmcSensorMonitor {
    pub fn new(config: MonitorConfig, endpoint: Arc<dyn BmcEndpoint>) -> Self {
        Self { config, endpoint }
    }

    pub fn spawn(self) -> MonitorHandle {
        let (snapshot_tx, snapshots) = watch::channel(SensorSnapshot::default());
        let (refresh_tx, refresh_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let task = tokio::spawn(self.run(snapshot_tx, refresh_rx, shutdown_rx));
        MonitorHandle { snapshots, refresh_tx, shutdown_tx, task }
    }

    async fn run(
        self,
        snapshot_tx: watch::Sender<SensorSnapshot>,
        mut refresh_rx: mpsc::UnboundedReceiver<()>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) {
        info!("BMC sensor monitor starting against {}", self.endpoint.describe());

        let (transport, mut requests) = ChannelTransport::new();
        let (response_tx, mut responses) = mpsc::unbounded_channel::<(RequestHandle, Response)>();
        let mut subsystem = Subsystem::new(transport, &self.config);

        let mut ticker = tokio::time::interval(Duration::from_millis(self.config.reading.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut published_refresh: Option<Instant> = None;
        let mut published_discovery = false;
        let mut pass = 0u64;

        loop {
            tokio::select! {
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => subsystem.tick(now()),
                Some(()) = refresh_rx.recv() => {
                    subsystem.refresh(now());
                }
                Some((handle, response)) = responses.recv() => {
                    subsystem.on_response(handle, response, now());
                }
            }

            while let Ok((handle, request)) = requests.try_recv() {
                let endpoint = Arc::clone(&self.endpoint);
                let response_tx = response_tx.clone();
                tokio::spawn(async move {
                    let response = match endpoint.execute(request).await {
                        Ok(response) => response,
                        Err(e) => {
                            warn!("BMC request failed: {:#}", e);
                            Response::error(CC_UNSPECIFIED)
                        }
                    };
                    let _ = response_tx.send((handle, response));
                });
            }

            let discovery = subsystem.discovery_complete();
            let refreshed = subsystem.last_refresh();
            if discovery != published_discovery || refreshed != published_refresh {
                if refreshed != published_refresh {
                    pass += 1;
                }
                published_discovery = discovery;
                published_refresh = refreshed;
                debug!("Publishing snapshot {} ({} sensors)", pass, subsystem.registry().len());
                snapshot_tx.send_replace(snapshot(&subsystem, pass));
            }
        }

        info!("BMC sensor monitor stopped");
    }
}
