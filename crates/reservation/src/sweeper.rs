//! Background expiry sweeper.
//!
//! The sweep contract itself is `ReservationManager::sweep_expired`,
//! driven by whatever scheduler the deployment provides. This module is a
//! small self-hosted alternative: a named thread that invokes the sweep on
//! an interval until shut down.

use std::sync::Arc;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use chrono::Utc;
use tracing::{error, info};

use stockgate_events::EventBus;
use stockgate_ledger::LedgerStore;

use crate::events::StockEvent;
use crate::manager::ReservationManager;
use crate::reservation::ReservationStore;

/// Sweeper configuration.
#[derive(Debug, Clone)]
pub struct SweeperConfig {
    /// How often to run the sweep.
    pub interval: Duration,
    /// Thread name for logging.
    pub name: String,
}

impl Default for SweeperConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(60),
            name: "reservation-sweeper".to_string(),
        }
    }
}

impl SweeperConfig {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to control a running sweeper.
#[derive(Debug)]
pub struct SweeperHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
}

impl SweeperHandle {
    /// Request graceful shutdown and wait for the thread to finish.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }
}

/// Periodic host for `sweep_expired`.
pub struct Sweeper;

impl Sweeper {
    /// Spawn the sweep loop in a background thread.
    ///
    /// Fails if the OS refuses the thread.
    pub fn spawn<L, R, B>(
        manager: Arc<ReservationManager<L, R, B>>,
        config: SweeperConfig,
    ) -> std::io::Result<SweeperHandle>
    where
        L: LedgerStore + Send + Sync + 'static,
        R: ReservationStore + Send + Sync + 'static,
        B: EventBus<StockEvent> + Send + Sync + 'static,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let name = config.name.clone();

        let join = thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                info!(sweeper = %config.name, "reservation sweeper started");
                loop {
                    // The interval doubles as the shutdown poll period.
                    match shutdown_rx.recv_timeout(config.interval) {
                        Ok(()) | Err(mpsc::RecvTimeoutError::Disconnected) => break,
                        Err(mpsc::RecvTimeoutError::Timeout) => {}
                    }

                    match manager.sweep_expired(Utc::now()) {
                        Ok(0) => {}
                        Ok(released) => {
                            info!(sweeper = %config.name, released, "sweep released reservations");
                        }
                        Err(err) => {
                            error!(sweeper = %config.name, error = %err, "sweep failed");
                        }
                    }
                }
                info!(sweeper = %config.name, "reservation sweeper stopped");
            })?;

        Ok(SweeperHandle {
            shutdown: shutdown_tx,
            join: Some(join),
        })
    }
}
