//! Boot sequence and task lifecycle.
//!
//! Connectivity is decided first; the daemon then runs either library mode
//! (reader session + transfer API) or provisioning mode (access point +
//! captive portal). The indicator and button tasks run in both modes.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{error, info, warn};

use crate::adapters::{self, DriverSet};
use crate::config::AppConfig;
use crate::context::AppContext;
use crate::core::api::CommandHandler;
use crate::core::button;
use crate::core::connectivity::{self, Mode, NetworkAdapter};
use crate::core::credentials::{CredentialStore, FileCredentialStore};
use crate::core::device::ReaderSession;
use crate::core::indicator::{IndicatorController, IndicatorHandle, IndicatorState};
use crate::core::provisioning::ProvisioningChannel;
use crate::core::transfer::TransferEngine;
use crate::web::{self, WebServer};

/// Per-chunk pause in simulation, so transfers are visible on the strip.
const SIMULATED_TRANSFER_THROTTLE: Duration = Duration::from_millis(20);

pub struct Orchestrator {
    config: Arc<AppConfig>,
}

impl Orchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }

    pub async fn start(&self) -> Result<()> {
        info!(version = env!("CARGO_PKG_VERSION"), "shelf daemon starting");

        let shutdown = CancellationToken::new();
        let tracker = TaskTracker::new();
        let indicator = IndicatorHandle::new();

        let DriverSet {
            storage,
            network,
            strip,
            button: button_input,
        } = adapters::drivers(&self.config)?;

        tracker.spawn(IndicatorController::new(strip, indicator.clone()).run(shutdown.clone()));

        let store: Arc<dyn CredentialStore> =
            Arc::new(FileCredentialStore::new(self.config.credentials_path.clone()));
        let stored = match store.load() {
            Ok(credentials) => credentials,
            Err(e) => {
                warn!(error = %e, "stored credentials unreadable, provisioning instead");
                None
            }
        };

        let mode =
            connectivity::acquire(Arc::clone(&network), stored, self.config.join_timeout()).await;

        match mode {
            Mode::Library => {
                self.run_library(storage, button_input, indicator, &tracker, shutdown.clone())
                    .await?
            }
            Mode::Provisioning => {
                self.run_provisioning(network, store, button_input, indicator, &tracker, shutdown.clone())
                    .await?
            }
        }

        tracker.close();
        tracker.wait().await;
        info!("shelf daemon stopped");
        Ok(())
    }

    async fn run_library(
        &self,
        storage: Arc<dyn crate::core::hardware::StorageAdapter>,
        button_input: Box<dyn button::ButtonInput>,
        indicator: IndicatorHandle,
        tracker: &TaskTracker,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let (reader, hw_tx) = ReaderSession::spawn(
            Arc::clone(&storage),
            self.config.reader_root.clone(),
            indicator.clone(),
            shutdown.clone(),
        );
        storage.start(hw_tx);

        tracker.spawn(button::run(
            button_input,
            Some(reader.clone()),
            self.config.button_poll(),
            shutdown.clone(),
        ));

        let transfers = if self.config.simulation {
            TransferEngine::with_tuning(64 * 1024, Some(SIMULATED_TRANSFER_THROTTLE))
        } else {
            TransferEngine::new()
        };

        let ctx = AppContext {
            config: Arc::clone(&self.config),
            indicator: indicator.clone(),
            reader,
            transfers,
            shutdown: shutdown.clone(),
        };

        self.spawn_web(
            web::api::router(CommandHandler::new(ctx)),
            tracker,
            shutdown.clone(),
        );

        indicator.set(IndicatorState::Idle);
        info!("library mode running");

        wait_for_shutdown(&shutdown).await;
        storage.stop();
        Ok(())
    }

    async fn run_provisioning(
        &self,
        network: Arc<dyn NetworkAdapter>,
        store: Arc<dyn CredentialStore>,
        button_input: Box<dyn button::ButtonInput>,
        indicator: IndicatorHandle,
        tracker: &TaskTracker,
        shutdown: CancellationToken,
    ) -> Result<()> {
        let config = &self.config;
        {
            let network = Arc::clone(&network);
            let ssid = config.ap_ssid.clone();
            let password = config.ap_password.clone();
            tokio::task::spawn_blocking(move || network.start_access_point(&ssid, &password))
                .await
                .context("access point task failed")?
                .context("failed to start provisioning access point")?;
        }

        // no reader session in this mode; button presses are logged no-ops
        tracker.spawn(button::run(
            button_input,
            None,
            config.button_poll(),
            shutdown.clone(),
        ));

        let channel = ProvisioningChannel::spawn(store, shutdown.clone());
        self.spawn_web(web::portal::router(channel), tracker, shutdown.clone());

        indicator.set(IndicatorState::Provisioning);
        info!(ssid = %config.ap_ssid, "provisioning mode running");

        wait_for_shutdown(&shutdown).await;
        Ok(())
    }

    fn spawn_web(&self, router: axum::Router, tracker: &TaskTracker, shutdown: CancellationToken) {
        let bind_addr = SocketAddr::from(([0, 0, 0, 0], self.config.http_port));
        let server = WebServer::new(router, bind_addr, shutdown.clone());

        tracker.spawn(async move {
            if let Err(e) = server.serve().await {
                error!(error = %e, "http surface failed");
                shutdown.cancel();
            }
        });
    }
}

async fn wait_for_shutdown(shutdown: &CancellationToken) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("interrupt received, shutting down");
            shutdown.cancel();
        }
        _ = shutdown.cancelled() => {}
    }
}
