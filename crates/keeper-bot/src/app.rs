//! Application wiring and lifecycle.

use std::pin::pin;
use std::sync::Arc;

use keeper_engine::{KeeperDeps, TriggerKeeper};
use keeper_venue::{
    DynAlertSink, HttpVenueClient, LogAlertSink, MemoryAccountIndexFactory, SlotTracker,
    TriggerBookBuilder, WebhookAlertSink,
};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::health;

/// Trigger keeper application.
pub struct Application {
    config: AppConfig,
}

impl Application {
    /// Create a new application. The configuration must already be validated.
    pub fn new(config: AppConfig) -> AppResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn alert_sink(&self) -> AppResult<DynAlertSink> {
        match &self.config.alerts.webhook_url {
            Some(url) => Ok(Arc::new(WebhookAlertSink::new(url.clone())?)),
            None => {
                warn!("No alert webhook configured, alerts go to the log");
                Ok(Arc::new(LogAlertSink))
            }
        }
    }

    /// Run until Ctrl-C or an escalated keeper failure.
    pub async fn run(self) -> AppResult<()> {
        let shutdown = CancellationToken::new();
        let venue = Arc::new(HttpVenueClient::new(
            self.config.gateway_url.clone(),
            self.config.identity.clone(),
        )?);

        // Slot tracking for scans and resync throttling
        let slots = Arc::new(SlotTracker::new());
        let poller = Arc::clone(&slots).spawn_poller(
            venue.clone(),
            self.config.slot_poll_interval(),
            shutdown.clone(),
        );

        let mut deps = KeeperDeps::new(
            venue.clone(),
            Arc::new(MemoryAccountIndexFactory::new(venue.clone())),
            Arc::new(TriggerBookBuilder::new()),
            slots.clone(),
        )
        .with_alerts(self.alert_sink()?);
        if self.config.slots.account_loader_polling {
            deps = deps.with_loader_slots(slots);
        }

        let keeper = TriggerKeeper::new(self.config.keeper_config(), deps);
        keeper.init().await?;

        let health_addr = self.config.health_addr()?;
        let health_task =
            tokio::spawn(health::serve(health_addr, keeper.clone(), shutdown.clone()));

        info!(
            name = %self.config.name,
            gateway = %self.config.gateway_url,
            dry_run = self.config.dry_run,
            "Starting trigger keeper"
        );
        let handle = keeper.start(self.config.interval());
        let keeper_shutdown = handle.shutdown_token();
        let mut joined = pin!(handle.join());

        let result = tokio::select! {
            result = &mut joined => result,
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                keeper_shutdown.cancel();
                joined.await
            }
        };

        // Cleanup
        shutdown.cancel();
        if let Err(e) = poller.await {
            warn!(error = %e, "Slot poller task failed");
        }
        match health_task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!(error = %e, "Health server failed"),
            Err(e) => warn!(error = %e, "Health server task failed"),
        }

        if let Err(e) = &result {
            error!(error = %e, "Keeper stopped on failure");
        }
        info!("Shutdown complete");
        result.map_err(AppError::from)
    }
}
