//! Trigger dispatch and outcome handling.
//!
//! Each submission runs on its own task and reports a [`DispatchOutcome`]
//! on a channel drained by [`OutcomeHandler::run`]. If the channel is
//! closed the task hands the outcome to the handler directly. The venue
//! call itself runs on a nested task, so a panicking submission is
//! reported as a failed outcome and the cooldown entry is always released.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use keeper_core::{AccountRecord, OrderSignature, TriggerCandidate, TxRef};
use keeper_telemetry::Metrics;
use keeper_venue::{DynAlertSink, DynVenueClient, SubmitError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::cooldown::{AttemptId, CooldownRegistry};
use crate::in_dispatch::InDispatchFlags;

/// Everything needed to finish one trigger attempt.
#[derive(Debug, Clone)]
pub struct DispatchTicket {
    pub candidate: TriggerCandidate,
    pub signature: OrderSignature,
    pub attempt: AttemptId,
    /// Flag set the order was marked in.
    pub in_dispatch: Arc<InDispatchFlags>,
}

/// Result of one trigger submission.
#[derive(Debug)]
pub struct DispatchOutcome {
    pub ticket: DispatchTicket,
    pub result: Result<TxRef, SubmitError>,
    pub elapsed_ms: u64,
}

/// Spawns trigger submissions.
pub struct Dispatcher {
    name: String,
    venue: DynVenueClient,
    outcomes: mpsc::Sender<DispatchOutcome>,
    handler: Arc<OutcomeHandler>,
    dry_run: bool,
}

impl Dispatcher {
    pub fn new(
        name: impl Into<String>,
        venue: DynVenueClient,
        outcomes: mpsc::Sender<DispatchOutcome>,
        handler: Arc<OutcomeHandler>,
        dry_run: bool,
    ) -> Self {
        Self {
            name: name.into(),
            venue,
            outcomes,
            handler,
            dry_run,
        }
    }

    /// Submit a trigger on a new task. Returns immediately.
    pub fn dispatch(&self, ticket: DispatchTicket, record: AccountRecord) -> JoinHandle<()> {
        Metrics::trigger_submitted(&self.name, ticket.candidate.kind().as_str());
        self.handler.in_flight.fetch_add(1, Ordering::SeqCst);

        let venue = Arc::clone(&self.venue);
        let outcomes = self.outcomes.clone();
        let handler = Arc::clone(&self.handler);
        let dry_run = self.dry_run;
        let name = self.name.clone();

        tokio::spawn(async move {
            let started = Instant::now();
            let result = if dry_run {
                info!(
                    bot = %name,
                    account = %ticket.candidate.account,
                    order_id = %ticket.candidate.order_id(),
                    market = %ticket.candidate.market(),
                    "Dry run, trigger not submitted"
                );
                Ok(TxRef::new("dry-run"))
            } else {
                submit_isolated(venue, &ticket.candidate, record).await
            };

            let outcome = DispatchOutcome {
                ticket,
                result,
                elapsed_ms: started.elapsed().as_millis() as u64,
            };
            if let Err(mpsc::error::SendError(outcome)) = outcomes.send(outcome).await {
                handler.handle(outcome);
            }
        })
    }
}

/// Run one submission on its own task. A panic becomes a transport error
/// so the outcome still reaches the handler.
async fn submit_isolated(
    venue: DynVenueClient,
    candidate: &TriggerCandidate,
    record: AccountRecord,
) -> Result<TxRef, SubmitError> {
    let account = candidate.account.clone();
    let order = candidate.order.clone();
    let submission =
        tokio::spawn(async move { venue.submit_trigger(&account, &record, &order).await });

    match submission.await {
        Ok(result) => result,
        Err(e) if e.is_panic() => {
            error!(account = %candidate.account, "Trigger submission panicked");
            Err(SubmitError::Transport("submission task panicked".to_string()))
        }
        Err(e) => Err(SubmitError::Transport(format!("submission task failed: {e}"))),
    }
}

/// Records trigger outcomes and releases their cooldown entries.
pub struct OutcomeHandler {
    name: String,
    identity: String,
    cooldowns: Arc<CooldownRegistry>,
    alerts: DynAlertSink,
    in_flight: AtomicUsize,
}

impl OutcomeHandler {
    pub fn new(
        name: impl Into<String>,
        identity: impl Into<String>,
        cooldowns: Arc<CooldownRegistry>,
        alerts: DynAlertSink,
    ) -> Self {
        Self {
            name: name.into(),
            identity: identity.into(),
            cooldowns,
            alerts,
            in_flight: AtomicUsize::new(0),
        }
    }

    /// Dispatched triggers whose outcome has not been handled yet.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Drain outcomes until every sender is dropped.
    pub async fn run(self: Arc<Self>, mut outcomes: mpsc::Receiver<DispatchOutcome>) {
        while let Some(outcome) = outcomes.recv().await {
            self.handle(outcome);
        }
        info!(bot = %self.name, "Outcome handler stopped");
    }

    /// Handle one outcome.
    pub fn handle(&self, outcome: DispatchOutcome) {
        let DispatchOutcome {
            ticket,
            result,
            elapsed_ms,
        } = outcome;
        let candidate = &ticket.candidate;
        let kind = candidate.kind();

        match &result {
            Ok(tx) => {
                info!(
                    bot = %self.name,
                    account = %candidate.account,
                    order_id = %candidate.order_id(),
                    market = %candidate.market(),
                    tx = %tx,
                    elapsed_ms,
                    "Triggered order"
                );
                Metrics::trigger_success(&self.name, kind.as_str());
                self.alerts.notify(format!(
                    "[{}]: :gear: Triggered {} user (account: {}) {} order: {}, tx: {}",
                    self.name, kind, candidate.account, kind, candidate.order_id(), tx
                ));
            }
            Err(err) => {
                let code = err.error_code();
                Metrics::trigger_error(&code.to_string(), &self.identity, &self.name);
                ticket.in_dispatch.clear(&ticket.signature);
                error!(
                    bot = %self.name,
                    account = %candidate.account,
                    order_id = %candidate.order_id(),
                    market = %candidate.market(),
                    %code,
                    error = %err,
                    elapsed_ms,
                    "Error triggering order"
                );
                self.alerts.notify(format!(
                    "[{}]: :x: Error ({}) triggering {} user (account: {}) {} order: {}\n{}\n{}",
                    self.name,
                    code,
                    kind,
                    candidate.account,
                    kind,
                    candidate.order_id(),
                    err.logs().join("\n"),
                    err
                ));
            }
        }

        self.cooldowns.finish(&ticket.signature, ticket.attempt);
        Metrics::trigger_completed(&self.name);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
