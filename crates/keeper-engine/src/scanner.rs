//! Market scanner.
//!
//! Asks the current snapshot for the trigger candidates of one market,
//! filters them through the cooldown registry and the in-dispatch flags,
//! and dispatches the rest without waiting for their outcome.

use std::sync::Arc;

use keeper_core::{Market, MarketKind, VenueState};
use keeper_telemetry::Metrics;
use keeper_venue::{DynAlertSink, DynVenueClient, SlotSource};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::cooldown::{CooldownCheck, CooldownRegistry};
use crate::dispatch::{DispatchTicket, Dispatcher};
use crate::error::ScanError;
use crate::index::SharedAccountIndex;
use crate::locks::LockOutcome;
use crate::snapshot::SnapshotManager;

/// Counters of one market scan.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanReport {
    pub candidates: usize,
    pub dispatched: usize,
    pub cooldown_skipped: usize,
    pub in_dispatch_skipped: usize,
    pub lookup_failed: usize,
}

impl ScanReport {
    pub fn merge(&mut self, other: ScanReport) {
        self.candidates += other.candidates;
        self.dispatched += other.dispatched;
        self.cooldown_skipped += other.cooldown_skipped;
        self.in_dispatch_skipped += other.in_dispatch_skipped;
        self.lookup_failed += other.lookup_failed;
    }
}

/// Result of scanning every listed market.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ScanSummary {
    pub markets_scanned: usize,
    pub markets_failed: usize,
    pub report: ScanReport,
}

/// Scans markets for triggerable orders.
pub struct MarketScanner {
    name: String,
    venue: DynVenueClient,
    snapshots: Arc<SnapshotManager>,
    accounts: Arc<SharedAccountIndex>,
    cooldowns: Arc<CooldownRegistry>,
    dispatcher: Arc<Dispatcher>,
    slots: Arc<dyn SlotSource>,
    clock: Arc<dyn Clock>,
    alerts: DynAlertSink,
}

impl MarketScanner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        venue: DynVenueClient,
        snapshots: Arc<SnapshotManager>,
        accounts: Arc<SharedAccountIndex>,
        cooldowns: Arc<CooldownRegistry>,
        dispatcher: Arc<Dispatcher>,
        slots: Arc<dyn SlotSource>,
        clock: Arc<dyn Clock>,
        alerts: DynAlertSink,
    ) -> Self {
        Self {
            name: name.into(),
            venue,
            snapshots,
            accounts,
            cooldowns,
            dispatcher,
            slots,
            clock,
            alerts,
        }
    }

    /// Scan every perpetual and spot market concurrently and wait for all scans.
    ///
    /// Failures are isolated: a listing failure skips one market kind, a scan
    /// failure or panic skips one market.
    pub async fn scan_all(self: &Arc<Self>) -> ScanSummary {
        let mut summary = ScanSummary::default();

        let state = match self.venue.venue_state().await {
            Ok(state) => state,
            Err(source) => {
                summary.markets_failed += 1;
                self.report_failure("all", &ScanError::VenueState(source));
                return summary;
            }
        };

        let mut scans = JoinSet::new();
        for kind in MarketKind::ALL {
            match self.venue.list_markets(kind).await {
                Ok(markets) => {
                    for market in markets {
                        let scanner = Arc::clone(self);
                        scans.spawn(async move {
                            let result = scanner.scan_market(&market, &state).await;
                            (market, result)
                        });
                    }
                }
                Err(source) => {
                    summary.markets_failed += 1;
                    let err = ScanError::MarketListing { kind, source };
                    self.report_failure(kind.as_str(), &err);
                }
            }
        }

        while let Some(joined) = scans.join_next().await {
            match joined {
                Ok((_, Ok(report))) => {
                    summary.markets_scanned += 1;
                    summary.report.merge(report);
                }
                Ok((market, Err(err))) => {
                    summary.markets_failed += 1;
                    self.report_failure(market.kind().as_str(), &err);
                }
                Err(e) => {
                    summary.markets_failed += 1;
                    error!(bot = %self.name, error = %e, "Market scan task failed");
                    self.alerts.notify(format!(
                        "[{}]: :x: Uncaught error during triggers:\n{}",
                        self.name, e
                    ));
                }
            }
        }

        summary
    }

    /// Scan one market and dispatch its eligible candidates.
    pub async fn scan_market(
        &self,
        market: &Market,
        state: &VenueState,
    ) -> Result<ScanReport, ScanError> {
        let key = market.key;
        let price = self
            .venue
            .reference_price(key.kind, key.index)
            .await
            .map_err(|source| ScanError::ReferencePrice {
                market: key,
                source,
            })?;
        if !price.is_positive() {
            return Err(ScanError::InvalidReferencePrice { market: key, price });
        }
        let slot = self.slots.current_slot();

        let (candidates, in_dispatch, generation) = {
            let guard = match self.snapshots.lock_current().await {
                LockOutcome::Acquired(guard) => guard,
                LockOutcome::Busy | LockOutcome::TimedOut => {
                    return Err(ScanError::SnapshotLockTimeout { market: key });
                }
            };
            let current = match &*guard {
                Some(current) => Arc::clone(current),
                None => return Err(ScanError::NoSnapshot { market: key }),
            };
            let candidates = current.snapshot().find_trigger_candidates(
                key.index,
                slot,
                price,
                key.kind,
                state,
            );
            (candidates, Arc::clone(current.in_dispatch()), current.generation())
        };

        let mut report = ScanReport {
            candidates: candidates.len(),
            ..ScanReport::default()
        };

        for candidate in candidates {
            let now_ms = self.clock.now_ms();
            let signature = candidate.signature();

            if key.kind == MarketKind::Perp {
                if let CooldownCheck::Active { elapsed_ms } =
                    self.cooldowns.check(&signature, now_ms)
                {
                    warn!(
                        bot = %self.name,
                        %signature,
                        elapsed_ms,
                        "Order triggered too recently, skipping"
                    );
                    Metrics::cooldown_skipped(&self.name);
                    report.cooldown_skipped += 1;
                    continue;
                }
            }

            if in_dispatch.is_marked(&signature) {
                report.in_dispatch_skipped += 1;
                continue;
            }
            in_dispatch.mark(signature.clone());
            let attempt = self.cooldowns.begin(signature.clone(), now_ms);

            info!(
                bot = %self.name,
                market = %key,
                account = %candidate.account,
                order_id = %candidate.order_id(),
                %price,
                generation,
                "Trying to trigger order"
            );

            let lookup = {
                let accounts = self.accounts.read().await;
                accounts.index().get(&candidate.account).await
            };
            let record = match lookup {
                Ok(record) => record,
                Err(e) => {
                    in_dispatch.clear(&signature);
                    self.cooldowns.finish(&signature, attempt);
                    warn!(
                        bot = %self.name,
                        account = %candidate.account,
                        %signature,
                        error = %e,
                        "Account lookup failed, trigger rolled back"
                    );
                    report.lookup_failed += 1;
                    continue;
                }
            };

            self.dispatcher.dispatch(
                DispatchTicket {
                    candidate,
                    signature,
                    attempt,
                    in_dispatch: Arc::clone(&in_dispatch),
                },
                record,
            );
            report.dispatched += 1;
        }

        debug!(bot = %self.name, market = %key, %slot, ?report, "Market scanned");
        Ok(report)
    }

    fn report_failure(&self, kind: &str, err: &ScanError) {
        Metrics::market_scan_failed(&self.name, kind);
        if err.is_benign() {
            warn!(bot = %self.name, error = %err, "Market scan skipped");
            return;
        }
        error!(bot = %self.name, error = %err, "Market scan failed");
        self.alerts.notify(format!(
            "[{}]: :x: Unexpected error during triggers: {}",
            self.name, err
        ));
    }
}
