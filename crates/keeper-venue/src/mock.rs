//! In-process collaborators for tests.
//!
//! Every mock records what it was asked and can be scripted to fail.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use keeper_core::{
    AccountId, AccountRecord, Market, MarketIndex, MarketKey, MarketKind, OrderId, Price, Slot,
    TriggerOrder, TxRef, VenueState,
};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::account_index::{AccountIndex, AccountSource};
use crate::alert::AlertSink;
use crate::book::{OrderBookSnapshot, SnapshotBuilder, TriggerBook, TriggerBookBuilder};
use crate::error::{SubmitError, VenueError, VenueResult};
use crate::slot::{SlotFetcher, SlotSource};
use crate::venue::{BoxFuture, VenueClient};

// ============================================================================
// MockVenueClient
// ============================================================================

/// One recorded trigger submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmittedTrigger {
    pub account: AccountId,
    pub order_id: OrderId,
    pub market: MarketKey,
}

/// Scriptable venue client.
///
/// Submissions succeed with `tx-{n}` unless a result was queued with
/// `push_submit_result`. `hold_submissions` parks every submission until
/// `release_submissions` is called.
pub struct MockVenueClient {
    identity: String,
    prices: Mutex<HashMap<MarketKey, Price>>,
    markets: Mutex<HashMap<MarketKind, Vec<Market>>>,
    failing_listings: Mutex<HashSet<MarketKind>>,
    state: Mutex<VenueState>,
    fail_state: AtomicBool,
    submit_results: Mutex<VecDeque<Result<TxRef, SubmitError>>>,
    submissions: Mutex<Vec<SubmittedTrigger>>,
    submit_counter: AtomicU64,
    gate: watch::Sender<bool>,
}

impl Default for MockVenueClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockVenueClient {
    pub fn new() -> Self {
        let (gate, _) = watch::channel(true);
        Self {
            identity: "mock-wallet".to_string(),
            prices: Mutex::new(HashMap::new()),
            markets: Mutex::new(HashMap::new()),
            failing_listings: Mutex::new(HashSet::new()),
            state: Mutex::new(VenueState::default()),
            fail_state: AtomicBool::new(false),
            submit_results: Mutex::new(VecDeque::new()),
            submissions: Mutex::new(Vec::new()),
            submit_counter: AtomicU64::new(0),
            gate,
        }
    }

    /// List a market and set its reference price.
    pub fn add_market(&self, key: MarketKey, price: Price) {
        self.markets
            .lock()
            .entry(key.kind)
            .or_default()
            .push(Market::new(key, key.to_string()));
        self.prices.lock().insert(key, price);
    }

    pub fn set_price(&self, key: MarketKey, price: Price) {
        self.prices.lock().insert(key, price);
    }

    /// Make the reference price of a market unavailable.
    pub fn remove_price(&self, key: MarketKey) {
        self.prices.lock().remove(&key);
    }

    /// Make market listing of one kind fail.
    pub fn fail_listing(&self, kind: MarketKind) {
        self.failing_listings.lock().insert(kind);
    }

    pub fn set_subaccount_count(&self, count: u64) {
        self.state.lock().subaccount_count = count;
    }

    pub fn set_exchange_paused(&self, paused: bool) {
        self.state.lock().exchange_paused = paused;
    }

    pub fn set_fail_state(&self, fail: bool) {
        self.fail_state.store(fail, Ordering::SeqCst);
    }

    /// Queue the result of the next submission.
    pub fn push_submit_result(&self, result: Result<TxRef, SubmitError>) {
        self.submit_results.lock().push_back(result);
    }

    pub fn hold_submissions(&self) {
        self.gate.send_replace(false);
    }

    pub fn release_submissions(&self) {
        self.gate.send_replace(true);
    }

    /// Recorded submissions, in call order.
    pub fn submissions(&self) -> Vec<SubmittedTrigger> {
        self.submissions.lock().clone()
    }

    pub fn submission_count(&self) -> usize {
        self.submissions.lock().len()
    }
}

impl VenueClient for MockVenueClient {
    fn reference_price(
        &self,
        kind: MarketKind,
        index: MarketIndex,
    ) -> BoxFuture<'_, VenueResult<Price>> {
        let key = MarketKey::new(kind, index);
        let price = self.prices.lock().get(&key).copied();
        Box::pin(async move {
            price.ok_or_else(|| VenueError::HttpClient(format!("no oracle price for {key}")))
        })
    }

    fn list_markets(&self, kind: MarketKind) -> BoxFuture<'_, VenueResult<Vec<Market>>> {
        let result = if self.failing_listings.lock().contains(&kind) {
            Err(VenueError::Status {
                status: 503,
                body: format!("{kind} markets unavailable"),
            })
        } else {
            Ok(self.markets.lock().get(&kind).cloned().unwrap_or_default())
        };
        Box::pin(async move { result })
    }

    fn venue_state(&self) -> BoxFuture<'_, VenueResult<VenueState>> {
        let result = if self.fail_state.load(Ordering::SeqCst) {
            Err(VenueError::HttpClient("state unavailable".to_string()))
        } else {
            Ok(*self.state.lock())
        };
        Box::pin(async move { result })
    }

    fn submit_trigger<'a>(
        &'a self,
        account: &'a AccountId,
        _record: &'a AccountRecord,
        order: &'a TriggerOrder,
    ) -> BoxFuture<'a, Result<TxRef, SubmitError>> {
        Box::pin(async move {
            self.submissions.lock().push(SubmittedTrigger {
                account: account.clone(),
                order_id: order.order_id,
                market: order.market,
            });

            let mut gate = self.gate.subscribe();
            let _ = gate.wait_for(|open| *open).await;

            let queued = self.submit_results.lock().pop_front();
            queued.unwrap_or_else(|| {
                let n = self.submit_counter.fetch_add(1, Ordering::SeqCst);
                Ok(TxRef::new(format!("tx-{n}")))
            })
        })
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

// ============================================================================
// MockAccountSource
// ============================================================================

/// Scriptable account source.
pub struct MockAccountSource {
    records: Mutex<Vec<AccountRecord>>,
    fail_fetch_all: AtomicBool,
    fetch_all_calls: AtomicUsize,
    fetch_delay: Mutex<Duration>,
}

impl MockAccountSource {
    pub fn new(records: Vec<AccountRecord>) -> Self {
        Self {
            records: Mutex::new(records),
            fail_fetch_all: AtomicBool::new(false),
            fetch_all_calls: AtomicUsize::new(0),
            fetch_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn set_records(&self, records: Vec<AccountRecord>) {
        *self.records.lock() = records;
    }

    pub fn push_record(&self, record: AccountRecord) {
        self.records.lock().push(record);
    }

    pub fn set_fail_fetch_all(&self, fail: bool) {
        self.fail_fetch_all.store(fail, Ordering::SeqCst);
    }

    /// Delay applied to every `fetch_all` call.
    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock() = delay;
    }

    pub fn fetch_all_calls(&self) -> usize {
        self.fetch_all_calls.load(Ordering::SeqCst)
    }
}

impl AccountSource for MockAccountSource {
    fn fetch_all(&self) -> BoxFuture<'_, VenueResult<Vec<AccountRecord>>> {
        Box::pin(async move {
            self.fetch_all_calls.fetch_add(1, Ordering::SeqCst);
            let delay = *self.fetch_delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail_fetch_all.load(Ordering::SeqCst) {
                return Err(VenueError::HttpClient("account scan failed".to_string()));
            }
            Ok(self.records.lock().clone())
        })
    }

    fn fetch_account<'a>(
        &'a self,
        account: &'a AccountId,
    ) -> BoxFuture<'a, VenueResult<AccountRecord>> {
        let found = self
            .records
            .lock()
            .iter()
            .find(|r| &r.account == account)
            .cloned();
        Box::pin(async move { found.ok_or_else(|| VenueError::AccountNotFound(account.clone())) })
    }
}

// ============================================================================
// MockSnapshotBuilder
// ============================================================================

/// Snapshot builder with injectable latency, failure and fixed contents.
///
/// Builds a `TriggerBook` from the index unless a fixed book was installed.
#[derive(Default)]
pub struct MockSnapshotBuilder {
    inner: TriggerBookBuilder,
    fixed: Mutex<Option<Arc<TriggerBook>>>,
    delay: Mutex<Duration>,
    fail: AtomicBool,
    builds: AtomicUsize,
}

impl MockSnapshotBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this book regardless of the index contents.
    pub fn set_fixed_book(&self, book: TriggerBook) {
        *self.fixed.lock() = Some(Arc::new(book));
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = delay;
    }

    pub fn set_fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of build calls, failed ones included.
    pub fn build_count(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

impl SnapshotBuilder for MockSnapshotBuilder {
    fn build<'a>(
        &'a self,
        index: &'a dyn AccountIndex,
    ) -> BoxFuture<'a, VenueResult<Arc<dyn OrderBookSnapshot>>> {
        Box::pin(async move {
            self.builds.fetch_add(1, Ordering::SeqCst);
            let delay = *self.delay.lock();
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            if self.fail.load(Ordering::SeqCst) {
                return Err(VenueError::SnapshotBuild("order book read failed".to_string()));
            }
            let fixed = self.fixed.lock().clone();
            match fixed {
                Some(book) => Ok(book as Arc<dyn OrderBookSnapshot>),
                None => Ok(Arc::new(self.inner.build_book(index)) as Arc<dyn OrderBookSnapshot>),
            }
        })
    }
}

// ============================================================================
// ManualSlotSource
// ============================================================================

/// Slot source moved by hand.
#[derive(Debug, Default)]
pub struct ManualSlotSource {
    slot: AtomicU64,
}

impl ManualSlotSource {
    pub fn new(slot: Slot) -> Self {
        Self {
            slot: AtomicU64::new(slot.get()),
        }
    }

    pub fn set(&self, slot: Slot) {
        self.slot.store(slot.get(), Ordering::SeqCst);
    }

    pub fn advance(&self, slots: u64) {
        self.slot.fetch_add(slots, Ordering::SeqCst);
    }
}

impl SlotSource for ManualSlotSource {
    fn current_slot(&self) -> Slot {
        Slot(self.slot.load(Ordering::SeqCst))
    }
}

impl SlotFetcher for ManualSlotSource {
    fn fetch_slot(&self) -> BoxFuture<'_, VenueResult<Slot>> {
        let slot = self.current_slot();
        Box::pin(async move { Ok(slot) })
    }
}

// ============================================================================
// RecordingAlertSink
// ============================================================================

/// Alert sink that keeps every message.
#[derive(Debug, Default)]
pub struct RecordingAlertSink {
    messages: Mutex<Vec<String>>,
}

impl RecordingAlertSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().clone()
    }

    /// Whether any alert contains `needle`.
    pub fn contains(&self, needle: &str) -> bool {
        self.messages.lock().iter().any(|m| m.contains(needle))
    }
}

impl AlertSink for RecordingAlertSink {
    fn notify(&self, message: String) {
        self.messages.lock().push(message);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keeper_core::TriggerCondition;
    use rust_decimal_macros::dec;

    fn order() -> TriggerOrder {
        TriggerOrder {
            order_id: OrderId(1),
            market: MarketKey::perp(0),
            condition: TriggerCondition::Below,
            trigger_price: Price::new(dec!(10)),
            triggered: false,
        }
    }

    #[tokio::test]
    async fn test_scripted_submissions() {
        let venue = MockVenueClient::new();
        let account = AccountId::new("a");
        let record = AccountRecord::new(account.clone(), "auth");
        venue.push_submit_result(Err(SubmitError::Timeout));

        let first = venue.submit_trigger(&account, &record, &order()).await;
        let second = venue.submit_trigger(&account, &record, &order()).await;

        assert!(matches!(first, Err(SubmitError::Timeout)));
        assert_eq!(second.unwrap(), TxRef::new("tx-0"));
        assert_eq!(venue.submission_count(), 2);
    }

    #[tokio::test]
    async fn test_held_submissions_wait_for_release() {
        let venue = Arc::new(MockVenueClient::new());
        venue.hold_submissions();

        let task = {
            let venue = Arc::clone(&venue);
            tokio::spawn(async move {
                let account = AccountId::new("a");
                let record = AccountRecord::new(account.clone(), "auth");
                venue.submit_trigger(&account, &record, &order()).await
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!task.is_finished());
        assert_eq!(venue.submission_count(), 1);

        venue.release_submissions();
        let result = tokio::time::timeout(Duration::from_secs(1), task)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn test_listing_and_state_failures() {
        let venue = MockVenueClient::new();
        venue.add_market(MarketKey::spot(1), Price::new(dec!(1)));
        venue.fail_listing(MarketKind::Perp);
        venue.set_subaccount_count(4);

        assert!(venue.list_markets(MarketKind::Perp).await.is_err());
        assert_eq!(venue.list_markets(MarketKind::Spot).await.unwrap().len(), 1);
        assert_eq!(venue.venue_state().await.unwrap().subaccount_count, 4);

        venue.set_fail_state(true);
        assert!(venue.venue_state().await.is_err());
    }
}
