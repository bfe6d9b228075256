//! Shared harness for keeper scenario tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use keeper_core::{
    AccountId, AccountRecord, MarketKey, OrderId, OrderSignature, Price, Slot, TriggerCondition,
    TriggerOrder,
};
use keeper_engine::{KeeperConfig, KeeperDeps, ManualClock, RecordingLockObserver, TriggerKeeper};
use keeper_venue::mock::{
    ManualSlotSource, MockAccountSource, MockSnapshotBuilder, MockVenueClient, RecordingAlertSink,
};
use keeper_venue::MemoryAccountIndexFactory;
use rust_decimal::Decimal;

pub const START_MS: u64 = 1_700_000_000_000;

pub fn price(value: i64) -> Price {
    Price::new(Decimal::from(value))
}

/// Order that triggers once the reference price falls below `trigger`.
pub fn stop_below(order_id: u32, market: MarketKey, trigger: i64) -> TriggerOrder {
    TriggerOrder {
        order_id: OrderId(order_id),
        market,
        condition: TriggerCondition::Below,
        trigger_price: price(trigger),
        triggered: false,
    }
}

pub fn account(address: &str, orders: Vec<TriggerOrder>) -> AccountRecord {
    AccountRecord::new(AccountId::new(address), "authority").with_orders(orders)
}

pub fn signature(address: &str, order_id: u32) -> OrderSignature {
    OrderSignature::new(&AccountId::new(address), OrderId(order_id))
}

pub fn config(name: &str) -> KeeperConfig {
    KeeperConfig {
        name: name.to_string(),
        interval: Duration::from_secs(1),
        trigger_cooldown: Duration::from_secs(10),
        ..KeeperConfig::default()
    }
}

/// A keeper wired to in-process collaborators.
pub struct Harness {
    pub venue: Arc<MockVenueClient>,
    pub source: Arc<MockAccountSource>,
    pub builder: Arc<MockSnapshotBuilder>,
    pub slots: Arc<ManualSlotSource>,
    pub loader_slots: Arc<ManualSlotSource>,
    pub clock: Arc<ManualClock>,
    pub alerts: Arc<RecordingAlertSink>,
    pub observer: Arc<RecordingLockObserver>,
    pub keeper: TriggerKeeper,
}

impl Harness {
    /// Keeper over `records`, with the venue's subaccount count in sync.
    pub fn new(config: KeeperConfig, records: Vec<AccountRecord>) -> Self {
        let venue = Arc::new(MockVenueClient::new());
        venue.set_subaccount_count(records.len() as u64);
        let source = Arc::new(MockAccountSource::new(records));
        let builder = Arc::new(MockSnapshotBuilder::new());
        let slots = Arc::new(ManualSlotSource::new(Slot(1_000)));
        let loader_slots = Arc::new(ManualSlotSource::new(Slot(1_000)));
        let clock = Arc::new(ManualClock::new(START_MS));
        let alerts = Arc::new(RecordingAlertSink::new());
        let observer = Arc::new(RecordingLockObserver::new());

        let deps = KeeperDeps::new(
            venue.clone(),
            Arc::new(MemoryAccountIndexFactory::new(source.clone())),
            builder.clone(),
            slots.clone(),
        )
        .with_loader_slots(loader_slots.clone())
        .with_alerts(alerts.clone())
        .with_clock(clock.clone())
        .with_lock_observer(observer.clone());

        Self {
            keeper: TriggerKeeper::new(config, deps),
            venue,
            source,
            builder,
            slots,
            loader_slots,
            clock,
            alerts,
            observer,
        }
    }

    /// Wait until every dispatched trigger has been handled.
    pub async fn settle(&self) {
        wait_until(|| self.keeper.in_flight_triggers() == 0).await;
    }
}

/// Poll `condition` every 5ms, failing the test after 2 seconds.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let waited = tokio::time::timeout(Duration::from_secs(2), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;
    assert!(waited.is_ok(), "condition not reached within timeout");
}
