//! Venue collaborators for the trigger keeper.
//!
//! The keeper engine depends only on the traits defined here:
//! - `VenueClient`: reference prices, market listing, venue state, trigger submission
//! - `AccountIndex` / `AccountIndexFactory`: the in-memory mirror of user accounts
//! - `SnapshotBuilder` / `OrderBookSnapshot`: point-in-time view of resting trigger orders
//! - `SlotSource`: chain slot clock
//! - `AlertSink`: best-effort operator notifications
//!
//! Production implementations talk to a keeper gateway over HTTP. The
//! `mock` module provides in-process implementations for tests.

pub mod account_index;
pub mod alert;
pub mod book;
pub mod error;
pub mod http;
pub mod mock;
pub mod slot;
pub mod venue;

pub use account_index::{
    AccountIndex, AccountIndexFactory, AccountSource, DynAccountIndex, MemoryAccountIndex,
    MemoryAccountIndexFactory,
};
pub use alert::{AlertSink, DynAlertSink, LogAlertSink, WebhookAlertSink};
pub use book::{OrderBookSnapshot, SnapshotBuilder, TriggerBook, TriggerBookBuilder};
pub use error::{ErrorCode, SubmitError, VenueError, VenueResult};
pub use http::HttpVenueClient;
pub use slot::{SlotFetcher, SlotSource, SlotTracker};
pub use venue::{BoxFuture, DynVenueClient, VenueClient};
