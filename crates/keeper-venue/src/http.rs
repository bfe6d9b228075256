//! HTTP client for the keeper gateway.
//!
//! The gateway fronts the venue RPC and exposes the reads and the trigger
//! submission the keeper needs as a small REST API:
//!
//! | method | path                     | body / response                 |
//! |--------|--------------------------|---------------------------------|
//! | GET    | `/markets?kind=perp`     | `[Market]`                      |
//! | GET    | `/oracle/{kind}/{index}` | `{"price": "..."}`              |
//! | GET    | `/state`                 | `VenueState`                    |
//! | GET    | `/slot`                  | `{"slot": n}`                   |
//! | GET    | `/accounts`              | `[AccountRecord]`               |
//! | GET    | `/accounts/{id}`         | `AccountRecord`                 |
//! | POST   | `/trigger`               | `{"tx": "..."}` or failure body |

use std::time::Duration;

use keeper_core::{
    AccountId, AccountRecord, Market, MarketIndex, MarketKind, Price, Slot, TriggerOrder, TxRef,
    VenueState,
};
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::account_index::AccountSource;
use crate::error::{SubmitError, VenueError, VenueResult};
use crate::slot::SlotFetcher;
use crate::venue::{BoxFuture, VenueClient};

/// Default timeout for gateway requests.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct OracleResponse {
    price: Price,
}

#[derive(Debug, Deserialize)]
struct SlotResponse {
    slot: Slot,
}

#[derive(Debug, Serialize)]
struct TriggerRequest<'a> {
    account: &'a AccountId,
    record: &'a AccountRecord,
    order: &'a TriggerOrder,
    /// Wallet expected to sign the transaction.
    identity: &'a str,
}

#[derive(Debug, Deserialize)]
struct TriggerResponse {
    tx: String,
}

/// Failure body returned by `POST /trigger`.
#[derive(Debug, Default, Deserialize)]
struct TriggerFailure {
    #[serde(default)]
    code: Option<u32>,
    #[serde(default)]
    message: String,
    #[serde(default)]
    logs: Vec<String>,
}

/// Client for the keeper gateway.
pub struct HttpVenueClient {
    client: Client,
    base_url: String,
    identity: String,
}

impl HttpVenueClient {
    /// Create a new gateway client.
    ///
    /// # Arguments
    /// * `base_url` - Gateway root (e.g., "http://127.0.0.1:8899")
    /// * `identity` - Wallet that signs trigger submissions
    pub fn new(base_url: impl Into<String>, identity: impl Into<String>) -> VenueResult<Self> {
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(|e| VenueError::HttpClient(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            identity: identity.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> VenueResult<T> {
        let url = self.url(path);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| VenueError::HttpClient(format!("GET {path} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VenueError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| VenueError::HttpClient(format!("GET {path} body read failed: {e}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    async fn post_trigger(
        &self,
        account: &AccountId,
        record: &AccountRecord,
        order: &TriggerOrder,
    ) -> Result<TxRef, SubmitError> {
        let request = TriggerRequest {
            account,
            record,
            order,
            identity: &self.identity,
        };

        let response = self
            .client
            .post(self.url("/trigger"))
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SubmitError::Timeout
                } else {
                    SubmitError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SubmitError::Transport(e.to_string()))?;

        if status.is_success() {
            let parsed: TriggerResponse = serde_json::from_str(&body)
                .map_err(|e| SubmitError::Transport(format!("invalid trigger response: {e}")))?;
            return Ok(TxRef::new(parsed.tx));
        }
        Err(decode_trigger_failure(status, &body))
    }
}

/// Map a non-2xx `POST /trigger` response onto a `SubmitError`.
fn decode_trigger_failure(status: StatusCode, body: &str) -> SubmitError {
    if status == StatusCode::GATEWAY_TIMEOUT || status == StatusCode::REQUEST_TIMEOUT {
        return SubmitError::Timeout;
    }

    let failure: TriggerFailure = serde_json::from_str(body).unwrap_or_else(|_| TriggerFailure {
        message: format!("HTTP {status}: {body}"),
        ..TriggerFailure::default()
    });

    match failure.code {
        Some(code) => SubmitError::Program {
            code,
            message: failure.message,
            logs: failure.logs,
        },
        None => SubmitError::Rejected {
            message: failure.message,
            logs: failure.logs,
        },
    }
}

impl VenueClient for HttpVenueClient {
    fn reference_price(
        &self,
        kind: MarketKind,
        index: MarketIndex,
    ) -> BoxFuture<'_, VenueResult<Price>> {
        Box::pin(async move {
            let response: OracleResponse = self.get_json(&format!("/oracle/{kind}/{index}")).await?;
            Ok(response.price)
        })
    }

    fn list_markets(&self, kind: MarketKind) -> BoxFuture<'_, VenueResult<Vec<Market>>> {
        Box::pin(async move {
            let markets: Vec<Market> = self.get_json(&format!("/markets?kind={kind}")).await?;
            debug!(%kind, count = markets.len(), "Markets listed");
            Ok(markets)
        })
    }

    fn venue_state(&self) -> BoxFuture<'_, VenueResult<VenueState>> {
        Box::pin(async move { self.get_json("/state").await })
    }

    fn submit_trigger<'a>(
        &'a self,
        account: &'a AccountId,
        record: &'a AccountRecord,
        order: &'a TriggerOrder,
    ) -> BoxFuture<'a, Result<TxRef, SubmitError>> {
        Box::pin(self.post_trigger(account, record, order))
    }

    fn identity(&self) -> &str {
        &self.identity
    }
}

impl AccountSource for HttpVenueClient {
    fn fetch_all(&self) -> BoxFuture<'_, VenueResult<Vec<AccountRecord>>> {
        Box::pin(async move {
            let records: Vec<AccountRecord> = self.get_json("/accounts").await?;
            info!(count = records.len(), "Fetched all accounts");
            Ok(records)
        })
    }

    fn fetch_account<'a>(
        &'a self,
        account: &'a AccountId,
    ) -> BoxFuture<'a, VenueResult<AccountRecord>> {
        Box::pin(async move {
            match self.get_json(&format!("/accounts/{account}")).await {
                Err(VenueError::Status { status: 404, .. }) => {
                    Err(VenueError::AccountNotFound(account.clone()))
                }
                other => other,
            }
        })
    }
}

impl SlotFetcher for HttpVenueClient {
    fn fetch_slot(&self) -> BoxFuture<'_, VenueResult<Slot>> {
        Box::pin(async move {
            let response: SlotResponse = self.get_json("/slot").await?;
            Ok(response.slot)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use keeper_core::{MarketKey, OrderId, TriggerCondition};
    use rust_decimal_macros::dec;

    #[test]
    fn test_base_url_trailing_slash() {
        let client = HttpVenueClient::new("http://gateway:8899/", "wallet").unwrap();
        assert_eq!(client.url("/state"), "http://gateway:8899/state");
        assert_eq!(client.identity(), "wallet");
    }

    #[test]
    fn test_trigger_request_body() {
        let account = AccountId::new("acct");
        let record = AccountRecord::new(account.clone(), "auth");
        let order = TriggerOrder {
            order_id: OrderId(5),
            market: MarketKey::perp(2),
            condition: TriggerCondition::Above,
            trigger_price: Price::new(dec!(101.5)),
            triggered: false,
        };
        let request = TriggerRequest {
            account: &account,
            record: &record,
            order: &order,
            identity: "wallet",
        };

        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["account"], "acct");
        assert_eq!(value["order"]["order_id"], 5);
        assert_eq!(value["order"]["trigger_price"], "101.5");
        assert_eq!(value["identity"], "wallet");
    }

    #[test]
    fn test_decode_program_failure() {
        let err = decode_trigger_failure(
            StatusCode::UNPROCESSABLE_ENTITY,
            r#"{"code": 6010, "message": "order not triggerable", "logs": ["a", "b"]}"#,
        );
        assert_eq!(err.error_code(), ErrorCode::Program(6010));
        assert_eq!(err.logs().len(), 2);
    }

    #[test]
    fn test_decode_failure_with_log_code() {
        let err = decode_trigger_failure(
            StatusCode::BAD_REQUEST,
            r#"{"message": "simulation failed", "logs": ["failed: custom program error: 0x1770"]}"#,
        );
        assert!(matches!(err, SubmitError::Rejected { .. }));
        assert_eq!(err.error_code(), ErrorCode::Program(6000));
    }

    #[test]
    fn test_decode_unstructured_failure() {
        let err = decode_trigger_failure(StatusCode::INTERNAL_SERVER_ERROR, "boom");
        match err {
            SubmitError::Rejected { message, logs } => {
                assert!(message.contains("boom"));
                assert!(logs.is_empty());
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(matches!(
            decode_trigger_failure(StatusCode::GATEWAY_TIMEOUT, ""),
            SubmitError::Timeout
        ));
    }

    #[test]
    fn test_oracle_response_decoding() {
        let parsed: OracleResponse = serde_json::from_str(r#"{"price": "23.75"}"#).unwrap();
        assert_eq!(parsed.price, Price::new(dec!(23.75)));
        let slot: SlotResponse = serde_json::from_str(r#"{"slot": 250}"#).unwrap();
        assert_eq!(slot.slot, Slot(250));
    }
}
