//! Kite Connect REST broker client.
//!
//! Implements the `BrokerClient` port over the Kite Connect v3 HTTP API:
//! regular market orders, single-leg GTT triggers, GTT listing/deletion and
//! LTP quotes. Requests authenticate with the static
//! `token api_key:access_token` header; there is no session renewal here.

use crate::domain::ports::BrokerClient;
use crate::domain::types::{HoldingLot, ListedGtt, Side};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{Datelike, FixedOffset, NaiveTime, Utc, Weekday};
use reqwest::Client;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};

const KITE_API_VERSION: &str = "3";

/// NSE trades 09:15-15:30 IST on weekdays.
const MARKET_OPEN_TIME: (u32, u32) = (9, 15);
const MARKET_CLOSE_TIME: (u32, u32) = (15, 30);

pub struct KiteBrokerClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: String,
    exchange: String,
}

#[derive(Debug, Deserialize)]
struct KiteEnvelope<T> {
    status: String,
    #[serde(default)]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OrderIdData {
    order_id: String,
}

#[derive(Debug, Default, Deserialize)]
struct TriggerIdData {
    trigger_id: u64,
}

#[derive(Debug, Deserialize)]
struct LtpData {
    last_price: Decimal,
}

#[derive(Debug, Deserialize)]
struct HoldingRow {
    #[serde(default)]
    tradingsymbol: Option<String>,
    #[serde(default)]
    quantity: Option<u32>,
    #[serde(default)]
    t1_quantity: Option<u32>,
    #[serde(default)]
    average_price: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
struct PositionRow {
    #[serde(default)]
    tradingsymbol: Option<String>,
    #[serde(default)]
    buy_quantity: Option<u32>,
    #[serde(default)]
    buy_price: Option<Decimal>,
}

#[derive(Debug, Default, Deserialize)]
struct PositionsData {
    #[serde(default)]
    net: Vec<PositionRow>,
}

impl KiteBrokerClient {
    pub fn new(base_url: String, api_key: String, access_token: String, exchange: String) -> Self {
        Self {
            client: Client::new(),
            base_url,
            api_key,
            access_token,
            exchange,
        }
    }

    fn auth_header(&self) -> String {
        format!("token {}:{}", self.api_key, self.access_token)
    }

    fn request(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        builder
            .header("Authorization", self.auth_header())
            .header("X-Kite-Version", KITE_API_VERSION)
    }

    /// Unwrap the `{status, data, message}` envelope every Kite response uses.
    fn unwrap_envelope<T>(envelope: KiteEnvelope<T>, operation: &str) -> Result<T> {
        if envelope.status != "success" {
            return Err(anyhow!(
                "{operation} rejected by broker: {}",
                envelope.message.unwrap_or_else(|| "no message".to_string())
            ));
        }
        envelope
            .data
            .ok_or_else(|| anyhow!("{operation} succeeded but response carried no data"))
    }

    async fn fetch_ltp(&self, symbol: &str) -> Result<Decimal> {
        let instrument = format!("{}:{}", self.exchange, symbol);
        let url = format!("{}/quote/ltp", self.base_url);
        let response = self
            .request(self.client.get(&url).query(&[("i", instrument.as_str())]))
            .send()
            .await
            .context("Failed to send LTP request")?;
        let body = response.text().await.context("Failed to read LTP response")?;
        let envelope: KiteEnvelope<std::collections::HashMap<String, LtpData>> =
            serde_json::from_str(&body)
                .map_err(|e| anyhow!("Failed to decode LTP response: {e}. Body: {body}"))?;
        let data = Self::unwrap_envelope(envelope, "LTP quote")?;
        data.get(&instrument)
            .map(|q| q.last_price)
            .ok_or_else(|| anyhow!("No LTP returned for {instrument}"))
    }

    /// The GTT condition carries the instrument's last price; the broker
    /// rejects conditions whose last price equals the trigger value, so
    /// nudge it a rupee away if the quote lands too close. The fallback
    /// when the quote is unavailable must sit on the non-triggering side:
    /// above the trigger for a buy-the-dip order, below it for a sell.
    async fn condition_last_price(
        &self,
        symbol: &str,
        trigger_price: Decimal,
        side: Side,
    ) -> Decimal {
        let mut last_price = match self.fetch_ltp(symbol).await {
            Ok(ltp) => ltp,
            Err(e) => {
                warn!("Could not fetch LTP for {symbol}: {e:#}, using trigger-based fallback");
                match side {
                    Side::Buy => trigger_price + dec!(5),
                    Side::Sell => trigger_price - Decimal::ONE,
                }
            }
        };
        if (last_price - trigger_price).abs() < dec!(0.01) {
            last_price = if trigger_price < last_price {
                trigger_price + Decimal::ONE
            } else {
                trigger_price - Decimal::ONE
            };
        }
        last_price
    }

    async fn net_buy_positions(&self, symbol: &str) -> Result<Vec<HoldingLot>> {
        let url = format!("{}/portfolio/positions", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to send positions request")?;
        let body = response
            .text()
            .await
            .context("Failed to read positions response")?;
        let envelope: KiteEnvelope<PositionsData> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode positions response: {e}. Body: {body}"))?;
        let data = Self::unwrap_envelope(envelope, "Positions")?;

        let lots = data
            .net
            .into_iter()
            .filter(|row| {
                row.tradingsymbol
                    .as_deref()
                    .is_some_and(|s| s.eq_ignore_ascii_case(symbol))
            })
            .filter_map(|row| {
                let quantity = row.buy_quantity.filter(|q| *q > 0)?;
                Some(HoldingLot {
                    quantity,
                    average_price: row.buy_price.unwrap_or_default(),
                })
            })
            .collect();
        Ok(lots)
    }
}

#[async_trait]
impl BrokerClient for KiteBrokerClient {
    /// Local trading-calendar check: weekdays 09:15-15:30 IST. Kite has no
    /// market-status endpoint; a failure to determine the offset counts as
    /// closed because AMO is not supported downstream.
    async fn is_market_open(&self) -> Result<bool> {
        let Some(ist) = FixedOffset::east_opt(5 * 3600 + 30 * 60) else {
            warn!("Could not construct IST offset, assuming market closed");
            return Ok(false);
        };
        let now = Utc::now().with_timezone(&ist);
        if matches!(now.weekday(), Weekday::Sat | Weekday::Sun) {
            return Ok(false);
        }
        let (open, close) = (
            NaiveTime::from_hms_opt(MARKET_OPEN_TIME.0, MARKET_OPEN_TIME.1, 0),
            NaiveTime::from_hms_opt(MARKET_CLOSE_TIME.0, MARKET_CLOSE_TIME.1, 0),
        );
        let (Some(open), Some(close)) = (open, close) else {
            return Ok(false);
        };
        let time = now.time();
        Ok(time >= open && time <= close)
    }

    async fn place_market_order(&self, symbol: &str, quantity: u32, side: Side) -> Result<String> {
        let url = format!("{}/orders/regular", self.base_url);
        let form = [
            ("tradingsymbol", symbol.to_string()),
            ("exchange", self.exchange.clone()),
            ("transaction_type", side.to_string()),
            ("order_type", "MARKET".to_string()),
            ("quantity", quantity.to_string()),
            ("product", "CNC".to_string()),
            ("validity", "DAY".to_string()),
        ];
        let response = self
            .request(self.client.post(&url).form(&form))
            .send()
            .await
            .context("Failed to send order request")?;
        let body = response.text().await.context("Failed to read order response")?;
        let envelope: KiteEnvelope<OrderIdData> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode order response: {e}. Body: {body}"))?;
        let data = Self::unwrap_envelope(envelope, "Market order")?;
        info!("Market order placed for {symbol}: order id {}", data.order_id);
        Ok(data.order_id)
    }

    async fn place_gtt_order(
        &self,
        symbol: &str,
        quantity: u32,
        price: Decimal,
        trigger_price: Decimal,
        side: Side,
    ) -> Result<u64> {
        let last_price = self.condition_last_price(symbol, trigger_price, side).await;

        let condition = json!({
            "exchange": self.exchange,
            "tradingsymbol": symbol,
            "trigger_values": [trigger_price],
            "last_price": last_price,
        });
        let orders = json!([{
            "exchange": self.exchange,
            "tradingsymbol": symbol,
            "transaction_type": side.to_string(),
            "quantity": quantity,
            "order_type": "LIMIT",
            "product": "CNC",
            "price": price,
        }]);

        let url = format!("{}/gtt/triggers", self.base_url);
        let form = [
            ("type", "single".to_string()),
            ("condition", condition.to_string()),
            ("orders", orders.to_string()),
        ];
        let response = self
            .request(self.client.post(&url).form(&form))
            .send()
            .await
            .context("Failed to send GTT request")?;
        let body = response.text().await.context("Failed to read GTT response")?;
        let envelope: KiteEnvelope<TriggerIdData> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode GTT response: {e}. Body: {body}"))?;
        let data = Self::unwrap_envelope(envelope, "GTT order")?;
        info!(
            "GTT placed for {symbol}: trigger id {} ({} x{} @ {price}, trigger {trigger_price})",
            data.trigger_id, side, quantity
        );
        Ok(data.trigger_id)
    }

    async fn list_gtt_orders(&self) -> Result<Vec<ListedGtt>> {
        let url = format!("{}/gtt/triggers", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to send GTT listing request")?;
        let body = response
            .text()
            .await
            .context("Failed to read GTT listing response")?;
        let envelope: KiteEnvelope<Vec<ListedGtt>> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode GTT listing: {e}. Body: {body}"))?;
        Self::unwrap_envelope(envelope, "GTT listing")
    }

    async fn delete_gtt_order(&self, trigger_id: u64) -> Result<()> {
        let url = format!("{}/gtt/triggers/{trigger_id}", self.base_url);
        let response = self
            .request(self.client.delete(&url))
            .send()
            .await
            .context("Failed to send GTT deletion request")?;
        let body = response
            .text()
            .await
            .context("Failed to read GTT deletion response")?;
        let envelope: KiteEnvelope<TriggerIdData> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode GTT deletion response: {e}. Body: {body}"))?;
        Self::unwrap_envelope(envelope, "GTT deletion")?;
        info!("Deleted GTT trigger {trigger_id}");
        Ok(())
    }

    /// Lots come from two places: the holdings book and today's net buys,
    /// which the holdings endpoint does not reflect until T+1. A positions
    /// failure degrades to holdings-only.
    async fn holdings(&self, symbol: &str) -> Result<Vec<HoldingLot>> {
        let url = format!("{}/portfolio/holdings", self.base_url);
        let response = self
            .request(self.client.get(&url))
            .send()
            .await
            .context("Failed to send holdings request")?;
        let body = response
            .text()
            .await
            .context("Failed to read holdings response")?;
        let envelope: KiteEnvelope<Vec<HoldingRow>> = serde_json::from_str(&body)
            .map_err(|e| anyhow!("Failed to decode holdings response: {e}. Body: {body}"))?;
        let rows = Self::unwrap_envelope(envelope, "Holdings")?;

        let mut lots = Vec::new();
        for row in rows {
            let Some(row_symbol) = row.tradingsymbol.as_deref() else {
                continue;
            };
            if !row_symbol.eq_ignore_ascii_case(symbol) {
                continue;
            }
            let quantity = row.quantity.filter(|q| *q > 0).or(row.t1_quantity);
            if let Some(quantity) = quantity.filter(|q| *q > 0) {
                lots.push(HoldingLot {
                    quantity,
                    average_price: row.average_price.unwrap_or_default(),
                });
            }
        }

        match self.net_buy_positions(symbol).await {
            Ok(mut positions) => lots.append(&mut positions),
            Err(e) => warn!("Could not fetch positions for {symbol}: {e:#}"),
        }
        Ok(lots)
    }

    async fn last_price(&self, symbol: &str) -> Result<Decimal> {
        self.fetch_ltp(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_header_format() {
        let client = KiteBrokerClient::new(
            "https://api.kite.trade".into(),
            "key".into(),
            "tok".into(),
            "NSE".into(),
        );
        assert_eq!(client.auth_header(), "token key:tok");
    }

    #[test]
    fn test_envelope_error_carries_broker_message() {
        let envelope: KiteEnvelope<TriggerIdData> = serde_json::from_str(
            r#"{"status":"error","message":"Insufficient funds","error_type":"InputException"}"#,
        )
        .unwrap();
        let err = KiteBrokerClient::unwrap_envelope(envelope, "GTT order").unwrap_err();
        assert!(err.to_string().contains("Insufficient funds"));
    }

    #[test]
    fn test_envelope_success_yields_data() {
        let envelope: KiteEnvelope<TriggerIdData> =
            serde_json::from_str(r#"{"status":"success","data":{"trigger_id":123456}}"#).unwrap();
        let data = KiteBrokerClient::unwrap_envelope(envelope, "GTT order").unwrap();
        assert_eq!(data.trigger_id, 123456);
    }

    #[test]
    fn test_holdings_rows_tolerate_missing_fields() {
        let envelope: KiteEnvelope<Vec<HoldingRow>> = serde_json::from_str(
            r#"{"status":"success","data":[
                {"tradingsymbol":"ITC","quantity":5,"average_price":412.5,"t1_quantity":0},
                {"tradingsymbol":"ITC","quantity":0,"t1_quantity":3},
                {"quantity":9}
            ]}"#,
        )
        .unwrap();
        let rows = KiteBrokerClient::unwrap_envelope(envelope, "Holdings").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].quantity, Some(5));
        assert_eq!(rows[0].average_price, Some(dec!(412.5)));
        assert_eq!(rows[1].t1_quantity, Some(3));
        assert!(rows[2].tradingsymbol.is_none());
    }

    #[test]
    fn test_listing_rows_tolerate_missing_fields() {
        let envelope: KiteEnvelope<Vec<ListedGtt>> = serde_json::from_str(
            r#"{"status":"success","data":[
                {"id":1,"status":"active","condition":{"tradingsymbol":"ITC","trigger_values":[448.2]}},
                {"status":"active"},
                {"id":3}
            ]}"#,
        )
        .unwrap();
        let rows = KiteBrokerClient::unwrap_envelope(envelope, "GTT listing").unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].symbol(), Some("ITC"));
        assert!(rows[1].id.is_none());
        assert!(rows[2].status.is_none());
    }
}
