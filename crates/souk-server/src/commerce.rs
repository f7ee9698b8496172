//! Commerce platform client.
//!
//! The platform wraps every payload in `{ success, message, data }` and
//! authenticates with short-lived bearer tokens obtained from a separate
//! token endpoint. A 401 triggers exactly one token refresh and one retry
//! of the same request; a second 401 is surfaced as an error.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use souk_contracts::{CatalogEntry, OrderFilter, OrderReceipt, OrderSummary};
use tokio::sync::Mutex;
use tracing::warn;

#[derive(Debug, Clone)]
pub struct CustomerInfo {
    pub name: String,
    pub phone: String,
    pub address: String,
}

#[async_trait]
pub trait Commerce: Send + Sync {
    async fn list_products(&self) -> Result<Vec<CatalogEntry>, String>;

    /// Place an order of one unit per item. Quantities beyond one are not
    /// expressible in a chat turn today.
    async fn create_order(
        &self,
        customer: &CustomerInfo,
        items: &[CatalogEntry],
    ) -> Result<OrderReceipt, String>;

    async fn list_orders(
        &self,
        counterparty_id: &str,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderSummary>, String>;
}

pub struct HttpCommerce {
    client: reqwest::Client,
    base_url: String,
    token_url: String,
    token: Mutex<Option<String>>,
}

impl HttpCommerce {
    pub fn new(cfg: &souk_config::Commerce) -> Result<Self, String> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(cfg.timeout_ms))
            .build()
            .map_err(|e| e.to_string())?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            token_url: cfg.token_url.clone(),
            token: Mutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, String> {
        if let Some(token) = self.token.lock().await.clone() {
            return Ok(token);
        }
        self.refresh_token().await
    }

    async fn refresh_token(&self) -> Result<String, String> {
        #[derive(Debug, Deserialize)]
        struct TokenBody {
            access_token: String,
        }

        let response = self
            .client
            .post(&self.token_url)
            .header("Content-Type", "application/json")
            .send()
            .await
            .map_err(|e| format!("token refresh failed: {e}"))?;
        if !response.status().is_success() {
            return Err(format!(
                "token refresh returned status {}",
                response.status()
            ));
        }
        let body: TokenBody = response
            .json()
            .await
            .map_err(|e| format!("invalid token refresh response: {e}"))?;

        *self.token.lock().await = Some(body.access_token.clone());
        Ok(body.access_token)
    }

    async fn with_auth_retry(
        &self,
        build: impl Fn(&str) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, String> {
        let token = self.access_token().await?;
        let response = build(&token)
            .send()
            .await
            .map_err(|e| format!("commerce request failed: {e}"))?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        warn!("commerce returned 401, refreshing access token");
        let token = self.refresh_token().await?;
        let retried = build(&token)
            .send()
            .await
            .map_err(|e| format!("commerce request failed: {e}"))?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            return Err("commerce rejected a freshly refreshed token".to_string());
        }
        Ok(retried)
    }
}

#[async_trait]
impl Commerce for HttpCommerce {
    async fn list_products(&self) -> Result<Vec<CatalogEntry>, String> {
        let url = format!("{}/products", self.base_url);
        let response = self
            .with_auth_retry(|token| self.client.get(&url).bearer_auth(token))
            .await?;
        let products: Vec<WireProduct> = unwrap_envelope(response).await?;
        Ok(products.into_iter().map(WireProduct::into_entry).collect())
    }

    async fn create_order(
        &self,
        customer: &CustomerInfo,
        items: &[CatalogEntry],
    ) -> Result<OrderReceipt, String> {
        if items.is_empty() {
            return Err("cannot create an order with an empty cart".to_string());
        }
        let url = format!("{}/orders", self.base_url);
        let payload = order_payload(customer, items);
        let response = self
            .with_auth_retry(|token| self.client.post(&url).bearer_auth(token).json(&payload))
            .await?;
        let order: WireOrder = unwrap_envelope(response).await?;
        Ok(OrderReceipt {
            order_id: order.id,
            status: order.status,
        })
    }

    async fn list_orders(
        &self,
        counterparty_id: &str,
        filter: &OrderFilter,
    ) -> Result<Vec<OrderSummary>, String> {
        let url = format!("{}/orders", self.base_url);
        let limit = filter.limit.unwrap_or(10).to_string();
        let mut query: Vec<(&str, String)> = vec![
            ("page", "1".to_string()),
            ("limit", limit),
            ("search", counterparty_id.to_string()),
        ];
        if let Some(status) = &filter.status {
            query.push(("status", status.clone()));
        }

        let response = self
            .with_auth_retry(|token| self.client.get(&url).query(&query).bearer_auth(token))
            .await?;
        let orders: Vec<WireOrder> = unwrap_envelope(response).await?;
        let summaries = orders.into_iter().map(summarize).collect();
        Ok(apply_search(summaries, filter.search.as_deref()))
    }
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>,
}

async fn unwrap_envelope<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, String> {
    let status = response.status();
    if !status.is_success() {
        return Err(format!("commerce request returned status {status}"));
    }
    let envelope: Envelope<T> = response
        .json()
        .await
        .map_err(|e| format!("invalid commerce response: {e}"))?;
    if !envelope.success {
        return Err(format!(
            "commerce request failed: {}",
            envelope.message.unwrap_or_else(|| "unknown error".to_string())
        ));
    }
    envelope
        .data
        .ok_or_else(|| "commerce response carried no data".to_string())
}

#[derive(Debug, Deserialize)]
struct WireProduct {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    price: f64,
    #[serde(rename = "deliveryCost", default = "default_delivery_cost")]
    delivery_cost: f64,
}

fn default_delivery_cost() -> f64 {
    7.0
}

impl WireProduct {
    fn into_entry(self) -> CatalogEntry {
        CatalogEntry {
            id: self.id,
            name: self.name,
            price: self.price,
            delivery_cost: self.delivery_cost,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireOrder {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    cart: Vec<WireCartLine>,
}

#[derive(Debug, Deserialize)]
struct WireCartLine {
    #[serde(default)]
    product: Value,
}

/// The cart references products either as populated objects or bare ids.
fn summarize(order: WireOrder) -> OrderSummary {
    let items = order
        .cart
        .iter()
        .filter_map(|line| match &line.product {
            Value::String(id) => Some(id.clone()),
            Value::Object(fields) => fields
                .get("name")
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        })
        .collect();
    OrderSummary {
        order_id: order.id,
        items,
        status: order.status,
    }
}

/// Free-text search is applied after counterparty scoping, against the order
/// id and item names.
fn apply_search(orders: Vec<OrderSummary>, search: Option<&str>) -> Vec<OrderSummary> {
    let Some(needle) = search.map(|s| s.trim().to_lowercase()).filter(|s| !s.is_empty()) else {
        return orders;
    };
    orders
        .into_iter()
        .filter(|order| {
            order.order_id.to_lowercase().contains(&needle)
                || order
                    .items
                    .iter()
                    .any(|item| item.to_lowercase().contains(&needle))
        })
        .collect()
}

/// Order totals: item prices summed at one unit each, plus a single delivery
/// charge taken as the highest delivery cost across the cart.
pub fn order_payload(customer: &CustomerInfo, items: &[CatalogEntry]) -> Value {
    let mut cart = Vec::with_capacity(items.len());
    let mut total_cart_price = 0.0;
    let mut delivery_cost = 0.0;
    for entry in items {
        delivery_cost = f64::max(delivery_cost, entry.delivery_cost);
        total_cart_price += entry.price;
        cart.push(json!({
            "product": entry.id,
            "quantity": 1,
            "pricePerUnit": entry.price,
            "selectedVariants": [],
        }));
    }

    json!({
        "status": "pending",
        "attempt": 0,
        "total": {
            "deliveryPrice": delivery_cost,
            "deliveryCost": delivery_cost,
            "totalPrice": total_cart_price + delivery_cost,
        },
        "customer": {
            "name": customer.name.trim(),
            "phone": customer.phone.trim(),
            "address": customer.address.trim(),
            "note": "",
            "email": "",
            "city": "",
        },
        "cart": cart,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(id: &str, name: &str, price: f64, delivery_cost: f64) -> CatalogEntry {
        CatalogEntry {
            id: id.to_string(),
            name: name.to_string(),
            price,
            delivery_cost,
        }
    }

    #[test]
    fn order_totals_take_the_highest_delivery_cost_once() {
        let customer = CustomerInfo {
            name: "Amine".to_string(),
            phone: "216000000".to_string(),
            address: "12 Rue Ibn Khaldoun, Tunis".to_string(),
        };
        let items = vec![
            entry("p1", "wall lamp", 23.0, 7.0),
            entry("p2", "lunch box", 15.0, 9.0),
        ];
        let payload = order_payload(&customer, &items);
        assert_eq!(payload["total"]["deliveryCost"], 9.0);
        assert_eq!(payload["total"]["totalPrice"], 23.0 + 15.0 + 9.0);
        assert_eq!(payload["cart"].as_array().unwrap().len(), 2);
        assert_eq!(payload["cart"][0]["quantity"], 1);
        assert_eq!(payload["customer"]["phone"], "216000000");
    }

    #[test]
    fn summarize_reads_populated_and_bare_cart_lines() {
        let order: WireOrder = serde_json::from_value(json!({
            "_id": "68a1",
            "status": "pending",
            "cart": [
                { "product": { "_id": "p1", "name": "wall lamp" } },
                { "product": "p2" },
                { "product": 3 }
            ]
        }))
        .unwrap();
        let summary = summarize(order);
        assert_eq!(summary.order_id, "68a1");
        assert_eq!(summary.items, vec!["wall lamp", "p2"]);
    }

    #[test]
    fn search_filters_on_order_id_and_items() {
        let orders = vec![
            OrderSummary {
                order_id: "68a1".to_string(),
                items: vec!["wall lamp".to_string()],
                status: "pending".to_string(),
            },
            OrderSummary {
                order_id: "68a2".to_string(),
                items: vec!["lunch box".to_string()],
                status: "delivered".to_string(),
            },
        ];
        let hits = apply_search(orders.clone(), Some("lamp"));
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].order_id, "68a1");
        assert_eq!(apply_search(orders, Some("  ")).len(), 2);
    }
}
