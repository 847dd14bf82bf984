//! Shopify Admin REST backend for [`CommerceStore`].

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::{debug, instrument};

use crate::commerce::{CommerceError, CommerceStore, InventoryLevel, Product, Variant};

pub const DEFAULT_API_VERSION: &str = "2019-10";
const ACCESS_TOKEN_HEADER: &str = "X-Shopify-Access-Token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One client per shop; build it once and share it.
pub struct ShopClient {
    http: Client,
    base: String,
    access_token: String,
}

impl std::fmt::Debug for ShopClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShopClient")
            .field("base", &self.base)
            .finish_non_exhaustive()
    }
}

impl ShopClient {
    /// `shop_url` is the shop origin, e.g. `https://acme.myshopify.com`.
    pub fn new(shop_url: &str, access_token: impl Into<String>) -> Result<Self, CommerceError> {
        Self::with_api_version(shop_url, access_token, DEFAULT_API_VERSION)
    }

    pub fn with_api_version(
        shop_url: &str,
        access_token: impl Into<String>,
        api_version: &str,
    ) -> Result<Self, CommerceError> {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CommerceError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            base: format!("{}/admin/api/{api_version}", shop_url.trim_end_matches('/')),
            access_token: access_token.into(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{path}", self.base)
    }

    fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, CommerceError> {
        let response = request
            .header(ACCESS_TOKEN_HEADER, &self.access_token)
            .send()
            .map_err(|e| CommerceError::Transport(e.to_string()))?;
        if !response.status().is_success() {
            return Err(error_from(response));
        }
        response.json().map_err(|e| CommerceError::Decode(e.to_string()))
    }

    fn list<T: DeserializeOwned>(&self, path: &str, query: &[(&str, String)]) -> Result<T, CommerceError> {
        self.send(self.http.get(self.url(path)).query(query))
    }
}

#[derive(Debug, Deserialize)]
struct VariantsPage {
    variants: Vec<Variant>,
}

#[derive(Debug, Deserialize)]
struct ProductsPage {
    products: Vec<Product>,
}

#[derive(Debug, Deserialize)]
struct LevelsPage {
    inventory_levels: Vec<InventoryLevel>,
}

#[derive(Debug, Deserialize)]
struct LevelEnvelope {
    inventory_level: InventoryLevel,
}

#[derive(Debug, Deserialize)]
struct WireError {
    errors: serde_json::Value,
}

fn error_from(response: Response) -> CommerceError {
    let status = response.status().as_u16();
    let body = response.text().unwrap_or_default();
    let message = match serde_json::from_str::<WireError>(&body) {
        Ok(WireError { errors: serde_json::Value::String(s) }) => s,
        Ok(WireError { errors }) => errors.to_string(),
        Err(_) => body,
    };
    CommerceError::Api { status, message }
}

fn paging(page: u32, limit: u32) -> Vec<(&'static str, String)> {
    vec![("limit", limit.to_string()), ("page", page.to_string())]
}

impl CommerceStore for ShopClient {
    #[instrument(skip(self))]
    fn variants(&self, page: u32, limit: u32) -> Result<Vec<Variant>, CommerceError> {
        let page: VariantsPage = self.list("variants.json", &paging(page, limit))?;
        debug!(count = page.variants.len(), "listed variants");
        Ok(page.variants)
    }

    #[instrument(skip(self))]
    fn products(&self, page: u32, limit: u32) -> Result<Vec<Product>, CommerceError> {
        let mut query = paging(page, limit);
        query.push(("fields", "id,product_type,tags".to_string()));
        let page: ProductsPage = self.list("products.json", &query)?;
        debug!(count = page.products.len(), "listed products");
        Ok(page.products)
    }

    #[instrument(skip(self))]
    fn inventory_levels(&self, location_id: u64, page: u32, limit: u32) -> Result<Vec<InventoryLevel>, CommerceError> {
        let mut query = paging(page, limit);
        query.push(("location_ids", location_id.to_string()));
        let page: LevelsPage = self.list("inventory_levels.json", &query)?;
        debug!(count = page.inventory_levels.len(), "listed inventory levels");
        Ok(page.inventory_levels)
    }

    #[instrument(skip(self))]
    fn set_inventory_level(
        &self,
        location_id: u64,
        inventory_item_id: u64,
        available: i64,
    ) -> Result<InventoryLevel, CommerceError> {
        let body = json!({
            "location_id": location_id,
            "inventory_item_id": inventory_item_id,
            "available": available,
            "disconnect_if_necessary": true,
        });
        let envelope: LevelEnvelope = self.send(self.http.post(self.url("inventory_levels/set.json")).json(&body))?;
        Ok(envelope.inventory_level)
    }

    #[instrument(skip(self))]
    fn update_product_type(&self, product_id: u64, product_type: &str) -> Result<(), CommerceError> {
        let body = json!({ "product": { "id": product_id, "product_type": product_type } });
        let _: serde_json::Value = self.send(
            self.http
                .put(self.url(&format!("products/{product_id}.json")))
                .json(&body),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_url_includes_api_version() {
        let client = ShopClient::new("https://acme.myshopify.com/", "token").unwrap();
        assert_eq!(
            client.url("variants.json"),
            "https://acme.myshopify.com/admin/api/2019-10/variants.json"
        );
    }

    #[test]
    fn debug_output_hides_access_token() {
        let client = ShopClient::new("https://acme.myshopify.com", "shpat_secret").unwrap();
        assert!(!format!("{client:?}").contains("shpat_secret"));
    }

    #[test]
    fn decodes_variant_page() {
        let body = r#"{"variants": [
            {"id": 10, "product_id": 1, "title": "6", "sku": "100200-01-6", "barcode": "012345678905",
             "inventory_item_id": 99, "fulfillment_service": "stocksync", "price": "10.00"},
            {"id": 11, "product_id": 1, "sku": null, "barcode": null, "inventory_item_id": 100,
             "fulfillment_service": "manual"}
        ]}"#;
        let page: VariantsPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.variants.len(), 2);
        assert_eq!(page.variants[0].barcode.as_deref(), Some("012345678905"));
        assert_eq!(page.variants[1].fulfillment_service.as_deref(), Some("manual"));
    }

    #[test]
    fn decodes_level_with_null_available() {
        let body = r#"{"inventory_levels": [
            {"inventory_item_id": 99, "location_id": 7, "available": null, "updated_at": "2020-01-01T00:00:00Z"}
        ]}"#;
        let page: LevelsPage = serde_json::from_str(body).unwrap();
        assert_eq!(page.inventory_levels[0].available, None);
    }
}
