//! GraphQL Admin API client for the storefront.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::StorefrontError;

use super::types::{Listing, ProductsResponse, StorefrontSource};

/// Default Admin API version.
pub const DEFAULT_API_VERSION: &str = "2022-01";

const PRODUCTS_QUERY: &str = r#"
query Products($q: String!, $locationId: ID!) {
  products(first: 10, query: $q) {
    edges {
      node {
        id
        title
        modelNumber: metafield(namespace: "product", key: "model_no") {
          value
        }
        variants(first: 30) {
          edges {
            node {
              price
              sku
              inventoryItem {
                inventoryLevel(locationId: $locationId) {
                  available
                }
              }
            }
          }
        }
        images(first: 3) {
          edges {
            node {
              id
              url
            }
          }
        }
      }
    }
  }
}
"#;

/// Connection settings for the storefront.
#[derive(Debug, Clone)]
pub struct StorefrontConfig {
    /// Shop domain, e.g. `my-shop.myshopify.com`.
    pub shop: String,
    /// Admin API access token.
    pub access_token: String,
    /// Numeric location id whose inventory level is compared.
    pub location_id: String,
    /// Admin API version segment of the endpoint path.
    pub api_version: String,
    /// Full GraphQL endpoint override (tests, proxies).
    pub endpoint: Option<String>,
    /// Per-request timeout.
    pub request_timeout: Duration,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        Self {
            shop: String::new(),
            access_token: String::new(),
            location_id: String::new(),
            api_version: DEFAULT_API_VERSION.to_string(),
            endpoint: None,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl StorefrontConfig {
    /// Resolves the GraphQL endpoint URL.
    pub fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.clone(),
            None => format!(
                "https://{}/admin/api/{}/graphql.json",
                self.shop, self.api_version
            ),
        }
    }

    /// Global id of the inventory location.
    pub fn location_gid(&self) -> String {
        format!("gid://shopify/Location/{}", self.location_id)
    }
}

/// Escapes characters that carry meaning in the storefront search syntax.
pub fn escape_search_term(term: &str) -> String {
    let mut escaped = String::with_capacity(term.len());
    for c in term.chars() {
        if matches!(c, '\\' | ':' | '(' | ')') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Builds the fuzzy search matching the key against titles and SKUs.
pub fn search_query(business_key: &str) -> String {
    let key = escape_search_term(business_key);
    format!("(title:*{key}*) OR (sku:{key})")
}

/// Storefront client backed by the GraphQL Admin API.
pub struct ShopifyClient {
    endpoint: String,
    access_token: String,
    location_gid: String,
    http_client: Client,
}

impl ShopifyClient {
    /// # Errors
    ///
    /// Returns `StorefrontError::RequestFailed` if the HTTP client cannot be built.
    pub fn new(config: &StorefrontConfig) -> Result<Self, StorefrontError> {
        let http_client = Client::builder().timeout(config.request_timeout).build()?;
        Ok(Self {
            endpoint: config.endpoint_url(),
            access_token: config.access_token.clone(),
            location_gid: config.location_gid(),
            http_client,
        })
    }
}

#[async_trait]
impl StorefrontSource for ShopifyClient {
    async fn find_listings(&self, business_key: &str) -> Result<Vec<Listing>, StorefrontError> {
        let body = json!({
            "query": PRODUCTS_QUERY,
            "variables": {
                "q": search_query(business_key),
                "locationId": self.location_gid,
            },
        });

        let response = self
            .http_client
            .post(&self.endpoint)
            .header("X-Shopify-Access-Token", &self.access_token)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(StorefrontError::UnexpectedStatus {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: ProductsResponse = response
            .json()
            .await
            .map_err(|e| StorefrontError::ParseError(e.to_string()))?;

        if let Some(cost) = parsed.extensions.as_ref().and_then(|ext| ext.cost.as_ref()) {
            tracing::debug!(
                requested = cost.requested_query_cost,
                actual = ?cost.actual_query_cost,
                available = cost.throttle_status.currently_available,
                maximum = cost.throttle_status.maximum_available,
                restore_rate = cost.throttle_status.restore_rate,
                "Storefront query cost"
            );
            if cost.exceeds_maximum() {
                tracing::warn!(
                    business_key = %business_key,
                    maximum = cost.throttle_status.maximum_available,
                    "Storefront query cost exceeds the maximum available budget"
                );
            }
        }

        if let Some(errors) = parsed.errors.filter(|errors| !errors.is_empty()) {
            let messages: Vec<String> = errors.into_iter().map(|e| e.message).collect();
            return Err(StorefrontError::GraphQl(messages.join("; ")));
        }

        let data = parsed
            .data
            .ok_or_else(|| StorefrontError::ParseError("response has no data".to_string()))?;

        let hits = data.products.edges.len();
        let listings: Vec<Listing> = data
            .products
            .edges
            .into_iter()
            .map(|edge| Listing::from(edge.node))
            .filter(|listing| listing.model_number.as_deref() == Some(business_key))
            .collect();

        tracing::debug!(
            business_key = %business_key,
            hits = hits,
            kept = listings.len(),
            "Storefront search completed"
        );

        Ok(listings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> ShopifyClient {
        ShopifyClient::new(&StorefrontConfig {
            shop: "test-shop.myshopify.com".to_string(),
            access_token: "shpat_test".to_string(),
            location_id: "42".to_string(),
            endpoint: Some(format!("{}/graphql.json", server.uri())),
            ..Default::default()
        })
        .unwrap()
    }

    fn product(id: &str, model_no: Option<&str>, skus: &[&str]) -> serde_json::Value {
        let variants: Vec<serde_json::Value> = skus
            .iter()
            .map(|sku| {
                json!({"node": {"price": "19.99", "sku": sku,
                    "inventoryItem": {"inventoryLevel": {"available": 5}}}})
            })
            .collect();
        json!({"node": {
            "id": id,
            "title": format!("Listing {id}"),
            "modelNumber": model_no.map(|v| json!({"value": v})),
            "variants": {"edges": variants},
            "images": {"edges": []}
        }})
    }

    #[test]
    fn test_escape_search_term() {
        assert_eq!(escape_search_term("ABC123"), "ABC123");
        assert_eq!(escape_search_term(r"A:B(C)\D"), r"A\:B\(C\)\\D");
    }

    #[test]
    fn test_search_query() {
        assert_eq!(search_query("ABC123"), "(title:*ABC123*) OR (sku:ABC123)");
        assert_eq!(search_query("X(1)"), r"(title:*X\(1\)*) OR (sku:X\(1\))");
    }

    #[test]
    fn test_endpoint_url() {
        let config = StorefrontConfig {
            shop: "shop.example.com".to_string(),
            location_id: "7".to_string(),
            ..Default::default()
        };
        assert_eq!(
            config.endpoint_url(),
            "https://shop.example.com/admin/api/2022-01/graphql.json"
        );
        assert_eq!(config.location_gid(), "gid://shopify/Location/7");
    }

    #[tokio::test]
    async fn test_find_listings_keeps_exact_model_number_only() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/graphql.json"))
            .and(header("X-Shopify-Access-Token", "shpat_test"))
            .and(body_partial_json(json!({
                "variables": {
                    "q": "(title:*ABC123*) OR (sku:ABC123)",
                    "locationId": "gid://shopify/Location/42"
                }
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": {"products": {"edges": [
                    product("gid://shopify/Product/1", Some("ABC123"), &["ABC123-RED"]),
                    product("gid://shopify/Product/2", Some("ABC1234"), &["ABC1234"]),
                    product("gid://shopify/Product/3", None, &["ABC123-OLD"])
                ]}}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let listings = client_for(&server).find_listings("ABC123").await.unwrap();

        assert_eq!(listings.len(), 1);
        assert_eq!(listings[0].id, "gid://shopify/Product/1");
        assert_eq!(listings[0].variant_skus(), vec!["ABC123-RED"]);
    }

    #[tokio::test]
    async fn test_find_listings_non_200_is_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
            .mount(&server)
            .await;

        let err = client_for(&server).find_listings("ABC123").await.unwrap_err();
        assert!(matches!(
            err,
            StorefrontError::UnexpectedStatus { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_find_listings_graphql_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errors": [{"message": "Throttled"}]
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).find_listings("ABC123").await.unwrap_err();
        assert!(matches!(err, StorefrontError::GraphQl(msg) if msg == "Throttled"));
    }

    #[tokio::test]
    async fn test_request_timeout_is_applied() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"data": {"products": {"edges": []}}}))
                    .set_delay(Duration::from_secs(2)),
            )
            .mount(&server)
            .await;

        let client = ShopifyClient::new(&StorefrontConfig {
            access_token: "shpat_test".to_string(),
            location_id: "42".to_string(),
            endpoint: Some(format!("{}/graphql.json", server.uri())),
            request_timeout: Duration::from_millis(100),
            ..Default::default()
        })
        .expect("client");

        let err = client.find_listings("ABC123").await.unwrap_err();
        assert!(matches!(err, StorefrontError::RequestFailed(e) if e.is_timeout()));
    }
}
