//! Listing types and the GraphQL response schema they are decoded from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::StorefrontError;

/// Something that can look up storefront listings by business key.
#[async_trait]
pub trait StorefrontSource: Send + Sync {
    /// Returns every listing whose model number equals `business_key`.
    async fn find_listings(&self, business_key: &str) -> Result<Vec<Listing>, StorefrontError>;
}

/// A product listing on the storefront.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    /// Storefront global id (e.g. `gid://shopify/Product/123`).
    pub id: String,
    pub title: String,
    /// Value of the model-number metafield, if set.
    pub model_number: Option<String>,
    pub variants: Vec<ListingVariant>,
    /// Not used by the audit itself; kept for triage output.
    pub images: Vec<ListingImage>,
}

impl Listing {
    /// SKUs of every variant, in storefront order.
    pub fn variant_skus(&self) -> Vec<String> {
        self.variants.iter().map(|v| v.sku.clone()).collect()
    }
}

/// One variant of a storefront listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingVariant {
    pub sku: String,
    /// Price as the storefront formats it (decimal text, e.g. `"19.99"`).
    pub price: String,
    /// Available quantity at the configured location.
    pub available: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingImage {
    pub id: String,
    pub url: String,
}

// ============================================================================
// GraphQL wire schema
// ============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsResponse {
    pub data: Option<ProductsData>,
    #[serde(default)]
    pub errors: Option<Vec<GraphQlError>>,
    #[serde(default)]
    pub extensions: Option<Extensions>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct GraphQlError {
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProductsData {
    pub products: Connection<ProductNode>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Connection<T> {
    #[serde(default = "Vec::new")]
    pub edges: Vec<Edge<T>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Edge<T> {
    pub node: T,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ProductNode {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub model_number: Option<Metafield>,
    pub variants: Connection<VariantNode>,
    pub images: Option<Connection<ImageNode>>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Metafield {
    pub value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct VariantNode {
    pub sku: Option<String>,
    pub price: Option<String>,
    pub inventory_item: Option<InventoryItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct InventoryItem {
    pub inventory_level: Option<InventoryLevel>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct InventoryLevel {
    pub available: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ImageNode {
    pub id: String,
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct Extensions {
    pub cost: Option<QueryCost>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryCost {
    #[serde(default)]
    pub requested_query_cost: i64,
    pub actual_query_cost: Option<i64>,
    pub throttle_status: ThrottleStatus,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ThrottleStatus {
    pub maximum_available: f64,
    pub currently_available: f64,
    pub restore_rate: f64,
}

impl QueryCost {
    /// Whether this query costs more than the bucket can ever hold.
    pub fn exceeds_maximum(&self) -> bool {
        let cost = match self.actual_query_cost {
            Some(actual) if actual > 0 => actual,
            _ => self.requested_query_cost,
        };
        cost as f64 > self.throttle_status.maximum_available
    }
}

impl From<ProductNode> for Listing {
    fn from(node: ProductNode) -> Self {
        let variants = node
            .variants
            .edges
            .into_iter()
            .map(|edge| {
                let v = edge.node;
                ListingVariant {
                    sku: v.sku.unwrap_or_default(),
                    price: v.price.unwrap_or_default(),
                    available: v
                        .inventory_item
                        .and_then(|item| item.inventory_level)
                        .and_then(|level| level.available)
                        .unwrap_or(0),
                }
            })
            .collect();

        let images = node
            .images
            .map(|conn| {
                conn.edges
                    .into_iter()
                    .map(|edge| ListingImage {
                        id: edge.node.id,
                        url: edge.node.url,
                    })
                    .collect()
            })
            .unwrap_or_default();

        Self {
            id: node.id,
            title: node.title,
            model_number: node.model_number.and_then(|m| m.value),
            variants,
            images,
        }
    }
}
