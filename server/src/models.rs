use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A sellable item. Rows are never hard-deleted; retiring a product flips
/// `available` off so historical order items keep a valid reference.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub subcategory: Option<String>,
    pub available: bool,
    pub image: Option<String>,
}

/// A committed purchase. `total` is derived from the line items and kept
/// equal to the sum of their subtotals across every mutation.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Order {
    pub id: i64,
    pub buyer_name: String,
    pub buyer_phone: Option<String>,
    pub table_number: Option<i64>,
    pub payment_method: String,
    pub total: f64,
    pub receipt: Option<String>,
    pub note: Option<String>,
    pub paid: bool,
    pub delivered: bool,
    pub created_at: DateTime<Utc>,
}

/// One product-quantity-price record within an order. `unit_price` is the
/// snapshot taken when the order was placed, independent of later catalog
/// price changes.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct OrderItem {
    pub id: i64,
    pub order_id: i64,
    pub product_id: i64,
    pub product_name: String,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

/// An order joined with its line items, as returned by the API.
#[derive(Debug, Clone, Serialize)]
pub struct OrderRecord {
    #[serde(flatten)]
    pub order: Order,
    pub items: Vec<OrderItem>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub display_name: Option<String>,
    pub role: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethod {
    Cash,
    Transfer,
}

impl PaymentMethod {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "cash" => Some(Self::Cash),
            "transfer" => Some(Self::Transfer),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cash => "cash",
            Self::Transfer => "transfer",
        }
    }
}

/// Incoming order payload. Arrives either as a JSON body or as multipart
/// form fields, in which case `items` is a JSON string and `receipt` holds
/// the uploaded file. Validation happens in `orders::validate_draft`.
#[derive(Debug, Default, Deserialize)]
pub struct OrderDraft {
    pub buyer_name: Option<String>,
    pub buyer_phone: Option<String>,
    #[serde(alias = "table")]
    pub table_number: Option<i64>,
    pub payment_method: Option<String>,
    pub items: Option<serde_json::Value>,
    pub note: Option<String>,
    /// MIME type and raw bytes of the uploaded receipt, multipart only.
    #[serde(skip)]
    pub receipt: Option<(String, Vec<u8>)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DraftItem {
    pub product_id: i64,
    pub quantity: i64,
}

/// Replacement line item for `PUT /orders/{id}/items`. Unit price and
/// subtotal come precomputed from the caller and are stored verbatim.
#[derive(Debug, Clone, Deserialize)]
pub struct ReplacementItem {
    pub product_id: i64,
    pub quantity: i64,
    pub unit_price: f64,
    pub subtotal: f64,
}

#[derive(Debug, Deserialize)]
pub struct ReplaceItemsPayload {
    pub items: Vec<ReplacementItem>,
}

#[derive(Debug, Deserialize)]
pub struct StatusUpdate {
    pub paid: Option<bool>,
    pub delivered: Option<bool>,
}

/// Partial buyer-info edit; unset fields are left unchanged.
#[derive(Debug, Deserialize)]
pub struct BuyerUpdate {
    pub buyer_name: Option<String>,
    pub buyer_phone: Option<String>,
    #[serde(alias = "table")]
    pub table_number: Option<i64>,
    pub note: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub stock: i64,
    pub category: String,
    pub subcategory: Option<String>,
    pub image: Option<String>,
}

/// Partial product edit; unset fields are left unchanged.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub stock: Option<i64>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub available: Option<bool>,
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoginPayload {
    pub username: String,
    pub password: String,
}
