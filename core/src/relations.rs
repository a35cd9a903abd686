//! The nine source relations, one typed row struct each.
//!
//! Field names follow the source column names so a relation file
//! deserializes without renames. Every join key is optional: the source
//! data is tabular and nulls are common.

use crate::calendar::parse_timestamp;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Relation {
    Customers,
    Geolocation,
    Orders,
    OrderItems,
    Payments,
    Reviews,
    Products,
    Sellers,
    CategoryTranslation,
}

impl Relation {
    pub const ALL: [Relation; 9] = [
        Self::Customers,
        Self::Geolocation,
        Self::Orders,
        Self::OrderItems,
        Self::Payments,
        Self::Reviews,
        Self::Products,
        Self::Sellers,
        Self::CategoryTranslation,
    ];

    /// Stable relation name; also the file stem used by `JsonDirSource`.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Geolocation => "geolocation",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
            Self::Payments => "order_payments",
            Self::Reviews => "order_reviews",
            Self::Products => "products",
            Self::Sellers => "sellers",
            Self::CategoryTranslation => "product_category_name_translation",
        }
    }

    /// Columns the join and the engines cannot do without.
    pub fn required_columns(&self) -> &'static [&'static str] {
        match self {
            Self::Customers => &["customer_id", "customer_unique_id", "customer_state"],
            Self::Geolocation => &["geolocation_zip_code_prefix"],
            Self::Orders => &["order_id", "customer_id", "order_purchase_timestamp"],
            Self::OrderItems => &["order_id", "product_id", "seller_id"],
            Self::Payments => &["order_id", "payment_sequential", "payment_value"],
            Self::Reviews => &["order_id"],
            Self::Products => &["product_id", "product_category_name"],
            Self::Sellers => &["seller_id"],
            Self::CategoryTranslation => &["product_category_name"],
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Customer {
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub customer_unique_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub customer_zip_code_prefix: Option<String>,
    #[serde(default)]
    pub customer_city: Option<String>,
    #[serde(default)]
    pub customer_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Geolocation {
    #[serde(default, deserialize_with = "lenient_string")]
    pub geolocation_zip_code_prefix: Option<String>,
    #[serde(default)]
    pub geolocation_lat: Option<f64>,
    #[serde(default)]
    pub geolocation_lng: Option<f64>,
    #[serde(default)]
    pub geolocation_city: Option<String>,
    #[serde(default)]
    pub geolocation_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub customer_id: Option<String>,
    #[serde(default)]
    pub order_status: Option<String>,
    #[serde(default, deserialize_with = "timestamp")]
    pub order_purchase_timestamp: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderItem {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub order_item_id: Option<u32>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default)]
    pub price: Option<f64>,
    #[serde(default)]
    pub freight_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Payment {
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub payment_sequential: Option<u32>,
    #[serde(default)]
    pub payment_type: Option<String>,
    #[serde(default)]
    pub payment_installments: Option<u32>,
    #[serde(default)]
    pub payment_value: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Review {
    #[serde(default)]
    pub review_id: Option<String>,
    #[serde(default)]
    pub order_id: Option<String>,
    #[serde(default)]
    pub review_score: Option<u8>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Product {
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub product_category_name: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Seller {
    #[serde(default)]
    pub seller_id: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub seller_zip_code_prefix: Option<String>,
    #[serde(default)]
    pub seller_city: Option<String>,
    #[serde(default)]
    pub seller_state: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CategoryTranslation {
    #[serde(default)]
    pub product_category_name: Option<String>,
    #[serde(default)]
    pub product_category_name_english: Option<String>,
}

/// One loaded snapshot of all nine relations.
#[derive(Debug, Clone, Default)]
pub struct Relations {
    pub customers: Vec<Customer>,
    pub geolocation: Vec<Geolocation>,
    pub orders: Vec<Order>,
    pub items: Vec<OrderItem>,
    pub payments: Vec<Payment>,
    pub reviews: Vec<Review>,
    pub products: Vec<Product>,
    pub sellers: Vec<Seller>,
    pub category_translation: Vec<CategoryTranslation>,
}

impl Relations {
    pub fn row_count(&self, relation: Relation) -> usize {
        match relation {
            Relation::Customers => self.customers.len(),
            Relation::Geolocation => self.geolocation.len(),
            Relation::Orders => self.orders.len(),
            Relation::OrderItems => self.items.len(),
            Relation::Payments => self.payments.len(),
            Relation::Reviews => self.reviews.len(),
            Relation::Products => self.products.len(),
            Relation::Sellers => self.sellers.len(),
            Relation::CategoryTranslation => self.category_translation.len(),
        }
    }
}

/// Zip prefixes arrive as numbers or strings depending on the exporter.
fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    let value = Option::<serde_json::Value>::deserialize(d)?;
    Ok(match value {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(s)) => Some(s),
        Some(other) => Some(other.to_string()),
    })
}

fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDateTime>, D::Error> {
    match Option::<String>::deserialize(d)? {
        None => Ok(None),
        Some(raw) => parse_timestamp(&raw).map_err(serde::de::Error::custom),
    }
}
