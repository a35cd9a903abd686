//! Join assembler: nine relations in, one denormalized fact table out.
//!
//! JOIN SEQUENCE (fixed, never reordered):
//!
//! ```text
//!   1. orders   ⟕ items               on order_id
//!   2.          ⟗ payments            on order_id   (many-to-many)
//!   3.          ⟗ reviews             on order_id
//!   4.          ⟗ products            on product_id
//!   5.          ⟗ customers           on customer_id
//!   6.          ⟗ sellers             on seller_id
//!   7.          ⟕ category translation on product_category_name
//! ```
//!
//! RULES:
//!   - Every stage consumes the previous table and returns a new one.
//!     Input relations are never mutated.
//!   - Null keys never match.
//!   - Outer joins append unmatched right rows after all left rows,
//!     in right-input order, so output order is deterministic.
//!   - Rows without a customer identity are dropped at the end.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    relations::{Payment, Relation, Relations},
    types::{CustomerId, OrderId},
};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One (order, item, payment, review) combination with its enrichments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FactRow {
    pub order_id: Option<OrderId>,
    pub order_status: Option<String>,
    pub order_purchase_timestamp: Option<NaiveDateTime>,
    pub order_item_id: Option<u32>,
    pub product_id: Option<String>,
    pub price: Option<f64>,
    pub freight_value: Option<f64>,
    pub payment_sequential: Option<u32>,
    /// Position of the payment in the payments relation.
    pub payment_row: Option<usize>,
    pub payment_type: Option<String>,
    pub payment_installments: Option<u32>,
    pub payment_value: Option<f64>,
    pub review_id: Option<String>,
    pub review_score: Option<u8>,
    pub product_category_name: Option<String>,
    pub product_category_name_english: Option<String>,
    pub customer_id: Option<String>,
    pub customer_unique_id: CustomerId,
    pub customer_city: Option<String>,
    pub customer_state: Option<String>,
    pub seller_id: Option<String>,
    pub seller_state: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct FactTable {
    pub rows: Vec<FactRow>,
}

impl FactTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Latest purchase timestamp in the table, used as the recency reference.
    pub fn max_purchase_timestamp(&self) -> Option<NaiveDateTime> {
        self.rows.iter().filter_map(|r| r.order_purchase_timestamp).max()
    }
}

/// Join stage row: same shape as `FactRow` but identity not yet resolved.
#[derive(Debug, Clone, Default)]
struct WideRow {
    order_id: Option<String>,
    order_status: Option<String>,
    order_purchase_timestamp: Option<NaiveDateTime>,
    order_item_id: Option<u32>,
    product_id: Option<String>,
    price: Option<f64>,
    freight_value: Option<f64>,
    payment_sequential: Option<u32>,
    payment_row: Option<usize>,
    payment_type: Option<String>,
    payment_installments: Option<u32>,
    payment_value: Option<f64>,
    review_id: Option<String>,
    review_score: Option<u8>,
    product_category_name: Option<String>,
    product_category_name_english: Option<String>,
    customer_id: Option<String>,
    customer_unique_id: Option<String>,
    customer_city: Option<String>,
    customer_state: Option<String>,
    seller_id: Option<String>,
    seller_state: Option<String>,
}

impl WideRow {
    fn into_fact(self) -> Option<FactRow> {
        let customer_unique_id = self.customer_unique_id.filter(|id| !id.is_empty())?;
        Some(FactRow {
            order_id: self.order_id,
            order_status: self.order_status,
            order_purchase_timestamp: self.order_purchase_timestamp,
            order_item_id: self.order_item_id,
            product_id: self.product_id,
            price: self.price,
            freight_value: self.freight_value,
            payment_sequential: self.payment_sequential,
            payment_row: self.payment_row,
            payment_type: self.payment_type,
            payment_installments: self.payment_installments,
            payment_value: self.payment_value,
            review_id: self.review_id,
            review_score: self.review_score,
            product_category_name: self.product_category_name,
            product_category_name_english: self.product_category_name_english,
            customer_id: self.customer_id,
            customer_unique_id,
            customer_city: self.customer_city,
            customer_state: self.customer_state,
            seller_id: self.seller_id,
            seller_state: self.seller_state,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JoinKind {
    Left,
    Outer,
}

/// Build the fact table from one snapshot of the relations.
pub fn assemble(relations: &Relations) -> AnalyticsResult<FactTable> {
    check_join_keys(relations)?;

    let base: Vec<WideRow> = relations
        .orders
        .iter()
        .map(|o| WideRow {
            order_id: o.order_id.clone(),
            customer_id: o.customer_id.clone(),
            order_status: o.order_status.clone(),
            order_purchase_timestamp: o.order_purchase_timestamp,
            ..WideRow::default()
        })
        .collect();

    let rows = join(
        base,
        &relations.items,
        JoinKind::Left,
        |w| w.order_id.as_deref(),
        |i| i.order_id.as_deref(),
        |w, i| {
            w.order_id = i.order_id.clone();
            w.order_item_id = i.order_item_id;
            w.product_id = i.product_id.clone();
            w.seller_id = i.seller_id.clone();
            w.price = i.price;
            w.freight_value = i.freight_value;
        },
    );

    let payments: Vec<(usize, &Payment)> = relations.payments.iter().enumerate().collect();
    let rows = join(
        rows,
        &payments,
        JoinKind::Outer,
        |w| w.order_id.as_deref(),
        |(_, p)| p.order_id.as_deref(),
        |w, (row, p)| {
            w.order_id = p.order_id.clone();
            w.payment_row = Some(*row);
            w.payment_sequential = p.payment_sequential;
            w.payment_type = p.payment_type.clone();
            w.payment_installments = p.payment_installments;
            w.payment_value = p.payment_value;
        },
    );

    let rows = join(
        rows,
        &relations.reviews,
        JoinKind::Outer,
        |w| w.order_id.as_deref(),
        |r| r.order_id.as_deref(),
        |w, r| {
            w.order_id = r.order_id.clone();
            w.review_id = r.review_id.clone();
            w.review_score = r.review_score;
        },
    );

    let rows = join(
        rows,
        &relations.products,
        JoinKind::Outer,
        |w| w.product_id.as_deref(),
        |p| p.product_id.as_deref(),
        |w, p| {
            w.product_id = p.product_id.clone();
            w.product_category_name = p.product_category_name.clone();
        },
    );

    let rows = join(
        rows,
        &relations.customers,
        JoinKind::Outer,
        |w| w.customer_id.as_deref(),
        |c| c.customer_id.as_deref(),
        |w, c| {
            w.customer_id = c.customer_id.clone();
            w.customer_unique_id = c.customer_unique_id.clone();
            w.customer_city = c.customer_city.clone();
            w.customer_state = c.customer_state.clone();
        },
    );

    let rows = join(
        rows,
        &relations.sellers,
        JoinKind::Outer,
        |w| w.seller_id.as_deref(),
        |s| s.seller_id.as_deref(),
        |w, s| {
            w.seller_id = s.seller_id.clone();
            w.seller_state = s.seller_state.clone();
        },
    );

    let rows = join(
        rows,
        &relations.category_translation,
        JoinKind::Left,
        |w| w.product_category_name.as_deref(),
        |t| t.product_category_name.as_deref(),
        |w, t| {
            w.product_category_name_english = t.product_category_name_english.clone();
        },
    );

    let joined = rows.len();
    let facts: Vec<FactRow> = rows.into_iter().filter_map(WideRow::into_fact).collect();
    let dropped = joined - facts.len();
    if dropped > 0 {
        log::debug!("join: dropped {dropped} rows without a customer identity");
    }
    log::info!("join: assembled {} fact rows", facts.len());

    Ok(FactTable { rows: facts })
}

fn join<R>(
    left: Vec<WideRow>,
    right: &[R],
    kind: JoinKind,
    left_key: impl Fn(&WideRow) -> Option<&str>,
    right_key: impl Fn(&R) -> Option<&str>,
    apply: impl Fn(&mut WideRow, &R),
) -> Vec<WideRow> {
    let mut index: HashMap<&str, Vec<usize>> = HashMap::new();
    for (i, r) in right.iter().enumerate() {
        if let Some(key) = right_key(r) {
            index.entry(key).or_default().push(i);
        }
    }

    let mut matched = vec![false; right.len()];
    let mut out = Vec::with_capacity(left.len());

    for row in left {
        let hits = left_key(&row).and_then(|key| index.get(key));
        match hits {
            Some(hits) => {
                for &i in hits {
                    let mut joined = row.clone();
                    apply(&mut joined, &right[i]);
                    matched[i] = true;
                    out.push(joined);
                }
            }
            None => out.push(row),
        }
    }

    if kind == JoinKind::Outer {
        for (r, _) in right.iter().zip(&matched).filter(|(_, m)| !**m) {
            let mut fresh = WideRow::default();
            apply(&mut fresh, r);
            out.push(fresh);
        }
    }

    out
}

/// Fail fast when a non-empty relation carries no value at all for a key
/// the join depends on.
fn check_join_keys(relations: &Relations) -> AnalyticsResult<()> {
    fn require<R>(
        relation: Relation,
        rows: &[R],
        column: &str,
        key: impl Fn(&R) -> Option<&str>,
    ) -> AnalyticsResult<()> {
        if rows.is_empty() || rows.iter().any(|r| key(r).is_some_and(|k| !k.is_empty())) {
            return Ok(());
        }
        Err(AnalyticsError::Schema {
            relation: relation.name(),
            detail: format!("join key '{column}' is absent from every row"),
        })
    }

    require(Relation::Orders, &relations.orders, "order_id", |o| o.order_id.as_deref())?;
    require(Relation::Orders, &relations.orders, "customer_id", |o| o.customer_id.as_deref())?;
    require(Relation::OrderItems, &relations.items, "order_id", |i| i.order_id.as_deref())?;
    require(Relation::OrderItems, &relations.items, "product_id", |i| i.product_id.as_deref())?;
    require(Relation::OrderItems, &relations.items, "seller_id", |i| i.seller_id.as_deref())?;
    require(Relation::Payments, &relations.payments, "order_id", |p| p.order_id.as_deref())?;
    require(Relation::Reviews, &relations.reviews, "order_id", |r| r.order_id.as_deref())?;
    require(Relation::Products, &relations.products, "product_id", |p| p.product_id.as_deref())?;
    require(Relation::Customers, &relations.customers, "customer_id", |c| c.customer_id.as_deref())?;
    require(Relation::Customers, &relations.customers, "customer_unique_id", |c| {
        c.customer_unique_id.as_deref()
    })?;
    require(Relation::Sellers, &relations.sellers, "seller_id", |s| s.seller_id.as_deref())?;
    require(Relation::CategoryTranslation, &relations.category_translation, "product_category_name", |t| {
        t.product_category_name.as_deref()
    })?;
    Ok(())
}
