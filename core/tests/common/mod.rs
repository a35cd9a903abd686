#![allow(dead_code)]

use chrono::NaiveDateTime;
use segment_core::{
    join::{assemble, FactTable},
    relations::{
        CategoryTranslation, Customer, Order, OrderItem, Payment, Product, Relations, Review,
        Seller,
    },
};

pub fn ts(raw: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").expect("test timestamp")
}

/// Builds a small consistent snapshot: one product, one seller, and
/// orders added one at a time.
pub struct ShopBuilder {
    relations: Relations,
    next_order: usize,
}

impl ShopBuilder {
    pub fn new() -> Self {
        let mut relations = Relations::default();
        relations.products.push(Product {
            product_id: Some("p1".into()),
            product_category_name: Some("beleza_saude".into()),
        });
        relations.sellers.push(Seller {
            seller_id: Some("s1".into()),
            seller_state: Some("SP".into()),
            ..Seller::default()
        });
        relations.category_translation.push(CategoryTranslation {
            product_category_name: Some("beleza_saude".into()),
            product_category_name_english: Some("health_beauty".into()),
        });
        Self { relations, next_order: 0 }
    }

    /// One order with one item and one payment of `value`. Returns the order id.
    pub fn order(&mut self, customer: &str, state: &str, when: &str, value: f64) -> String {
        self.next_order += 1;
        let order_id = format!("o{:03}", self.next_order);
        let customer_id = format!("c{:03}", self.next_order);

        self.relations.customers.push(Customer {
            customer_id: Some(customer_id.clone()),
            customer_unique_id: Some(customer.into()),
            customer_state: Some(state.into()),
            ..Customer::default()
        });
        self.relations.orders.push(Order {
            order_id: Some(order_id.clone()),
            customer_id: Some(customer_id),
            order_status: Some("delivered".into()),
            order_purchase_timestamp: Some(ts(when)),
        });
        self.relations.items.push(OrderItem {
            order_id: Some(order_id.clone()),
            order_item_id: Some(1),
            product_id: Some("p1".into()),
            seller_id: Some("s1".into()),
            price: Some(value),
            freight_value: Some(0.0),
        });
        self.relations.payments.push(Payment {
            order_id: Some(order_id.clone()),
            payment_sequential: Some(1),
            payment_type: Some("credit_card".into()),
            payment_installments: Some(1),
            payment_value: Some(value),
        });
        order_id
    }

    pub fn extra_item(&mut self, order_id: &str, item_seq: u32) -> &mut Self {
        self.relations.items.push(OrderItem {
            order_id: Some(order_id.into()),
            order_item_id: Some(item_seq),
            product_id: Some("p1".into()),
            seller_id: Some("s1".into()),
            price: Some(1.0),
            freight_value: Some(0.0),
        });
        self
    }

    pub fn extra_payment(&mut self, order_id: &str, seq: u32, value: f64) -> &mut Self {
        self.relations.payments.push(Payment {
            order_id: Some(order_id.into()),
            payment_sequential: Some(seq),
            payment_type: Some("voucher".into()),
            payment_installments: Some(1),
            payment_value: Some(value),
        });
        self
    }

    pub fn review(&mut self, order_id: &str, score: u8) -> &mut Self {
        let n = self.relations.reviews.len() + 1;
        self.relations.reviews.push(Review {
            review_id: Some(format!("r{n:03}")),
            order_id: Some(order_id.into()),
            review_score: Some(score),
        });
        self
    }

    pub fn relations(&self) -> Relations {
        self.relations.clone()
    }

    pub fn facts(&self) -> FactTable {
        assemble(&self.relations).expect("assemble fixture")
    }
}
