//! Deterministic synthetic marketplace data.
//!
//! RULE: the same seed and shape always produce the same relations.
//! Each generated relation draws from its own RNG stream, seeded from
//! (seed XOR stream index). Changing how one relation is generated never
//! shifts the rows of another.

use crate::{
    error::AnalyticsResult,
    relations::{
        CategoryTranslation, Customer, Geolocation, Order, OrderItem, Payment, Product,
        Relations, Review, Seller,
    },
    source::RecordSource,
};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64Mcg;

const STATES: [(&str, &str); 7] = [
    ("SP", "sao paulo"),
    ("RJ", "rio de janeiro"),
    ("MG", "belo horizonte"),
    ("RS", "porto alegre"),
    ("PR", "curitiba"),
    ("SC", "florianopolis"),
    ("BA", "salvador"),
];

const CATEGORIES: [(&str, &str); 6] = [
    ("beleza_saude", "health_beauty"),
    ("informatica_acessorios", "computers_accessories"),
    ("moveis_decoracao", "furniture_decor"),
    ("esporte_lazer", "sports_leisure"),
    ("utilidades_domesticas", "housewares"),
    ("brinquedos", "toys"),
];

/// How much data to generate.
#[derive(Debug, Clone)]
pub struct SyntheticShape {
    pub customers: usize,
    pub products: usize,
    pub sellers: usize,
    /// First day orders may be placed.
    pub start: NaiveDate,
    /// Length of the ordering window, in days.
    pub span_days: i64,
}

impl Default for SyntheticShape {
    fn default() -> Self {
        Self {
            customers: 200,
            products: 40,
            sellers: 12,
            start: NaiveDate::from_ymd_opt(2017, 1, 1).unwrap_or_default(),
            span_days: 540,
        }
    }
}

pub struct SyntheticSource {
    seed: u64,
    shape: SyntheticShape,
}

impl SyntheticSource {
    pub fn new(seed: u64, shape: SyntheticShape) -> Self {
        Self { seed, shape }
    }
}

impl RecordSource for SyntheticSource {
    fn load(&self) -> AnalyticsResult<Relations> {
        let relations = generate(self.seed, &self.shape);
        log::info!(
            "synthetic: seed={} generated {} orders for {} customers",
            self.seed,
            relations.orders.len(),
            self.shape.customers
        );
        Ok(relations)
    }
}

// ── Streams ────────────────────────────────────────────────────────

/// Stable stream assignments. Append only: reordering reseeds everything.
#[derive(Clone, Copy)]
#[repr(u64)]
enum Stream {
    Catalog = 0,
    Customers = 1,
    Orders = 2,
    Payments = 3,
    Reviews = 4,
}

struct StreamRng {
    inner: Pcg64Mcg,
}

impl StreamRng {
    fn new(seed: u64, stream: Stream) -> Self {
        let derived = seed ^ (stream as u64).wrapping_mul(0x9e37_79b9_7f4a_7c15);
        Self { inner: Pcg64Mcg::seed_from_u64(derived) }
    }

    fn below(&mut self, n: usize) -> usize {
        if n == 0 {
            return 0;
        }
        self.inner.gen_range(0..n)
    }

    fn chance(&mut self, p: f64) -> bool {
        self.inner.gen::<f64>() < p
    }

    /// Heavy-tailed amount; a few customers spend far more than the rest.
    fn pareto(&mut self, x_min: f64, alpha: f64) -> f64 {
        let u = self.inner.gen::<f64>().max(1e-10);
        x_min * u.powf(-1.0 / alpha)
    }
}

fn cents(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

// ── Generation ─────────────────────────────────────────────────────

pub fn generate(seed: u64, shape: &SyntheticShape) -> Relations {
    let mut catalog = StreamRng::new(seed, Stream::Catalog);
    let mut people = StreamRng::new(seed, Stream::Customers);
    let mut ordering = StreamRng::new(seed, Stream::Orders);
    let mut paying = StreamRng::new(seed, Stream::Payments);
    let mut reviewing = StreamRng::new(seed, Stream::Reviews);

    let mut out = Relations::default();

    out.category_translation = CATEGORIES
        .iter()
        .map(|(code, english)| CategoryTranslation {
            product_category_name: Some(code.to_string()),
            product_category_name_english: Some(english.to_string()),
        })
        .collect();

    out.products = (0..shape.products)
        .map(|i| Product {
            product_id: Some(format!("p{i:04}")),
            product_category_name: Some(CATEGORIES[catalog.below(CATEGORIES.len())].0.to_string()),
        })
        .collect();

    for i in 0..shape.sellers {
        let (state, city) = STATES[catalog.below(STATES.len())];
        out.sellers.push(Seller {
            seller_id: Some(format!("s{i:03}")),
            seller_zip_code_prefix: Some(format!("{:05}", 10_000 + catalog.below(80_000))),
            seller_city: Some(city.to_string()),
            seller_state: Some(state.to_string()),
        });
    }

    out.geolocation = STATES
        .iter()
        .enumerate()
        .map(|(i, (state, city))| Geolocation {
            geolocation_zip_code_prefix: Some(format!("{:05}", 10_000 * (i + 1))),
            geolocation_lat: None,
            geolocation_lng: None,
            geolocation_city: Some(city.to_string()),
            geolocation_state: Some(state.to_string()),
        })
        .collect();

    let window_start = NaiveDateTime::new(shape.start, NaiveTime::default());
    let window_secs = (shape.span_days.max(1) * 86_400) as usize;
    let mut order_seq = 0usize;

    for c in 0..shape.customers {
        let unique_id = format!("cu{c:05}");
        let (state, city) = STATES[people.below(STATES.len())];
        let zip = format!("{:05}", 10_000 + people.below(80_000));

        // Most marketplace customers buy exactly once.
        let order_count = if people.chance(0.7) { 1 } else { 2 + people.below(3) };
        let mut placed_at = window_start + Duration::seconds(ordering.below(window_secs) as i64);

        for _ in 0..order_count {
            order_seq += 1;
            let order_id = format!("o{order_seq:06}");
            let customer_id = format!("c{order_seq:06}");

            out.customers.push(Customer {
                customer_id: Some(customer_id.clone()),
                customer_unique_id: Some(unique_id.clone()),
                customer_zip_code_prefix: Some(zip.clone()),
                customer_city: Some(city.to_string()),
                customer_state: Some(state.to_string()),
            });
            out.orders.push(Order {
                order_id: Some(order_id.clone()),
                customer_id: Some(customer_id),
                order_status: Some("delivered".to_string()),
                order_purchase_timestamp: Some(placed_at),
            });

            let mut order_total = 0.0;
            for item in 1..=(1 + ordering.below(3)) {
                let price = cents(ordering.pareto(15.0, 1.6).min(5_000.0));
                let freight = cents(5.0 + price * 0.08);
                order_total += price + freight;
                out.items.push(OrderItem {
                    order_id: Some(order_id.clone()),
                    order_item_id: Some(item as u32),
                    product_id: Some(format!("p{:04}", ordering.below(shape.products))),
                    seller_id: Some(format!("s{:03}", ordering.below(shape.sellers))),
                    price: Some(price),
                    freight_value: Some(freight),
                });
            }

            push_payments(&mut out.payments, &mut paying, &order_id, cents(order_total));

            if reviewing.chance(0.85) {
                out.reviews.push(Review {
                    review_id: Some(format!("r{order_seq:06}")),
                    order_id: Some(order_id),
                    review_score: Some(1 + reviewing.below(5) as u8),
                });
            }

            placed_at += Duration::seconds(86_400 * (7 + ordering.below(120)) as i64);
        }
    }

    out
}

/// One credit card payment, or occasionally a voucher covering part of it.
fn push_payments(payments: &mut Vec<Payment>, rng: &mut StreamRng, order_id: &str, total: f64) {
    if rng.chance(0.1) && total > 2.0 {
        let voucher = cents(total * 0.25);
        payments.push(Payment {
            order_id: Some(order_id.to_string()),
            payment_sequential: Some(1),
            payment_type: Some("voucher".to_string()),
            payment_installments: Some(1),
            payment_value: Some(voucher),
        });
        payments.push(Payment {
            order_id: Some(order_id.to_string()),
            payment_sequential: Some(2),
            payment_type: Some("credit_card".to_string()),
            payment_installments: Some(1 + rng.below(6) as u32),
            payment_value: Some(cents(total - voucher)),
        });
    } else {
        payments.push(Payment {
            order_id: Some(order_id.to_string()),
            payment_sequential: Some(1),
            payment_type: Some("credit_card".to_string()),
            payment_installments: Some(1 + rng.below(6) as u32),
            payment_value: Some(total),
        });
    }
}
