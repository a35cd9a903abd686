//! Record sources: where a run's snapshot of the nine relations comes from.
//!
//! RULE: Engines never read files. Every run calls `RecordSource::load()`
//! once and works on the returned snapshot.

use crate::{
    error::{AnalyticsError, AnalyticsResult},
    relations::{Relation, Relations},
};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

pub trait RecordSource: Send + Sync {
    /// Load a fresh, independent snapshot of all nine relations.
    fn load(&self) -> AnalyticsResult<Relations>;
}

/// Reads `{dir}/{relation}.json`, each a JSON array of row objects.
pub struct JsonDirSource {
    dir: PathBuf,
}

impl JsonDirSource {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf() }
    }

    fn read_relation<T: DeserializeOwned>(&self, relation: Relation) -> AnalyticsResult<Vec<T>> {
        let path = self.dir.join(format!("{}.json", relation.name()));
        let content = std::fs::read_to_string(&path).map_err(|e| AnalyticsError::Schema {
            relation: relation.name(),
            detail: format!("cannot read {}: {e}", path.display()),
        })?;
        let rows: Vec<serde_json::Value> = serde_json::from_str(&content)?;
        check_columns(relation, &rows)?;

        let typed = rows
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<Vec<T>, _>>()?;
        log::debug!("loader: {} rows from {}", typed.len(), path.display());
        Ok(typed)
    }
}

impl RecordSource for JsonDirSource {
    fn load(&self) -> AnalyticsResult<Relations> {
        let relations = Relations {
            customers: self.read_relation(Relation::Customers)?,
            geolocation: self.read_relation(Relation::Geolocation)?,
            orders: self.read_relation(Relation::Orders)?,
            items: self.read_relation(Relation::OrderItems)?,
            payments: self.read_relation(Relation::Payments)?,
            reviews: self.read_relation(Relation::Reviews)?,
            products: self.read_relation(Relation::Products)?,
            sellers: self.read_relation(Relation::Sellers)?,
            category_translation: self.read_relation(Relation::CategoryTranslation)?,
        };
        log::info!(
            "loader: loaded {} orders, {} customers from {}",
            relations.orders.len(),
            relations.customers.len(),
            self.dir.display()
        );
        Ok(relations)
    }
}

/// A required column that no row carries means the export is broken, not
/// that the data happens to be sparse.
fn check_columns(relation: Relation, rows: &[serde_json::Value]) -> AnalyticsResult<()> {
    if rows.is_empty() {
        return Ok(());
    }
    for column in relation.required_columns() {
        let present = rows
            .iter()
            .any(|row| row.as_object().is_some_and(|obj| obj.contains_key(*column)));
        if !present {
            return Err(AnalyticsError::Schema {
                relation: relation.name(),
                detail: format!("missing required column '{column}'"),
            });
        }
    }
    Ok(())
}

/// A fixed snapshot held in memory. Each `load()` hands out a clone.
pub struct InMemorySource {
    relations: Relations,
}

impl InMemorySource {
    pub fn new(relations: Relations) -> Self {
        Self { relations }
    }
}

impl RecordSource for InMemorySource {
    fn load(&self) -> AnalyticsResult<Relations> {
        Ok(self.relations.clone())
    }
}
