//! segment-core: customer-behavior analytics over a marketplace order history.
//!
//! Pipeline: record source → join assembler → {segmentation, cohort,
//! timeline} engines → artifact cache. The orchestrator runs engines as
//! background tasks; the service reads whatever the cache holds.

pub mod cache;
pub mod calendar;
pub mod cohort;
pub mod config;
pub mod error;
pub mod join;
pub mod orchestrator;
pub mod relations;
pub mod segmentation;
pub mod service;
pub mod source;
pub mod store;
pub mod synthetic;
pub mod timeline;
pub mod types;
pub mod worker;
