//! Tabular query access to the telemetry warehouse.
//!
//! [`TabularQuery`] is the narrow interface the analyst tools depend on;
//! [`BigQueryClient`] implements it over the BigQuery REST API.

pub mod client;
pub mod convert;
pub mod queries;

pub use client::{BigQueryClient, ParamValue, QueryParam, Row, TabularQuery, WarehouseError};
