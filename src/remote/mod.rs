//! # 3scale Admin API
//!
//! The remote side of reconciliation: the [`AdminApi`] contract, its HTTP
//! implementation and the entity types exchanged with 3scale.

mod api;
mod client;
mod error;
pub mod types;

pub use api::AdminApi;
pub use client::ThreescaleClient;
pub use error::ApiError;
pub use paths::Scope;
