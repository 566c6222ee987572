//! Client for the backend's summary endpoint.

pub mod client;
pub mod error;

pub use client::{SummaryClient, SummaryConfig, SummaryResponse};
pub use error::SummaryError;
