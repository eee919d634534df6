//! HTTP client for the yard-sale listings API.

pub mod client;
pub mod error;
pub(crate) mod retry;
pub mod types;

pub use client::SalesClient;
pub use error::ClientError;
