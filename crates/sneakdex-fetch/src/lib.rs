//! Fetcher (§4.5): bounded-concurrency HTTP scraper.

pub mod fetch;
pub mod links;

pub use fetch::{Fetcher, FetcherConfig};
