//! Client for the OpenSea collection-stats API.
//!
//! Provides an HTTP client that retrieves the current floor price of a
//! collection and wraps it as a [`FloorPriceQuote`].
mod error;
mod http;

pub use error::Error;
pub use http::{FloorPriceQuote, HttpClient, MARKETPLACE};

pub type Result<T> = std::result::Result<T, Error>;
