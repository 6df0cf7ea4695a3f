pub mod client;
pub mod error;
pub mod types;

pub use client::MarketplaceClient;
pub use error::MarketplaceError;
pub use types::*;
