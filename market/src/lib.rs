//! Market data for the signal pipeline.
//!
//! Data flow:
//! Provider → MarketDataCache (TTL, single-flight, stale grace)
//!   → compute_features → MarketFeatureSnapshot

pub mod cache;
pub mod error;
pub mod features;
pub mod http;
pub mod provider;
pub mod types;

pub use cache::{CacheConfig, MarketDataCache};
pub use error::{MarketDataError, ProviderError};
pub use features::{FeatureConfig, compute_features};
pub use http::HttpChartProvider;
pub use provider::MarketDataProvider;
pub use types::{CacheKey, DailyBar, DataKind, MarketFeatureSnapshot};
