use async_trait::async_trait;

use crate::error::ProviderError;
use crate::types::DailyBar;

/// External source of daily price history.
///
/// Implementations return bars ordered by date, oldest first, covering at
/// least `lookback_days` calendar days when the provider has them.
#[async_trait]
pub trait MarketDataProvider: Send + Sync {
    async fn fetch(&self, ticker: &str, lookback_days: u32) -> Result<Vec<DailyBar>, ProviderError>;
}
