use sqlx::MySqlPool;
use std::time::Duration;

use crate::repositories::{
    AccessTokenRepository, AuthorizationCodeRepository, BlacklistRepository, RateLimitRepository,
    RefreshTokenRepository,
};

/// Periodic purge of rows whose lifetime has passed: authorization codes,
/// tokens, blacklist entries and stale rate-limit windows.
pub async fn run_cleanup_loop(pool: MySqlPool, interval_secs: u64) {
    let codes = AuthorizationCodeRepository::new(pool.clone());
    let access = AccessTokenRepository::new(pool.clone());
    let refresh = RefreshTokenRepository::new(pool.clone());
    let blacklist = BlacklistRepository::new(pool.clone());
    let rate_limits = RateLimitRepository::new(pool);

    let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs.max(30)));
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        ticker.tick().await;

        let mut purged = 0u64;
        match codes.delete_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!(error = %e, "code cleanup failed"),
        }
        match access.delete_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!(error = %e, "access token cleanup failed"),
        }
        match refresh.delete_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!(error = %e, "refresh token cleanup failed"),
        }
        match blacklist.delete_expired().await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!(error = %e, "blacklist cleanup failed"),
        }
        // Keep windows around for a day so Retry-After stays accurate near
        // the boundary.
        match rate_limits.delete_stale(86_400).await {
            Ok(n) => purged += n,
            Err(e) => tracing::warn!(error = %e, "rate limit cleanup failed"),
        }

        if purged > 0 {
            tracing::debug!(purged = purged, "expired rows purged");
        }
    }
}
