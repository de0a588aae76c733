use sqlx::MySqlPool;

use crate::repositories::RateLimitRepository;

/// Rate limit configuration for an endpoint class.
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub max_requests: i32,
    pub window_seconds: i64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_requests: 60,
            window_seconds: 60,
        }
    }
}

impl RateLimitConfig {
    /// Token endpoint: 30 requests per minute per client/IP.
    pub fn token() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
        }
    }

    /// Authorize endpoint: 30 requests per minute.
    pub fn authorize() -> Self {
        Self {
            max_requests: 30,
            window_seconds: 60,
        }
    }

    /// Login: 5 attempts per minute.
    pub fn login() -> Self {
        Self {
            max_requests: 5,
            window_seconds: 60,
        }
    }

    /// Registration: 3 attempts per minute.
    pub fn register() -> Self {
        Self {
            max_requests: 3,
            window_seconds: 60,
        }
    }

    /// Introspection/revocation: 120 requests per minute.
    pub fn introspect() -> Self {
        Self {
            max_requests: 120,
            window_seconds: 60,
        }
    }
}

/// Outcome of a rate-limit check.
#[derive(Debug, Clone)]
pub struct RateLimitResult {
    pub allowed: bool,
    pub current_count: i32,
    pub remaining: i32,
    pub retry_after_seconds: Option<i64>,
}

/// Fixed-window rate limiter over per-key counters with TTL semantics.
#[derive(Clone)]
pub struct RateLimiterService {
    repo: RateLimitRepository,
}

impl RateLimiterService {
    pub fn new(pool: MySqlPool) -> Self {
        Self {
            repo: RateLimitRepository::new(pool),
        }
    }

    /// Count this request against the window and report whether it may
    /// proceed.
    pub async fn check_and_increment(
        &self,
        identifier: &str,
        endpoint: &str,
        config: &RateLimitConfig,
    ) -> Result<RateLimitResult, sqlx::Error> {
        let count = self
            .repo
            .increment(identifier, endpoint, config.window_seconds)
            .await?;

        let allowed = count <= config.max_requests;
        let remaining = (config.max_requests - count).max(0);

        let retry_after = if !allowed {
            match self.repo.window_start(identifier, endpoint).await? {
                Some(window_start) => {
                    let window_end =
                        window_start + chrono::Duration::seconds(config.window_seconds);
                    let now = chrono::Utc::now();
                    Some((window_end - now).num_seconds().max(0))
                }
                None => Some(config.window_seconds),
            }
        } else {
            None
        };

        Ok(RateLimitResult {
            allowed,
            current_count: count,
            remaining,
            retry_after_seconds: retry_after,
        })
    }

    pub async fn reset(&self, identifier: &str, endpoint: &str) -> Result<(), sqlx::Error> {
        self.repo.reset(identifier, endpoint).await
    }

    /// Key format: prefer the authenticated principal, fall back to IP.
    pub fn identifier(ip: Option<&str>, principal: Option<&str>) -> String {
        match (ip, principal) {
            (Some(ip), Some(p)) => format!("{}:{}", ip, p),
            (Some(ip), None) => ip.to_string(),
            (None, Some(p)) => p.to_string(),
            (None, None) => "unknown".to_string(),
        }
    }

    pub async fn cleanup(&self, older_than_seconds: i64) -> Result<u64, sqlx::Error> {
        self.repo.delete_stale(older_than_seconds).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_combinations() {
        assert_eq!(
            RateLimiterService::identifier(Some("10.0.0.1"), Some("web-app")),
            "10.0.0.1:web-app"
        );
        assert_eq!(RateLimiterService::identifier(Some("10.0.0.1"), None), "10.0.0.1");
        assert_eq!(RateLimiterService::identifier(None, Some("web-app")), "web-app");
        assert_eq!(RateLimiterService::identifier(None, None), "unknown");
    }

    #[test]
    fn presets_are_sane() {
        assert!(RateLimitConfig::login().max_requests < RateLimitConfig::token().max_requests);
        assert!(RateLimitConfig::register().max_requests <= RateLimitConfig::login().max_requests);
        assert!(RateLimitConfig::introspect().max_requests >= RateLimitConfig::token().max_requests);
    }
}
