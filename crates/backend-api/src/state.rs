use std::{collections::HashMap, sync::Arc, time::Duration as StdDuration, time::Instant};

use axum::http::HeaderMap;
use gatehouse_auth::{Authenticator, Claims};
use gatehouse_config::AppConfig;
use gatehouse_database::{SettingsRepository, User};
use gatehouse_mailer::Mailer;
use sqlx::SqlitePool;
use tokio::sync::Mutex;

use crate::{util, ApiError};

/// The slice of [`AppConfig`] the HTTP layer needs at request time.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub cors_origin: Option<String>,
    pub link_base_url: String,
    pub rate_limit_window_seconds: u64,
    pub rate_limit_max_requests: u32,
}

impl ApiConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            cors_origin: config.http.cors_origin.clone(),
            link_base_url: config.smtp.link_base_url.clone(),
            rate_limit_window_seconds: config.rate_limit.window_seconds,
            rate_limit_max_requests: config.rate_limit.max_requests,
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cors_origin: None,
            link_base_url: "http://localhost:5173".to_string(),
            rate_limit_window_seconds: 60,
            rate_limit_max_requests: 30,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pool: SqlitePool,
    authenticator: Authenticator,
    settings: SettingsRepository,
    mailer: Arc<dyn Mailer>,
    rate_limiter: RateLimiter,
    api_config: ApiConfig,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        authenticator: Authenticator,
        settings: SettingsRepository,
        mailer: Arc<dyn Mailer>,
        api_config: ApiConfig,
    ) -> Self {
        let rate_limiter = RateLimiter::new(
            StdDuration::from_secs(api_config.rate_limit_window_seconds),
            api_config.rate_limit_max_requests,
        );

        Self {
            pool,
            authenticator,
            settings,
            mailer,
            rate_limiter,
            api_config,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn authenticator(&self) -> &Authenticator {
        &self.authenticator
    }

    pub fn settings(&self) -> &SettingsRepository {
        &self.settings
    }

    pub fn mailer(&self) -> &dyn Mailer {
        self.mailer.as_ref()
    }

    pub fn api_config(&self) -> &ApiConfig {
        &self.api_config
    }

    pub async fn authenticate(&self, token: &str) -> Result<(User, Claims), ApiError> {
        self.authenticator
            .authenticate(token)
            .await
            .map_err(ApiError::from)
    }

    pub async fn enforce_rate_limit(&self, headers: &HeaderMap) -> Result<(), ApiError> {
        let key = util::client_key(headers);
        if self.rate_limiter.check(&key).await {
            Ok(())
        } else {
            Err(ApiError::rate_limited())
        }
    }
}

/// Fixed-window request counter, one window per client key. Windows live in
/// memory; a restart clears them.
#[derive(Clone)]
pub struct RateLimiter {
    inner: Arc<Mutex<HashMap<String, Window>>>,
    window: StdDuration,
    max_requests: u32,
}

struct Window {
    started: Instant,
    count: u32,
}

impl RateLimiter {
    pub fn new(window: StdDuration, max_requests: u32) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            window,
            max_requests,
        }
    }

    /// Counts one request against `key`. Returns false once the current
    /// window is over budget.
    pub async fn check(&self, key: &str) -> bool {
        let mut guard = self.inner.lock().await;
        let now = Instant::now();
        Self::prune(&mut guard, self.window, now);

        let slot = guard.entry(key.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        if now.duration_since(slot.started) > self.window {
            slot.started = now;
            slot.count = 0;
        }
        slot.count += 1;

        slot.count <= self.max_requests
    }

    fn prune(map: &mut HashMap<String, Window>, window: StdDuration, now: Instant) {
        map.retain(|_, slot| now.duration_since(slot.started) <= window);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{sleep, Duration};

    #[tokio::test]
    async fn rate_limiter_allows_up_to_the_budget() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 3);

        assert!(limiter.check("1.2.3.4").await);
        assert!(limiter.check("1.2.3.4").await);
        assert!(limiter.check("1.2.3.4").await);
        assert!(!limiter.check("1.2.3.4").await);
    }

    #[tokio::test]
    async fn rate_limiter_keys_are_independent() {
        let limiter = RateLimiter::new(Duration::from_secs(60), 1);

        assert!(limiter.check("1.2.3.4").await);
        assert!(!limiter.check("1.2.3.4").await);
        assert!(limiter.check("5.6.7.8").await);
    }

    #[tokio::test]
    async fn rate_limiter_window_resets() {
        let limiter = RateLimiter::new(Duration::from_millis(20), 1);

        assert!(limiter.check("1.2.3.4").await);
        assert!(!limiter.check("1.2.3.4").await);

        sleep(Duration::from_millis(40)).await;

        assert!(limiter.check("1.2.3.4").await);
    }
}
