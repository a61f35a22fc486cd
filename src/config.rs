use std::env;
use std::time::Duration;

/// Settings the checkout orchestrator needs to build a processor session.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Public storefront URL used for success/cancel redirects. Never taken from the request.
    pub base_url: String,
    pub currency: String,
    pub site_code: String,
    pub idempotency_window_secs: u64,
}

#[derive(Debug, Clone)]
pub struct StripeSettings {
    pub secret_key: String,
    pub webhook_secret: String,
    pub api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct OrdersSettings {
    pub base_url: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct NotifySettings {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub telegram_api_base: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub site_name: String,
    pub dev_mode: bool,
    pub checkout: CheckoutSettings,
    pub stripe: StripeSettings,
    pub orders: OrdersSettings,
    pub notify: NotifySettings,
    /// Seconds between background outbox retries. 0 disables the task.
    pub outbox_retry_interval_secs: u64,
    pub webhook_event_retention_days: i64,
    /// Per-IP requests per minute on order/checkout creation. 0 disables limiting.
    pub checkout_rate_limit_rpm: u32,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// First set, non-empty variable among `keys`.
fn env_first(keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| env::var(k).ok())
        .find(|v| !v.trim().is_empty())
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("APP_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env_or("HOST", "127.0.0.1");
        let port: u16 = env_parse("PORT", 3000);

        let base_url = env_first(&["PUBLIC_BASE_URL", "NEXT_PUBLIC_SITE_URL"])
            .unwrap_or_else(|| format!("http://{}:{}", host, port));
        let timeout = Duration::from_secs(env_parse("PROCESSOR_TIMEOUT_SECS", 10u64).max(1));

        Self {
            database_path: env_or("DATABASE_PATH", "boxoffice.db"),
            site_name: env_or("SITE_NAME", "Ticket Office"),
            dev_mode,
            checkout: CheckoutSettings {
                base_url: base_url.trim_end_matches('/').to_string(),
                currency: env_or("CURRENCY", "usd").to_lowercase(),
                site_code: env_or("SITE_CODE", "default"),
                idempotency_window_secs: env_parse("IDEMPOTENCY_WINDOW_SECS", 10u64).max(1),
            },
            stripe: StripeSettings {
                secret_key: env_or("STRIPE_SECRET_KEY", ""),
                webhook_secret: env_or("STRIPE_WEBHOOK_SECRET", ""),
                api_base: env_or("STRIPE_API_BASE", "https://api.stripe.com"),
                timeout,
            },
            orders: OrdersSettings {
                base_url: env_first(&["ORDERS_API_BASE_URL", "NEXT_PUBLIC_API_BASE_URL"])
                    .unwrap_or_else(|| "http://localhost:8000".to_string())
                    .trim_end_matches('/')
                    .to_string(),
                timeout,
            },
            notify: NotifySettings {
                telegram_bot_token: env_first(&["TELEGRAM_BOT_TOKEN"]),
                telegram_chat_id: env_first(&["TELEGRAM_CHAT_ID"]),
                telegram_api_base: env_or("TELEGRAM_API_BASE", "https://api.telegram.org"),
                timeout,
            },
            outbox_retry_interval_secs: env_parse("OUTBOX_RETRY_INTERVAL_SECS", 60),
            webhook_event_retention_days: env_parse("WEBHOOK_EVENT_RETENTION_DAYS", 90),
            checkout_rate_limit_rpm: env_parse("RATE_LIMIT_CHECKOUT_RPM", 10),
            host,
            port,
        }
    }

    /// Checks settings that have no safe default.
    ///
    /// Stripe credentials may be blank only in dev mode.
    pub fn validate(&self) -> Result<(), String> {
        if self.dev_mode {
            return Ok(());
        }
        if self.stripe.secret_key.is_empty() {
            return Err("STRIPE_SECRET_KEY must be set outside dev mode".to_string());
        }
        if self.stripe.webhook_secret.is_empty() {
            return Err("STRIPE_WEBHOOK_SECRET must be set outside dev mode".to_string());
        }
        Ok(())
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dev_mode: bool, secret_key: &str, webhook_secret: &str) -> Config {
        let timeout = Duration::from_secs(10);
        Config {
            host: "127.0.0.1".to_string(),
            port: 3000,
            database_path: ":memory:".to_string(),
            site_name: "Ticket Office".to_string(),
            dev_mode,
            checkout: CheckoutSettings {
                base_url: "https://tickets.example".to_string(),
                currency: "usd".to_string(),
                site_code: "default".to_string(),
                idempotency_window_secs: 10,
            },
            stripe: StripeSettings {
                secret_key: secret_key.to_string(),
                webhook_secret: webhook_secret.to_string(),
                api_base: "https://api.stripe.com".to_string(),
                timeout,
            },
            orders: OrdersSettings {
                base_url: "http://localhost:8000".to_string(),
                timeout,
            },
            notify: NotifySettings {
                telegram_bot_token: None,
                telegram_chat_id: None,
                telegram_api_base: "https://api.telegram.org".to_string(),
                timeout,
            },
            outbox_retry_interval_secs: 60,
            webhook_event_retention_days: 90,
            checkout_rate_limit_rpm: 10,
        }
    }

    #[test]
    fn stripe_secrets_required_outside_dev_mode() {
        assert!(config(false, "", "whsec").validate().is_err());
        assert!(config(false, "sk_live", "").validate().is_err());
        assert!(config(false, "sk_live", "whsec").validate().is_ok());
        assert!(config(true, "", "").validate().is_ok());
    }

    #[test]
    fn addr_joins_host_and_port() {
        assert_eq!(config(true, "", "").addr(), "127.0.0.1:3000");
    }
}
