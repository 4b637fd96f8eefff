use crate::coalescer::CoalescedField;
use shared::order::OrderType;
use std::time::Duration;
use till_client::ClientConfig;

/// Debounce window per coalesced field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoalesceWindows {
    pub payment_method: Duration,
    pub tendered_cash: Duration,
    pub note: Duration,
    pub promotion_code: Duration,
}

impl CoalesceWindows {
    /// Window for a field
    pub fn window(&self, field: CoalescedField) -> Duration {
        match field {
            CoalescedField::PaymentMethod => self.payment_method,
            CoalescedField::TenderedCash => self.tendered_cash,
            CoalescedField::Note => self.note,
            CoalescedField::PromotionCode => self.promotion_code,
        }
    }
}

impl Default for CoalesceWindows {
    fn default() -> Self {
        Self {
            payment_method: Duration::from_millis(400),
            tendered_cash: Duration::from_millis(500),
            note: Duration::from_millis(600),
            promotion_code: Duration::from_millis(800),
        }
    }
}

/// Till configuration
///
/// # Environment variables
///
/// | Variable | Default | Description |
/// |----------|---------|-------------|
/// | ORDER_SERVICE_URL | http://localhost:8080 | Order service base URL |
/// | ORDER_SERVICE_TOKEN | - | Bearer token |
/// | REQUEST_TIMEOUT_SECS | 30 | Request timeout |
/// | ORDER_TYPE | COUNTER | Type of orders created by this till |
/// | PAYMENT_METHOD_DEBOUNCE_MS | 400 | Payment method window |
/// | TENDERED_CASH_DEBOUNCE_MS | 500 | Tendered cash window |
/// | NOTE_DEBOUNCE_MS | 600 | Note window |
/// | PROMOTION_CODE_DEBOUNCE_MS | 800 | Promotion code window |
/// | LOG_LEVEL | info | Log level |
/// | LOG_JSON | false | JSON console logs |
/// | LOG_DIR | - | Log file directory |
/// | LOG_RETENTION_DAYS | 14 | Application log retention |
/// | ENVIRONMENT | development | Runtime environment |
#[derive(Debug, Clone)]
pub struct PosConfig {
    pub order_service_url: String,
    pub order_service_token: Option<String>,
    pub request_timeout_secs: u64,
    pub order_type: OrderType,
    pub windows: CoalesceWindows,
    pub log_level: String,
    pub log_json: bool,
    pub log_dir: Option<String>,
    pub log_retention_days: i64,
    /// development | staging | production
    pub environment: String,
}

impl PosConfig {
    /// Load configuration from environment variables
    ///
    /// Unset or unparsable variables fall back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = CoalesceWindows::default();
        let millis = |key: &str, default: Duration| {
            var(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };

        Self {
            order_service_url: var("ORDER_SERVICE_URL")
                .unwrap_or_else(|| "http://localhost:8080".into()),
            order_service_token: var("ORDER_SERVICE_TOKEN").filter(|t| !t.is_empty()),
            request_timeout_secs: var("REQUEST_TIMEOUT_SECS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            order_type: match var("ORDER_TYPE").as_deref() {
                Some("ONLINE") | Some("online") => OrderType::Online,
                _ => OrderType::Counter,
            },
            windows: CoalesceWindows {
                payment_method: millis("PAYMENT_METHOD_DEBOUNCE_MS", defaults.payment_method),
                tendered_cash: millis("TENDERED_CASH_DEBOUNCE_MS", defaults.tendered_cash),
                note: millis("NOTE_DEBOUNCE_MS", defaults.note),
                promotion_code: millis("PROMOTION_CODE_DEBOUNCE_MS", defaults.promotion_code),
            },
            log_level: var("LOG_LEVEL").unwrap_or_else(|| "info".into()),
            log_json: var("LOG_JSON")
                .and_then(|v| v.parse().ok())
                .unwrap_or(false),
            log_dir: var("LOG_DIR").filter(|d| !d.is_empty()),
            log_retention_days: var("LOG_RETENTION_DAYS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(14),
            environment: var("ENVIRONMENT").unwrap_or_else(|| "development".into()),
        }
    }

    /// Order service client configuration
    pub fn client_config(&self) -> ClientConfig {
        let config =
            ClientConfig::new(self.order_service_url.clone()).with_timeout(self.request_timeout_secs);
        match &self.order_service_token {
            Some(token) => config.with_token(token.clone()),
            None => config,
        }
    }

    /// Whether running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }
}

impl Default for PosConfig {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}
