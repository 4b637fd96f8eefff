//! Promotion model
//!
//! Applicability is decided by the order service. The checks here are a
//! client-side pre-filter so obviously unusable codes can be rejected
//! without binding them to an order.

use crate::error::ErrorCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Promotion kind
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionKind {
    /// `value` is a percentage (10 = 10%)
    Percentage,
    /// `value` is an amount off the order
    FixedAmount,
}

/// Promotion (discount rule identified by a code)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Promotion {
    pub id: String,
    /// Code typed by the cashier (stored upper-case)
    pub code: String,
    #[serde(default)]
    pub name: String,
    pub kind: PromotionKind,
    pub value: Decimal,
    /// Discount cap for percentage promotions
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_discount: Option<Decimal>,
    /// Minimum order subtotal
    #[serde(default)]
    pub min_order_value: Decimal,
    /// Validity start (Unix millis, inclusive)
    pub starts_at: i64,
    /// Validity end (Unix millis, exclusive)
    pub ends_at: i64,
    /// Usage cap (`None` = unlimited)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
}

impl Promotion {
    /// Canonical form of a typed code
    pub fn normalize_code(code: &str) -> String {
        code.trim().to_uppercase()
    }

    /// Check whether a typed code refers to this promotion
    pub fn matches_code(&self, code: &str) -> bool {
        Self::normalize_code(&self.code) == Self::normalize_code(code)
    }

    /// Pre-filter: validity window `[starts_at, ends_at)`, usage cap and
    /// minimum order value.
    pub fn check_applicability(
        &self,
        now_millis: i64,
        subtotal: Decimal,
    ) -> Result<(), PromotionRejection> {
        if now_millis < self.starts_at {
            return Err(PromotionRejection::NotYetValid);
        }
        if now_millis >= self.ends_at {
            return Err(PromotionRejection::Expired);
        }
        if let Some(limit) = self.usage_limit
            && self.usage_count >= limit
        {
            return Err(PromotionRejection::UsageExhausted);
        }
        if subtotal < self.min_order_value {
            return Err(PromotionRejection::BelowMinimum {
                minimum: Some(self.min_order_value),
            });
        }
        Ok(())
    }

    /// Display-only discount estimate for a subtotal.
    ///
    /// The discount bound to an order always comes from the order service.
    pub fn preview_discount(&self, subtotal: Decimal) -> Decimal {
        let raw = match self.kind {
            PromotionKind::Percentage => {
                let pct = subtotal * self.value / Decimal::ONE_HUNDRED;
                match self.max_discount {
                    Some(cap) => pct.min(cap),
                    None => pct,
                }
            }
            PromotionKind::FixedAmount => self.value,
        };
        raw.min(subtotal).max(Decimal::ZERO).round_dp(2)
    }
}

/// Why a promotion code cannot be used
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "reason", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PromotionRejection {
    NotFound,
    NotYetValid,
    Expired,
    UsageExhausted,
    /// The amount is unknown when only the service error code is available
    BelowMinimum {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        minimum: Option<Decimal>,
    },
}

impl PromotionRejection {
    /// Matching service error code
    pub fn error_code(&self) -> ErrorCode {
        match self {
            Self::NotFound => ErrorCode::PromotionNotFound,
            Self::NotYetValid => ErrorCode::PromotionNotYetValid,
            Self::Expired => ErrorCode::PromotionExpired,
            Self::UsageExhausted => ErrorCode::PromotionUsageExhausted,
            Self::BelowMinimum { .. } => ErrorCode::PromotionBelowMinimum,
        }
    }

    /// Map a service error code back to a rejection
    pub fn from_error_code(code: ErrorCode) -> Option<Self> {
        match code {
            ErrorCode::PromotionNotFound => Some(Self::NotFound),
            ErrorCode::PromotionNotYetValid => Some(Self::NotYetValid),
            ErrorCode::PromotionExpired => Some(Self::Expired),
            ErrorCode::PromotionUsageExhausted => Some(Self::UsageExhausted),
            ErrorCode::PromotionBelowMinimum => Some(Self::BelowMinimum { minimum: None }),
            _ => None,
        }
    }
}

impl fmt::Display for PromotionRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound => write!(f, "code does not exist"),
            Self::NotYetValid => write!(f, "promotion has not started yet"),
            Self::Expired => write!(f, "promotion has expired"),
            Self::UsageExhausted => write!(f, "promotion usage limit reached"),
            Self::BelowMinimum {
                minimum: Some(minimum),
            } => write!(f, "order subtotal is below the minimum of {}", minimum),
            Self::BelowMinimum { minimum: None } => {
                write!(f, "order subtotal is below the promotion minimum")
            }
        }
    }
}

/// Result of resolving a promotion code
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PromotionResolution {
    pub promotion: Promotion,
    /// Server-side estimate for the order the code was resolved against
    #[serde(default)]
    pub effective_discount_preview: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_760_000_000_000;
    const DAY: i64 = 86_400_000;

    fn sale10() -> Promotion {
        Promotion {
            id: "promo-1".to_string(),
            code: "SALE10".to_string(),
            name: "10% off".to_string(),
            kind: PromotionKind::Percentage,
            value: Decimal::from(10),
            max_discount: Some(Decimal::from(30_000)),
            min_order_value: Decimal::from(100_000),
            starts_at: NOW - DAY,
            ends_at: NOW + DAY,
            usage_limit: Some(100),
            usage_count: 3,
        }
    }

    #[test]
    fn test_percentage_capped() {
        // 10% of 500,000 = 50,000, capped at 30,000
        let promo = sale10();
        assert_eq!(
            promo.preview_discount(Decimal::from(500_000)),
            Decimal::from(30_000)
        );
        assert_eq!(
            promo.preview_discount(Decimal::from(200_000)),
            Decimal::from(20_000)
        );
    }

    #[test]
    fn test_fixed_amount_clamped_to_subtotal() {
        let mut promo = sale10();
        promo.kind = PromotionKind::FixedAmount;
        promo.value = Decimal::from(50_000);
        promo.max_discount = None;
        assert_eq!(
            promo.preview_discount(Decimal::from(40_000)),
            Decimal::from(40_000)
        );
    }

    #[test]
    fn test_applicability_window() {
        let promo = sale10();
        let subtotal = Decimal::from(500_000);
        assert_eq!(promo.check_applicability(NOW, subtotal), Ok(()));
        assert_eq!(
            promo.check_applicability(NOW - 2 * DAY, subtotal),
            Err(PromotionRejection::NotYetValid)
        );
        // end of window is exclusive
        assert_eq!(
            promo.check_applicability(NOW + DAY, subtotal),
            Err(PromotionRejection::Expired)
        );
    }

    #[test]
    fn test_applicability_usage_and_minimum() {
        let mut promo = sale10();
        assert_eq!(
            promo.check_applicability(NOW, Decimal::from(99_999)),
            Err(PromotionRejection::BelowMinimum {
                minimum: Some(Decimal::from(100_000))
            })
        );
        promo.usage_count = 100;
        assert_eq!(
            promo.check_applicability(NOW, Decimal::from(500_000)),
            Err(PromotionRejection::UsageExhausted)
        );
        promo.usage_limit = None;
        assert_eq!(promo.check_applicability(NOW, Decimal::from(500_000)), Ok(()));
    }

    #[test]
    fn test_code_normalization() {
        let promo = sale10();
        assert!(promo.matches_code("  sale10 "));
        assert!(!promo.matches_code("SALE20"));
    }

    #[test]
    fn test_rejection_codes() {
        assert_eq!(
            PromotionRejection::Expired.error_code(),
            ErrorCode::PromotionExpired
        );
        assert_eq!(
            PromotionRejection::from_error_code(ErrorCode::PromotionNotFound),
            Some(PromotionRejection::NotFound)
        );
        assert_eq!(PromotionRejection::from_error_code(ErrorCode::NetworkError), None);
    }

    #[test]
    fn test_below_minimum_from_service_code() {
        let rejection = PromotionRejection::from_error_code(ErrorCode::PromotionBelowMinimum);
        assert_eq!(
            rejection,
            Some(PromotionRejection::BelowMinimum { minimum: None })
        );
        assert_eq!(
            rejection.map(|r| r.error_code()),
            Some(ErrorCode::PromotionBelowMinimum)
        );

        let json = serde_json::to_string(&PromotionRejection::BelowMinimum { minimum: None })
            .unwrap();
        assert_eq!(json, r#"{"reason":"BELOW_MINIMUM"}"#);
    }
}
