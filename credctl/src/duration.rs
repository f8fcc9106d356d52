//! Credential lifetime calculation.
//!
//! Lifetimes arrive in two shapes: a structured `(amount, unit)` pair on the
//! direct issue endpoint, and a symbolic token (`"1h"`, `"7d"`, `"1m"`,
//! `"permanent"`, ...) on access request line items. Both funnel through
//! [`KeyDuration`], the single place where expiry arithmetic lives.
//!
//! Arithmetic is deliberately simple: a month is always 30 days and a year is
//! always 365 days. Expiry is always computed from the current instant, never
//! from a previous expiry, so renewing an expired key grants a full fresh
//! lifetime.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Days in a month for lifetime arithmetic. Fixed on purpose.
const DAYS_PER_MONTH: i64 = 30;
/// Days in a year for the "1y" symbolic token.
const DAYS_PER_YEAR: i64 = 365;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, ToSchema)]
#[sqlx(type_name = "duration_unit", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum DurationUnit {
    Hours,
    Days,
    Months,
}

impl DurationUnit {
    /// Largest amount any user may request for this unit (one year equivalent).
    pub fn max_amount(&self) -> i32 {
        match self {
            DurationUnit::Hours => 8760,
            DurationUnit::Days => 365,
            DurationUnit::Months => 12,
        }
    }

    /// Largest amount a client-role user may request (two months equivalent).
    pub fn client_max_amount(&self) -> i32 {
        match self {
            DurationUnit::Hours => 1440,
            DurationUnit::Days => 60,
            DurationUnit::Months => 2,
        }
    }
}

/// A credential lifetime, either finite or permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyDuration {
    Permanent,
    Finite { amount: i32, unit: DurationUnit },
}

impl KeyDuration {
    pub fn finite(amount: i32, unit: DurationUnit) -> Self {
        KeyDuration::Finite { amount, unit }
    }

    /// Parse a symbolic duration token from an access request line item.
    ///
    /// Unknown tokens deterministically fall back to one month so a malformed
    /// request degrades to the shortest common grant rather than failing an
    /// already-approved batch.
    pub fn from_token(token: &str) -> Self {
        match token {
            "permanent" => KeyDuration::Permanent,
            "1h" => KeyDuration::finite(1, DurationUnit::Hours),
            "2h" => KeyDuration::finite(2, DurationUnit::Hours),
            "12h" => KeyDuration::finite(12, DurationUnit::Hours),
            "1d" => KeyDuration::finite(1, DurationUnit::Days),
            "7d" => KeyDuration::finite(7, DurationUnit::Days),
            "1m" => KeyDuration::finite(1, DurationUnit::Months),
            "2m" => KeyDuration::finite(2, DurationUnit::Months),
            "6m" => KeyDuration::finite(6, DurationUnit::Months),
            "1y" => KeyDuration::finite(DAYS_PER_YEAR as i32, DurationUnit::Days),
            _ => {
                tracing::warn!(token, "Unknown duration token, defaulting to one month");
                KeyDuration::finite(1, DurationUnit::Months)
            }
        }
    }

    /// Expiration instant for a lifetime starting at `now`. `None` means the
    /// credential never expires.
    pub fn expires_at(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            KeyDuration::Permanent => None,
            KeyDuration::Finite { amount, unit } => {
                let span = match unit {
                    DurationUnit::Hours => Duration::hours(*amount as i64),
                    DurationUnit::Days => Duration::days(*amount as i64),
                    DurationUnit::Months => Duration::days(*amount as i64 * DAYS_PER_MONTH),
                };
                Some(now + span)
            }
        }
    }

    /// Validate the amount against the global per-unit ceiling.
    pub fn validate(&self) -> Result<(), String> {
        match self {
            KeyDuration::Permanent => Ok(()),
            KeyDuration::Finite { amount, unit } => {
                if *amount < 1 {
                    return Err("Duration must be at least 1".to_string());
                }
                let max = unit.max_amount();
                if *amount > max {
                    return Err(format!("Duration exceeds the maximum of {max} {unit:?}").to_lowercase());
                }
                Ok(())
            }
        }
    }

    /// Whether a client-role user may be granted this lifetime.
    pub fn within_client_cap(&self) -> bool {
        match self {
            KeyDuration::Permanent => false,
            KeyDuration::Finite { amount, unit } => *amount <= unit.client_max_amount(),
        }
    }

    /// Storage representation: the duration columns are NULL for permanent keys.
    pub fn columns(&self) -> (Option<i32>, Option<DurationUnit>) {
        match self {
            KeyDuration::Permanent => (None, None),
            KeyDuration::Finite { amount, unit } => (Some(*amount), Some(*unit)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_from_now_hours() {
        let now = Utc::now();
        let exp = KeyDuration::finite(2, DurationUnit::Hours).expires_at(now).unwrap();
        assert_eq!(exp - now, Duration::hours(2));
    }

    #[test]
    fn test_month_is_thirty_days() {
        let now = Utc::now();
        let exp = KeyDuration::finite(2, DurationUnit::Months).expires_at(now).unwrap();
        assert_eq!(exp - now, Duration::days(60));
    }

    #[test]
    fn test_permanent_has_no_expiry() {
        assert_eq!(KeyDuration::Permanent.expires_at(Utc::now()), None);
        assert_eq!(KeyDuration::from_token("permanent"), KeyDuration::Permanent);
    }

    #[test]
    fn test_token_table() {
        assert_eq!(KeyDuration::from_token("12h"), KeyDuration::finite(12, DurationUnit::Hours));
        assert_eq!(KeyDuration::from_token("7d"), KeyDuration::finite(7, DurationUnit::Days));
        assert_eq!(KeyDuration::from_token("6m"), KeyDuration::finite(6, DurationUnit::Months));
        assert_eq!(KeyDuration::from_token("1y"), KeyDuration::finite(365, DurationUnit::Days));
    }

    #[test]
    fn test_unknown_token_falls_back_to_one_month() {
        let now = Utc::now();
        let fallback = KeyDuration::from_token("3w");
        assert_eq!(fallback, KeyDuration::finite(1, DurationUnit::Months));
        assert_eq!(fallback.expires_at(now).unwrap() - now, Duration::days(30));
    }

    #[test]
    fn test_global_ceilings() {
        assert!(KeyDuration::finite(8760, DurationUnit::Hours).validate().is_ok());
        assert!(KeyDuration::finite(8761, DurationUnit::Hours).validate().is_err());
        assert!(KeyDuration::finite(12, DurationUnit::Months).validate().is_ok());
        assert!(KeyDuration::finite(13, DurationUnit::Months).validate().is_err());
        assert!(KeyDuration::finite(0, DurationUnit::Days).validate().is_err());
    }

    #[test]
    fn test_client_cap() {
        assert!(KeyDuration::finite(2, DurationUnit::Months).within_client_cap());
        assert!(!KeyDuration::finite(3, DurationUnit::Months).within_client_cap());
        assert!(KeyDuration::finite(60, DurationUnit::Days).within_client_cap());
        assert!(!KeyDuration::finite(61, DurationUnit::Days).within_client_cap());
        assert!(!KeyDuration::Permanent.within_client_cap());
    }
}
