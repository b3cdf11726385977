//! Token lifetime validation and expiry date computation.

use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::errors::{Error, Result};

pub const MIN_LIFETIME_DAYS: i64 = 1;
pub const MAX_LIFETIME_DAYS: i64 = 365;
pub const DEFAULT_LIFETIME_DAYS: i64 = 30;

/// Number of days a newly issued token stays valid, between 1 and 365.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenLifetime(i64);

impl TokenLifetime {
    pub fn days(days: i64) -> Result<Self> {
        if !(MIN_LIFETIME_DAYS..=MAX_LIFETIME_DAYS).contains(&days) {
            return Err(Error::validation(format!(
                "duration must be between {} and {} days, got {}",
                MIN_LIFETIME_DAYS, MAX_LIFETIME_DAYS, days
            )));
        }
        Ok(Self(days))
    }

    pub fn as_days(&self) -> i64 {
        self.0
    }

    /// Calendar date (UTC) `self` days after `now`
    pub fn expires_on(&self, now: DateTime<Utc>) -> NaiveDate {
        (now + Duration::days(self.0)).date_naive()
    }
}

impl Default for TokenLifetime {
    fn default() -> Self {
        Self(DEFAULT_LIFETIME_DAYS)
    }
}
