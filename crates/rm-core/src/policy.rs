//! Ban policy.
//!
//! Expiry is evaluated lazily: nothing sweeps bans. Every reader asks
//! [`is_currently_banned`] instead of trusting the stored `can_login`
//! flag, which stays `false` until the next login attempt or an unban.

use chrono::{DateTime, Duration, Utc};

use crate::error::{MarketError, Result};
use crate::models::User;

pub const MIN_BAN_DAYS: i64 = 1;
pub const MAX_BAN_DAYS: i64 = 365;

const SECS_PER_DAY: i64 = 24 * 60 * 60;

pub fn is_currently_banned(user: &User, now: DateTime<Utc>) -> bool {
    !user.can_login && user.ban_expiry.is_some_and(|expiry| expiry > now)
}

/// A ban is on record but its expiry has passed.
pub fn has_lapsed_ban(user: &User, now: DateTime<Utc>) -> bool {
    !user.can_login && !is_currently_banned(user, now)
}

/// Whole days left, rounded up, never below one while the ban holds.
pub fn days_remaining(expiry: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    let secs = (expiry - now).num_seconds().max(0);
    ((secs + SECS_PER_DAY - 1) / SECS_PER_DAY).max(1)
}

/// Expiry instant for a ban of `days` starting at `now`.
pub fn ban_until(now: DateTime<Utc>, days: i64) -> Result<DateTime<Utc>> {
    if !(MIN_BAN_DAYS..=MAX_BAN_DAYS).contains(&days) {
        return Err(MarketError::OutOfRange(format!(
            "ban length must be between {MIN_BAN_DAYS} and {MAX_BAN_DAYS} days, got {days}"
        )));
    }
    Ok(now + Duration::days(days))
}
