//! Row access helpers shared by the services: lookups that turn absence
//! into typed errors, the admin gate, and the re-fetch/mutate/replace
//! loop used for every single-row update.

use chrono::{DateTime, Utc};
use rm_core::error::{MarketError, Result};
use rm_core::models::{Product, User, WriteOutcome};
use rm_core::policy;
use rm_core::traits::{ProductRepo, UserRepo};
use uuid::Uuid;

/// Attempts before a contended write gives up with `Conflict`.
pub(crate) const MAX_WRITE_ATTEMPTS: usize = 3;

pub(crate) async fn load_user(users: &dyn UserRepo, username: &str) -> Result<User> {
    users
        .get_user(username)
        .await?
        .ok_or_else(|| MarketError::NotFound("user", username.to_string()))
}

pub(crate) async fn load_product(products: &dyn ProductRepo, id: Uuid) -> Result<Product> {
    products
        .get_product(id)
        .await?
        .ok_or_else(|| MarketError::NotFound("product", id.to_string()))
}

/// Admin rights are suspended while the admin is banned.
pub(crate) fn is_acting_admin(user: &User, now: DateTime<Utc>) -> bool {
    user.is_admin && !policy::is_currently_banned(user, now)
}

/// Fails closed: unknown, non-admin and currently banned actors are all
/// `Forbidden`.
pub(crate) async fn require_admin(
    users: &dyn UserRepo,
    actor: &str,
    now: DateTime<Utc>,
) -> Result<User> {
    match users.get_user(actor).await? {
        Some(user) if is_acting_admin(&user, now) => Ok(user),
        _ => {
            tracing::warn!(actor, "admin action refused");
            Err(MarketError::forbidden("administrator rights required"))
        }
    }
}

pub(crate) fn parse_id(field: &'static str, raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| MarketError::validation(field, format!("'{raw}' is not a valid id")))
}

/// Re-fetches `username`, applies `mutate` and writes it back under a
/// revision check, retrying when another writer got in between.
pub(crate) async fn update_user_with<F>(
    users: &dyn UserRepo,
    username: &str,
    mut mutate: F,
) -> Result<User>
where
    F: FnMut(&mut User) -> Result<()> + Send,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut user = load_user(users, username).await?;
        mutate(&mut user)?;
        match users.replace_user(user).await? {
            WriteOutcome::Applied(stored) => return Ok(stored),
            WriteOutcome::Conflict => {
                tracing::debug!(username, attempt, "user write raced, retrying");
            }
            WriteOutcome::Missing => {
                return Err(MarketError::NotFound("user", username.to_string()))
            }
        }
    }
    Err(MarketError::Conflict)
}

/// Product counterpart of [`update_user_with`]. `mutate` returns `false`
/// when the row is already in the wanted state, in which case nothing is
/// written and the current row is returned.
pub(crate) async fn update_product_with<F>(
    products: &dyn ProductRepo,
    id: Uuid,
    mut mutate: F,
) -> Result<Product>
where
    F: FnMut(&mut Product) -> Result<bool> + Send,
{
    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut product = load_product(products, id).await?;
        if !mutate(&mut product)? {
            return Ok(product);
        }
        match products.replace_product(product).await? {
            WriteOutcome::Applied(stored) => return Ok(stored),
            WriteOutcome::Conflict => {
                tracing::debug!(product_id = %id, attempt, "product write raced, retrying");
            }
            WriteOutcome::Missing => return Err(MarketError::NotFound("product", id.to_string())),
        }
    }
    Err(MarketError::Conflict)
}
