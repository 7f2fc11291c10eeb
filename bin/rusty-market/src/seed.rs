//! JSON fixtures loaded into the in-memory store at startup.
//!
//! Fixture passwords are plaintext and hashed here, so the store never
//! holds a plaintext password.

use std::path::Path;

use anyhow::Context;
use chrono::Utc;
use rm_core::models::{ListingDraft, User, WriteOutcome};
use rm_core::traits::{AuthProvider, UserRepo};
use rm_core::validation;
use rm_services::Market;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixtures {
    #[serde(default)]
    pub users: Vec<FixtureUser>,
    #[serde(default)]
    pub listings: Vec<FixtureListing>,
    /// Public board posts
    #[serde(default)]
    pub posts: Vec<FixturePost>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureUser {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub balance: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FixtureListing {
    pub author: String,
    #[serde(flatten)]
    pub draft: ListingDraft,
}

#[derive(Debug, Deserialize)]
pub struct FixturePost {
    pub author: String,
    pub body: String,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct SeedSummary {
    pub users: usize,
    pub listings: usize,
    pub posts: usize,
}

/// Reads `path` and applies it. Users without an explicit balance get
/// `starting_balance`.
pub async fn load(
    path: &Path,
    starting_balance: u64,
    users: &dyn UserRepo,
    auth: &dyn AuthProvider,
    market: &Market,
) -> anyhow::Result<SeedSummary> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading fixtures from {}", path.display()))?;
    let fixtures: Fixtures = serde_json::from_str(&raw)
        .with_context(|| format!("parsing fixtures in {}", path.display()))?;
    apply(fixtures, starting_balance, users, auth, market).await
}

pub async fn apply(
    fixtures: Fixtures,
    starting_balance: u64,
    users: &dyn UserRepo,
    auth: &dyn AuthProvider,
    market: &Market,
) -> anyhow::Result<SeedSummary> {
    let mut summary = SeedSummary::default();

    for fixture in fixtures.users {
        validation::username(&fixture.username)
            .with_context(|| format!("fixture user '{}'", fixture.username))?;
        let hash = auth.hash_password(&fixture.password)?;
        let mut user = User::new(
            fixture.username.as_str(),
            hash,
            validation::bio(fixture.bio.as_deref())?,
            fixture.balance.unwrap_or(starting_balance),
            Utc::now(),
        );
        user.is_admin = fixture.is_admin;
        match users.insert_user(user).await? {
            WriteOutcome::Applied(_) => summary.users += 1,
            _ => tracing::warn!(username = %fixture.username, "fixture user already present, skipped"),
        }
    }

    for listing in fixtures.listings {
        market
            .marketplace
            .create_listing(&listing.draft, &listing.author)
            .await
            .with_context(|| format!("fixture listing '{}'", listing.draft.title))?;
        summary.listings += 1;
    }

    for post in fixtures.posts {
        market
            .chat
            .send_public(&post.author, &post.body)
            .await
            .with_context(|| format!("fixture post by '{}'", post.author))?;
        summary.posts += 1;
    }

    Ok(summary)
}
