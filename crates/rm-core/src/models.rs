//! # Domain Models
//!
//! These structs represent the core entities of Rusty-Market.
//! Products, reports and chat messages use UUID v7 for time-ordered ids;
//! users are keyed by their immutable username.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::MarketError;
use crate::policy;

/// A registered account as held by the store.
///
/// Never handed to callers directly: operations return [`PublicUser`],
/// which has no password material.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub username: String,
    /// Argon2id PHC string
    pub password_hash: String,
    pub bio: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    pub can_login: bool,
    pub ban_expiry: Option<DateTime<Utc>>,
    pub balance: u64,
    pub created_at: DateTime<Utc>,
    /// Bumped by the store on every accepted write
    #[serde(default)]
    pub revision: u64,
}

impl User {
    pub fn new(
        username: impl Into<String>,
        password_hash: impl Into<String>,
        bio: Option<String>,
        balance: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            password_hash: password_hash.into(),
            bio,
            is_admin: false,
            can_login: true,
            ban_expiry: None,
            balance,
            created_at: now,
            revision: 0,
        }
    }

    /// Records a ban lasting until `until`.
    pub fn apply_ban(&mut self, until: DateTime<Utc>) {
        self.can_login = false;
        self.ban_expiry = Some(until);
    }

    pub fn lift_ban(&mut self) {
        self.can_login = true;
        self.ban_expiry = None;
    }

    /// Caller-facing snapshot; ban status is evaluated against `now`
    /// rather than read from the possibly stale `can_login` flag.
    pub fn to_public(&self, now: DateTime<Utc>) -> PublicUser {
        PublicUser {
            username: self.username.clone(),
            bio: self.bio.as_deref().map(crate::validation::sanitize),
            is_admin: self.is_admin,
            balance: self.balance,
            banned_until: self.ban_expiry.filter(|_| policy::is_currently_banned(self, now)),
            created_at: self.created_at,
        }
    }
}

/// What the rest of the application sees of a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub username: String,
    /// HTML-escaped
    pub bio: Option<String>,
    pub is_admin: bool,
    pub balance: u64,
    /// Set only while the ban is actually in force
    pub banned_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Filter for user listings (admin dashboard).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    pub is_admin: Option<bool>,
    /// Only users with a recorded ban, whether or not it has expired
    pub with_ban_record: bool,
}

impl UserFilter {
    pub fn matches(&self, user: &User) -> bool {
        self.is_admin.map_or(true, |want| user.is_admin == want)
            && (!self.with_ban_record || user.ban_expiry.is_some())
    }
}

/// A marketplace listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub title: String,
    pub description: String,
    pub image_url: String,
    /// Username of the seller
    pub author: String,
    pub price: u64,
    pub created_at: DateTime<Utc>,
    pub purchased_by: Option<String>,
    pub purchased_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub revision: u64,
}

impl Product {
    pub fn is_sold(&self) -> bool {
        self.purchased_by.is_some()
    }

    /// Stamps the sale. Both fields are written together, exactly once.
    pub fn mark_purchased(&mut self, buyer: &str, at: DateTime<Utc>) {
        debug_assert!(!self.is_sold());
        self.purchased_by = Some(buyer.to_string());
        self.purchased_at = Some(at);
    }
}

/// Input for a new listing. `price` is signed so that negative input can
/// be rejected as a validation error instead of failing to parse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingDraft {
    pub title: String,
    pub description: String,
    pub price: i64,
    pub image_url: String,
}

/// Partial update of a listing. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingPatch {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<i64>,
    pub image_url: Option<String>,
}

impl ListingPatch {
    pub fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.image_url.is_none()
    }
}

/// Filter for product queries.
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub include_deleted: bool,
    pub author: Option<String>,
    pub purchased_by: Option<String>,
    pub sold: Option<bool>,
}

impl ProductFilter {
    /// Everything a public listing page shows.
    pub fn listed() -> Self {
        Self::default()
    }

    pub fn matches(&self, product: &Product) -> bool {
        (self.include_deleted || !product.is_deleted)
            && self.author.as_deref().map_or(true, |a| product.author == a)
            && self
                .purchased_by
                .as_deref()
                .map_or(true, |b| product.purchased_by.as_deref() == Some(b))
            && self.sold.map_or(true, |want| product.is_sold() == want)
    }
}

/// The three rows a purchase rewrites. A store must apply them as one
/// unit: either every revision still matches and all three land, or
/// nothing changes.
#[derive(Debug, Clone)]
pub struct PurchaseCommit {
    pub product: Product,
    pub buyer: User,
    pub seller: User,
}

/// What a report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportKind {
    User,
    Post,
    Chat,
    Product,
}

impl ReportKind {
    pub fn needs_content_id(self) -> bool {
        !matches!(self, ReportKind::User)
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportKind::User => "user",
            ReportKind::Post => "post",
            ReportKind::Chat => "chat",
            ReportKind::Product => "product",
        })
    }
}

impl FromStr for ReportKind {
    type Err = MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "user" => Ok(ReportKind::User),
            "post" => Ok(ReportKind::Post),
            "chat" => Ok(ReportKind::Chat),
            "product" => Ok(ReportKind::Product),
            other => Err(MarketError::validation(
                "type",
                format!("unknown report type '{other}'"),
            )),
        }
    }
}

/// A user-filed complaint awaiting moderation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub content_id: Option<String>,
    pub reported_user: String,
    pub reason: String,
    pub reported_by: String,
    pub created_at: DateTime<Utc>,
}

/// Where a chat message lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ChatChannel {
    /// The shared board everyone reads; its messages are "posts"
    Public,
    /// A two-party conversation. Build with [`ChatChannel::between`] so
    /// that (a, b) and (b, a) name the same channel.
    Private { low: String, high: String },
}

impl ChatChannel {
    pub fn between(a: &str, b: &str) -> Self {
        let (low, high) = if a <= b { (a, b) } else { (b, a) };
        ChatChannel::Private {
            low: low.to_string(),
            high: high.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: Uuid,
    pub channel: ChatChannel,
    pub author: String,
    /// Sanitized at write time
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Session record persisted in client-side key/value storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredSession {
    pub user_id: String,
    pub token: String,
    /// Epoch milliseconds
    pub expires_at: i64,
}

impl StoredSession {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp_millis()
    }
}

/// Result of a revision-checked write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WriteOutcome<T> {
    /// The write landed; carries the stored value with its new revision
    Applied(T),
    /// Key already present (insert) or revision moved on (replace)
    Conflict,
    /// No row with that key
    Missing,
}

impl<T> WriteOutcome<T> {
    pub fn is_applied(&self) -> bool {
        matches!(self, WriteOutcome::Applied(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(author: &str) -> Product {
        Product {
            id: Uuid::now_v7(),
            title: "Lamp".into(),
            description: "Brass desk lamp".into(),
            image_url: "https://img.example/lamp.png".into(),
            author: author.into(),
            price: 10,
            created_at: Utc::now(),
            purchased_by: None,
            purchased_at: None,
            is_deleted: false,
            revision: 0,
        }
    }

    #[test]
    fn private_channel_is_order_independent() {
        assert_eq!(
            ChatChannel::between("zed", "amy"),
            ChatChannel::between("amy", "zed")
        );
        assert_ne!(ChatChannel::between("amy", "zed"), ChatChannel::Public);
    }

    #[test]
    fn listed_filter_hides_deleted_only() {
        let mut p = product("bob");
        assert!(ProductFilter::listed().matches(&p));
        p.mark_purchased("alice", Utc::now());
        assert!(ProductFilter::listed().matches(&p));
        p.is_deleted = true;
        assert!(!ProductFilter::listed().matches(&p));
        let history = ProductFilter {
            include_deleted: true,
            purchased_by: Some("alice".into()),
            ..Default::default()
        };
        assert!(history.matches(&p));
    }

    #[test]
    fn report_kind_parses_case_insensitively() {
        assert_eq!("Product".parse::<ReportKind>().unwrap(), ReportKind::Product);
        assert!("thread".parse::<ReportKind>().is_err());
        assert!(!ReportKind::User.needs_content_id());
    }

    #[test]
    fn session_record_uses_camel_case_millis() {
        let s = StoredSession {
            user_id: "alice".into(),
            token: "t".into(),
            expires_at: 1_700_000_000_000,
        };
        let json = serde_json::to_value(&s).unwrap();
        assert_eq!(json["userId"], "alice");
        assert_eq!(json["expiresAt"], 1_700_000_000_000i64);
    }

    #[test]
    fn public_view_drops_stale_ban() {
        let now = Utc::now();
        let mut u = User::new("carol", "hash", Some("<b>hi".into()), 0, now);
        u.apply_ban(now - chrono::Duration::hours(1));
        let view = u.to_public(now);
        assert_eq!(view.banned_until, None);
        assert_eq!(view.bio.as_deref(), Some("&lt;b&gt;hi"));
    }
}
