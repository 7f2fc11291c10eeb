//! # Core Traits (Ports)
//!
//! Any plugin must implement these traits to be used by the services.
//! Writes are revision-checked: a `replace_*` succeeds only when the
//! stored row still carries the revision of the value passed in, which
//! turns every read-modify-write into a compare-and-set.

use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{
    ChatChannel, ChatMessage, Product, ProductFilter, PurchaseCommit, Report, User, UserFilter,
    WriteOutcome,
};

/// Account table.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, username: &str) -> anyhow::Result<Option<User>>;
    async fn list_users(&self, filter: &UserFilter) -> anyhow::Result<Vec<User>>;

    /// Insert-if-absent. `Conflict` when the username is taken.
    async fn insert_user(&self, user: User) -> anyhow::Result<WriteOutcome<User>>;

    /// Replace-in-place, guarded by `user.revision`.
    async fn replace_user(&self, user: User) -> anyhow::Result<WriteOutcome<User>>;
}

/// Listing table.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ProductRepo: Send + Sync {
    /// Direct lookup; soft-deleted products are still returned.
    async fn get_product(&self, id: Uuid) -> anyhow::Result<Option<Product>>;
    async fn list_products(&self, filter: &ProductFilter) -> anyhow::Result<Vec<Product>>;
    async fn insert_product(&self, product: Product) -> anyhow::Result<WriteOutcome<Product>>;
    async fn replace_product(&self, product: Product) -> anyhow::Result<WriteOutcome<Product>>;

    /// Applies the product stamp, buyer debit and seller credit as one
    /// unit. Implementations must check all three revisions and write all
    /// three rows inside a single critical section.
    async fn commit_purchase(
        &self,
        commit: PurchaseCommit,
    ) -> anyhow::Result<WriteOutcome<PurchaseCommit>>;
}

/// Moderation queue.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ReportRepo: Send + Sync {
    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>>;
    async fn list_reports(&self) -> anyhow::Result<Vec<Report>>;
    async fn insert_report(&self, report: Report) -> anyhow::Result<()>;
    async fn remove_report(&self, id: Uuid) -> anyhow::Result<Option<Report>>;
}

/// Public board posts and private conversations.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait ChatRepo: Send + Sync {
    async fn get_message(&self, id: Uuid) -> anyhow::Result<Option<ChatMessage>>;
    /// Oldest first.
    async fn list_messages(&self, channel: &ChatChannel) -> anyhow::Result<Vec<ChatMessage>>;
    async fn insert_message(&self, message: ChatMessage) -> anyhow::Result<()>;
    async fn remove_message(&self, id: Uuid) -> anyhow::Result<Option<ChatMessage>>;
}

/// Client-side durable key/value storage (where the session record lives).
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> anyhow::Result<()>;
    async fn remove(&self, key: &str) -> anyhow::Result<()>;
}

/// Credential hashing and token issuing.
#[cfg_attr(any(test, feature = "testing"), mockall::automock)]
pub trait AuthProvider: Send + Sync {
    /// Returns a self-describing hash string (salt included).
    fn hash_password(&self, password: &str) -> anyhow::Result<String>;

    /// Verifies a password against a stored hash. Malformed hashes never verify.
    fn verify_password(&self, password: &str, hash: &str) -> bool;

    /// Issues a fresh opaque session token.
    fn issue_token(&self) -> anyhow::Result<String>;
}
