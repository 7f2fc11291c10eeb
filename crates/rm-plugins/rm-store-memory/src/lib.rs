//! # rm-store-memory
//!
//! In-process implementation of the Rusty-Market repositories.
//! Tables are `DashMap`s so reads never block; every write to the user
//! and product tables goes through one commit lock, which makes the
//! revision check and the write a single step and lets a purchase touch
//! three rows without anyone observing a half-applied transfer.

mod kv;

pub use kv::MemoryKv;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rm_core::models::{
    ChatChannel, ChatMessage, Product, ProductFilter, PurchaseCommit, Report, User, UserFilter,
    WriteOutcome,
};
use rm_core::traits::{ChatRepo, ProductRepo, ReportRepo, UserRepo};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    users: DashMap<String, User>,
    products: DashMap<Uuid, Product>,
    reports: DashMap<Uuid, Report>,
    messages: DashMap<Uuid, ChatMessage>,
    /// Serializes writes to `users` and `products`
    commit: Mutex<()>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

/// Checks that the stored row still has `expected` as its revision.
fn revision_matches<K, V>(
    table: &DashMap<K, V>,
    key: &K,
    expected: u64,
    revision: impl Fn(&V) -> u64,
) -> Option<bool>
where
    K: Eq + std::hash::Hash,
{
    table.get(key).map(|row| revision(row.value()) == expected)
}

#[async_trait]
impl UserRepo for MemoryStore {
    async fn get_user(&self, username: &str) -> anyhow::Result<Option<User>> {
        Ok(self.users.get(username).map(|u| u.clone()))
    }

    async fn list_users(&self, filter: &UserFilter) -> anyhow::Result<Vec<User>> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .filter(|u| filter.matches(u.value()))
            .map(|u| u.value().clone())
            .collect();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn insert_user(&self, mut user: User) -> anyhow::Result<WriteOutcome<User>> {
        let _guard = self.commit.lock().await;
        match self.users.entry(user.username.clone()) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                user.revision = 1;
                slot.insert(user.clone());
                Ok(WriteOutcome::Applied(user))
            }
        }
    }

    async fn replace_user(&self, mut user: User) -> anyhow::Result<WriteOutcome<User>> {
        let _guard = self.commit.lock().await;
        match revision_matches(&self.users, &user.username, user.revision, |u| u.revision) {
            None => Ok(WriteOutcome::Missing),
            Some(false) => Ok(WriteOutcome::Conflict),
            Some(true) => {
                user.revision += 1;
                self.users.insert(user.username.clone(), user.clone());
                Ok(WriteOutcome::Applied(user))
            }
        }
    }
}

#[async_trait]
impl ProductRepo for MemoryStore {
    async fn get_product(&self, id: Uuid) -> anyhow::Result<Option<Product>> {
        Ok(self.products.get(&id).map(|p| p.clone()))
    }

    async fn list_products(&self, filter: &ProductFilter) -> anyhow::Result<Vec<Product>> {
        let mut products: Vec<Product> = self
            .products
            .iter()
            .filter(|p| filter.matches(p.value()))
            .map(|p| p.value().clone())
            .collect();
        products.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn insert_product(&self, mut product: Product) -> anyhow::Result<WriteOutcome<Product>> {
        let _guard = self.commit.lock().await;
        match self.products.entry(product.id) {
            Entry::Occupied(_) => Ok(WriteOutcome::Conflict),
            Entry::Vacant(slot) => {
                product.revision = 1;
                slot.insert(product.clone());
                Ok(WriteOutcome::Applied(product))
            }
        }
    }

    async fn replace_product(&self, mut product: Product) -> anyhow::Result<WriteOutcome<Product>> {
        let _guard = self.commit.lock().await;
        match revision_matches(&self.products, &product.id, product.revision, |p| p.revision) {
            None => Ok(WriteOutcome::Missing),
            Some(false) => Ok(WriteOutcome::Conflict),
            Some(true) => {
                product.revision += 1;
                self.products.insert(product.id, product.clone());
                Ok(WriteOutcome::Applied(product))
            }
        }
    }

    async fn commit_purchase(
        &self,
        commit: PurchaseCommit,
    ) -> anyhow::Result<WriteOutcome<PurchaseCommit>> {
        let PurchaseCommit {
            mut product,
            mut buyer,
            mut seller,
        } = commit;
        anyhow::ensure!(
            buyer.username != seller.username,
            "buyer and seller must be different rows"
        );

        let _guard = self.commit.lock().await;
        let checks = [
            revision_matches(&self.products, &product.id, product.revision, |p| p.revision),
            revision_matches(&self.users, &buyer.username, buyer.revision, |u| u.revision),
            revision_matches(&self.users, &seller.username, seller.revision, |u| u.revision),
        ];
        if checks.iter().any(Option::is_none) {
            return Ok(WriteOutcome::Missing);
        }
        if checks.iter().any(|c| *c == Some(false)) {
            tracing::debug!(product_id = %product.id, "purchase commit rejected on stale revision");
            return Ok(WriteOutcome::Conflict);
        }

        product.revision += 1;
        buyer.revision += 1;
        seller.revision += 1;
        self.products.insert(product.id, product.clone());
        self.users.insert(buyer.username.clone(), buyer.clone());
        self.users.insert(seller.username.clone(), seller.clone());
        Ok(WriteOutcome::Applied(PurchaseCommit {
            product,
            buyer,
            seller,
        }))
    }
}

#[async_trait]
impl ReportRepo for MemoryStore {
    async fn get_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        Ok(self.reports.get(&id).map(|r| r.clone()))
    }

    async fn list_reports(&self) -> anyhow::Result<Vec<Report>> {
        let mut reports: Vec<Report> = self.reports.iter().map(|r| r.value().clone()).collect();
        reports.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(reports)
    }

    async fn insert_report(&self, report: Report) -> anyhow::Result<()> {
        self.reports.insert(report.id, report);
        Ok(())
    }

    async fn remove_report(&self, id: Uuid) -> anyhow::Result<Option<Report>> {
        Ok(self.reports.remove(&id).map(|(_, r)| r))
    }
}

#[async_trait]
impl ChatRepo for MemoryStore {
    async fn get_message(&self, id: Uuid) -> anyhow::Result<Option<ChatMessage>> {
        Ok(self.messages.get(&id).map(|m| m.clone()))
    }

    async fn list_messages(&self, channel: &ChatChannel) -> anyhow::Result<Vec<ChatMessage>> {
        let mut messages: Vec<ChatMessage> = self
            .messages
            .iter()
            .filter(|m| &m.channel == channel)
            .map(|m| m.value().clone())
            .collect();
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(messages)
    }

    async fn insert_message(&self, message: ChatMessage) -> anyhow::Result<()> {
        self.messages.insert(message.id, message);
        Ok(())
    }

    async fn remove_message(&self, id: Uuid) -> anyhow::Result<Option<ChatMessage>> {
        Ok(self.messages.remove(&id).map(|(_, m)| m))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::sync::Arc;

    fn user(name: &str, balance: u64) -> User {
        User::new(name, "hash", None, balance, Utc::now())
    }

    fn product(author: &str, price: u64) -> Product {
        Product {
            id: Uuid::now_v7(),
            title: "Chair".into(),
            description: "Oak".into(),
            image_url: "https://x.org/c.png".into(),
            author: author.into(),
            price,
            created_at: Utc::now(),
            purchased_by: None,
            purchased_at: None,
            is_deleted: false,
            revision: 0,
        }
    }

    fn applied<T: std::fmt::Debug>(outcome: WriteOutcome<T>) -> T {
        match outcome {
            WriteOutcome::Applied(v) => v,
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn insert_user_rejects_duplicate() {
        let store = MemoryStore::new();
        let first = applied(store.insert_user(user("alice", 0)).await.unwrap());
        assert_eq!(first.revision, 1);
        assert_eq!(
            store.insert_user(user("alice", 9)).await.unwrap(),
            WriteOutcome::Conflict
        );
        assert_eq!(store.get_user("alice").await.unwrap().unwrap().balance, 0);
    }

    #[tokio::test]
    async fn replace_user_is_compare_and_set() {
        let store = MemoryStore::new();
        let stored = applied(store.insert_user(user("alice", 0)).await.unwrap());

        let mut a = stored.clone();
        a.balance = 10;
        let mut b = stored;
        b.balance = 20;

        let a = applied(store.replace_user(a).await.unwrap());
        assert_eq!(a.revision, 2);
        assert_eq!(store.replace_user(b).await.unwrap(), WriteOutcome::Conflict);
        assert_eq!(store.get_user("alice").await.unwrap().unwrap().balance, 10);

        assert_eq!(
            store.replace_user(user("ghost", 1)).await.unwrap(),
            WriteOutcome::Missing
        );
    }

    #[tokio::test]
    async fn purchase_commit_is_all_or_nothing() {
        let store = MemoryStore::new();
        let buyer = applied(store.insert_user(user("alice", 100)).await.unwrap());
        let seller = applied(store.insert_user(user("bob", 0)).await.unwrap());
        let item = applied(store.insert_product(product("bob", 40)).await.unwrap());

        // Someone else touches the seller first: the commit must not land.
        let mut bumped = seller.clone();
        bumped.bio = Some("changed".into());
        applied(store.replace_user(bumped).await.unwrap());

        let mut p = item.clone();
        p.mark_purchased("alice", Utc::now());
        let mut b = buyer.clone();
        b.balance -= 40;
        let mut s = seller.clone();
        s.balance += 40;
        let outcome = store
            .commit_purchase(PurchaseCommit {
                product: p,
                buyer: b,
                seller: s,
            })
            .await
            .unwrap();
        assert!(!outcome.is_applied());

        assert_eq!(store.get_user("alice").await.unwrap().unwrap().balance, 100);
        assert!(!store.get_product(item.id).await.unwrap().unwrap().is_sold());
    }

    #[tokio::test]
    async fn concurrent_purchase_commits_only_one_wins() {
        let store = Arc::new(MemoryStore::new());
        let a = applied(store.insert_user(user("alice", 100)).await.unwrap());
        let c = applied(store.insert_user(user("carol", 100)).await.unwrap());
        let seller = applied(store.insert_user(user("bob", 0)).await.unwrap());
        let item = applied(store.insert_product(product("bob", 60)).await.unwrap());

        let attempt = |buyer: User| {
            let store = Arc::clone(&store);
            let mut p = item.clone();
            let mut s = seller.clone();
            let mut b = buyer;
            tokio::spawn(async move {
                p.mark_purchased(&b.username, Utc::now());
                b.balance -= 60;
                s.balance += 60;
                store
                    .commit_purchase(PurchaseCommit {
                        product: p,
                        buyer: b,
                        seller: s,
                    })
                    .await
                    .unwrap()
                    .is_applied()
            })
        };
        let (x, y) = tokio::join!(attempt(a), attempt(c));
        assert!(x.unwrap() ^ y.unwrap());
        assert_eq!(store.get_user("bob").await.unwrap().unwrap().balance, 60);
    }

    #[tokio::test]
    async fn chat_is_scoped_per_channel_in_order() {
        let store = MemoryStore::new();
        let now = Utc::now();
        for (i, channel) in [
            ChatChannel::Public,
            ChatChannel::between("amy", "bob"),
            ChatChannel::Public,
        ]
        .into_iter()
        .enumerate()
        {
            store
                .insert_message(ChatMessage {
                    id: Uuid::now_v7(),
                    channel,
                    author: "amy".into(),
                    body: format!("m{i}"),
                    created_at: now + chrono::Duration::seconds(i as i64),
                })
                .await
                .unwrap();
        }
        let public = store.list_messages(&ChatChannel::Public).await.unwrap();
        assert_eq!(
            public.iter().map(|m| m.body.as_str()).collect::<Vec<_>>(),
            ["m0", "m2"]
        );
        let private = store
            .list_messages(&ChatChannel::between("bob", "amy"))
            .await
            .unwrap();
        assert_eq!(private.len(), 1);
    }
}
