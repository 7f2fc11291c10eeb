//! Shared harness for the integration tests: a fully wired [`Market`] over
//! the in-memory store, a manual clock and a cheap Argon2 configuration.

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use rm_auth_argon2::{Argon2Provider, HashCost};
use rm_core::clock::{Clock, ManualClock};
use rm_core::models::{ListingDraft, Product, User};
use rm_core::traits::{AuthProvider, KeyValueStore, UserRepo};
use rm_services::{Market, MarketSettings, Ports};
use rm_store_memory::{MemoryKv, MemoryStore};

pub struct TestMarket {
    pub store: Arc<MemoryStore>,
    pub clock: Arc<ManualClock>,
    pub auth: Arc<Argon2Provider>,
    pub client_storage: Arc<dyn KeyValueStore>,
    pub market: Market,
}

/// Minimal cost so hashing does not dominate test time.
pub fn cheap_auth() -> Argon2Provider {
    let cost = HashCost {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    };
    Argon2Provider::new(cost, None).expect("valid argon2 params")
}

impl TestMarket {
    pub fn new() -> Self {
        Self::with_client_storage(Arc::new(MemoryKv::new()))
    }

    pub fn with_client_storage(client_storage: Arc<dyn KeyValueStore>) -> Self {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap(),
        ));
        let auth = Arc::new(cheap_auth());
        let market = build(&store, &clock, &auth, &client_storage);
        Self {
            store,
            clock,
            auth,
            client_storage,
            market,
        }
    }

    /// A second process over the same data and client storage.
    pub fn restart(&self) -> Market {
        build(&self.store, &self.clock, &self.auth, &self.client_storage)
    }

    /// Inserts a user directly, bypassing registration rules.
    pub async fn seed_user(&self, username: &str, password: &str, balance: u64) -> User {
        let hash = self.auth.hash_password(password).unwrap();
        let user = User::new(username, hash, None, balance, self.clock.now());
        self.store.insert_user(user.clone()).await.unwrap();
        user
    }

    pub async fn seed_admin(&self, username: &str, password: &str) -> User {
        let hash = self.auth.hash_password(password).unwrap();
        let mut user = User::new(username, hash, None, 0, self.clock.now());
        user.is_admin = true;
        self.store.insert_user(user.clone()).await.unwrap();
        user
    }

    pub async fn user(&self, username: &str) -> User {
        self.store.get_user(username).await.unwrap().unwrap()
    }

    pub async fn list(&self, author: &str, title: &str, price: i64) -> Product {
        self.market
            .marketplace
            .create_listing(&draft(title, price), author)
            .await
            .unwrap()
    }
}

impl Default for TestMarket {
    fn default() -> Self {
        Self::new()
    }
}

fn build(
    store: &Arc<MemoryStore>,
    clock: &Arc<ManualClock>,
    auth: &Arc<Argon2Provider>,
    client_storage: &Arc<dyn KeyValueStore>,
) -> Market {
    let ports = Ports {
        users: store.clone(),
        products: store.clone(),
        reports: store.clone(),
        chat: store.clone(),
        client_storage: client_storage.clone(),
        auth: auth.clone(),
        clock: clock.clone(),
    };
    Market::new(ports, MarketSettings::default())
}

pub fn draft(title: &str, price: i64) -> ListingDraft {
    ListingDraft {
        title: title.to_string(),
        description: format!("{title} in good condition"),
        price,
        image_url: "https://img.example.com/item.jpg".to_string(),
    }
}
