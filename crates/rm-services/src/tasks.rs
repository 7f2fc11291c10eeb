//! Background timers: the expired-sale sweep and the listing feed.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rm_core::models::Product;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::marketplace::Marketplace;

/// A spawned interval loop. Stops on [`PeriodicTask::cancel`] or when
/// the handle is dropped.
pub struct PeriodicTask {
    name: &'static str,
    handle: JoinHandle<()>,
}

impl PeriodicTask {
    /// Runs `tick` every `period`, starting immediately. Must be called
    /// inside a tokio runtime.
    pub fn spawn<F, Fut>(name: &'static str, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                tick().await;
            }
        });
        tracing::debug!(task = name, ?period, "periodic task started");
        Self { name, handle }
    }

    pub fn cancel(&self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            tracing::debug!(task = self.name, "periodic task cancelled");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for PeriodicTask {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Hides expired sales every `period`. Failures are logged and the next
/// tick tries again.
pub fn sale_sweeper(market: Arc<Marketplace>, period: Duration) -> PeriodicTask {
    PeriodicTask::spawn("sale-sweeper", period, move || {
        let market = market.clone();
        async move {
            if let Err(e) = market.sweep_expired_sales().await {
                tracing::error!(error = %e, "sale sweep failed");
            }
        }
    })
}

/// Last known snapshot of the public listings.
pub struct ListingFeed {
    market: Arc<Marketplace>,
    snapshot: RwLock<Vec<Product>>,
}

impl ListingFeed {
    pub fn new(market: Arc<Marketplace>) -> Arc<Self> {
        Arc::new(Self {
            market,
            snapshot: RwLock::new(Vec::new()),
        })
    }

    /// Re-reads the listings. On failure the previous snapshot is kept.
    pub async fn refresh(&self) -> usize {
        match self.market.list_listings().await {
            Ok(products) => {
                let count = products.len();
                *self.snapshot.write().await = products;
                count
            }
            Err(e) => {
                tracing::warn!(error = %e, "listing refresh failed, keeping stale snapshot");
                self.snapshot.read().await.len()
            }
        }
    }

    pub async fn latest(&self) -> Vec<Product> {
        self.snapshot.read().await.clone()
    }

    pub fn spawn_refresh(self: &Arc<Self>, period: Duration) -> PeriodicTask {
        let feed = Arc::clone(self);
        PeriodicTask::spawn("listing-feed", period, move || {
            let feed = feed.clone();
            async move {
                feed.refresh().await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MarketSettings;
    use chrono::Utc;
    use rm_core::clock::{Clock, ManualClock};
    use rm_core::models::{ListingDraft, User};
    use rm_core::traits::{ProductRepo, UserRepo};
    use rm_store_memory::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    async fn market_with_sold_item() -> (Arc<MemoryStore>, Arc<ManualClock>, Arc<Marketplace>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        for name in ["alice", "bob"] {
            store
                .insert_user(User::new(name, "h", None, 1_000, clock.now()))
                .await
                .unwrap();
        }
        let market = Arc::new(Marketplace::new(
            store.clone(),
            store.clone(),
            clock.clone(),
            MarketSettings::default(),
        ));
        let draft = ListingDraft {
            title: "Kettle".into(),
            description: "Barely used".into(),
            price: 10,
            image_url: "https://img.example.com/kettle.png".into(),
        };
        let item = market.create_listing(&draft, "bob").await.unwrap();
        market.purchase(item.id, "alice").await.unwrap();
        (store, clock, market)
    }

    async fn eventually(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..100 {
            if check() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        false
    }

    #[tokio::test]
    async fn task_ticks_until_dropped() {
        let ticks = Arc::new(AtomicUsize::new(0));
        let counter = ticks.clone();
        let task = PeriodicTask::spawn("test", Duration::from_millis(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });
        assert!(eventually(|| ticks.load(Ordering::SeqCst) >= 3).await);

        drop(task);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let after_drop = ticks.load(Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), after_drop);
    }

    #[tokio::test]
    async fn sweeper_hides_expired_sale() {
        let (store, clock, market) = market_with_sold_item().await;
        clock.advance(chrono::Duration::hours(25));

        let task = sale_sweeper(market, Duration::from_millis(5));
        let mut hidden = false;
        for _ in 0..100 {
            let listed = store
                .list_products(&rm_core::models::ProductFilter::listed())
                .await
                .unwrap();
            if listed.is_empty() {
                hidden = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(hidden);
        task.cancel();
        assert!(eventually(|| task.is_finished()).await);
    }

    #[tokio::test]
    async fn feed_tracks_listings() {
        let (_, clock, market) = market_with_sold_item().await;
        let feed = ListingFeed::new(market.clone());
        assert!(feed.latest().await.is_empty());
        assert_eq!(feed.refresh().await, 1);

        clock.advance(chrono::Duration::hours(25));
        market.sweep_expired_sales().await.unwrap();
        let _task = feed.spawn_refresh(Duration::from_millis(5));
        let mut emptied = false;
        for _ in 0..100 {
            if feed.latest().await.is_empty() {
                emptied = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(emptied);
    }
}
