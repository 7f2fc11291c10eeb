//! Rusty-Market application services.
//!
//! Each service holds `Arc`s of the ports it needs; [`Market`] wires them
//! all from one [`Ports`] bundle so the binary and the integration tests
//! build the same graph.

pub(crate) mod access;
pub mod chat;
pub mod marketplace;
pub mod moderation;
pub mod reports;
pub mod session;
pub mod tasks;

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::traits::{AuthProvider, ChatRepo, KeyValueStore, ProductRepo, ReportRepo, UserRepo};

pub use chat::ChatService;
pub use marketplace::{Marketplace, PurchaseReceipt};
pub use moderation::BanService;
pub use reports::ReportService;
pub use session::{Identity, LoginOutcome, SessionManager, SESSION_KEY};
pub use tasks::{sale_sweeper, ListingFeed, PeriodicTask};

/// Tunables the services read. Built from `rm-config` by the binary.
#[derive(Debug, Clone)]
pub struct MarketSettings {
    pub starting_balance: u64,
    pub session_ttl: chrono::Duration,
    /// Sold products older than this are hidden by the sweep
    pub sale_retention: chrono::Duration,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            starting_balance: 5_000_000,
            session_ttl: chrono::Duration::days(7),
            sale_retention: chrono::Duration::hours(24),
        }
    }
}

/// Every adapter the services depend on.
#[derive(Clone)]
pub struct Ports {
    pub users: Arc<dyn UserRepo>,
    pub products: Arc<dyn ProductRepo>,
    pub reports: Arc<dyn ReportRepo>,
    pub chat: Arc<dyn ChatRepo>,
    /// Client-side storage for the persisted session record
    pub client_storage: Arc<dyn KeyValueStore>,
    pub auth: Arc<dyn AuthProvider>,
    pub clock: Arc<dyn Clock>,
}

pub struct Market {
    pub session: SessionManager,
    pub bans: BanService,
    /// Shared with the background sweeper and listing feed
    pub marketplace: Arc<Marketplace>,
    pub reports: ReportService,
    pub chat: ChatService,
}

impl Market {
    pub fn new(ports: Ports, settings: MarketSettings) -> Self {
        let session = SessionManager::new(
            ports.users.clone(),
            ports.auth,
            ports.client_storage,
            ports.clock.clone(),
            settings.clone(),
        );
        let bans = BanService::new(ports.users.clone(), ports.clock.clone());
        let marketplace = Arc::new(Marketplace::new(
            ports.users.clone(),
            ports.products.clone(),
            ports.clock.clone(),
            settings,
        ));
        let reports = ReportService::new(
            ports.users.clone(),
            ports.products,
            ports.reports,
            ports.chat.clone(),
            ports.clock.clone(),
        );
        let chat = ChatService::new(ports.users, ports.chat, ports.clock);
        Self {
            session,
            bans,
            marketplace,
            reports,
            chat,
        }
    }
}
