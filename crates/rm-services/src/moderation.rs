//! Ban Policy: the administrator side.
//!
//! Bans are recorded as `can_login = false` plus an expiry. Nothing
//! sweeps them; see `rm_core::policy` for how readers evaluate them.

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::error::{MarketError, Result};
use rm_core::models::{PublicUser, UserFilter};
use rm_core::policy;
use rm_core::traits::UserRepo;

use crate::access::{require_admin, update_user_with};

pub struct BanService {
    users: Arc<dyn UserRepo>,
    clock: Arc<dyn Clock>,
}

impl BanService {
    pub fn new(users: Arc<dyn UserRepo>, clock: Arc<dyn Clock>) -> Self {
        Self { users, clock }
    }

    pub async fn ban(&self, username: &str, days: i64, actor: &str) -> Result<PublicUser> {
        let now = self.clock.now();
        require_admin(&*self.users, actor, now).await?;
        if username == actor {
            return Err(MarketError::forbidden("you cannot ban yourself"));
        }
        let until = policy::ban_until(now, days)?;

        let user = update_user_with(&*self.users, username, |u| {
            u.apply_ban(until);
            Ok(())
        })
        .await?;
        tracing::info!(username, days, %until, by = actor, "user banned");
        Ok(user.to_public(now))
    }

    pub async fn unban(&self, username: &str, actor: &str) -> Result<PublicUser> {
        let now = self.clock.now();
        require_admin(&*self.users, actor, now).await?;

        let user = update_user_with(&*self.users, username, |u| {
            u.lift_ban();
            Ok(())
        })
        .await?;
        tracing::info!(username, by = actor, "user unbanned");
        Ok(user.to_public(now))
    }

    /// Dashboard listing; each entry's `banned_until` reflects "now", not
    /// the stored flag.
    pub async fn list_users(&self, actor: &str, filter: &UserFilter) -> Result<Vec<PublicUser>> {
        let now = self.clock.now();
        require_admin(&*self.users, actor, now).await?;
        let users = self.users.list_users(filter).await?;
        Ok(users.iter().map(|u| u.to_public(now)).collect())
    }

    /// Whether `username` is barred right now.
    pub async fn is_banned(&self, username: &str) -> Result<bool> {
        let user = self
            .users
            .get_user(username)
            .await?
            .ok_or_else(|| MarketError::NotFound("user", username.to_string()))?;
        Ok(policy::is_currently_banned(&user, self.clock.now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use rm_core::clock::ManualClock;
    use rm_core::models::User;
    use rm_store_memory::MemoryStore;

    async fn setup() -> (Arc<MemoryStore>, Arc<ManualClock>, BanService) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let mut admin = User::new("admin", "h", None, 0, clock.now());
        admin.is_admin = true;
        store.insert_user(admin).await.unwrap();
        store
            .insert_user(User::new("carol", "h", None, 0, clock.now()))
            .await
            .unwrap();
        let bans = BanService::new(store.clone(), clock.clone());
        (store, clock, bans)
    }

    #[tokio::test]
    async fn ban_checks_run_in_order() {
        let (_, _, bans) = setup().await;
        assert!(matches!(
            bans.ban("carol", 7, "carol").await,
            Err(MarketError::Forbidden(_))
        ));
        assert!(matches!(
            bans.ban("carol", 0, "admin").await,
            Err(MarketError::OutOfRange(_))
        ));
        assert!(matches!(
            bans.ban("nobody", 7, "admin").await,
            Err(MarketError::NotFound("user", _))
        ));
        assert!(matches!(
            bans.ban("admin", 7, "admin").await,
            Err(MarketError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn ban_then_unban() {
        let (store, clock, bans) = setup().await;
        let view = bans.ban("carol", 3, "admin").await.unwrap();
        assert_eq!(view.banned_until, Some(clock.now() + Duration::days(3)));
        assert!(bans.is_banned("carol").await.unwrap());

        bans.unban("carol", "admin").await.unwrap();
        let carol = store.get_user("carol").await.unwrap().unwrap();
        assert!(carol.can_login);
        assert_eq!(carol.ban_expiry, None);
    }

    #[tokio::test]
    async fn listing_shows_lapsed_bans_as_inactive() {
        let (store, clock, bans) = setup().await;
        bans.ban("carol", 1, "admin").await.unwrap();
        clock.advance(Duration::days(2));

        let users = bans.list_users("admin", &UserFilter::default()).await.unwrap();
        let carol = users.iter().find(|u| u.username == "carol").unwrap();
        assert_eq!(carol.banned_until, None);
        // the stored flag is still stale until carol tries to log in
        assert!(!store.get_user("carol").await.unwrap().unwrap().can_login);
        assert!(matches!(
            bans.list_users("carol", &UserFilter::default()).await,
            Err(MarketError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn listing_filters_by_ban_record_and_role() {
        let (store, clock, bans) = setup().await;
        store
            .insert_user(User::new("dave", "h", None, 0, clock.now()))
            .await
            .unwrap();
        bans.ban("carol", 1, "admin").await.unwrap();
        // a lapsed ban still leaves a record
        clock.advance(Duration::days(2));

        let banned = UserFilter {
            with_ban_record: true,
            ..UserFilter::default()
        };
        let names: Vec<_> = bans
            .list_users("admin", &banned)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["carol".to_string()]);

        let admins = UserFilter {
            is_admin: Some(true),
            ..UserFilter::default()
        };
        let names: Vec<_> = bans
            .list_users("admin", &admins)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert_eq!(names, vec!["admin".to_string()]);
    }
}
