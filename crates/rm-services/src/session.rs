//! Session Manager.
//!
//! Authenticates credentials, issues the opaque session token, keeps the
//! current identity in memory and mirrors it into client-side storage so
//! it survives a restart. Storage failures never fail an operation: they
//! are logged and the manager degrades to "unauthenticated".

use std::sync::Arc;

use rm_core::clock::Clock;
use rm_core::error::{MarketError, Result};
use rm_core::models::{PublicUser, StoredSession, User, WriteOutcome};
use rm_core::policy;
use rm_core::traits::{AuthProvider, KeyValueStore, UserRepo};
use rm_core::validation;
use tokio::sync::RwLock;

use crate::access::{load_user, update_user_with};
use crate::MarketSettings;

/// Fixed storage key of the persisted session record.
pub const SESSION_KEY: &str = "rusty_market.session";

/// Who is logged in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub username: String,
    pub token: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub user: PublicUser,
    pub token: String,
}

pub struct SessionManager {
    users: Arc<dyn UserRepo>,
    auth: Arc<dyn AuthProvider>,
    storage: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    settings: MarketSettings,
    current: RwLock<Option<Identity>>,
}

impl SessionManager {
    pub fn new(
        users: Arc<dyn UserRepo>,
        auth: Arc<dyn AuthProvider>,
        storage: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        settings: MarketSettings,
    ) -> Self {
        Self {
            users,
            auth,
            storage,
            clock,
            settings,
            current: RwLock::new(None),
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<LoginOutcome> {
        let now = self.clock.now();
        let Some(user) = self.users.get_user(username).await? else {
            tracing::debug!(username, "login for unknown user");
            return Err(MarketError::InvalidCredentials);
        };
        if !self.auth.verify_password(password, &user.password_hash) {
            tracing::debug!(username, "login with wrong password");
            return Err(MarketError::InvalidCredentials);
        }

        if let Some(expiry) = user
            .ban_expiry
            .filter(|_| policy::is_currently_banned(&user, now))
        {
            let days_remaining = policy::days_remaining(expiry, now);
            tracing::info!(username, days_remaining, "login refused for banned user");
            return Err(MarketError::Banned { days_remaining });
        }

        let user = if policy::has_lapsed_ban(&user, now) {
            self.lift_lapsed_ban(username).await?
        } else {
            user
        };

        let token = self.auth.issue_token()?;
        let record = StoredSession {
            user_id: user.username.clone(),
            token: token.clone(),
            expires_at: (now + self.settings.session_ttl).timestamp_millis(),
        };
        self.persist(&record).await;
        *self.current.write().await = Some(Identity {
            username: user.username.clone(),
            token: token.clone(),
        });

        tracing::info!(username, "login succeeded");
        Ok(LoginOutcome {
            user: user.to_public(now),
            token,
        })
    }

    /// Clears an expired ban as a side effect of a login attempt. If an
    /// admin re-banned the user meanwhile, the new ban wins.
    async fn lift_lapsed_ban(&self, username: &str) -> Result<User> {
        let now = self.clock.now();
        let user = update_user_with(&*self.users, username, |u| {
            if let Some(expiry) = u.ban_expiry.filter(|_| policy::is_currently_banned(u, now)) {
                return Err(MarketError::Banned {
                    days_remaining: policy::days_remaining(expiry, now),
                });
            }
            u.lift_ban();
            Ok(())
        })
        .await
        .map_err(|e| match e {
            MarketError::NotFound(..) => MarketError::InvalidCredentials,
            other => other,
        })?;
        tracing::info!(username, "expired ban lifted on login");
        Ok(user)
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        bio: Option<&str>,
    ) -> Result<PublicUser> {
        validation::username(username)?;
        validation::password(password)?;
        let bio = validation::bio(bio)?;

        if self.users.get_user(username).await?.is_some() {
            return Err(MarketError::UsernameTaken(username.to_string()));
        }

        let now = self.clock.now();
        let hash = self.auth.hash_password(password)?;
        let user = User::new(username, hash, bio, self.settings.starting_balance, now);
        match self.users.insert_user(user).await? {
            WriteOutcome::Applied(stored) => {
                tracing::info!(username, "user registered");
                Ok(stored.to_public(now))
            }
            WriteOutcome::Conflict | WriteOutcome::Missing => {
                Err(MarketError::UsernameTaken(username.to_string()))
            }
        }
    }

    pub async fn logout(&self) {
        let previous = self.current.write().await.take();
        self.discard_persisted().await;
        if let Some(identity) = previous {
            tracing::info!(username = %identity.username, "logged out");
        }
    }

    /// Startup hook. Any problem with the stored record leaves the
    /// manager unauthenticated and the record removed.
    pub async fn restore_session(&self) -> Option<PublicUser> {
        let raw = match self.storage.get(SESSION_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "could not read persisted session");
                self.discard_persisted().await;
                return None;
            }
        };

        let record: StoredSession = match serde_json::from_str(&raw) {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(error = %e, "discarding malformed session record");
                self.discard_persisted().await;
                return None;
            }
        };

        let now = self.clock.now();
        if record.user_id.is_empty() || record.token.is_empty() || record.is_expired(now) {
            tracing::info!(user_id = %record.user_id, "discarding stale session record");
            self.discard_persisted().await;
            return None;
        }

        match self.users.get_user(&record.user_id).await {
            Ok(Some(user)) if !policy::is_currently_banned(&user, now) => {
                *self.current.write().await = Some(Identity {
                    username: user.username.clone(),
                    token: record.token,
                });
                tracing::info!(username = %user.username, "session restored");
                Some(user.to_public(now))
            }
            Ok(_) => {
                tracing::info!(user_id = %record.user_id, "session user gone or banned");
                self.discard_persisted().await;
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not load session user");
                self.discard_persisted().await;
                None
            }
        }
    }

    pub async fn identity(&self) -> Option<Identity> {
        self.current.read().await.clone()
    }

    async fn require_identity(&self) -> Result<Identity> {
        self.identity().await.ok_or(MarketError::NotAuthenticated)
    }

    /// Fresh view of the logged-in user.
    pub async fn current_user(&self) -> Result<Option<PublicUser>> {
        let Some(identity) = self.identity().await else {
            return Ok(None);
        };
        let user = self.users.get_user(&identity.username).await?;
        Ok(user.map(|u| u.to_public(self.clock.now())))
    }

    pub async fn update_password(&self, old: &str, new: &str) -> Result<PublicUser> {
        let identity = self.require_identity().await?;
        let current = load_user(&*self.users, &identity.username).await?;
        if !self.auth.verify_password(old, &current.password_hash) {
            return Err(MarketError::WrongOldPassword);
        }
        validation::password(new)?;
        let new_hash = self.auth.hash_password(new)?;
        let auth = Arc::clone(&self.auth);

        let user = update_user_with(&*self.users, &identity.username, |u| {
            // the hash may have changed since it was checked above
            if u.password_hash != current.password_hash
                && !auth.verify_password(old, &u.password_hash)
            {
                return Err(MarketError::WrongOldPassword);
            }
            u.password_hash = new_hash.clone();
            Ok(())
        })
        .await?;
        tracing::info!(username = %identity.username, "password changed");
        Ok(user.to_public(self.clock.now()))
    }

    pub async fn update_bio(&self, text: &str) -> Result<PublicUser> {
        let identity = self.require_identity().await?;
        let bio = validation::bio(Some(text))?;
        let user = update_user_with(&*self.users, &identity.username, |u| {
            u.bio = bio.clone();
            Ok(())
        })
        .await?;
        Ok(user.to_public(self.clock.now()))
    }

    /// Sets the balance of the logged-in user to `amount`.
    pub async fn update_balance(&self, amount: i64) -> Result<PublicUser> {
        let identity = self.require_identity().await?;
        let amount = u64::try_from(amount).map_err(|_| MarketError::Negative)?;
        let user = update_user_with(&*self.users, &identity.username, |u| {
            u.balance = amount;
            Ok(())
        })
        .await?;
        tracing::info!(username = %identity.username, balance = amount, "balance set");
        Ok(user.to_public(self.clock.now()))
    }

    async fn persist(&self, record: &StoredSession) {
        let json = match serde_json::to_string(record) {
            Ok(json) => json,
            Err(e) => {
                tracing::warn!(error = %e, "could not encode session record");
                return;
            }
        };
        if let Err(e) = self.storage.set(SESSION_KEY, &json).await {
            tracing::warn!(error = %e, "could not persist session; it will not survive a restart");
        }
    }

    async fn discard_persisted(&self) {
        if let Err(e) = self.storage.remove(SESSION_KEY).await {
            tracing::warn!(error = %e, "could not clear persisted session");
        }
    }
}
