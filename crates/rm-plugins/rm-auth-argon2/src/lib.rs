//! # rm-auth-argon2
//!
//! Argon2id implementation of `AuthProvider`.
//! Handles password hashing for registration and login, and issues the
//! opaque tokens stored in the client-held session record.

use anyhow::{anyhow, Context};
use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use base64::Engine;
use rm_core::traits::AuthProvider;
use secrecy::{ExposeSecret, SecretString};

const SALT_LEN: usize = 16;
const TOKEN_LEN: usize = 32;

/// Cost parameters. Defaults follow the argon2 crate's recommended values.
#[derive(Debug, Clone, Copy)]
pub struct HashCost {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for HashCost {
    fn default() -> Self {
        Self {
            memory_kib: Params::DEFAULT_M_COST,
            iterations: Params::DEFAULT_T_COST,
            parallelism: Params::DEFAULT_P_COST,
        }
    }
}

pub struct Argon2Provider {
    params: Params,
    /// Optional server-side secret mixed into every hash
    pepper: Option<SecretString>,
}

impl Argon2Provider {
    pub fn new(cost: HashCost, pepper: Option<SecretString>) -> anyhow::Result<Self> {
        let params = Params::new(cost.memory_kib, cost.iterations, cost.parallelism, None)
            .map_err(|e| anyhow!("invalid argon2 parameters: {e}"))?;
        Ok(Self { params, pepper })
    }

    fn hasher(&self) -> anyhow::Result<Argon2<'_>> {
        match &self.pepper {
            Some(secret) => Argon2::new_with_secret(
                secret.expose_secret().as_bytes(),
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            )
            .map_err(|e| anyhow!("argon2 rejected the pepper: {e}")),
            None => Ok(Argon2::new(
                Algorithm::Argon2id,
                Version::V0x13,
                self.params.clone(),
            )),
        }
    }
}

fn random_bytes<const N: usize>() -> anyhow::Result<[u8; N]> {
    let mut buf = [0u8; N];
    getrandom::getrandom(&mut buf).context("OS random source unavailable")?;
    Ok(buf)
}

impl AuthProvider for Argon2Provider {
    fn hash_password(&self, password: &str) -> anyhow::Result<String> {
        let salt = SaltString::encode_b64(&random_bytes::<SALT_LEN>()?)
            .map_err(|e| anyhow!("salt encoding failed: {e}"))?;
        let hash = self
            .hasher()?
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| anyhow!("password hashing failed: {e}"))?;
        Ok(hash.to_string())
    }

    fn verify_password(&self, password: &str, hash: &str) -> bool {
        let Ok(parsed) = PasswordHash::new(hash) else {
            return false;
        };
        let Ok(hasher) = self.hasher() else {
            return false;
        };
        hasher.verify_password(password.as_bytes(), &parsed).is_ok()
    }

    /// 256 bits of OS randomness, URL-safe base64.
    fn issue_token(&self) -> anyhow::Result<String> {
        let bytes = random_bytes::<TOKEN_LEN>()?;
        Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cheap() -> HashCost {
        HashCost {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn hash_then_verify() {
        let provider = Argon2Provider::new(cheap(), None).unwrap();
        let hash = provider.hash_password("hunter22").unwrap();
        assert!(hash.starts_with("$argon2id$"));
        assert!(!hash.contains("hunter22"));
        assert!(provider.verify_password("hunter22", &hash));
        assert!(!provider.verify_password("hunter23", &hash));
    }

    #[test]
    fn same_password_gets_distinct_salts() {
        let provider = Argon2Provider::new(cheap(), None).unwrap();
        let a = provider.hash_password("pw123456").unwrap();
        let b = provider.hash_password("pw123456").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn pepper_must_match() {
        let peppered =
            Argon2Provider::new(cheap(), Some(SecretString::from("pepper-one".to_string())))
                .unwrap();
        let plain = Argon2Provider::new(cheap(), None).unwrap();
        let hash = peppered.hash_password("secret99").unwrap();
        assert!(peppered.verify_password("secret99", &hash));
        assert!(!plain.verify_password("secret99", &hash));
    }

    #[test]
    fn malformed_hash_never_verifies() {
        let provider = Argon2Provider::new(cheap(), None).unwrap();
        assert!(!provider.verify_password("anything", "plaintext"));
    }

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let provider = Argon2Provider::new(cheap(), None).unwrap();
        let a = provider.issue_token().unwrap();
        let b = provider.issue_token().unwrap();
        assert_ne!(a, b);
        assert_eq!(a.len(), 43);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }

    #[test]
    fn rejects_impossible_cost() {
        let bad = HashCost {
            memory_kib: 1,
            ..cheap()
        };
        assert!(Argon2Provider::new(bad, None).is_err());
    }
}
