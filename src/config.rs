//! The bundle of host identity, user database, and injected collaborators a [`Session`] needs.
//!
//! [`Session`]: crate::session::Session

use crate::{
    hostkey::HostKey,
    provider::{DiffieHellman, ModPow, OsRandom, Random},
    user::UserDb,
};

/// Everything a host supplies to stand up one [`Session`](crate::session::Session).
pub struct Config {
    pub(crate) host_key: HostKey,
    pub(crate) users: Box<dyn UserDb + Send + Sync>,
    pub(crate) random: Box<dyn Random + Send + Sync>,
    pub(crate) dh: Box<dyn DiffieHellman + Send + Sync>,
    pub(crate) banner: Option<String>,
}

impl Config {
    /// Builds a `Config` from a host private key and a user directory, defaulting to
    /// OS-entropy randomness and `num-bigint` modular exponentiation.
    pub fn new(host_key: ssh_key::PrivateKey, users: impl UserDb + Send + Sync + 'static) -> Self {
        Self {
            host_key: HostKey::Private(host_key),
            users: Box::new(users),
            random: Box::new(OsRandom),
            dh: Box::new(ModPow),
            banner: None,
        }
    }

    /// Sets a userauth banner message, sent once right after `SERVICE_ACCEPT`.
    pub fn with_banner(mut self, banner: impl Into<String>) -> Self {
        self.banner = Some(banner.into());
        self
    }

    /// Overrides the randomness source, e.g. with a deterministic fixture in tests.
    pub fn with_random(mut self, random: impl Random + Send + Sync + 'static) -> Self {
        self.random = Box::new(random);
        self
    }

    /// Overrides the Diffie-Hellman provider, e.g. with a deterministic fixture in tests.
    pub fn with_dh(mut self, dh: impl DiffieHellman + Send + Sync + 'static) -> Self {
        self.dh = Box::new(dh);
        self
    }

    pub(crate) fn host_key_algorithm(&self) -> &str {
        self.host_key.algorithm_name()
    }
}
