//! The user directory userauth checks requests against.

use std::collections::HashMap;

/// A single authorized account: a name, an optional password, and authorized public keys.
#[derive(Debug, Clone)]
pub struct User {
    pub name: String,
    pub password: Option<String>,
    pub public_keys: Vec<AuthorizedKey>,
}

/// A public key authorized for a user, by algorithm name and wire blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizedKey {
    pub algorithm: String,
    pub blob: Vec<u8>,
}

impl User {
    pub fn authorizes(&self, algorithm: &str, blob: &[u8]) -> bool {
        self.public_keys
            .iter()
            .any(|key| key.algorithm == algorithm && key.blob == blob)
    }
}

/// Read-only lookup of accounts by name; the core never mutates a `UserDb`.
///
/// A host may back this with anything — a config file, LDAP, a database — as long as
/// lookups are cheap enough to run inline in the userauth state machine.
pub trait UserDb {
    fn lookup(&self, name: &str) -> Option<&User>;
}

/// A simple in-memory [`UserDb`], keyed by username.
#[derive(Debug, Default)]
pub struct Directory {
    users: HashMap<String, User>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, user: User) -> &mut Self {
        self.users.insert(user.name.clone(), user);
        self
    }
}

impl UserDb for Directory {
    fn lookup(&self, name: &str) -> Option<&User> {
        self.users.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_finds_inserted_user() {
        let mut directory = Directory::new();
        directory.insert(User {
            name: "alice".into(),
            password: Some("hunter2".into()),
            public_keys: Vec::new(),
        });

        assert!(directory.lookup("alice").is_some());
        assert!(directory.lookup("bob").is_none());
    }

    #[test]
    fn authorizes_matches_algorithm_and_blob() {
        let user = User {
            name: "alice".into(),
            password: None,
            public_keys: vec![AuthorizedKey {
                algorithm: "ssh-ed25519".into(),
                blob: vec![1, 2, 3],
            }],
        };

        assert!(user.authorizes("ssh-ed25519", &[1, 2, 3]));
        assert!(!user.authorizes("ssh-rsa", &[1, 2, 3]));
        assert!(!user.authorizes("ssh-ed25519", &[9, 9, 9]));
    }
}
