//! Authentication capability.
//!
//! The server core only knows this trait; deployments plug in their user
//! database. The bundled implementation reads a flat file with one
//! `user:password:maildir[:lang[:owner,owner...]]` line per account, which
//! is also what the integration tests use.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use async_trait::async_trait;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserMeta {
    pub username: String,
    pub maildir: PathBuf,
    pub lang: String,
}

#[async_trait]
pub trait Authenticator: Send + Sync + 'static {
    /// Pre-login gate, e.g. an address/user block list.
    async fn judge(&self, username: &str) -> bool;

    /// Verify credentials and return the account metadata.
    async fn login(&self, username: &str, password: &str) -> Option<UserMeta>;

    /// Metadata lookup without credentials, used for `user!target`
    /// impersonation.
    async fn meta(&self, username: &str) -> Option<UserMeta>;

    /// Does `actor` hold the store-owner permission on the store at
    /// `target`'s maildir?
    async fn store_owner(&self, actor: &str, target: &UserMeta) -> bool;

    /// Repeated authentication failure; block the user for a while.
    async fn ban(&self, username: &str, duration: Duration);
}

struct FileUser {
    password: String,
    meta: UserMeta,
    owners: Vec<String>,
}

/// Flat-file authenticator.
pub struct FileAuth {
    users: HashMap<String, FileUser>,
}

impl FileAuth {
    pub fn open(path: &str) -> std::io::Result<Self> {
        Ok(Self::from_str(&std::fs::read_to_string(path)?))
    }

    pub fn from_str(contents: &str) -> Self {
        let mut users = HashMap::new();
        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split(':');
            let (username, password, maildir) = match (
                fields.next(),
                fields.next(),
                fields.next(),
            ) {
                (Some(u), Some(p), Some(m)) if !u.is_empty() && !m.is_empty() => {
                    (u.to_string(), p.to_string(), PathBuf::from(m))
                }
                _ => continue,
            };
            let lang = fields.next().unwrap_or("en").to_string();
            let owners = fields
                .next()
                .map(|f| f.split(',').map(str::to_string).collect())
                .unwrap_or_default();
            users.insert(
                username.clone(),
                FileUser {
                    password,
                    meta: UserMeta {
                        username,
                        maildir,
                        lang,
                    },
                    owners,
                },
            );
        }
        FileAuth { users }
    }
}

#[async_trait]
impl Authenticator for FileAuth {
    async fn judge(&self, _username: &str) -> bool {
        true
    }

    async fn login(&self, username: &str, password: &str) -> Option<UserMeta> {
        let user = self.users.get(username)?;
        if user.password == password {
            Some(user.meta.clone())
        } else {
            None
        }
    }

    async fn meta(&self, username: &str) -> Option<UserMeta> {
        self.users.get(username).map(|u| u.meta.clone())
    }

    async fn store_owner(&self, actor: &str, target: &UserMeta) -> bool {
        self.users
            .get(&target.username)
            .map(|u| u.owners.iter().any(|o| o == actor))
            .unwrap_or(false)
    }

    async fn ban(&self, _username: &str, _duration: Duration) {}
}
