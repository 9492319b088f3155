//! Credential pool: deterministic round-robin (username, password) selection.

use crate::errors::LoadError;

#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub username: String,
    pub password: String,
}

/// An ordered list of (username, password), read-only after load.
///
/// Selection for user id `u` is `entry[u mod N]`. Note the index is computed
/// with a 1-based user id directly (user 1 maps to index `1 mod N`, not index
/// 0) — an intentional quirk preserved from the system this was modeled on;
/// see DESIGN.md.
#[derive(Debug, Clone)]
pub struct Credentials {
    entries: Vec<CredentialEntry>,
}

impl Credentials {
    pub fn load(path: &str, contents: &str) -> Result<Self, LoadError> {
        let mut entries = Vec::new();

        for (idx, line) in contents.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let (username, password) = line.split_once(',').ok_or_else(|| LoadError::CredentialsParse {
                path: path.to_string(),
                line: idx + 1,
                reason: "expected 'username,password'".to_string(),
            })?;

            let username = username.trim();
            let password = password.trim();

            if username.is_empty() || password.is_empty() {
                return Err(LoadError::CredentialsParse {
                    path: path.to_string(),
                    line: idx + 1,
                    reason: "empty username or password".to_string(),
                });
            }

            entries.push(CredentialEntry {
                username: username.to_string(),
                password: password.to_string(),
            });
        }

        Ok(Self { entries })
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns the credential for user id `user_id`, or `None` if no
    /// credentials file was loaded.
    pub fn for_user(&self, user_id: u64) -> Option<&CredentialEntry> {
        if self.entries.is_empty() {
            return None;
        }
        let idx = (user_id % self.entries.len() as u64) as usize;
        self.entries.get(idx)
    }
}
