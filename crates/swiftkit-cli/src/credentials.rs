use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "swiftkit";

/// Keystone passwords kept in the OS keychain, keyed by username
pub struct CredentialStore;

impl CredentialStore {
    fn entry(username: &str) -> Result<Entry> {
        if username.is_empty() {
            anyhow::bail!("Cannot use the keychain without a username");
        }
        Entry::new(SERVICE_NAME, username).context("Failed to create keyring entry")
    }

    /// Store the Keystone password for `username` in the OS keychain
    pub fn store(username: &str, password: &str) -> Result<()> {
        Self::entry(username)?
            .set_password(password)
            .context("Failed to store password in keychain")
    }

    /// Retrieve the saved password for `username` from the OS keychain
    pub fn get_password(username: &str) -> Result<String> {
        Self::entry(username)?
            .get_password()
            .context("Failed to retrieve password from keychain")
    }

    /// Delete the saved password for `username`
    pub fn delete(username: &str) -> Result<()> {
        Self::entry(username)?
            .delete_credential()
            .context("Failed to delete credential from keychain")
    }
}
