//! Secret lookup using the system keyring.
//!
//! Passwords are never stored in the configuration file. Each one is looked
//! up by (service, account), where the service is the server host name and
//! the account is the login name:
//! - Linux: Secret Service (GNOME Keyring, `KWallet`)
//! - macOS: Keychain
//! - Windows: Credential Manager

use keyring::Entry;
use tracing::debug;

/// Error type for secret lookups.
#[derive(Debug, thiserror::Error)]
pub enum SecretError {
    /// No secret stored for the service and account.
    #[error("No secret stored for {account} at {service}")]
    NotFound {
        /// Service name (server host).
        service: String,
        /// Account name (login).
        account: String,
    },

    /// The secret store is locked or returned an empty secret.
    #[error("Secret store is locked; unlock it and retry ({account} at {service})")]
    Locked {
        /// Service name (server host).
        service: String,
        /// Account name (login).
        account: String,
    },

    /// Failed to access keyring.
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),
}

/// Result type for secret operations.
pub type SecretResult<T> = std::result::Result<T, SecretError>;

/// Source of login secrets.
pub trait SecretProvider {
    /// Returns the secret for `account` at `service`.
    ///
    /// # Errors
    ///
    /// Returns [`SecretError::NotFound`] when nothing is stored and
    /// [`SecretError::Locked`] when the store cannot be read.
    fn get_secret(&self, service: &str, account: &str) -> SecretResult<String>;
}

/// [`SecretProvider`] backed by the platform keyring.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringSecretProvider;

impl SecretProvider for KeyringSecretProvider {
    fn get_secret(&self, service: &str, account: &str) -> SecretResult<String> {
        let entry = Entry::new(service, account)?;
        match entry.get_password() {
            Ok(password) if password.is_empty() => {
                debug!("Empty secret returned for {account} at {service}");
                Err(SecretError::Locked {
                    service: service.to_string(),
                    account: account.to_string(),
                })
            }
            Ok(password) => Ok(password),
            Err(keyring::Error::NoEntry) => {
                debug!("No secret found for {account} at {service}");
                Err(SecretError::NotFound {
                    service: service.to_string(),
                    account: account.to_string(),
                })
            }
            Err(keyring::Error::NoStorageAccess(e)) => {
                debug!("Keyring not accessible: {e}");
                Err(SecretError::Locked {
                    service: service.to_string(),
                    account: account.to_string(),
                })
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_entry() {
        let err = SecretError::NotFound {
            service: "imap.example.com".into(),
            account: "alice".into(),
        };
        assert_eq!(err.to_string(), "No secret stored for alice at imap.example.com");

        let err = SecretError::Locked {
            service: "smtp.example.com".into(),
            account: "alice".into(),
        };
        assert!(err.to_string().contains("unlock"));
    }
}
