//! Supplies the PBKDF2 password that unlocks the trust-store container
//! (§4.1), so it never has to be hardcoded alongside the store itself.

use crate::{KeychainProvider, Result, SystemKeychain};
use std::sync::Arc;
use zeroize::Zeroizing;

/// Credential key the trust-store password is stored under in whatever
/// `KeychainProvider` backs a `KeychainPasswordProvider`.
pub const TRUST_STORE_PASSWORD_KEY: &str = "trust-store-password";

/// Supplies the trust-store password at activation/load time.
pub trait TrustStorePasswordProvider: Send + Sync {
    fn password(&self) -> Result<Zeroizing<String>>;
}

/// Reads the trust-store password from an OS-native keychain.
pub struct KeychainPasswordProvider<P: KeychainProvider = SystemKeychain> {
    provider: Arc<P>,
}

impl<P: KeychainProvider> KeychainPasswordProvider<P> {
    pub fn new(provider: Arc<P>) -> Self {
        Self { provider }
    }
}

impl KeychainPasswordProvider<SystemKeychain> {
    /// Convenience constructor over the default OS keychain.
    pub fn system(service: impl Into<String>, username: impl Into<String>) -> Result<Self> {
        Ok(Self::new(Arc::new(SystemKeychain::new(service, username)?)))
    }
}

impl<P: KeychainProvider> TrustStorePasswordProvider for KeychainPasswordProvider<P> {
    fn password(&self) -> Result<Zeroizing<String>> {
        let credential = self.provider.get_credential(TRUST_STORE_PASSWORD_KEY)?;
        let password = credential
            .as_str()
            .ok_or_else(|| crate::KeychainError::InvalidCredential(
                "trust-store password is not valid UTF-8".to_string(),
            ))?
            .to_string();
        Ok(Zeroizing::new(password))
    }
}

/// Fixed password, for tests and local development where no OS keychain is
/// available.
pub struct StaticPasswordProvider(Zeroizing<String>);

impl StaticPasswordProvider {
    pub fn new(password: impl Into<String>) -> Self {
        Self(Zeroizing::new(password.into()))
    }
}

impl TrustStorePasswordProvider for StaticPasswordProvider {
    fn password(&self) -> Result<Zeroizing<String>> {
        Ok(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_provider_returns_configured_password() {
        let provider = StaticPasswordProvider::new("correct-horse-battery-staple");
        assert_eq!(provider.password().unwrap().as_str(), "correct-horse-battery-staple");
    }

    #[test]
    fn keychain_provider_surfaces_not_found() {
        struct EmptyKeychain;
        impl KeychainProvider for EmptyKeychain {
            fn set_credential(&self, _key: &str, _value: &[u8]) -> Result<()> {
                Ok(())
            }
            fn get_credential(&self, key: &str) -> Result<crate::SecureCredential> {
                Err(crate::KeychainError::CredentialNotFound(key.to_string()))
            }
            fn delete_credential(&self, _key: &str) -> Result<()> {
                Ok(())
            }
            fn has_credential(&self, _key: &str) -> bool {
                false
            }
        }

        let provider = KeychainPasswordProvider::new(Arc::new(EmptyKeychain));
        assert!(matches!(
            provider.password().unwrap_err(),
            crate::KeychainError::CredentialNotFound(_)
        ));
    }
}
