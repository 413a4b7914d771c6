//! Credential Provider Port - API 凭据来源
//!
//! 凭据只读，在所有并发会话间共享且不复制

use std::sync::Arc;
use thiserror::Error;

use crate::application::error::ComposerError;

/// 凭据错误
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("{0}")]
    Missing(String),
}

impl From<CredentialError> for ComposerError {
    fn from(err: CredentialError) -> Self {
        match err {
            CredentialError::Missing(message) => ComposerError::MissingCredential(message),
        }
    }
}

/// API 凭据
///
/// `Debug` / `Display` 均不输出明文
#[derive(Clone, PartialEq, Eq)]
pub struct Credential(Arc<str>);

impl Credential {
    pub fn new(secret: impl Into<Arc<str>>) -> Self {
        Self(secret.into())
    }

    /// 仅在构造请求头时使用
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Credential(****)")
    }
}

impl std::fmt::Display for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("****")
    }
}

/// Credential Provider Port
pub trait CredentialProviderPort: Send + Sync {
    fn get_credential(&self) -> Result<Credential, CredentialError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credential_is_redacted() {
        let credential = Credential::new("sk-secret-value");
        assert_eq!(format!("{:?}", credential), "Credential(****)");
        assert_eq!(credential.to_string(), "****");
        assert_eq!(credential.expose(), "sk-secret-value");
    }

    #[test]
    fn test_clones_share_storage() {
        let credential = Credential::new("sk-secret-value");
        let clone = credential.clone();
        assert!(std::ptr::eq(credential.expose(), clone.expose()));
    }
}
