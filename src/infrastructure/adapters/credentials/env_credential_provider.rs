//! 环境变量凭据提供者

use crate::application::ports::{Credential, CredentialError, CredentialProviderPort};

pub const DEFAULT_CREDENTIAL_ENV: &str = "CADENZA_API_KEY";

/// 从环境变量读取 API Key
///
/// 每次调用都重新读取，宿主可以在运行中更新凭据
pub struct EnvCredentialProvider {
    var: String,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

impl Default for EnvCredentialProvider {
    fn default() -> Self {
        Self::new(DEFAULT_CREDENTIAL_ENV)
    }
}

impl CredentialProviderPort for EnvCredentialProvider {
    fn get_credential(&self) -> Result<Credential, CredentialError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(Credential::new(value.trim())),
            _ => Err(CredentialError::Missing(format!(
                "environment variable {} is not set",
                self.var
            ))),
        }
    }
}

/// 固定凭据（嵌入式宿主或测试）
pub struct StaticCredentialProvider {
    credential: Option<Credential>,
}

impl StaticCredentialProvider {
    pub fn new(secret: impl AsRef<str>) -> Self {
        let secret = secret.as_ref().trim();
        Self {
            credential: (!secret.is_empty()).then(|| Credential::new(secret)),
        }
    }

    /// 始终缺失的凭据
    pub fn missing() -> Self {
        Self { credential: None }
    }
}

impl CredentialProviderPort for StaticCredentialProvider {
    fn get_credential(&self) -> Result<Credential, CredentialError> {
        self.credential
            .clone()
            .ok_or_else(|| CredentialError::Missing("no API key configured".to_string()))
    }
}
