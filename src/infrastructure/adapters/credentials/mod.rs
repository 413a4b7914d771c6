//! Credential Adapters

mod env_credential_provider;

pub use env_credential_provider::{
    EnvCredentialProvider, StaticCredentialProvider, DEFAULT_CREDENTIAL_ENV,
};
