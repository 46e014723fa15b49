//! Bearer credential sources.
//!
//! The request client asks its source for a token on every attempt, so a
//! token rotated on disk or in the environment is picked up without a restart.

use crate::error::{CoreError, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::warn;

/// Source of an optional bearer token.
pub trait CredentialSource: Send + Sync {
    /// Current token, or `None` when requests should go out unauthenticated.
    fn bearer_token(&self) -> Option<String>;
}

/// Fixed token (or no token at all).
#[derive(Debug, Clone, Default)]
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(Some(token.into()))
    }

    /// Source that never yields a token.
    pub fn none() -> Self {
        Self(None)
    }
}

impl CredentialSource for StaticToken {
    fn bearer_token(&self) -> Option<String> {
        self.0.clone()
    }
}

/// Token read from an environment variable.
#[derive(Debug, Clone)]
pub struct EnvToken {
    var: String,
}

impl EnvToken {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }
}

impl CredentialSource for EnvToken {
    fn bearer_token(&self) -> Option<String> {
        std::env::var(&self.var)
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }
}

/// Token persisted in a local file.
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    /// Read the token. A missing or blank file yields `Ok(None)`.
    pub fn read(&self) -> Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => {
                let token = content.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(CoreError::CredentialRead {
                path: self.path.display().to_string(),
                source,
            }),
        }
    }
}

impl CredentialSource for TokenFile {
    fn bearer_token(&self) -> Option<String> {
        self.read().unwrap_or_else(|e| {
            warn!(error = %e, "Ignoring unreadable token file");
            None
        })
    }
}

/// Ordered list of sources; the first one yielding a token wins.
#[derive(Clone, Default)]
pub struct CredentialChain {
    sources: Vec<Arc<dyn CredentialSource>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a source with lower priority than the ones already present.
    pub fn with(mut self, source: impl CredentialSource + 'static) -> Self {
        self.sources.push(Arc::new(source));
        self
    }

    /// Persisted token first, then the environment.
    pub fn standard(token_file: Option<&Path>, env_var: &str) -> Self {
        let chain = Self::new();
        let chain = match token_file {
            Some(path) => chain.with(TokenFile::new(path)),
            None => chain,
        };
        chain.with(EnvToken::new(env_var))
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}

impl CredentialSource for CredentialChain {
    fn bearer_token(&self) -> Option<String> {
        self.sources.iter().find_map(|s| s.bearer_token())
    }
}
