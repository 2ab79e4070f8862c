use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

use crate::error::{GateError, Result};

// Immutable allow-list of bearer tokens, loaded once at startup
#[derive(Debug, Clone, Default)]
pub struct TokenAuthority {
    tokens: HashSet<String>,
}

impl TokenAuthority {
    // Build from any list of lines; blank lines are skipped
    pub fn from_lines<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = lines
            .into_iter()
            .map(|line| line.as_ref().trim().to_string())
            .filter(|token| !token.is_empty())
            .collect();
        Self { tokens }
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| GateError::TokenFile {
                path: path.to_path_buf(),
                source,
            })?;
        let authority = Self::from_lines(contents.lines());
        info!(path = %path.display(), tokens = authority.len(), "token allow-list loaded");
        Ok(authority)
    }

    pub fn contains(&self, token: &str) -> bool {
        self.tokens.contains(token)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// Short, non-reversible tag for a token so it can appear in logs.
pub fn fingerprint(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..12].to_string()
}
