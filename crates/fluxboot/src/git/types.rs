//! Data types shared by the git ports.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// A repository as described by the remote provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Repository {
    /// Repository name.
    pub name: String,
    /// Owning user or organization login.
    pub owner: String,
    /// Organization login, empty for personal repositories.
    pub organization: String,
    /// HTTPS clone URL.
    pub clone_url: String,
}

/// Options for creating a repository on the remote provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CreateRepoOpts {
    pub name: String,
    pub owner: String,
    pub description: String,
    /// Personal account repository rather than an organization one.
    pub personal: bool,
    /// Create the repository as private.
    pub privacy: bool,
}

/// Options for describing a repository on the remote provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GetRepoOpts {
    pub owner: String,
    pub repository: String,
}

/// Options for deleting a repository on the remote provider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteRepoOpts {
    pub owner: String,
    pub repository: String,
}

/// Token-based authentication for git transport and the provider API.
#[derive(Debug, Clone)]
pub struct TokenAuth {
    pub username: String,
    pub token: SecretString,
}

impl TokenAuth {
    pub fn new(username: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            token: SecretString::from(token.into()),
        }
    }
}
