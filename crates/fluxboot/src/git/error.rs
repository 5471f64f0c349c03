//! Git port error kinds.
//!
//! The distinguished variants are control-flow signals, not failures: a
//! caller that clones an empty remote falls back to local initialization,
//! a pull that is already up to date is a no-op. They are modeled as enum
//! kinds so callers branch on structure instead of matching stderr text.

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the Local Git Port and the Remote Provider Port.
#[derive(Error, Debug)]
pub enum GitError {
    #[error("remote repository {repository} is empty and cannot be cloned")]
    RepositoryIsEmpty { repository: String },

    #[error("repository {repository} is already up to date")]
    RepositoryUpToDate { repository: String },

    #[error("remote branch {branch} does not exist")]
    RemoteBranchDoesNotExist { branch: String },

    #[error("repository {owner}/{repository} does not exist")]
    RepositoryDoesNotExist { owner: String, repository: String },

    #[error("branch {branch} already exists")]
    BranchAlreadyExists { branch: String },

    #[error("git authentication failed: {0}")]
    AuthFailed(String),

    #[error("git network error: {0}")]
    Network(String),

    #[error("git {operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },

    #[error("git {operation} failed: {message}")]
    CommandFailed {
        operation: &'static str,
        message: String,
    },

    #[error("provider request failed: {0}")]
    Provider(String),

    #[error("io error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl GitError {
    /// Returns true for expected alternate-path conditions that callers
    /// convert into control flow rather than treat as failures. Retrying
    /// them cannot change the outcome.
    pub fn is_signal(&self) -> bool {
        matches!(
            self,
            GitError::RepositoryIsEmpty { .. }
                | GitError::RepositoryUpToDate { .. }
                | GitError::RemoteBranchDoesNotExist { .. }
                | GitError::RepositoryDoesNotExist { .. }
                | GitError::BranchAlreadyExists { .. }
        )
    }

    /// Returns true if the error is likely transient and the operation can
    /// be retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, GitError::Network(_) | GitError::Timeout { .. })
    }
}

/// Classifies a git stderr string into a structured error kind.
pub fn classify_git_stderr(operation: &'static str, stderr: &str, repository: &str) -> GitError {
    let lower = stderr.to_lowercase();

    if lower.contains("remote repository is empty")
        || lower.contains("you appear to have cloned an empty repository")
    {
        return GitError::RepositoryIsEmpty {
            repository: repository.to_string(),
        };
    }

    if lower.contains("couldn't find remote ref") {
        let branch = stderr
            .rsplit(|c: char| c.is_whitespace() || c == '/')
            .next()
            .unwrap_or("")
            .trim()
            .to_string();
        return GitError::RemoteBranchDoesNotExist { branch };
    }

    if lower.contains("could not resolve host")
        || lower.contains("connection refused")
        || lower.contains("connection timed out")
        || lower.contains("network is unreachable")
        || lower.contains("unable to access")
        || lower.contains("failed to connect")
        || lower.contains("couldn't connect to server")
        || lower.contains("the remote end hung up unexpectedly")
    {
        return GitError::Network(stderr.trim().to_string());
    }

    if lower.contains("authentication failed")
        || lower.contains("permission denied")
        || lower.contains("invalid credentials")
        || lower.contains("could not read username")
    {
        return GitError::AuthFailed(stderr.trim().to_string());
    }

    GitError::CommandFailed {
        operation,
        message: stderr.trim().to_string(),
    }
}

/// Result type for git port operations.
pub type Result<T> = std::result::Result<T, GitError>;
