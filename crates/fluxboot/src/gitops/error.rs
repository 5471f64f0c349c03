//! Orchestration-level errors.
//!
//! Every variant names the operation and its target so a user-visible
//! failure reads as a chain: top-level operation, sub-step, underlying
//! port error.

use std::path::PathBuf;

use thiserror::Error;

use crate::filewriter::FileWriterError;
use crate::git::GitError;

#[derive(Error, Debug)]
pub enum GitOpsError {
    #[error("describing remote repository: {0}")]
    DescribeRepo(#[source] GitError),

    #[error("creating remote repository {repository}: {source}")]
    CreateRepo {
        repository: String,
        #[source]
        source: GitError,
    },

    #[error("cloning git repository: {0}")]
    Clone(#[source] GitError),

    #[error("initializing local repository: {0}")]
    InitRepo(#[source] GitError),

    #[error("committing to repository: {0}")]
    Commit(#[source] GitError),

    #[error("switching to git branch {branch}: {source}")]
    Branch {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("adding {path} to git: {source}")]
    Add {
        path: String,
        #[source]
        source: GitError,
    },

    #[error("removing {path} from git: {source}")]
    Remove {
        path: String,
        #[source]
        source: GitError,
    },

    #[error("pushing to remote: {0}")]
    Push(#[source] GitError),

    #[error("pulling branch {branch} from remote: {source}")]
    Pull {
        branch: String,
        #[source]
        source: GitError,
    },

    #[error("a cluster configuration file already exists at {}", .path.display())]
    LocalConfigPathOccupied { path: PathBuf },

    #[error("config path {path} already exists in remote repository")]
    RemoteConfigPathOccupied { path: String },

    #[error("validating remote config path: {0}")]
    RemoteConfigPathCheck(#[source] GitError),

    #[error("initializing {target} writer: {source}")]
    InitWriter {
        target: &'static str,
        #[source]
        source: FileWriterError,
    },

    #[error("writing {target} file: {source}")]
    WriteFile {
        target: &'static str,
        #[source]
        source: FileWriterError,
    },

    #[error("marshalling cluster configuration: {0}")]
    Serialize(#[from] serde_yaml::Error),

    #[error("reconciler {operation} failed: {message}")]
    Reconciler { operation: String, message: String },

    #[error("cluster api {operation} on {resource_type}/{name} failed: {message}")]
    Kube {
        operation: String,
        resource_type: String,
        name: String,
        message: String,
    },
}

/// Result type for orchestration operations.
pub type Result<T> = std::result::Result<T, GitOpsError>;
