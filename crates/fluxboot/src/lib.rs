//! Git-backed cluster configuration sync and Flux GitOps bootstrap.
//!
//! This crate keeps a Kubernetes cluster's declarative configuration in a
//! version-controlled git repository and installs the Flux reconciler to
//! apply it. It converges whatever state the repository starts in — not
//! yet created, empty, already cloned, diverged — into a working local
//! clone on the right branch, materializes the cluster's manifests into
//! that tree, and sequences commit, push and reconciler bootstrap around
//! it.

pub mod cluster;
pub mod exec;
pub mod filewriter;
pub mod git;
pub mod gitops;
pub mod retrier;
pub mod validations;

pub use cluster::{
    ChangeDiff, Cluster, ClusterConfig, ClusterSpec, ComponentChangeDiff, GenericGitConfig,
    GitOpsConfig, GitProviderConfig, GithubProviderConfig, Image, ManagementComponents,
    ProviderConfig,
};
pub use exec::{FluxCli, Kubectl};
pub use filewriter::FileWriter;
pub use git::{GitCli, GitError, GitTools, LibGit, TokenAuth};
pub use gitops::{Flux, FluxClient, GitOpsError, KubeClient};
pub use retrier::Retrier;
pub use validations::{run_validations, Validation, ValidationResult};
