//! Repository convergence state machine.
//!
//! Converges an arbitrary starting condition — no local checkout, an
//! existing clone, a missing remote, a bare zero-commit remote — into a
//! working tree checked out at the tip of the configured branch. Every
//! transition is a named state so the decision tree is inspectable and
//! each step is unit-testable.

use std::path::Path;

use crate::cluster::{ClusterSpec, GitOpsConfig, GitProviderConfig};
use crate::git::{CreateRepoOpts, GitError};
use crate::gitops::client::GitClient;
use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::files::EKSA_SYSTEM_DIR_NAME;

const REPO_DESCRIPTION: &str = "Cluster configuration repository; managed by fluxboot";
const INIT_COMMIT_MESSAGE: &str = "initializing repository";

/// Convergence states of the working tree + remote pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoState {
    /// No local checkout exists yet.
    NoLocalRepo,
    /// A previous operation already produced a checkout.
    LocalRepoPresent,
    /// The remote's existence has not been established.
    RemoteUnknown,
    /// The remote exists (or is the user's responsibility) and can be
    /// cloned.
    RemoteExists,
    /// The provider reports no such repository.
    RemoteAbsent,
    /// The remote exists but holds zero commits and cannot be cloned.
    RemoteEmpty,
    /// The working tree is checked out at the tip of the target branch.
    Converged,
    /// A transition failed; the error carries the detail.
    Failed,
}

/// Per-cluster-spec synchronizer binding a resilient git client to one
/// cluster's GitOps configuration. Created fresh per operation and
/// discarded at the end.
pub struct RepositorySynchronizer<'a> {
    git: &'a GitClient,
    spec: &'a ClusterSpec,
    config: &'a GitOpsConfig,
}

impl<'a> RepositorySynchronizer<'a> {
    pub fn new(git: &'a GitClient, spec: &'a ClusterSpec, config: &'a GitOpsConfig) -> Self {
        Self { git, spec, config }
    }

    pub fn branch(&self) -> &str {
        &self.config.branch
    }

    pub fn config_path(&self) -> &str {
        &self.config.cluster_config_path
    }

    /// Directory holding this cluster's own manifests.
    pub fn eksa_system_dir(&self) -> String {
        Path::new(self.config_path())
            .join(self.spec.cluster.name())
            .join(EKSA_SYSTEM_DIR_NAME)
            .to_string_lossy()
            .into_owned()
    }

    /// Directory holding the reconciler's own manifests.
    pub fn flux_system_dir(&self) -> String {
        Path::new(self.config_path())
            .join(&self.config.system_namespace)
            .to_string_lossy()
            .into_owned()
    }

    fn local_repo_exists(&self) -> bool {
        self.git.writer().dir().join(".git").exists()
    }

    /// Drives the state machine until the tree is converged.
    ///
    /// After this returns without error, the working tree is checked out
    /// on the configured branch at its current tip.
    pub fn setup_repository(&self) -> Result<()> {
        let mut state = self.probe_local();
        log::debug!("repository setup starting from {:?}", state);

        while state != RepoState::Converged {
            state = match self.step(state) {
                Ok(next) => {
                    log::debug!("repository setup transition to {:?}", next);
                    next
                }
                Err(e) => {
                    log::debug!("repository setup reached {:?}: {}", RepoState::Failed, e);
                    return Err(e);
                }
            };
        }
        Ok(())
    }

    /// Initial state from the filesystem: the presence of a `.git`
    /// directory distinguishes "already cloned" from "needs cloning".
    pub(crate) fn probe_local(&self) -> RepoState {
        if self.local_repo_exists() {
            RepoState::LocalRepoPresent
        } else {
            RepoState::NoLocalRepo
        }
    }

    /// One transition of the state machine.
    pub(crate) fn step(&self, state: RepoState) -> Result<RepoState> {
        match state {
            // A converged tree from an earlier operation only needs to be
            // on the right branch.
            RepoState::LocalRepoPresent => {
                self.git
                    .branch(self.branch())
                    .map_err(|source| GitOpsError::Branch {
                        branch: self.branch().to_string(),
                        source,
                    })?;
                Ok(RepoState::Converged)
            }

            RepoState::NoLocalRepo => Ok(RepoState::RemoteUnknown),

            RepoState::RemoteUnknown => match &self.config.provider {
                // Bring-your-own-git: the user is responsible for the
                // remote existing and being non-empty.
                GitProviderConfig::Git(_) => Ok(RepoState::RemoteExists),
                GitProviderConfig::Github(_) => {
                    match self.git.get_repo().map_err(GitOpsError::DescribeRepo)? {
                        Some(_) => Ok(RepoState::RemoteExists),
                        None => Ok(RepoState::RemoteAbsent),
                    }
                }
            },

            RepoState::RemoteExists => match self.clone_and_branch() {
                Ok(()) => Ok(RepoState::Converged),
                // A bare zero-commit remote cannot be cloned; initialize
                // locally instead.
                Err(GitOpsError::Clone(GitError::RepositoryIsEmpty { .. })) => {
                    log::debug!("remote repository is empty, will initialize locally");
                    Ok(RepoState::RemoteEmpty)
                }
                Err(e) => Err(e),
            },

            RepoState::RemoteAbsent => {
                self.create_remote_repository()?;
                // A brand-new remote has zero commits.
                Ok(RepoState::RemoteEmpty)
            }

            RepoState::RemoteEmpty => {
                self.initialize_local_repository()?;
                Ok(RepoState::Converged)
            }

            RepoState::Converged | RepoState::Failed => Ok(state),
        }
    }

    /// Lighter convergence for operations against an existing repository:
    /// reuse the checkout if present, otherwise clone, and in both cases
    /// end up on the configured branch.
    pub fn sync(&self) -> Result<()> {
        if self.local_repo_exists() {
            self.git
                .branch(self.branch())
                .map_err(|source| GitOpsError::Branch {
                    branch: self.branch().to_string(),
                    source,
                })
        } else {
            self.clone_and_branch()
        }
    }

    fn clone_and_branch(&self) -> Result<()> {
        log::debug!("cloning remote repository");
        self.git.clone_repo().map_err(GitOpsError::Clone)?;

        self.git
            .branch(self.branch())
            .map_err(|source| GitOpsError::Branch {
                branch: self.branch().to_string(),
                source,
            })
    }

    fn create_remote_repository(&self) -> Result<()> {
        let opts = CreateRepoOpts {
            name: self.config.repository(),
            owner: self.config.owner().to_string(),
            description: REPO_DESCRIPTION.to_string(),
            personal: self.config.personal(),
            privacy: true,
        };
        log::debug!(
            "remote repository does not exist; creating {}/{}",
            opts.owner,
            opts.name
        );
        self.git
            .create_repo(opts)
            .map_err(|source| GitOpsError::CreateRepo {
                repository: self.config.repository(),
                source,
            })
    }

    /// `git init`, point origin at the configured URL, commit once (git
    /// needs at least one commit to branch from), then create and check
    /// out the target branch.
    fn initialize_local_repository(&self) -> Result<()> {
        self.git.init().map_err(GitOpsError::InitRepo)?;
        self.git
            .commit(INIT_COMMIT_MESSAGE)
            .map_err(GitOpsError::Commit)?;
        self.git
            .branch(self.branch())
            .map_err(|source| GitOpsError::Branch {
                branch: self.branch().to_string(),
                source,
            })
    }

    /// Refuses to proceed when a cluster configuration file is already
    /// checked in at the target local path, so another cluster's config
    /// is never silently clobbered. Self-managed clusters only.
    pub fn validate_local_config_path_does_not_exist(&self) -> Result<()> {
        if !self.spec.cluster.is_self_managed() {
            return Ok(());
        }
        let path = self.git.writer().dir().join(self.config_path());
        if path.exists() {
            return Err(GitOpsError::LocalConfigPathOccupied { path });
        }
        Ok(())
    }

    /// Pre-flight remote check for the same invariant; runs before any
    /// local mutation. Self-managed clusters with a hosted provider only.
    pub fn validate_remote_config_path_does_not_exist(&self) -> Result<()> {
        if !self.spec.cluster.is_self_managed() {
            return Ok(());
        }
        let exists = self
            .git
            .path_exists(
                self.config.owner(),
                &self.config.repository(),
                self.branch(),
                self.config_path(),
            )
            .map_err(GitOpsError::RemoteConfigPathCheck)?;
        if exists {
            return Err(GitOpsError::RemoteConfigPathOccupied {
                path: self.config_path().to_string(),
            });
        }
        Ok(())
    }
}
