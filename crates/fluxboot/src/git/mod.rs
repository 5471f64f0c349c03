//! Git capability ports and their implementations.
//!
//! The Local Git Port ([`Client`]) abstracts a working tree; the Remote
//! Provider Port ([`ProviderClient`]) abstracts a hosted git provider's
//! management API. Two `Client` implementations exist: [`cli::GitCli`]
//! shells out to an installed `git` binary, [`libgit::LibGit`] binds
//! libgit2. Orchestration code depends only on the traits.

pub mod auth;
pub mod cli;
pub mod error;
pub mod github;
pub mod libgit;
pub mod types;

use std::path::Path;

use secrecy::SecretString;

pub use cli::GitCli;
pub use error::{classify_git_stderr, GitError, Result};
pub use github::{GithubProvider, GithubRestApi};
pub use libgit::LibGit;
pub use types::{CreateRepoOpts, DeleteRepoOpts, GetRepoOpts, Repository, TokenAuth};

use crate::cluster::{ClusterSpec, GitProviderConfig};
use crate::filewriter::FileWriter;

/// Capability interface over a local working tree.
#[cfg_attr(test, mockall::automock)]
pub trait Client {
    /// Clones the configured remote into the working tree directory.
    /// An empty remote surfaces as [`GitError::RepositoryIsEmpty`].
    fn clone_repo(&self) -> Result<()>;
    /// Stages the file or directory at `path` (relative to the tree root).
    fn add(&self, path: &str) -> Result<()>;
    /// Removes the file or directory at `path` from the tree and the index.
    fn remove(&self, path: &str) -> Result<()>;
    /// Commits staged changes. Empty commits are allowed.
    fn commit(&self, message: &str) -> Result<()>;
    /// Pushes the current branch to the remote.
    fn push(&self) -> Result<()>;
    /// Pulls `branch` from the remote. "Already up to date" surfaces as
    /// [`GitError::RepositoryUpToDate`].
    fn pull(&self, branch: &str) -> Result<()>;
    /// Initializes a fresh repository and points `origin` at the
    /// configured URL.
    fn init(&self) -> Result<()>;
    /// Creates `name` tracking the same-named remote branch (rebase on
    /// pull), checks it out, and pulls it if it exists remotely. A branch
    /// that already exists locally is not an error.
    fn branch(&self, name: &str) -> Result<()>;
    /// Installs token authentication for subsequent network operations.
    fn set_token_auth(&mut self, token: SecretString, username: &str);
}

/// Capability interface over a hosted git provider's management API.
#[cfg_attr(test, mockall::automock)]
pub trait ProviderClient {
    /// Describes the configured repository. `Ok(None)` means the
    /// repository does not exist, distinct from an error.
    fn get_repo(&self) -> Result<Option<Repository>>;
    /// Creates a repository. The new repository has zero commits and must
    /// be initialized locally before it can be cloned.
    fn create_repo(&self, opts: CreateRepoOpts) -> Result<Repository>;
    /// Deletes a repository.
    fn delete_repo(&self, opts: DeleteRepoOpts) -> Result<()>;
    /// Validates the configured credentials.
    fn validate(&self) -> Result<()>;
    /// Checks whether `path` exists in the repository at `branch`.
    fn path_exists(&self, owner: &str, repo: &str, branch: &str, path: &str) -> Result<bool>;
}

/// The bundle of git capabilities an orchestration run works with.
pub struct GitTools {
    /// Remote provider API client; `None` in bring-your-own-git mode.
    pub provider: Option<Box<dyn ProviderClient>>,
    /// Local working tree client.
    pub client: Box<dyn Client>,
    /// Writer rooted at the working tree directory.
    pub writer: FileWriter,
}

impl GitTools {
    /// Builds the tool bundle for a cluster spec, or `None` when the spec
    /// carries no GitOps configuration. The working tree lives under
    /// `base_dir`. A hosted-provider config gets a REST provider client
    /// and token-authenticated transport; a generic git config gets only
    /// the transport.
    pub fn build(
        spec: &ClusterSpec,
        base_dir: &Path,
        token: Option<TokenAuth>,
    ) -> Result<Option<GitTools>> {
        let Some(config) = &spec.gitops else {
            return Ok(None);
        };

        let repo_dir = base_dir.join(config.repository());
        let writer = FileWriter::new(&repo_dir).map_err(|e| GitError::Io {
            path: repo_dir.clone(),
            source: e,
        })?;

        match &config.provider {
            GitProviderConfig::Github(github) => {
                let auth = token.ok_or_else(|| {
                    GitError::AuthFailed(
                        "a provider token is required for hosted-provider mode".to_string(),
                    )
                })?;
                let clone_url =
                    format!("https://github.com/{}/{}.git", github.owner, github.repository);
                let mut client = GitCli::new(&repo_dir, clone_url);
                client.set_token_auth(auth.token.clone(), &auth.username);
                let provider = GithubProvider::new(
                    Box::new(GithubRestApi::new(auth.token)?),
                    github.owner.clone(),
                    github.repository.clone(),
                    github.personal,
                );
                Ok(Some(GitTools {
                    provider: Some(Box::new(provider)),
                    client: Box::new(client),
                    writer,
                }))
            }
            GitProviderConfig::Git(generic) => {
                let mut client = GitCli::new(&repo_dir, generic.repository_url.as_str());
                if !generic.private_key_file.is_empty() {
                    client = client.with_ssh_key(generic.private_key_file.as_str());
                }
                if let Some(auth) = token {
                    client.set_token_auth(auth.token, &auth.username);
                }
                Ok(Some(GitTools {
                    provider: None,
                    client: Box::new(client),
                    writer,
                }))
            }
        }
    }
}
