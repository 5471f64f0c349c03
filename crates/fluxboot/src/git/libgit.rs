//! libgit2 implementation of the Local Git Port.
//!
//! Same contract as [`super::cli::GitCli`], bound to the `git2` crate
//! instead of a subprocess. Pulls are fast-forward only; a merge that
//! would need a real merge commit is reported as a command failure so the
//! caller can surface it instead of silently rewriting history.

use std::path::{Path, PathBuf};

use git2::{
    build::RepoBuilder, BranchType, Cred, ErrorCode, FetchOptions, IndexAddOption, PushOptions,
    RemoteCallbacks, Repository as Git2Repository, Signature,
};
use secrecy::{ExposeSecret, SecretString};

use super::error::{GitError, Result};
use super::Client;
use crate::retrier::Retrier;

const COMMIT_AUTHOR_NAME: &str = "fluxboot";
const COMMIT_AUTHOR_EMAIL: &str = "fluxboot@noreply.local";

/// Local Git Port backed by libgit2.
pub struct LibGit {
    repo_directory: PathBuf,
    repo_url: String,
    token: Option<SecretString>,
    username: String,
    retrier: Retrier,
}

impl LibGit {
    pub fn new(repo_directory: impl Into<PathBuf>, repo_url: impl Into<String>) -> Self {
        Self {
            repo_directory: repo_directory.into(),
            repo_url: repo_url.into(),
            token: None,
            username: String::new(),
            retrier: Retrier::default(),
        }
    }

    /// Replaces the retrier used for the tolerant pull inside
    /// [`Client::branch`].
    pub fn with_retrier(mut self, retrier: Retrier) -> Self {
        self.retrier = retrier;
        self
    }

    /// Returns the working tree directory.
    pub fn repo_directory(&self) -> &Path {
        &self.repo_directory
    }

    fn callbacks(&self) -> RemoteCallbacks<'_> {
        let mut callbacks = RemoteCallbacks::new();
        if let Some(token) = &self.token {
            let username = self.username.clone();
            let secret = token.expose_secret().clone();
            callbacks.credentials(move |_url, username_from_url, _allowed| {
                let user = username_from_url.unwrap_or(&username);
                Cred::userpass_plaintext(user, &secret)
            });
        }
        callbacks
    }

    fn fetch_options(&self) -> FetchOptions<'_> {
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.callbacks());
        options
    }

    fn open(&self, operation: &'static str) -> Result<Git2Repository> {
        Git2Repository::open(&self.repo_directory).map_err(|e| map_git2(operation, e))
    }

    fn remote_branch_exists(&self, repo: &Git2Repository, branch: &str) -> Result<bool> {
        let mut remote = repo
            .find_remote("origin")
            .map_err(|e| map_git2("branch", e))?;
        let connection = match remote.connect_auth(git2::Direction::Fetch, Some(self.callbacks()), None)
        {
            Ok(c) => c,
            Err(e) => {
                let message = e.message().to_lowercase();
                if message.contains("empty") {
                    return Ok(false);
                }
                return Err(map_git2("branch", e));
            }
        };
        let wanted = format!("refs/heads/{branch}");
        let found = connection
            .list()
            .map_err(|e| map_git2("branch", e))?
            .iter()
            .any(|head| head.name() == wanted);
        Ok(found)
    }

    fn pull_if_remote_exists(&self, repo: &Git2Repository, branch: &str) -> Result<()> {
        self.retrier.retry_if(
            || {
                if self.remote_branch_exists(repo, branch)? {
                    match self.pull(branch) {
                        Ok(())
                        | Err(GitError::RepositoryUpToDate { .. })
                        | Err(GitError::RemoteBranchDoesNotExist { .. }) => {}
                        Err(e) => return Err(e),
                    }
                }
                Ok(())
            },
            |e: &GitError| !e.is_signal(),
        )
    }

    fn head_commit(repo: &Git2Repository) -> Result<Option<git2::Commit<'_>>> {
        match repo.head() {
            Ok(head) => {
                let commit = head
                    .peel_to_commit()
                    .map_err(|e| map_git2("commit", e))?;
                Ok(Some(commit))
            }
            Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
                Ok(None)
            }
            Err(e) => Err(map_git2("commit", e)),
        }
    }
}

impl Client for LibGit {
    fn clone_repo(&self) -> Result<()> {
        if let Some(parent) = self.repo_directory.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let result = RepoBuilder::new()
            .fetch_options(self.fetch_options())
            .clone(&self.repo_url, &self.repo_directory);

        let repo = match result {
            Ok(repo) => repo,
            Err(e) => {
                let message = e.message().to_lowercase();
                if message.contains("empty") || message.contains("remote head") {
                    return Err(GitError::RepositoryIsEmpty {
                        repository: self.repo_url.clone(),
                    });
                }
                return Err(map_git2("clone", e));
            }
        };

        // A bare remote produces a repository with an unborn HEAD.
        if Self::head_commit(&repo)?.is_none() {
            return Err(GitError::RepositoryIsEmpty {
                repository: self.repo_url.clone(),
            });
        }
        Ok(())
    }

    fn add(&self, path: &str) -> Result<()> {
        let repo = self.open("add")?;
        let mut index = repo.index().map_err(|e| map_git2("add", e))?;
        index
            .add_all([path], IndexAddOption::DEFAULT, None)
            .map_err(|e| map_git2("add", e))?;
        index.write().map_err(|e| map_git2("add", e))?;
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<()> {
        let repo = self.open("remove")?;
        let mut index = repo.index().map_err(|e| map_git2("remove", e))?;
        index
            .remove_all([path], None)
            .map_err(|e| map_git2("remove", e))?;
        index.write().map_err(|e| map_git2("remove", e))?;

        let absolute = self.repo_directory.join(path);
        if absolute.is_dir() {
            let _ = std::fs::remove_dir_all(&absolute);
        } else if absolute.exists() {
            let _ = std::fs::remove_file(&absolute);
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let repo = self.open("commit")?;
        let signature = Signature::now(COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL)
            .map_err(|e| map_git2("commit", e))?;

        let mut index = repo.index().map_err(|e| map_git2("commit", e))?;
        let tree_id = index.write_tree().map_err(|e| map_git2("commit", e))?;
        let tree = repo.find_tree(tree_id).map_err(|e| map_git2("commit", e))?;

        let parent = Self::head_commit(&repo)?;
        let parents: Vec<&git2::Commit<'_>> = parent.iter().collect();

        repo.commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
            .map_err(|e| map_git2("commit", e))?;
        log::debug!("committed to {}", self.repo_directory.display());
        Ok(())
    }

    fn push(&self) -> Result<()> {
        let repo = self.open("push")?;
        let head = repo.head().map_err(|e| map_git2("push", e))?;
        let refname = head
            .name()
            .ok_or_else(|| GitError::CommandFailed {
                operation: "push",
                message: "HEAD is not a named reference".to_string(),
            })?
            .to_string();

        let mut remote = repo.find_remote("origin").map_err(|e| map_git2("push", e))?;
        let mut options = PushOptions::new();
        options.remote_callbacks(self.callbacks());
        let refspec = format!("{refname}:{refname}");
        remote
            .push(&[refspec.as_str()], Some(&mut options))
            .map_err(|e| map_git2("push", e))?;
        log::debug!("pushed {} to origin", refname);
        Ok(())
    }

    fn pull(&self, branch: &str) -> Result<()> {
        let repo = self.open("pull")?;
        let mut remote = repo.find_remote("origin").map_err(|e| map_git2("pull", e))?;

        let refspec = format!("refs/heads/{branch}");
        if let Err(e) = remote.fetch(&[refspec.as_str()], Some(&mut self.fetch_options()), None) {
            let message = e.message().to_lowercase();
            if message.contains("not found") || message.contains("couldn't find") {
                return Err(GitError::RemoteBranchDoesNotExist {
                    branch: branch.to_string(),
                });
            }
            return Err(map_git2("pull", e));
        }

        let fetch_head = repo
            .find_reference("FETCH_HEAD")
            .map_err(|e| map_git2("pull", e))?;
        let fetched = repo
            .reference_to_annotated_commit(&fetch_head)
            .map_err(|e| map_git2("pull", e))?;

        let (analysis, _) = repo
            .merge_analysis(&[&fetched])
            .map_err(|e| map_git2("pull", e))?;

        if analysis.is_up_to_date() {
            return Err(GitError::RepositoryUpToDate {
                repository: self.repo_directory.display().to_string(),
            });
        }

        if analysis.is_fast_forward() || analysis.is_unborn() {
            let target = fetched.id();
            let local_ref = format!("refs/heads/{branch}");
            repo.reference(&local_ref, target, true, "fast-forward pull")
                .map_err(|e| map_git2("pull", e))?;
            repo.set_head(&local_ref).map_err(|e| map_git2("pull", e))?;
            repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
                .map_err(|e| map_git2("pull", e))?;
            log::debug!("fast-forwarded {} to {}", branch, target);
            return Ok(());
        }

        Err(GitError::CommandFailed {
            operation: "pull",
            message: format!("branch {branch} has diverged from the remote"),
        })
    }

    fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.repo_directory).map_err(|e| GitError::Io {
            path: self.repo_directory.clone(),
            source: e,
        })?;
        let repo = Git2Repository::init(&self.repo_directory).map_err(|e| map_git2("init", e))?;

        match repo.find_remote("origin") {
            Ok(_) => {
                repo.remote_set_url("origin", &self.repo_url)
                    .map_err(|e| map_git2("init", e))?;
            }
            Err(_) => {
                repo.remote("origin", &self.repo_url)
                    .map_err(|e| map_git2("init", e))?;
            }
        }
        Ok(())
    }

    fn branch(&self, name: &str) -> Result<()> {
        let repo = self.open("branch")?;

        if repo.find_branch(name, BranchType::Local).is_err() {
            let head = Self::head_commit(&repo)?.ok_or_else(|| GitError::CommandFailed {
                operation: "branch",
                message: "repository has no commits to branch from".to_string(),
            })?;
            match repo.branch(name, &head, false) {
                Ok(_) => {}
                Err(e) if e.code() == ErrorCode::Exists => {
                    log::debug!("branch {} already exists locally", name);
                }
                Err(e) => return Err(map_git2("branch", e)),
            }
        } else {
            log::debug!("branch {} already exists locally", name);
        }

        let mut config = repo.config().map_err(|e| map_git2("branch", e))?;
        config
            .set_str(&format!("branch.{name}.remote"), "origin")
            .map_err(|e| map_git2("branch", e))?;
        config
            .set_str(&format!("branch.{name}.merge"), &format!("refs/heads/{name}"))
            .map_err(|e| map_git2("branch", e))?;
        config
            .set_bool(&format!("branch.{name}.rebase"), true)
            .map_err(|e| map_git2("branch", e))?;

        repo.set_head(&format!("refs/heads/{name}"))
            .map_err(|e| map_git2("branch", e))?;
        repo.checkout_head(Some(git2::build::CheckoutBuilder::new().force()))
            .map_err(|e| map_git2("branch", e))?;

        self.pull_if_remote_exists(&repo, name)
    }

    fn set_token_auth(&mut self, token: SecretString, username: &str) {
        self.token = Some(token);
        self.username = username.to_string();
    }
}

/// Maps a libgit2 error onto the port's structured kinds.
fn map_git2(operation: &'static str, e: git2::Error) -> GitError {
    use git2::ErrorClass;
    match e.class() {
        ErrorClass::Net | ErrorClass::Http | ErrorClass::Ssh => {
            GitError::Network(e.message().to_string())
        }
        ErrorClass::Callback => GitError::AuthFailed(e.message().to_string()),
        _ => GitError::CommandFailed {
            operation,
            message: e.message().to_string(),
        },
    }
}
