//! Subprocess implementation of the Local Git Port.
//!
//! Shells out to an installed `git` binary. Network-bound commands (clone,
//! push, pull, ls-remote) run under a fixed deadline so a stalled transport
//! cannot block an operation forever.

use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::time::{Duration, Instant};

use secrecy::SecretString;

use super::auth::{ssh_env, token_env, AuthEnv};
use super::error::{classify_git_stderr, GitError, Result};
use super::Client;
use crate::retrier::Retrier;

/// Deadline for network-bound git commands.
const NETWORK_TIMEOUT: Duration = Duration::from_secs(30);

const COMMIT_AUTHOR_NAME: &str = "fluxboot";
const COMMIT_AUTHOR_EMAIL: &str = "fluxboot@noreply.local";

/// Local Git Port backed by the `git` binary.
pub struct GitCli {
    repo_directory: PathBuf,
    repo_url: String,
    token: Option<SecretString>,
    username: String,
    ssh_key_path: Option<String>,
    retrier: Retrier,
}

impl GitCli {
    pub fn new(repo_directory: impl Into<PathBuf>, repo_url: impl Into<String>) -> Self {
        Self {
            repo_directory: repo_directory.into(),
            repo_url: repo_url.into(),
            token: None,
            username: String::new(),
            ssh_key_path: None,
            retrier: Retrier::default(),
        }
    }

    /// Uses an SSH private key for network operations.
    pub fn with_ssh_key(mut self, key_path: impl Into<String>) -> Self {
        self.ssh_key_path = Some(key_path.into());
        self
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

    fn auth_env(&self) -> Result<AuthEnv> {
        if let Some(token) = &self.token {
            return token_env(token);
        }
        if let Some(key) = &self.ssh_key_path {
            return ssh_env(key);
        }
        Ok(AuthEnv::none())
    }

    /// Runs a local git command in the repository directory.
    fn run_git(&self, operation: &'static str, args: &[&str]) -> Result<Output> {
        Command::new("git")
            .current_dir(&self.repo_directory)
            .args(args)
            .output()
            .map_err(|e| GitError::Io {
                path: self.repo_directory.clone(),
                source: e,
            })
            .and_then(|output| self.check(operation, output))
    }

    /// Runs a network-bound git command under [`NETWORK_TIMEOUT`],
    /// with the authentication environment applied.
    fn run_git_network(
        &self,
        operation: &'static str,
        args: &[&str],
        cwd: Option<&Path>,
    ) -> Result<Output> {
        let auth = self.auth_env()?;

        let tag = uuid::Uuid::new_v4();
        let stdout_path = std::env::temp_dir().join(format!(".git-{operation}-{tag}.out"));
        let stderr_path = std::env::temp_dir().join(format!(".git-{operation}-{tag}.err"));
        let stdout_file = std::fs::File::create(&stdout_path).map_err(|e| GitError::Io {
            path: stdout_path.clone(),
            source: e,
        })?;
        let stderr_file = std::fs::File::create(&stderr_path).map_err(|e| GitError::Io {
            path: stderr_path.clone(),
            source: e,
        })?;

        let mut cmd = Command::new("git");
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::from(stdout_file))
            .stderr(Stdio::from(stderr_file));
        for (key, value) in &auth.env_vars {
            cmd.env(key, value);
        }

        let mut child = cmd.spawn().map_err(|e| GitError::Io {
            path: self.repo_directory.clone(),
            source: e,
        })?;

        let deadline = Instant::now() + NETWORK_TIMEOUT;
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) => {
                    if Instant::now() >= deadline {
                        let _ = child.kill();
                        let _ = child.wait();
                        let _ = std::fs::remove_file(&stdout_path);
                        let _ = std::fs::remove_file(&stderr_path);
                        return Err(GitError::Timeout {
                            operation,
                            seconds: NETWORK_TIMEOUT.as_secs(),
                        });
                    }
                    std::thread::sleep(Duration::from_millis(50));
                }
                Err(e) => {
                    let _ = std::fs::remove_file(&stdout_path);
                    let _ = std::fs::remove_file(&stderr_path);
                    return Err(GitError::Io {
                        path: self.repo_directory.clone(),
                        source: e,
                    });
                }
            }
        };

        let stdout = std::fs::read(&stdout_path).unwrap_or_default();
        let stderr = std::fs::read(&stderr_path).unwrap_or_default();
        let _ = std::fs::remove_file(&stdout_path);
        let _ = std::fs::remove_file(&stderr_path);

        drop(auth);

        self.check(operation, Output { status, stdout, stderr })
    }

    fn check(&self, operation: &'static str, output: Output) -> Result<Output> {
        if output.status.success() {
            return Ok(output);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(classify_git_stderr(
            operation,
            &stderr,
            &self.repo_directory.display().to_string(),
        ))
    }

    fn has_commits(&self) -> bool {
        Command::new("git")
            .current_dir(&self.repo_directory)
            .args(["rev-parse", "HEAD"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    /// Points `origin` at the configured URL, adding or updating as needed.
    fn set_remote(&self) -> Result<()> {
        let exists = Command::new("git")
            .current_dir(&self.repo_directory)
            .args(["remote", "get-url", "origin"])
            .output()
            .map(|output| output.status.success())
            .unwrap_or(false);

        if exists {
            self.run_git("remote", &["remote", "set-url", "origin", &self.repo_url])?;
        } else {
            self.run_git("remote", &["remote", "add", "origin", &self.repo_url])?;
        }
        Ok(())
    }

    fn remote_branch_exists(&self, branch: &str) -> Result<bool> {
        let output = self.run_git_network(
            "ls-remote",
            &["ls-remote", "--heads", "origin", branch],
            Some(&self.repo_directory),
        )?;
        Ok(!String::from_utf8_lossy(&output.stdout).trim().is_empty())
    }

    /// Pulls `branch` when it exists on the remote, tolerating
    /// "already up to date" and a branch that is not there yet. Wrapped in
    /// the retrier to absorb transient transport failures.
    fn pull_if_remote_exists(&self, branch: &str) -> Result<()> {
        self.retrier.retry_if(
            || {
                if self.remote_branch_exists(branch)? {
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
}

impl Client for GitCli {
    fn clone_repo(&self) -> Result<()> {
        if let Some(parent) = self.repo_directory.parent() {
            std::fs::create_dir_all(parent).map_err(|e| GitError::Io {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        let dir = self
            .repo_directory
            .to_str()
            .ok_or_else(|| GitError::AuthFailed("repository path is not valid UTF-8".to_string()))?
            .to_string();
        self.run_git_network("clone", &["clone", &self.repo_url, &dir], None)?;

        // A bare remote clones "successfully" with zero commits; callers
        // need the structured kind to fall back to local initialization.
        if !self.has_commits() {
            return Err(GitError::RepositoryIsEmpty {
                repository: self.repo_url.clone(),
            });
        }
        Ok(())
    }

    fn add(&self, path: &str) -> Result<()> {
        log::debug!("staging {} in {}", path, self.repo_directory.display());
        self.run_git("add", &["add", "-A", path]).map(|_| ())
    }

    fn remove(&self, path: &str) -> Result<()> {
        log::debug!("removing {} from {}", path, self.repo_directory.display());
        self.run_git("rm", &["rm", "-r", path]).map(|_| ())
    }

    fn commit(&self, message: &str) -> Result<()> {
        let name = format!("user.name={COMMIT_AUTHOR_NAME}");
        let email = format!("user.email={COMMIT_AUTHOR_EMAIL}");
        self.run_git(
            "commit",
            &[
                "-c",
                &name,
                "-c",
                &email,
                "commit",
                "--allow-empty",
                "-m",
                message,
            ],
        )?;
        log::debug!("committed to {}", self.repo_directory.display());
        Ok(())
    }

    fn push(&self) -> Result<()> {
        log::debug!("pushing {} to origin", self.repo_directory.display());
        self.run_git_network(
            "push",
            &["push", "origin", "HEAD"],
            Some(&self.repo_directory),
        )
        .map(|_| ())
    }

    fn pull(&self, branch: &str) -> Result<()> {
        let output = self.run_git_network(
            "pull",
            &["pull", "origin", branch],
            Some(&self.repo_directory),
        )?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.contains("Already up to date") {
            return Err(GitError::RepositoryUpToDate {
                repository: self.repo_directory.display().to_string(),
            });
        }
        log::debug!("pulled {} from origin", branch);
        Ok(())
    }

    fn init(&self) -> Result<()> {
        std::fs::create_dir_all(&self.repo_directory).map_err(|e| GitError::Io {
            path: self.repo_directory.clone(),
            source: e,
        })?;
        self.run_git("init", &["init"])?;
        self.set_remote()
    }

    fn branch(&self, name: &str) -> Result<()> {
        match self.run_git("branch", &["branch", name]) {
            Ok(_) => log::debug!("created branch {}", name),
            Err(GitError::CommandFailed { message, .. }) if message.contains("already exists") => {
                log::debug!("branch {} already exists locally", name);
            }
            Err(e) => return Err(e),
        }

        let remote_key = format!("branch.{name}.remote");
        let merge_key = format!("branch.{name}.merge");
        let rebase_key = format!("branch.{name}.rebase");
        let merge_ref = format!("refs/heads/{name}");
        self.run_git("config", &["config", &remote_key, "origin"])?;
        self.run_git("config", &["config", &merge_key, &merge_ref])?;
        self.run_git("config", &["config", &rebase_key, "true"])?;

        self.run_git("checkout", &["checkout", name])?;

        self.pull_if_remote_exists(name)
    }

    fn set_token_auth(&mut self, token: SecretString, username: &str) {
        self.token = Some(token);
        self.username = username.to_string();
    }
}
