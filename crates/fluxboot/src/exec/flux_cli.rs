//! `flux` binary adapter: the reconciler's own bootstrap, uninstall and
//! reconcile subcommands.

use std::process::Command;

use secrecy::{ExposeSecret, SecretString};

use crate::cluster::{Cluster, GitOpsConfig, GitProviderConfig};
use crate::gitops::client::FluxClient;
use crate::gitops::error::GitOpsError;

const GITHUB_TOKEN_ENV: &str = "GITHUB_TOKEN";

/// Runs the reconciler's CLI against a cluster's kubeconfig.
pub struct FluxCli {
    executable: String,
    github_token: Option<SecretString>,
}

impl FluxCli {
    pub fn new(github_token: Option<SecretString>) -> Self {
        Self {
            executable: "flux".to_string(),
            github_token,
        }
    }

    /// Overrides the binary path; the default resolves from `PATH`.
    pub fn with_executable(mut self, executable: impl Into<String>) -> Self {
        self.executable = executable.into();
        self
    }

    fn run(
        &self,
        operation: &str,
        cluster: &Cluster,
        args: &[&str],
        with_token: bool,
    ) -> Result<(), GitOpsError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(args);
        if !cluster.kubeconfig_file.is_empty() {
            cmd.args(["--kubeconfig", &cluster.kubeconfig_file]);
        }
        if with_token {
            if let Some(token) = &self.github_token {
                cmd.env(GITHUB_TOKEN_ENV, token.expose_secret());
            }
        }

        let output = cmd.output().map_err(|e| GitOpsError::Reconciler {
            operation: operation.to_string(),
            message: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(GitOpsError::Reconciler {
                operation: operation.to_string(),
                message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        log::debug!("flux {} completed", operation);
        Ok(())
    }
}

impl FluxClient for FluxCli {
    fn bootstrap_github(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        let GitProviderConfig::Github(github) = &config.provider else {
            return Err(GitOpsError::Reconciler {
                operation: "bootstrap github".to_string(),
                message: "github provider is not configured".to_string(),
            });
        };

        let mut args: Vec<&str> = vec![
            "bootstrap",
            "github",
            "--owner",
            &github.owner,
            "--repository",
            &github.repository,
            "--branch",
            &config.branch,
            "--path",
            &config.cluster_config_path,
            "--namespace",
            &config.system_namespace,
            "--private=true",
        ];
        if github.personal {
            args.push("--personal");
        }
        self.run("bootstrap github", cluster, &args, true)
    }

    fn bootstrap_git(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        let GitProviderConfig::Git(git) = &config.provider else {
            return Err(GitOpsError::Reconciler {
                operation: "bootstrap git".to_string(),
                message: "generic git provider is not configured".to_string(),
            });
        };

        let mut args: Vec<&str> = vec![
            "bootstrap",
            "git",
            "--url",
            &git.repository_url,
            "--branch",
            &config.branch,
            "--path",
            &config.cluster_config_path,
            "--namespace",
            &config.system_namespace,
            "--silent",
        ];
        if !git.private_key_file.is_empty() {
            args.push("--private-key-file");
            args.push(&git.private_key_file);
        }
        self.run("bootstrap git", cluster, &args, false)
    }

    fn uninstall(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        self.run(
            "uninstall",
            cluster,
            &[
                "uninstall",
                "--namespace",
                &config.system_namespace,
                "--silent",
            ],
            false,
        )
    }

    fn reconcile(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        self.run(
            "reconcile",
            cluster,
            &[
                "reconcile",
                "source",
                "git",
                "flux-system",
                "--namespace",
                &config.system_namespace,
            ],
            false,
        )
    }

    fn suspend_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.run(
            "suspend kustomization",
            cluster,
            &[
                "suspend",
                "kustomization",
                "flux-system",
                "--namespace",
                &config.system_namespace,
            ],
            false,
        )
    }

    fn resume_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.run(
            "resume kustomization",
            cluster,
            &[
                "resume",
                "kustomization",
                "flux-system",
                "--namespace",
                &config.system_namespace,
            ],
            false,
        )
    }
}
