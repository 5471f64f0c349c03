//! Retry-wrapped clients for git, the reconciler CLI, and the cluster API.
//!
//! Network-bound calls are retried with the shared [`Retrier`]; local
//! working-tree mutations run exactly once. Expected alternate-path
//! conditions ([`GitError::is_signal`]) stop the retry loop immediately:
//! repeating them cannot change the outcome.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};

use crate::cluster::{Cluster, GitOpsConfig};
use crate::filewriter::FileWriter;
use crate::git::{self, CreateRepoOpts, GitError, GitTools, Repository};
use crate::gitops::error::GitOpsError;
use crate::retrier::Retrier;

/// Annotation the reconciler honors to skip a resource.
pub const RECONCILE_ANNOTATION: &str = "kustomize.toolkit.fluxcd.io/reconcile";
/// Annotation value that disables reconciliation.
pub const RECONCILE_DISABLED: &str = "disabled";
/// Annotation that requests an out-of-band sync of a source.
pub const FORCE_RECONCILE_ANNOTATION: &str = "reconcile.fluxcd.io/requestedAt";
/// Resource type of the reconciler's repository source object.
pub const GIT_REPOSITORY_RESOURCE_TYPE: &str = "gitrepositories";
/// Name of the reconciler's repository source object and system secret.
pub const SYSTEM_OBJECT_NAME: &str = "flux-system";

/// Control interface of the reconciler binary.
#[cfg_attr(test, mockall::automock)]
pub trait FluxClient {
    fn bootstrap_github(&self, cluster: &Cluster, config: &GitOpsConfig)
        -> Result<(), GitOpsError>;
    fn bootstrap_git(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError>;
    fn uninstall(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError>;
    fn reconcile(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError>;
    fn suspend_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError>;
    fn resume_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError>;
}

/// Annotation and secret operations against the cluster API.
#[cfg_attr(test, mockall::automock)]
pub trait KubeClient {
    fn update_annotation(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        annotations: &BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<(), GitOpsError>;

    fn remove_annotation(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError>;

    fn delete_secret(
        &self,
        cluster: &Cluster,
        name: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError>;
}

/// Resilient decoration of the git tool bundle.
pub struct GitClient {
    provider: Option<Box<dyn git::ProviderClient>>,
    client: Box<dyn git::Client>,
    writer: FileWriter,
    retrier: Retrier,
}

impl GitClient {
    pub fn new(tools: GitTools) -> Self {
        Self {
            provider: tools.provider,
            client: tools.client,
            writer: tools.writer,
            retrier: Retrier::default(),
        }
    }

    pub fn set_retrier(&mut self, retrier: Retrier) {
        self.retrier = retrier;
    }

    pub fn writer(&self) -> &FileWriter {
        &self.writer
    }

    /// Describes the remote repository. Without a provider there is no
    /// information to be had, which is not an error.
    pub fn get_repo(&self) -> Result<Option<Repository>, GitError> {
        match &self.provider {
            None => Ok(None),
            Some(provider) => self
                .retrier
                .retry_if(|| provider.get_repo(), |e| !e.is_signal()),
        }
    }

    /// Creates the remote repository; a no-op without a provider.
    pub fn create_repo(&self, opts: CreateRepoOpts) -> Result<(), GitError> {
        match &self.provider {
            None => Ok(()),
            Some(provider) => self
                .retrier
                .retry_if(|| provider.create_repo(opts.clone()).map(|_| ()), |e| !e.is_signal()),
        }
    }

    /// Checks a remote path; reports absent without a provider.
    pub fn path_exists(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
        path: &str,
    ) -> Result<bool, GitError> {
        match &self.provider {
            None => Ok(false),
            Some(provider) => self.retrier.retry_if(
                || provider.path_exists(owner, repo, branch, path),
                |e| !e.is_signal(),
            ),
        }
    }

    pub fn clone_repo(&self) -> Result<(), GitError> {
        self.retrier
            .retry_if(|| self.client.clone_repo(), |e| !e.is_signal())
    }

    pub fn push(&self) -> Result<(), GitError> {
        self.retrier.retry_if(|| self.client.push(), |e| !e.is_signal())
    }

    pub fn pull(&self, branch: &str) -> Result<(), GitError> {
        self.retrier
            .retry_if(|| self.client.pull(branch), |e| !e.is_signal())
    }

    // Local working-tree mutations run exactly once.

    pub fn add(&self, path: &str) -> Result<(), GitError> {
        self.client.add(path)
    }

    pub fn remove(&self, path: &str) -> Result<(), GitError> {
        self.client.remove(path)
    }

    pub fn commit(&self, message: &str) -> Result<(), GitError> {
        self.client.commit(message)
    }

    pub fn branch(&self, name: &str) -> Result<(), GitError> {
        self.client.branch(name)
    }

    pub fn init(&self) -> Result<(), GitError> {
        self.client.init()
    }
}

/// Resilient decoration of the reconciler and cluster-API clients.
pub struct ReconcilerClient {
    flux: Box<dyn FluxClient>,
    kube: Box<dyn KubeClient>,
    retrier: Retrier,
}

impl ReconcilerClient {
    pub fn new(flux: Box<dyn FluxClient>, kube: Box<dyn KubeClient>) -> Self {
        Self {
            flux,
            kube,
            retrier: Retrier::default(),
        }
    }

    pub fn set_retrier(&mut self, retrier: Retrier) {
        self.retrier = retrier;
    }

    pub fn bootstrap_github(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.retrier.retry(|| self.flux.bootstrap_github(cluster, config))
    }

    pub fn bootstrap_git(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.retrier.retry(|| self.flux.bootstrap_git(cluster, config))
    }

    pub fn uninstall(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        self.retrier.retry(|| self.flux.uninstall(cluster, config))
    }

    pub fn reconcile(&self, cluster: &Cluster, config: &GitOpsConfig) -> Result<(), GitOpsError> {
        self.retrier.retry(|| self.flux.reconcile(cluster, config))
    }

    pub fn suspend_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.retrier
            .retry(|| self.flux.suspend_kustomization(cluster, config))
    }

    pub fn resume_kustomization(
        &self,
        cluster: &Cluster,
        config: &GitOpsConfig,
    ) -> Result<(), GitOpsError> {
        self.retrier
            .retry(|| self.flux.resume_kustomization(cluster, config))
    }

    /// Marks a resource so the reconciler skips it.
    pub fn disable_resource_reconcile(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            RECONCILE_ANNOTATION.to_string(),
            RECONCILE_DISABLED.to_string(),
        );
        self.retrier.retry(|| {
            self.kube
                .update_annotation(cluster, resource_type, object_name, &annotations, namespace)
        })
    }

    /// Clears the skip marker from a resource.
    pub fn enable_resource_reconcile(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        self.retrier.retry(|| {
            self.kube.remove_annotation(
                cluster,
                resource_type,
                object_name,
                RECONCILE_ANNOTATION,
                namespace,
            )
        })
    }

    /// Stamps the repository source object to force an out-of-band sync.
    pub fn force_reconcile(&self, cluster: &Cluster, namespace: &str) -> Result<(), GitOpsError> {
        let mut annotations = BTreeMap::new();
        annotations.insert(
            FORCE_RECONCILE_ANNOTATION.to_string(),
            Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
        );
        self.retrier.retry(|| {
            self.kube.update_annotation(
                cluster,
                GIT_REPOSITORY_RESOURCE_TYPE,
                SYSTEM_OBJECT_NAME,
                &annotations,
                namespace,
            )
        })
    }

    /// Deletes the reconciler's system secret, forcing a credential
    /// refresh on the next bootstrap.
    pub fn delete_system_secret(
        &self,
        cluster: &Cluster,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        self.retrier
            .retry(|| self.kube.delete_secret(cluster, SYSTEM_OBJECT_NAME, namespace))
    }
}
