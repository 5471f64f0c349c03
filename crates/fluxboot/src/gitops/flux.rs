//! Top-level GitOps orchestration.
//!
//! One [`Flux`] value per process drives the full cluster lifecycle:
//! bootstrap, install, upgrade, pause/resume, forced reconcile, cleanup,
//! the narrow spec-only update, and the composable pre-flight validations.
//! Each operation runs its sequence to completion before returning; the
//! git remote is the only cross-process synchronization point.

use std::path::Path;

use crate::cluster::{
    ChangeDiff, Cluster, ClusterSpec, ComponentChangeDiff, GitProviderConfig,
    ManagementComponents, ProviderConfig,
};
use crate::git::{GitError, GitTools};
use crate::gitops::client::{FluxClient, GitClient, KubeClient, ReconcilerClient};
use crate::gitops::error::{GitOpsError, Result};
use crate::gitops::files::FileGenerator;
use crate::gitops::repository::RepositorySynchronizer;
use crate::retrier::Retrier;
use crate::validations::{Validation, ValidationResult};

/// Resource type of the cluster document.
const CLUSTER_RESOURCE_TYPE: &str = "clusters";
const DEFAULT_NAMESPACE: &str = "default";

const INITIAL_COMMIT_MESSAGE: &str =
    "Initial commit of cluster configuration; generated by fluxboot";
const UPDATE_COMMIT_MESSAGE: &str =
    "Update commit of cluster configuration; generated by fluxboot";
const UPGRADE_COMMIT_MESSAGE: &str =
    "Upgrade commit of GitOps system components; generated by fluxboot";
const CLEANUP_COMMIT_MESSAGE: &str =
    "Cleanup commit of cluster configuration; generated by fluxboot";

/// Parent directory of a repository-relative path; `.` at the top level.
fn parent_dir(path: &str) -> String {
    match Path::new(path).parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            parent.to_string_lossy().into_owned()
        }
        _ => ".".to_string(),
    }
}

/// The GitOps orchestrator.
pub struct Flux {
    reconciler: ReconcilerClient,
    git: Option<GitClient>,
}

impl Flux {
    /// `tools` is `None` when git is not configured for this process
    /// (cleanup or read-only contexts); git-touching operations then
    /// resolve as no-ops.
    pub fn new(
        flux_client: Box<dyn FluxClient>,
        kube_client: Box<dyn KubeClient>,
        tools: Option<GitTools>,
    ) -> Self {
        Self {
            reconciler: ReconcilerClient::new(flux_client, kube_client),
            git: tools.map(GitClient::new),
        }
    }

    /// Replaces the retry policy on every wrapped client.
    pub fn set_retrier(&mut self, retrier: Retrier) {
        self.reconciler.set_retrier(retrier.clone());
        if let Some(git) = &mut self.git {
            git.set_retrier(retrier);
        }
    }

    fn namespace(spec: &ClusterSpec) -> &str {
        let namespace = spec.cluster.metadata.namespace.as_str();
        if namespace.is_empty() {
            DEFAULT_NAMESPACE
        } else {
            namespace
        }
    }

    /// Installs the reconciler onto the cluster and points it at the
    /// repository. A workload cluster or a cluster without GitOps
    /// configuration is a no-op: bootstrapping it would corrupt the
    /// management cluster's reconciler installation.
    ///
    /// A failed bootstrap is compensated with an uninstall before the
    /// original error is surfaced, so the reconciler is never left
    /// half-registered.
    pub fn bootstrap(&self, cluster: &Cluster, spec: &ClusterSpec) -> Result<()> {
        if !spec.cluster.is_self_managed() {
            return Ok(());
        }
        let Some(config) = &spec.gitops else {
            return Ok(());
        };

        log::info!("Installing GitOps toolkit on cluster");
        let result = match &config.provider {
            GitProviderConfig::Github(_) => self.reconciler.bootstrap_github(cluster, config),
            GitProviderConfig::Git(_) => self.reconciler.bootstrap_git(cluster, config),
        };

        if let Err(err) = result {
            log::warn!("bootstrap failed, uninstalling partial installation");
            if let Err(uninstall_err) = self.reconciler.uninstall(cluster, config) {
                log::warn!(
                    "uninstall after failed bootstrap also failed: {}",
                    uninstall_err
                );
            }
            return Err(err);
        }
        Ok(())
    }

    /// Installs GitOps when the new spec introduces a configuration the
    /// current one did not have; anything else is a no-op (an unchanged
    /// configuration is upgrade territory, a removed one means nothing to
    /// do).
    pub fn install(
        &self,
        cluster: &Cluster,
        components: &ManagementComponents,
        current_spec: &ClusterSpec,
        new_spec: &ClusterSpec,
    ) -> Result<()> {
        if new_spec.gitops.is_some() && current_spec.gitops.is_none() {
            return self.install_git_ops(cluster, new_spec, components);
        }
        Ok(())
    }

    /// The full install sequence: converge the repository, check both
    /// config-path preconditions, materialize manifests, commit and push,
    /// confirm the remote, then bootstrap the reconciler.
    pub fn install_git_ops(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
        components: &ManagementComponents,
    ) -> Result<()> {
        let Some(config) = &spec.gitops else {
            log::debug!("GitOps not configured, skipping install");
            return Ok(());
        };
        let Some(git) = &self.git else {
            log::debug!("git tooling not configured, skipping install");
            return Ok(());
        };

        log::info!("Adding cluster configuration files to Git");
        let sync = RepositorySynchronizer::new(git, spec, config);
        sync.setup_repository()?;
        sync.validate_local_config_path_does_not_exist()?;
        sync.validate_remote_config_path_does_not_exist()?;

        let generator = FileGenerator::init(
            git.writer(),
            &sync.eksa_system_dir(),
            &sync.flux_system_dir(),
        )?;
        generator.write_eksa_files(spec, spec.datacenter.as_ref(), &spec.machine_configs)?;
        if spec.cluster.is_self_managed() {
            generator.write_flux_system_files(components, spec)?;
        }

        let add_path = parent_dir(sync.config_path());
        git.add(&add_path).map_err(|source| GitOpsError::Add {
            path: add_path.clone(),
            source,
        })?;
        git.commit(INITIAL_COMMIT_MESSAGE)
            .map_err(GitOpsError::Commit)?;
        git.push().map_err(GitOpsError::Push)?;

        if spec.cluster.is_self_managed() {
            // Confirm the remote converged on what was just pushed.
            match git.pull(sync.branch()) {
                Ok(()) | Err(GitError::RepositoryUpToDate { .. }) => {}
                Err(source) => {
                    return Err(GitOpsError::Pull {
                        branch: sync.branch().to_string(),
                        source,
                    })
                }
            }
        }

        log::debug!("finished pushing cluster config and GitOps manifests to git");
        self.bootstrap(cluster, spec)
    }

    /// Upgrades the reconciler's components. Returns `None` when there is
    /// nothing to do — workload cluster, configuration absent on either
    /// side, or identical component versions — without touching git.
    pub fn upgrade(
        &self,
        cluster: &Cluster,
        old_components: &ManagementComponents,
        new_components: &ManagementComponents,
        old_spec: &ClusterSpec,
        new_spec: &ClusterSpec,
    ) -> Result<Option<ChangeDiff>> {
        if !new_spec.cluster.is_self_managed() {
            log::debug!("Skipping GitOps upgrade, not a self-managed cluster");
            return Ok(None);
        }
        let Some(new_config) = &new_spec.gitops else {
            log::debug!("Skipping GitOps upgrade, no GitOps configuration");
            return Ok(None);
        };
        if old_spec.gitops.is_none() {
            log::debug!("Skipping GitOps upgrade, no previous GitOps installation");
            return Ok(None);
        }
        let Some(diff) = component_change_diff(old_components, new_components) else {
            log::debug!("Nothing to upgrade for GitOps components");
            return Ok(None);
        };
        let Some(git) = &self.git else {
            return Ok(None);
        };

        log::info!("Upgrading GitOps components");
        let sync = RepositorySynchronizer::new(git, new_spec, new_config);
        sync.sync()?;

        let generator = FileGenerator::init(
            git.writer(),
            &sync.eksa_system_dir(),
            &sync.flux_system_dir(),
        )?;
        generator.write_flux_system_files(new_components, new_spec)?;

        let add_path = sync.config_path().to_string();
        git.add(&add_path).map_err(|source| GitOpsError::Add {
            path: add_path.clone(),
            source,
        })?;
        git.commit(UPGRADE_COMMIT_MESSAGE)
            .map_err(GitOpsError::Commit)?;
        git.push().map_err(GitOpsError::Push)?;

        // Drop the system secret so the re-bootstrap refreshes credentials.
        self.reconciler
            .delete_system_secret(cluster, &new_config.system_namespace)?;

        match &new_config.provider {
            GitProviderConfig::Github(_) => self.reconciler.bootstrap_github(cluster, new_config)?,
            GitProviderConfig::Git(_) => self.reconciler.bootstrap_git(cluster, new_config)?,
        }
        self.reconciler.reconcile(cluster, new_config)?;

        Ok(Some(diff))
    }

    /// Writes only the cluster's own manifests to git; used outside the
    /// full install/upgrade flows. No-op when git is not configured.
    pub fn update_git_eksa_spec(
        &self,
        spec: &ClusterSpec,
        datacenter: Option<&ProviderConfig>,
        machine_configs: &[ProviderConfig],
    ) -> Result<()> {
        let Some(config) = &spec.gitops else {
            log::debug!("GitOps not configured, skipping spec update");
            return Ok(());
        };
        let Some(git) = &self.git else {
            log::debug!("git tooling not configured, skipping spec update");
            return Ok(());
        };

        let sync = RepositorySynchronizer::new(git, spec, config);
        sync.sync()?;

        let generator = FileGenerator::init(
            git.writer(),
            &sync.eksa_system_dir(),
            &sync.flux_system_dir(),
        )?;
        generator.write_eksa_files(spec, datacenter, machine_configs)?;

        let add_path = sync.eksa_system_dir();
        git.add(&add_path).map_err(|source| GitOpsError::Add {
            path: add_path.clone(),
            source,
        })?;
        git.commit(UPDATE_COMMIT_MESSAGE)
            .map_err(GitOpsError::Commit)?;
        git.push().map_err(GitOpsError::Push)
    }

    /// Removes the cluster's configuration subtree from the repository on
    /// cluster deletion. Skips silently when the subtree was never
    /// committed.
    pub fn cleanup_git_repo(&self, spec: &ClusterSpec) -> Result<()> {
        let Some(config) = &spec.gitops else {
            log::debug!("GitOps not configured, skipping repository cleanup");
            return Ok(());
        };
        let Some(git) = &self.git else {
            return Ok(());
        };

        let sync = RepositorySynchronizer::new(git, spec, config);
        sync.sync()?;

        let remove_path = if spec.cluster.is_self_managed() {
            sync.config_path().to_string()
        } else {
            sync.eksa_system_dir()
        };

        if !git.writer().dir().join(&remove_path).exists() {
            log::debug!(
                "cluster path {} does not exist in the working tree, nothing to clean up",
                remove_path
            );
            return Ok(());
        }

        git.remove(&remove_path)
            .map_err(|source| GitOpsError::Remove {
                path: remove_path.clone(),
                source,
            })?;
        git.commit(CLEANUP_COMMIT_MESSAGE)
            .map_err(GitOpsError::Commit)?;
        git.push().map_err(GitOpsError::Push)
    }

    /// Stamps the repository source object to trigger an out-of-band sync.
    pub fn force_reconcile_git_repo(&self, cluster: &Cluster, spec: &ClusterSpec) -> Result<()> {
        let Some(config) = &spec.gitops else {
            log::info!("GitOps not configured, force reconcile skipped");
            return Ok(());
        };
        self.reconciler
            .force_reconcile(cluster, &config.system_namespace)
    }

    /// Suspends the reconciler's kustomization for this configuration.
    pub fn pause_git_ops_kustomization(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let Some(config) = &spec.gitops else {
            return Ok(());
        };
        self.reconciler.suspend_kustomization(cluster, config)
    }

    /// Resumes the reconciler's kustomization for this configuration.
    pub fn resume_git_ops_kustomization(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let Some(config) = &spec.gitops else {
            return Ok(());
        };
        self.reconciler.resume_kustomization(cluster, config)
    }

    /// Marks the cluster object, its datacenter object, and every distinct
    /// machine config so the reconciler skips them. The first failure
    /// short-circuits; re-running is always safe because the annotation is
    /// idempotent.
    pub fn pause_cluster_resources_reconcile(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let namespace = Self::namespace(spec);
        self.reconciler.disable_resource_reconcile(
            cluster,
            CLUSTER_RESOURCE_TYPE,
            spec.cluster.name(),
            namespace,
        )?;

        let datacenter = &spec.cluster.spec.datacenter_ref;
        if !datacenter.kind.is_empty() {
            self.reconciler.disable_resource_reconcile(
                cluster,
                &datacenter.resource_type(),
                &datacenter.name,
                namespace,
            )?;
        }

        for machine in spec.machine_config_refs() {
            self.reconciler.disable_resource_reconcile(
                cluster,
                &machine.resource_type(),
                &machine.name,
                namespace,
            )?;
        }
        Ok(())
    }

    /// Clears the skip marker from the same resource set as
    /// [`Flux::pause_cluster_resources_reconcile`].
    pub fn resume_cluster_resources_reconcile(
        &self,
        cluster: &Cluster,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let namespace = Self::namespace(spec);
        self.reconciler.enable_resource_reconcile(
            cluster,
            CLUSTER_RESOURCE_TYPE,
            spec.cluster.name(),
            namespace,
        )?;

        let datacenter = &spec.cluster.spec.datacenter_ref;
        if !datacenter.kind.is_empty() {
            self.reconciler.enable_resource_reconcile(
                cluster,
                &datacenter.resource_type(),
                &datacenter.name,
                namespace,
            )?;
        }

        for machine in spec.machine_config_refs() {
            self.reconciler.enable_resource_reconcile(
                cluster,
                &machine.resource_type(),
                &machine.name,
                namespace,
            )?;
        }
        Ok(())
    }

    /// Deferred pre-flight checks for a broader validation runner; empty
    /// when the cluster does not use git.
    pub fn validations<'a>(&'a self, spec: &'a ClusterSpec) -> Vec<Validation<'a>> {
        let (Some(git), Some(config)) = (self.git.as_ref(), spec.gitops.as_ref()) else {
            return Vec::new();
        };

        vec![Box::new(move || {
            let name = "GitOps config path";
            match git.path_exists(
                config.owner(),
                &config.repository(),
                &config.branch,
                &config.cluster_config_path,
            ) {
                Err(source) => ValidationResult::failed(
                    name,
                    "check provider connectivity and credentials",
                    GitOpsError::RemoteConfigPathCheck(source),
                ),
                Ok(true) => ValidationResult::failed(
                    name,
                    "pick an unused clusterConfigPath for this cluster",
                    GitOpsError::RemoteConfigPathOccupied {
                        path: config.cluster_config_path.clone(),
                    },
                ),
                Ok(false) => ValidationResult::passed(name),
            }
        })]
    }
}

/// Compares reconciler component versions; `None` when nothing changed.
fn component_change_diff(
    old: &ManagementComponents,
    new: &ManagementComponents,
) -> Option<ChangeDiff> {
    if old.version == new.version {
        return None;
    }
    Some(ChangeDiff {
        component_reports: vec![ComponentChangeDiff {
            component_name: "Flux".to_string(),
            old_version: old.version.clone(),
            new_version: new.version.clone(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{
        ClusterConfig, GenericGitConfig, GitOpsConfig, GithubProviderConfig, Image, ObjectMeta,
        Ref, WorkerNodeGroupConfiguration,
    };
    use crate::filewriter::FileWriter;
    use crate::git::{MockClient, MockProviderClient, Repository};
    use crate::gitops::client::{
        MockFluxClient, MockKubeClient, FORCE_RECONCILE_ANNOTATION, GIT_REPOSITORY_RESOURCE_TYPE,
        SYSTEM_OBJECT_NAME,
    };
    use crate::validations::run_validations;
    use std::time::Duration;
    use tempfile::TempDir;

    const BRANCH: &str = "testBranch";

    struct Mocks {
        flux: MockFluxClient,
        kube: MockKubeClient,
        provider: MockProviderClient,
        client: MockClient,
    }

    impl Mocks {
        fn new() -> Self {
            Self {
                flux: MockFluxClient::new(),
                kube: MockKubeClient::new(),
                provider: MockProviderClient::new(),
                client: MockClient::new(),
            }
        }

        fn build(self, dir: &TempDir) -> Flux {
            let tools = GitTools {
                provider: Some(Box::new(self.provider) as Box<dyn crate::git::ProviderClient>),
                client: Box::new(self.client),
                writer: FileWriter::new(dir.path()).unwrap(),
            };
            let mut flux = Flux::new(Box::new(self.flux), Box::new(self.kube), Some(tools));
            flux.set_retrier(Retrier::new(2, Duration::ZERO));
            flux
        }
    }

    fn github_config(path: &str) -> GitOpsConfig {
        GitOpsConfig {
            branch: BRANCH.to_string(),
            cluster_config_path: path.to_string(),
            system_namespace: String::new(),
            provider: GitProviderConfig::Github(GithubProviderConfig {
                owner: "mFowler".to_string(),
                repository: "testRepo".to_string(),
                personal: true,
            }),
        }
    }

    fn cluster_spec(name: &str, config_path: &str) -> ClusterSpec {
        let mut spec = ClusterSpec::new(ClusterConfig::new(name));
        spec.cluster.spec.kubernetes_version = "1.27".to_string();
        spec.gitops = Some(github_config(config_path));
        spec.set_defaults();
        spec
    }

    fn with_provider_docs(spec: &mut ClusterSpec) {
        let name = spec.cluster.name().to_string();
        spec.datacenter = Some(ProviderConfig {
            api_version: "anywhere.eks.amazonaws.com/v1alpha1".to_string(),
            kind: "VSphereDatacenterConfig".to_string(),
            metadata: ObjectMeta::new(&name),
            spec: serde_yaml::from_str("datacenter: SDDC-Datacenter").unwrap(),
        });
        spec.machine_configs = vec![ProviderConfig {
            api_version: "anywhere.eks.amazonaws.com/v1alpha1".to_string(),
            kind: "VSphereMachineConfig".to_string(),
            metadata: ObjectMeta::new(&name),
            spec: serde_yaml::from_str("template: ubuntu-2004").unwrap(),
        }];
    }

    fn components(version: &str) -> ManagementComponents {
        ManagementComponents {
            version: version.to_string(),
            source_controller: Image::new(format!(
                "example.com/fluxcd/source-controller:{version}"
            )),
            kustomize_controller: Image::new(format!(
                "example.com/fluxcd/kustomize-controller:{version}"
            )),
            helm_controller: Image::new(format!("example.com/fluxcd/helm-controller:{version}")),
            notification_controller: Image::new(format!(
                "example.com/fluxcd/notification-controller:{version}"
            )),
        }
    }

    fn expect_install_git_flow(mocks: &mut Mocks, add_path: &'static str, pull: bool) {
        mocks.provider.expect_get_repo().times(1).returning(|| {
            Ok(Some(Repository {
                name: "testRepo".to_string(),
                ..Default::default()
            }))
        });
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks
            .client
            .expect_branch()
            .withf(|b| b == BRANCH)
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .client
            .expect_add()
            .withf(move |p| p == add_path)
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));
        if pull {
            mocks
                .client
                .expect_pull()
                .withf(|b| b == BRANCH)
                .times(1)
                .returning(|_| Ok(()));
        }
    }

    #[test]
    fn test_install_on_management_cluster_with_preexisting_repo() {
        for (config_path, expected_add, eksa_dir, flux_dir) in [
            (
                "",
                "clusters",
                "clusters/management-cluster/management-cluster/eksa-system",
                "clusters/management-cluster/flux-system",
            ),
            (
                "user/provided/path",
                "user/provided",
                "user/provided/path/management-cluster/eksa-system",
                "user/provided/path/flux-system",
            ),
        ] {
            let dir = TempDir::new().unwrap();
            let mut mocks = Mocks::new();
            expect_install_git_flow(&mut mocks, expected_add, true);
            mocks
                .provider
                .expect_path_exists()
                .times(1)
                .returning(|_, _, _, _| Ok(false));
            mocks
                .flux
                .expect_bootstrap_github()
                .times(1)
                .returning(|_, _| Ok(()));

            let mut spec = cluster_spec("management-cluster", config_path);
            with_provider_docs(&mut spec);
            let flux = mocks.build(&dir);

            flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
                .unwrap();

            let eksa = dir.path().join(eksa_dir);
            assert!(eksa.join("eksa-cluster.yaml").exists());
            assert!(eksa.join("kustomization.yaml").exists());
            let config_file = std::fs::read_to_string(eksa.join("eksa-cluster.yaml")).unwrap();
            assert!(config_file.contains("kind: Cluster"));
            assert!(config_file.contains("name: management-cluster"));
            assert!(config_file.contains("kind: VSphereDatacenterConfig"));

            let flux_system = dir.path().join(flux_dir);
            assert!(flux_system.join("kustomization.yaml").exists());
            assert!(flux_system.join("gotk-sync.yaml").exists());
        }
    }

    #[test]
    fn test_install_without_provider_docs_writes_only_flux_files() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        expect_install_git_flow(&mut mocks, "clusters", true);
        mocks
            .provider
            .expect_path_exists()
            .times(1)
            .returning(|_, _, _, _| Ok(false));
        mocks
            .flux
            .expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Ok(()));

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
            .unwrap();

        let eksa = dir
            .path()
            .join("clusters/management-cluster/management-cluster/eksa-system");
        assert!(!eksa.join("eksa-cluster.yaml").exists());
        assert!(!eksa.join("kustomization.yaml").exists());

        let flux_system = dir.path().join("clusters/management-cluster/flux-system");
        assert!(flux_system.join("kustomization.yaml").exists());
        assert!(flux_system.join("gotk-sync.yaml").exists());
    }

    #[test]
    fn test_install_on_workload_cluster_skips_flux_files_and_bootstrap() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        // No pull, no remote path validation, no bootstrap for a workload
        // cluster.
        expect_install_git_flow(&mut mocks, "clusters", false);

        let mut spec = cluster_spec("workload-cluster", "");
        spec.cluster.set_managed_by("management-cluster");
        spec.gitops.as_mut().unwrap().cluster_config_path = String::new();
        spec.set_defaults();
        with_provider_docs(&mut spec);

        let flux = mocks.build(&dir);
        flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
            .unwrap();

        let eksa = dir
            .path()
            .join("clusters/management-cluster/workload-cluster/eksa-system");
        assert!(eksa.join("eksa-cluster.yaml").exists());
        assert!(eksa.join("kustomization.yaml").exists());

        let flux_system = dir.path().join("clusters/management-cluster/flux-system");
        assert!(!flux_system.join("kustomization.yaml").exists());
        assert!(!flux_system.join("gotk-sync.yaml").exists());
    }

    #[test]
    fn test_install_with_no_preexisting_repo_creates_and_initializes() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();

        mocks.provider.expect_get_repo().times(1).returning(|| Ok(None));
        mocks
            .provider
            .expect_create_repo()
            .withf(|opts| {
                opts.name == "testRepo"
                    && opts.owner == "mFowler"
                    && opts.personal
                    && opts.privacy
            })
            .times(1)
            .returning(|_| Ok(Repository::default()));
        mocks
            .provider
            .expect_path_exists()
            .times(1)
            .returning(|_, _, _, _| Ok(false));

        mocks.client.expect_init().times(1).returning(|| Ok(()));
        // One commit to seed the fresh repository, one for the config.
        mocks.client.expect_commit().times(2).returning(|_| Ok(()));
        mocks
            .client
            .expect_branch()
            .withf(|b| b == BRANCH)
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .client
            .expect_add()
            .withf(|p| p == "clusters")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));
        mocks
            .client
            .expect_pull()
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .flux
            .expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let flux = mocks.build(&dir);
        flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
            .unwrap();

        assert!(dir
            .path()
            .join("clusters/management-cluster/flux-system/kustomization.yaml")
            .exists());
    }

    #[test]
    fn test_install_with_bare_remote_falls_back_to_local_init() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();

        mocks.provider.expect_get_repo().times(1).returning(|| {
            Ok(Some(Repository {
                name: "testRepo".to_string(),
                ..Default::default()
            }))
        });
        mocks.client.expect_clone_repo().times(1).returning(|| {
            Err(GitError::RepositoryIsEmpty {
                repository: "testRepo".to_string(),
            })
        });
        mocks
            .provider
            .expect_path_exists()
            .times(1)
            .returning(|_, _, _, _| Ok(false));
        mocks.client.expect_init().times(1).returning(|| Ok(()));
        mocks.client.expect_commit().times(2).returning(|_| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks
            .client
            .expect_add()
            .withf(|p| p == "clusters")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));
        mocks.client.expect_pull().times(1).returning(|_| Ok(()));
        mocks
            .flux
            .expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let flux = mocks.build(&dir);
        flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
            .unwrap();
    }

    #[test]
    fn test_bootstrap_failure_triggers_uninstall_and_returns_original_error() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .flux
            .expect_bootstrap_github()
            .times(2)
            .returning(|_, _| {
                Err(GitOpsError::Reconciler {
                    operation: "bootstrap github".to_string(),
                    message: "boom".to_string(),
                })
            });
        mocks
            .flux
            .expect_uninstall()
            .times(1)
            .returning(|_, _| Ok(()));

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        let err = flux.bootstrap(&Cluster::default(), &spec).unwrap_err();
        assert!(err.to_string().contains("bootstrap github"));
    }

    #[test]
    fn test_bootstrap_skips_workload_cluster() {
        let dir = TempDir::new().unwrap();
        let mocks = Mocks::new();
        let mut spec = cluster_spec("workload-cluster", "");
        spec.cluster.set_managed_by("management-cluster");

        let flux = mocks.build(&dir);
        flux.bootstrap(&Cluster::default(), &spec).unwrap();
    }

    #[test]
    fn test_bootstrap_generic_git_uses_git_bootstrap() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .flux
            .expect_bootstrap_git()
            .times(1)
            .returning(|_, _| Ok(()));

        let mut spec = cluster_spec("management-cluster", "");
        spec.gitops.as_mut().unwrap().provider = GitProviderConfig::Git(GenericGitConfig {
            repository_url: "https://example.com/team/fleet.git".to_string(),
            private_key_file: String::new(),
        });

        let flux = mocks.build(&dir);
        flux.bootstrap(&Cluster::default(), &spec).unwrap();
    }

    #[test]
    fn test_install_skips_when_config_not_newly_added() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let cluster = Cluster::default();
        let current = cluster_spec("management-cluster", "");
        let new = cluster_spec("management-cluster", "");

        // Unchanged config: upgrade territory, not install.
        flux.install(&cluster, &components("v0.1.0"), &current, &new)
            .unwrap();

        // Removed config: nothing to do.
        let mut removed = new.clone();
        removed.gitops = None;
        flux.install(&cluster, &components("v0.1.0"), &current, &removed)
            .unwrap();
    }

    #[test]
    fn test_install_without_git_tooling_is_noop() {
        let flux = Flux::new(
            Box::new(MockFluxClient::new()),
            Box::new(MockKubeClient::new()),
            None,
        );
        let spec = cluster_spec("management-cluster", "");
        flux.install_git_ops(&Cluster::default(), &spec, &components("v0.1.0"))
            .unwrap();
    }

    #[test]
    fn test_update_git_eksa_spec_clones_when_local_repo_missing() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks
            .client
            .expect_add()
            .withf(|p| p == "clusters/management-cluster/management-cluster/eksa-system")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let datacenter = spec.datacenter.clone();
        let machines = spec.machine_configs.clone();
        let flux = mocks.build(&dir);

        flux.update_git_eksa_spec(&spec, datacenter.as_ref(), &machines)
            .unwrap();
        assert!(dir
            .path()
            .join("clusters/management-cluster/management-cluster/eksa-system/eksa-cluster.yaml")
            .exists());
    }

    #[test]
    fn test_update_git_eksa_spec_reuses_existing_checkout() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks.client.expect_add().times(1).returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));

        std::fs::create_dir_all(dir.path().join(".git")).unwrap();

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let datacenter = spec.datacenter.clone();
        let machines = spec.machine_configs.clone();
        let flux = mocks.build(&dir);

        flux.update_git_eksa_spec(&spec, datacenter.as_ref(), &machines)
            .unwrap();
    }

    #[test]
    fn test_update_git_eksa_spec_clone_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .client
            .expect_clone_repo()
            .times(2)
            .returning(|| Err(GitError::Network("failed to clone repo".to_string())));

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let flux = mocks.build(&dir);

        let err = flux
            .update_git_eksa_spec(&spec, None, &[])
            .unwrap_err();
        assert!(matches!(err, GitOpsError::Clone(_)));
    }

    #[test]
    fn test_update_git_eksa_spec_branch_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| {
            Err(GitError::CommandFailed {
                operation: "checkout",
                message: "failed to switch branch".to_string(),
            })
        });

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        let err = flux.update_git_eksa_spec(&spec, None, &[]).unwrap_err();
        assert!(matches!(err, GitOpsError::Branch { .. }));
    }

    #[test]
    fn test_update_git_eksa_spec_add_failure_propagates() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks.client.expect_add().times(1).returning(|_| {
            Err(GitError::CommandFailed {
                operation: "add",
                message: "failed to add file".to_string(),
            })
        });

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let datacenter = spec.datacenter.clone();
        let flux = mocks.build(&dir);
        let err = flux
            .update_git_eksa_spec(&spec, datacenter.as_ref(), &[])
            .unwrap_err();
        assert!(matches!(err, GitOpsError::Add { .. }));
    }

    #[test]
    fn test_update_git_eksa_spec_push_failure_after_retry() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks.client.expect_add().times(1).returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks
            .client
            .expect_push()
            .times(2)
            .returning(|| Err(GitError::Network("failed to push code".to_string())));

        let mut spec = cluster_spec("management-cluster", "");
        with_provider_docs(&mut spec);
        let datacenter = spec.datacenter.clone();
        let flux = mocks.build(&dir);
        let err = flux
            .update_git_eksa_spec(&spec, datacenter.as_ref(), &[])
            .unwrap_err();
        assert!(matches!(err, GitOpsError::Push(_)));
    }

    #[test]
    fn test_update_git_eksa_spec_skips_without_gitops() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let spec = ClusterSpec::new(ClusterConfig::new("management-cluster"));
        flux.update_git_eksa_spec(&spec, None, &[]).unwrap();
    }

    #[test]
    fn test_force_reconcile_stamps_annotation() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .kube
            .expect_update_annotation()
            .withf(|_, resource_type, name, annotations, namespace| {
                resource_type == GIT_REPOSITORY_RESOURCE_TYPE
                    && name == SYSTEM_OBJECT_NAME
                    && namespace == "flux-system"
                    && annotations.contains_key(FORCE_RECONCILE_ANNOTATION)
            })
            .times(1)
            .returning(|_, _, _, _, _| Ok(()));

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        flux.force_reconcile_git_repo(&Cluster::default(), &spec)
            .unwrap();
    }

    #[test]
    fn test_force_reconcile_skips_without_gitops() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let spec = ClusterSpec::new(ClusterConfig::new("management-cluster"));
        flux.force_reconcile_git_repo(&Cluster::default(), &spec)
            .unwrap();
    }

    #[test]
    fn test_cleanup_removes_self_managed_config_path() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks
            .client
            .expect_remove()
            .withf(|p| p == "clusters/management-cluster")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));

        std::fs::create_dir_all(dir.path().join("clusters/management-cluster")).unwrap();

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        flux.cleanup_git_repo(&spec).unwrap();
    }

    #[test]
    fn test_cleanup_removes_workload_cluster_subtree() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks
            .client
            .expect_remove()
            .withf(|p| p == "clusters/management-cluster/workload-cluster/eksa-system")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));

        std::fs::create_dir_all(
            dir.path()
                .join("clusters/management-cluster/workload-cluster/eksa-system"),
        )
        .unwrap();

        let mut spec = cluster_spec("workload-cluster", "");
        spec.cluster.set_managed_by("management-cluster");
        spec.gitops.as_mut().unwrap().cluster_config_path = String::new();
        spec.set_defaults();

        let flux = mocks.build(&dir);
        flux.cleanup_git_repo(&spec).unwrap();
    }

    #[test]
    fn test_cleanup_skips_when_subtree_absent() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        flux.cleanup_git_repo(&spec).unwrap();
    }

    fn spec_with_reconcile_targets() -> ClusterSpec {
        let mut spec = cluster_spec("management-cluster", "");
        spec.cluster.spec.datacenter_ref = Ref::new("VSphereDatacenterConfig", "datacenter");
        spec.cluster.spec.control_plane_configuration.machine_group_ref =
            Some(Ref::new("VSphereMachineConfig", "cp-machines"));
        spec.cluster.spec.worker_node_group_configurations = vec![
            WorkerNodeGroupConfiguration {
                name: "md-0".to_string(),
                count: 3,
                machine_group_ref: Some(Ref::new("VSphereMachineConfig", "worker-machines")),
            },
            WorkerNodeGroupConfiguration {
                name: "md-1".to_string(),
                count: 1,
                machine_group_ref: Some(Ref::new("VSphereMachineConfig", "worker-machines")),
            },
        ];
        spec
    }

    #[test]
    fn test_pause_annotates_each_distinct_resource_once() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        for (resource_type, name) in [
            ("clusters", "management-cluster"),
            ("vspheredatacenterconfigs", "datacenter"),
            ("vspheremachineconfigs", "cp-machines"),
            ("vspheremachineconfigs", "worker-machines"),
        ] {
            mocks
                .kube
                .expect_update_annotation()
                .withf(move |_, rt, n, _, namespace| {
                    rt == resource_type && n == name && namespace == "default"
                })
                .times(1)
                .returning(|_, _, _, _, _| Ok(()));
        }

        let spec = spec_with_reconcile_targets();
        let flux = mocks.build(&dir);
        flux.pause_cluster_resources_reconcile(&Cluster::default(), &spec)
            .unwrap();
    }

    #[test]
    fn test_resume_clears_each_distinct_resource_once() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        for (resource_type, name) in [
            ("clusters", "management-cluster"),
            ("vspheredatacenterconfigs", "datacenter"),
            ("vspheremachineconfigs", "cp-machines"),
            ("vspheremachineconfigs", "worker-machines"),
        ] {
            mocks
                .kube
                .expect_remove_annotation()
                .withf(move |_, rt, n, _, namespace| {
                    rt == resource_type && n == name && namespace == "default"
                })
                .times(1)
                .returning(|_, _, _, _, _| Ok(()));
        }

        let spec = spec_with_reconcile_targets();
        let flux = mocks.build(&dir);
        flux.resume_cluster_resources_reconcile(&Cluster::default(), &spec)
            .unwrap();
    }

    #[test]
    fn test_pause_first_failure_short_circuits() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .kube
            .expect_update_annotation()
            .withf(|_, rt, _, _, _| rt == "clusters")
            .times(2)
            .returning(|_, _, _, _, _| {
                Err(GitOpsError::Kube {
                    operation: "annotate".to_string(),
                    resource_type: "clusters".to_string(),
                    name: "management-cluster".to_string(),
                    message: "boom".to_string(),
                })
            });

        let spec = spec_with_reconcile_targets();
        let flux = mocks.build(&dir);
        assert!(flux
            .pause_cluster_resources_reconcile(&Cluster::default(), &spec)
            .is_err());
    }

    #[test]
    fn test_pause_and_resume_kustomization() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .flux
            .expect_suspend_kustomization()
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .flux
            .expect_resume_kustomization()
            .times(1)
            .returning(|_, _| Ok(()));

        let spec = cluster_spec("management-cluster", "");
        let flux = mocks.build(&dir);
        flux.pause_git_ops_kustomization(&Cluster::default(), &spec)
            .unwrap();
        flux.resume_git_ops_kustomization(&Cluster::default(), &spec)
            .unwrap();
    }

    #[test]
    fn test_validations_empty_without_git() {
        let flux = Flux::new(
            Box::new(MockFluxClient::new()),
            Box::new(MockKubeClient::new()),
            None,
        );
        let spec = cluster_spec("management-cluster", "fluxFolder");
        assert!(flux.validations(&spec).is_empty());
    }

    #[test]
    fn test_validations_error_from_path_check() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .provider
            .expect_path_exists()
            .times(2)
            .returning(|_, _, _, _| Err(GitError::Network("error from git".to_string())));

        let spec = cluster_spec("management-cluster", "fluxFolder");
        let flux = mocks.build(&dir);
        assert!(run_validations(flux.validations(&spec)).is_err());
    }

    #[test]
    fn test_validations_occupied_path_fails() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .provider
            .expect_path_exists()
            .withf(|owner, repo, branch, path| {
                owner == "mFowler"
                    && repo == "testRepo"
                    && branch == BRANCH
                    && path == "fluxFolder"
            })
            .times(1)
            .returning(|_, _, _, _| Ok(true));

        let spec = cluster_spec("management-cluster", "fluxFolder");
        let flux = mocks.build(&dir);
        assert!(run_validations(flux.validations(&spec)).is_err());
    }

    #[test]
    fn test_validations_pass_on_free_path() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks
            .provider
            .expect_path_exists()
            .times(1)
            .returning(|_, _, _, _| Ok(false));

        let spec = cluster_spec("management-cluster", "fluxFolder");
        let flux = mocks.build(&dir);
        run_validations(flux.validations(&spec)).unwrap();
    }

    #[test]
    fn test_upgrade_skips_workload_cluster() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let old_spec = cluster_spec("management-cluster", "");
        let mut new_spec = old_spec.clone();
        new_spec.cluster.set_managed_by("management-cluster-2");

        let diff = flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &old_spec,
                &new_spec,
            )
            .unwrap();
        assert!(diff.is_none());
    }

    #[test]
    fn test_upgrade_no_version_change_is_nil_diff() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let old_spec = cluster_spec("management-cluster", "");
        let new_spec = old_spec.clone();

        let diff = flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.1.0"),
                &old_spec,
                &new_spec,
            )
            .unwrap();
        assert!(diff.is_none());
    }

    #[test]
    fn test_upgrade_skips_when_gitops_removed_or_never_present() {
        let dir = TempDir::new().unwrap();
        let flux = Mocks::new().build(&dir);
        let with_config = cluster_spec("management-cluster", "");
        let mut without_config = with_config.clone();
        without_config.gitops = None;

        assert!(flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &with_config,
                &without_config,
            )
            .unwrap()
            .is_none());

        assert!(flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &without_config,
                &with_config,
            )
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_upgrade_success_rewrites_flux_files_and_rebootstraps() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks
            .client
            .expect_branch()
            .withf(|b| b == BRANCH)
            .times(1)
            .returning(|_| Ok(()));
        mocks
            .client
            .expect_add()
            .withf(|p| p == "clusters/management-cluster")
            .times(1)
            .returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));
        mocks
            .kube
            .expect_delete_secret()
            .withf(|_, name, namespace| name == "flux-system" && namespace == "flux-system")
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .flux
            .expect_bootstrap_github()
            .times(1)
            .returning(|_, _| Ok(()));
        mocks
            .flux
            .expect_reconcile()
            .times(1)
            .returning(|_, _| Ok(()));

        let old_spec = cluster_spec("management-cluster", "");
        let new_spec = old_spec.clone();
        let flux = mocks.build(&dir);

        let diff = flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &old_spec,
                &new_spec,
            )
            .unwrap()
            .expect("an upgrade diff");
        assert_eq!(diff.component_reports.len(), 1);
        assert_eq!(diff.component_reports[0].component_name, "Flux");
        assert_eq!(diff.component_reports[0].old_version, "v0.1.0");
        assert_eq!(diff.component_reports[0].new_version, "v0.2.0");

        let kustomization = std::fs::read_to_string(
            dir.path()
                .join("clusters/management-cluster/flux-system/kustomization.yaml"),
        )
        .unwrap();
        assert!(kustomization.contains("source-controller:v0.2.0"));
    }

    #[test]
    fn test_upgrade_bootstrap_error_aborts() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks.client.expect_add().times(1).returning(|_| Ok(()));
        mocks.client.expect_commit().times(1).returning(|_| Ok(()));
        mocks.client.expect_push().times(1).returning(|| Ok(()));
        mocks
            .kube
            .expect_delete_secret()
            .times(1)
            .returning(|_, _, _| Ok(()));
        mocks
            .flux
            .expect_bootstrap_github()
            .times(2)
            .returning(|_, _| {
                Err(GitOpsError::Reconciler {
                    operation: "bootstrap github".to_string(),
                    message: "error from client".to_string(),
                })
            });

        let old_spec = cluster_spec("management-cluster", "");
        let new_spec = old_spec.clone();
        let flux = mocks.build(&dir);

        let err = flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &old_spec,
                &new_spec,
            )
            .unwrap_err();
        assert!(err.to_string().contains("error from client"));
    }

    #[test]
    fn test_upgrade_add_error_aborts_before_reconciler_calls() {
        let dir = TempDir::new().unwrap();
        let mut mocks = Mocks::new();
        mocks.client.expect_clone_repo().times(1).returning(|| Ok(()));
        mocks.client.expect_branch().times(1).returning(|_| Ok(()));
        mocks.client.expect_add().times(1).returning(|_| {
            Err(GitError::CommandFailed {
                operation: "add",
                message: "error in add".to_string(),
            })
        });

        let old_spec = cluster_spec("management-cluster", "");
        let new_spec = old_spec.clone();
        let flux = mocks.build(&dir);

        let err = flux
            .upgrade(
                &Cluster::default(),
                &components("v0.1.0"),
                &components("v0.2.0"),
                &old_spec,
                &new_spec,
            )
            .unwrap_err();
        assert!(err.to_string().contains("error in add"));
    }

    #[test]
    fn test_parent_dir() {
        assert_eq!(parent_dir("clusters/management-cluster"), "clusters");
        assert_eq!(parent_dir("clusters"), ".");
        assert_eq!(parent_dir("user/provided/path"), "user/provided");
    }
}
