//! Cluster data model: the desired-state documents every operation
//! consumes, and the version bundle describing the reconciler's own
//! components.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

/// Default branch for the configuration repository.
pub const DEFAULT_BRANCH: &str = "main";

/// Default namespace the reconciler's controllers run in.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "flux-system";

/// Handle to a running cluster the reconciler and kubectl operate on.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cluster {
    pub name: String,
    pub kubeconfig_file: String,
}

/// Object metadata, following K8s conventions.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub namespace: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub annotations: HashMap<String, String>,
}

impl ObjectMeta {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Reference to another cluster-scoped object by kind and name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ref {
    pub kind: String,
    pub name: String,
}

impl Ref {
    pub fn new(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Lowercase plural resource type for CLI addressing.
    pub fn resource_type(&self) -> String {
        format!("{}s", self.kind.to_lowercase())
    }
}

/// Control plane sizing and machine selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPlaneConfiguration {
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

/// A worker node group and its machine selection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNodeGroupConfiguration {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub machine_group_ref: Option<Ref>,
}

/// The cluster document itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: ClusterConfigSpec,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfigSpec {
    pub kubernetes_version: String,
    /// Name of the cluster that manages this one; absent (or equal to the
    /// own name) for a self-managed cluster.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub management_cluster: Option<String>,
    #[serde(default)]
    pub datacenter_ref: Ref,
    #[serde(default)]
    pub control_plane_configuration: ControlPlaneConfiguration,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub worker_node_group_configurations: Vec<WorkerNodeGroupConfiguration>,
}

impl ClusterConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            api_version: "anywhere.eks.amazonaws.com/v1alpha1".to_string(),
            kind: "Cluster".to_string(),
            metadata: ObjectMeta::new(name),
            spec: ClusterConfigSpec::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// A cluster is self-managed unless another cluster manages it.
    pub fn is_self_managed(&self) -> bool {
        match &self.spec.management_cluster {
            None => true,
            Some(manager) => manager == self.name(),
        }
    }

    /// Name of the cluster responsible for this one's lifecycle.
    pub fn managed_by(&self) -> &str {
        self.spec
            .management_cluster
            .as_deref()
            .unwrap_or_else(|| self.name())
    }

    pub fn set_managed_by(&mut self, manager: impl Into<String>) {
        self.spec.management_cluster = Some(manager.into());
    }
}

/// A provider-specific child document (datacenter or machine config).
/// The spec payload is opaque to this subsystem; it is carried through to
/// the repository verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderConfig {
    pub api_version: String,
    pub kind: String,
    pub metadata: ObjectMeta,
    pub spec: serde_yaml::Value,
}

impl ProviderConfig {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }
}

/// GitOps configuration: where the cluster configuration lives in git and
/// which provider fronts the repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GitOpsConfig {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub branch: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub cluster_config_path: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub system_namespace: String,
    #[serde(flatten)]
    pub provider: GitProviderConfig,
}

/// Exactly one provider flavor is configured at any time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum GitProviderConfig {
    /// Hosted provider exposing both git transport and a management API.
    Github(GithubProviderConfig),
    /// Bring-your-own-git: the user supplies a reachable, non-empty remote.
    Git(GenericGitConfig),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GithubProviderConfig {
    pub owner: String,
    pub repository: String,
    /// Personal account repository rather than an organization one.
    #[serde(default)]
    pub personal: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericGitConfig {
    pub repository_url: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub private_key_file: String,
}

impl GitOpsConfig {
    /// Repository name: configured explicitly for a hosted provider,
    /// derived from the URL in bring-your-own-git mode.
    pub fn repository(&self) -> String {
        match &self.provider {
            GitProviderConfig::Github(github) => github.repository.clone(),
            GitProviderConfig::Git(git) => {
                let base = git
                    .repository_url
                    .trim_end_matches('/')
                    .rsplit('/')
                    .next()
                    .unwrap_or("");
                base.trim_end_matches(".git").to_string()
            }
        }
    }

    pub fn owner(&self) -> &str {
        match &self.provider {
            GitProviderConfig::Github(github) => &github.owner,
            GitProviderConfig::Git(_) => "",
        }
    }

    pub fn personal(&self) -> bool {
        match &self.provider {
            GitProviderConfig::Github(github) => github.personal,
            GitProviderConfig::Git(_) => false,
        }
    }
}

/// The full desired-state input to every operation. Owned by the caller
/// and treated as immutable here.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterSpec {
    pub cluster: ClusterConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gitops: Option<GitOpsConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datacenter: Option<ProviderConfig>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub machine_configs: Vec<ProviderConfig>,
}

impl ClusterSpec {
    pub fn new(cluster: ClusterConfig) -> Self {
        Self {
            cluster,
            ..Default::default()
        }
    }

    /// Applies the well-known defaults to the GitOps configuration:
    /// branch `main`, namespace `flux-system`, and a config path of
    /// `clusters/<managing-cluster-name>`.
    pub fn set_defaults(&mut self) {
        let managed_by = self.cluster.managed_by().to_string();
        if let Some(config) = &mut self.gitops {
            if config.branch.is_empty() {
                config.branch = DEFAULT_BRANCH.to_string();
            }
            if config.system_namespace.is_empty() {
                config.system_namespace = DEFAULT_SYSTEM_NAMESPACE.to_string();
            }
            if config.cluster_config_path.is_empty() {
                config.cluster_config_path = default_config_path(&managed_by);
            }
        }
    }

    /// Distinct machine-config references across the control plane and all
    /// worker groups, deduplicated by name.
    pub fn machine_config_refs(&self) -> Vec<Ref> {
        let mut seen = std::collections::HashSet::new();
        let mut refs = Vec::new();

        let candidates = self
            .cluster
            .spec
            .control_plane_configuration
            .machine_group_ref
            .iter()
            .chain(
                self.cluster
                    .spec
                    .worker_node_group_configurations
                    .iter()
                    .filter_map(|group| group.machine_group_ref.as_ref()),
            );

        for reference in candidates {
            if seen.insert(reference.name.clone()) {
                refs.push(reference.clone());
            }
        }
        refs
    }
}

/// Default repository path for a cluster's configuration.
pub fn default_config_path(managing_cluster_name: &str) -> String {
    Path::new("clusters")
        .join(managing_cluster_name)
        .to_string_lossy()
        .into_owned()
}

/// A versioned reconciler container image.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Image {
    pub uri: String,
}

impl Image {
    pub fn new(uri: impl Into<String>) -> Self {
        Self { uri: uri.into() }
    }

    /// The full image reference including tag.
    pub fn versioned_image(&self) -> &str {
        &self.uri
    }

    /// The tag portion of the reference, empty if untagged.
    pub fn tag(&self) -> &str {
        self.uri.rsplit(':').next().filter(|t| *t != self.uri).unwrap_or("")
    }
}

/// The resolved, versioned set of reconciler components, derived once per
/// operation from a release bundle. Read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagementComponents {
    pub version: String,
    pub source_controller: Image,
    pub kustomize_controller: Image,
    pub helm_controller: Image,
    pub notification_controller: Image,
}

/// Report of a component version change produced by an upgrade.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentChangeDiff {
    pub component_name: String,
    pub old_version: String,
    pub new_version: String,
}

/// The set of component changes an upgrade will apply; `None` from the
/// upgrade operation means nothing to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeDiff {
    pub component_reports: Vec<ComponentChangeDiff>,
}
