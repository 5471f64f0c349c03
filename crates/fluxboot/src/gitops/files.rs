//! Materializes cluster and reconciler manifests into the working tree.
//!
//! Two independent targets: the cluster's own configuration under
//! `eksa-system`, and the reconciler's manifests under the system
//! namespace directory. Neither depends on the other; the self-managed
//! gate for the reconciler files lives at the call site.

use crate::cluster::{ClusterSpec, ManagementComponents, ProviderConfig};
use crate::filewriter::FileWriter;
use crate::gitops::error::{GitOpsError, Result};

/// Directory name for the cluster's own manifests.
pub const EKSA_SYSTEM_DIR_NAME: &str = "eksa-system";

pub const KUSTOMIZATION_FILE_NAME: &str = "kustomization.yaml";
pub const CLUSTER_CONFIG_FILE_NAME: &str = "eksa-cluster.yaml";
pub const FLUX_SYNC_FILE_NAME: &str = "gotk-sync.yaml";

const EKSA_KUSTOMIZATION_TEMPLATE: &str =
    include_str!("manifests/eksa-system/kustomization.yaml");
const FLUX_KUSTOMIZATION_TEMPLATE: &str =
    include_str!("manifests/flux-system/kustomization.yaml");
const FLUX_SYNC_CONTENT: &str = include_str!("manifests/flux-system/gotk-sync.yaml");

/// Substitutes `{{Key}}` placeholders in an embedded template.
fn render(template: &str, values: &[(&str, &str)]) -> String {
    let mut rendered = template.to_string();
    for (key, value) in values {
        rendered = rendered.replace(&format!("{{{{{key}}}}}"), value);
    }
    rendered
}

/// Serializes the cluster document plus its provider child documents as
/// one multi-document YAML stream.
fn marshal_cluster_config(
    spec: &ClusterSpec,
    datacenter: Option<&ProviderConfig>,
    machine_configs: &[ProviderConfig],
) -> Result<String> {
    let mut docs = vec![serde_yaml::to_string(&spec.cluster)?];
    if let Some(datacenter) = datacenter {
        docs.push(serde_yaml::to_string(datacenter)?);
    }
    for machine in machine_configs {
        docs.push(serde_yaml::to_string(machine)?);
    }
    Ok(docs.join("---\n"))
}

/// Writes the two manifest sets into freshly initialized subdirectory
/// writers.
pub struct FileGenerator {
    eksa_writer: FileWriter,
    flux_writer: FileWriter,
}

impl FileGenerator {
    /// Creates sub-writers for the two target directories, clearing any
    /// stale temp files so repeated invocations never accumulate leftovers.
    pub fn init(writer: &FileWriter, eksa_system_dir: &str, flux_system_dir: &str) -> Result<Self> {
        let eksa_writer =
            writer
                .with_dir(eksa_system_dir)
                .map_err(|source| GitOpsError::InitWriter {
                    target: "eksa-system",
                    source,
                })?;
        eksa_writer.clean_up_temp();

        let flux_writer =
            writer
                .with_dir(flux_system_dir)
                .map_err(|source| GitOpsError::InitWriter {
                    target: "flux-system",
                    source,
                })?;
        flux_writer.clean_up_temp();

        Ok(Self {
            eksa_writer,
            flux_writer,
        })
    }

    /// Writes the serialized cluster configuration and its kustomization
    /// manifest. Entirely skipped when there are no provider documents to
    /// write: a workload cluster without its own provider objects must not
    /// leave empty manifests behind.
    pub fn write_eksa_files(
        &self,
        spec: &ClusterSpec,
        datacenter: Option<&ProviderConfig>,
        machine_configs: &[ProviderConfig],
    ) -> Result<()> {
        if datacenter.is_none() && machine_configs.is_empty() {
            return Ok(());
        }

        self.write_cluster_config(spec, datacenter, machine_configs)?;
        self.write_eksa_kustomization()
    }

    fn write_cluster_config(
        &self,
        spec: &ClusterSpec,
        datacenter: Option<&ProviderConfig>,
        machine_configs: &[ProviderConfig],
    ) -> Result<()> {
        let content = marshal_cluster_config(spec, datacenter, machine_configs)?;
        self.eksa_writer
            .write(CLUSTER_CONFIG_FILE_NAME, content.as_bytes())
            .map_err(|source| GitOpsError::WriteFile {
                target: "eksa-system cluster config",
                source,
            })?;
        Ok(())
    }

    fn write_eksa_kustomization(&self) -> Result<()> {
        let content = render(
            EKSA_KUSTOMIZATION_TEMPLATE,
            &[("ConfigFileName", CLUSTER_CONFIG_FILE_NAME)],
        );
        self.eksa_writer
            .write(KUSTOMIZATION_FILE_NAME, content.as_bytes())
            .map_err(|source| GitOpsError::WriteFile {
                target: "eksa-system kustomization",
                source,
            })?;
        Ok(())
    }

    /// Writes the reconciler's kustomization (namespace + controller image
    /// overrides) and the static sync manifest.
    pub fn write_flux_system_files(
        &self,
        components: &ManagementComponents,
        spec: &ClusterSpec,
    ) -> Result<()> {
        self.write_flux_kustomization(components, spec)?;
        self.write_flux_sync()
    }

    fn write_flux_kustomization(
        &self,
        components: &ManagementComponents,
        spec: &ClusterSpec,
    ) -> Result<()> {
        let namespace = spec
            .gitops
            .as_ref()
            .map(|config| config.system_namespace.as_str())
            .unwrap_or_default();
        let content = render(
            FLUX_KUSTOMIZATION_TEMPLATE,
            &[
                ("Namespace", namespace),
                (
                    "SourceControllerImage",
                    components.source_controller.versioned_image(),
                ),
                (
                    "KustomizeControllerImage",
                    components.kustomize_controller.versioned_image(),
                ),
                (
                    "HelmControllerImage",
                    components.helm_controller.versioned_image(),
                ),
                (
                    "NotificationControllerImage",
                    components.notification_controller.versioned_image(),
                ),
            ],
        );
        self.flux_writer
            .write(KUSTOMIZATION_FILE_NAME, content.as_bytes())
            .map_err(|source| GitOpsError::WriteFile {
                target: "flux-system kustomization",
                source,
            })?;
        Ok(())
    }

    fn write_flux_sync(&self) -> Result<()> {
        self.flux_writer
            .write(FLUX_SYNC_FILE_NAME, FLUX_SYNC_CONTENT.as_bytes())
            .map_err(|source| GitOpsError::WriteFile {
                target: "flux-system sync manifest",
                source,
            })?;
        Ok(())
    }
}
