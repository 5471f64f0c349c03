//! `kubectl` adapter for the annotation and secret operations the
//! orchestrator needs.

use std::collections::BTreeMap;
use std::process::Command;

use crate::cluster::Cluster;
use crate::gitops::client::KubeClient;
use crate::gitops::error::GitOpsError;

/// Runs `kubectl` against a cluster's kubeconfig.
pub struct Kubectl {
    executable: String,
}

impl Default for Kubectl {
    fn default() -> Self {
        Self::new()
    }
}

impl Kubectl {
    pub fn new() -> Self {
        Self {
            executable: "kubectl".to_string(),
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
        resource_type: &str,
        name: &str,
        cluster: &Cluster,
        args: Vec<String>,
    ) -> Result<(), GitOpsError> {
        let mut cmd = Command::new(&self.executable);
        cmd.args(&args);
        if !cluster.kubeconfig_file.is_empty() {
            cmd.args(["--kubeconfig", &cluster.kubeconfig_file]);
        }

        let kube_error = |message: String| GitOpsError::Kube {
            operation: operation.to_string(),
            resource_type: resource_type.to_string(),
            name: name.to_string(),
            message,
        };

        let output = cmd.output().map_err(|e| kube_error(e.to_string()))?;
        if !output.status.success() {
            return Err(kube_error(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(())
    }
}

impl KubeClient for Kubectl {
    fn update_annotation(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        annotations: &BTreeMap<String, String>,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        let mut args = vec![
            "annotate".to_string(),
            "--overwrite".to_string(),
            resource_type.to_string(),
            object_name.to_string(),
        ];
        for (key, value) in annotations {
            args.push(format!("{key}={value}"));
        }
        args.push("--namespace".to_string());
        args.push(namespace.to_string());

        self.run("annotate", resource_type, object_name, cluster, args)
    }

    fn remove_annotation(
        &self,
        cluster: &Cluster,
        resource_type: &str,
        object_name: &str,
        key: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        let args = vec![
            "annotate".to_string(),
            resource_type.to_string(),
            object_name.to_string(),
            format!("{key}-"),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        self.run("remove annotation", resource_type, object_name, cluster, args)
    }

    fn delete_secret(
        &self,
        cluster: &Cluster,
        name: &str,
        namespace: &str,
    ) -> Result<(), GitOpsError> {
        let args = vec![
            "delete".to_string(),
            "secret".to_string(),
            name.to_string(),
            "--namespace".to_string(),
            namespace.to_string(),
        ];
        self.run("delete secret", "secrets", name, cluster, args)
    }
}
