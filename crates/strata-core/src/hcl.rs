//! Backend and cloud configuration blocks written into the working directory.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use crate::error::CoreError;
use crate::resource::{CloudSpec, ManagedResource};

/// Backend block for `resource`, by priority:
///
/// 1. custom configuration, verbatim inside `terraform { }`
/// 2. cluster-native backend from `backendConfig`
/// 3. local-file backend when running outside a cluster
/// 4. cluster-native backend named after the resource
///
/// Cloud mode and a disabled backend replace all of these: the cloud block
/// is returned when configured, otherwise nothing is written.
pub fn backend_config(
    resource: &ManagedResource,
    outside_cluster: bool,
) -> Result<Option<String>, CoreError> {
    if resource.backend_completely_disabled() {
        return resource.spec.cloud.as_ref().map(CloudSpec::to_hcl).transpose();
    }

    let labels = labels_as_hcl(&resource.metadata.labels, 6)?;
    let text = match &resource.spec.backend_config {
        Some(backend) if !backend.custom_configuration.is_empty() => format!(
            "\nterraform {{\n  {}\n}}\n",
            backend.custom_configuration
        ),
        Some(backend) => format!(
            "\nterraform {{\n  backend \"kubernetes\" {{\n    secret_suffix     = {}\n    in_cluster_config = {}\n    config_path       = {}\n    namespace         = {}\n    labels            = {{\n      {}\n    }}\n  }}\n}}\n",
            quote(&backend.secret_suffix)?,
            backend.in_cluster_config,
            quote(&backend.config_path)?,
            quote(resource.namespace())?,
            labels,
        ),
        None if outside_cluster => "\nterraform {\n  backend \"local\" { }\n}".to_string(),
        None => format!(
            "\nterraform {{\n  backend \"kubernetes\" {{\n    secret_suffix     = {}\n    in_cluster_config = true\n    namespace         = {}\n    labels            = {{\n      {}\n    }}\n  }}\n}}\n",
            quote(resource.name())?,
            quote(resource.namespace())?,
            labels,
        ),
    };
    Ok(Some(text))
}

/// HCL string literal: JSON escaping plus `$${` and `%%{` so values are
/// never read as template interpolations or directives.
pub fn quote(value: &str) -> Result<String, CoreError> {
    Ok(serde_json::to_string(value)?
        .replace("${", "$${")
        .replace("%{", "%%{"))
}

fn labels_as_hcl(labels: &BTreeMap<String, String>, indent: usize) -> Result<String, CoreError> {
    let mut out = String::new();
    for (key, value) in labels {
        let _ = writeln!(out, "{:indent$}{} = {}", "", quote(key)?, quote(value)?);
    }
    Ok(out.trim().to_string())
}

impl CloudSpec {
    pub fn to_hcl(&self) -> Result<String, CoreError> {
        let mut out = String::new();
        out.push_str("terraform {\n");
        out.push_str("  cloud {\n");
        let _ = writeln!(out, "    organization = {}", quote(&self.organization)?);
        out.push_str("    workspaces {\n");
        if !self.workspaces.name.is_empty() {
            let _ = writeln!(out, "      name = {}", quote(&self.workspaces.name)?);
        }
        if !self.workspaces.tags.is_empty() {
            let tags = self
                .workspaces
                .tags
                .iter()
                .map(|tag| quote(tag))
                .collect::<Result<Vec<_>, _>>()?;
            let _ = writeln!(out, "      tags = [{}]", tags.join(", "));
        }
        out.push_str("    }\n");
        let _ = writeln!(out, "    hostname = {}", quote(&self.hostname)?);
        let _ = writeln!(out, "    token = {}", quote(&self.token)?);
        out.push_str("  }\n");
        out.push_str("}\n");
        Ok(out)
    }
}
