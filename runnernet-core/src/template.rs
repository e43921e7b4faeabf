//! Template - Role definition and NSG deployment templates
//!
//! The role template carries one placeholder token for the subscription id.
//! Materializing it writes the substituted document to a scratch file that
//! lives exactly as long as the returned [`MaterializedRole`].

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use thiserror::Error;

use crate::config::ProvisionConfig;
use crate::resource::{RoleDefinition, TemplateDeployment};

/// Token replaced by the literal subscription id
pub const SUBSCRIPTION_PLACEHOLDER: &str = "<SUBSCRIPTION_ID>";

const BUILTIN_ROLE_TEMPLATE: &str = include_str!("../templates/role-definition.json");
const BUILTIN_NSG_TEMPLATE: &str = include_str!("../templates/nsg-deployment.json");

#[derive(Debug, Error)]
pub enum TemplateError {
    #[error("Failed to read template {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("Invalid template: {0}")]
    Invalid(String),

    #[error("Failed to write scratch file: {0}")]
    Scratch(String),
}

/// Role definition template with a subscription placeholder
#[derive(Debug, Clone)]
pub struct RoleTemplate {
    source: String,
}

impl RoleTemplate {
    pub fn builtin() -> Self {
        Self::from_source(BUILTIN_ROLE_TEMPLATE)
    }

    pub fn from_source(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, TemplateError> {
        read_template(path).map(Self::from_source)
    }

    /// Built-in template unless a path overrides it
    pub fn load(path: Option<&Path>) -> Result<Self, TemplateError> {
        match path {
            Some(path) => Self::from_file(path),
            None => Ok(Self::builtin()),
        }
    }

    /// Replace every placeholder with the subscription id, verbatim
    pub fn substitute(&self, subscription_id: &str) -> String {
        self.source.replace(SUBSCRIPTION_PLACEHOLDER, subscription_id)
    }

    /// Name of the role declared by the template
    pub fn role_name(&self) -> Result<String, TemplateError> {
        parse_role(&self.source).map(|role| role.name)
    }

    /// Substitute, parse and write the definition to a scratch file
    pub fn materialize(&self, subscription_id: &str) -> Result<MaterializedRole, TemplateError> {
        let document = self.substitute(subscription_id);
        let definition = parse_role(&document)?;

        let mut file = tempfile::Builder::new()
            .prefix("role-definition-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| TemplateError::Scratch(e.to_string()))?;
        file.write_all(document.as_bytes())
            .map_err(|e| TemplateError::Scratch(e.to_string()))?;
        file.flush()
            .map_err(|e| TemplateError::Scratch(e.to_string()))?;

        log::debug!(
            "materialized role '{}' at {}",
            definition.name,
            file.path().display()
        );

        Ok(MaterializedRole { definition, file })
    }
}

fn parse_role(document: &str) -> Result<RoleDefinition, TemplateError> {
    let role: RoleDefinition = serde_json::from_str(document)
        .map_err(|e| TemplateError::Invalid(format!("role definition: {}", e)))?;
    if role.name.trim().is_empty() {
        return Err(TemplateError::Invalid(
            "role definition has an empty Name".to_string(),
        ));
    }
    Ok(role)
}

fn read_template(path: &Path) -> Result<String, TemplateError> {
    std::fs::read_to_string(path).map_err(|e| TemplateError::Read {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// A substituted role definition backed by a scratch file
///
/// Dropping it removes the file.
#[derive(Debug)]
pub struct MaterializedRole {
    definition: RoleDefinition,
    file: NamedTempFile,
}

impl MaterializedRole {
    pub fn definition(&self) -> &RoleDefinition {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Location of the scratch file handed to the control plane
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// ARM template deploying the network security group and its rules
#[derive(Debug, Clone)]
pub struct NsgTemplate {
    document: serde_json::Value,
}

impl NsgTemplate {
    pub fn builtin() -> Result<Self, TemplateError> {
        Self::from_source(BUILTIN_NSG_TEMPLATE)
    }

    pub fn from_source(source: &str) -> Result<Self, TemplateError> {
        let document = serde_json::from_str(source)
            .map_err(|e| TemplateError::Invalid(format!("NSG template: {}", e)))?;
        Ok(Self { document })
    }

    pub fn load(path: Option<&Path>) -> Result<Self, TemplateError> {
        match path {
            Some(path) => Self::from_source(&read_template(path)?),
            None => Self::builtin(),
        }
    }

    /// Deployment of this template for the configured location and NSG name
    pub fn deployment(&self, config: &ProvisionConfig) -> TemplateDeployment {
        TemplateDeployment {
            resource_group: config.resource_group.clone(),
            template: self.document.clone(),
            parameters: vec![
                ("location".to_string(), config.location.clone()),
                ("nsgName".to_string(), config.nsg_name.clone()),
            ],
        }
    }
}
