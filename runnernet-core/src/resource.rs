//! Resource - Typed descriptions of the cloud objects the sequencer touches

use std::fmt;

use serde::{Deserialize, Serialize};

/// Resource type of the network settings resource
pub const NETWORK_SETTINGS_TYPE: &str = "GitHub.Network/networkSettings";

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceId {
    /// Resource type (e.g., "resource_group", "role_assignment")
    pub resource_type: String,
    /// Resource name
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Scope string for a whole subscription (`/subscriptions/{id}`)
pub fn subscription_scope(subscription_id: &str) -> String {
    format!("/subscriptions/{}", subscription_id)
}

/// Full ARM identifier of a subnet
pub fn subnet_resource_id(
    subscription_id: &str,
    resource_group: &str,
    vnet_name: &str,
    subnet_name: &str,
) -> String {
    format!(
        "/subscriptions/{}/resourceGroups/{}/providers/Microsoft.Network/virtualNetworks/{}/subnets/{}",
        subscription_id, resource_group, vnet_name, subnet_name
    )
}

/// Custom role definition, in the PascalCase layout the CLI reads and writes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RoleDefinition {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub is_custom: bool,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub not_actions: Vec<String>,
    #[serde(default)]
    pub assignable_scopes: Vec<String>,
}

impl RoleDefinition {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new("role_definition", &self.name)
    }
}

/// A (principal, role, scope) triple
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoleAssignment {
    pub principal_id: String,
    pub role: String,
    pub scope: String,
}

impl RoleAssignment {
    pub fn new(
        principal_id: impl Into<String>,
        role: impl Into<String>,
        scope: impl Into<String>,
    ) -> Self {
        Self {
            principal_id: principal_id.into(),
            role: role.into(),
            scope: scope.into(),
        }
    }

    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new("role_assignment", format!("{}:{}", self.role, self.principal_id))
    }
}

/// Virtual network created together with its single subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualNetworkSpec {
    pub resource_group: String,
    pub name: String,
    pub address_prefix: String,
    pub subnet_name: String,
    pub subnet_prefix: String,
}

/// Delegation and NSG attachment applied to an existing subnet
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubnetUpdate {
    pub resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub delegation: String,
    pub network_security_group: String,
}

/// Declarative template deployment against a resource group
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateDeployment {
    pub resource_group: String,
    /// Template document (ARM JSON)
    pub template: serde_json::Value,
    /// Deployment parameters, passed as `name=value`
    pub parameters: Vec<(String, String)>,
}

/// Arbitrary-typed resource described by a JSON property bag
#[derive(Debug, Clone, PartialEq)]
pub struct GenericResource {
    pub resource_group: String,
    pub name: String,
    pub resource_type: String,
    pub api_version: String,
    /// Full object: location, properties, tags
    pub body: serde_json::Value,
}

impl GenericResource {
    pub fn resource_id(&self) -> ResourceId {
        ResourceId::new(&self.resource_type, &self.name)
    }
}

/// Output fields queried from the created network settings resource
#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct NetworkSettingsOutput {
    #[serde(rename = "GitHubId", default)]
    pub github_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn subnet_id_format() {
        assert_eq!(
            subnet_resource_id("sub-1", "rg", "vnet", "snet"),
            "/subscriptions/sub-1/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet/subnets/snet"
        );
    }

    #[test]
    fn role_definition_reads_pascal_case() {
        let json = r#"{
            "Name": "Runner Network Role",
            "IsCustom": true,
            "Actions": ["Microsoft.Network/virtualNetworks/read"],
            "AssignableScopes": ["/subscriptions/abc"]
        }"#;
        let role: RoleDefinition = serde_json::from_str(json).unwrap();
        assert_eq!(role.name, "Runner Network Role");
        assert!(role.is_custom);
        assert_eq!(role.assignable_scopes, vec!["/subscriptions/abc"]);
        assert!(role.not_actions.is_empty());
    }

    #[test]
    fn resource_id_display() {
        let id = ResourceId::new("resource_group", "runners-rg");
        assert_eq!(id.to_string(), "resource_group.runners-rg");
    }

    #[test]
    fn network_settings_output_tolerates_missing_tag() {
        let out: NetworkSettingsOutput =
            serde_json::from_str(r#"{"GitHubId": null, "name": "ns"}"#).unwrap();
        assert_eq!(out.github_id, None);
        assert_eq!(out.name.as_deref(), Some("ns"));
    }
}
