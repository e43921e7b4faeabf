//! In-memory ControlPlane
//!
//! Mirrors the control plane's create/lookup/delete rules closely enough to
//! exercise the sequencer without a cloud account. Every call is recorded in
//! order, and any operation can be made to fail.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::json;

use crate::config::AuthMethod;
use crate::control_plane::{ControlPlane, ControlPlaneError, ControlPlaneResult};
use crate::resource::{
    GenericResource, RoleAssignment, RoleDefinition, SubnetUpdate, TemplateDeployment,
    VirtualNetworkSpec,
};
use crate::template::MaterializedRole;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceGroupState {
    pub location: String,
    pub network_security_groups: BTreeSet<String>,
    pub virtual_networks: BTreeMap<String, VirtualNetworkState>,
    /// Generic resources keyed by (type, name)
    pub resources: BTreeMap<(String, String), serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualNetworkState {
    pub address_prefix: String,
    pub subnet_name: String,
    pub subnet_prefix: String,
    pub delegation: Option<String>,
    pub network_security_group: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    logged_in: bool,
    subscription: Option<String>,
    providers: BTreeSet<String>,
    role_definitions: BTreeMap<String, RoleDefinition>,
    role_assignments: Vec<RoleAssignment>,
    resource_groups: BTreeMap<String, ResourceGroupState>,
    calls: Vec<String>,
    failures: HashMap<String, String>,
}

impl MemoryState {
    fn group_mut(&mut self, name: &str) -> ControlPlaneResult<&mut ResourceGroupState> {
        self.resource_groups.get_mut(name).ok_or_else(|| {
            ControlPlaneError::NotFound(format!(
                "(ResourceGroupNotFound) Resource group '{}' could not be found.",
                name
            ))
        })
    }
}

/// Cloneable handle to a shared in-memory control plane
#[derive(Debug, Clone, Default)]
pub struct MemoryControlPlane {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record the call and return the state, or the injected failure
    fn enter(&self, operation: &str) -> ControlPlaneResult<MutexGuard<'_, MemoryState>> {
        let mut state = self.lock();
        state.calls.push(operation.to_string());
        if let Some(message) = state.failures.get(operation).cloned() {
            return Err(ControlPlaneError::command(message));
        }
        Ok(state)
    }

    /// Make every later call of `operation` fail with `message`
    pub fn fail_on(&self, operation: &str, message: &str) {
        self.lock()
            .failures
            .insert(operation.to_string(), message.to_string());
    }

    /// Operation names in call order
    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, operation: &str) -> usize {
        self.lock().calls.iter().filter(|c| *c == operation).count()
    }

    pub fn subscription(&self) -> Option<String> {
        self.lock().subscription.clone()
    }

    pub fn providers(&self) -> Vec<String> {
        self.lock().providers.iter().cloned().collect()
    }

    pub fn role_definitions(&self) -> Vec<RoleDefinition> {
        self.lock().role_definitions.values().cloned().collect()
    }

    pub fn role_assignments(&self) -> Vec<RoleAssignment> {
        self.lock().role_assignments.clone()
    }

    pub fn resource_group(&self, name: &str) -> Option<ResourceGroupState> {
        self.lock().resource_groups.get(name).cloned()
    }
}

#[async_trait]
impl ControlPlane for MemoryControlPlane {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn login(&self, _auth: &AuthMethod) -> ControlPlaneResult<()> {
        let mut state = self.enter("login")?;
        state.logged_in = true;
        Ok(())
    }

    async fn set_subscription(&self, subscription_id: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter("set_subscription")?;
        if !state.logged_in {
            return Err(ControlPlaneError::Authentication(
                "Please run 'az login' to setup account.".to_string(),
            ));
        }
        state.subscription = Some(subscription_id.to_string());
        Ok(())
    }

    async fn register_provider(&self, namespace: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter("register_provider")?;
        state.providers.insert(namespace.to_string());
        Ok(())
    }

    async fn list_role_definitions(&self, name: &str) -> ControlPlaneResult<Vec<RoleDefinition>> {
        let state = self.enter("list_role_definitions")?;
        Ok(state.role_definitions.get(name).cloned().into_iter().collect())
    }

    async fn create_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        let mut state = self.enter("create_role_definition")?;
        if state.role_definitions.contains_key(role.name()) {
            return Err(ControlPlaneError::command(format!(
                "(RoleDefinitionWithSameNameExists) A custom role with the same name '{}' already exists in this directory.",
                role.name()
            )));
        }
        state
            .role_definitions
            .insert(role.name().to_string(), role.definition().clone());
        Ok(())
    }

    async fn update_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        let mut state = self.enter("update_role_definition")?;
        match state.role_definitions.get_mut(role.name()) {
            Some(existing) => {
                *existing = role.definition().clone();
                Ok(())
            }
            None => Err(ControlPlaneError::NotFound(format!(
                "Role definition '{}' doesn't exist.",
                role.name()
            ))),
        }
    }

    async fn delete_role_definition(&self, name: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter("delete_role_definition")?;
        match state.role_definitions.remove(name) {
            Some(_) => Ok(()),
            None => Err(ControlPlaneError::NotFound(format!(
                "Role definition '{}' doesn't exist.",
                name
            ))),
        }
    }

    async fn list_role_assignments(
        &self,
        assignment: &RoleAssignment,
    ) -> ControlPlaneResult<Vec<RoleAssignment>> {
        let state = self.enter("list_role_assignments")?;
        Ok(state
            .role_assignments
            .iter()
            .filter(|a| *a == assignment)
            .cloned()
            .collect())
    }

    async fn create_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        let mut state = self.enter("create_role_assignment")?;
        if !state.role_definitions.contains_key(&assignment.role) {
            return Err(ControlPlaneError::NotFound(format!(
                "Role '{}' doesn't exist.",
                assignment.role
            )));
        }
        if state.role_assignments.contains(assignment) {
            return Err(ControlPlaneError::command(
                "(RoleAssignmentExists) The role assignment already exists.",
            ));
        }
        state.role_assignments.push(assignment.clone());
        Ok(())
    }

    async fn delete_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        let mut state = self.enter("delete_role_assignment")?;
        let before = state.role_assignments.len();
        state.role_assignments.retain(|a| a != assignment);
        if state.role_assignments.len() == before {
            return Err(ControlPlaneError::NotFound(
                "No matched assignments were found to delete".to_string(),
            ));
        }
        Ok(())
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter("create_resource_group")?;
        state
            .resource_groups
            .entry(name.to_string())
            .or_default()
            .location = location.to_string();
        Ok(())
    }

    async fn delete_resource_group(&self, name: &str) -> ControlPlaneResult<()> {
        let mut state = self.enter("delete_resource_group")?;
        state.group_mut(name)?;
        state.resource_groups.remove(name);
        Ok(())
    }

    async fn deploy_template(&self, deployment: &TemplateDeployment) -> ControlPlaneResult<()> {
        let mut state = self.enter("deploy_template")?;
        let group = state.group_mut(&deployment.resource_group)?;
        if let Some((_, nsg_name)) = deployment.parameters.iter().find(|(k, _)| k == "nsgName") {
            group.network_security_groups.insert(nsg_name.clone());
        }
        Ok(())
    }

    async fn create_virtual_network(&self, spec: &VirtualNetworkSpec) -> ControlPlaneResult<()> {
        let mut state = self.enter("create_virtual_network")?;
        let group = state.group_mut(&spec.resource_group)?;
        group.virtual_networks.insert(
            spec.name.clone(),
            VirtualNetworkState {
                address_prefix: spec.address_prefix.clone(),
                subnet_name: spec.subnet_name.clone(),
                subnet_prefix: spec.subnet_prefix.clone(),
                delegation: None,
                network_security_group: None,
            },
        );
        Ok(())
    }

    async fn update_subnet(&self, update: &SubnetUpdate) -> ControlPlaneResult<()> {
        let mut state = self.enter("update_subnet")?;
        let group = state.group_mut(&update.resource_group)?;
        if !group
            .network_security_groups
            .contains(&update.network_security_group)
        {
            return Err(ControlPlaneError::NotFound(format!(
                "(ResourceNotFound) The Resource 'Microsoft.Network/networkSecurityGroups/{}' was not found.",
                update.network_security_group
            )));
        }
        let subnet = group
            .virtual_networks
            .get_mut(&update.vnet_name)
            .filter(|vnet| vnet.subnet_name == update.subnet_name)
            .ok_or_else(|| {
                ControlPlaneError::NotFound(format!(
                    "(ResourceNotFound) Subnet '{}' in virtual network '{}' was not found.",
                    update.subnet_name, update.vnet_name
                ))
            })?;
        subnet.delegation = Some(update.delegation.clone());
        subnet.network_security_group = Some(update.network_security_group.clone());
        Ok(())
    }

    async fn create_resource(
        &self,
        resource: &GenericResource,
        query: Option<&str>,
    ) -> ControlPlaneResult<serde_json::Value> {
        let mut state = self.enter("create_resource")?;
        let group = state.group_mut(&resource.resource_group)?;
        group.resources.insert(
            (resource.resource_type.clone(), resource.name.clone()),
            resource.body.clone(),
        );

        Ok(match query {
            Some(_) => json!({
                "GitHubId": format!("memory-{}", resource.name),
                "name": resource.name,
            }),
            None => resource.body.clone(),
        })
    }

    async fn delete_resource(&self, resource: &GenericResource) -> ControlPlaneResult<()> {
        let mut state = self.enter("delete_resource")?;
        let group = state.group_mut(&resource.resource_group)?;
        let key = (resource.resource_type.clone(), resource.name.clone());
        match group.resources.remove(&key) {
            Some(_) => Ok(()),
            None => Err(ControlPlaneError::NotFound(format!(
                "(ResourceNotFound) The Resource '{}/{}' under resource group '{}' was not found.",
                resource.resource_type, resource.name, resource.resource_group
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscription_requires_login() {
        let client = MemoryControlPlane::new();
        let err = client.set_subscription("s").await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Authentication(_)));

        client.login(&AuthMethod::ExistingSession).await.unwrap();
        client.set_subscription("s").await.unwrap();
        assert_eq!(client.subscription().as_deref(), Some("s"));
    }

    #[tokio::test]
    async fn children_require_resource_group() {
        let client = MemoryControlPlane::new();
        let spec = VirtualNetworkSpec {
            resource_group: "rg".into(),
            name: "vnet".into(),
            address_prefix: "10.0.0.0/16".into(),
            subnet_name: "snet".into(),
            subnet_prefix: "10.0.0.0/24".into(),
        };

        let err = client.create_virtual_network(&spec).await.unwrap_err();
        assert!(err.is_not_found());

        client.create_resource_group("rg", "eastus").await.unwrap();
        client.create_virtual_network(&spec).await.unwrap();
        assert!(
            client
                .resource_group("rg")
                .unwrap()
                .virtual_networks
                .contains_key("vnet")
        );
    }

    #[tokio::test]
    async fn injected_failure_is_recorded() {
        let client = MemoryControlPlane::new();
        client.fail_on("register_provider", "(Forbidden) nope");

        let err = client.register_provider("GitHub.Network").await.unwrap_err();
        assert_eq!(err.to_string(), "(Forbidden) nope");
        assert_eq!(client.calls(), vec!["register_provider".to_string()]);
        assert!(client.providers().is_empty());
    }
}
