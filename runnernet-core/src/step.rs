//! Step - One outbound control-plane operation, held as a value
//!
//! Nothing happens when a Step is built. The sequencer turns each Step into
//! calls against a ControlPlane.

use std::fmt;

use crate::resource::{
    GenericResource, ResourceId, RoleAssignment, SubnetUpdate, TemplateDeployment,
    VirtualNetworkSpec,
};
use crate::template::RoleTemplate;

#[derive(Debug, Clone)]
pub enum Step {
    /// Authenticate against the control plane
    Login,
    /// Select the active subscription
    SetSubscription(String),
    /// Register a resource provider namespace
    RegisterProvider(String),
    /// Create or update the custom role from its template
    EnsureRoleDefinition {
        template: RoleTemplate,
        role_name: String,
        subscription_id: String,
    },
    /// Create the assignment unless the triple already exists
    EnsureRoleAssignment(RoleAssignment),
    CreateResourceGroup {
        name: String,
        location: String,
    },
    DeployNetworkSecurityGroup {
        nsg_name: String,
        deployment: TemplateDeployment,
    },
    CreateVirtualNetwork(VirtualNetworkSpec),
    DelegateSubnet(SubnetUpdate),
    CreateNetworkSettings {
        resource: GenericResource,
        query: String,
    },
    DeleteNetworkSettings(GenericResource),
    RemoveRoleAssignment(RoleAssignment),
    DeleteRoleDefinition(String),
    DeleteResourceGroup(String),
}

impl Step {
    /// Removal steps treat "not found" as already done
    pub fn is_removal(&self) -> bool {
        matches!(
            self,
            Step::DeleteNetworkSettings(_)
                | Step::RemoveRoleAssignment(_)
                | Step::DeleteRoleDefinition(_)
                | Step::DeleteResourceGroup(_)
        )
    }

    /// The resource a step acts on, if any
    pub fn resource_id(&self) -> Option<ResourceId> {
        match self {
            Step::Login => None,
            Step::SetSubscription(id) => Some(ResourceId::new("subscription", id)),
            Step::RegisterProvider(ns) => Some(ResourceId::new("provider", ns)),
            Step::EnsureRoleDefinition { role_name, .. }
            | Step::DeleteRoleDefinition(role_name) => {
                Some(ResourceId::new("role_definition", role_name))
            }
            Step::EnsureRoleAssignment(a) | Step::RemoveRoleAssignment(a) => Some(a.resource_id()),
            Step::CreateResourceGroup { name, .. } | Step::DeleteResourceGroup(name) => {
                Some(ResourceId::new("resource_group", name))
            }
            Step::DeployNetworkSecurityGroup { nsg_name, .. } => {
                Some(ResourceId::new("network_security_group", nsg_name))
            }
            Step::CreateVirtualNetwork(spec) => {
                Some(ResourceId::new("virtual_network", &spec.name))
            }
            Step::DelegateSubnet(update) => Some(ResourceId::new("subnet", &update.subnet_name)),
            Step::CreateNetworkSettings { resource, .. }
            | Step::DeleteNetworkSettings(resource) => Some(resource.resource_id()),
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::Login => write!(f, "Log in"),
            Step::SetSubscription(id) => write!(f, "Set subscription {}", id),
            Step::RegisterProvider(ns) => write!(f, "Register provider {}", ns),
            Step::EnsureRoleDefinition { role_name, .. } => {
                write!(f, "Create or update role '{}'", role_name)
            }
            Step::EnsureRoleAssignment(a) => {
                write!(f, "Assign role '{}' to {}", a.role, a.principal_id)
            }
            Step::CreateResourceGroup { name, location } => {
                write!(f, "Create resource group {} in {}", name, location)
            }
            Step::DeployNetworkSecurityGroup { nsg_name, .. } => {
                write!(f, "Deploy network security group {}", nsg_name)
            }
            Step::CreateVirtualNetwork(spec) => write!(
                f,
                "Create virtual network {} ({}) with subnet {} ({})",
                spec.name, spec.address_prefix, spec.subnet_name, spec.subnet_prefix
            ),
            Step::DelegateSubnet(update) => write!(
                f,
                "Delegate subnet {} to {} and attach {}",
                update.subnet_name, update.delegation, update.network_security_group
            ),
            Step::CreateNetworkSettings { resource, .. } => {
                write!(f, "Create network settings {}", resource.name)
            }
            Step::DeleteNetworkSettings(resource) => {
                write!(f, "Delete network settings {}", resource.name)
            }
            Step::RemoveRoleAssignment(a) => {
                write!(f, "Remove role '{}' from {}", a.role, a.principal_id)
            }
            Step::DeleteRoleDefinition(name) => write!(f, "Delete role '{}'", name),
            Step::DeleteResourceGroup(name) => write!(f, "Delete resource group {}", name),
        }
    }
}
