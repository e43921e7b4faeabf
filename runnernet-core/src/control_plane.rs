//! ControlPlane - Trait abstracting the cloud control-plane client
//!
//! The sequencer never mutates anything itself. Every side effect is a call
//! on a ControlPlane implementation (Azure CLI, in-memory, ...).

use async_trait::async_trait;
use thiserror::Error;

use crate::config::AuthMethod;
use crate::resource::{
    GenericResource, ResourceId, RoleAssignment, RoleDefinition, SubnetUpdate, TemplateDeployment,
    VirtualNetworkSpec,
};
use crate::template::MaterializedRole;

/// Errors surfaced by a control-plane client
///
/// Messages carry the client's own error text unchanged.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// The addressed object does not exist
    #[error("{0}")]
    NotFound(String),

    /// Login or subscription selection failed
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The client reported a failure
    #[error("{message}")]
    Command {
        message: String,
        resource_id: Option<ResourceId>,
    },

    /// The client could not be invoked at all
    #[error("I/O error: {0}")]
    Io(String),

    /// Client output could not be decoded
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl ControlPlaneError {
    pub fn command(message: impl Into<String>) -> Self {
        Self::Command {
            message: message.into(),
            resource_id: None,
        }
    }

    pub fn for_resource(self, id: ResourceId) -> Self {
        match self {
            Self::Command { message, .. } => Self::Command {
                message,
                resource_id: Some(id),
            },
            other => other,
        }
    }

    /// True for the one error kind the removal path tolerates
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

/// Operations the provisioning and cleanup paths require from the control plane
///
/// All calls are awaited one at a time; implementations need not support
/// concurrent use.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Name of this client (e.g., "az")
    fn name(&self) -> &'static str;

    /// Authenticate against the control plane
    async fn login(&self, auth: &AuthMethod) -> ControlPlaneResult<()>;

    /// Make the given subscription the active context
    async fn set_subscription(&self, subscription_id: &str) -> ControlPlaneResult<()>;

    /// Register a resource provider namespace for the active subscription
    async fn register_provider(&self, namespace: &str) -> ControlPlaneResult<()>;

    /// List custom role definitions with exactly this name
    async fn list_role_definitions(&self, name: &str) -> ControlPlaneResult<Vec<RoleDefinition>>;

    /// Create a role definition from a materialized template
    async fn create_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()>;

    /// Update an existing role definition in place
    async fn update_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()>;

    /// Delete a custom role definition by name
    async fn delete_role_definition(&self, name: &str) -> ControlPlaneResult<()>;

    /// List assignments matching the (principal, role, scope) triple
    async fn list_role_assignments(
        &self,
        assignment: &RoleAssignment,
    ) -> ControlPlaneResult<Vec<RoleAssignment>>;

    async fn create_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()>;

    async fn delete_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()>;

    async fn create_resource_group(&self, name: &str, location: &str) -> ControlPlaneResult<()>;

    /// Delete a resource group and everything in it
    async fn delete_resource_group(&self, name: &str) -> ControlPlaneResult<()>;

    /// Run a declarative template deployment against a resource group
    async fn deploy_template(&self, deployment: &TemplateDeployment) -> ControlPlaneResult<()>;

    /// Create a virtual network with one named subnet
    async fn create_virtual_network(&self, spec: &VirtualNetworkSpec) -> ControlPlaneResult<()>;

    /// Set a subnet's delegation and attached security group
    async fn update_subnet(&self, update: &SubnetUpdate) -> ControlPlaneResult<()>;

    /// Create an arbitrary-typed resource and return the fields selected by `query`
    async fn create_resource(
        &self,
        resource: &GenericResource,
        query: Option<&str>,
    ) -> ControlPlaneResult<serde_json::Value>;

    async fn delete_resource(&self, resource: &GenericResource) -> ControlPlaneResult<()>;
}

/// ControlPlane implementation for Box<dyn ControlPlane>
/// This enables dynamic dispatch for clients
#[async_trait]
impl ControlPlane for Box<dyn ControlPlane> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn login(&self, auth: &AuthMethod) -> ControlPlaneResult<()> {
        (**self).login(auth).await
    }

    async fn set_subscription(&self, subscription_id: &str) -> ControlPlaneResult<()> {
        (**self).set_subscription(subscription_id).await
    }

    async fn register_provider(&self, namespace: &str) -> ControlPlaneResult<()> {
        (**self).register_provider(namespace).await
    }

    async fn list_role_definitions(&self, name: &str) -> ControlPlaneResult<Vec<RoleDefinition>> {
        (**self).list_role_definitions(name).await
    }

    async fn create_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        (**self).create_role_definition(role).await
    }

    async fn update_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        (**self).update_role_definition(role).await
    }

    async fn delete_role_definition(&self, name: &str) -> ControlPlaneResult<()> {
        (**self).delete_role_definition(name).await
    }

    async fn list_role_assignments(
        &self,
        assignment: &RoleAssignment,
    ) -> ControlPlaneResult<Vec<RoleAssignment>> {
        (**self).list_role_assignments(assignment).await
    }

    async fn create_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        (**self).create_role_assignment(assignment).await
    }

    async fn delete_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        (**self).delete_role_assignment(assignment).await
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> ControlPlaneResult<()> {
        (**self).create_resource_group(name, location).await
    }

    async fn delete_resource_group(&self, name: &str) -> ControlPlaneResult<()> {
        (**self).delete_resource_group(name).await
    }

    async fn deploy_template(&self, deployment: &TemplateDeployment) -> ControlPlaneResult<()> {
        (**self).deploy_template(deployment).await
    }

    async fn create_virtual_network(&self, spec: &VirtualNetworkSpec) -> ControlPlaneResult<()> {
        (**self).create_virtual_network(spec).await
    }

    async fn update_subnet(&self, update: &SubnetUpdate) -> ControlPlaneResult<()> {
        (**self).update_subnet(update).await
    }

    async fn create_resource(
        &self,
        resource: &GenericResource,
        query: Option<&str>,
    ) -> ControlPlaneResult<serde_json::Value> {
        (**self).create_resource(resource, query).await
    }

    async fn delete_resource(&self, resource: &GenericResource) -> ControlPlaneResult<()> {
        (**self).delete_resource(resource).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_the_only_tolerated_kind() {
        assert!(ControlPlaneError::NotFound("gone".into()).is_not_found());
        assert!(!ControlPlaneError::command("boom").is_not_found());
        assert!(!ControlPlaneError::Authentication("expired".into()).is_not_found());
    }

    #[test]
    fn command_error_keeps_client_text() {
        let err = ControlPlaneError::command("(AuthorizationFailed) no access")
            .for_resource(ResourceId::new("resource_group", "rg"));
        assert_eq!(err.to_string(), "(AuthorizationFailed) no access");
        match err {
            ControlPlaneError::Command { resource_id, .. } => {
                assert_eq!(resource_id, Some(ResourceId::new("resource_group", "rg")));
            }
            _ => panic!("Expected Command error"),
        }
    }
}
