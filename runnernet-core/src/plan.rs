//! Plan - Ordered list of Steps
//!
//! A Plan fixes the dependency order of a run. No side effects occur until
//! the Plan is handed to a Sequencer.

use serde_json::json;

use crate::config::{ProvisionConfig, SERVICE_PRINCIPALS};
use crate::resource::{
    GenericResource, NETWORK_SETTINGS_TYPE, RoleAssignment, SubnetUpdate, VirtualNetworkSpec,
    subnet_resource_id, subscription_scope,
};
use crate::step::Step;
use crate::template::{NsgTemplate, RoleTemplate};

/// Fields selected from the created network settings resource
pub const NETWORK_SETTINGS_QUERY: &str = "{GitHubId:tags.GitHubId, name:name}";

/// Plan containing Steps to be executed in order
#[derive(Debug, Clone, Default)]
pub struct Plan {
    steps: Vec<Step>,
}

impl Plan {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Full provisioning run, in dependency order
    pub fn provision(
        config: &ProvisionConfig,
        role_template: &RoleTemplate,
        nsg_template: &NsgTemplate,
    ) -> Result<Self, crate::template::TemplateError> {
        let role_name = role_template.role_name()?;
        let scope = subscription_scope(&config.subscription_id);
        let mut plan = Self::new();

        plan.add(Step::Login);
        plan.add(Step::SetSubscription(config.subscription_id.clone()));
        plan.add(Step::RegisterProvider(config.provider_namespace.clone()));
        plan.add(Step::EnsureRoleDefinition {
            template: role_template.clone(),
            role_name: role_name.clone(),
            subscription_id: config.subscription_id.clone(),
        });
        for principal in SERVICE_PRINCIPALS {
            plan.add(Step::EnsureRoleAssignment(RoleAssignment::new(
                principal, &role_name, &scope,
            )));
        }
        plan.add(Step::CreateResourceGroup {
            name: config.resource_group.clone(),
            location: config.location.clone(),
        });
        plan.add(Step::DeployNetworkSecurityGroup {
            nsg_name: config.nsg_name.clone(),
            deployment: nsg_template.deployment(config),
        });
        plan.add(Step::CreateVirtualNetwork(VirtualNetworkSpec {
            resource_group: config.resource_group.clone(),
            name: config.vnet_name.clone(),
            address_prefix: config.address_prefix.clone(),
            subnet_name: config.subnet_name.clone(),
            subnet_prefix: config.subnet_prefix.clone(),
        }));
        plan.add(Step::DelegateSubnet(SubnetUpdate {
            resource_group: config.resource_group.clone(),
            vnet_name: config.vnet_name.clone(),
            subnet_name: config.subnet_name.clone(),
            delegation: NETWORK_SETTINGS_TYPE.to_string(),
            network_security_group: config.nsg_name.clone(),
        }));
        plan.add(Step::CreateNetworkSettings {
            resource: network_settings(config),
            query: NETWORK_SETTINGS_QUERY.to_string(),
        });

        Ok(plan)
    }

    /// Removals reversing every creation step of [`Plan::provision`]
    ///
    /// Deleting the resource group also removes the vnet, subnet and NSG.
    pub fn cleanup(config: &ProvisionConfig, role_name: &str) -> Self {
        let scope = subscription_scope(&config.subscription_id);
        let mut plan = Self::new();

        plan.add(Step::Login);
        plan.add(Step::SetSubscription(config.subscription_id.clone()));
        plan.add(Step::DeleteNetworkSettings(network_settings(config)));
        for principal in SERVICE_PRINCIPALS {
            plan.add(Step::RemoveRoleAssignment(RoleAssignment::new(
                principal, role_name, &scope,
            )));
        }
        plan.add(Step::DeleteRoleDefinition(role_name.to_string()));
        plan.add(Step::DeleteResourceGroup(config.resource_group.clone()));

        plan
    }

    /// Number of Steps that change remote state
    pub fn mutation_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| !matches!(s, Step::Login | Step::SetSubscription(_)))
            .count()
    }
}

/// The network settings resource linking the subnet to the business id
pub fn network_settings(config: &ProvisionConfig) -> GenericResource {
    let subnet_id = subnet_resource_id(
        &config.subscription_id,
        &config.resource_group,
        &config.vnet_name,
        &config.subnet_name,
    );

    GenericResource {
        resource_group: config.resource_group.clone(),
        name: config.network_settings_name.clone(),
        resource_type: NETWORK_SETTINGS_TYPE.to_string(),
        api_version: config.api_version.clone(),
        body: json!({
            "location": config.location,
            "properties": {
                "subnetId": subnet_id,
                "businessId": config.database_id.to_string(),
            }
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;

    fn provision_plan() -> Plan {
        Plan::provision(
            &sample_config(),
            &RoleTemplate::builtin(),
            &NsgTemplate::builtin().unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn empty_plan() {
        let plan = Plan::new();
        assert!(plan.is_empty());
        assert_eq!(plan.mutation_count(), 0);
    }

    #[test]
    fn provision_order() {
        let plan = provision_plan();
        let kinds: Vec<&str> = plan
            .steps()
            .iter()
            .map(|s| match s {
                Step::Login => "login",
                Step::SetSubscription(_) => "subscription",
                Step::RegisterProvider(_) => "provider",
                Step::EnsureRoleDefinition { .. } => "role",
                Step::EnsureRoleAssignment(_) => "assignment",
                Step::CreateResourceGroup { .. } => "group",
                Step::DeployNetworkSecurityGroup { .. } => "nsg",
                Step::CreateVirtualNetwork(_) => "vnet",
                Step::DelegateSubnet(_) => "delegation",
                Step::CreateNetworkSettings { .. } => "settings",
                _ => "other",
            })
            .collect();

        assert_eq!(
            kinds,
            vec![
                "login",
                "subscription",
                "provider",
                "role",
                "assignment",
                "assignment",
                "group",
                "nsg",
                "vnet",
                "delegation",
                "settings"
            ]
        );
        assert_eq!(plan.mutation_count(), 9);
    }

    #[test]
    fn assignments_target_both_principals_at_subscription_scope() {
        let plan = provision_plan();
        let assignments: Vec<&RoleAssignment> = plan
            .steps()
            .iter()
            .filter_map(|s| match s {
                Step::EnsureRoleAssignment(a) => Some(a),
                _ => None,
            })
            .collect();

        assert_eq!(assignments.len(), 2);
        for (assignment, principal) in assignments.iter().zip(SERVICE_PRINCIPALS) {
            assert_eq!(assignment.principal_id, principal);
            assert_eq!(assignment.role, "GitHub Actions Network Role");
            assert_eq!(
                assignment.scope,
                "/subscriptions/00000000-1111-2222-3333-444444444444"
            );
        }
    }

    #[test]
    fn network_settings_body() {
        let resource = network_settings(&sample_config());
        assert_eq!(resource.resource_type, "GitHub.Network/networkSettings");
        assert_eq!(resource.api_version, "2024-04-02");
        assert_eq!(resource.body["location"], "eastus");
        assert_eq!(resource.body["properties"]["businessId"], "123456");
        assert!(
            resource.body["properties"]["subnetId"]
                .as_str()
                .unwrap()
                .ends_with("/virtualNetworks/runners-vnet/subnets/runners-subnet")
        );
    }

    #[test]
    fn cleanup_reverses_creation() {
        let plan = Plan::cleanup(&sample_config(), "GitHub Actions Network Role");
        let removals: Vec<String> = plan
            .steps()
            .iter()
            .filter(|s| s.is_removal())
            .map(|s| s.to_string())
            .collect();

        assert_eq!(
            removals,
            vec![
                "Delete network settings runners-ns".to_string(),
                format!(
                    "Remove role 'GitHub Actions Network Role' from {}",
                    SERVICE_PRINCIPALS[0]
                ),
                format!(
                    "Remove role 'GitHub Actions Network Role' from {}",
                    SERVICE_PRINCIPALS[1]
                ),
                "Delete role 'GitHub Actions Network Role'".to_string(),
                "Delete resource group runners-rg".to_string(),
            ]
        );
    }
}
