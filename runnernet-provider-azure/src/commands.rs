//! Argument lists for every `az` invocation
//!
//! Pure functions, so the exact command lines are testable without a
//! subscription. `--output json` is appended by the control plane, not here.

use std::path::Path;

use runnernet_core::config::AuthMethod;
use runnernet_core::plan::Plan;
use runnernet_core::resource::{GenericResource, RoleAssignment, SubnetUpdate, VirtualNetworkSpec};
use runnernet_core::step::Step;

fn args<const N: usize>(parts: [&str; N]) -> Vec<String> {
    parts.iter().map(|s| s.to_string()).collect()
}

fn path_arg(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

pub fn login(auth: &AuthMethod) -> Vec<String> {
    match auth {
        AuthMethod::Interactive => args(["login"]),
        AuthMethod::ExistingSession => args(["account", "show"]),
        AuthMethod::ManagedIdentity => args(["login", "--identity"]),
        AuthMethod::ServicePrincipal {
            client_id,
            client_secret,
            tenant_id,
        } => args([
            "login",
            "--service-principal",
            "--username",
            client_id.as_str(),
            "--password",
            client_secret.as_str(),
            "--tenant",
            tenant_id.as_str(),
        ]),
    }
}

pub fn set_subscription(subscription_id: &str) -> Vec<String> {
    args(["account", "set", "--subscription", subscription_id])
}

pub fn register_provider(namespace: &str) -> Vec<String> {
    args(["provider", "register", "--namespace", namespace])
}

pub fn list_role_definitions(name: &str) -> Vec<String> {
    args([
        "role",
        "definition",
        "list",
        "--name",
        name,
        "--custom-role-only",
        "true",
    ])
}

pub fn create_role_definition(definition_file: &Path) -> Vec<String> {
    let file = path_arg(definition_file);
    args(["role", "definition", "create", "--role-definition", file.as_str()])
}

pub fn update_role_definition(definition_file: &Path) -> Vec<String> {
    let file = path_arg(definition_file);
    args(["role", "definition", "update", "--role-definition", file.as_str()])
}

pub fn delete_role_definition(name: &str) -> Vec<String> {
    args([
        "role",
        "definition",
        "delete",
        "--name",
        name,
        "--custom-role-only",
        "true",
    ])
}

fn role_assignment(verb: &str, assignment: &RoleAssignment) -> Vec<String> {
    args([
        "role",
        "assignment",
        verb,
        "--assignee",
        assignment.principal_id.as_str(),
        "--role",
        assignment.role.as_str(),
        "--scope",
        assignment.scope.as_str(),
    ])
}

pub fn list_role_assignments(assignment: &RoleAssignment) -> Vec<String> {
    role_assignment("list", assignment)
}

pub fn create_role_assignment(assignment: &RoleAssignment) -> Vec<String> {
    role_assignment("create", assignment)
}

pub fn delete_role_assignment(assignment: &RoleAssignment) -> Vec<String> {
    role_assignment("delete", assignment)
}

pub fn create_resource_group(name: &str, location: &str) -> Vec<String> {
    args(["group", "create", "--name", name, "--location", location])
}

pub fn delete_resource_group(name: &str) -> Vec<String> {
    args(["group", "delete", "--name", name, "--yes"])
}

pub fn deploy_template(
    resource_group: &str,
    template_file: &Path,
    parameters: &[(String, String)],
) -> Vec<String> {
    let file = path_arg(template_file);
    let mut out = args([
        "deployment",
        "group",
        "create",
        "--resource-group",
        resource_group,
        "--template-file",
        file.as_str(),
    ]);
    if !parameters.is_empty() {
        out.push("--parameters".to_string());
        out.extend(parameters.iter().map(|(k, v)| format!("{}={}", k, v)));
    }
    out
}

pub fn create_virtual_network(spec: &VirtualNetworkSpec) -> Vec<String> {
    args([
        "network",
        "vnet",
        "create",
        "--resource-group",
        spec.resource_group.as_str(),
        "--name",
        spec.name.as_str(),
        "--address-prefix",
        spec.address_prefix.as_str(),
        "--subnet-name",
        spec.subnet_name.as_str(),
        "--subnet-prefixes",
        spec.subnet_prefix.as_str(),
    ])
}

pub fn update_subnet(update: &SubnetUpdate) -> Vec<String> {
    args([
        "network",
        "vnet",
        "subnet",
        "update",
        "--resource-group",
        update.resource_group.as_str(),
        "--vnet-name",
        update.vnet_name.as_str(),
        "--name",
        update.subnet_name.as_str(),
        "--delegations",
        update.delegation.as_str(),
        "--network-security-group",
        update.network_security_group.as_str(),
    ])
}

pub fn create_resource(resource: &GenericResource, query: Option<&str>) -> Vec<String> {
    let body = resource.body.to_string();
    let mut out = args([
        "resource",
        "create",
        "--resource-group",
        resource.resource_group.as_str(),
        "--name",
        resource.name.as_str(),
        "--resource-type",
        resource.resource_type.as_str(),
        "--properties",
        body.as_str(),
        "--is-full-object",
        "--api-version",
        resource.api_version.as_str(),
    ]);
    if let Some(query) = query {
        out.push("--query".to_string());
        out.push(query.to_string());
    }
    out
}

pub fn delete_resource(resource: &GenericResource) -> Vec<String> {
    args([
        "resource",
        "delete",
        "--resource-group",
        resource.resource_group.as_str(),
        "--name",
        resource.name.as_str(),
        "--resource-type",
        resource.resource_type.as_str(),
        "--api-version",
        resource.api_version.as_str(),
    ])
}

/// Copy of `args` with secret values masked, for logging
pub fn redact(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut mask_next = false;
    for arg in args {
        if mask_next {
            out.push("***".to_string());
            mask_next = false;
        } else {
            mask_next = arg == "--password";
            out.push(arg.clone());
        }
    }
    out
}

/// Shell-ready `az ...` line
pub fn render(args: &[String]) -> String {
    let mut words = vec!["az".to_string()];
    words.extend(redact(args));
    shell_words::join(words)
}

/// Command line that performs a cleanup Step, if it maps to one
fn cleanup_args(step: &Step) -> Option<Vec<String>> {
    match step {
        Step::SetSubscription(id) => Some(set_subscription(id)),
        Step::DeleteNetworkSettings(resource) => Some(delete_resource(resource)),
        Step::RemoveRoleAssignment(assignment) => Some(delete_role_assignment(assignment)),
        Step::DeleteRoleDefinition(name) => Some(delete_role_definition(name)),
        Step::DeleteResourceGroup(name) => Some(delete_resource_group(name)),
        _ => None,
    }
}

/// Human-readable commands that undo a provisioning run, in execution order
pub fn cleanup_commands(plan: &Plan) -> Vec<String> {
    plan.steps()
        .iter()
        .filter_map(cleanup_args)
        .map(|args| render(&args))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use runnernet_core::config::ProvisionConfig;
    use serde_json::json;

    fn strs(args: &[String]) -> Vec<&str> {
        args.iter().map(String::as_str).collect()
    }

    #[test]
    fn login_modes() {
        assert_eq!(strs(&login(&AuthMethod::Interactive)), vec!["login"]);
        assert_eq!(
            strs(&login(&AuthMethod::ExistingSession)),
            vec!["account", "show"]
        );
        assert_eq!(
            strs(&login(&AuthMethod::ManagedIdentity)),
            vec!["login", "--identity"]
        );
    }

    #[test]
    fn service_principal_password_is_redacted() {
        let args = login(&AuthMethod::ServicePrincipal {
            client_id: "app".into(),
            client_secret: "s3cr3t".into(),
            tenant_id: "tenant".into(),
        });
        assert!(args.contains(&"s3cr3t".to_string()));

        let redacted = redact(&args);
        assert!(!redacted.contains(&"s3cr3t".to_string()));
        assert_eq!(redacted[5], "***");
        assert_eq!(redacted[7], "tenant");
    }

    #[test]
    fn role_assignment_triple() {
        let a = RoleAssignment::new("p-1", "Runner Role", "/subscriptions/s");
        assert_eq!(
            strs(&list_role_assignments(&a)),
            vec![
                "role",
                "assignment",
                "list",
                "--assignee",
                "p-1",
                "--role",
                "Runner Role",
                "--scope",
                "/subscriptions/s"
            ]
        );
    }

    #[test]
    fn deployment_parameters() {
        let args = deploy_template(
            "rg",
            Path::new("/tmp/nsg.json"),
            &[
                ("location".to_string(), "eastus".to_string()),
                ("nsgName".to_string(), "nsg".to_string()),
            ],
        );
        assert_eq!(
            strs(&args[7..]),
            vec!["--parameters", "location=eastus", "nsgName=nsg"]
        );
    }

    #[test]
    fn subnet_delegation_and_nsg() {
        let args = update_subnet(&SubnetUpdate {
            resource_group: "rg".into(),
            vnet_name: "vnet".into(),
            subnet_name: "snet".into(),
            delegation: "GitHub.Network/networkSettings".into(),
            network_security_group: "nsg".into(),
        });
        let joined = args.join(" ");
        assert!(joined.contains("--delegations GitHub.Network/networkSettings"));
        assert!(joined.contains("--network-security-group nsg"));
    }

    #[test]
    fn generic_resource_body_and_query() {
        let resource = GenericResource {
            resource_group: "rg".into(),
            name: "ns".into(),
            resource_type: "GitHub.Network/networkSettings".into(),
            api_version: "2024-04-02".into(),
            body: json!({"location": "eastus", "properties": {"businessId": "42"}}),
        };
        let args = create_resource(&resource, Some("{name:name}"));

        let props = args.iter().position(|a| a == "--properties").unwrap();
        let body: serde_json::Value = serde_json::from_str(&args[props + 1]).unwrap();
        assert_eq!(body["properties"]["businessId"], "42");
        assert!(args.contains(&"--is-full-object".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--query", "{name:name}"]);
    }

    fn cleanup_config() -> ProvisionConfig {
        ProvisionConfig::from_lookup(|key| {
            let value = match key {
                "AZURE_LOCATION" => "eastus",
                "SUBSCRIPTION_ID" => "sub-1",
                "RESOURCE_GROUP_NAME" => "runners-rg",
                "VNET_NAME" => "runners-vnet",
                "SUBNET_NAME" => "runners-subnet",
                "NSG_NAME" => "runners-nsg",
                "NETWORK_SETTINGS_RESOURCE_NAME" => "runners-ns",
                "DATABASE_ID" => "123456",
                _ => return None,
            };
            Some(value.to_string())
        })
        .unwrap()
    }

    #[test]
    fn cleanup_commands_in_removal_order() {
        let plan = Plan::cleanup(&cleanup_config(), "GitHub Actions Network Role");

        assert_eq!(
            cleanup_commands(&plan),
            vec![
                "az account set --subscription sub-1",
                "az resource delete --resource-group runners-rg --name runners-ns \
                 --resource-type GitHub.Network/networkSettings --api-version 2024-04-02",
                "az role assignment delete --assignee 85c49807-809d-4249-86e7-192762525474 \
                 --role 'GitHub Actions Network Role' --scope /subscriptions/sub-1",
                "az role assignment delete --assignee 4435c199-c3da-46b9-a61d-76de3f2c9f82 \
                 --role 'GitHub Actions Network Role' --scope /subscriptions/sub-1",
                "az role definition delete --name 'GitHub Actions Network Role' \
                 --custom-role-only true",
                "az group delete --name runners-rg --yes",
            ]
        );
    }

    #[test]
    fn render_quotes_names_with_spaces() {
        let line = render(&delete_role_definition("GitHub Actions Network Role"));
        assert_eq!(
            line,
            "az role definition delete --name 'GitHub Actions Network Role' --custom-role-only true"
        );
    }
}
