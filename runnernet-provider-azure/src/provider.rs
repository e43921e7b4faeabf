//! Azure CLI control plane
//!
//! Every call is one `az` invocation with JSON output. Failures keep the
//! CLI's error text and are classified into the shared error kinds.

use std::io::Write;

use async_trait::async_trait;
use runnernet_core::config::AuthMethod;
use runnernet_core::control_plane::{ControlPlane, ControlPlaneError, ControlPlaneResult};
use runnernet_core::resource::{
    GenericResource, ResourceId, RoleAssignment, RoleDefinition, SubnetUpdate, TemplateDeployment,
    VirtualNetworkSpec,
};
use runnernet_core::template::MaterializedRole;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use crate::commands;
use crate::errors::{self, CallKind};
use crate::runner::{AzCommandRunner, CommandRunner};

/// Entry of `az role definition list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzRoleDefinition {
    role_name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    role_type: Option<String>,
    #[serde(default)]
    permissions: Vec<AzPermission>,
    #[serde(default)]
    assignable_scopes: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzPermission {
    #[serde(default)]
    actions: Vec<String>,
    #[serde(default)]
    not_actions: Vec<String>,
}

impl AzRoleDefinition {
    fn into_definition(self) -> RoleDefinition {
        let (actions, not_actions) = self.permissions.into_iter().fold(
            (Vec::new(), Vec::new()),
            |(mut actions, mut not_actions), p| {
                actions.extend(p.actions);
                not_actions.extend(p.not_actions);
                (actions, not_actions)
            },
        );

        RoleDefinition {
            name: self.role_name,
            description: self.description,
            is_custom: self.role_type.as_deref() == Some("CustomRole"),
            actions,
            not_actions,
            assignable_scopes: self.assignable_scopes,
        }
    }
}

/// Entry of `az role assignment list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AzRoleAssignment {
    role_definition_name: String,
    scope: String,
}

/// Control plane backed by the Azure CLI
pub struct AzureCliControlPlane<R: CommandRunner = AzCommandRunner> {
    runner: R,
}

impl AzureCliControlPlane<AzCommandRunner> {
    pub fn new() -> Self {
        Self::with_runner(AzCommandRunner::new())
    }
}

impl Default for AzureCliControlPlane<AzCommandRunner> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R: CommandRunner> AzureCliControlPlane<R> {
    pub fn with_runner(runner: R) -> Self {
        Self { runner }
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    // =========================================================================
    // Invocation
    // =========================================================================

    /// Run one `az` call and return its stdout
    async fn run(&self, mut args: Vec<String>, kind: CallKind) -> ControlPlaneResult<String> {
        args.push("--output".to_string());
        args.push("json".to_string());
        log::debug!("{}", commands::render(&args));

        let output = match kind {
            CallKind::Session => self.runner.run_attached(&args).await,
            CallKind::Operation => self.runner.run(&args).await,
        };
        let output = output.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                ControlPlaneError::Io(format!("az not found on PATH: {}", e))
            } else {
                ControlPlaneError::Io(e.to_string())
            }
        })?;

        if output.success {
            Ok(output.stdout)
        } else {
            Err(errors::classify(&output, kind))
        }
    }

    async fn run_json<T: DeserializeOwned>(&self, args: Vec<String>) -> ControlPlaneResult<T> {
        let stdout = self.run(args, CallKind::Operation).await?;
        serde_json::from_str(stdout.trim())
            .map_err(|e| ControlPlaneError::Serialization(e.to_string()))
    }

    async fn run_for(&self, args: Vec<String>, id: ResourceId) -> ControlPlaneResult<()> {
        self.run(args, CallKind::Operation)
            .await
            .map(|_| ())
            .map_err(|e| e.for_resource(id))
    }
}

#[async_trait]
impl<R: CommandRunner> ControlPlane for AzureCliControlPlane<R> {
    fn name(&self) -> &'static str {
        "az"
    }

    async fn login(&self, auth: &AuthMethod) -> ControlPlaneResult<()> {
        self.run(commands::login(auth), CallKind::Session).await?;
        Ok(())
    }

    async fn set_subscription(&self, subscription_id: &str) -> ControlPlaneResult<()> {
        self.run(commands::set_subscription(subscription_id), CallKind::Session)
            .await?;
        Ok(())
    }

    async fn register_provider(&self, namespace: &str) -> ControlPlaneResult<()> {
        self.run_for(
            commands::register_provider(namespace),
            ResourceId::new("provider", namespace),
        )
        .await
    }

    async fn list_role_definitions(&self, name: &str) -> ControlPlaneResult<Vec<RoleDefinition>> {
        let found: Vec<AzRoleDefinition> =
            self.run_json(commands::list_role_definitions(name)).await?;
        Ok(found
            .into_iter()
            .map(AzRoleDefinition::into_definition)
            .collect())
    }

    async fn create_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        self.run_for(
            commands::create_role_definition(role.path()),
            role.definition().resource_id(),
        )
        .await
    }

    async fn update_role_definition(&self, role: &MaterializedRole) -> ControlPlaneResult<()> {
        self.run_for(
            commands::update_role_definition(role.path()),
            role.definition().resource_id(),
        )
        .await
    }

    async fn delete_role_definition(&self, name: &str) -> ControlPlaneResult<()> {
        self.run_for(
            commands::delete_role_definition(name),
            ResourceId::new("role_definition", name),
        )
        .await
    }

    async fn list_role_assignments(
        &self,
        assignment: &RoleAssignment,
    ) -> ControlPlaneResult<Vec<RoleAssignment>> {
        // The CLI filters by assignee server-side and reports object ids, so
        // entries are keyed on the principal that was asked for.
        let found: Vec<AzRoleAssignment> =
            self.run_json(commands::list_role_assignments(assignment)).await?;
        Ok(found
            .into_iter()
            .map(|a| RoleAssignment::new(&assignment.principal_id, a.role_definition_name, a.scope))
            .collect())
    }

    async fn create_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        self.run_for(
            commands::create_role_assignment(assignment),
            assignment.resource_id(),
        )
        .await
    }

    async fn delete_role_assignment(&self, assignment: &RoleAssignment) -> ControlPlaneResult<()> {
        self.run_for(
            commands::delete_role_assignment(assignment),
            assignment.resource_id(),
        )
        .await
    }

    async fn create_resource_group(&self, name: &str, location: &str) -> ControlPlaneResult<()> {
        self.run_for(
            commands::create_resource_group(name, location),
            ResourceId::new("resource_group", name),
        )
        .await
    }

    async fn delete_resource_group(&self, name: &str) -> ControlPlaneResult<()> {
        self.run_for(
            commands::delete_resource_group(name),
            ResourceId::new("resource_group", name),
        )
        .await
    }

    async fn deploy_template(&self, deployment: &TemplateDeployment) -> ControlPlaneResult<()> {
        let mut file = tempfile::Builder::new()
            .prefix("nsg-deployment-")
            .suffix(".json")
            .tempfile()
            .map_err(|e| ControlPlaneError::Io(e.to_string()))?;
        let body = serde_json::to_vec_pretty(&deployment.template)
            .map_err(|e| ControlPlaneError::Serialization(e.to_string()))?;
        file.write_all(&body)
            .map_err(|e| ControlPlaneError::Io(e.to_string()))?;
        file.flush()
            .map_err(|e| ControlPlaneError::Io(e.to_string()))?;

        // `file` outlives the call; the template is gone once this returns
        self.run_for(
            commands::deploy_template(
                &deployment.resource_group,
                file.path(),
                &deployment.parameters,
            ),
            ResourceId::new("deployment", &deployment.resource_group),
        )
        .await
    }

    async fn create_virtual_network(&self, spec: &VirtualNetworkSpec) -> ControlPlaneResult<()> {
        self.run_for(
            commands::create_virtual_network(spec),
            ResourceId::new("virtual_network", &spec.name),
        )
        .await
    }

    async fn update_subnet(&self, update: &SubnetUpdate) -> ControlPlaneResult<()> {
        self.run_for(
            commands::update_subnet(update),
            ResourceId::new("subnet", &update.subnet_name),
        )
        .await
    }

    async fn create_resource(
        &self,
        resource: &GenericResource,
        query: Option<&str>,
    ) -> ControlPlaneResult<serde_json::Value> {
        self.run_json(commands::create_resource(resource, query))
            .await
            .map_err(|e| e.for_resource(resource.resource_id()))
    }

    async fn delete_resource(&self, resource: &GenericResource) -> ControlPlaneResult<()> {
        self.run_for(commands::delete_resource(resource), resource.resource_id())
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use runnernet_core::template::RoleTemplate;
    use serde_json::json;

    use super::*;
    use crate::runner::CommandOutput;

    /// Replays canned outputs and records every argument list
    #[derive(Default)]
    struct FakeRunner {
        responses: Mutex<VecDeque<std::io::Result<CommandOutput>>>,
        calls: Mutex<Vec<Vec<String>>>,
        attached: Mutex<Vec<Vec<String>>>,
        template_files: Mutex<Vec<String>>,
    }

    impl FakeRunner {
        fn respond(self, output: CommandOutput) -> Self {
            self.responses.lock().unwrap().push_back(Ok(output));
            self
        }

        fn respond_err(self, kind: std::io::ErrorKind) -> Self {
            self.responses
                .lock()
                .unwrap()
                .push_back(Err(std::io::Error::from(kind)));
            self
        }

        fn calls(&self) -> Vec<Vec<String>> {
            self.calls.lock().unwrap().clone()
        }

        fn attached(&self) -> Vec<Vec<String>> {
            self.attached.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl CommandRunner for FakeRunner {
        async fn run(&self, args: &[String]) -> std::io::Result<CommandOutput> {
            self.calls.lock().unwrap().push(args.to_vec());
            if let Some(i) = args.iter().position(|a| a == "--template-file") {
                let contents = std::fs::read_to_string(&args[i + 1])?;
                self.template_files.lock().unwrap().push(contents);
            }
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(CommandOutput::ok("")))
        }

        async fn run_attached(&self, args: &[String]) -> std::io::Result<CommandOutput> {
            self.attached.lock().unwrap().push(args.to_vec());
            self.run(args).await
        }
    }

    fn assignment() -> RoleAssignment {
        RoleAssignment::new(
            "85c49807-809d-4249-86e7-192762525474",
            "GitHub Actions Network Role",
            "/subscriptions/s",
        )
    }

    #[tokio::test]
    async fn every_call_requests_json_output() {
        let az = AzureCliControlPlane::with_runner(FakeRunner::default());
        az.register_provider("GitHub.Network").await.unwrap();

        let calls = az.runner().calls();
        assert_eq!(
            calls[0],
            vec![
                "provider",
                "register",
                "--namespace",
                "GitHub.Network",
                "--output",
                "json"
            ]
        );
    }

    #[tokio::test]
    async fn session_calls_keep_the_terminal_attached() {
        let az = AzureCliControlPlane::with_runner(FakeRunner::default());
        az.login(&AuthMethod::Interactive).await.unwrap();
        az.set_subscription("s").await.unwrap();
        az.register_provider("GitHub.Network").await.unwrap();

        let attached = az.runner().attached();
        assert_eq!(attached.len(), 2);
        assert_eq!(attached[0][0], "login");
        assert_eq!(&attached[1][..2], ["account", "set"]);
        assert_eq!(az.runner().calls().len(), 3);
    }

    #[tokio::test]
    async fn failed_login_is_authentication() {
        let runner = FakeRunner::default().respond(CommandOutput::failed(
            1,
            "ERROR: Please run 'az login' to setup account.",
        ));
        let az = AzureCliControlPlane::with_runner(runner);

        let err = az.login(&AuthMethod::ExistingSession).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Authentication(_)));
    }

    #[tokio::test]
    async fn missing_binary_is_io() {
        let runner = FakeRunner::default().respond_err(std::io::ErrorKind::NotFound);
        let az = AzureCliControlPlane::with_runner(runner);

        let err = az.create_resource_group("rg", "eastus").await.unwrap_err();
        match err {
            ControlPlaneError::Io(message) => assert!(message.starts_with("az not found")),
            other => panic!("Expected Io error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn command_failure_names_the_resource() {
        let runner = FakeRunner::default().respond(CommandOutput::failed(
            1,
            "ERROR: (AuthorizationFailed) The client does not have authorization",
        ));
        let az = AzureCliControlPlane::with_runner(runner);

        let err = az.create_resource_group("rg", "eastus").await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "(AuthorizationFailed) The client does not have authorization"
        );
        match err {
            ControlPlaneError::Command { resource_id, .. } => {
                assert_eq!(resource_id, Some(ResourceId::new("resource_group", "rg")));
            }
            other => panic!("Expected Command error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn deleting_missing_group_is_not_found() {
        let runner = FakeRunner::default().respond(CommandOutput::failed(
            3,
            "ERROR: (ResourceGroupNotFound) Resource group 'rg' could not be found.",
        ));
        let az = AzureCliControlPlane::with_runner(runner);

        assert!(az.delete_resource_group("rg").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn role_definitions_are_decoded() {
        let listing = json!([{
            "roleName": "GitHub Actions Network Role",
            "roleType": "CustomRole",
            "description": "Runner networking",
            "permissions": [{
                "actions": ["Microsoft.Network/virtualNetworks/read"],
                "notActions": []
            }],
            "assignableScopes": ["/subscriptions/s"]
        }]);
        let runner = FakeRunner::default().respond(CommandOutput::ok(listing.to_string()));
        let az = AzureCliControlPlane::with_runner(runner);

        let found = az
            .list_role_definitions("GitHub Actions Network Role")
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].name, "GitHub Actions Network Role");
        assert!(found[0].is_custom);
        assert_eq!(found[0].actions, vec!["Microsoft.Network/virtualNetworks/read"]);
        assert_eq!(found[0].assignable_scopes, vec!["/subscriptions/s"]);
    }

    #[tokio::test]
    async fn assignments_keep_the_requested_principal() {
        let listing = json!([{
            "principalId": "0f6c3a4e-object-id",
            "roleDefinitionName": "GitHub Actions Network Role",
            "scope": "/subscriptions/s"
        }]);
        let runner = FakeRunner::default().respond(CommandOutput::ok(listing.to_string()));
        let az = AzureCliControlPlane::with_runner(runner);

        let found = az.list_role_assignments(&assignment()).await.unwrap();
        assert_eq!(found, vec![assignment()]);
    }

    #[tokio::test]
    async fn undecodable_listing_is_serialization_error() {
        let runner = FakeRunner::default().respond(CommandOutput::ok("not json"));
        let az = AzureCliControlPlane::with_runner(runner);

        let err = az.list_role_assignments(&assignment()).await.unwrap_err();
        assert!(matches!(err, ControlPlaneError::Serialization(_)));
    }

    #[tokio::test]
    async fn role_definition_is_passed_as_a_file() {
        let az = AzureCliControlPlane::with_runner(FakeRunner::default());
        let role = RoleTemplate::builtin().materialize("s").unwrap();

        az.create_role_definition(&role).await.unwrap();

        let calls = az.runner().calls();
        let path = role.path().to_string_lossy().into_owned();
        assert_eq!(calls[0][4], path);
    }

    #[tokio::test]
    async fn deployment_template_exists_during_the_call_only() {
        let az = AzureCliControlPlane::with_runner(FakeRunner::default());
        let deployment = TemplateDeployment {
            resource_group: "rg".into(),
            template: json!({"resources": []}),
            parameters: vec![("nsgName".into(), "nsg".into())],
        };

        az.deploy_template(&deployment).await.unwrap();

        let contents = az.runner().template_files.lock().unwrap().clone();
        assert_eq!(contents.len(), 1);
        let parsed: serde_json::Value = serde_json::from_str(&contents[0]).unwrap();
        assert_eq!(parsed, json!({"resources": []}));

        let calls = az.runner().calls();
        let i = calls[0].iter().position(|a| a == "--template-file").unwrap();
        assert!(!std::path::Path::new(&calls[0][i + 1]).exists());
    }

    #[tokio::test]
    async fn network_settings_query_output_is_returned() {
        let runner = FakeRunner::default().respond(CommandOutput::ok(
            r#"{"GitHubId": "ABC123", "name": "runners-ns"}"#,
        ));
        let az = AzureCliControlPlane::with_runner(runner);
        let resource = GenericResource {
            resource_group: "rg".into(),
            name: "runners-ns".into(),
            resource_type: "GitHub.Network/networkSettings".into(),
            api_version: "2024-04-02".into(),
            body: json!({}),
        };

        let value = az
            .create_resource(&resource, Some("{GitHubId:tags.GitHubId, name:name}"))
            .await
            .unwrap();
        assert_eq!(value["GitHubId"], "ABC123");
    }
}
