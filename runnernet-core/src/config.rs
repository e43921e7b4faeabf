//! Configuration read once at startup and passed by reference into every run

use std::path::PathBuf;

use thiserror::Error;

/// Service principal of the runner networking service
pub const NETWORK_SERVICE_PRINCIPAL: &str = "85c49807-809d-4249-86e7-192762525474";
/// Service principal of the Actions API
pub const ACTIONS_API_PRINCIPAL: &str = "4435c199-c3da-46b9-a61d-76de3f2c9f82";

/// Principals that receive the custom role, in assignment order
pub const SERVICE_PRINCIPALS: [&str; 2] = [NETWORK_SERVICE_PRINCIPAL, ACTIONS_API_PRINCIPAL];

pub const DEFAULT_ADDRESS_PREFIX: &str = "10.0.0.0/16";
pub const DEFAULT_SUBNET_PREFIX: &str = "10.0.0.0/24";
pub const DEFAULT_PROVIDER_NAMESPACE: &str = "GitHub.Network";
pub const DEFAULT_API_VERSION: &str = "2024-04-02";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {var}: {reason}")]
    Invalid { var: &'static str, reason: String },
}

/// How the control plane session is established
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Browser/device login
    Interactive,
    /// Reuse whatever session the CLI already holds
    ExistingSession,
    /// Managed identity of the host
    ManagedIdentity,
    ServicePrincipal {
        client_id: String,
        client_secret: String,
        tenant_id: String,
    },
}

/// Everything a provisioning or cleanup run needs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionConfig {
    pub location: String,
    pub subscription_id: String,
    pub resource_group: String,
    pub vnet_name: String,
    pub subnet_name: String,
    pub nsg_name: String,
    pub network_settings_name: String,
    /// Business identifier of the organization or enterprise
    pub database_id: u64,
    pub address_prefix: String,
    pub subnet_prefix: String,
    pub provider_namespace: String,
    pub api_version: String,
    /// Overrides the built-in role definition template
    pub role_template: Option<PathBuf>,
    /// Overrides the built-in NSG deployment template
    pub nsg_template: Option<PathBuf>,
    pub auth: AuthMethod,
}

impl ProvisionConfig {
    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &'static str| get(key).ok_or(ConfigError::Missing(key));

        let database_id_raw = required("DATABASE_ID")?;
        let database_id =
            database_id_raw
                .trim()
                .parse::<u64>()
                .map_err(|e| ConfigError::Invalid {
                    var: "DATABASE_ID",
                    reason: e.to_string(),
                })?;

        let auth = match get("AZURE_AUTH_MODE").as_deref() {
            None | Some("interactive") => AuthMethod::Interactive,
            Some("cli") => AuthMethod::ExistingSession,
            Some("identity") => AuthMethod::ManagedIdentity,
            Some("service-principal") => AuthMethod::ServicePrincipal {
                client_id: required("AZURE_CLIENT_ID")?,
                client_secret: required("AZURE_CLIENT_SECRET")?,
                tenant_id: required("AZURE_TENANT_ID")?,
            },
            Some(other) => {
                return Err(ConfigError::Invalid {
                    var: "AZURE_AUTH_MODE",
                    reason: format!(
                        "unknown mode '{}' (expected interactive, cli, identity or service-principal)",
                        other
                    ),
                });
            }
        };

        Ok(Self {
            location: required("AZURE_LOCATION")?,
            subscription_id: required("SUBSCRIPTION_ID")?,
            resource_group: required("RESOURCE_GROUP_NAME")?,
            vnet_name: required("VNET_NAME")?,
            subnet_name: required("SUBNET_NAME")?,
            nsg_name: required("NSG_NAME")?,
            network_settings_name: required("NETWORK_SETTINGS_RESOURCE_NAME")?,
            database_id,
            address_prefix: get("ADDRESS_PREFIX")
                .unwrap_or_else(|| DEFAULT_ADDRESS_PREFIX.to_string()),
            subnet_prefix: get("SUBNET_PREFIX")
                .unwrap_or_else(|| DEFAULT_SUBNET_PREFIX.to_string()),
            provider_namespace: get("PROVIDER_NAMESPACE")
                .unwrap_or_else(|| DEFAULT_PROVIDER_NAMESPACE.to_string()),
            api_version: get("NETWORK_SETTINGS_API_VERSION")
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            role_template: get("ROLE_TEMPLATE_PATH").map(PathBuf::from),
            nsg_template: get("NSG_TEMPLATE_PATH").map(PathBuf::from),
            auth,
        })
    }
}
