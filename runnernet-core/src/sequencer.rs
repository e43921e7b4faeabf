//! Sequencer - Execute a Plan's Steps using a ControlPlane
//!
//! Steps run strictly in order, one remote call at a time. The first failing
//! Step ends the run: later Steps never execute and nothing already created is
//! rolled back. Removal Steps count "not found" as done.

use thiserror::Error;

use crate::config::AuthMethod;
use crate::control_plane::{ControlPlane, ControlPlaneError};
use crate::guard::{self, GuardOutcome};
use crate::plan::Plan;
use crate::resource::NetworkSettingsOutput;
use crate::step::Step;
use crate::template::TemplateError;

/// Result of executing one Step
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// Unguarded call succeeded
    Completed,
    Created,
    Updated,
    /// Already present, nothing created
    AlreadyExists,
    Deleted,
    /// Already absent, nothing removed
    NotFound,
    /// Network settings created, with its queried output
    NetworkSettings(NetworkSettingsOutput),
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

impl From<GuardOutcome> for StepOutcome {
    fn from(outcome: GuardOutcome) -> Self {
        match outcome {
            GuardOutcome::Created => StepOutcome::Created,
            GuardOutcome::Updated => StepOutcome::Updated,
            GuardOutcome::Skipped => StepOutcome::AlreadyExists,
            GuardOutcome::Deleted => StepOutcome::Deleted,
            GuardOutcome::NotFound => StepOutcome::NotFound,
        }
    }
}

#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    ControlPlane(#[from] ControlPlaneError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error("Unexpected network settings output: {0}")]
    Output(String),
}

/// The Step that stopped a run
#[derive(Debug, Error)]
#[error("{step} failed: {source}")]
pub struct SequenceError {
    /// Description of the failed Step
    pub step: String,
    /// Reports of the Steps that finished before it
    pub completed: Vec<StepReport>,
    #[source]
    pub source: StepError,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step: String,
    pub outcome: StepOutcome,
}

/// Result of executing the entire Plan
#[derive(Debug, Default)]
pub struct RunReport {
    pub steps: Vec<StepReport>,
}

impl RunReport {
    /// Output of the network settings Step, if the Plan had one
    pub fn network_settings(&self) -> Option<&NetworkSettingsOutput> {
        self.steps.iter().find_map(|r| match &r.outcome {
            StepOutcome::NetworkSettings(output) => Some(output),
            _ => None,
        })
    }

    pub fn count(&self, outcome: &StepOutcome) -> usize {
        self.steps.iter().filter(|r| &r.outcome == outcome).count()
    }

    /// Steps that created, changed or removed something
    ///
    /// Unguarded calls that report no state (login, subscription selection,
    /// provider registration) are not counted, nor are skipped ones.
    pub fn applied(&self) -> usize {
        self.steps
            .iter()
            .filter(|r| {
                matches!(
                    r.outcome,
                    StepOutcome::Created
                        | StepOutcome::Updated
                        | StepOutcome::Deleted
                        | StepOutcome::NetworkSettings(_)
                )
            })
            .count()
    }
}

/// Sequencer configuration
#[derive(Debug, Clone, Default)]
pub struct SequencerConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
}

/// Sequencer that executes Steps using a ControlPlane
pub struct Sequencer<C: ControlPlane> {
    client: C,
    auth: AuthMethod,
    config: SequencerConfig,
}

impl<C: ControlPlane> Sequencer<C> {
    pub fn new(client: C, auth: AuthMethod) -> Self {
        Self {
            client,
            auth,
            config: SequencerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: SequencerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    /// Execute a Plan, stopping at the first failing Step
    pub async fn run(&self, plan: &Plan) -> Result<RunReport, SequenceError> {
        let mut report = RunReport::default();

        for (index, step) in plan.steps().iter().enumerate() {
            log::info!("[{}/{}] {}", index + 1, plan.len(), step);

            match self.execute_step(step).await {
                Ok(outcome) => {
                    log::debug!("{} -> {:?}", step, outcome);
                    report.steps.push(StepReport {
                        step: step.to_string(),
                        outcome,
                    });
                }
                Err(source) => {
                    match step.resource_id() {
                        Some(id) => log::error!("{} ({}) failed: {}", step, id, source),
                        None => log::error!("{} failed: {}", step, source),
                    }
                    return Err(SequenceError {
                        step: step.to_string(),
                        completed: report.steps,
                        source,
                    });
                }
            }
        }

        Ok(report)
    }

    /// Execute a single Step
    async fn execute_step(&self, step: &Step) -> Result<StepOutcome, StepError> {
        if self.config.dry_run {
            return Ok(StepOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        let client = &self.client;
        let outcome = match step {
            Step::Login => {
                client.login(&self.auth).await?;
                StepOutcome::Completed
            }
            Step::SetSubscription(subscription_id) => {
                client.set_subscription(subscription_id).await?;
                StepOutcome::Completed
            }
            Step::RegisterProvider(namespace) => {
                client.register_provider(namespace).await?;
                StepOutcome::Completed
            }
            Step::EnsureRoleDefinition {
                template,
                subscription_id,
                ..
            } => {
                // Scratch file is removed when `role` drops at the end of this arm
                let role = template.materialize(subscription_id)?;
                guard::ensure_role_definition(client, &role).await?.into()
            }
            Step::EnsureRoleAssignment(assignment) => {
                guard::ensure_role_assignment(client, assignment).await?.into()
            }
            Step::CreateResourceGroup { name, location } => {
                client.create_resource_group(name, location).await?;
                StepOutcome::Created
            }
            Step::DeployNetworkSecurityGroup { deployment, .. } => {
                client.deploy_template(deployment).await?;
                StepOutcome::Created
            }
            Step::CreateVirtualNetwork(spec) => {
                client.create_virtual_network(spec).await?;
                StepOutcome::Created
            }
            Step::DelegateSubnet(update) => {
                client.update_subnet(update).await?;
                StepOutcome::Updated
            }
            Step::CreateNetworkSettings { resource, query } => {
                let value = client.create_resource(resource, Some(query.as_str())).await?;
                let output: NetworkSettingsOutput = serde_json::from_value(value)
                    .map_err(|e| StepError::Output(e.to_string()))?;
                StepOutcome::NetworkSettings(output)
            }
            Step::DeleteNetworkSettings(resource) => {
                guard::tolerate_not_found(client.delete_resource(resource).await)?.into()
            }
            Step::RemoveRoleAssignment(assignment) => {
                guard::remove_role_assignment(client, assignment).await?.into()
            }
            Step::DeleteRoleDefinition(name) => {
                guard::tolerate_not_found(client.delete_role_definition(name).await)?.into()
            }
            Step::DeleteResourceGroup(name) => {
                guard::tolerate_not_found(client.delete_resource_group(name).await)?.into()
            }
        };

        Ok(outcome)
    }
}
