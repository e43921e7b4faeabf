use clap::{Parser, Subcommand};
use colored::Colorize;

use runnernet_core::config::ProvisionConfig;
use runnernet_core::plan::Plan;
use runnernet_core::sequencer::{
    RunReport, SequenceError, Sequencer, SequencerConfig, StepOutcome, StepReport,
};
use runnernet_core::template::{NsgTemplate, RoleTemplate};
use runnernet_provider_azure::{AzureCliControlPlane, cleanup_commands};

#[derive(Parser, Debug)]
#[command(name = "runnernet")]
#[command(
    about = "Provision Azure private networking for GitHub-hosted runners",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable debug logging (RUST_LOG takes precedence)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Commands {
    /// Create the role, assignments, network and network settings
    Provision {
        /// Print each step without calling the control plane
        #[arg(long)]
        dry_run: bool,
    },
    /// Show the ordered provisioning steps
    Plan,
    /// Show (or run) the commands that remove everything provisioned
    Cleanup {
        /// Run the removals instead of printing them
        #[arg(long)]
        execute: bool,
    },
}

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    let command = cli
        .command
        .unwrap_or(Commands::Provision { dry_run: false });

    let result = match command {
        Commands::Provision { dry_run } => run_provision(dry_run).await,
        Commands::Plan => run_plan(),
        Commands::Cleanup { execute } => run_cleanup(execute).await,
    };

    if let Err(e) = result {
        eprintln!("{} {}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}

/// Configuration and templates shared by every command
struct Context {
    config: ProvisionConfig,
    role_template: RoleTemplate,
    nsg_template: NsgTemplate,
}

impl Context {
    fn load() -> Result<Self, String> {
        let config = ProvisionConfig::from_env().map_err(|e| e.to_string())?;
        let role_template =
            RoleTemplate::load(config.role_template.as_deref()).map_err(|e| e.to_string())?;
        let nsg_template =
            NsgTemplate::load(config.nsg_template.as_deref()).map_err(|e| e.to_string())?;
        log::debug!(
            "subscription {}, resource group {} in {}",
            config.subscription_id,
            config.resource_group,
            config.location
        );

        Ok(Self {
            config,
            role_template,
            nsg_template,
        })
    }

    fn provision_plan(&self) -> Result<Plan, String> {
        Plan::provision(&self.config, &self.role_template, &self.nsg_template)
            .map_err(|e| e.to_string())
    }

    fn cleanup_plan(&self) -> Result<Plan, String> {
        let role_name = self.role_template.role_name().map_err(|e| e.to_string())?;
        Ok(Plan::cleanup(&self.config, &role_name))
    }
}

fn run_plan() -> Result<(), String> {
    let ctx = Context::load()?;
    let plan = ctx.provision_plan()?;

    print_plan(&plan);
    Ok(())
}

async fn run_provision(dry_run: bool) -> Result<(), String> {
    let ctx = Context::load()?;
    let plan = ctx.provision_plan()?;

    print_plan(&plan);
    println!();

    if dry_run {
        println!("{}", "Dry run: no changes will be made.".yellow());
    } else {
        println!("{}", "Provisioning...".cyan().bold());
    }
    println!();

    let sequencer = Sequencer::new(AzureCliControlPlane::new(), ctx.config.auth.clone())
        .with_config(SequencerConfig { dry_run });
    let report = sequencer.run(&plan).await.map_err(|e| report_failure(&e))?;

    print_report(&report);
    println!();

    if let Some(output) = report.network_settings() {
        println!("{}", "Network settings:".cyan().bold());
        println!(
            "  GitHubId: {}",
            output.github_id.as_deref().unwrap_or("-").bold()
        );
        println!("  name:     {}", output.name.as_deref().unwrap_or("-"));
        println!();
    }

    print_cleanup_commands(&ctx.cleanup_plan()?);
    println!();

    if dry_run {
        println!("{}", "Dry run complete.".green().bold());
    } else {
        println!("{}", provision_summary(&report).green().bold());
    }

    Ok(())
}

async fn run_cleanup(execute: bool) -> Result<(), String> {
    let ctx = Context::load()?;
    let plan = ctx.cleanup_plan()?;

    if !execute {
        print_cleanup_commands(&plan);
        println!();
        println!(
            "{}",
            "Run again with --execute to perform these removals.".yellow()
        );
        return Ok(());
    }

    println!("{}", "Removing resources...".red().bold());
    println!();

    let sequencer = Sequencer::new(AzureCliControlPlane::new(), ctx.config.auth.clone());
    let report = sequencer.run(&plan).await.map_err(|e| report_failure(&e))?;

    print_report(&report);
    println!();
    println!(
        "{}",
        format!(
            "Cleanup complete! {} removed, {} already absent.",
            report.count(&StepOutcome::Deleted),
            report.count(&StepOutcome::NotFound)
        )
        .green()
        .bold()
    );

    Ok(())
}

fn provision_summary(report: &RunReport) -> String {
    format!(
        "Provisioning complete! {} changes applied, {} already in place.",
        report.applied(),
        report.count(&StepOutcome::AlreadyExists)
    )
}

fn print_plan(plan: &Plan) {
    println!("{}", "Execution Plan:".cyan().bold());
    println!();
    for (i, step) in plan.steps().iter().enumerate() {
        let marker = if step.is_removal() {
            "-".red().bold()
        } else {
            "+".green().bold()
        };
        println!("  {:>2}. {} {}", i + 1, marker, step);
    }
    println!();
    println!(
        "Plan: {} steps, {} of them change remote state.",
        plan.len().to_string().bold(),
        plan.mutation_count().to_string().green()
    );
}

fn print_report(report: &RunReport) {
    for r in &report.steps {
        print_step(r);
    }
}

fn print_step(report: &StepReport) {
    let note = match &report.outcome {
        StepOutcome::Completed | StepOutcome::Created | StepOutcome::Deleted => String::new(),
        StepOutcome::Updated => " (updated)".yellow().to_string(),
        StepOutcome::AlreadyExists => " (already exists)".dimmed().to_string(),
        StepOutcome::NotFound => " (not found)".dimmed().to_string(),
        StepOutcome::NetworkSettings(_) => " (created)".to_string(),
        StepOutcome::Skipped { reason } => format!(" (skipped: {})", reason).dimmed().to_string(),
    };
    println!("  {} {}{}", "✓".green(), report.step, note);
}

fn print_cleanup_commands(plan: &Plan) {
    println!("{}", "To remove everything, run:".cyan().bold());
    for command in cleanup_commands(plan) {
        println!("  {}", command);
    }
}

/// Print what finished before the failure and return the message for `main`
fn report_failure(err: &SequenceError) -> String {
    for r in &err.completed {
        print_step(r);
    }
    println!("  {} {} - {}", "✗".red(), err.step, err.source);
    println!();
    println!(
        "{}",
        format!(
            "Stopped at '{}'. {} steps completed; nothing was rolled back.",
            err.step,
            err.completed.len()
        )
        .red()
        .bold()
    );
    err.to_string()
}
