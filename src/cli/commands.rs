//! CLI command implementations
//!
//! Every invocation follows the same sequence:
//! 1. Load and validate configuration
//! 2. Open the inventory
//! 3. Build the remote channel and DNS updater (recording ones for `--dry-run`)
//! 4. Dispatch to the orchestrator
//! 5. Write exactly one JSON object to stdout

use std::path::Path;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::config::Config;
use crate::errors::OrchestratorError;
use crate::failover::{DnsUpdater, NsupdateDns, RecordingDns};
use crate::inventory::{HerdId, InstanceId, Inventory, JsonInventory, MemoryInventory};
use crate::lifecycle::CommandOutcome;
use crate::observability::{log_event, Event, Logger};
use crate::orchestrator::{LifecycleAction, Orchestrator};
use crate::remote::{RecordingChannel, RemoteChannel, SshChannel};

use super::args::{Cli, Command};
use super::errors::{CliError, CliResult};
use super::io::{write_error, write_response};

/// Main CLI entry point
///
/// Parses arguments and dispatches to the appropriate command.
/// This is the only function that main.rs should call.
pub fn run() -> CliResult<()> {
    run_cli(Cli::parse_args())
}

/// Run parsed arguments to completion, reporting on stdout.
pub fn run_cli(cli: Cli) -> CliResult<()> {
    let result = Session::open(&cli.config, cli.dry_run)
        .and_then(|session| session.dispatch(cli.command));

    match result {
        Ok(data) => write_response(data),
        Err(Failure { error, data }) => {
            write_error(error.code_str(), error.message(), data)?;
            Err(error)
        }
    }
}

/// A failed command, with whatever partial result it produced.
struct Failure {
    error: CliError,
    data: Option<Value>,
}

impl From<CliError> for Failure {
    fn from(error: CliError) -> Self {
        Self { error, data: None }
    }
}

impl From<OrchestratorError> for Failure {
    fn from(e: OrchestratorError) -> Self {
        CliError::from(e).into()
    }
}

impl From<serde_json::Error> for Failure {
    fn from(e: serde_json::Error) -> Self {
        CliError::from(e).into()
    }
}

/// Collaborators recorded instead of executed.
struct DryRun {
    channel: Arc<RecordingChannel>,
    dns: Arc<RecordingDns>,
}

impl DryRun {
    fn report(&self) -> Value {
        json!({
            "calls": self.channel.calls(),
            "dns": self.dns.requests(),
        })
    }
}

/// One configured orchestrator plus, for dry runs, its recorders.
struct Session {
    orchestrator: Orchestrator,
    dry_run: Option<DryRun>,
}

impl Session {
    fn open(config_path: &Path, dry_run: bool) -> Result<Self, Failure> {
        let config = load_config(config_path)?;
        let inventory = open_inventory(&config, dry_run)?;

        if dry_run {
            let recorders = DryRun {
                channel: Arc::new(RecordingChannel::new()),
                dns: Arc::new(RecordingDns::new()),
            };
            let channel: Arc<dyn RemoteChannel> = recorders.channel.clone();
            let dns: Arc<dyn DnsUpdater> = recorders.dns.clone();
            return Ok(Self {
                orchestrator: Orchestrator::new(config, channel, inventory, dns),
                dry_run: Some(recorders),
            });
        }

        let ssh = SshChannel::new(config.ssh_settings())
            .map_err(|e| CliError::config_error(e.to_string()))?;
        let channel: Arc<dyn RemoteChannel> = Arc::new(ssh);
        let dns: Arc<dyn DnsUpdater> =
            Arc::new(NsupdateDns::new(Arc::clone(&channel), config.dns.clone()));

        Ok(Self {
            orchestrator: Orchestrator::new(config, channel, inventory, dns),
            dry_run: None,
        })
    }

    fn dispatch(self, command: Command) -> Result<Value, Failure> {
        let result = self.execute(command);

        let metrics = serde_json::to_string(&self.orchestrator.metrics())
            .unwrap_or_else(|_| "{}".to_string());
        log_event(Event::Metrics, &[("counters", &metrics)]);

        let recorded = self.dry_run.as_ref().map(DryRun::report);
        match (result, recorded) {
            (Ok(data), None) => Ok(data),
            (Ok(data), Some(recorded)) => Ok(json!({ "result": data, "dry_run": recorded })),
            (Err(failure), None) => Err(failure),
            (Err(mut failure), Some(recorded)) => {
                failure.data = Some(json!({ "result": failure.data, "dry_run": recorded }));
                Err(failure)
            }
        }
    }

    fn execute(&self, command: Command) -> Result<Value, Failure> {
        let orch = &self.orchestrator;
        match command {
            Command::Start { ids } => self.batch(LifecycleAction::Start, &ids),
            Command::Stop { ids } => self.batch(LifecycleAction::Stop, &ids),
            Command::Reload { ids } => self.batch(LifecycleAction::Reload, &ids),
            Command::Restart { ids } => self.batch(LifecycleAction::Restart, &ids),
            Command::Rebuild { ids } => self.batch(LifecycleAction::Rebuild, &ids),
            Command::Promote { id } => to_value(orch.promote(InstanceId(id))?),
            Command::Demote { id } => to_value(orch.demote(InstanceId(id))?),
            Command::Remaster { id, master } => {
                to_value(orch.remaster(InstanceId(id), InstanceId(master))?)
            }
            Command::Failover { herd, to } => {
                to_value(orch.failover(HerdId(herd), InstanceId(to))?)
            }
            Command::Register { id } => to_value(orch.register(InstanceId(id))?),
            Command::Status { herd } => to_value(orch.status(HerdId(herd))?),
            Command::Run { action, id } => {
                let outcome = orch.run_action(&action, InstanceId(id))?;
                Ok(outcome_value(&action, &outcome))
            }
        }
    }

    fn batch(&self, action: LifecycleAction, ids: &[u64]) -> Result<Value, Failure> {
        let ids: Vec<InstanceId> = ids.iter().copied().map(InstanceId).collect();
        let report = self.orchestrator.batch(action, &ids);
        let data = to_value(&report)?;

        if report.is_success() {
            Ok(data)
        } else {
            Err(Failure {
                error: CliError::partial_failure(report.failures(), report.outcomes.len()),
                data: Some(data),
            })
        }
    }
}

fn load_config(path: &Path) -> CliResult<Config> {
    let config = Config::load(path).map_err(|e| CliError::config_error(e.message))?;
    // validate() has already parsed the level
    if let Ok(level) = config.severity() {
        Logger::set_level(level);
    }

    let inventory = config.inventory.display().to_string();
    log_event(
        Event::ConfigLoaded,
        &[
            ("path", &path.display().to_string()),
            ("inventory", &inventory),
        ],
    );
    Ok(config)
}

/// Dry runs work on an in-memory copy so the document on disk is untouched.
fn open_inventory(config: &Config, dry_run: bool) -> CliResult<Arc<dyn Inventory>> {
    let store = JsonInventory::open(&config.inventory)
        .map_err(|e| CliError::inventory_error(e.to_string()))?;

    let inventory: Arc<dyn Inventory> = if dry_run {
        let doc = store
            .document()
            .map_err(|e| CliError::inventory_error(e.to_string()))?;
        Arc::new(MemoryInventory::from_document(doc))
    } else {
        Arc::new(store)
    };

    log_event(
        Event::InventoryLoaded,
        &[
            ("path", &config.inventory.display().to_string()),
            ("dry_run", if dry_run { "true" } else { "false" }),
        ],
    );
    Ok(inventory)
}

fn to_value<T: Serialize>(value: T) -> Result<Value, Failure> {
    Ok(serde_json::to_value(value)?)
}

fn outcome_value(action: &str, outcome: &CommandOutcome) -> Value {
    match outcome {
        CommandOutcome::Completed(output) => {
            json!({ "action": action, "outcome": "completed", "output": output })
        }
        CommandOutcome::Skipped => json!({ "action": action, "outcome": "skipped" }),
        CommandOutcome::Benign(reason) => {
            json!({ "action": action, "outcome": "benign", "reason": format!("{:?}", reason) })
        }
    }
}
