//! Headless flow runner
//!
//! Loads a saved flow, applies `--var` overrides to its environment and
//! runs it to completion. Ctrl-C asks the running components to stop.
//!
//! ```text
//! flow-runner iris.kf --sequential --var data=/srv/iris
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use flow_engine::{ConfigError, EditorConfig, FlowContext, FlowError, RunSummary};

#[derive(Parser, Debug)]
#[command(name = "flow-runner")]
#[command(about = "Run a KnowledgeFlow flow file without the editor", long_about = None)]
struct Cli {
    /// Flow file (.kf, .json or .toml)
    file: PathBuf,

    /// Launch start points one after another in label order
    #[arg(short, long)]
    sequential: bool,

    /// Environment variable for the flow, as KEY=VALUE
    #[arg(long = "var", value_name = "KEY=VALUE", value_parser = parse_var)]
    vars: Vec<(String, String)>,

    /// Directory holding editor.json
    #[arg(long, value_name = "DIR")]
    config: Option<PathBuf>,
}

#[derive(Debug, thiserror::Error)]
enum RunnerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Flow(#[from] FlowError),
}

fn parse_var(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => Ok((key.trim().to_string(), value.to_string())),
        _ => Err(format!("expected KEY=VALUE, got '{}'", raw)),
    }
}

async fn run(cli: Cli) -> Result<RunSummary, RunnerError> {
    let config = match &cli.config {
        Some(dir) => EditorConfig::load(dir).await?,
        None => EditorConfig::default(),
    };

    let mut context = FlowContext::new(flow_components::registry(), config);
    let index = context.open(&cli.file)?;
    let workspace = context
        .workspace_mut(index)
        .ok_or_else(|| FlowError::failed("opened workspace disappeared"))?;
    for (key, value) in cli.vars {
        log::debug!("Setting {} = {}", key, value);
        workspace.set_variable(key, value);
    }

    log::info!(
        "Loaded '{}': {} nodes, {} edges",
        workspace.name(),
        workspace.node_count(),
        workspace.edge_count()
    );

    let handle = workspace.run(cli.sequential)?;
    let wait = handle.wait();
    tokio::pin!(wait);
    let summary = tokio::select! {
        summary = &mut wait => summary?,
        _ = tokio::signal::ctrl_c() => {
            log::warn!("Interrupted; stopping flow");
            workspace.stop();
            wait.await?
        }
    };
    Ok(summary)
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(summary) => {
            log::info!(
                "Run {} finished in {} ms: {} launched, {} excluded, {} failed{}",
                summary.execution_id,
                summary.elapsed_ms,
                summary.launched.len(),
                summary.excluded.len(),
                summary.failed.len(),
                if summary.stopped { " (stopped)" } else { "" }
            );
            for (node, reason) in &summary.failed {
                log::error!("Start point '{}' failed: {}", node, reason);
            }
            if summary.succeeded() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
