//! Tool-chain runner
//!
//! Loads a chain definition (JSON) and runs it against the built-in tools:
//! - `run`: execute a chain and print the summary or the full JSON report
//! - `validate`: check a chain without running it
//! - `tools`: list the registered tools

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

use tc_chain::{ChainReport, ChainRequest, OrchestratorConfig, StrategyKind, ToolChainOrchestrator};
use tc_core::CancellationToken;
use tc_tools::{register_builtin_tools, ExecutorConfig, RegistryExecutor, ToolRegistry};

#[derive(Parser, Debug)]
#[command(name = "tc-runner")]
#[command(about = "Run tool chains against the built-in tool registry")]
struct Args {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Run a chain definition
    Run {
        /// Path to the chain file
        path: PathBuf,

        /// Override the strategy (sequential, parallel, conditional)
        #[arg(short, long)]
        strategy: Option<StrategyKind>,

        /// Cancel the chain after this many seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Record a reasoning trace
        #[arg(long)]
        reasoning: bool,

        /// Reasoning budget for the conditional strategy
        #[arg(long)]
        max_reasoning_steps: Option<usize>,

        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Validate a chain definition without running it
    Validate {
        /// Path to the chain file
        path: PathBuf,
    },
    /// List registered tools
    Tools,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Load environment from TC_ENV_FILE or /etc/tc/environment (if exists)
    tc_core::config::load_environment();

    let args = Args::parse();
    init_tracing(args.log_json)?;

    let registry = Arc::new(ToolRegistry::new());
    register_builtin_tools(&registry).await?;
    info!("Initialized tool registry");

    let executor = Arc::new(RegistryExecutor::new(
        registry.clone(),
        ExecutorConfig::from_env(),
    ));
    let orchestrator = ToolChainOrchestrator::new(executor, OrchestratorConfig::from_env())
        .with_catalog(registry.clone());

    match args.command {
        Commands::Run {
            path,
            strategy,
            timeout_secs,
            reasoning,
            max_reasoning_steps,
            json,
        } => {
            let mut request = load_chain(&path).await?;
            if let Some(strategy) = strategy {
                request.strategy = Some(strategy);
            }
            if let Some(secs) = timeout_secs {
                request.timeout_secs = Some(secs);
            }
            if reasoning || max_reasoning_steps.is_some() {
                request.enable_reasoning = true;
                request.max_reasoning_steps = max_reasoning_steps.or(request.max_reasoning_steps);
            }

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            let interrupt = tokio::spawn(async move {
                tokio::select! {
                    _ = on_interrupt.cancelled() => {}
                    signal = tokio::signal::ctrl_c() => {
                        if signal.is_ok() {
                            warn!("Interrupt received, cancelling chain");
                            on_interrupt.cancel();
                        }
                    }
                }
            });

            let report = orchestrator.run(request, &cancel).await;
            interrupt.abort();
            let report = report?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print_report(&report);
            }

            Ok(if report.success {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
        Commands::Validate { path } => {
            let request = load_chain(&path).await?;
            match orchestrator.validate(&request).await {
                Ok(()) => {
                    println!("{}: {} steps, valid", path.display(), request.steps.len());
                    Ok(ExitCode::SUCCESS)
                }
                Err(tc_chain::ChainError::Validation(errors)) => {
                    println!("{}: invalid", path.display());
                    for error in errors {
                        println!("  - {}", error);
                    }
                    Ok(ExitCode::FAILURE)
                }
                Err(e) => Err(e.into()),
            }
        }
        Commands::Tools => {
            for tool in registry.list().await {
                println!("{:<10} [{}] {}", tool.name, tool.category, tool.description);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn init_tracing(json: bool) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("tc_runner=info".parse()?)
        .add_directive("tc_chain=info".parse()?)
        .add_directive("tc_tools=info".parse()?);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
    Ok(())
}

async fn load_chain(path: &Path) -> Result<ChainRequest> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read chain file {}", path.display()))?;
    ChainRequest::from_json(&contents)
        .with_context(|| format!("Failed to parse chain file {}", path.display()))
}

fn print_report(report: &ChainReport) {
    println!("{}", report.summary);
    println!(
        "Status: {:?} ({} strategy, {} ms)",
        report.status,
        report.strategy,
        report.duration.as_millis()
    );

    if !report.reasoning_steps.is_empty() {
        println!("\nReasoning:");
        for (i, step) in report.reasoning_steps.iter().enumerate() {
            println!("  {}. Thought: {}", i + 1, step.thought);
            println!("     Action: {}", step.action);
            println!("     Observation: {}", step.observation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_load_chain_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"strategy": "parallel", "steps": [{{"id": "S1", "tool_id": "echo"}}]}}"#
        )
        .unwrap();

        let request = load_chain(file.path()).await.unwrap();
        assert_eq!(request.strategy, Some(StrategyKind::Parallel));
        assert_eq!(request.steps.len(), 1);
    }

    #[tokio::test]
    async fn test_load_chain_reports_path() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();

        let err = load_chain(file.path()).await.unwrap_err();
        assert!(err.to_string().contains("Failed to parse chain file"));

        let missing = load_chain(Path::new("/nonexistent/chain.json")).await.unwrap_err();
        assert!(missing.to_string().contains("Failed to read chain file"));
    }

    #[test]
    fn test_strategy_flag_parses() {
        let args = Args::try_parse_from(["tc-runner", "run", "chain.json", "-s", "Conditional"]).unwrap();
        match args.command {
            Commands::Run { strategy, .. } => assert_eq!(strategy, Some(StrategyKind::Conditional)),
            other => panic!("unexpected command {:?}", other),
        }
        assert!(Args::try_parse_from(["tc-runner", "run", "chain.json", "-s", "random"]).is_err());
    }
}
