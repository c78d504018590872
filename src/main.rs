// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! brickrun entry point - run and check brick pipeline files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::Value;

use brick_runtime::api_version::ApiVersion;
use brick_runtime::bricks::InMemoryBrickRegistry;
use brick_runtime::config::{self, CliOptions, RuntimeConfig};
use brick_runtime::error::{RuntimeResult, SerializedError};
use brick_runtime::integrations::{build_integration_context, InMemoryIntegrationLocator};
use brick_runtime::pipeline::{collect_brick_ids, PipelineDefinition};
use brick_runtime::runtime::{InitialValues, PipelineReducer, ReduceOptions};
use brick_runtime::telemetry::{init_telemetry, TelemetryConfig, GLOBAL_METRICS};

/// brickrun version string.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// brickrun - run brick pipelines from the command line.
#[derive(Parser)]
#[command(name = "brickrun")]
#[command(author, version, about = "Run brick pipelines", long_about = None)]
struct Cli {
    /// Show debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Print per-brick metrics after the command finishes
    #[arg(long, global = true)]
    trace: bool,

    /// Runtime config file to use instead of the workspace config
    #[arg(long, global = true, env = "BRICKRUN_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Subcommands for brickrun.
#[derive(Subcommand)]
enum Commands {
    /// Run a pipeline file and print its output as JSON
    Run {
        /// Pipeline definition (JSON or YAML)
        file: PathBuf,

        /// Pipeline input as JSON (overrides the file's input)
        #[arg(short, long)]
        input: Option<String>,

        /// Runtime API version (overrides the file and config)
        #[arg(long, value_parser = parse_api_version)]
        api_version: Option<ApiVersion>,

        /// Integration configurations (JSON or YAML)
        #[arg(long)]
        integrations: Option<PathBuf>,

        /// Include rendered arguments and outputs in trace logs
        #[arg(long)]
        log_values: bool,

        /// Skip input schema validation
        #[arg(long)]
        no_validate: bool,
    },

    /// Check that a pipeline file parses and only uses known bricks
    Check {
        /// Pipeline definition (JSON or YAML)
        file: PathBuf,
    },

    /// List the built-in bricks
    Bricks,

    /// Show version information
    Version,
}

fn parse_api_version(raw: &str) -> Result<ApiVersion, String> {
    raw.parse::<ApiVersion>().map_err(|err| err.to_string())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let cli_options = match &cli.command {
        Commands::Run {
            api_version,
            log_values,
            no_validate,
            ..
        } => CliOptions {
            api_version: *api_version,
            validate_input: if *no_validate { Some(false) } else { None },
            log_values: if *log_values { Some(true) } else { None },
            log_level: if cli.debug { Some("debug".to_string()) } else { None },
            ..Default::default()
        },
        _ => CliOptions {
            log_level: if cli.debug { Some("debug".to_string()) } else { None },
            ..Default::default()
        },
    };

    let config = load_runtime_config(cli.config.as_deref(), cli_options)?;
    init_tracing(&config, cli.debug);

    let result = match cli.command {
        Commands::Run {
            file,
            input,
            api_version,
            integrations,
            ..
        } => handle_run(&config, &file, input.as_deref(), api_version, integrations.as_deref()).await,
        Commands::Check { file } => handle_check(&file),
        Commands::Bricks => {
            handle_bricks();
            Ok(true)
        }
        Commands::Version => {
            println!("brickrun {}", VERSION);
            Ok(true)
        }
    };

    if cli.trace {
        eprintln!("{}", GLOBAL_METRICS.snapshot().format_report());
    }

    match result {
        Ok(true) => Ok(()),
        Ok(false) => std::process::exit(1),
        Err(err) => Err(err),
    }
}

fn load_runtime_config(path: Option<&Path>, cli_options: CliOptions) -> anyhow::Result<RuntimeConfig> {
    match path {
        Some(path) => {
            let global = config::load_global_config()?;
            let workspace = config::load_config_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?;
            Ok(config::merge_config(global, Some(workspace), cli_options))
        }
        None => {
            let cwd = std::env::current_dir()?;
            let workspace_root = config::find_workspace_root(&cwd).unwrap_or(cwd);
            Ok(config::load_config(&workspace_root, cli_options)?)
        }
    }
}

fn init_tracing(config: &RuntimeConfig, debug: bool) {
    let telemetry = TelemetryConfig::for_runtime(config, debug);
    // A subscriber installed earlier (e.g. by a test harness) wins.
    let _ = init_telemetry(&telemetry);
}

fn load_definition(file: &Path) -> anyhow::Result<PipelineDefinition> {
    config::load_pipeline_definition(file)
        .with_context(|| format!("Failed to load pipeline {}", file.display()))
}

/// Run a pipeline; `Ok(false)` means the pipeline failed and was reported.
async fn handle_run(
    config: &RuntimeConfig,
    file: &Path,
    input: Option<&str>,
    cli_version: Option<ApiVersion>,
    integrations: Option<&Path>,
) -> anyhow::Result<bool> {
    let definition = load_definition(file)?;

    let input: Value = match input {
        Some(raw) => serde_json::from_str(raw).context("--input is not valid JSON")?,
        None => definition.input.clone(),
    };

    let locator = match integrations {
        Some(path) => InMemoryIntegrationLocator::from_file(path)
            .with_context(|| format!("Failed to load integrations {}", path.display()))?,
        None => InMemoryIntegrationLocator::new(),
    };

    // Precedence: command line, then the pipeline file, then configuration.
    let api_version = cli_version
        .or(definition.api_version)
        .unwrap_or(config.api_version);

    let mut options = ReduceOptions::from_config(config);
    options.api_version = api_version;

    let registry = Arc::new(InMemoryBrickRegistry::with_builtins());
    let reducer = PipelineReducer::new(registry).with_config(config);

    let outcome: RuntimeResult<Value> = async {
        let service_context = build_integration_context(&definition.integrations, &locator).await?;
        let initial = InitialValues::new(input)
            .with_options(definition.options.clone())
            .with_service_context(service_context);
        reducer
            .reduce_pipeline(&definition.pipeline, initial, options)
            .await
    }
    .await;

    match outcome {
        Ok(output) => {
            println!("{}", serde_json::to_string_pretty(&output)?);
            Ok(true)
        }
        Err(err) => {
            eprintln!("{} {}", "✗".red(), err.to_string().red());
            let serialized = SerializedError::from(&err);
            println!("{}", serde_json::to_string_pretty(&serialized)?);
            Ok(false)
        }
    }
}

fn handle_check(file: &Path) -> anyhow::Result<bool> {
    let definition = match load_definition(file) {
        Ok(definition) => definition,
        Err(err) => {
            eprintln!("{} {:#}", "✗".red(), err);
            return Ok(false);
        }
    };

    let registry = InMemoryBrickRegistry::with_builtins();
    let unknown: Vec<String> = collect_brick_ids(&definition.pipeline)
        .into_iter()
        .filter(|id| !registry.contains(id))
        .collect();

    if unknown.is_empty() {
        println!(
            "{} {} ({} steps)",
            "✓".green(),
            file.display(),
            definition.pipeline.len()
        );
        return Ok(true);
    }

    for id in &unknown {
        eprintln!("{} Unknown brick: {}", "✗".red(), id.bright_white());
    }
    Ok(false)
}

fn handle_bricks() {
    let registry = InMemoryBrickRegistry::with_builtins();
    println!("{}", "Built-in bricks".bright_blue().bold());
    for definition in registry.definitions() {
        println!(
            "  {} {} - {}",
            definition.id.bright_white(),
            format!("[{}]", definition.kind).dimmed(),
            definition.name
        );
    }
}
