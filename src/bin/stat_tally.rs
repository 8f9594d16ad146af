//! CLI tool for querying entity statistics over a YAML dataset
//!
//! Usage:
//!   cargo run --bin stat_tally -- definitions
//!   cargo run --bin stat_tally -- related 2
//!   cargo run --bin stat_tally -- tally 1 COUNT_DISTINCT_VALUES --scope-kind ORG_UNIT --scope-id 1
//!   cargo run --bin stat_tally -- tallies 1 2 3 --scope-kind ORG_UNIT --scope-id 1 --entity-kind APPLICATION

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

use entity_stats::core::{
    EntityKind, EntityReference, EntityStatisticService, HierarchyQueryScope, IdSelectionOptions,
};
use entity_stats::dataset::Dataset;
use entity_stats::{load_config, telemetry};

#[derive(Parser)]
#[command(name = "stat_tally")]
#[command(about = "Query entity statistic definitions, values and tallies")]
struct Cli {
    /// Dataset YAML with definitions, hierarchy edges and values
    #[arg(short = 'd', long, default_value = "config/sample_dataset.yaml")]
    dataset: PathBuf,

    /// Configuration file (defaults to $ENTITY_STATS_CONFIG or config/entity_stats.yaml)
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List active statistic definitions
    Definitions,
    /// Show one statistic definition
    Definition { id: i64 },
    /// Show a definition with its parent and children
    Related { stat_id: i64 },
    /// Raw values recorded against a selection
    Values {
        stat_id: i64,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Per-node tallies for one statistic and rollup kind
    Tally {
        stat_id: i64,
        rollup_kind: String,
        #[command(flatten)]
        selection: SelectionArgs,
    },
    /// Selection-wide tallies for several statistics
    Tallies {
        #[arg(required = true)]
        stat_ids: Vec<i64>,
        #[command(flatten)]
        selection: SelectionArgs,
    },
}

#[derive(Args)]
struct SelectionArgs {
    /// Entity kind of the selection scope
    #[arg(long, default_value = "ORG_UNIT")]
    scope_kind: EntityKind,

    /// Entity id of the selection scope
    #[arg(long)]
    scope_id: i64,

    /// Traversal direction: EXACT, CHILDREN or PARENTS
    #[arg(long, default_value = "CHILDREN")]
    direction: HierarchyQueryScope,

    /// Only count entities of this kind
    #[arg(long)]
    entity_kind: Option<EntityKind>,
}

impl SelectionArgs {
    fn options(&self) -> IdSelectionOptions {
        IdSelectionOptions {
            scope: EntityReference::new(self.scope_kind, self.scope_id),
            scope_direction: self.direction,
            entity_kind: self.entity_kind,
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

async fn run(service: &EntityStatisticService, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Definitions => print_json(&service.find_all_active_definitions().await?),
        Command::Definition { id } => print_json(&service.get_definition_by_id(id).await?),
        Command::Related { stat_id } => {
            print_json(&service.find_related_stat_definitions(stat_id).await?)
        }
        Command::Values { stat_id, selection } => print_json(
            &service
                .get_statistic_values_for_app_id_selector(stat_id, &selection.options())
                .await?,
        ),
        Command::Tally {
            stat_id,
            rollup_kind,
            selection,
        } => print_json(
            &service
                .calculate_stat_tally(stat_id, &rollup_kind, &selection.options())
                .await?,
        ),
        Command::Tallies {
            stat_ids,
            selection,
        } => print_json(
            &service
                .find_stat_tallies(&stat_ids, &selection.options())
                .await?,
        ),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    telemetry::init_tracing();
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading configuration: {:#}", e);
            return ExitCode::FAILURE;
        }
    };

    let service = match Dataset::from_file(&cli.dataset).and_then(|d| d.into_service(&config)) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Error loading dataset {}: {}", cli.dataset.display(), e);
            return ExitCode::FAILURE;
        }
    };

    match run(&service, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
