//! CLI binary entry point for warehouse-etl

#[cfg(feature = "cli")]
mod backends;

#[cfg(feature = "cli")]
use clap::Parser;
#[cfg(feature = "cli")]
use std::path::PathBuf;
#[cfg(feature = "cli")]
use tracing_subscriber::EnvFilter;
#[cfg(feature = "cli")]
use warehouse_etl::config::{CONFIG_FILENAME, EtlConfig};
#[cfg(feature = "cli")]
use warehouse_etl::pipeline::{EXIT_FATAL, EXIT_SUCCESS, Orchestrator, RunSummary};
#[cfg(feature = "cli")]
use warehouse_etl::{EtlError, EtlResult, QueryCatalog, TransformContext};

#[cfg(feature = "cli")]
#[derive(Parser)]
#[command(name = "warehouse-etl")]
#[command(about = "Rebuild the star schema and load it into the warehouse")]
#[command(version)]
struct Cli {
    /// Configuration file
    #[arg(short, long, default_value = CONFIG_FILENAME)]
    config: PathBuf,
    /// Scratch directory for staged files (overrides the configuration)
    #[arg(long)]
    scratch_dir: Option<PathBuf>,
    /// Only process this entity (repeatable; catalog order is kept)
    #[arg(short, long = "entity")]
    entities: Vec<String>,
    /// Print the catalog and exit
    #[arg(long)]
    list: bool,
    /// Enable debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[cfg(feature = "cli")]
fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("warehouse_etl=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warehouse_etl=info"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[cfg(feature = "cli")]
fn print_catalog(catalog: &QueryCatalog) {
    for definition in catalog.iter() {
        let columns: Vec<String> = definition
            .output_columns()
            .iter()
            .map(|c| format!("{}:{}", c.name, c.data_type.bigquery_type()))
            .collect();
        println!(
            "{:<22} {:<9} {}",
            definition.name(),
            definition.kind().to_string(),
            columns.join(", ")
        );
    }
}

#[cfg(feature = "cli")]
fn print_summary(summary: &RunSummary) {
    for report in &summary.reports {
        println!(
            "{:<22} {} in {}ms",
            report.entity, report.outcome, report.duration_ms
        );
        if report.orphaned_rows() > 0 {
            println!(
                "{:<22} warning: {} rows reference missing dimension keys",
                "",
                report.orphaned_rows()
            );
        }
    }
    println!(
        "\nRun finished in {}ms: {} loaded, {} skipped, {} failed",
        summary.duration_ms,
        summary.loaded(),
        summary.skipped(),
        summary.failed()
    );
}

#[cfg(feature = "cli")]
fn load_config(cli: &Cli) -> EtlResult<EtlConfig> {
    let mut config = EtlConfig::load(&cli.config)?;
    if let Some(dir) = &cli.scratch_dir {
        config.staging.scratch_dir = dir.clone();
    }
    if !cli.entities.is_empty() {
        config.run.entities = cli.entities.clone();
    }
    Ok(config)
}

#[cfg(feature = "cli")]
fn select_catalog(config: &EtlConfig) -> EtlResult<QueryCatalog> {
    let catalog = QueryCatalog::builtin();
    if config.run.entities.is_empty() {
        Ok(catalog)
    } else {
        catalog.select(&config.run.entities)
    }
}

#[cfg(feature = "cli")]
async fn run(config: &EtlConfig, catalog: QueryCatalog) -> EtlResult<RunSummary> {
    let extractor = backends::connect_source(config).await?;
    let loader = backends::open_warehouse(config)?;
    let ctx = TransformContext::now(config.run.locale);

    let orchestrator = Orchestrator::new(
        catalog,
        Box::new(extractor),
        loader,
        config.staging.scratch_dir.clone(),
        ctx,
    );
    orchestrator.run().await
}

#[cfg(feature = "cli")]
fn execute(cli: &Cli) -> EtlResult<i32> {
    let config = load_config(cli)?;
    let catalog = select_catalog(&config)?;

    if cli.list {
        print_catalog(&catalog);
        return Ok(EXIT_SUCCESS);
    }
    config.validate()?;

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| EtlError::Config(format!("Failed to create runtime: {}", e)))?;

    let summary = rt.block_on(run(&config, catalog))?;
    print_summary(&summary);
    Ok(summary.exit_code(config.run.fail_on_partial))
}

#[cfg(feature = "cli")]
fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match execute(&cli) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            tracing::error!(kind = e.kind(), error = %e, "Run aborted");
            eprintln!("Error: {}", e);
            std::process::exit(EXIT_FATAL);
        }
    }
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature is not enabled. Build with --features cli");
    std::process::exit(1);
}
