//! Sieve query compiler CLI.
//!
//! Compiles a request against a JSON schema and prints the query descriptor,
//! optionally with the SQL it renders to.
//!
//! Usage:
//!   sieve compile User --schema schema.json --request request.json --include include.json --sql

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use tracing::info;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use sieve_engine::query::{DescriptorQueryBuilder, QueryCompiler, RequestQuery};
use sieve_engine::schema::{IncludeSpec, Schema};
use sieve_engine::EngineConfig;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Compile request parameters into a query descriptor.
    Compile {
        /// Root entity name.
        entity: String,

        /// Schema file (JSON).
        #[arg(long)]
        schema: PathBuf,

        /// Request parameters file (JSON object with filtered/sorted/page/pageSize).
        #[arg(long)]
        request: Option<PathBuf>,

        /// Include declarations file (JSON array).
        #[arg(long)]
        include: Option<PathBuf>,

        /// Also print the rendered row and count SQL.
        #[arg(long)]
        sql: bool,
    },
}

fn main() -> Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("failed to load configuration")?;
    info!(dialect = %config.dialect, "Configuration loaded");

    match cli.command {
        Command::Compile {
            entity,
            schema,
            request,
            include,
            sql,
        } => compile(&config, &entity, &schema, request.as_deref(), include.as_deref(), sql),
    }
}

fn compile(
    config: &EngineConfig,
    entity_name: &str,
    schema_path: &Path,
    request_path: Option<&Path>,
    include_path: Option<&Path>,
    sql: bool,
) -> Result<()> {
    let schema: Schema = read_json(schema_path)?;
    let entity = schema
        .entity(entity_name)
        .with_context(|| format!("entity '{entity_name}' is not in the schema"))?;

    let request: RequestQuery = match request_path {
        Some(path) => read_json(path)?,
        None => RequestQuery::default(),
    };
    let specs: Vec<IncludeSpec> = match include_path {
        Some(path) => read_json(path)?,
        None => Vec::new(),
    };
    let template = schema
        .resolve_includes(&specs)
        .context("failed to resolve includes")?;

    let compiler = QueryCompiler::new(config.clone());
    let descriptor = compiler
        .compile(&request, &entity, &template)
        .context("failed to compile query")?;

    println!("{}", serde_json::to_string_pretty(&descriptor)?);

    if sql {
        let builder = DescriptorQueryBuilder::new(&descriptor, &entity, config.dialect);
        println!("{}", builder.build().context("failed to render row query")?);
        println!("{}", builder.build_count().context("failed to render count query")?);
    }

    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("failed to parse {}", path.display()))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
