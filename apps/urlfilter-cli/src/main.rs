use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use mimalloc::MiMalloc;
use runtime::{AppConfig, CliArgs};
use sea_orm::ConnectionTrait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use urlfilter_core::{
    AccessScope, DescribeBuilder, FilterSearch, PageRequest, Permission, Principal, QueryParams,
    QueryPlanner, SchemaRegistry, SecurityContext, UrlMapper,
};
use urlfilter_db::{build_select, connect, detect_backend, SeaOrmSearchRepository, SqlBuilder};

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

/// Compile URL query strings into SQL filters and run them
#[derive(Parser)]
#[command(name = "urlfilter-cli")]
#[command(about = "Compile URL query strings into SQL filters and run them")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Entity model file (overrides config)
    #[arg(long)]
    schema: Option<String>,

    /// Database DSN (overrides config)
    #[arg(long)]
    database_url: Option<String>,

    /// Print current configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log verbosity level (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show how a query string compiles, without touching the database
    Explain(QueryArgs),
    /// Run a query string against the configured database
    Search {
        #[command(flatten)]
        query: QueryArgs,

        /// SQL script executed before the search (fixtures, in-memory databases)
        #[arg(long)]
        seed: Option<PathBuf>,
    },
    /// Check configuration and entity model
    Check,
}

#[derive(Args)]
struct QueryArgs {
    /// Root entity to search
    #[arg(short, long)]
    entity: String,

    /// Raw query string, e.g. "f_name=Al&f_name_op=like&embedded=orders"
    #[arg(short, long, default_value = "")]
    query: String,

    /// Parameter naming convention (v1 or v2, overrides config)
    #[arg(long)]
    mapper: Option<UrlMapper>,

    /// Access rule applied to the request
    #[arg(long, default_value = "all")]
    rule: String,

    /// Id of the authenticated principal
    #[arg(long)]
    principal_id: Option<i64>,

    /// Username of the authenticated principal
    #[arg(long)]
    username: Option<String>,
}

impl QueryArgs {
    fn params(&self) -> QueryParams {
        url::form_urlencoded::parse(self.query.trim_start_matches('?').as_bytes())
            .into_owned()
            .collect()
    }

    fn access(&self) -> AccessScope {
        let security = match self.principal_id {
            Some(id) => SecurityContext::authenticated(Principal {
                id,
                username: self.username.clone().unwrap_or_default(),
            }),
            None => SecurityContext::anonymous(),
        };
        AccessScope::new(
            Permission::new(format!("{}:read", self.entity), self.rule.clone()),
            security,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let args = CliArgs {
        config: cli.config.as_ref().map(|p| p.to_string_lossy().to_string()),
        schema: cli.schema.clone(),
        database_url: cli.database_url.clone(),
        print_config: cli.print_config,
        verbose: cli.verbose,
    };

    let mut config = AppConfig::load_or_default(cli.config.as_deref())?;
    config.apply_cli_overrides(&args);

    let logging_config = config.logging.as_ref().cloned().unwrap_or_default();
    let base_dir = cli
        .config
        .as_deref()
        .map_or(Path::new("."), runtime::config::config_dir);
    runtime::init_logging_from_config(&logging_config, base_dir);
    tracing::info!("urlfilter-cli starting");

    if cli.print_config {
        println!("{}", config.to_yaml()?);
        return Ok(());
    }

    match cli.command.unwrap_or(Commands::Check) {
        Commands::Explain(query) => explain(config, query),
        Commands::Search { query, seed } => search(config, query, seed.as_deref()).await,
        Commands::Check => check_config(config),
    }
}

fn planner(
    config: &mut AppConfig,
    query: &QueryArgs,
) -> Result<(Arc<SchemaRegistry>, QueryPlanner)> {
    if let Some(mapper) = query.mapper {
        config.search.mapper = mapper;
    }
    let registry = Arc::new(config.load_schema()?);
    let planner = QueryPlanner::new(registry.clone(), config.search.clone());
    Ok((registry, planner))
}

fn explain(mut config: AppConfig, query: QueryArgs) -> Result<()> {
    let (_, planner) = planner(&mut config, &query)?;
    let params = query.params();
    let mapper = planner.settings().mapper;
    let access = query.access();

    println!("entity: {}", query.entity);
    println!("filters:");
    for f in mapper.decompose(&params) {
        println!("  {} {} {}", f.field(), f.operator, f.raw_value);
    }

    let mut describe = DescribeBuilder::new();
    let described = planner.plan(&query.entity, &params, mapper, &access, &mut describe)?;
    match &described.predicate {
        Some(expr) => println!("predicate: {expr}"),
        None => println!("predicate: (none)"),
    }

    let root = planner.registry().schema(&query.entity)?;
    let page = PageRequest::from_params(&params, planner.settings().limit_cfg())?;
    let mut sql = SqlBuilder::new();
    let compiled = planner.plan(&query.entity, &params, mapper, &access, &mut sql)?;
    let backend = detect_backend(&config.database.url)?;
    let select = build_select(root, compiled.predicate.as_ref(), page);
    println!("sql: {}", backend.build(&select));

    if compiled.graph.is_empty() {
        println!("graph: (none)");
    } else {
        println!("graph: {}", compiled.graph);
    }
    Ok(())
}

async fn search(mut config: AppConfig, query: QueryArgs, seed: Option<&Path>) -> Result<()> {
    let (registry, planner) = planner(&mut config, &query)?;

    let conn = connect(&config.database).await?;
    if let Some(path) = seed {
        let script = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read seed script '{}'", path.display()))?;
        conn.execute_unprepared(&script)
            .await
            .with_context(|| format!("Seed script '{}' failed", path.display()))?;
        tracing::info!(seed = %path.display(), "seed script applied");
    }

    let search = FilterSearch::new(SeaOrmSearchRepository::new(conn, registry), planner);
    match search.search(&query.entity, &query.params(), &query.access()).await {
        Ok(page) => {
            println!("{}", serde_json::to_string_pretty(&page)?);
            Ok(())
        }
        Err(e) => {
            let problem = e.to_problem(&format!("/{}", query.entity));
            eprintln!("{}", serde_json::to_string_pretty(&problem)?);
            bail!("search failed with status {}", problem.status)
        }
    }
}

fn check_config(config: AppConfig) -> Result<()> {
    tracing::info!("Checking configuration...");

    let registry = config.load_schema()?;
    detect_backend(&config.database.url)?;
    config.database.connect_options()?;

    println!("Configuration check passed");
    for schema in registry.entities() {
        println!("  entity {}", schema.name());
    }
    Ok(())
}
