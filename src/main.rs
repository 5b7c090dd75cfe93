//! sql-sandbox - admission control and bounded execution for ad-hoc SQL.

mod cli;
mod logging;

use std::sync::Arc;
use std::time::Duration;

use cli::{Cli, Command};
use serde::Serialize;
use sql_sandbox::config::Config;
use sql_sandbox::db::{self, DatabaseClient};
use sql_sandbox::error::{Result, SandboxError};
use sql_sandbox::generator::{GenerationState, SampleDataGenerator};
use sql_sandbox::persistence::{HistoryStore, StateDb};
use sql_sandbox::query::{Caller, QueryExecutor, SandboxService, WorkerPool};
use sql_sandbox::safety::{SqlValidator, TableAllowList};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // A missing .env is fine.
    let _ = dotenvy::dotenv();

    let cli = Cli::parse_args();
    if cli.log_file {
        logging::init_file_logging();
    } else {
        logging::init_stderr_logging();
    }

    if let Err(e) = run(cli).await {
        error!("{}: {}", e.category(), e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config_path = cli.config_path();
    info!("Loading config from: {}", config_path.display());
    let mut config = Config::load(Some(config_path.as_path()))?;
    cli.apply_to(&mut config)?;
    config.validate()?;

    let caller = Caller::new(cli.user_id, cli.privilege());

    match &cli.command {
        Command::History { limit, offset } => {
            let store = open_history(&config).await?;
            let entries = store.list(caller.user_id, *limit, *offset).await?;
            print_json(&entries)
        }
        Command::Generate { .. } => {
            if !caller.privilege.is_admin() {
                return Err(SandboxError::invalid_request(
                    "Data generation requires admin privileges",
                ));
            }
            let request = cli
                .command
                .generation_request()
                .ok_or_else(|| SandboxError::internal("generate without a request"))?;

            let db = connect(&config).await?;
            let generator = SampleDataGenerator::new(Arc::clone(&db), GenerationState::new());
            let report = generator.generate(request).await;
            db.close().await?;
            print_json(&report?)
        }
        Command::Query { sql } => {
            let service = build_service(&config).await?;
            let result = service.execute_query(sql, caller).await;
            service.shutdown().await?;
            print_json(&result)
        }
        Command::Explain { sql } => {
            let service = build_service(&config).await?;
            let result = service.explain_only(sql, caller).await;
            service.shutdown().await?;
            print_json(&result)
        }
        Command::Compare { sqls } => {
            let service = build_service(&config).await?;
            let results = service.compare_queries(sqls.as_slice(), caller).await;
            service.shutdown().await?;
            print_json(&results?)
        }
    }
}

async fn connect(config: &Config) -> Result<Arc<dyn DatabaseClient>> {
    info!("Connecting to {}", config.database.display_string());
    db::connect(&config.database).await
}

async fn open_history(config: &Config) -> Result<HistoryStore> {
    let state_db = match &config.history.path {
        Some(path) => StateDb::open(path).await?,
        None => StateDb::open_default().await?,
    };
    Ok(HistoryStore::new(Arc::new(state_db)).with_keep_per_user(config.history.keep_per_user))
}

async fn build_service(config: &Config) -> Result<SandboxService> {
    let db = connect(config).await?;
    let validator = SqlValidator::new(
        config.sandbox.max_rows,
        TableAllowList::new(&config.sandbox.allowed_tables),
    );
    let executor = QueryExecutor::new(
        db,
        validator,
        WorkerPool::new(config.sandbox.workers),
        Duration::from_secs(config.sandbox.timeout_secs),
    );

    let service = SandboxService::new(executor).with_max_compare(config.sandbox.max_compare);
    if !config.history.enabled {
        return Ok(service);
    }
    let store = open_history(config).await?;
    Ok(service.with_history(Arc::new(store)))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value)
        .map_err(|e| SandboxError::internal(format!("Failed to serialize output: {e}")))?;
    println!("{json}");
    Ok(())
}
