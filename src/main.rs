use anyhow::Context;
use openlab::{
    api::routes,
    cli::{
        init::{self, InitConfig, InitResult},
        output::Output,
        Cli, Commands,
    },
    AppState, DatabaseProvider, EntityStore, LabConfig, LabConfigManager, LabQueries,
    TaskScheduler,
};
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse_args();
    let output = if cli.no_color {
        Output::no_color()
    } else {
        Output::new()
    };

    match cli.command {
        Some(Commands::Init {
            path,
            force,
            host,
            port,
        }) => {
            let result = init::run(
                InitConfig {
                    path,
                    force,
                    host,
                    port,
                },
                &output,
            );
            match result {
                InitResult::Success | InitResult::AlreadyExists => Ok(()),
                InitResult::Error(e) => anyhow::bail!(e),
            }
        }
        Some(Commands::Config { full, validate }) => show_config(&cli.config, full, validate, &output),
        Some(Commands::Stats { project }) => {
            let manager = load_config(&cli.config)?;
            init_tracing(&manager.config(), cli.verbose);
            let store = open_store(&manager.config()).await?;
            let stats = LabQueries::new(store)
                .dashboard_stats(project.as_deref())
                .await?;
            output.dashboard(&stats);
            Ok(())
        }
        Some(Commands::Reclaim) => {
            let manager = Arc::new(load_config(&cli.config)?);
            init_tracing(&manager.config(), cli.verbose);
            let store = open_store(&manager.config()).await?;
            let reclaimed = TaskScheduler::new(store, manager).reclaim_expired().await?;
            output.success(&format!("Reclaimed {} task(s)", reclaimed.len()));
            for id in &reclaimed {
                output.list_item(id);
            }
            Ok(())
        }
        Some(Commands::Serve { host, port }) => serve(&cli.config, host, port, cli.verbose).await,
        None => serve(&cli.config, None, None, cli.verbose).await,
    }
}

fn load_config(path: &Path) -> anyhow::Result<LabConfigManager> {
    if path.exists() {
        LabConfigManager::new(path)
            .with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(LabConfigManager::from_config(LabConfig::default()))
    }
}

fn init_tracing(config: &LabConfig, verbose: bool) {
    let default_level = if verbose {
        "debug".to_string()
    } else {
        config.server.log_level.clone()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let registry = tracing_subscriber::registry().with(filter);
    if config.server.log_json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn open_store(config: &LabConfig) -> anyhow::Result<Arc<EntityStore>> {
    let provider = DatabaseProvider::from_config(&config.database);
    let store = provider
        .open()
        .await
        .with_context(|| format!("failed to open database {:?}", provider))?;
    Ok(Arc::new(store))
}

fn show_config(path: &Path, full: bool, validate: bool, output: &Output) -> anyhow::Result<()> {
    output.header("Configuration");
    output.kv("file", &path.display().to_string());

    let config = match LabConfig::load(path) {
        Ok(config) => {
            if validate {
                output.success("Configuration is valid");
            }
            config
        }
        Err(openlab::utils::toml_config::ConfigError::FileNotFound(_)) if !validate => {
            output.warning("File not found, showing defaults");
            LabConfig::default()
        }
        Err(e) => {
            output.error(&e.to_string());
            anyhow::bail!(e);
        }
    };

    output.kv("server", &format!("{}:{}", config.server.host, config.server.port));
    output.kv("database", &config.database.url);
    output.kv("lease", &format!("{}s", config.scheduler.lease_secs));

    if full {
        output.newline();
        println!("{}", config.to_toml_string()?);
    }
    Ok(())
}

async fn serve(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    verbose: bool,
) -> anyhow::Result<()> {
    let manager = Arc::new(load_config(config_path)?);
    let config = manager.config();
    init_tracing(&config, verbose);

    if config_path.exists() {
        if let Err(e) = manager.start_watching() {
            tracing::warn!(error = %e, "config hot reload disabled");
        }
    } else {
        tracing::warn!(path = %config_path.display(), "no configuration file, using defaults");
    }

    let store = open_store(&config).await?;
    let state = AppState::new(store, Arc::clone(&manager));

    // Release anything left over from a previous run before taking claims.
    let reclaimed = state.scheduler.reclaim_expired().await?;
    if !reclaimed.is_empty() {
        tracing::info!(count = reclaimed.len(), "reclaimed expired tasks on startup");
    }

    let app = routes::app(state);
    let addr = format!(
        "{}:{}",
        host.unwrap_or_else(|| config.server.host.clone()),
        port.unwrap_or(config.server.port)
    );
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    tracing::info!("OpenLab listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("shutting down");
        })
        .await?;

    manager.stop_watching();
    Ok(())
}
