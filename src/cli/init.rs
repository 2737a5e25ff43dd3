//! Init command implementation
//!
//! Scaffolds an OpenLab deployment: `openlab.toml`, the data directory,
//! `.env.example` and a `.gitignore`.

use super::output::Output;
use crate::utils::toml_config::LabConfig;
use std::fs;
use std::path::Path;

/// Result of the init operation
pub enum InitResult {
    /// Initialization completed successfully
    Success,
    /// openlab.toml already exists
    AlreadyExists,
    /// An error occurred during initialization
    Error(String),
}

/// Configuration for the init command
pub struct InitConfig {
    /// Directory to initialize
    pub path: std::path::PathBuf,
    /// Overwrite existing files
    pub force: bool,
    /// Host address for the server
    pub host: String,
    /// Port for the server
    pub port: u16,
}

/// Run the init command
pub fn run(config: InitConfig, output: &Output) -> InitResult {
    output.banner();
    output.header("Initializing OpenLab");

    let base_path = &config.path;

    let config_path = base_path.join("openlab.toml");
    if config_path.exists() && !config.force {
        output.warning("openlab.toml already exists!");
        output.hint("Use --force to overwrite existing files");
        return InitResult::AlreadyExists;
    }

    output.subheader("Creating directories");

    let data_dir = base_path.join("data");
    if !data_dir.exists() {
        if let Err(e) = fs::create_dir_all(&data_dir) {
            output.error(&format!("Failed to create data: {}", e));
            return InitResult::Error(e.to_string());
        }
        output.created_dir("data");
    } else {
        output.skipped("data", "already exists");
    }

    output.subheader("Creating configuration files");

    let toml_content = generate_openlab_toml(&config);
    if let Err(e) = write_file(&config_path, &toml_content, config.force) {
        output.error(&format!("Failed to create openlab.toml: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("config", "openlab.toml");

    let env_example_path = base_path.join(".env.example");
    if let Err(e) = write_file(&env_example_path, ENV_EXAMPLE, config.force) {
        output.error(&format!("Failed to create .env.example: {}", e));
        return InitResult::Error(e.to_string());
    }
    output.created("env", ".env.example");

    let gitignore_path = base_path.join(".gitignore");
    if !gitignore_path.exists() {
        if let Err(e) = write_file(&gitignore_path, GITIGNORE, false) {
            output.warning(&format!("Failed to create .gitignore: {}", e));
        } else {
            output.created("file", ".gitignore");
        }
    }

    output.complete("OpenLab initialized successfully!");

    output.header("Next Steps");
    output.newline();
    output.info("1. Review the scheduler and context settings:");
    output.command("openlab-server config --full");
    output.newline();
    output.info("2. Start the server:");
    output.command("openlab-server");
    output.newline();

    output.hint(&format!(
        "Workers connect to http://{}:{}/api",
        config.host, config.port
    ));

    InitResult::Success
}

fn write_file(path: &Path, content: &str, force: bool) -> std::io::Result<()> {
    if path.exists() && !force {
        return Ok(());
    }
    fs::write(path, content)
}

fn generate_openlab_toml(config: &InitConfig) -> String {
    let defaults = LabConfig::default();
    let scheduler = &defaults.scheduler;
    let context = &defaults.context;
    let worker = &defaults.worker;

    format!(
        r#"# OpenLab configuration
# Every section is optional. Edits are picked up while the server runs.

[server]
host = "{host}"
port = {port}
# Default log filter when RUST_LOG is unset
log_level = "info"
log_json = false

[database]
# Local SQLite file, or ":memory:"
url = "{db}"
# Remote Turso (build with --features turso)
# turso_url_env = "TURSO_DATABASE_URL"
# turso_token_env = "TURSO_AUTH_TOKEN"

[scheduler]
# Lower is more urgent
verify_priority = {verify}
hypothesis_priority = {hypothesis}
re_research_priority = {re_research}
research_priority = {research}
# Seconds a claim stays valid without a heartbeat (0 disables leases)
lease_secs = {lease}
max_claim_retries = {retries}

[context]
l1_limit = {l1}
l0_limit = {l0}
dead_end_limit = {dead_ends}

[worker]
idle_wait_secs = {idle}
error_backoff_secs = {backoff}
"#,
        host = config.host,
        port = config.port,
        db = defaults.database.url,
        verify = scheduler.verify_priority,
        hypothesis = scheduler.hypothesis_priority,
        re_research = scheduler.re_research_priority,
        research = scheduler.research_priority,
        lease = scheduler.lease_secs,
        retries = scheduler.max_claim_retries,
        l1 = context.l1_limit,
        l0 = context.l0_limit,
        dead_ends = context.dead_end_limit,
        idle = worker.idle_wait_secs,
        backoff = worker.error_backoff_secs,
    )
}

const ENV_EXAMPLE: &str = r#"# OpenLab environment
# Log filter, overrides server.log_level
RUST_LOG=info

# Remote database (only with --features turso)
# TURSO_DATABASE_URL=libsql://your-db.turso.io
# TURSO_AUTH_TOKEN=
"#;

const GITIGNORE: &str = r#"# OpenLab
.env
data/
*.db
*.db-shm
*.db-wal
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_config(temp_dir: &TempDir) -> InitConfig {
        InitConfig {
            path: temp_dir.path().to_path_buf(),
            force: false,
            host: "127.0.0.1".to_string(),
            port: 3000,
        }
    }

    #[test]
    fn test_generated_toml_parses_back() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = create_test_config(&temp_dir);
        config.port = 4100;

        let content = generate_openlab_toml(&config);
        let parsed: LabConfig = toml::from_str(&content).unwrap();

        assert_eq!(parsed.server.port, 4100);
        assert_eq!(parsed.scheduler.verify_priority, 1);
        assert_eq!(parsed.context.l0_limit, 50);
        parsed.validate().unwrap();
    }

    #[test]
    fn test_run_creates_files() {
        let temp_dir = TempDir::new().unwrap();
        let config = create_test_config(&temp_dir);

        let result = run(config, &Output::no_color());

        assert!(matches!(result, InitResult::Success));
        assert!(temp_dir.path().join("openlab.toml").exists());
        assert!(temp_dir.path().join(".env.example").exists());
        assert!(temp_dir.path().join(".gitignore").exists());
        assert!(temp_dir.path().join("data").is_dir());
    }

    #[test]
    fn test_run_refuses_to_overwrite_without_force() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("openlab.toml"), "# mine").unwrap();

        let result = run(create_test_config(&temp_dir), &Output::no_color());
        assert!(matches!(result, InitResult::AlreadyExists));
        assert_eq!(
            fs::read_to_string(temp_dir.path().join("openlab.toml")).unwrap(),
            "# mine"
        );

        let mut forced = create_test_config(&temp_dir);
        forced.force = true;
        assert!(matches!(run(forced, &Output::no_color()), InitResult::Success));
        assert!(fs::read_to_string(temp_dir.path().join("openlab.toml"))
            .unwrap()
            .contains("[scheduler]"));
    }
}
