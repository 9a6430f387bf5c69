// Schema-Browser: a PostgreSQL session and schema browser
//
// This is the main entry point for the Schema-Browser application.

use anyhow::Result;
use schema_browser::cli::Repl;
use schema_browser::config::{Settings, TomlProfileStore};
use schema_browser::database::PostgresDriver;
use schema_browser::workspace::create_shared_workspace;
use std::sync::Arc;
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Note: using default settings ({})", e);
            Settings::default()
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.log_filter))?;
    fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "starting schema-browser");

    // First run: write the defaults so there is a file to edit.
    if let Ok(path) = Settings::config_file() {
        if !path.exists() {
            if let Err(e) = settings.save() {
                tracing::warn!(error = %e, "could not write default settings");
            }
        }
    }

    let driver = Arc::new(PostgresDriver::from_settings(&settings));
    let workspace = create_shared_workspace(driver, &settings);
    let store = Arc::new(TomlProfileStore::with_default_path()?);

    let mut repl = Repl::new(workspace, store, &settings)?;
    repl.run().await?;

    Ok(())
}
