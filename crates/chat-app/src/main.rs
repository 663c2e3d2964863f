//! forfore server binary.
//!
//! Logging: `RUST_LOG` overrides the default `info` filter (e.g. `RUST_LOG=forfore=debug`).

mod cli;

use clap::Parser;
use forfore::error::{ServerError, SettingsSnafu};
use forfore::server::run_http;
use forfore::settings::SettingsStore;
use snafu::ResultExt;
use tracing_subscriber::EnvFilter;

use crate::cli::{Cli, Command, Overrides};

#[snafu::report]
#[tokio::main]
async fn main() -> Result<(), ServerError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let store = SettingsStore::load(cli.config).context(SettingsSnafu {
        stage: "load-settings",
    })?;

    match cli.command.unwrap_or(Command::Serve(Overrides::default())) {
        Command::Serve(overrides) => {
            store.update(overrides.apply(store.settings().as_ref().clone()));
            run_http(store.settings()).await
        }
        Command::WriteConfig(overrides) => {
            store.update(overrides.apply(store.settings().as_ref().clone()));
            store.persist().context(SettingsSnafu {
                stage: "write-settings",
            })?;
            tracing::info!(path = ?store.config_path(), "settings written");
            Ok(())
        }
    }
}
