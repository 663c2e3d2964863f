use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use forfore::settings::ServerSettings;
use forfore_llm::MaxNewTokens;

#[derive(Parser)]
#[command(name = "forfore")]
#[command(about = "Vision-language chat and job board for foreign residents, served over HTTP.")]
pub(crate) struct Cli {
    /// Settings file (default: <config dir>/forfore/settings.json).
    #[arg(long, global = true)]
    pub(crate) config: Option<PathBuf>,

    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the HTTP server (the default when no subcommand is given).
    Serve(Overrides),
    /// Write the effective settings (file, environment and flags) back to the settings file.
    WriteConfig(Overrides),
}

/// Flags that take precedence over the settings file and `FORFORE_*` variables.
#[derive(Args, Debug, Default)]
pub(crate) struct Overrides {
    /// Listen address (e.g. 127.0.0.1:8501).
    #[arg(long)]
    pub(crate) bind: Option<String>,

    /// Base URL of the model backend.
    #[arg(long)]
    pub(crate) endpoint: Option<String>,

    /// Model identifier new sessions start with.
    #[arg(long)]
    pub(crate) model: Option<String>,

    /// Reply ceiling new sessions start with (multiple of 64 within 64..=1024).
    #[arg(long, value_parser = parse_max_new_tokens)]
    pub(crate) max_new_tokens: Option<MaxNewTokens>,

    /// Pull models the backend does not have yet.
    #[arg(long)]
    pub(crate) pull_missing: bool,

    /// Load the default model before accepting connections.
    #[arg(long)]
    pub(crate) preload: bool,
}

impl Overrides {
    pub(crate) fn apply(self, mut settings: ServerSettings) -> ServerSettings {
        if let Some(bind) = self.bind {
            settings.bind_address = bind;
        }
        if let Some(endpoint) = self.endpoint {
            settings.backend_endpoint = endpoint;
        }
        if let Some(model) = self.model {
            settings.default_model_id = model;
        }
        if let Some(max_new_tokens) = self.max_new_tokens {
            settings.default_max_new_tokens = max_new_tokens;
        }
        settings.pull_missing |= self.pull_missing;
        settings.preload_default_model |= self.preload;
        settings
    }
}

fn parse_max_new_tokens(raw: &str) -> Result<MaxNewTokens, String> {
    let value = raw
        .trim()
        .parse::<u32>()
        .map_err(|error| format!("expected a number: {error}"))?;
    MaxNewTokens::new(value).map_err(|error| error.to_string())
}
