pub mod breathing;
pub mod cli;
#[cfg(feature = "desktop")]
mod desktop;
pub mod settings;
pub mod utils;

use anyhow::Result;
use clap::Parser;

use cli::{Cli, Commands};

#[cfg(feature = "desktop")]
pub(crate) struct AppState {
    pub(crate) breathing: breathing::BreathingController,
    pub(crate) settings: settings::SettingsStore,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    utils::logging::init(cli.verbose);

    #[cfg(feature = "desktop")]
    {
        if matches!(cli.command, Commands::App) {
            desktop::run();
            return Ok(());
        }
    }

    let store = cli::open_settings(&cli)?;
    match cli.command {
        Commands::Start(args) => {
            let runtime = tokio::runtime::Runtime::new()?;
            runtime.block_on(cli::start(args, &store))
        }
        Commands::Patterns { json } => cli::patterns(&store, json),
        Commands::Settings(args) => cli::settings(args, &store),
        #[cfg(feature = "desktop")]
        Commands::App => Ok(()),
    }
}
