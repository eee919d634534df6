use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod dates;
mod search;

#[derive(Debug, Parser)]
#[command(name = "yardsale-cli")]
#[command(about = "Search nearby yard sales from the command line")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run one search session and print the visible sales
    Search(search::SearchArgs),
    /// Show how each date preset resolves today
    Dates,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    match cli.command {
        Commands::Search(args) => {
            let config = yardsale_core::load_app_config()?;
            let env_filter = EnvFilter::try_from_default_env()
                .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
            tracing_subscriber::fmt().with_env_filter(env_filter).init();
            tracing::debug!(?config, "configuration loaded");
            search::run_search(&config, &args).await
        }
        Commands::Dates => {
            tracing_subscriber::fmt()
                .with_env_filter(EnvFilter::from_default_env())
                .init();
            dates::print_presets(chrono::Local::now().date_naive());
            Ok(())
        }
    }
}
