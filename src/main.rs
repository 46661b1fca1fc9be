use anyhow::Result;
use clap::{Parser, Subcommand};
use lockbox_cli::config::Config;
use lockbox_cli::console;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lockbox")]
#[command(author, version, about = "Lockbox - console client for the INTERLOCK file appliance", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Appliance URL (overrides the config file)
    #[arg(short, long, global = true)]
    url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Interactive console (default)
    Console {
        /// Accept the appliance's self-signed TLS certificate
        #[arg(long)]
        insecure: bool,
    },

    /// Print version and build information
    Version,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        "lockbox=debug,lockbox_cli=debug"
    } else {
        "lockbox=info,lockbox_cli=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let mut config = Config::load()?;
    if let Some(url) = cli.url {
        config.server.url = url;
    }

    match cli.command.unwrap_or(Commands::Console { insecure: false }) {
        Commands::Console { insecure } => {
            if insecure {
                config.server.accept_invalid_certs = true;
            }
            tracing::info!("starting console against {}", config.server.url);
            console::run(config).await?;
        }
        Commands::Version => {
            println!(
                "lockbox {}{}",
                env!("CARGO_PKG_VERSION"),
                env!("LOCKBOX_VERSION_SUFFIX")
            );
            println!("commit:  {}", env!("LOCKBOX_GIT_HASH"));
            println!("built:   {}", env!("LOCKBOX_BUILD_TIME"));
        }
    }

    Ok(())
}
