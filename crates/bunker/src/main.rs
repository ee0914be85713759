use clap::{Parser, Subcommand};

mod commands;
mod config;
mod logging;
mod observer;
mod output;
#[cfg(test)]
mod test_relay;
mod ws;

use output::Output;

#[derive(Parser)]
#[command(name = "bunker")]
#[command(version)]
#[command(about = "NIP-46 remote signer")]
#[command(long_about = "Holds a Nostr key and signs, encrypts and decrypts for paired clients over a relay.\n\nPair a client with the bunker:// URI printed by `bunker run`.")]
struct Cli {
    /// Output in JSON format (for agents/scripts)
    #[arg(short, long, global = true)]
    json: bool,

    /// Data directory (default: platform data dir/bunker)
    #[arg(long, global = true, env = "BUNKER_DATA_DIR")]
    data_dir: Option<std::path::PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to the relay and serve signing requests
    Run,

    /// Show keys, relay and the pairing URI prefix
    Uri,

    /// Set the user key that signs for clients
    SetKey {
        /// Private key (nsec or hex)
        key: String,
    },

    /// Set the relay URL
    SetRelay {
        /// ws:// or wss:// URL
        url: String,
    },

    /// Authorized client management
    #[command(subcommand)]
    Clients(ClientCommands),
}

#[derive(Subcommand)]
enum ClientCommands {
    /// List authorized clients
    List,

    /// Remove all authorized clients
    Clear,
}

#[tokio::main]
async fn main() {
    logging::init_logging();
    let cli = Cli::parse();
    let output = Output::new(cli.json);

    let result = run(cli, &output).await;

    if let Err(e) = result {
        output.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}

async fn run(cli: Cli, output: &Output) -> anyhow::Result<()> {
    let data_dir = match cli.data_dir {
        Some(dir) => dir,
        None => dirs::data_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not find data directory"))?
            .join("bunker"),
    };

    std::fs::create_dir_all(&data_dir)?;

    let config = config::Config::load(&data_dir)?;
    if !config.path.exists() {
        config.save()?;
    }

    match cli.command {
        Commands::Run => commands::run::run(&config, &data_dir, output).await,
        Commands::Uri => commands::keys::uri(&data_dir, output),
        Commands::SetKey { key } => commands::keys::set_key(&key, &data_dir, output),
        Commands::SetRelay { url } => commands::keys::set_relay(&url, &data_dir, output),
        Commands::Clients(ClientCommands::List) => commands::clients::list(&data_dir, output),
        Commands::Clients(ClientCommands::Clear) => commands::clients::clear(&data_dir, output),
    }
}
