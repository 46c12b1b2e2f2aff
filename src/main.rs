use std::error::Error;
use std::fs::File;

use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, ConfigBuilder, LevelFilter, TermLogger, TerminalMode, WriteLogger};
use wayfarer::Provider;
use wayfarer::client::repl::Repl;
use wayfarer::client::{DEFAULT_SERVER_URL, HttpTransport};
use wayfarer::core::config::{self, CliOverrides, WayfarerConfig};
use wayfarer::core::local_store::LocalStore;
use wayfarer::inference::build_provider;
use wayfarer::server::{self, AppState};

#[derive(Parser)]
#[command(name = "wayfarer", about = "Travel assistant chat: streaming proxy and terminal client")]
struct Args {
    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the chat proxy server
    Serve {
        /// Address to listen on (default 127.0.0.1:3000)
        #[arg(long)]
        addr: Option<String>,
        /// Completion provider
        #[arg(short, long, value_enum)]
        provider: Option<Provider>,
    },
    /// Chat with a running server from the terminal
    Chat {
        /// Server root URL
        #[arg(long, default_value = DEFAULT_SERVER_URL)]
        url: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    dotenv::dotenv().ok();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    let log_config = ConfigBuilder::new().set_time_format_rfc3339().build();

    let file_config = config::load_config().unwrap_or_else(|e| {
        eprintln!("Ignoring unreadable config file: {e}");
        WayfarerConfig::default()
    });

    match args.command {
        Command::Serve { addr, provider } => {
            let _ = TermLogger::init(level, log_config, TerminalMode::Mixed, ColorChoice::Auto);

            let cli = CliOverrides {
                provider: provider.map(|p| p.selector().to_string()),
                listen_addr: addr,
            };
            let resolved = config::resolve(&file_config, &cli);
            log::info!(
                "Wayfarer starting: provider={}, model={}, max_duration={:?}",
                resolved.provider.label(),
                resolved.model_name,
                resolved.max_duration
            );

            let state = AppState::from_config(&resolved, build_provider(&resolved))?;
            server::serve(&resolved.listen_addr, state).await?;
        }
        Command::Chat { url } => {
            // Stdout belongs to the conversation; log to a file instead.
            if let Ok(log_file) = File::create("wayfarer.log") {
                let _ = WriteLogger::init(level, log_config, log_file);
            }

            let resolved = config::resolve(&file_config, &CliOverrides::default());
            let local = LocalStore::new(resolved.data_dir.join("local"));
            log::info!("Wayfarer chat starting against {}", url);

            let mut repl = Repl::new(HttpTransport::new(&url), local);
            repl.run().await?;
        }
    }

    Ok(())
}
