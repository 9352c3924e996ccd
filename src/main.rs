use clap::Parser;
use tracing_subscriber::EnvFilter;
use tracksync::cli::{handle_run, handle_status, load_config, Cli, Commands};

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    let result = load_config(cli.config.as_deref()).and_then(|config| match cli.command {
        Commands::Run { cloud_dir } => handle_run(config, cloud_dir),
        Commands::Status { json } => handle_status(config, json),
    });

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
