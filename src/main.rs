use clap::Parser;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use ugc_studio::cli::{self, App, Args};
use ugc_studio::config::Config;

fn load_env() {
    // Load .env file, don't override existing env vars
    // dotenv::dotenv() returns Err if .env doesn't exist, which is fine
    let _ = dotenv::dotenv();
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    // Logs go to stderr so command output stays pipeable
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn run(args: Args) -> Result<(), String> {
    let config_path = cli::config_path(args.config.clone());

    // If --config is specified, require the file to exist
    let config = if args.config.is_some() {
        if !config_path.exists() {
            return Err(format!("Config file not found: {}", config_path.display()));
        }
        Config::load(Some(&config_path)).map_err(|e| e.to_string())?
    } else {
        Config::load(None).map_err(|e| e.to_string())?
    };

    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to create async runtime: {}", e))?;

    rt.block_on(async {
        let mut app = App::open(config, config_path).map_err(|e| e.to_string())?;
        cli::run(&mut app, args.command)
            .await
            .map_err(|e| e.to_string())
    })
}

fn main() {
    // Load .env file before anything else
    load_env();

    let args = Args::parse();
    init_logging(&args.log_level);

    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
