mod config;
mod host;
mod protocol;

use std::path::PathBuf;

use clap::Parser;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

use helm_mux::Multiplexer;
use helm_pty::ShellLauncher;

use config::Config;

/// Headless terminal multiplexer host.
///
/// Reads JSON-line requests on stdin and writes replies and session events
/// to stdout. Logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "helm", version, about)]
struct Args {
    /// Path to the config file (default: ~/.config/helm/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Shell to launch for new sessions, overriding the config file
    #[arg(short, long)]
    shell: Option<String>,

    /// Log filter, e.g. "debug" or "helm_mux=trace" (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,
}

fn init_logging(directive: Option<&str>) {
    let filter = match directive {
        Some(directive) => EnvFilter::new(directive),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let mut config = match Config::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("fatal: {e}");
            std::process::exit(1);
        }
    };
    if let Some(shell) = args.shell {
        config.shell.command = Some(shell);
    }

    init_logging(args.log_level.as_deref().or(config.log.level.as_deref()));

    let launcher = ShellLauncher::new(config.shell);
    log::info!("helm starting, shell: {}", launcher.resolve().display());

    let (mux, feed) = Multiplexer::start(launcher);
    let stop = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            log::warn!("failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    let result = host::serve(
        mux,
        feed,
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        stop,
    )
    .await;

    if let Err(e) = result {
        log::error!("host I/O failed: {e}");
        std::process::exit(1);
    }
    log::info!("helm stopped");
}
