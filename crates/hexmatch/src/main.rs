//! `hexmatch-server` — the relay binary.
//!
//! ```text
//! hexmatch-server [--debug] [port]
//! ```

use std::process::ExitCode;

use hexmatch::{Server, ServerConfig, DEFAULT_PORT};
use tracing_subscriber::EnvFilter;

fn usage() {
    eprintln!("Usage: hexmatch-server [--debug] [port]");
    eprintln!();
    eprintln!("  --debug    log protocol traffic (default: lifecycle only)");
    eprintln!("  port       listen port (default: {DEFAULT_PORT})");
}

#[tokio::main]
async fn main() -> ExitCode {
    let mut debug = false;
    let mut port = DEFAULT_PORT;

    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--debug" | "-d" => debug = true,
            "--help" | "-h" => {
                usage();
                return ExitCode::SUCCESS;
            }
            other => match other.parse::<u16>() {
                Ok(parsed) => port = parsed,
                Err(_) => {
                    eprintln!("unrecognized argument: {other}");
                    usage();
                    return ExitCode::FAILURE;
                }
            },
        }
    }

    // RUST_LOG wins when set; otherwise --debug raises the default level.
    let default_level = if debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = ServerConfig {
        bind_addr: format!("0.0.0.0:{port}"),
        ..ServerConfig::default()
    };

    let server = match Server::bind(config).await {
        Ok(server) => server,
        Err(err) => {
            tracing::error!(error = %err, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    tracing::info!("press CTRL-C to exit");
    match server.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!(error = %err, "server stopped with error");
            ExitCode::FAILURE
        }
    }
}
