use std::env;

use sheetchat_config::Config;
use tracing::{error, info};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cmd = env::args().nth(1).unwrap_or_default();
    if cmd != "serve" {
        eprintln!("Usage: sheetchat serve");
        std::process::exit(2);
    }

    let cfg = match Config::from_env().and_then(|cfg| cfg.require_model_key().map(|_| cfg)) {
        Ok(v) => v,
        Err(e) => {
            error!(err = %e, "failed to load config");
            std::process::exit(1);
        }
    };
    info!(
        listen_addr = %cfg.server.listen_addr,
        model = %cfg.model.model,
        sheets = cfg.sheets.catalog.len(),
        "starting sheetchat"
    );

    if let Err(e) = sheetchat_server::serve(cfg).await {
        error!(err = %e, "server exited with error");
        std::process::exit(1);
    }
}
