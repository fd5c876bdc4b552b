mod config;
mod error;
mod lobby;
mod matchmaker;
mod messages;
mod registry;
mod relay;
mod room;
mod server;

use std::process::ExitCode;

use log::{error, info, warn};
use warp::Filter;

use config::Config;
use server::Server;

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            error!("invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    let server = Server::new(&config);
    let static_files = warp::fs::dir(config.static_dir.clone());
    let routes = server
        .routes()
        .or(static_files)
        .with(warp::cors().allow_any_origin());

    let tls = config.tls.as_ref().and_then(|tls| match tls.validate() {
        Ok(()) => Some(tls),
        Err(e) => {
            warn!("TLS disabled: {e}");
            None
        }
    });

    match tls {
        Some(tls) => {
            info!("Starting secure server (HTTPS/WSS) on {}", config.addr);
            warp::serve(routes)
                .tls()
                .cert_path(&tls.cert_path)
                .key_path(&tls.key_path)
                .run(config.addr)
                .await;
        }
        None => {
            info!("Starting server (HTTP/WS) on {}", config.addr);
            warp::serve(routes).run(config.addr).await;
        }
    }

    ExitCode::SUCCESS
}
