//! Frontdesk service binary.
//!
//! Usage:
//!   frontdesk [--db PATH] [--bind ADDR:PORT]
//!
//! Environment variables:
//!   FRONTDESK_DB    Database path (default ~/.frontdesk/frontdesk.db)
//!   FRONTDESK_BIND  Bind address (default 127.0.0.1:8710)

use std::path::PathBuf;
use std::sync::Arc;

use frontdesk::config;
use frontdesk::db::CommsDb;
use frontdesk::http;
use frontdesk::providers::crm::CrmClient;
use frontdesk::state::AppState;
use frontdesk::sync::{self, SyncSource};

const DEFAULT_BIND: &str = "127.0.0.1:8710";

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Vec<String> = std::env::args().collect();
    let mut db_arg: Option<String> = None;
    let mut bind_arg: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--db" if i + 1 < args.len() => {
                db_arg = Some(args[i + 1].clone());
                i += 2;
            }
            "--bind" if i + 1 < args.len() => {
                bind_arg = Some(args[i + 1].clone());
                i += 2;
            }
            "--help" | "-h" => {
                println!("frontdesk: property-management communications hub");
                println!();
                println!("Usage: frontdesk [--db PATH] [--bind ADDR:PORT]");
                println!();
                println!("Environment variables:");
                println!("  FRONTDESK_DB    Database path");
                println!("  FRONTDESK_BIND  Bind address (default: {})", DEFAULT_BIND);
                std::process::exit(0);
            }
            other => {
                eprintln!("Unknown argument: {}", other);
                std::process::exit(2);
            }
        }
    }

    let bind_addr = bind_arg
        .or_else(|| std::env::var("FRONTDESK_BIND").ok())
        .unwrap_or_else(|| DEFAULT_BIND.to_string());

    let config = match config::load_config() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    let db_path = db_arg
        .or_else(|| std::env::var("FRONTDESK_DB").ok())
        .map(PathBuf::from);
    let db = match db_path {
        Some(path) => CommsDb::open_at(path),
        None => CommsDb::open(),
    };
    let db = match db {
        Ok(db) => db,
        Err(e) => {
            log::error!("Failed to open database: {}", e);
            std::process::exit(1);
        }
    };

    let crm_source: Option<Arc<dyn SyncSource>> = {
        let crm = &config.crm;
        match (&crm.api_key, &crm.location_id) {
            (Some(api_key), Some(location_id)) => {
                Some(Arc::new(CrmClient::new(api_key, location_id)))
            }
            _ => {
                log::info!("CRM sync disabled: no credentials configured");
                None
            }
        }
    };

    let (state, debouncer_task) = AppState::new(db, config);
    tokio::spawn(debouncer_task);

    if let Some(source) = crm_source {
        let sync_state = state.clone();
        tokio::spawn(async move {
            sync::run_sync_loop(sync_state, source).await;
        });
    }

    let app = http::router(state);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            log::error!("Failed to bind to {}: {}", bind_addr, e);
            std::process::exit(1);
        }
    };

    log::info!("Frontdesk listening on {}", bind_addr);
    if let Err(e) = axum::serve(listener, app).await {
        log::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
