use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::Notify;

use rangeserve::config::{self, AppState, Config};
use rangeserve::handler::static_files::{HOMEPAGE_SOURCE, HOMEPAGE_TEMPLATE};
use rangeserve::logger;
use rangeserve::output::ViewResponder;
use rangeserve::server;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Optional first argument: config file path without extension
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| config::DEFAULT_CONFIG_PATH.to_string());
    let cfg = Config::load_from(&config_path)?;

    logger::init(&cfg)?;

    // Worker thread count follows `server.workers`, defaulting to CPU cores
    let mut runtime_builder = tokio::runtime::Builder::new_multi_thread();
    runtime_builder.enable_all();
    if let Some(workers) = cfg.server.workers {
        runtime_builder.worker_threads(workers);
    }

    let runtime = runtime_builder.build()?;
    runtime.block_on(async_main(cfg))
}

async fn async_main(cfg: Config) -> Result<(), Box<dyn std::error::Error>> {
    let addr = cfg.get_socket_addr()?;
    let listener = server::create_reusable_listener(addr)?;

    let views = ViewResponder::from_templates([(HOMEPAGE_TEMPLATE, HOMEPAGE_SOURCE)])?;
    let state = Arc::new(AppState::new(&cfg, views));
    let active_connections = Arc::new(AtomicUsize::new(0));

    let shutdown = Arc::new(Notify::new());
    server::start_signal_handler(Arc::clone(&shutdown))?;

    logger::log_server_start(&addr, &cfg);

    // LocalSet for spawn_local support
    let local = tokio::task::LocalSet::new();
    local
        .run_until(server::start_server_loop(
            listener,
            state,
            active_connections,
            shutdown,
        ))
        .await;

    logger::write_info("Server stopped");
    Ok(())
}
