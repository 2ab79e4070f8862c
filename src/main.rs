use bearer_gate::config::Args;
use bearer_gate::error::Result;
use bearer_gate::handlers::{bind_admin, serve_admin};
use bearer_gate::{
    AppState, Classifier, GateServer, MemcachedStore, MemoryStore, RateLimiter, ServerOptions,
    Store, TokenAuthority,
};
use clap::Parser; // for cli
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // parse cli arguments
    let args = Args::parse();

    if let Err(e) = run(args).await {
        error!(error = %e, "gate failed to start");
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    args.validate()?;
    let shutdown = CancellationToken::new();

    let tokens = TokenAuthority::load(&args.tokens_file).await?;
    if tokens.is_empty() {
        warn!(
            path = %args.tokens_file.display(),
            "token allow-list is empty, every token will be forbidden"
        );
    }

    let store = if args.in_memory_store {
        let store = MemoryStore::new();
        let sweep_every = Duration::from_secs(args.rate_window);
        tokio::spawn(store.clone().sweeper(sweep_every, shutdown.clone()));
        Store::Memory(store)
    } else {
        Store::Memcached(
            MemcachedStore::connect(&args.store, args.store_pool_size, args.io_timeout()).await?,
        )
    };

    // creating shared state
    let rate_window = Duration::from_secs(args.rate_window);
    let rate_limiter = RateLimiter::new(store, args.rate_limit, rate_window);
    let state = Arc::new(AppState {
        classifier: Classifier::new(tokens, rate_limiter),
        io_timeout: args.io_timeout(),
    });

    let options = ServerOptions {
        accept_poll: args.accept_poll(),
        shutdown_grace: args.shutdown_grace(),
    };
    let server = GateServer::bind(&args.listen, Arc::clone(&state), options).await?;

    // both listeners are bound before anything is served
    let admin_listener = match args.admin_port {
        Some(port) => Some(bind_admin(&format!("0.0.0.0:{}", port)).await?),
        None => None,
    };

    let limiter = state.classifier.rate_limiter();
    info!(
        listen = %args.listen,
        store = state.store_kind(),
        rate_limit = limiter.limit(),
        rate_window_secs = limiter.window().as_secs(),
        tokens = state.classifier.tokens().len(),
        "gate configured"
    );

    if let Some(listener) = admin_listener {
        let admin_state = Arc::clone(&state);
        let admin_shutdown = shutdown.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_admin(listener, admin_state, admin_shutdown).await {
                error!(error = %e, "admin server stopped");
            }
        });
    }

    tokio::spawn(wait_for_stop(shutdown.clone()));
    server.run(shutdown).await
}

// Cancel on Ctrl-C or SIGTERM
async fn wait_for_stop(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("stop signal received");
    shutdown.cancel();
}
