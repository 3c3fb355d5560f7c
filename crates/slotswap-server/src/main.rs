mod config;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::sync::broadcast::error::RecvError;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use slotswap_api::auth::{AppState, AppStateInner};
use slotswap_api::mailing::{MailerLiteClient, MailingList, MailingListGateway, NoopMailingList};
use slotswap_api::service::SwapService;
use slotswap_api::sockets::ws_router;
use slotswap_db::Database;
use slotswap_gateway::{ChatRelay, Dispatcher, Notifier};

use crate::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "slotswap=debug,tower_http=debug".into()),
        )
        .init();

    let config = Config::from_env()?;

    // Init database
    let db = Arc::new(Database::open(&config.db_path)?);

    let mailing_list: Arc<dyn MailingList> = match &config.mailerlite_api_key {
        Some(key) => Arc::new(MailerLiteClient::new(key.clone(), config.mailing_timeout)?),
        None => {
            warn!("MAILERLITE_API_KEY not set, mailing list moves are disabled");
            Arc::new(NoopMailingList)
        }
    };
    let mailing = MailingListGateway::new(mailing_list, config.mailing_groups.clone(), config.mailing_timeout);

    // Shared state
    let dispatcher = Dispatcher::new();
    let notifier = Notifier::new(db.clone(), dispatcher.clone());
    let chat = ChatRelay::new(db.clone(), dispatcher.clone(), notifier.clone(), config.chat_policy);
    let swaps = SwapService::new(
        db.clone(),
        dispatcher.clone(),
        notifier.clone(),
        mailing,
        config.swap_policy,
    );
    let app_state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        dispatcher: dispatcher.clone(),
        notifier,
        chat,
        swaps,
    });

    tokio::spawn(log_domain_events(dispatcher));

    // Routes
    let app = Router::new()
        .nest("/api", slotswap_api::router(app_state.clone()))
        .merge(ws_router(app_state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!(
        "SlotSwap server listening on {} (swap policy {:?}, chat policy {:?})",
        addr, config.swap_policy, config.chat_policy
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn log_domain_events(dispatcher: Dispatcher) {
    let mut events = dispatcher.subscribe_events();
    loop {
        match events.recv().await {
            Ok(event) => {
                info!("Domain event: {}", event.name());
                debug!("{:?}", event);
            }
            Err(RecvError::Lagged(n)) => warn!("Domain event logger lagged by {} events", n),
            Err(RecvError::Closed) => break,
        }
    }
}
