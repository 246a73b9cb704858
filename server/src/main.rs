mod api;
mod config;

use std::sync::{Arc, Mutex};

use anyhow::Context;
use axum::Router;
use tagpay_shared::{SimulatedTag, TagDevice, TagSession};
use tokio::sync::RwLock;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::device::DeviceStatus;
use crate::config::Config;

/// Tag session shared by every request. Only ever locked from blocking tasks.
pub type Session = TagSession<Box<dyn TagDevice + Send>>;

/// Shared application state
pub struct AppState {
    pub config: Config,
    pub session: Arc<Mutex<Session>>,
    pub device_status: RwLock<DeviceStatus>,
}

impl AppState {
    pub fn new(config: Config, device: Box<dyn TagDevice + Send>) -> Self {
        let session = TagSession::new(device, config.session.clone());
        Self {
            config,
            session: Arc::new(Mutex::new(session)),
            device_status: RwLock::new(DeviceStatus::default()),
        }
    }
}

pub fn app(state: Arc<AppState>) -> Router {
    Router::new()
        .nest("/api", api::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "tagpay_server=debug,tagpay_shared=debug,tower_http=debug".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env();

    let tag = SimulatedTag::open(&config.tag_image)
        .with_context(|| format!("opening tag image {}", config.tag_image.display()))?;
    tracing::info!(
        "Simulated tag {} backed by {}",
        tag.uid(),
        config.tag_image.display()
    );

    let state = Arc::new(AppState::new(config.clone(), Box::new(tag)));
    let app = app(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_address).await?;
    tracing::info!("TagPay server listening on {}", config.bind_address);

    axum::serve(listener, app).await?;

    Ok(())
}
