use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    middleware,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState, SharedState};
use crate::auth::{self, SharedAuthenticator, SupabaseAuth};
use crate::board::Boardroom;
use crate::config::{BoardroomConfig, ServerSettings};
use crate::{llm, store};

/// Configuration for the HTTP server.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    /// Allow any CORS origin.
    pub dev_mode: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::from_settings(&ServerSettings::default())
    }
}

impl ServerConfig {
    pub fn from_settings(settings: &ServerSettings) -> Self {
        Self {
            host: settings.host.clone(),
            port: settings.port,
            cors_origins: settings.cors_origins.clone(),
            dev_mode: false,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn cors_layer(&self) -> Result<CorsLayer> {
        if self.dev_mode {
            return Ok(CorsLayer::permissive());
        }
        let origins = self
            .cors_origins
            .iter()
            .map(|o| {
                o.parse::<HeaderValue>()
                    .with_context(|| format!("Invalid CORS origin '{}'", o))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
            .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
            .allow_credentials(true))
    }
}

/// Wire storage, the model provider and the optional authenticator together.
pub fn build_state(config: &BoardroomConfig) -> Result<SharedState> {
    let store = store::open(config)?;
    let model = llm::build_provider(&config.llm).context("Failed to configure model provider")?;

    let auth: Option<SharedAuthenticator> = if config.server.require_auth {
        let url = config
            .supabase
            .url
            .as_deref()
            .context("SUPABASE_URL is required when authentication is enabled")?;
        let anon_key = config
            .supabase
            .anon_key
            .as_deref()
            .context("SUPABASE_ANON_KEY is required when authentication is enabled")?;
        Some(Arc::new(SupabaseAuth::new(url, anon_key)))
    } else {
        tracing::warn!("Authentication disabled; every caller may act for any user");
        None
    };

    tracing::info!(
        storage = store.backend(),
        provider = model.name(),
        auth = auth.is_some(),
        "Application state ready"
    );
    Ok(Arc::new(AppState::new(Boardroom::new(store, model), auth)))
}

/// Build the full application router.
pub fn build_router(state: SharedState, cors: CorsLayer) -> Router {
    let board_routes = api::api_router().route_layer(middleware::from_fn_with_state(
        state.clone(),
        auth::require_user,
    ));

    api::public_router()
        .merge(board_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server and run until Ctrl-C or SIGTERM.
pub async fn start_server(config: &BoardroomConfig, server: ServerConfig) -> Result<()> {
    let state = build_state(config)?;
    let app = build_router(state, server.cors_layer()?);

    let addr = server.addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    tracing::info!(addr = %local_addr, dev_mode = server.dev_mode, "Boardroom listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down...");
}
