//! Process wiring: build application state from config and serve it.

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};

use crate::api::{self, AppState};
use crate::auth::{DisabledVerifier, FirebaseVerifier, SharedVerifier, StaticTokenVerifier};
use crate::config::ServerConfig;
use crate::error::Result;
use crate::llm::create_provider;
use crate::store::{Database, LibSqlBackend};
use crate::topic::TopicGate;

/// Pick the identity backend.
///
/// Firebase wins when a project id is set; otherwise static dev tokens; with
/// neither, history routes answer 503.
pub fn build_verifier(config: &ServerConfig) -> SharedVerifier {
    if let Some(project_id) = &config.firebase_project_id {
        let mut verifier = FirebaseVerifier::new(project_id.clone())
            .with_fetch_timeout(config.firebase_jwks_timeout);
        if let Some(url) = &config.firebase_jwks_url {
            verifier = verifier.with_jwks_url(url.clone());
        }
        info!(project_id = %project_id, "Identity: Firebase ID tokens");
        return Arc::new(verifier);
    }
    if !config.dev_tokens.is_empty() {
        let verifier = StaticTokenVerifier::new(config.dev_tokens.clone());
        info!(tokens = verifier.len(), "Identity: static development tokens");
        return Arc::new(verifier);
    }
    info!("Identity: not configured, history routes disabled");
    Arc::new(DisabledVerifier)
}

/// Open the database, create the LLM provider and assemble `AppState`.
pub async fn build_state(config: &ServerConfig) -> Result<AppState> {
    let llm = create_provider(&config.llm)?;
    let store: Arc<dyn Database> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);
    if config.keywords.is_empty() {
        warn!("Topic keyword list is empty, every chat message will be refused");
    }
    info!(keywords = config.keywords.len(), "Topic gate ready");

    Ok(AppState {
        gate: Arc::new(TopicGate::new(config.keywords.clone())),
        llm,
        store,
        verifier: build_verifier(config),
    })
}

/// Bind and serve until Ctrl-C or SIGTERM.
pub async fn serve(config: &ServerConfig, state: AppState) -> Result<()> {
    let app = api::router(state, &config.cors_origins);

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!(address = %address, "Server listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
        info!("Received Ctrl+C, shutting down");
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
                info!("Received terminate signal, shutting down");
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> ServerConfig {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned()).unwrap()
    }

    #[tokio::test]
    async fn dev_tokens_build_static_verifier() {
        let verifier = build_verifier(&config(&[
            ("API_KEY", "k"),
            ("FIT_ASSIST_DEV_TOKENS", "tok=alice"),
        ]));
        assert_eq!(verifier.verify("tok").await.unwrap(), "alice");
    }

    #[tokio::test]
    async fn firebase_verifier_uses_configured_key_endpoint() {
        let verifier = build_verifier(&config(&[
            ("API_KEY", "k"),
            ("FIREBASE_PROJECT_ID", "fit-test"),
            ("FIREBASE_JWKS_URL", "http://127.0.0.1:1/jwks"),
            ("FIREBASE_JWKS_TIMEOUT_SECS", "2"),
        ]));
        // RS256 header with kid "k1"; the key fetch fails before the
        // signature is looked at.
        let token = "eyJhbGciOiJSUzI1NiIsInR5cCI6IkpXVCIsImtpZCI6ImsxIn0.e30.c2ln";
        assert!(matches!(
            verifier.verify(token).await,
            Err(crate::error::AuthError::KeyFetch(_))
        ));
    }

    #[tokio::test]
    async fn no_identity_config_disables_verification() {
        let verifier = build_verifier(&config(&[("API_KEY", "k")]));
        assert!(matches!(
            verifier.verify("tok").await,
            Err(crate::error::AuthError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn build_state_opens_database() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("fit.db");
        let db_path = db_path.to_string_lossy().to_string();
        let config = config(&[("API_KEY", "k"), ("FIT_ASSIST_DB_PATH", db_path.as_str())]);

        let state = build_state(&config).await.unwrap();
        assert_eq!(state.llm.model_name(), "gemini-1.5-flash");
        assert_eq!(state.gate.keywords().len(), config.keywords.len());
        assert!(std::path::Path::new(&db_path).exists());
    }
}
