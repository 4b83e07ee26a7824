use anyhow::Context;
use metadata_core::QueryLanguage;
use metadata_storage::{DocStore, InMemoryStore, Records};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod auth;
mod config;
mod identity;
mod metrics;
mod routes;

use auth::Verifier;
use config::Config;
use identity::IdentityProvider;
use routes::AppState;

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(if verbose > 0 { "debug" } else { "info" })
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::from_env()?;
    init_tracing(config.verbose);

    let identity = IdentityProvider::new(config.provider, config.maglab_users_file.clone())?;
    identity.init()?;

    let verifier = Verifier::new(config.keys.clone());
    if verifier.is_disabled() {
        warn!("no capability keys configured; authorization is disabled");
    }

    let store: Arc<dyn DocStore> = Arc::new(InMemoryStore::new());
    let state = AppState {
        records: Records::new(store, config.collection_key()),
        parser: Arc::new(QueryLanguage),
        verifier: Arc::new(verifier),
        identity: Arc::new(identity),
        service: Arc::from(config.service.as_str()),
    };
    let app = routes::router(state);

    info!(
        addr = %config.addr,
        collection = %config.collection_key(),
        tls = config.tls.is_some(),
        "{} listening",
        config.service
    );
    match &config.tls {
        Some(tls) => {
            let rustls =
                axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls.cert, &tls.key)
                    .await
                    .with_context(|| {
                        format!("loading {} / {}", tls.cert.display(), tls.key.display())
                    })?;
            axum_server::bind_rustls(config.addr, rustls)
                .serve(app.into_make_service())
                .await?;
        }
        None => {
            axum_server::bind(config.addr)
                .serve(app.into_make_service())
                .await?;
        }
    }
    Ok(())
}
