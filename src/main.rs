use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use lead_funnel::api::{AppState, funnel_routes};
use lead_funnel::config::{FunnelConfig, LlmSettings, SmtpConfig};
use lead_funnel::email::{Dispatcher, EmailRenderer, EmailTransport, SmtpMailer, TemplateStore};
use lead_funnel::leads::LeadCapture;
use lead_funnel::llm::{LlmProvider, create_provider};
use lead_funnel::recommend::{EngineConfig, RecommendationEngine};
use lead_funnel::sequence::SequenceScheduler;
use lead_funnel::store::{FallbackStore, LeadStore, LibSqlBackend, spawn_connectivity_probe};

/// Stderr logging, plus a daily-rolling file when `log_dir` is set.
/// The returned guard must live until shutdown so buffered lines are flushed.
fn init_tracing(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "lead-funnel.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .init();

    guard
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    let config = FunnelConfig::from_env()?;
    let _log_guard = init_tracing(config.log_dir.as_deref());

    eprintln!("📈 Lead Funnel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   HTTP: http://{}", config.bind_addr);

    // ── Storage ─────────────────────────────────────────────────────────
    let primary: Option<Arc<dyn LeadStore>> = match &config.db_path {
        Some(path) => match LibSqlBackend::new_local(path).await {
            Ok(db) => {
                eprintln!("   Database: {}", path.display());
                Some(Arc::new(db))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Persistent store unavailable, using in-memory storage");
                eprintln!("   Database: unavailable ({e}), in-memory only");
                None
            }
        },
        None => {
            eprintln!("   Database: disabled, in-memory only");
            None
        }
    };
    let store: Arc<dyn LeadStore> = Arc::new(FallbackStore::new(primary));
    let _probe_handle = spawn_connectivity_probe(Arc::clone(&store), config.db_probe_interval);

    // ── Recommendations ─────────────────────────────────────────────────
    let engine = match LlmSettings::from_env()?.map(|s| create_provider(&s)) {
        Some(Ok(llm)) => {
            eprintln!("   Recommendations: AI ({}) with rule fallback", llm.model_name());
            RecommendationEngine::with_llm(llm, EngineConfig::default())
        }
        Some(Err(e)) => {
            tracing::warn!(error = %e, "LLM provider unavailable, using rule-based recommendations");
            eprintln!("   Recommendations: rule-based");
            RecommendationEngine::rules_only()
        }
        None => {
            eprintln!("   Recommendations: rule-based");
            RecommendationEngine::rules_only()
        }
    };

    // ── Email ───────────────────────────────────────────────────────────
    let templates = TemplateStore::load(config.templates_path.as_deref());
    let renderer = Arc::new(EmailRenderer::new(
        Arc::new(templates),
        Arc::new(engine),
        config.cta_url.clone(),
        config.advisor_name.clone(),
    ));

    let transport: Option<Arc<dyn EmailTransport>> = match SmtpConfig::from_env()? {
        Some(smtp) => match SmtpMailer::new(&smtp) {
            Ok(mailer) => {
                eprintln!("   Email: SMTP via {}:{}", smtp.host, smtp.port);
                Some(Arc::new(mailer))
            }
            Err(e) => {
                tracing::warn!(error = %e, "SMTP transport misconfigured, emails will be mocked");
                eprintln!("   Email: mock (SMTP misconfigured)");
                None
            }
        },
        None => {
            eprintln!("   Email: mock (SMTP not configured)");
            None
        }
    };

    let scheduler = Arc::new(SequenceScheduler::new(renderer, Dispatcher::new(transport)));
    let capture = Arc::new(LeadCapture::new(
        Arc::clone(&store),
        Arc::clone(&scheduler),
        config.lead_source.clone(),
    ));

    // ── HTTP ────────────────────────────────────────────────────────────
    let app = funnel_routes(AppState {
        store,
        capture,
        scheduler: Arc::clone(&scheduler),
    });

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr))?;
    tracing::info!(addr = %config.bind_addr, "Lead funnel server started");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server error")?;

    scheduler.stop_all().await;
    Ok(())
}
