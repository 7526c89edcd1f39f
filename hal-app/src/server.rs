//! Runtime wiring for the `serve`, `doctor` and `send` subcommands.

use crate::audit::AuditTrail;
use crate::bridge::{ConversationBridge, load_identity};
use crate::config::{self, HalConfig};
use crate::gateway::{Gateway, PollSettings};
use crate::session::SessionRegistry;
use crate::state::StateStore;
use anyhow::Result;
use hal_agent::{AgentRunner, OpencodeClient};
use hal_channels::{ChannelAdapter, InboundSource, TwilioWhatsAppAdapter, send_chunked};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub async fn doctor(config_path: Option<PathBuf>) -> Result<()> {
    config::load_env_files();
    let (cfg, path) = HalConfig::load_with_path(config_path).await?;

    let program = &cfg.agent.opencode_path;
    if !binary_available(program) {
        return Err(anyhow::anyhow!(
            "agent binary {program:?} not found; set agent.opencode_path or HAL_OPENCODE_PATH"
        ));
    }

    let identity_path = cfg.identity_path()?;
    let identity = load_identity(&identity_path).await;
    if identity.is_empty() {
        tracing::warn!(
            identity_path = %identity_path.display(),
            "identity file missing or empty; first turns will carry no preamble"
        );
    }

    tracing::info!(
        model = %cfg.agent.model,
        variant = %cfg.agent.variant,
        opencode_path = %program,
        whatsapp_from = %cfg.twilio.whatsapp_from,
        state_path = %cfg.state_path()?.display(),
        identity_chars = identity.chars().count(),
        config_path = %path.display(),
        "config ok"
    );
    Ok(())
}

pub async fn send_one_shot(
    config_path: Option<PathBuf>,
    recipient: &str,
    message: &str,
) -> Result<()> {
    config::load_env_files();
    let cfg = HalConfig::load(config_path).await?;
    let adapter = build_adapter(&cfg)?;
    let report = send_chunked(&adapter, recipient, message, cfg.bridge.chunk_delay()).await;
    if report.failed > 0 {
        return Err(anyhow::anyhow!(
            "{} of {} chunk(s) failed to send",
            report.failed,
            report.sent + report.failed
        ));
    }
    tracing::info!(recipient = %recipient, chunks = report.sent, "message sent");
    Ok(())
}

pub async fn serve(config_path: Option<PathBuf>) -> Result<()> {
    config::load_env_files();
    let (cfg, cfg_path) = HalConfig::load_with_path(config_path).await?;

    let adapter = Arc::new(build_adapter(&cfg)?);
    let runner: Arc<dyn AgentRunner> = Arc::new(
        OpencodeClient::new(&cfg.agent.opencode_path, &cfg.agent.model, &cfg.agent.variant)
            .with_launcher_args(cfg.agent.launcher_args.clone())
            .with_timeout(cfg.agent_timeout()),
    );

    let identity_path = cfg.identity_path()?;
    let identity = load_identity(&identity_path).await;
    if identity.is_empty() {
        tracing::warn!(identity_path = %identity_path.display(), "running without identity preamble");
    }

    let state = StateStore::new(cfg.state_path()?);
    let registry = Arc::new(SessionRegistry::new(
        state.clone(),
        cfg.agent.session_prefix.clone(),
        cfg.agent_storage_dir()?,
    ));
    let bridge = ConversationBridge::new(registry.clone(), runner, identity);
    let audit = AuditTrail::new(cfg.audit_path()?);

    let source: Arc<dyn InboundSource> = adapter.clone();
    let channel: Arc<dyn ChannelAdapter> = adapter.clone();
    let gateway = Gateway::new(
        PollSettings {
            poll_interval: cfg.bridge.poll_interval(),
            lookback: cfg.bridge.lookback(),
            page_size: cfg.bridge.page_size,
            chunk_delay: cfg.bridge.chunk_delay(),
        },
        source,
        channel,
        state,
        registry,
        bridge,
        audit,
    );

    tracing::info!(
        config_path = %cfg_path.display(),
        whatsapp_from = %adapter.from_address(),
        model = %cfg.agent.model,
        poll_interval_ms = cfg.bridge.poll_interval_ms,
        "bridge starting"
    );

    let shutdown = CancellationToken::new();
    tokio::spawn(shutdown_signal(shutdown.clone()));
    gateway.run_loop(shutdown).await?;
    tracing::info!("bridge stopped");
    Ok(())
}

fn build_adapter(cfg: &HalConfig) -> Result<TwilioWhatsAppAdapter> {
    TwilioWhatsAppAdapter::new(
        &cfg.twilio.account_sid,
        &cfg.twilio.auth_token,
        &cfg.twilio.whatsapp_from,
    )
}

/// A path-like program must exist; a bare name is searched on `PATH`.
fn binary_available(program: &str) -> bool {
    let program_path = Path::new(program);
    if program_path.components().count() > 1 {
        return is_executable(program_path);
    }
    std::env::var_os("PATH").is_some_and(|paths| {
        std::env::split_paths(&paths).any(|dir| is_executable(&dir.join(program)))
    })
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        let mut terminate = match signal(SignalKind::terminate()) {
            Ok(sig) => sig,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler; falling back to ctrl_c only");
                if let Err(ctrlc_err) = tokio::signal::ctrl_c().await {
                    tracing::error!(error = %ctrlc_err, "failed to await ctrl-c signal");
                }
                shutdown.cancel();
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::warn!("received ctrl-c; stopping after the current batch");
            }
            _ = terminate.recv() => {
                tracing::warn!("received SIGTERM; stopping after the current batch");
            }
        }
    }
    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to await ctrl-c signal");
        } else {
            tracing::warn!("received ctrl-c; stopping after the current batch");
        }
    }
    shutdown.cancel();
}
