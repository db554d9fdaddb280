
use crate::auth::TokenSigner;
use crate::config::credentials::credential_sources;
use crate::config::loader::read_config_file;
use crate::config::{Config, load_config};
use crate::gateway::{self, AppState};
use crate::pipeline::MessageService;
use crate::provider::MetaWhatsAppClient;
use crate::store::{FailureRecord, SqliteMessageStore};
use crate::tenant::StaticTenantResolver;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use wa_relay_core::Message;

#[derive(Parser)]
#[command(name = "wa-relay")]
#[command(about = "Multi-tenant WhatsApp relay", version)]
pub struct Cli {
    /// Config file (defaults to ~/.wa-relay/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a default configuration file
    Init,
    /// Run the HTTP gateway
    Serve {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
    },
    /// Mint a dashboard bearer token for a tenant
    Token {
        #[arg(long, short = 't')]
        tenant: String,
        #[arg(long, short = 's', default_value = "dashboard")]
        subject: String,
        /// Lifetime in seconds (defaults to auth.tokenTtlSecs)
        #[arg(long)]
        ttl_secs: Option<u64>,
    },
    /// Print a tenant's stored messages, oldest first
    History {
        #[arg(long, short = 't')]
        tenant: String,
        /// Only the most recent N messages
        #[arg(long, short = 'n')]
        limit: Option<usize>,
    },
    /// Print recent ingestion failures
    Failures {
        #[arg(long, short = 'n', default_value = "20")]
        limit: usize,
    },
    /// List credential slots and where their values come from
    Credentials,
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.as_deref();

    match cli.command {
        Commands::Init => {
            init(config_path)?;
        }
        Commands::Serve { host, port } => {
            serve(config_path, host, port).await?;
        }
        Commands::Token {
            tenant,
            subject,
            ttl_secs,
        } => {
            let config = load_config(config_path)?;
            let ttl = ttl_secs.unwrap_or(config.auth.token_ttl_secs);
            println!("{}", mint_token(&config, &subject, &tenant, ttl)?);
        }
        Commands::History { tenant, limit } => {
            let store = open_store(&load_config(config_path)?)?;
            let lines = history_lines(&store, &tenant, limit)?;
            if lines.is_empty() {
                println!("No messages for tenant {tenant}");
            }
            for line in lines {
                println!("{line}");
            }
        }
        Commands::Failures { limit } => {
            let store = open_store(&load_config(config_path)?)?;
            let failures = store.recent_failures(limit)?;
            if failures.is_empty() {
                println!("No ingestion failures recorded");
            }
            for failure in &failures {
                println!("{}", failure_line(failure));
            }
        }
        Commands::Credentials => {
            // File contents only, so env overrides show up as their own source
            let config = read_config_file(config_path)?;
            for (name, source) in credential_sources(&config) {
                println!("  {:<24} {}", name, source.as_str());
            }
        }
    }

    Ok(())
}

fn init(config_path: Option<&Path>) -> Result<()> {
    let path = match config_path {
        Some(p) => p.to_path_buf(),
        None => crate::config::get_config_path()?,
    };
    if path.exists() {
        println!("Config already exists at {}", path.display());
        println!("Overwrite? (y/N): ");
        let mut input = String::new();
        std::io::stdin().read_line(&mut input)?;
        if !input.trim().eq_ignore_ascii_case("y") {
            return Ok(());
        }
    }

    write_default_config(&path)?;
    println!("\u{2713} Created config at {}", path.display());
    println!("\nNext steps:");
    println!("  1. Set whatsapp.phoneNumberId and whatsapp.accessToken");
    println!("  2. Set webhook.verifyToken and auth.tokenSecret");
    println!("  3. Map phone number ids to tenants under tenants.phoneNumbers");
    println!("  4. Run: wa-relay serve");
    Ok(())
}

fn write_default_config(path: &Path) -> Result<()> {
    crate::config::save_config(&Config::default(), Some(path))
}

fn open_store(config: &Config) -> Result<SqliteMessageStore> {
    let path = config.storage_path()?;
    SqliteMessageStore::open(&path)
        .with_context(|| format!("Failed to open message store at {}", path.display()))
}

fn mint_token(config: &Config, subject: &str, tenant: &str, ttl_secs: u64) -> Result<String> {
    let signer = TokenSigner::new(&config.auth.token_secret)
        .context("auth.tokenSecret must be set to mint tokens")?;
    Ok(signer.issue(subject, tenant, ttl_secs)?)
}

fn message_line(message: &Message) -> String {
    let arrow = if message.is_outbound() { "->" } else { "<-" };
    let peer = if message.is_outbound() {
        message.recipient().unwrap_or("?")
    } else {
        message.sender()
    };
    format!(
        "{} {} {} [{}] {}",
        message.timestamp().format("%Y-%m-%d %H:%M:%S"),
        arrow,
        peer,
        message.kind(),
        message.content()
    )
}

fn history_lines(
    store: &SqliteMessageStore,
    tenant: &str,
    limit: Option<usize>,
) -> Result<Vec<String>> {
    let messages = store.messages_for_tenant(tenant, limit)?;
    Ok(messages.iter().map(message_line).collect())
}

fn failure_line(failure: &FailureRecord) -> String {
    format!(
        "#{} {} stage={} tenant={} external_id={}: {}",
        failure.id,
        failure.failed_at.format("%Y-%m-%d %H:%M:%S"),
        failure.stage,
        failure.tenant_id.as_deref().unwrap_or("-"),
        failure.external_id.as_deref().unwrap_or("-"),
        failure.error
    )
}

async fn serve(config_path: Option<&Path>, host: Option<String>, port: Option<u16>) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }
    config.validate()?;
    config
        .validate_for_serving()
        .context("Configuration is incomplete")?;

    let store = Arc::new(open_store(&config)?);
    let provider = MetaWhatsAppClient::new(&config.whatsapp);
    let tenants = StaticTenantResolver::from_config(&config.tenants);
    let service = MessageService::new(store.clone(), Arc::new(provider), Arc::new(tenants))
        .with_failure_recorder(store);
    let signer = TokenSigner::new(&config.auth.token_secret)?;

    let mut state = AppState::new(Arc::new(service), Arc::new(signer), config.webhook.clone());
    match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => state = state.with_metrics(handle),
        Err(e) => warn!("metrics recorder not installed: {}", e),
    }

    let server = gateway::start(&config.gateway, state).await?;
    println!(
        "wa-relay {} listening on {}:{}",
        crate::VERSION,
        config.gateway.host,
        config.gateway.port
    );

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            println!("\nShutting down...");
        }
        _ = server => {
            warn!("HTTP gateway stopped unexpectedly");
        }
    }
    info!("wa-relay stopped");
    Ok(())
}
