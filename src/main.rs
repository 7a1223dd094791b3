mod api;

use clap::{Parser, Subcommand};
use simcha_channels::pace::RandomPacer;
use simcha_channels::sms::SmsGateway;
use simcha_channels::whatsapp::{self, WhatsAppSession};
use simcha_core::config;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Parser)]
#[command(
    name = "simcha",
    version,
    about = "Simcha — wedding invitation sender (SMS + WhatsApp)"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay server for the operator UI.
    Serve,
    /// Pair with WhatsApp by scanning a QR code.
    Pair,
    /// Check configuration, pairing state, and SMS balance.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = config::load(&cli.config)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cfg.simcha.log_level)),
        )
        .init();

    match cli.command {
        Commands::Serve => serve(cfg).await,
        Commands::Pair => pair(cfg).await,
        Commands::Status => status(&cli.config, cfg).await,
    }
}

/// Start the WhatsApp session and the relay HTTP server.
async fn serve(cfg: config::Config) -> anyhow::Result<()> {
    if !cfg.whatsapp.enabled {
        anyhow::bail!("WhatsApp is disabled in config.toml; nothing to serve.");
    }
    if cfg.simcha.base_url.is_empty() {
        anyhow::bail!(
            "base_url is empty. Set [simcha] base_url in config.toml so \
             invitation links point somewhere."
        );
    }

    let session = Arc::new(WhatsAppSession::new(&cfg.simcha.data_dir));
    session.start().await?;

    let sms = if cfg.sms.enabled {
        if !cfg.sms.is_configured() {
            anyhow::bail!(
                "SMS is enabled but credentials are incomplete. \
                 Set key/user/pass/sender under [sms] in config.toml."
            );
        }
        Some(Arc::new(SmsGateway::new(cfg.sms.clone())?))
    } else {
        None
    };

    let state = api::ApiState {
        messenger: session,
        pacer: Arc::new(RandomPacer),
        sms,
        base_url: cfg.simcha.base_url.clone(),
        message_template: cfg.simcha.message_template.clone(),
        delay_ms: (cfg.whatsapp.min_delay_ms, cfg.whatsapp.max_delay_ms),
        send_lock: Arc::new(Mutex::new(())),
    };

    println!("Simcha — relay starting...");
    api::serve(state, &cfg.whatsapp.host, cfg.whatsapp.port).await;
    Ok(())
}

/// Run the standalone pairing flow, printing rotating QR codes until a scan
/// succeeds.
async fn pair(cfg: config::Config) -> anyhow::Result<()> {
    println!("Simcha — WhatsApp pairing\n");
    println!("Open WhatsApp on your phone: Settings > Linked Devices > Link a Device.\n");

    let (mut qr_rx, mut done_rx) = whatsapp::start_pairing(&cfg.simcha.data_dir).await?;

    loop {
        tokio::select! {
            qr = qr_rx.recv() => match qr {
                Some(code) => {
                    println!("{}", whatsapp::generate_qr_terminal(&code)?);
                    println!("Scan the code above. A new one appears if it expires.\n");
                }
                None => anyhow::bail!("pairing aborted: QR stream closed"),
            },
            done = done_rx.recv() => {
                if done.unwrap_or(false) {
                    println!("Paired. Session saved; `simcha serve` will reconnect without a scan.");
                    return Ok(());
                }
                anyhow::bail!("pairing aborted before completion");
            }
        }
    }
}

/// Print configuration and channel readiness.
async fn status(config_path: &str, cfg: config::Config) -> anyhow::Result<()> {
    println!("Simcha — Status\n");
    println!("Config: {config_path}");
    println!(
        "Base URL: {}",
        if cfg.simcha.base_url.is_empty() {
            "(not set)"
        } else {
            &cfg.simcha.base_url
        }
    );
    println!();

    let session_db = format!(
        "{}/whatsapp_session/whatsapp.db",
        config::shellexpand(&cfg.simcha.data_dir)
    );
    let paired = std::path::Path::new(&session_db).exists();
    println!(
        "  whatsapp: {}",
        match (cfg.whatsapp.enabled, paired) {
            (false, _) => "disabled",
            (true, true) => "paired (session on disk)",
            (true, false) => "not paired — run `simcha pair`",
        }
    );

    if !cfg.sms.enabled {
        println!("  sms: disabled");
    } else if !cfg.sms.is_configured() {
        println!("  sms: enabled but credentials incomplete");
    } else {
        let gateway = SmsGateway::new(cfg.sms.clone())?;
        match gateway.balance().await {
            Ok(balance) => println!("  sms: configured, balance {balance}"),
            Err(e) => println!("  sms: configured, balance query failed ({e})"),
        }
    }

    Ok(())
}
