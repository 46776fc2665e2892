//! NextPrime - Command line client
//!
//! Streams balance updates for an account, or issues one-off REST calls.

use anyhow::{anyhow, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use nextprime_client::common::types::tradetime_format;
use nextprime_client::config::load_config;
use nextprime_client::{
    run_with_reconnect, AppConfig, ClientError, DocumentPrinter, TradeRequest, TradeSide,
};

/// CLI arguments for the application
#[derive(Parser, Debug)]
#[command(name = "nextprime", author, version, about = "NextPrime example client", long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nextprime.toml")]
    config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Username
    #[arg(short, long, env = "NEXTPRIME_USER")]
    user: Option<String>,

    /// API key
    #[arg(short = 'p', long, env = "NEXTPRIME_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// REST endpoint, e.g. https://test.npri.me
    #[arg(long)]
    endpoint: Option<String>,

    /// Streaming endpoint, e.g. wss://test.npri.me
    #[arg(long)]
    stream_url: Option<String>,

    /// Venue identifier for submitted trades
    #[arg(long)]
    venue: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Stream balance updates and print them as documents
    Stream {
        /// Account to observe; defaults to the user
        #[arg(short, long)]
        actor: Option<String>,

        /// File to write to instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Reconnect with backoff when the stream drops
        #[arg(long)]
        reconnect: bool,
    },

    /// Ping the server
    Ping,

    /// Show balances
    Balances {
        /// Account to look up; all visible accounts when omitted
        #[arg(long)]
        target: Option<String>,

        /// Restrict to these currencies (repeatable)
        #[arg(long = "ccy")]
        currencies: Vec<String>,
    },

    /// Submit a trade report
    Trade {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        side: TradeSide,
        #[arg(long)]
        price: Decimal,
        #[arg(long)]
        size: Decimal,
        #[arg(long)]
        cost: Decimal,
        #[arg(long)]
        cost_ccy: String,
        #[arg(long)]
        fees: Decimal,
        #[arg(long)]
        fees_ccy: String,

        /// Trade time as YYYYMMDD-HH:MM:SS.mmm (UTC); now when omitted
        #[arg(long)]
        tradetime: Option<String>,

        /// Transaction id; a random UUID when omitted
        #[arg(long)]
        txid: Option<String>,

        /// Ask the server to return balances after the trade
        #[arg(long)]
        show_balances: bool,
    },
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse command line arguments
    let args = Args::parse();

    let mut config = load_config(Some(&args.config))?;
    apply_overrides(&mut config, &args);

    // Initialize logging
    let level = match config.settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("Configuration file: {}", args.config);

    match args.command {
        Command::Stream {
            actor,
            output,
            reconnect,
        } => stream(&config, actor.as_deref(), output, reconnect).await,
        Command::Ping => {
            let session = config.session()?;
            println!("{}", session.ping().await?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Balances { target, currencies } => {
            let session = config.session()?;
            let currencies: Vec<&str> = currencies.iter().map(String::as_str).collect();
            let balances = match target {
                Some(target) => session.get_balance_for_user(&target, &currencies).await?,
                None => session.get_all_balances(&currencies).await?,
            };
            println!("{}", serde_json::to_string_pretty(&balances)?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Trade {
            symbol,
            side,
            price,
            size,
            cost,
            cost_ccy,
            fees,
            fees_ccy,
            tradetime,
            txid,
            show_balances,
        } => {
            let session = config.session()?;
            let venue = config
                .nextprime
                .venue
                .clone()
                .ok_or_else(|| anyhow!("a venue is required to submit trades"))?;
            let tradetime = match tradetime {
                Some(text) => NaiveDateTime::parse_from_str(&text, tradetime_format::FORMAT)
                    .with_context(|| format!("invalid tradetime {}", text))?,
                None => chrono::Utc::now().naive_utc(),
            };

            let trade = TradeRequest {
                trader: session.user().to_string(),
                venue,
                txid: txid.unwrap_or_else(TradeRequest::new_txid),
                side,
                symbol,
                price,
                size,
                tradetime,
                cost,
                cost_ccy,
                fees,
                fees_ccy,
            };
            info!("Submitting trade {}", trade.txid);

            if let Some(balances) = session.post_trade(&trade, show_balances).await? {
                println!("{}", serde_json::to_string_pretty(&balances)?);
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Command line flags win over file and environment configuration
fn apply_overrides(config: &mut AppConfig, args: &Args) {
    if let Some(level) = &args.log_level {
        config.settings.log_level = level.clone();
    }
    if let Some(user) = &args.user {
        config.nextprime.user = Some(user.clone());
    }
    if let Some(api_key) = &args.api_key {
        config.nextprime.api_key = Some(api_key.clone());
    }
    if let Some(endpoint) = &args.endpoint {
        config.nextprime.endpoint = endpoint.clone();
    }
    if let Some(stream_url) = &args.stream_url {
        config.nextprime.stream_url = stream_url.clone();
    }
    if let Some(venue) = &args.venue {
        config.nextprime.venue = Some(venue.clone());
    }
}

async fn stream(
    config: &AppConfig,
    actor: Option<&str>,
    output: Option<PathBuf>,
    reconnect: bool,
) -> Result<ExitCode> {
    let mut subscriber = config.subscriber(actor)?;
    let output = output.or_else(|| config.nextprime.output_path.clone());
    let mut printer = DocumentPrinter::open(output.as_deref());

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, closing stream");
        }
    };

    let result = if reconnect {
        let policy = config.settings.reconnect_policy();
        run_with_reconnect(&mut subscriber, &mut printer, &policy, shutdown).await
    } else {
        match subscriber.subscribe().await {
            Ok(()) => subscriber
                .run_until(&mut printer, shutdown)
                .await
                .map(|_| ()),
            Err(e) => Err(e),
        }
    };

    match result {
        Ok(()) => {
            info!("Stream finished after {} messages", printer.printed());
            Ok(ExitCode::SUCCESS)
        }
        Err(ClientError::Handshake { status }) => {
            eprintln!("Invalid status code. Expected 101. Got {}", status);
            Ok(ExitCode::from(1))
        }
        Err(e) => Err(e.into()),
    }
}
