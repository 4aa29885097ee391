use super::csv::balance_reader::BalanceReader;
use crate::application::authorizer::CaptureRequest;
use crate::application::engine::{Backends, CreateSessionRequest, TapEngine};
use crate::config::{SigningSecret, TapConfig};
use crate::domain::session::{BearerToken, UserId};
use crate::domain::terminal::{TerminalId, TerminalRegistration};
use crate::error::{Result, TapError};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use serde_json::{Value, json};
use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(author, version, about = "Campus wallet tap & pay", long_about = None)]
pub struct Cli {
    /// HMAC key for signing tap tokens (at least 32 bytes).
    #[arg(long, env = "TAP_SIGNING_SECRET", hide_env_values = true)]
    pub signing_secret: String,

    /// Path to persistent database (optional). If provided, uses RocksDB.
    #[cfg(feature = "storage-rocksdb")]
    #[arg(long)]
    pub db_path: Option<PathBuf>,

    /// Lifetime of a tap session in seconds.
    #[arg(long, default_value_t = 60)]
    pub session_window_secs: u64,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Register a merchant terminal and print its credential.
    RegisterTerminal {
        #[arg(long)]
        merchant: String,
        #[arg(long, default_value = "")]
        location: String,
        #[arg(long, default_value = "Dining")]
        category: String,
    },
    /// Stop a terminal from capturing.
    DeactivateTerminal { id: Uuid },
    /// Credit a wallet.
    Fund {
        #[arg(long)]
        user: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        amount: Decimal,
    },
    /// Credit opening balances from a CSV file.
    ImportBalances { input: PathBuf },
    /// Print a student's wallet and history.
    Balance {
        #[arg(long)]
        user: String,
    },
    /// Create a tap session and print its token.
    Issue {
        #[arg(long)]
        user: String,
        #[arg(long)]
        source: String,
        #[arg(long)]
        cap: Decimal,
    },
    /// Capture a payment against a token.
    Authorize {
        #[arg(long)]
        token: String,
        #[arg(long)]
        amount: Decimal,
        #[arg(long)]
        merchant: String,
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        terminal_key: String,
    },
    /// Show the status of a student's session.
    Status {
        #[arg(long)]
        user: String,
        #[arg(long)]
        token: String,
    },
}

impl Cli {
    pub fn config(&self) -> TapConfig {
        TapConfig {
            session_window: Duration::from_secs(self.session_window_secs),
            ..TapConfig::default()
        }
    }

    fn backends(&self, config: &TapConfig) -> Result<Backends> {
        #[cfg(feature = "storage-rocksdb")]
        if let Some(db_path) = &self.db_path {
            let store = crate::infrastructure::rocksdb::RocksDbStore::open(db_path)?
                .with_points(config.points_per_capture);
            return Ok(Backends {
                sessions: std::sync::Arc::new(store.clone()),
                ledger: std::sync::Arc::new(store.clone()),
                terminals: std::sync::Arc::new(store),
                clock: std::sync::Arc::new(crate::infrastructure::clock::SystemClock),
            });
        }
        Ok(Backends::in_memory(config))
    }
}

/// Runs one command and returns the JSON document to print.
pub async fn run(cli: Cli) -> Result<Value> {
    let secret = SigningSecret::new(cli.signing_secret.as_bytes())?;
    let config = cli.config();
    let engine = TapEngine::new(&secret, &config, cli.backends(&config)?)?;

    let output = match cli.command {
        Command::RegisterTerminal {
            merchant,
            location,
            category,
        } => {
            let terminal = engine
                .register_terminal(TerminalRegistration {
                    merchant_name: merchant,
                    campus_location: location,
                    category,
                })
                .await?;
            serde_json::to_value(terminal)?
        }
        Command::DeactivateTerminal { id } => {
            let deactivated = engine.deactivate_terminal(TerminalId(id)).await?;
            json!({ "success": deactivated })
        }
        Command::Fund {
            user,
            source,
            amount,
        } => {
            let user = UserId::new(user)?;
            engine.add_funds(&user, source.parse()?, amount).await?;
            json!({ "success": true, "wallet": engine.wallet(&user).await? })
        }
        Command::ImportBalances { input } => {
            let file = File::open(&input)
                .map_err(|e| TapError::InvalidRequest(format!("{}: {e}", input.display())))?;
            let mut imported = 0usize;
            let mut rejected = 0usize;
            for row in BalanceReader::new(file).balances() {
                let applied = match row {
                    Ok(balance) => {
                        engine
                            .add_opening_balance(&balance.user_id, &balance.credits())
                            .await
                    }
                    Err(e) => Err(e),
                };
                match applied {
                    Ok(()) => imported += 1,
                    Err(e) => {
                        tracing::warn!(error = %e, "Skipping balance row");
                        rejected += 1;
                    }
                }
            }
            json!({ "success": true, "imported": imported, "rejected": rejected })
        }
        Command::Balance { user } => {
            let user = UserId::new(user)?;
            json!({
                "wallet": engine.wallet(&user).await?,
                "history": engine.history(&user).await?,
            })
        }
        Command::Issue { user, source, cap } => {
            let grant = engine
                .create_session(
                    &UserId::new(user)?,
                    CreateSessionRequest {
                        balance_source: source,
                        amount_cap: cap,
                    },
                )
                .await?;
            let mut value = serde_json::to_value(&grant)?;
            value["tokenPreview"] = Value::String(grant.token_preview());
            value
        }
        Command::Authorize {
            token,
            amount,
            merchant,
            category,
            terminal_key,
        } => {
            let receipt = engine
                .authorize(CaptureRequest {
                    token: BearerToken::new(token),
                    amount,
                    merchant_name: merchant,
                    category,
                    terminal_credential: terminal_key,
                })
                .await?;
            serde_json::to_value(receipt)?
        }
        Command::Status { user, token } => {
            let view = engine
                .session_status(&UserId::new(user)?, &BearerToken::new(token))
                .await?;
            serde_json::to_value(view)?
        }
    };
    Ok(output)
}

/// The JSON body printed for a failed command.
pub fn failure(error: &TapError) -> Value {
    json!({
        "success": false,
        "error": error.kind(),
        "message": error.to_string(),
    })
}
