//! Operator terminal
//!
//! Line-oriented front end over the queue and the broadcast engine. The
//! terminal owns the execution mode and hands it to every execute and cancel
//! call; nothing else reads it.

mod help;

use ethers::utils::format_units;
use std::str::FromStr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::broadcast::{
    BroadcastEngine, BroadcastLog, EngineSettings, ExecutionReport, InMemoryLedger,
    PendingTxTracker, ReplaceOutcome,
};
use crate::config::Config;
use crate::transfer_queue::{
    Asset, AuthContext, Chain, ExecutionMode, RawSecret, TransferQueue, create_transfer_queue,
    shorten, validate,
};
use crate::wallet::SignerSession;

/// Operator commands
#[derive(Debug, PartialEq)]
pub enum Command {
    /// `add <asset> <chain> <destination> <amount>`
    Add {
        asset: String,
        chain: String,
        destination: String,
        amount: String,
    },
    /// `remove <id>`
    Remove(String),
    /// `queue`
    Queue,
    /// `mode` shows, `mode <simulated|real>` switches
    Mode(Option<String>),
    /// `secret <material>`; bare `secret` clears
    Secret(Option<String>),
    /// `execute`
    Execute,
    /// `cancel`
    Cancel,
    /// `pending`
    Pending,
    /// `log`
    Log,
    /// `balance`
    Balance,
    /// `help`
    Help,
    /// `quit`
    Quit,
}

/// Parse a command line
pub fn parse(text: &str) -> Option<Command> {
    let text = text.trim();
    let parts: Vec<&str> = text.split_whitespace().collect();
    let command = parts.first()?.to_lowercase();

    match command.as_str() {
        "add" => {
            if parts.len() != 5 {
                log::debug!("[Terminal] 'add' expects 4 arguments, got {}", parts.len() - 1);
                return None;
            }
            Some(Command::Add {
                asset: parts[1].to_string(),
                chain: parts[2].to_string(),
                destination: parts[3].to_string(),
                amount: parts[4].to_string(),
            })
        }
        "remove" | "rm" => parts.get(1).map(|id| Command::Remove(id.to_string())),
        "queue" | "list" | "ls" => Some(Command::Queue),
        "mode" => Some(Command::Mode(parts.get(1).map(|m| m.to_string()))),
        "secret" => {
            // Material may contain spaces
            let material = text[parts[0].len()..].trim();
            Some(Command::Secret(
                (!material.is_empty()).then(|| material.to_string()),
            ))
        }
        "execute" | "run" | "send" => Some(Command::Execute),
        "cancel" | "replace" => Some(Command::Cancel),
        "pending" => Some(Command::Pending),
        "log" => Some(Command::Log),
        "balance" | "bal" => Some(Command::Balance),
        "help" | "?" => Some(Command::Help),
        "quit" | "exit" => Some(Command::Quit),
        _ => {
            log::debug!("[Terminal] Unknown command '{}'", command);
            None
        }
    }
}

/// Terminal session state
pub struct Terminal {
    queue: Arc<TransferQueue>,
    engine: BroadcastEngine,
    mode: ExecutionMode,
    signer: Option<Arc<dyn SignerSession>>,
    secret: Option<Arc<RawSecret>>,
    /// Report of the most recent execution, updated when its transaction is replaced
    last_run: Option<ExecutionReport>,
}

impl Terminal {
    pub fn new(config: &Config, signer: Option<Arc<dyn SignerSession>>) -> Self {
        let engine = BroadcastEngine::new(
            EngineSettings::from_config(config),
            Arc::new(PendingTxTracker::new(config.replace_delay)),
            Arc::new(InMemoryLedger::new(config.simulated_balance)),
            Arc::new(BroadcastLog::new(config.log_capacity)),
        );
        Self::with_engine(engine, config.mode, signer)
    }

    pub fn with_engine(
        engine: BroadcastEngine,
        mode: ExecutionMode,
        signer: Option<Arc<dyn SignerSession>>,
    ) -> Self {
        Self {
            queue: create_transfer_queue(),
            engine,
            mode,
            signer,
            secret: None,
            last_run: None,
        }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn queue(&self) -> &Arc<TransferQueue> {
        &self.queue
    }

    pub fn engine(&self) -> &BroadcastEngine {
        &self.engine
    }

    /// Delegated signer first, then a supplied secret
    pub fn auth_context(&self) -> AuthContext {
        match (&self.signer, &self.secret) {
            (Some(signer), _) => AuthContext::Delegated(signer.clone()),
            (None, Some(secret)) => AuthContext::RawSecret(secret.clone()),
            (None, None) => AuthContext::Anonymous,
        }
    }

    /// Execute a command and return the response
    pub async fn execute(&mut self, cmd: Command) -> Result<String, String> {
        match cmd {
            Command::Add {
                asset,
                chain,
                destination,
                amount,
            } => self.add(&asset, &chain, &destination, &amount),
            Command::Remove(id) => Ok(match self.queue.remove(&id) {
                Some(entry) => {
                    self.engine.log().push(format!(
                        "Removed {} {} to {} from queue",
                        entry.amount(),
                        entry.asset(),
                        entry.short_destination()
                    ));
                    format!("Removed {}", id)
                }
                None => format!("No queued transfer with id {}", id),
            }),
            Command::Queue => Ok(self.describe_queue()),
            Command::Mode(None) => Ok(format!("Execution mode: {}", self.mode)),
            Command::Mode(Some(raw)) => {
                let mode = ExecutionMode::from_str(&raw)
                    .map_err(|_| format!("Unknown mode '{}', use 'simulated' or 'real'", raw))?;
                self.mode = mode;
                self.engine.log().push(format!("Execution mode set to {}", mode));
                Ok(format!("Execution mode: {}", mode))
            }
            Command::Secret(None) => {
                self.secret = None;
                Ok("Secret cleared".to_string())
            }
            Command::Secret(Some(material)) => {
                let secret = RawSecret::new(material);
                if !secret.is_acceptable() {
                    return Err(crate::transfer_queue::ValidationError::NoAuthority.to_string());
                }
                self.secret = Some(Arc::new(secret));
                Ok("Secret held for the next execution".to_string())
            }
            Command::Execute => Ok(self.run_execute().await),
            Command::Cancel => Ok(self.cancel().await),
            Command::Pending => Ok(self.describe_pending()),
            Command::Log => {
                let log = self.engine.log();
                Ok(if log.is_empty() {
                    "Broadcast log is empty".to_string()
                } else {
                    format!(
                        "{}\n({} of {} lines kept)",
                        log.lines().join("\n"),
                        log.len(),
                        log.capacity()
                    )
                })
            }
            Command::Balance => Ok(self.describe_balance().await),
            Command::Help => Ok(help::execute()),
            Command::Quit => Ok("Bye".to_string()),
        }
    }

    fn add(&self, asset: &str, chain: &str, destination: &str, amount: &str) -> Result<String, String> {
        let asset = Asset::from_str(asset).map_err(|_| format!("Unknown asset '{}'", asset))?;
        let chain = Chain::from_str(chain).map_err(|_| format!("Unknown chain '{}'", chain))?;
        let entry = validate(destination, amount, chain, asset, &self.auth_context())
            .map_err(|e| e.to_string())?;

        let summary = format!(
            "{} {} to {} on {}",
            entry.amount(),
            entry.asset(),
            entry.short_destination(),
            entry.chain()
        );
        let id = self.queue.append(entry);
        self.engine.log().push(format!("Queued {}", summary));
        Ok(format!("Queued {} [{}]", summary, id))
    }

    async fn run_execute(&mut self) -> String {
        let snapshot = self.queue.drain_all();
        if snapshot.is_empty() {
            return "Queue is empty, nothing to execute".to_string();
        }

        let auth = self.auth_context();
        // The secret only ever covers one execution
        self.secret = None;

        let report = self.engine.execute(snapshot, self.mode, &auth).await;
        let mut out = report.log.join("\n");
        out.push_str(&format!(
            "\n{} of {} transfer(s) confirmed{}",
            report.confirmed_count(),
            report.entries.len(),
            if report.batched { " (atomic batch)" } else { "" }
        ));
        if !report.simulated_debit.is_zero() {
            out.push_str(&format!(
                "\nSimulated debit: {} {}",
                report.simulated_debit,
                Asset::Usdt
            ));
        }
        if let Some(pending) = &report.pending {
            out.push_str(&format!("\nPending: {}", shorten(&pending.tx_ref, 24)));
        }
        self.last_run = Some(report);
        out
    }

    async fn cancel(&mut self) -> String {
        let outcome = self.engine.cancel_pending(self.mode, &self.auth_context()).await;
        let moved = self
            .last_run
            .as_mut()
            .map_or(0, |report| report.apply_replacement(&outcome));

        let mut out = Self::describe_replacement(outcome);
        if moved > 0 {
            out.push_str(&format!("\n{} transfer(s) marked replaced", moved));
        }
        out
    }

    fn describe_replacement(outcome: ReplaceOutcome) -> String {
        match outcome {
            ReplaceOutcome::NothingPending => "Nothing pending to cancel".to_string(),
            ReplaceOutcome::Replaced {
                record,
                replacement_ref,
            } => match replacement_ref {
                Some(replacement) => format!(
                    "Replaced {} with {}",
                    shorten(&record.tx_ref, 18),
                    replacement
                ),
                None => format!(
                    "Replaced {}, {} {} returned to balance",
                    shorten(&record.tx_ref, 18),
                    record.amount,
                    record.asset
                ),
            },
            ReplaceOutcome::Failed(failure) => failure.log_line(),
        }
    }

    fn describe_queue(&self) -> String {
        let entries = self.queue.list();
        if entries.is_empty() {
            return "Queue is empty".to_string();
        }
        let mut out = format!(
            "{} queued transfer(s), {} in total:",
            entries.len(),
            self.queue.total_amount()
        );
        for entry in entries {
            out.push_str(&format!(
                "\n  [{}] {} {} {} to {} on {} ({})",
                entry.created_at().format("%H:%M:%S"),
                entry.id(),
                entry.amount(),
                entry.asset(),
                entry.short_destination(),
                entry.chain(),
                entry.status()
            ));
        }
        out
    }

    fn describe_pending(&self) -> String {
        match self.engine.tracker().get() {
            Some(record) => serde_json::to_string_pretty(&record)
                .unwrap_or_else(|e| format!("{} ({})", record.tx_ref, e)),
            None => "No pending transaction".to_string(),
        }
    }

    async fn describe_balance(&self) -> String {
        let mut out = format!(
            "Simulated balance: {} {}",
            self.engine.ledger().balance(),
            Asset::Usdt
        );
        if let Some(signer) = &self.signer {
            let token = self.engine.settings().token_address;
            let decimals = signer.token_decimals(token).await.unwrap_or(6);
            match signer.token_balance(token, signer.address()).await {
                Ok(raw) => {
                    let formatted = format_units(raw, u32::from(decimals))
                        .unwrap_or_else(|_| raw.to_string());
                    out.push_str(&format!(
                        "\nOn-chain balance ({:?} on {}): {} {}",
                        signer.address(),
                        signer.chain(),
                        formatted,
                        Asset::Usdt
                    ));
                }
                Err(e) => out.push_str(&format!("\nOn-chain balance unavailable: {}", e)),
            }
        }
        out
    }

    /// Read commands from stdin until `quit` or end of input
    pub async fn run(mut self) -> std::io::Result<()> {
        println!("{}", help::execute());
        println!(
            "Mode: {}, authority: {}",
            self.mode,
            self.auth_context().describe()
        );

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            if line.trim().is_empty() {
                continue;
            }
            let Some(cmd) = parse(&line) else {
                println!("Unrecognized command, type `help`");
                continue;
            };
            let quit = cmd == Command::Quit;
            match self.execute(cmd).await {
                Ok(response) => println!("{}", response),
                Err(e) => println!("Error: {}", e),
            }
            if quit {
                break;
            }
        }

        log::info!("[Terminal] Session ended");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broadcast::BalanceLedger;
    use rust_decimal::Decimal;
    use std::time::Duration;

    const ALICE: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

    fn create_test_terminal() -> Terminal {
        let config = Config {
            build_delay: Duration::ZERO,
            broadcast_delay: Duration::ZERO,
            replace_delay: Duration::ZERO,
            simulated_balance: Decimal::from(5000),
            ..Config::from_lookup(|_| None).unwrap()
        };
        Terminal::new(&config, None)
    }

    #[test]
    fn test_parse_add() {
        match parse("add USDT ERC20 0xabc 12.5") {
            Some(Command::Add {
                asset,
                chain,
                destination,
                amount,
            }) => {
                assert_eq!(asset, "USDT");
                assert_eq!(chain, "ERC20");
                assert_eq!(destination, "0xabc");
                assert_eq!(amount, "12.5");
            }
            other => panic!("Expected Add command, got {:?}", other),
        }

        // Missing amount
        assert!(parse("add USDT ERC20 0xabc").is_none());
    }

    #[test]
    fn test_parse_aliases() {
        assert_eq!(parse("  LS "), Some(Command::Queue));
        assert_eq!(parse("rm abc"), Some(Command::Remove("abc".to_string())));
        assert_eq!(parse("mode"), Some(Command::Mode(None)));
        assert_eq!(parse("mode real"), Some(Command::Mode(Some("real".to_string()))));
        assert_eq!(parse("exit"), Some(Command::Quit));
        assert!(parse("remove").is_none());
        assert!(parse("launch").is_none());
        assert!(parse("").is_none());
    }

    #[test]
    fn test_parse_secret_keeps_spaces() {
        assert_eq!(
            parse("secret correct horse battery staple"),
            Some(Command::Secret(Some("correct horse battery staple".to_string())))
        );
        assert_eq!(parse("secret"), Some(Command::Secret(None)));
    }

    #[tokio::test]
    async fn test_add_requires_authority() {
        let mut terminal = create_test_terminal();
        let err = terminal
            .execute(parse(&format!("add USDT ERC20 {} 10", ALICE)).unwrap())
            .await
            .unwrap_err();
        assert!(err.contains("No signing authority"));
        assert!(terminal.queue().is_empty());
    }

    #[tokio::test]
    async fn test_secret_is_discarded_after_execute() {
        let mut terminal = create_test_terminal();
        terminal
            .execute(Command::Secret(Some("0123456789abcdef".to_string())))
            .await
            .unwrap();
        terminal
            .execute(parse(&format!("add usdt erc20 {} 1000", ALICE)).unwrap())
            .await
            .unwrap();
        assert_eq!(terminal.queue().len(), 1);

        let out = terminal.execute(Command::Execute).await.unwrap();
        assert!(out.contains("synthesized hash"));
        assert!(out.contains("1 of 1 transfer(s) confirmed"));
        assert!(terminal.queue().is_empty());
        assert_eq!(terminal.engine().ledger().balance(), Decimal::from(4000));

        // Secret is gone, so the next add is refused
        assert!(matches!(terminal.auth_context(), AuthContext::Anonymous));
        assert!(
            terminal
                .execute(parse(&format!("add usdt erc20 {} 1", ALICE)).unwrap())
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn test_short_secret_is_refused() {
        let mut terminal = create_test_terminal();
        assert!(terminal.execute(Command::Secret(Some("short".to_string()))).await.is_err());
        assert!(matches!(terminal.auth_context(), AuthContext::Anonymous));
    }

    #[tokio::test]
    async fn test_mode_switch() {
        let mut terminal = create_test_terminal();
        assert_eq!(terminal.mode(), ExecutionMode::Simulated);
        terminal.execute(Command::Mode(Some("REAL".to_string()))).await.unwrap();
        assert_eq!(terminal.mode(), ExecutionMode::Real);
        assert!(terminal.execute(Command::Mode(Some("warp".to_string()))).await.is_err());
        assert_eq!(terminal.mode(), ExecutionMode::Real);
    }

    #[tokio::test]
    async fn test_execute_empty_queue_and_cancel_nothing() {
        let mut terminal = create_test_terminal();
        let out = terminal.execute(Command::Execute).await.unwrap();
        assert!(out.contains("nothing to execute"));
        let out = terminal.execute(Command::Cancel).await.unwrap();
        assert_eq!(out, "Nothing pending to cancel");
        assert_eq!(terminal.execute(Command::Pending).await.unwrap(), "No pending transaction");
    }

    #[tokio::test]
    async fn test_cancel_simulated_transfer() {
        let mut terminal = create_test_terminal();
        terminal
            .execute(Command::Secret(Some("0123456789abcdef".to_string())))
            .await
            .unwrap();
        terminal
            .execute(parse(&format!("add USDT ERC20 {} 250", ALICE)).unwrap())
            .await
            .unwrap();
        terminal.execute(Command::Execute).await.unwrap();
        assert!(terminal.execute(Command::Pending).await.unwrap().contains("tx_ref"));

        let out = terminal.execute(Command::Cancel).await.unwrap();
        assert!(out.contains("returned to balance"));
        assert_eq!(terminal.engine().ledger().balance(), Decimal::from(5000));
    }

    #[tokio::test]
    async fn test_queue_and_log_summaries() {
        let mut terminal = create_test_terminal();
        assert_eq!(terminal.execute(Command::Log).await.unwrap(), "Broadcast log is empty");

        terminal
            .execute(Command::Secret(Some("0123456789abcdef".to_string())))
            .await
            .unwrap();
        for amount in ["10", "2.5"] {
            terminal
                .execute(parse(&format!("add USDT ERC20 {} {}", ALICE, amount)).unwrap())
                .await
                .unwrap();
        }

        let out = terminal.execute(Command::Queue).await.unwrap();
        assert!(out.starts_with("2 queued transfer(s), 12.5 in total:"));
        assert_eq!(out.lines().count(), 3);

        let out = terminal.execute(Command::Log).await.unwrap();
        assert!(out.ends_with("(2 of 80 lines kept)"));

        let out = terminal.execute(Command::Execute).await.unwrap();
        assert!(out.contains("Simulated debit: 12.5 USDT"));
    }

    #[tokio::test]
    async fn test_cancel_marks_last_run_replaced() {
        let mut terminal = create_test_terminal();
        terminal
            .execute(Command::Secret(Some("0123456789abcdef".to_string())))
            .await
            .unwrap();
        terminal
            .execute(parse(&format!("add USDT ERC20 {} 250", ALICE)).unwrap())
            .await
            .unwrap();
        terminal.execute(Command::Execute).await.unwrap();

        // Simulated transfers are already confirmed, so nothing moves
        let out = terminal.execute(Command::Cancel).await.unwrap();
        assert!(!out.contains("marked replaced"));
        let report = terminal.last_run.as_ref().unwrap();
        assert_eq!(report.confirmed_count(), 1);
    }

    #[tokio::test]
    async fn test_remove_unknown_id_is_a_no_op() {
        let mut terminal = create_test_terminal();
        let out = terminal.execute(Command::Remove("missing".to_string())).await.unwrap();
        assert!(out.contains("No queued transfer"));
    }
}
