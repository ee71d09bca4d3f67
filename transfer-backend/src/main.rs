use dotenv::dotenv;
use std::sync::Arc;

mod broadcast;
mod config;
mod terminal;
mod transfer_queue;
mod wallet;

use config::Config;
use terminal::Terminal;
use wallet::{EnvWalletProvider, EthersSession, SignerSession};

/// Connect the delegated signer, if a key is configured
fn connect_signer(config: &Config) -> Result<Option<Arc<dyn SignerSession>>, String> {
    let Some(provider) = EnvWalletProvider::from_env()? else {
        log::info!("[Wallet] No signer key configured, real mode will fall back to simulation");
        return Ok(None);
    };

    log::info!("[Wallet] Loaded signer {}", provider.address());
    let wallet = provider.wallet_for_chain(config.chain_id);
    let session = EthersSession::connect(&config.rpc_url, wallet, config.session_chain)?;
    Ok(Some(Arc::new(session)))
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    dotenv().ok();
    env_logger::init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            std::process::exit(1);
        }
    };

    log::info!(
        "Starting transfer terminal in {} mode (session chain {}, chain id {})",
        config.mode,
        config.session_chain,
        config.chain_id
    );
    match config.batcher_address {
        Some(batcher) => log::info!("Atomic batching enabled via {:?}", batcher),
        None => log::info!("No batcher configured, transfers go out one by one"),
    }

    let signer = match connect_signer(&config) {
        Ok(signer) => signer,
        Err(e) => {
            log::error!("Failed to connect signer: {}", e);
            std::process::exit(1);
        }
    };

    Terminal::new(&config, signer).run().await
}
