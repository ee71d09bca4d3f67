//! Help text

use crate::transfer_queue::MIN_SECRET_LEN;

pub fn execute() -> String {
    format!(
        "Commands:\n\
        - `add <asset> <chain> <destination> <amount>` queue a transfer (assets: USDT, BTC; chains: ERC20, BEP20, POLYGON, BITCOIN)\n\
        - `remove <id>` drop a queued transfer\n\
        - `queue` list queued transfers\n\
        - `mode [simulated|real]` show or switch the execution mode\n\
        - `secret <material>` supply a one-shot secret (min {} chars); `secret` alone clears it\n\
        - `execute` broadcast everything in the queue\n\
        - `cancel` cancel or replace the pending transaction\n\
        - `pending` show the pending transaction\n\
        - `log` show the broadcast log\n\
        - `balance` show balances\n\
        - `help` show this message\n\
        - `quit` exit",
        MIN_SECRET_LEN
    )
}
