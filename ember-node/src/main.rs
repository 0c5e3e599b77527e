use std::time::Duration;

use anyhow::Result;
use argh::FromArgs;
use ember_node::Node;
use log::{info, warn};
use serde_json::json;
use tokio::time;

#[derive(FromArgs)]
/// A minimal proof-of-work ledger node
struct Args {
    #[argh(option, default = "6001")]
    /// gossip port number
    port: u16,

    #[argh(option)]
    /// seconds between timer-driven mining attempts; mining is off when absent
    mine_interval: Option<u64>,

    #[argh(option, default = "String::from(\"timer block\")")]
    /// payload placed in timer-mined blocks
    mine_data: String,

    #[argh(positional)]
    /// addresses of initial peer nodes
    peers: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args: Args = argh::from_env();

    let node = Node::new();
    node.listen(&format!("0.0.0.0:{}", args.port)).await?;

    for peer in &args.peers {
        if let Err(e) = node.add_peer(peer).await {
            warn!("could not reach initial peer {}: {:#}", peer, e);
        }
    }
    info!("connected to {} initial peers", node.peers().len());

    // Surface accepted heads the way an external front end would.
    let mut heads = node.subscribe_heads();
    tokio::spawn(async move {
        while heads.changed().await.is_ok() {
            let head = heads.borrow().clone();
            info!("head accepted: index {} (hash {})", head.index, head.hash);
        }
    });

    if let Some(seconds) = args.mine_interval {
        let miner = node.clone();
        let data = args.mine_data;
        tokio::spawn(async move {
            let mut interval = time::interval(Duration::from_secs(seconds));
            interval.tick().await; // the first tick fires immediately
            loop {
                interval.tick().await;
                match miner.mine_block(json!(data.clone())).await {
                    Ok(block) => info!("mined block {} (hash {})", block.index, block.hash),
                    Err(e) => warn!("mining attempt failed: {:#}", e),
                }
            }
        });
    }

    tokio::signal::ctrl_c().await?;
    node.shutdown();
    Ok(())
}
