use anyhow::{Context, Result};
use ember_core::network::Message;
use log::{debug, info, warn};
use std::io::ErrorKind;
use tokio::net::tcp::OwnedReadHalf;
use uuid::Uuid;

use crate::node::Node;

/// Per-peer reader loop: decodes frames off the read half and drives the
/// synchronization state machine until the peer disconnects or sends
/// something undecodable. Errors here are connection-local; the caller
/// removes the peer and nothing else is affected.
pub(crate) async fn handle_connection(
    node: Node,
    peer_id: Uuid,
    mut reader: OwnedReadHalf,
) -> Result<()> {
    loop {
        let message = match Message::receive_async(&mut reader).await {
            Ok(message) => message,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => {
                info!("peer {} disconnected", peer_id);
                return Ok(());
            }
            Err(e) => {
                warn!("dropping peer {}: {}", peer_id, e);
                return Err(e).context("error receiving message");
            }
        };

        match message {
            Message::QueryLatest => {
                debug!("peer {} asked for our head", peer_id);
                let head = node.latest_block().await;
                node.send_to(peer_id, Message::ChainResponse(vec![head]));
            }
            Message::QueryAll => {
                debug!("peer {} asked for our full chain", peer_id);
                let blocks = node.blocks().await;
                node.send_to(peer_id, Message::ChainResponse(blocks));
            }
            Message::ChainResponse(blocks) => {
                debug!("peer {} sent {} blocks", peer_id, blocks.len());
                node.handle_chain_response(peer_id, blocks).await;
            }
        }
    }
}
