use serde::{Deserialize, Serialize};
use std::io::{Error as IoError, ErrorKind};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::block::Block;
use crate::MAX_MESSAGE_SIZE;

/// Peer gossip messages, exactly one per frame. Constructed fresh per send;
/// the engine holds no message state.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// Ask a peer for its current head.
    QueryLatest,
    /// Ask a peer for its full chain.
    QueryAll,
    /// A block sequence: a lone head, or a whole chain.
    ChainResponse(Vec<Block>),
}

/// On-the-wire shape shared by all peers:
/// `{"type": 0|1|2, "data"?: "<JSON-encoded block array>"}`.
#[derive(Serialize, Deserialize)]
struct WireMessage {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<String>,
}

const QUERY_LATEST: u8 = 0;
const QUERY_ALL: u8 = 1;
const RESPONSE_BLOCKCHAIN: u8 = 2;

impl Message {
    pub fn encode(&self) -> Result<Vec<u8>, IoError> {
        let wire = match self {
            Message::QueryLatest => WireMessage {
                kind: QUERY_LATEST,
                data: None,
            },
            Message::QueryAll => WireMessage {
                kind: QUERY_ALL,
                data: None,
            },
            Message::ChainResponse(blocks) => WireMessage {
                kind: RESPONSE_BLOCKCHAIN,
                data: Some(serde_json::to_string(blocks).map_err(invalid_data)?),
            },
        };
        serde_json::to_vec(&wire).map_err(invalid_data)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, IoError> {
        let wire: WireMessage = serde_json::from_slice(bytes).map_err(invalid_data)?;
        match wire.kind {
            QUERY_LATEST => Ok(Message::QueryLatest),
            QUERY_ALL => Ok(Message::QueryAll),
            RESPONSE_BLOCKCHAIN => {
                let payload = wire.data.ok_or_else(|| {
                    IoError::new(ErrorKind::InvalidData, "chain response without payload")
                })?;
                let blocks: Vec<Block> = serde_json::from_str(&payload).map_err(invalid_data)?;
                Ok(Message::ChainResponse(blocks))
            }
            other => Err(IoError::new(
                ErrorKind::InvalidData,
                format!("unknown message type tag: {}", other),
            )),
        }
    }

    /// Write one frame: u64 big-endian length prefix, then the encoded body.
    pub async fn send_async(&self, stream: &mut (impl AsyncWrite + Unpin)) -> Result<(), IoError> {
        let bytes = self.encode()?;
        let len = bytes.len() as u64;
        stream.write_all(&len.to_be_bytes()).await?;
        stream.write_all(&bytes).await?;
        stream.flush().await?;
        Ok(())
    }

    /// Read one frame. Oversized or undecodable frames are connection-fatal
    /// for the caller, not node-fatal.
    pub async fn receive_async(stream: &mut (impl AsyncRead + Unpin)) -> Result<Self, IoError> {
        let mut len_bytes = [0u8; 8];
        stream.read_exact(&mut len_bytes).await?;
        let len = u64::from_be_bytes(len_bytes) as usize;

        if len > MAX_MESSAGE_SIZE {
            return Err(IoError::new(
                ErrorKind::InvalidData,
                format!(
                    "received frame of {} bytes, max is {} bytes",
                    len, MAX_MESSAGE_SIZE
                ),
            ));
        }

        let mut data = vec![0u8; len];
        stream.read_exact(&mut data).await?;
        Self::decode(&data)
    }
}

fn invalid_data(e: serde_json::Error) -> IoError {
    IoError::new(ErrorKind::InvalidData, e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis_block;
    use serde_json::Value;

    #[test]
    fn queries_carry_only_the_type_tag() {
        let encoded = Message::QueryLatest.encode().unwrap();
        let raw: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(raw, serde_json::json!({ "type": 0 }));

        let encoded = Message::QueryAll.encode().unwrap();
        let raw: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(raw, serde_json::json!({ "type": 1 }));
    }

    #[test]
    fn chain_responses_nest_the_blocks_as_a_json_string() {
        let message = Message::ChainResponse(vec![genesis_block()]);
        let encoded = message.encode().unwrap();

        let raw: Value = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(raw["type"], 2);
        assert!(raw["data"].is_string());

        assert_eq!(Message::decode(&encoded).unwrap(), message);
    }

    #[test]
    fn malformed_frames_fail_to_decode() {
        assert!(Message::decode(b"not json").is_err());
        assert!(Message::decode(br#"{"type":9}"#).is_err());
        assert!(Message::decode(br#"{"type":2}"#).is_err());
        assert!(Message::decode(br#"{"type":2,"data":"not blocks"}"#).is_err());
    }

    #[tokio::test]
    async fn frames_round_trip_over_a_duplex_stream() {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);

        let message = Message::ChainResponse(vec![genesis_block()]);
        message.send_async(&mut client).await.unwrap();
        Message::QueryLatest.send_async(&mut client).await.unwrap();

        assert_eq!(Message::receive_async(&mut server).await.unwrap(), message);
        assert_eq!(
            Message::receive_async(&mut server).await.unwrap(),
            Message::QueryLatest
        );
    }

    #[tokio::test]
    async fn oversized_frames_are_refused_before_reading_the_body() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let huge = (MAX_MESSAGE_SIZE as u64 + 1).to_be_bytes();
        tokio::io::AsyncWriteExt::write_all(&mut client, &huge)
            .await
            .unwrap();

        let err = Message::receive_async(&mut server).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidData);
    }
}
