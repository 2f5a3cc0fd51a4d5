//! Hub connector over TCP frames.

use crate::error::{CacheError, CacheResult};
use crate::source::{HubConnection, HubConnector};
use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tollgate_hub::codec::{read_frame, write_frame};
use tollgate_hub::protocol::SubscribeMessage;
use tollgate_hub::{HubError, HubMessage};
use tollgate_types::Topic;
use tracing::debug;

/// Connects to a hub listening at `addr`.
#[derive(Debug, Clone)]
pub struct TcpHubConnector {
    addr: String,
}

impl TcpHubConnector {
    pub fn new(addr: impl Into<String>) -> Self {
        Self { addr: addr.into() }
    }
}

fn transient(e: impl std::fmt::Display) -> CacheError {
    CacheError::Transient(e.to_string())
}

#[async_trait]
impl HubConnector for TcpHubConnector {
    async fn connect(
        &self,
        topic: &Topic,
        token: &str,
        last_known_sequence: Option<u64>,
    ) -> CacheResult<HubConnection> {
        let stream = TcpStream::connect(&self.addr).await.map_err(transient)?;
        let _ = stream.set_nodelay(true);
        let (mut reader, mut writer) = stream.into_split();

        let subscribe = SubscribeMessage::new(topic.clone(), token, last_known_sequence);
        write_frame(&mut writer, &HubMessage::Subscribe(subscribe))
            .await
            .map_err(transient)?;

        let subscribed = match read_frame(&mut reader).await.map_err(transient)? {
            HubMessage::Subscribed(subscribed) => subscribed,
            HubMessage::Error(error) => return Err(CacheError::from_remote(error.code, error.message)),
            other => return Err(transient(format!("unexpected reply {other:?}"))),
        };
        debug!(addr = %self.addr, topic = %topic, head = subscribed.head_sequence, "hub subscribed");

        // The write half rides along so the server does not see EOF.
        let events = futures::stream::unfold((reader, writer), next_event).boxed();
        Ok(HubConnection {
            head_sequence: subscribed.head_sequence,
            resync_required: subscribed.resync_required,
            events,
        })
    }
}

async fn next_event(
    (mut reader, mut writer): (OwnedReadHalf, OwnedWriteHalf),
) -> Option<(tollgate_types::EntitlementEvent, (OwnedReadHalf, OwnedWriteHalf))> {
    loop {
        match read_frame(&mut reader).await {
            Ok(HubMessage::Event(event)) => return Some((event, (reader, writer))),
            Ok(HubMessage::Ping(nonce)) => {
                if write_frame(&mut writer, &HubMessage::Pong(nonce)).await.is_err() {
                    return None;
                }
            }
            Ok(HubMessage::Error(error)) => {
                debug!(code = %error.code, "hub closed subscription: {}", error.message);
                return None;
            }
            Ok(_) => {}
            Err(HubError::Closed) => return None,
            Err(e) => {
                debug!("hub connection failed: {e}");
                return None;
            }
        }
    }
}
