//! TCP front end for the hub.

use crate::codec::{read_frame, write_frame};
use crate::error::{HubError, HubResult};
use crate::hub::SyncHub;
use crate::protocol::{ErrorMessage, HubMessage, SubscribeMessage, SubscribedMessage, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWrite;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tollgate_credential::CredentialCodec;
use tollgate_types::ErrorCode;
use tracing::{debug, info, warn};

/// Accepts subscribers on `listener` until the listener fails.
///
/// Every connection must open with a `Subscribe` frame carrying a valid
/// token whose topic claim equals the requested topic.
pub async fn serve(listener: TcpListener, hub: Arc<SyncHub>, codec: CredentialCodec) -> HubResult<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(%addr, "hub listening");
    }
    loop {
        let (stream, peer) = listener.accept().await?;
        let hub = hub.clone();
        let codec = codec.clone();
        tokio::spawn(async move {
            match handle_connection(stream, peer, hub, codec).await {
                Ok(()) | Err(HubError::Closed) => debug!(%peer, "subscriber disconnected"),
                Err(e) => warn!(%peer, "subscriber connection ended: {e}"),
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    peer: SocketAddr,
    hub: Arc<SyncHub>,
    codec: CredentialCodec,
) -> HubResult<()> {
    let _ = stream.set_nodelay(true);
    let (mut reader, mut writer) = stream.into_split();

    let handshake = Duration::from_millis(hub.config().handshake_timeout_ms);
    let first = tokio::time::timeout(handshake, read_frame(&mut reader))
        .await
        .map_err(|_| HubError::Timeout)??;

    let request = match first {
        HubMessage::Subscribe(request) => request,
        other => {
            let message = format!("expected Subscribe, got {other:?}");
            send_error(&mut writer, ErrorCode::Invalid, &message).await;
            return Err(HubError::Protocol(message));
        }
    };
    if let Err(e) = authorize(&request, &codec) {
        send_error(&mut writer, e.code(), &e.to_string()).await;
        return Err(e);
    }

    let mut subscription = hub.subscribe_from(&request.topic, request.last_known_sequence);
    write_frame(
        &mut writer,
        &HubMessage::Subscribed(SubscribedMessage {
            topic: request.topic.clone(),
            head_sequence: subscription.head_sequence(),
            resync_required: subscription.resync_required(),
        }),
    )
    .await?;
    info!(%peer, topic = %request.topic, "subscriber attached");

    // Frame reads are not cancel-safe, so a task owns the read half.
    let (frames_tx, mut frames) = mpsc::channel(8);
    let reader_task = tokio::spawn(async move {
        loop {
            let frame = read_frame(&mut reader).await;
            let done = frame.is_err();
            if frames_tx.send(frame).await.is_err() || done {
                break;
            }
        }
    });

    let result = loop {
        tokio::select! {
            event = subscription.recv() => match event {
                Some(event) => {
                    if let Err(e) = write_frame(&mut writer, &HubMessage::Event(event)).await {
                        break Err(e);
                    }
                }
                None => {
                    send_error(&mut writer, ErrorCode::TransientNetworkError, "subscriber queue overflowed").await;
                    break Ok(());
                }
            },
            frame = frames.recv() => match frame {
                Some(Ok(HubMessage::Ping(nonce))) => {
                    if let Err(e) = write_frame(&mut writer, &HubMessage::Pong(nonce)).await {
                        break Err(e);
                    }
                }
                Some(Ok(HubMessage::Pong(_))) => {}
                Some(Ok(other)) => {
                    let message = format!("unexpected message {other:?}");
                    send_error(&mut writer, ErrorCode::Invalid, &message).await;
                    break Err(HubError::Protocol(message));
                }
                Some(Err(e)) => break Err(e),
                None => break Err(HubError::Closed),
            },
        }
    };

    reader_task.abort();
    result
}

fn authorize(request: &SubscribeMessage, codec: &CredentialCodec) -> HubResult<()> {
    if request.version != PROTOCOL_VERSION {
        return Err(HubError::Protocol(format!(
            "unsupported protocol version {}",
            request.version
        )));
    }
    let credential = codec.verify(&request.token)?;
    if credential.topic != request.topic {
        return Err(HubError::Unauthorized(format!(
            "token is not valid for topic {}",
            request.topic
        )));
    }
    Ok(())
}

async fn send_error<W: AsyncWrite + Unpin>(writer: &mut W, code: ErrorCode, message: &str) {
    let _ = write_frame(writer, &HubMessage::Error(ErrorMessage::new(code, message))).await;
}
