use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use url::Url;

use snaphunt_common::protocol::{
    deserialize_message, serialize_message, ClientMessage, ServerMessage,
};

use crate::error::ClientError;

const KEEPALIVE_PERIOD: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEvent {
    Message(ServerMessage),
    /// The socket is gone; nothing follows.
    Closed(String),
}

/// Open the real-time channel and authenticate it. Returns channels for bidirectional
/// communication; `Hello` is already queued as the first frame.
pub async fn connect(
    url: &Url,
    auth_token: &str,
) -> Result<(mpsc::Sender<ClientMessage>, mpsc::Receiver<ChannelEvent>), ClientError> {
    let (ws, _) = connect_async(url.as_str())
        .await
        .map_err(|e| ClientError::TransportFailure(format!("{url}: {e}")))?;
    tracing::info!(%url, "real-time channel connected");
    let (mut sink, mut stream) = ws.split();

    let (client_tx, mut client_rx) = mpsc::channel::<ClientMessage>(64);
    let (event_tx, event_rx) = mpsc::channel::<ChannelEvent>(64);

    client_tx
        .send(ClientMessage::Hello {
            auth_token: auth_token.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        })
        .await
        .map_err(|_| ClientError::TransportFailure("channel writer stopped".into()))?;

    // Writer task: client_rx -> socket, plus a periodic ping
    tokio::spawn(async move {
        let start = tokio::time::Instant::now() + KEEPALIVE_PERIOD;
        let mut keepalive = tokio::time::interval_at(start, KEEPALIVE_PERIOD);
        loop {
            let msg = tokio::select! {
                next = client_rx.recv() => match next {
                    Some(msg) => msg,
                    None => break,
                },
                _ = keepalive.tick() => ClientMessage::Ping,
            };
            match serialize_message(&msg) {
                Ok(text) => {
                    if let Err(e) = sink.send(Message::Text(text)).await {
                        tracing::warn!(error = %e, "failed to write to channel");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!("Failed to serialize client message: {}", e);
                }
            }
        }
        let _ = sink.close().await;
        tracing::debug!("channel writer stopped");
    });

    // Reader task: socket -> event_tx
    tokio::spawn(async move {
        let reason = loop {
            match stream.next().await {
                Some(Ok(Message::Text(text))) => match deserialize_message::<ServerMessage>(&text) {
                    Ok(msg) => {
                        if event_tx.send(ChannelEvent::Message(msg)).await.is_err() {
                            return;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Failed to parse server message: {}", e);
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    break frame
                        .map(|f| f.reason.to_string())
                        .filter(|r| !r.is_empty())
                        .unwrap_or_else(|| "closed by server".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => break e.to_string(),
                None => break "connection dropped".to_string(),
            }
        };
        tracing::info!(%reason, "real-time channel closed");
        let _ = event_tx.send(ChannelEvent::Closed(reason)).await;
    });

    Ok((client_tx, event_rx))
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;
    use uuid::Uuid;

    use super::*;

    #[tokio::test]
    async fn test_hello_first_then_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let room_id = Uuid::new_v4();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(tcp).await.unwrap();
            let first = match ws.next().await {
                Some(Ok(Message::Text(text))) => deserialize_message::<ClientMessage>(&text).unwrap(),
                other => panic!("unexpected {other:?}"),
            };
            let welcome = serialize_message(&ServerMessage::Welcome { room_id }).unwrap();
            ws.send(Message::Text(welcome)).await.unwrap();
            let second = match ws.next().await {
                Some(Ok(Message::Text(text))) => deserialize_message::<ClientMessage>(&text).unwrap(),
                other => panic!("unexpected {other:?}"),
            };
            ws.close(None).await.unwrap();
            (first, second)
        });

        let url = Url::parse(&format!("ws://{addr}/channel")).unwrap();
        let (tx, mut rx) = connect(&url, "secret").await.unwrap();
        assert_eq!(
            rx.recv().await,
            Some(ChannelEvent::Message(ServerMessage::Welcome { room_id }))
        );
        tx.send(ClientMessage::RequestScoreboard).await.unwrap();
        assert!(matches!(rx.recv().await, Some(ChannelEvent::Closed(_))));

        let (first, second) = server.await.unwrap();
        assert!(matches!(first, ClientMessage::Hello { auth_token, .. } if auth_token == "secret"));
        assert_eq!(second, ClientMessage::RequestScoreboard);
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transport_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let url = Url::parse(&format!("ws://{addr}/channel")).unwrap();
        assert!(matches!(
            connect(&url, "secret").await,
            Err(ClientError::TransportFailure(_))
        ));
    }
}
