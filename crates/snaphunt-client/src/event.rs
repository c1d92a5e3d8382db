use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyEvent, KeyEventKind};
use futures::StreamExt;
use tokio::sync::mpsc;

use snaphunt_common::protocol::{ClientMessage, RoomDetails, SubmissionReceipt};
use snaphunt_common::room::RoomSession;

use crate::capture::{CaptureError, DeviceHandle};
use crate::clock::ClockTick;
use crate::error::ClientError;
use crate::network::ChannelEvent;

/// How often the screen is redrawn when nothing else happens, so the camera preview moves.
pub const REDRAW_PERIOD: Duration = Duration::from_millis(100);

#[derive(Debug)]
pub enum AppEvent {
    Key(KeyEvent),
    Clock(ClockTick),
    Redraw,
    RoomReady(Result<(RoomSession, RoomDetails), ClientError>),
    ChannelReady(Result<mpsc::Sender<ClientMessage>, ClientError>),
    Channel(ChannelEvent),
    DeviceReady {
        task_index: usize,
        result: Result<DeviceHandle, CaptureError>,
    },
    UploadFinished {
        task_index: usize,
        attempt: u64,
        result: Result<SubmissionReceipt, ClientError>,
    },
}

/// Merge keyboard input, clock ticks and the redraw beat into `event_tx`.
pub async fn event_loop(mut clock_rx: mpsc::Receiver<ClockTick>, event_tx: mpsc::Sender<AppEvent>) {
    let mut key_stream = EventStream::new();
    let mut redraw = tokio::time::interval(REDRAW_PERIOD);

    loop {
        let event = tokio::select! {
            Some(Ok(Event::Key(key))) = key_stream.next() => {
                if key.kind != KeyEventKind::Press {
                    continue;
                }
                AppEvent::Key(key)
            }
            Some(tick) = clock_rx.recv() => {
                AppEvent::Clock(tick)
            }
            _ = redraw.tick() => {
                AppEvent::Redraw
            }
        };

        if event_tx.send(event).await.is_err() {
            break;
        }
    }
}

/// Forward everything the channel reports until it closes.
pub async fn forward_channel(
    mut channel_rx: mpsc::Receiver<ChannelEvent>,
    event_tx: mpsc::Sender<AppEvent>,
) {
    while let Some(event) = channel_rx.recv().await {
        let closed = matches!(event, ChannelEvent::Closed(_));
        if event_tx.send(AppEvent::Channel(event)).await.is_err() || closed {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use snaphunt_common::protocol::ServerMessage;

    use super::*;

    #[tokio::test]
    async fn test_forward_stops_after_close() {
        let (channel_tx, channel_rx) = mpsc::channel(4);
        let (event_tx, mut event_rx) = mpsc::channel(4);
        channel_tx
            .send(ChannelEvent::Message(ServerMessage::Pong))
            .await
            .unwrap();
        channel_tx
            .send(ChannelEvent::Closed("bye".into()))
            .await
            .unwrap();

        forward_channel(channel_rx, event_tx).await;
        assert!(matches!(
            event_rx.recv().await,
            Some(AppEvent::Channel(ChannelEvent::Message(ServerMessage::Pong)))
        ));
        assert!(matches!(
            event_rx.recv().await,
            Some(AppEvent::Channel(ChannelEvent::Closed(_)))
        ));
        assert!(event_rx.recv().await.is_none());
    }
}
