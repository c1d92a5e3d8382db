use std::io;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::SendError;
use tokio::task::JoinHandle;
use url::Url;
use uuid::Uuid;

use snaphunt_common::protocol::{
    ClientMessage, CreateRoomRequest, JoinRoomRequest, RoomDetails, Verdict,
};
use snaphunt_common::room::{Role, RoomSession};

use crate::api::{ApiClient, ApiError};
use crate::capture::{CaptureBackend, CaptureDeviceManager};
use crate::clock::ClockTick;
use crate::config::ClientConfig;
use crate::error::ClientError;
use crate::event::{self, AppEvent};
use crate::input::{self, Action};
use crate::lifecycle::{Effect, LifecycleConfig, Phase, RoomLifecycle, RoomView};
use crate::network::{self, ChannelEvent};
use crate::ui::{self, Selection};

/// Upper bound on waiting for exit notifications before the process ends.
const EXIT_TIMEOUT: Duration = Duration::from_secs(3);

/// How the user gets into a room.
#[derive(Debug, Clone)]
pub enum RoomEntry {
    Create(CreateRoomRequest),
    Join(JoinRoomRequest),
}

impl RoomEntry {
    /// Perform the create or join call. The role is decided here, by which call was made.
    pub async fn enter(&self, api: &ApiClient) -> Result<(RoomSession, RoomDetails), ApiError> {
        match self {
            RoomEntry::Create(request) => {
                let details = api.create_room(request).await?;
                Ok((RoomSession::from_details(&details, Role::Organizer), details))
            }
            RoomEntry::Join(request) => {
                let details = api.join_room(request).await?;
                let user_id = details.user_id.ok_or(ApiError::MissingDetails)?;
                let session = RoomSession::from_details(&details, Role::Participant { user_id });
                Ok((session, details))
            }
        }
    }
}

/// Carries out [`Effect`]s. Anything slow runs in a spawned task that reports back
/// through `event_tx`.
struct Driver {
    api: ApiClient,
    channel_url: Url,
    backend: Arc<dyn CaptureBackend>,
    event_tx: mpsc::Sender<AppEvent>,
    session: Option<(ApiClient, Uuid)>,
    channel: Option<mpsc::Sender<ClientMessage>>,
    /// Set once the channel is gone for good; sends then fail instead of queueing.
    channel_lost: bool,
    outbox: Vec<ClientMessage>,
    exit_tasks: Vec<JoinHandle<()>>,
}

impl Driver {
    fn new(
        api: ApiClient,
        channel_url: Url,
        backend: Arc<dyn CaptureBackend>,
        event_tx: mpsc::Sender<AppEvent>,
    ) -> Self {
        Self {
            api,
            channel_url,
            backend,
            event_tx,
            session: None,
            channel: None,
            channel_lost: false,
            outbox: Vec::new(),
            exit_tasks: Vec::new(),
        }
    }

    fn spawn_entry(&self, entry: RoomEntry) {
        let api = self.api.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            let result = entry.enter(&api).await.map_err(ClientError::from);
            let _ = tx.send(AppEvent::RoomReady(result)).await;
        });
    }

    /// Remember the session and open its real-time channel.
    fn on_room_ready(&mut self, session: &RoomSession) {
        self.session = Some((self.api.with_token(&session.auth_token), session.room_id));

        let url = self.channel_url.clone();
        let token = session.auth_token.clone();
        let tx = self.event_tx.clone();
        tokio::spawn(async move {
            match network::connect(&url, &token).await {
                Ok((client_tx, channel_rx)) => {
                    if tx.send(AppEvent::ChannelReady(Ok(client_tx))).await.is_ok() {
                        event::forward_channel(channel_rx, tx).await;
                    }
                }
                Err(e) => {
                    let _ = tx.send(AppEvent::ChannelReady(Err(e))).await;
                }
            }
        });
    }

    /// Channel is up: flush whatever was queued while it was connecting. Returns the
    /// messages that could not be handed over.
    async fn attach(&mut self, channel: mpsc::Sender<ClientMessage>) -> Vec<ClientMessage> {
        let queued = std::mem::take(&mut self.outbox);
        self.channel = Some(channel);
        let mut undelivered = Vec::new();
        for msg in queued {
            self.send(msg, &mut undelivered).await;
        }
        undelivered
    }

    /// The channel is gone and will not come back. Returns everything still queued.
    fn mark_lost(&mut self) -> Vec<ClientMessage> {
        self.channel = None;
        self.channel_lost = true;
        std::mem::take(&mut self.outbox)
    }

    async fn send(&mut self, msg: ClientMessage, undelivered: &mut Vec<ClientMessage>) {
        if self.channel_lost {
            undelivered.push(msg);
            return;
        }
        let result = match self.channel {
            Some(ref tx) => tx.send(msg).await,
            None => {
                self.outbox.push(msg);
                return;
            }
        };
        if let Err(SendError(msg)) = result {
            tracing::warn!("channel writer gone");
            self.channel = None;
            self.channel_lost = true;
            undelivered.push(msg);
        }
    }

    /// Carry out `effects`. Returns the outbound messages that could not be delivered.
    async fn execute(&mut self, effects: Vec<Effect>) -> Vec<ClientMessage> {
        let mut undelivered = Vec::new();
        for effect in effects {
            match effect {
                Effect::Send(msg) => self.send(msg, &mut undelivered).await,

                Effect::AcquireDevice { task_index } => {
                    let backend = self.backend.clone();
                    let tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        let result = CaptureDeviceManager::acquire(backend.as_ref()).await;
                        let event = AppEvent::DeviceReady { task_index, result };
                        if let Err(SendError(AppEvent::DeviceReady {
                            result: Ok(handle),
                            ..
                        })) = tx.send(event).await
                        {
                            handle.discard();
                        }
                    });
                }

                Effect::Upload(request) => {
                    let Some((api, room_id)) = self.session.clone() else {
                        tracing::warn!(task = request.task_index, "upload without a session");
                        continue;
                    };
                    let tx = self.event_tx.clone();
                    tokio::spawn(async move {
                        let result = api
                            .upload_submission(room_id, request.task_index, &request.image)
                            .await
                            .map_err(ClientError::from);
                        let _ = tx
                            .send(AppEvent::UploadFinished {
                                task_index: request.task_index,
                                attempt: request.attempt,
                                result,
                            })
                            .await;
                    });
                }

                Effect::NotifyExit => {
                    let Some((api, room_id)) = self.session.clone() else {
                        continue;
                    };
                    self.exit_tasks.push(tokio::spawn(async move {
                        match api.notify_exit(room_id).await {
                            Ok(()) => tracing::info!(%room_id, "exit acknowledged"),
                            Err(e) => tracing::warn!(%room_id, error = %e, "exit notification failed"),
                        }
                    }));
                }
            }
        }
        undelivered
    }

    /// Close the channel and give pending exit notifications a moment to go out.
    async fn finish(mut self) {
        self.channel = None;
        let tasks = std::mem::take(&mut self.exit_tasks);
        if tasks.is_empty() {
            return;
        }
        if tokio::time::timeout(EXIT_TIMEOUT, futures::future::join_all(tasks))
            .await
            .is_err()
        {
            tracing::warn!("gave up waiting for exit notification");
        }
    }
}

fn list_len(view: &RoomView) -> usize {
    match view.phase {
        Phase::WaitingRoom => view.roster.len(),
        Phase::ActiveChallenge(_) => view.reviews.len(),
        _ => 0,
    }
}

fn selected_participant(view: &RoomView, selection: &Selection) -> Option<Uuid> {
    selection
        .selected(view.roster.len())
        .and_then(|i| view.roster.get_index(i))
        .map(|(id, _)| *id)
}

fn selected_review(view: &RoomView, selection: &Selection) -> Option<Uuid> {
    selection
        .selected(view.reviews.len())
        .and_then(|i| view.reviews.get(i))
        .map(|item| item.review.file_id)
}

fn channel_failure_reason(err: ClientError) -> String {
    match err {
        ClientError::TransportFailure(reason) => reason,
        other => other.to_string(),
    }
}

pub async fn run(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    config: ClientConfig,
    entry: RoomEntry,
    backend: Arc<dyn CaptureBackend>,
) -> anyhow::Result<()> {
    let api = ApiClient::new(config.api_base.clone())?;
    let (clock_tx, clock_rx) = mpsc::channel::<ClockTick>(16);
    let (event_tx, mut event_rx) = mpsc::channel::<AppEvent>(64);
    tokio::spawn(event::event_loop(clock_rx, event_tx.clone()));

    let mut room = RoomLifecycle::new(
        LifecycleConfig {
            preview: config.preview,
        },
        Some(clock_tx),
    );
    let mut driver = Driver::new(api, config.channel_url.clone(), backend, event_tx);
    driver.spawn_entry(entry);

    let mut selection = Selection::default();
    let mut show_help = false;
    let mut running = true;

    while running {
        let view = room.view();
        terminal.draw(|frame| ui::draw(frame, &view, &selection, show_help))?;

        let event = match event_rx.recv().await {
            Some(e) => e,
            None => break,
        };
        let now = Utc::now();

        let effects = match event {
            AppEvent::Key(key) => {
                if show_help {
                    show_help = false;
                    continue;
                }
                match input::map_key(key, &view) {
                    Some(Action::Quit) => {
                        running = false;
                        room.leave()
                    }
                    Some(Action::ShowHelp) => {
                        show_help = true;
                        Vec::new()
                    }
                    Some(Action::NavigateUp) => {
                        selection.select_prev(list_len(&view));
                        Vec::new()
                    }
                    Some(Action::NavigateDown) => {
                        selection.select_next(list_len(&view));
                        Vec::new()
                    }
                    Some(Action::RemoveSelected) => match selected_participant(&view, &selection) {
                        Some(user_id) => room.remove_participant(user_id),
                        None => Vec::new(),
                    },
                    Some(Action::ApproveSelected) => match selected_review(&view, &selection) {
                        Some(file_id) => room.review(file_id, Verdict::Approved),
                        None => Vec::new(),
                    },
                    Some(Action::RejectSelected) => match selected_review(&view, &selection) {
                        Some(file_id) => room.review(file_id, Verdict::Rejected),
                        None => Vec::new(),
                    },
                    Some(Action::Capture) => room.capture(),
                    Some(Action::Submit) => room.submit(),
                    Some(Action::RetryDevice) => room.retry_device(),
                    Some(Action::RefreshScores) => room.request_scores(),
                    None => Vec::new(),
                }
            }

            AppEvent::Clock(tick) => room.handle_tick(tick, now),

            AppEvent::Redraw => Vec::new(),

            AppEvent::RoomReady(Ok((session, details))) => {
                driver.on_room_ready(&session);
                room.on_room_ready(session, details, now)
            }
            AppEvent::RoomReady(Err(e)) => {
                room.on_connect_failed(e);
                Vec::new()
            }

            AppEvent::ChannelReady(Ok(channel)) => {
                for msg in driver.attach(channel).await {
                    room.handle_send_failed(msg);
                }
                Vec::new()
            }
            AppEvent::ChannelReady(Err(e)) => {
                room.channel_lost(channel_failure_reason(e));
                for msg in driver.mark_lost() {
                    room.handle_send_failed(msg);
                }
                Vec::new()
            }

            AppEvent::Channel(ChannelEvent::Message(msg)) => room.handle_server_message(msg, now),
            AppEvent::Channel(ChannelEvent::Closed(reason)) => {
                room.channel_lost(reason);
                for msg in driver.mark_lost() {
                    room.handle_send_failed(msg);
                }
                Vec::new()
            }

            AppEvent::DeviceReady { task_index, result } => {
                room.handle_device(task_index, result);
                Vec::new()
            }

            AppEvent::UploadFinished {
                task_index,
                attempt,
                result,
            } => room.handle_upload(task_index, attempt, result, now),
        };

        for msg in driver.execute(effects).await {
            room.handle_send_failed(msg);
        }
    }

    drop(room);
    driver.finish().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{TestPatternBackend, DEFAULT_PREVIEW_SIZE};

    fn driver() -> (Driver, mpsc::Receiver<AppEvent>) {
        let config = ClientConfig::new("http://127.0.0.1:9/api/", DEFAULT_PREVIEW_SIZE).unwrap();
        let api = ApiClient::new(config.api_base.clone()).unwrap();
        let (tx, rx) = mpsc::channel(8);
        let backend: Arc<dyn CaptureBackend> = Arc::new(TestPatternBackend::new(8, 8));
        (Driver::new(api, config.channel_url, backend, tx), rx)
    }

    #[tokio::test]
    async fn test_messages_wait_for_channel() {
        let (mut driver, _events) = driver();
        driver
            .execute(vec![Effect::Send(ClientMessage::RequestScoreboard)])
            .await;
        assert_eq!(driver.outbox.len(), 1);

        let (tx, mut rx) = mpsc::channel(8);
        driver.attach(tx).await;
        assert!(driver.outbox.is_empty());
        assert_eq!(rx.recv().await, Some(ClientMessage::RequestScoreboard));

        driver.execute(vec![Effect::Send(ClientMessage::Ping)]).await;
        assert_eq!(rx.recv().await, Some(ClientMessage::Ping));
    }

    #[tokio::test]
    async fn test_sends_after_channel_loss_come_back() {
        let (mut driver, _events) = driver();
        let (tx, rx) = mpsc::channel(8);
        assert!(driver.attach(tx).await.is_empty());
        drop(rx);

        // writer gone before the close is noticed
        let first = ClientMessage::RemoveParticipant {
            user_id: Uuid::new_v4(),
        };
        let undelivered = driver.execute(vec![Effect::Send(first.clone())]).await;
        assert_eq!(undelivered, vec![first]);

        assert!(driver.mark_lost().is_empty());
        let verdict = ClientMessage::ReviewSubmission {
            file_id: Uuid::new_v4(),
            outcome: Verdict::Approved,
        };
        let undelivered = driver.execute(vec![Effect::Send(verdict.clone())]).await;
        assert_eq!(undelivered, vec![verdict]);
        assert!(driver.outbox.is_empty());
    }

    #[tokio::test]
    async fn test_queued_messages_returned_when_channel_never_opens() {
        let (mut driver, _events) = driver();
        driver
            .execute(vec![Effect::Send(ClientMessage::RequestScoreboard)])
            .await;
        assert_eq!(driver.mark_lost(), vec![ClientMessage::RequestScoreboard]);
    }

    #[tokio::test]
    async fn test_device_result_comes_back_as_event() {
        let (mut driver, mut events) = driver();
        driver
            .execute(vec![Effect::AcquireDevice { task_index: 2 }])
            .await;
        match events.recv().await {
            Some(AppEvent::DeviceReady {
                task_index: 2,
                result: Ok(handle),
            }) => handle.discard(),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exit_without_session_is_skipped() {
        let (mut driver, _events) = driver();
        driver.execute(vec![Effect::NotifyExit]).await;
        assert!(driver.exit_tasks.is_empty());
        driver.finish().await;
    }

    #[test]
    fn test_selection_helpers_follow_phase() {
        let room = RoomLifecycle::new(
            LifecycleConfig {
                preview: DEFAULT_PREVIEW_SIZE,
            },
            None,
        );
        let mut view = room.view();
        assert_eq!(list_len(&view), 0);
        view.phase = Phase::WaitingRoom;
        assert_eq!(list_len(&view), 0);
        assert_eq!(selected_participant(&view, &Selection::default()), None);
        assert_eq!(selected_review(&view, &Selection::default()), None);
    }
}
