//! Room session orchestration.
//!
//! ```text
//! Connecting -> WaitingRoom -> ActiveChallenge(0) -> .. -> ActiveChallenge(n-1) -> ChallengeOver
//!      \              \                  \___________ deadline ____________/           /
//!       +--------------+------------------+------------------------------------------+--> Closed
//! ```
//!
//! [`RoomLifecycle`] never waits on anything. Each `handle_*` call consumes one trigger and
//! returns the [`Effect`]s the driver has to carry out; their results come back through
//! [`RoomLifecycle::handle_device`] and [`RoomLifecycle::handle_upload`].

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use image::RgbImage;
use snaphunt_common::protocol::{
    ClientMessage, RoomDetails, ScoreEntry, ServerMessage, SubmissionReceipt, Verdict,
};
use snaphunt_common::room::{normalize_tasks, Role, RoomSession, Task};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::capture::{CaptureDeviceManager, CaptureError, DeviceHandle, DeviceStatus, FrameSize};
use crate::clock::{ClockReconciler, ClockTick, ClockUpdate, SegmentedTime};
use crate::error::ClientError;
use crate::review::{ReviewItem, ReviewQueue};
use crate::roster::{Roster, RosterSynchronizer};
use crate::submission::{
    SubmissionStatus, SubmissionWorkflow, UploadOutcome, UploadRequest, VerdictOutcome,
    WorkflowState,
};

#[derive(Debug, Clone, Copy)]
pub struct LifecycleConfig {
    pub preview: FrameSize,
}

/// Where the session currently is. Exactly one phase is current.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the create or join call to return room details.
    Connecting,
    /// Counting down to the challenge start while the roster fills up.
    WaitingRoom,
    /// Working on the task with this index.
    ActiveChallenge(usize),
    /// Deadline passed or every task approved; scores are requested.
    ChallengeOver,
    /// The session is gone. Nothing else is applied.
    Closed(CloseReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The user left.
    Left,
    /// The organizer removed this participant.
    Removed(String),
    /// The room could not be entered.
    Failed(String),
}

/// Work the driver performs on behalf of the lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    Send(ClientMessage),
    /// Open the camera and report back with [`RoomLifecycle::handle_device`].
    AcquireDevice { task_index: usize },
    /// Upload and report back with [`RoomLifecycle::handle_upload`].
    Upload(UploadRequest),
    /// Best-effort exit call; its outcome is only logged.
    NotifyExit,
}

#[derive(Debug, Clone, Copy)]
struct Schedule {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// Everything the screens need, detached from the lifecycle.
#[derive(Debug, Clone)]
pub struct RoomView {
    pub phase: Phase,
    pub room_name: Option<String>,
    pub room_code: Option<String>,
    pub role: Option<Role>,
    pub countdown: Option<SegmentedTime>,
    pub deadline: Option<DateTime<Utc>>,
    pub task: Option<Task>,
    pub task_count: usize,
    pub roster: Arc<Roster>,
    pub pending_removals: Arc<HashSet<Uuid>>,
    pub workflow: Option<WorkflowState>,
    pub submission: Option<SubmissionStatus>,
    pub rejections: u32,
    pub device: Option<DeviceStatus>,
    pub device_label: Option<String>,
    pub preview: Option<RgbImage>,
    pub reviews: Arc<Vec<ReviewItem>>,
    pub final_scores: Option<Arc<Vec<ScoreEntry>>>,
    pub notice: Option<String>,
}

#[derive(Debug)]
pub struct RoomLifecycle {
    config: LifecycleConfig,
    ticks: Option<mpsc::Sender<ClockTick>>,
    phase: Phase,
    session: Option<RoomSession>,
    tasks: Vec<Task>,
    schedule: Option<Schedule>,
    last_clock_id: u64,
    clock: Option<ClockReconciler>,
    roster: Option<RosterSynchronizer>,
    workflow: Option<SubmissionWorkflow>,
    reviews: Option<ReviewQueue>,
    final_scores: Option<Arc<Vec<ScoreEntry>>>,
    notice: Option<String>,
    /// Why the real-time channel is gone; shown whenever no other notice is.
    channel_down: Option<String>,
}

impl RoomLifecycle {
    /// Starts in [`Phase::Connecting`]. Clocks post their ticks into `ticks`; without it they
    /// only advance when [`RoomLifecycle::handle_tick`] is called.
    pub fn new(config: LifecycleConfig, ticks: Option<mpsc::Sender<ClockTick>>) -> Self {
        Self {
            config,
            ticks,
            phase: Phase::Connecting,
            session: None,
            tasks: Vec::new(),
            schedule: None,
            last_clock_id: 0,
            clock: None,
            roster: None,
            workflow: None,
            reviews: None,
            final_scores: None,
            notice: None,
            channel_down: None,
        }
    }

    pub fn phase(&self) -> &Phase {
        &self.phase
    }

    pub fn session(&self) -> Option<&RoomSession> {
        self.session.as_ref()
    }

    /// Id of the running clock, if any.
    pub fn clock_id(&self) -> Option<u64> {
        self.clock.as_ref().map(|c| c.id())
    }

    // -- Connection --

    pub fn on_room_ready(
        &mut self,
        session: RoomSession,
        details: RoomDetails,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        if self.phase != Phase::Connecting {
            tracing::warn!(phase = ?self.phase, "room details arrived twice, ignoring");
            return effects;
        }
        tracing::info!(
            room = %session.room_code,
            role = ?session.role,
            tasks = details.tasks.len(),
            start = %details.challenge_start_date,
            end = %details.challenge_end_date,
            "entered room"
        );
        self.tasks = normalize_tasks(details.tasks);
        self.schedule = Some(Schedule {
            start: details.challenge_start_date,
            end: details.challenge_end_date,
        });
        self.session = Some(session);
        self.enter_waiting_room(now, &mut effects);
        effects
    }

    pub fn on_connect_failed(&mut self, err: ClientError) {
        tracing::warn!(error = %err, "could not enter room");
        self.close(CloseReason::Failed(err.to_string()));
    }

    /// The real-time channel went away. The session stays where it is and the loss stays on
    /// screen across phase changes.
    pub fn channel_lost(&mut self, reason: impl Into<String>) {
        if matches!(self.phase, Phase::Closed(_)) {
            return;
        }
        let reason = reason.into();
        tracing::warn!(%reason, "real-time channel lost");
        self.channel_down = Some(reason);
    }

    /// An outbound message could not be delivered. Local state that assumed it went out is
    /// rolled back.
    pub fn handle_send_failed(&mut self, msg: ClientMessage) {
        tracing::warn!(?msg, "message not delivered");
        match msg {
            ClientMessage::ReviewSubmission { file_id, .. } => {
                if let Some(queue) = self.reviews.as_mut() {
                    queue.restore(file_id);
                }
            }
            ClientMessage::RemoveParticipant { user_id } => {
                if let Some(roster) = self.roster.as_mut() {
                    roster.cancel_removal(user_id);
                }
            }
            ClientMessage::Hello { .. } | ClientMessage::RequestScoreboard | ClientMessage::Ping => {}
        }
        if matches!(self.phase, Phase::Closed(_)) {
            return;
        }
        let reason = self
            .channel_down
            .clone()
            .unwrap_or_else(|| "real-time channel closed".to_string());
        self.notice = Some(format!("not delivered, {}", ClientError::TransportFailure(reason)));
    }

    // -- Triggers --

    pub fn handle_tick(&mut self, tick: ClockTick, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        let update = match self.clock.as_mut() {
            Some(clock) if clock.id() == tick.clock_id => clock.tick(now),
            _ => {
                discard_stale(format!("tick from clock {}", tick.clock_id));
                return effects;
            }
        };
        if let ClockUpdate::Expired(_) = update {
            self.on_clock_expired(now, &mut effects);
        }
        effects
    }

    pub fn handle_server_message(&mut self, msg: ServerMessage, now: DateTime<Utc>) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Phase::Closed(_) = self.phase {
            tracing::debug!(?msg, "session closed, dropping message");
            return effects;
        }

        match msg {
            ServerMessage::Welcome { room_id } => {
                let expected = self.session.as_ref().map(|s| s.room_id);
                if expected.is_some_and(|id| id != room_id) {
                    tracing::warn!(%room_id, ?expected, "channel opened for another room");
                } else {
                    tracing::info!(%room_id, "real-time channel ready");
                }
            }

            ServerMessage::HandshakeError { reason } => {
                tracing::warn!(%reason, "channel handshake refused");
                self.close(CloseReason::Failed(reason));
            }

            ServerMessage::RosterUpdate { participants } => match self.roster.as_mut() {
                Some(roster) => roster.on_update(participants),
                None => tracing::debug!(phase = ?self.phase, "roster update outside waiting room"),
            },

            ServerMessage::Removed { reason } => {
                tracing::info!(%reason, "removed from room");
                self.close(CloseReason::Removed(reason));
            }

            ServerMessage::ScheduleUpdate {
                challenge_start_date,
                challenge_end_date,
            } => {
                self.schedule = Some(Schedule {
                    start: challenge_start_date,
                    end: challenge_end_date,
                });
                let deadline = match self.phase {
                    Phase::WaitingRoom => challenge_start_date,
                    Phase::ActiveChallenge(_) => challenge_end_date,
                    _ => return effects,
                };
                let update = match self.clock.as_mut() {
                    Some(clock) => clock.reset(deadline, now),
                    None => return effects,
                };
                if let ClockUpdate::Expired(_) = update {
                    self.on_clock_expired(now, &mut effects);
                }
            }

            ServerMessage::SubmissionVerdict {
                task_index,
                outcome,
            } => self.apply_verdict(task_index, outcome, now, &mut effects),

            ServerMessage::SubmissionForReview(review) => match self.reviews.as_mut() {
                Some(queue) => {
                    queue.push(review);
                }
                None => tracing::debug!(file_id = %review.file_id, "review outside active challenge"),
            },

            ServerMessage::FinalScores { scores } => {
                if self.phase == Phase::ChallengeOver {
                    tracing::info!(entries = scores.len(), "final scores received");
                    self.final_scores = Some(Arc::new(scores));
                } else {
                    tracing::debug!(phase = ?self.phase, "scores before challenge end");
                }
            }

            ServerMessage::Error { code, message } => {
                tracing::warn!(?code, %message, "server reported an error");
                self.notice = Some(message);
            }

            ServerMessage::Pong => {}
        }

        effects
    }

    /// Result of an [`Effect::AcquireDevice`]. A handle nobody is waiting for any more is
    /// stopped on the spot.
    pub fn handle_device(
        &mut self,
        task_index: usize,
        result: Result<DeviceHandle, CaptureError>,
    ) {
        let Some(workflow) = self.current_workflow(task_index) else {
            discard_stale(format!("device for finished task {task_index}"));
            if let Ok(handle) = result {
                handle.discard();
            }
            return;
        };
        match workflow.device_mut().install(result) {
            Ok(()) => self.notice = None,
            Err(err) => self.notice = Some(ClientError::from(err).to_string()),
        }
    }

    /// Result of an [`Effect::Upload`]. A verdict held back during the send is applied here.
    pub fn handle_upload(
        &mut self,
        task_index: usize,
        attempt: u64,
        result: Result<SubmissionReceipt, ClientError>,
        now: DateTime<Utc>,
    ) -> Vec<Effect> {
        let mut effects = Vec::new();
        let Some(workflow) = self.current_workflow(task_index) else {
            discard_stale(format!("upload {attempt} for finished task {task_index}"));
            return effects;
        };
        match workflow.finish_upload(attempt, result) {
            UploadOutcome::Accepted => self.notice = None,
            UploadOutcome::Decided(outcome) => {
                self.notice = None;
                self.after_verdict(task_index, outcome, now, &mut effects);
            }
            UploadOutcome::RolledBack(err) => {
                let hint = if err.is_retryable() {
                    "press [Enter] to send again"
                } else {
                    "retake or send again"
                };
                self.notice = Some(format!("{err}; {hint}"));
            }
            UploadOutcome::Ignored => {}
        }
        effects
    }

    // -- User actions --

    pub fn capture(&mut self) -> Vec<Effect> {
        if let Some(workflow) = self.workflow.as_mut() {
            self.notice = workflow.capture().err().map(|e| e.to_string());
        }
        Vec::new()
    }

    pub fn submit(&mut self) -> Vec<Effect> {
        let Some(workflow) = self.workflow.as_mut() else {
            return Vec::new();
        };
        match workflow.begin_send() {
            Ok(request) => {
                self.notice = None;
                vec![Effect::Upload(request)]
            }
            Err(err) => {
                self.notice = Some(err.to_string());
                Vec::new()
            }
        }
    }

    /// Ask for the camera again after a refusal.
    pub fn retry_device(&mut self) -> Vec<Effect> {
        let Some(workflow) = self.workflow.as_mut() else {
            return Vec::new();
        };
        if !workflow.device_mut().begin_acquire() {
            return Vec::new();
        }
        vec![Effect::AcquireDevice {
            task_index: workflow.task().index,
        }]
    }

    pub fn remove_participant(&mut self, user_id: Uuid) -> Vec<Effect> {
        let Some(roster) = self.roster.as_mut() else {
            return Vec::new();
        };
        match roster.request_removal(user_id) {
            Ok(msg) => vec![Effect::Send(msg)],
            Err(err) => {
                self.notice = Some(err.to_string());
                Vec::new()
            }
        }
    }

    pub fn review(&mut self, file_id: Uuid, outcome: Verdict) -> Vec<Effect> {
        let Some(queue) = self.reviews.as_mut() else {
            return Vec::new();
        };
        match queue.decide(file_id, outcome) {
            Ok(msg) => vec![Effect::Send(msg)],
            Err(err) => {
                self.notice = Some(err.to_string());
                Vec::new()
            }
        }
    }

    pub fn request_scores(&mut self) -> Vec<Effect> {
        if self.phase != Phase::ChallengeOver {
            return Vec::new();
        }
        vec![Effect::Send(ClientMessage::RequestScoreboard)]
    }

    pub fn leave(&mut self) -> Vec<Effect> {
        if matches!(self.phase, Phase::Closed(_)) {
            return Vec::new();
        }
        let entered = self.session.is_some();
        self.close(CloseReason::Left);
        if entered {
            vec![Effect::NotifyExit]
        } else {
            Vec::new()
        }
    }

    pub fn view(&self) -> RoomView {
        let workflow = self.workflow.as_ref();
        RoomView {
            phase: self.phase.clone(),
            room_name: self.session.as_ref().map(|s| s.room_name.clone()),
            room_code: self.session.as_ref().map(|s| s.room_code.clone()),
            role: self.session.as_ref().map(|s| s.role),
            countdown: self.clock.as_ref().map(|c| c.remaining()),
            deadline: self.clock.as_ref().map(|c| c.deadline()),
            task: match self.phase {
                Phase::ActiveChallenge(index) => self.tasks.get(index).cloned(),
                _ => None,
            },
            task_count: self.tasks.len(),
            roster: self
                .roster
                .as_ref()
                .map(|r| r.roster())
                .unwrap_or_default(),
            pending_removals: self
                .roster
                .as_ref()
                .map(|r| r.pending_removals())
                .unwrap_or_default(),
            workflow: workflow.map(|w| w.state().clone()),
            submission: workflow.and_then(|w| w.status()),
            rejections: workflow.map(|w| w.rejections()).unwrap_or(0),
            device: workflow.map(|w| w.device().status()),
            device_label: workflow.and_then(|w| w.device().label().map(str::to_string)),
            preview: workflow.and_then(|w| w.device().preview()),
            reviews: self
                .reviews
                .as_ref()
                .map(|q| q.items())
                .unwrap_or_default(),
            final_scores: self.final_scores.clone(),
            notice: self
                .notice
                .clone()
                .or_else(|| self.channel_down.clone().map(|r| ClientError::TransportFailure(r).to_string())),
        }
    }

    // -- Transitions --

    fn on_clock_expired(&mut self, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        match self.phase {
            Phase::WaitingRoom => self.enter_active(0, now, effects),
            Phase::ActiveChallenge(index) => {
                if self.workflow.as_ref().is_some_and(|w| {
                    !matches!(w.state(), WorkflowState::Idle | WorkflowState::Approved)
                }) {
                    tracing::info!(task = index, "deadline passed with a submission in flight");
                }
                self.enter_over(effects);
            }
            _ => {}
        }
    }

    fn apply_verdict(
        &mut self,
        task_index: usize,
        outcome: Verdict,
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        let (current, result) = match (&self.phase, self.workflow.as_mut()) {
            (Phase::ActiveChallenge(current), Some(workflow)) => {
                (*current, workflow.apply_verdict(task_index, outcome))
            }
            _ => {
                discard_stale(format!("verdict for task {task_index} in {:?}", self.phase));
                return;
            }
        };
        self.after_verdict(current, result, now, effects);
    }

    fn after_verdict(
        &mut self,
        current: usize,
        result: VerdictOutcome,
        now: DateTime<Utc>,
        effects: &mut Vec<Effect>,
    ) {
        match result {
            VerdictOutcome::Approved => {
                tracing::info!(task = current, "task approved");
                if current + 1 < self.tasks.len() {
                    self.enter_active(current + 1, now, effects);
                } else {
                    self.enter_over(effects);
                }
            }
            VerdictOutcome::Rejected => {
                self.notice = Some("Submission rejected, take another photo".into());
            }
            VerdictOutcome::Held | VerdictOutcome::Ignored => {}
        }
    }

    fn enter_waiting_room(&mut self, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        let (Some(schedule), Some(role)) = (self.schedule, self.session.as_ref().map(|s| s.role))
        else {
            return;
        };
        self.leave_phase();
        self.set_phase(Phase::WaitingRoom);
        self.roster = Some(RosterSynchronizer::new(role));
        if self.start_clock(schedule.start, now) {
            self.enter_active(0, now, effects);
        }
    }

    fn enter_active(&mut self, index: usize, now: DateTime<Utc>, effects: &mut Vec<Effect>) {
        let (Some(schedule), Some(role)) = (self.schedule, self.session.as_ref().map(|s| s.role))
        else {
            return;
        };
        let Some(task) = self.tasks.get(index).cloned() else {
            self.enter_over(effects);
            return;
        };
        let organizer = role.is_organizer();

        self.leave_phase();
        self.set_phase(Phase::ActiveChallenge(index));
        if self.start_clock(schedule.end, now) {
            self.enter_over(effects);
            return;
        }

        if organizer {
            self.reviews = Some(ReviewQueue::new(self.config.preview));
            return;
        }
        let mut device = CaptureDeviceManager::new(self.config.preview);
        device.begin_acquire();
        self.workflow = Some(SubmissionWorkflow::new(task, device));
        effects.push(Effect::AcquireDevice { task_index: index });
    }

    fn enter_over(&mut self, effects: &mut Vec<Effect>) {
        self.leave_phase();
        self.set_phase(Phase::ChallengeOver);
        effects.push(Effect::Send(ClientMessage::RequestScoreboard));
    }

    fn close(&mut self, reason: CloseReason) {
        self.leave_phase();
        self.session = None;
        self.final_scores = None;
        self.set_phase(Phase::Closed(reason));
    }

    /// Release everything the current phase owns.
    fn leave_phase(&mut self) {
        if let Some(mut clock) = self.clock.take() {
            clock.stop();
        }
        if let Some(mut workflow) = self.workflow.take() {
            workflow.release_device();
        }
        self.roster = None;
        self.reviews = None;
        self.notice = None;
    }

    fn set_phase(&mut self, next: Phase) {
        tracing::info!(from = ?self.phase, to = ?next, "phase changed");
        self.phase = next;
    }

    /// Returns true if the deadline has already passed.
    fn start_clock(&mut self, deadline: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        self.last_clock_id += 1;
        let (clock, update) =
            ClockReconciler::start(self.last_clock_id, deadline, now, self.ticks.as_ref());
        self.clock = Some(clock);
        matches!(update, ClockUpdate::Expired(_))
    }

    fn current_workflow(&mut self, task_index: usize) -> Option<&mut SubmissionWorkflow> {
        match self.phase {
            Phase::ActiveChallenge(current) if current == task_index => self
                .workflow
                .as_mut()
                .filter(|w| w.task().index == task_index),
            _ => None,
        }
    }
}

fn discard_stale(what: String) {
    let err = ClientError::StaleEvent(what);
    tracing::debug!(error = %err, "event discarded");
}

impl Drop for RoomLifecycle {
    fn drop(&mut self) {
        self.leave_phase();
    }
}
