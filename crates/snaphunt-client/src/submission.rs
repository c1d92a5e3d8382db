//! One task's capture, send and verdict cycle.
//!
//! ```text
//! Idle -> Captured -> Sending -> AwaitingVerdict -> Approved
//!  ^        |  ^         |            |
//!  |        +--+ retake  | failure    | Rejected
//!  |           <---------+            |
//!  +----------------------------------+
//! ```

use snaphunt_common::protocol::{SubmissionReceipt, Verdict};
use snaphunt_common::room::Task;
use uuid::Uuid;

use crate::capture::{CaptureDeviceManager, CaptureError, ImageBlob};
use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkflowState {
    Idle,
    Captured,
    Sending { attempt: u64 },
    AwaitingVerdict { file_id: Uuid },
    Approved,
}

impl WorkflowState {
    fn name(&self) -> &'static str {
        match self {
            WorkflowState::Idle => "idle",
            WorkflowState::Captured => "captured",
            WorkflowState::Sending { .. } => "sending",
            WorkflowState::AwaitingVerdict { .. } => "awaiting verdict",
            WorkflowState::Approved => "approved",
        }
    }
}

/// Submission progress as shown to the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionStatus {
    Captured,
    Sent,
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    #[error("cannot {action} while {state}")]
    InvalidState {
        action: &'static str,
        state: &'static str,
    },
    #[error(transparent)]
    Capture(#[from] CaptureError),
}

/// A send the driver must perform; its result comes back through
/// [`SubmissionWorkflow::finish_upload`] tagged with the same `attempt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub task_index: usize,
    pub attempt: u64,
    pub image: ImageBlob,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Accepted,
    /// Accepted, and a verdict that arrived during the send was applied right away.
    Decided(VerdictOutcome),
    RolledBack(ClientError),
    Ignored,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerdictOutcome {
    Approved,
    Rejected,
    /// Arrived before the upload response; applied once the upload is accepted.
    Held,
    Ignored,
}

#[derive(Debug)]
pub struct SubmissionWorkflow {
    task: Task,
    state: WorkflowState,
    image: Option<ImageBlob>,
    device: CaptureDeviceManager,
    next_attempt: u64,
    rejections: u32,
    last_verdict: Option<Verdict>,
    early_verdict: Option<Verdict>,
}

impl SubmissionWorkflow {
    pub fn new(task: Task, device: CaptureDeviceManager) -> Self {
        Self {
            task,
            state: WorkflowState::Idle,
            image: None,
            device,
            next_attempt: 0,
            rejections: 0,
            last_verdict: None,
            early_verdict: None,
        }
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    pub fn state(&self) -> &WorkflowState {
        &self.state
    }

    pub fn status(&self) -> Option<SubmissionStatus> {
        match self.state {
            WorkflowState::Idle => match self.last_verdict {
                Some(Verdict::Rejected) => Some(SubmissionStatus::Rejected),
                _ => None,
            },
            WorkflowState::Captured => Some(SubmissionStatus::Captured),
            WorkflowState::Sending { .. } => Some(SubmissionStatus::Sent),
            WorkflowState::AwaitingVerdict { .. } => Some(SubmissionStatus::Pending),
            WorkflowState::Approved => Some(SubmissionStatus::Approved),
        }
    }

    pub fn rejections(&self) -> u32 {
        self.rejections
    }

    /// The image held for sending, if any.
    pub fn retained_image(&self) -> Option<&ImageBlob> {
        self.image.as_ref()
    }

    pub fn device(&self) -> &CaptureDeviceManager {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut CaptureDeviceManager {
        &mut self.device
    }

    /// Take a snapshot. Retaking replaces the previous image.
    pub fn capture(&mut self) -> Result<(), WorkflowError> {
        match self.state {
            WorkflowState::Idle | WorkflowState::Captured => {}
            _ => return Err(self.invalid("capture")),
        }
        let image = self.device.capture_snapshot()?;
        tracing::debug!(task = self.task.index, bytes = image.len(), "snapshot captured");
        self.image = Some(image);
        self.last_verdict = None;
        self.early_verdict = None;
        self.state = WorkflowState::Captured;
        Ok(())
    }

    /// Move to `Sending`. The image stays held until the server accepts it.
    pub fn begin_send(&mut self) -> Result<UploadRequest, WorkflowError> {
        if self.state != WorkflowState::Captured {
            return Err(self.invalid("send"));
        }
        let image = self.image.clone().ok_or_else(|| self.invalid("send"))?;
        self.next_attempt += 1;
        let attempt = self.next_attempt;
        self.state = WorkflowState::Sending { attempt };
        tracing::info!(task = self.task.index, attempt, "sending submission");
        Ok(UploadRequest {
            task_index: self.task.index,
            attempt,
            image,
        })
    }

    pub fn finish_upload(
        &mut self,
        attempt: u64,
        result: Result<SubmissionReceipt, ClientError>,
    ) -> UploadOutcome {
        if self.state != (WorkflowState::Sending { attempt }) {
            tracing::debug!(task = self.task.index, attempt, state = self.state.name(), "ignoring stale upload result");
            return UploadOutcome::Ignored;
        }

        let receipt = match result {
            Ok(receipt) if receipt.task_index == self.task.index => receipt,
            Ok(receipt) => {
                return self.roll_back(ClientError::RejectedByServer {
                    status: snaphunt_common::protocol::STATUS_OK,
                    message: format!(
                        "receipt is for task {} instead of {}",
                        receipt.task_index, self.task.index
                    ),
                });
            }
            Err(err) => return self.roll_back(err),
        };

        tracing::info!(task = self.task.index, file_id = %receipt.file_id, "submission accepted for review");
        self.image = None;
        self.state = WorkflowState::AwaitingVerdict {
            file_id: receipt.file_id,
        };
        match self.early_verdict.take() {
            Some(verdict) => UploadOutcome::Decided(self.apply_verdict(self.task.index, verdict)),
            None => UploadOutcome::Accepted,
        }
    }

    /// The server may decide before the upload response reaches us; such a verdict is held
    /// for the attempt in flight.
    pub fn apply_verdict(&mut self, task_index: usize, outcome: Verdict) -> VerdictOutcome {
        if task_index == self.task.index && matches!(self.state, WorkflowState::Sending { .. }) {
            tracing::debug!(task = task_index, ?outcome, "verdict ahead of upload response, holding it");
            self.early_verdict = Some(outcome);
            return VerdictOutcome::Held;
        }
        if task_index != self.task.index
            || !matches!(self.state, WorkflowState::AwaitingVerdict { .. })
        {
            tracing::debug!(
                task = self.task.index,
                verdict_task = task_index,
                state = self.state.name(),
                "ignoring stale verdict"
            );
            return VerdictOutcome::Ignored;
        }

        self.last_verdict = Some(outcome);
        match outcome {
            Verdict::Approved => {
                self.state = WorkflowState::Approved;
                VerdictOutcome::Approved
            }
            Verdict::Rejected => {
                self.rejections += 1;
                self.state = WorkflowState::Idle;
                VerdictOutcome::Rejected
            }
        }
    }

    pub fn release_device(&mut self) {
        self.device.release();
    }

    fn roll_back(&mut self, err: ClientError) -> UploadOutcome {
        tracing::warn!(task = self.task.index, error = %err, "submission not accepted, image kept for retry");
        self.early_verdict = None;
        self.state = WorkflowState::Captured;
        UploadOutcome::RolledBack(err)
    }

    fn invalid(&self, action: &'static str) -> WorkflowError {
        WorkflowError::InvalidState {
            action,
            state: self.state.name(),
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use std::time::Duration;

    use super::*;
    use crate::capture::testing::scripted_handle;
    use crate::capture::{DeviceStatus, DEFAULT_PREVIEW_SIZE};

    pub(crate) fn task(index: usize) -> Task {
        Task {
            index,
            description: format!("task {index}"),
        }
    }

    async fn live_workflow(index: usize) -> SubmissionWorkflow {
        let mut device = CaptureDeviceManager::new(DEFAULT_PREVIEW_SIZE);
        device.begin_acquire();
        let (handle, _) = scripted_handle();
        device.install(Ok(handle)).unwrap();
        for _ in 0..200 {
            if device.status() == DeviceStatus::Live {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        SubmissionWorkflow::new(task(index), device)
    }

    fn receipt(task_index: usize) -> SubmissionReceipt {
        SubmissionReceipt {
            file_id: Uuid::new_v4(),
            task_index,
        }
    }

    #[tokio::test]
    async fn test_happy_path_to_approved() {
        let mut wf = live_workflow(0).await;
        assert_eq!(wf.status(), None);
        wf.capture().unwrap();
        assert_eq!(wf.status(), Some(SubmissionStatus::Captured));

        let req = wf.begin_send().unwrap();
        assert_eq!(wf.status(), Some(SubmissionStatus::Sent));
        assert_eq!(wf.finish_upload(req.attempt, Ok(receipt(0))), UploadOutcome::Accepted);
        assert_eq!(wf.status(), Some(SubmissionStatus::Pending));
        assert!(wf.retained_image().is_none());

        assert_eq!(wf.apply_verdict(0, Verdict::Approved), VerdictOutcome::Approved);
        assert_eq!(wf.state(), &WorkflowState::Approved);
        assert!(wf.capture().is_err());
        wf.release_device();
    }

    #[tokio::test]
    async fn test_transport_failure_keeps_image() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        let original = wf.retained_image().cloned().unwrap();

        let req = wf.begin_send().unwrap();
        let outcome = wf.finish_upload(
            req.attempt,
            Err(ClientError::TransportFailure("connection reset".into())),
        );
        assert!(matches!(outcome, UploadOutcome::RolledBack(ClientError::TransportFailure(_))));
        assert_eq!(wf.state(), &WorkflowState::Captured);
        assert_eq!(wf.retained_image(), Some(&original));

        // retry without recapturing
        let retry = wf.begin_send().unwrap();
        assert_eq!(retry.image, original);
        assert_ne!(retry.attempt, req.attempt);
        wf.release_device();
    }

    #[tokio::test]
    async fn test_server_rejection_rolls_back() {
        let mut wf = live_workflow(1).await;
        wf.capture().unwrap();
        let req = wf.begin_send().unwrap();
        let outcome = wf.finish_upload(
            req.attempt,
            Err(ClientError::RejectedByServer {
                status: 413,
                message: "image too large".into(),
            }),
        );
        assert!(matches!(outcome, UploadOutcome::RolledBack(ClientError::RejectedByServer { status: 413, .. })));
        assert_eq!(wf.state(), &WorkflowState::Captured);
        assert!(wf.retained_image().is_some());

        // a receipt for the wrong task is a rollback as well
        let req = wf.begin_send().unwrap();
        assert!(matches!(
            wf.finish_upload(req.attempt, Ok(receipt(0))),
            UploadOutcome::RolledBack(_)
        ));
        wf.release_device();
    }

    #[tokio::test]
    async fn test_stale_upload_result_is_ignored() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        let first = wf.begin_send().unwrap();
        wf.finish_upload(first.attempt, Err(ClientError::TransportFailure("timeout".into())));
        let second = wf.begin_send().unwrap();

        // the first request's late answer must not complete the second one
        assert_eq!(wf.finish_upload(first.attempt, Ok(receipt(0))), UploadOutcome::Ignored);
        assert_eq!(wf.state(), &WorkflowState::Sending { attempt: second.attempt });
        wf.release_device();
    }

    #[tokio::test]
    async fn test_verdict_for_other_task_changes_nothing() {
        let mut wf = live_workflow(2).await;
        wf.capture().unwrap();
        let req = wf.begin_send().unwrap();
        wf.finish_upload(req.attempt, Ok(receipt(2)));
        let before = wf.state().clone();

        assert_eq!(wf.apply_verdict(1, Verdict::Approved), VerdictOutcome::Ignored);
        assert_eq!(wf.apply_verdict(3, Verdict::Rejected), VerdictOutcome::Ignored);
        assert_eq!(wf.state(), &before);
        wf.release_device();
    }

    #[tokio::test]
    async fn test_verdict_before_upload_is_ignored() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        assert_eq!(wf.apply_verdict(0, Verdict::Approved), VerdictOutcome::Ignored);
        assert_eq!(wf.state(), &WorkflowState::Captured);
        wf.release_device();
    }

    #[tokio::test]
    async fn test_rejection_returns_to_idle_with_device_live() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        let req = wf.begin_send().unwrap();
        wf.finish_upload(req.attempt, Ok(receipt(0)));

        assert_eq!(wf.apply_verdict(0, Verdict::Rejected), VerdictOutcome::Rejected);
        assert_eq!(wf.state(), &WorkflowState::Idle);
        assert_eq!(wf.status(), Some(SubmissionStatus::Rejected));
        assert_eq!(wf.rejections(), 1);
        assert!(wf.device().is_acquired());

        wf.capture().unwrap();
        assert_eq!(wf.status(), Some(SubmissionStatus::Captured));
        wf.release_device();
    }

    #[tokio::test]
    async fn test_verdict_during_send_applies_after_upload() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        let req = wf.begin_send().unwrap();

        assert_eq!(wf.apply_verdict(0, Verdict::Approved), VerdictOutcome::Held);
        assert_eq!(wf.state(), &WorkflowState::Sending { attempt: req.attempt });

        assert_eq!(
            wf.finish_upload(req.attempt, Ok(receipt(0))),
            UploadOutcome::Decided(VerdictOutcome::Approved)
        );
        assert_eq!(wf.state(), &WorkflowState::Approved);
        wf.release_device();
    }

    #[tokio::test]
    async fn test_held_verdict_dropped_on_failed_upload() {
        let mut wf = live_workflow(0).await;
        wf.capture().unwrap();
        let first = wf.begin_send().unwrap();
        assert_eq!(wf.apply_verdict(0, Verdict::Rejected), VerdictOutcome::Held);
        wf.finish_upload(first.attempt, Err(ClientError::TransportFailure("reset".into())));

        let second = wf.begin_send().unwrap();
        assert_eq!(wf.finish_upload(second.attempt, Ok(receipt(0))), UploadOutcome::Accepted);
        assert_eq!(wf.rejections(), 0);
        assert!(matches!(wf.state(), WorkflowState::AwaitingVerdict { .. }));
        wf.release_device();
    }

    #[test]
    fn test_capture_without_device_fails() {
        let mut wf = SubmissionWorkflow::new(task(0), CaptureDeviceManager::new(DEFAULT_PREVIEW_SIZE));
        assert_eq!(wf.capture(), Err(WorkflowError::Capture(CaptureError::NoFrame)));
        assert!(matches!(wf.begin_send(), Err(WorkflowError::InvalidState { action: "send", .. })));
    }
}
