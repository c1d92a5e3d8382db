use std::collections::HashMap;
use std::sync::Arc;

use image::RgbImage;
use snaphunt_common::protocol::{ClientMessage, PendingReview, Verdict};
use uuid::Uuid;

use crate::capture::{decode_base64_image, letterbox, FrameSize};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReviewError {
    #[error("submission {0} is not waiting for review")]
    UnknownSubmission(Uuid),
}

#[derive(Debug, Clone)]
pub struct ReviewItem {
    pub review: PendingReview,
    /// Decoded once on arrival; `None` if the upload was not a readable image.
    pub preview: Option<RgbImage>,
}

/// The organizer's inbox of uploads. Every edit swaps in a new list. Decided items are kept
/// aside until the verdict is known to have left, so an undelivered one can come back.
#[derive(Debug)]
pub struct ReviewQueue {
    preview: FrameSize,
    items: Arc<Vec<ReviewItem>>,
    decided: HashMap<Uuid, ReviewItem>,
}

impl ReviewQueue {
    pub fn new(preview: FrameSize) -> Self {
        Self {
            preview,
            items: Arc::new(Vec::new()),
            decided: HashMap::new(),
        }
    }

    /// Queue an upload. Returns false for a file already queued.
    pub fn push(&mut self, review: PendingReview) -> bool {
        if self.decided.contains_key(&review.file_id)
            || self.items.iter().any(|i| i.review.file_id == review.file_id)
        {
            tracing::debug!(file_id = %review.file_id, "duplicate review ignored");
            return false;
        }
        let preview = decode_base64_image(&review.image_base64).map(|img| letterbox(&img, self.preview));
        if preview.is_none() {
            tracing::warn!(file_id = %review.file_id, "submission image could not be decoded");
        }
        tracing::info!(
            file_id = %review.file_id,
            from = %review.display_name,
            task = review.task_index,
            "submission waiting for review"
        );
        let mut items = (*self.items).clone();
        items.push(ReviewItem { review, preview });
        self.items = Arc::new(items);
        true
    }

    pub fn decide(&mut self, file_id: Uuid, outcome: Verdict) -> Result<ClientMessage, ReviewError> {
        let Some(pos) = self.items.iter().position(|i| i.review.file_id == file_id) else {
            return Err(ReviewError::UnknownSubmission(file_id));
        };
        let mut items = (*self.items).clone();
        let item = items.remove(pos);
        self.items = Arc::new(items);
        self.decided.insert(file_id, item);
        tracing::info!(%file_id, ?outcome, remaining = self.len(), "submission reviewed");
        Ok(ClientMessage::ReviewSubmission { file_id, outcome })
    }

    pub fn items(&self) -> Arc<Vec<ReviewItem>> {
        self.items.clone()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Put a decided item back in front of the queue because its verdict never left.
    pub fn restore(&mut self, file_id: Uuid) -> bool {
        let Some(item) = self.decided.remove(&file_id) else {
            return false;
        };
        tracing::info!(%file_id, "verdict not delivered, submission back in queue");
        let mut items = Vec::with_capacity(self.items.len() + 1);
        items.push(item);
        items.extend(self.items.iter().cloned());
        self.items = Arc::new(items);
        true
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;
    use crate::capture::{encode_png, DEFAULT_PREVIEW_SIZE};

    fn review(task_index: usize) -> PendingReview {
        let png = encode_png(&RgbImage::from_pixel(40, 20, Rgb([9, 9, 9]))).unwrap();
        PendingReview {
            file_id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            display_name: "Alice".into(),
            task_index,
            image_base64: png.to_base64(),
        }
    }

    #[test]
    fn test_push_decodes_preview() {
        let mut queue = ReviewQueue::new(DEFAULT_PREVIEW_SIZE);
        assert!(queue.push(review(0)));
        let items = queue.items();
        let preview = items[0].preview.as_ref().unwrap();
        assert_eq!(preview.dimensions(), (200, 200));
    }

    #[test]
    fn test_duplicate_file_is_ignored() {
        let mut queue = ReviewQueue::new(DEFAULT_PREVIEW_SIZE);
        let item = review(0);
        assert!(queue.push(item.clone()));
        assert!(!queue.push(item));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_undecodable_image_still_queued() {
        let mut queue = ReviewQueue::new(DEFAULT_PREVIEW_SIZE);
        let mut item = review(1);
        item.image_base64 = "%%%".into();
        assert!(queue.push(item));
        assert!(queue.items()[0].preview.is_none());
    }

    #[test]
    fn test_decide_sends_verdict_and_removes() {
        let mut queue = ReviewQueue::new(DEFAULT_PREVIEW_SIZE);
        let first = review(0);
        let second = review(1);
        queue.push(first.clone());
        queue.push(second.clone());
        let held = queue.items();

        let msg = queue.decide(first.file_id, Verdict::Rejected).unwrap();
        assert_eq!(
            msg,
            ClientMessage::ReviewSubmission {
                file_id: first.file_id,
                outcome: Verdict::Rejected
            }
        );
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.items()[0].review.file_id, second.file_id);
        assert_eq!(held.len(), 2);

        assert_eq!(
            queue.decide(first.file_id, Verdict::Approved),
            Err(ReviewError::UnknownSubmission(first.file_id))
        );
    }

    #[test]
    fn test_undelivered_verdict_restores_item() {
        let mut queue = ReviewQueue::new(DEFAULT_PREVIEW_SIZE);
        let first = review(0);
        let second = review(1);
        queue.push(first.clone());
        queue.push(second.clone());
        queue.decide(first.file_id, Verdict::Approved).unwrap();

        // a re-announced file that was already decided stays out
        assert!(!queue.push(first.clone()));

        assert!(queue.restore(first.file_id));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.items()[0].review.file_id, first.file_id);
        assert!(!queue.restore(first.file_id));
        assert!(queue.decide(first.file_id, Verdict::Rejected).is_ok());
    }
}
