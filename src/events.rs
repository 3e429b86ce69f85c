use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

/// Read views whose cached data depends on a student's enrollments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    Dashboard,
    Profile,
}

pub const ENROLLMENT_VIEWS: &[View] = &[View::Dashboard, View::Profile];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ViewRefresh {
    pub student_id: Uuid,
    pub views: &'static [View],
}

/// Fans out view invalidations after enrollment writes.
///
/// Events are not buffered for subscribers that join later.
#[derive(Debug, Clone)]
pub struct ViewInvalidator {
    sender: broadcast::Sender<ViewRefresh>,
}

impl ViewInvalidator {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ViewRefresh> {
        self.sender.subscribe()
    }

    /// Returns how many subscribers will see the event.
    pub fn invalidate(&self, student_id: Uuid) -> usize {
        let delivered = self
            .sender
            .send(ViewRefresh {
                student_id,
                views: ENROLLMENT_VIEWS,
            })
            .unwrap_or(0);
        tracing::debug!(%student_id, delivered, "enrollment views invalidated");
        delivered
    }
}

impl Default for ViewInvalidator {
    fn default() -> Self {
        Self::new(64)
    }
}
