//! Notification dispatcher contract.
//!
//! The engine never delivers anything itself. It hands schedule and cancel
//! requests to a [`NotificationDispatcher`] and does not wait for delivery.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

use crate::error::DispatchError;

/// Opaque handle returned by [`NotificationDispatcher::schedule`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScheduleId(pub String);

impl ScheduleId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ScheduleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Reminder,
    StreakRecovery,
    MilestoneCelebration,
    MilestoneApproaching,
}

impl NotificationKind {
    pub const ALL: [NotificationKind; 4] = [
        NotificationKind::Reminder,
        NotificationKind::StreakRecovery,
        NotificationKind::MilestoneCelebration,
        NotificationKind::MilestoneApproaching,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationKind::Reminder => "reminder",
            NotificationKind::StreakRecovery => "streak_recovery",
            NotificationKind::MilestoneCelebration => "milestone_celebration",
            NotificationKind::MilestoneApproaching => "milestone_approaching",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        let s = s.to_ascii_lowercase().replace('-', "_");
        Self::ALL.into_iter().find(|kind| kind.as_str() == s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationPayload {
    pub habit_id: String,
    pub kind: NotificationKind,
    pub title: String,
    pub body: String,
    pub frequency_multiplier: f64,
}

/// Trait for whatever actually fires reminders.
///
/// Implementations must not block; delivery is best-effort.
pub trait NotificationDispatcher: Send + Sync {
    /// Ask for `payload` to fire at `hour` (0-23).
    fn schedule(&self, hour: u8, payload: &NotificationPayload) -> Result<ScheduleId, DispatchError>;

    /// Cancel one pending notification. Unknown ids are ignored.
    fn cancel(&self, id: &ScheduleId) -> Result<(), DispatchError>;

    fn cancel_all(&self) -> Result<(), DispatchError>;
}

/// Request forwarded by [`ChannelDispatcher`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum DispatchRequest {
    Schedule {
        id: ScheduleId,
        hour: u8,
        payload: NotificationPayload,
    },
    Cancel {
        id: ScheduleId,
    },
    CancelAll,
}

/// Receiving end of a [`ChannelDispatcher`].
pub type DispatchReceiver = UnboundedReceiver<DispatchRequest>;

/// Take every request currently queued, without waiting.
pub fn drain_pending(rx: &mut DispatchReceiver) -> Vec<DispatchRequest> {
    let mut requests = Vec::new();
    while let Ok(request) = rx.try_recv() {
        requests.push(request);
    }
    requests
}

/// Dispatcher that forwards requests to the application shell over an
/// unbounded channel. Sending never blocks; a dropped receiver surfaces as
/// [`DispatchError::Closed`].
#[derive(Debug, Clone)]
pub struct ChannelDispatcher {
    tx: UnboundedSender<DispatchRequest>,
}

impl ChannelDispatcher {
    pub fn channel() -> (Self, DispatchReceiver) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, request: DispatchRequest) -> Result<(), DispatchError> {
        self.tx.send(request).map_err(|_| DispatchError::Closed)
    }
}

impl NotificationDispatcher for ChannelDispatcher {
    fn schedule(&self, hour: u8, payload: &NotificationPayload) -> Result<ScheduleId, DispatchError> {
        if hour > 23 {
            return Err(DispatchError::Rejected(format!("hour {hour} outside 0..=23")));
        }
        let id = ScheduleId::generate();
        self.send(DispatchRequest::Schedule {
            id: id.clone(),
            hour,
            payload: payload.clone(),
        })?;
        Ok(id)
    }

    fn cancel(&self, id: &ScheduleId) -> Result<(), DispatchError> {
        self.send(DispatchRequest::Cancel { id: id.clone() })
    }

    fn cancel_all(&self) -> Result<(), DispatchError> {
        self.send(DispatchRequest::CancelAll)
    }
}
