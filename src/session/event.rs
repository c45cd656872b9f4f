//! Session events pushed to subscribers.

use crate::types::{TerminalState, Timestamp, UndoableAction};

/// Session lifecycle events, delivered over an mpsc channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// A new session was opened
    SessionOpened {
        /// Key of the new session
        session_key: String,
        /// Why it was opened
        reason: String,
    },
    /// Dose 1 recorded
    Dose1Recorded {
        /// Dose time
        at: Timestamp,
    },
    /// Dose 2 recorded
    Dose2Recorded {
        /// Dose time
        at: Timestamp,
        /// Recorded early or through a late override
        overridden: bool,
    },
    /// Dose with index >= 3 recorded
    ExtraDoseRecorded {
        /// Dose time
        at: Timestamp,
        /// 1-based dose index
        dose_index: usize,
    },
    /// Dose 2 skipped
    Dose2Skipped {
        /// Optional reason
        reason: Option<String>,
    },
    /// Reminder snoozed
    Snoozed {
        /// Snooze count after the snooze
        snooze_count: u8,
    },
    /// Final wake logged
    WakeFinalRecorded {
        /// Wake time
        at: Timestamp,
    },
    /// Morning check-in saved
    CheckInCompleted,
    /// A recorded action was reverted
    ActionReverted {
        /// The reverted action
        action: UndoableAction,
    },
    /// Session closed; emitted exactly once per session
    SessionClosed {
        /// Key of the closed session
        session_key: String,
        /// Terminal state
        terminal_state: TerminalState,
        /// Why it was closed
        reason: String,
    },
}

impl SessionEvent {
    /// Returns true for the close event.
    pub fn is_close(&self) -> bool {
        matches!(self, SessionEvent::SessionClosed { .. })
    }
}
