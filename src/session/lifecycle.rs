//! Session lifecycle engine.
//!
//! Owns the state of the current night and is the only place it is mutated.
//! Mutators take `&mut self`; share the engine as `Arc<Mutex<SessionLifecycle>>`
//! when several callers need it.
//!
//! Session-level transitions are one-way:
//! `Active → Finalizing → Closed`, plus `Active → Closed` through the
//! fallback rules. A closed session rejects every mutator until
//! [`SessionLifecycle::ensure_active_session`] opens the next night.

use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, NaiveTime, Utc};
use tokio::sync::mpsc;

use super::config::SessionLifecycleConfig;
use super::event::SessionEvent;
use super::key::session_key;
use crate::clock::Clock;
use crate::error::ValidationError;
use crate::interval::measure_interval;
use crate::phase::PhaseCalculator;
use crate::types::{
    DosePhase, DoseWindowConfig, DoseWindowContext, SessionState, TerminalState, Timestamp,
    UndoableAction,
};

// ============================================================================
// SessionLifecycle
// ============================================================================

/// Owns one night's [`SessionState`] and its transitions.
pub struct SessionLifecycle {
    config: SessionLifecycleConfig,
    timezone: FixedOffset,
    calculator: PhaseCalculator,
    clock: Arc<dyn Clock>,
    state: Option<SessionState>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl SessionLifecycle {
    /// Creates a lifecycle with no session yet.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid.
    pub fn new(
        config: SessionLifecycleConfig,
        window: DoseWindowConfig,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
    ) -> Result<Self, ValidationError> {
        config.validate()?;
        window.validate()?;
        let timezone = config.timezone()?;
        Ok(Self {
            config,
            timezone,
            calculator: PhaseCalculator::new(window),
            clock,
            state: None,
            event_tx,
        })
    }

    /// Restores a lifecycle around a session loaded from storage.
    ///
    /// # Errors
    ///
    /// Returns an error if either configuration is invalid.
    pub fn with_state(
        config: SessionLifecycleConfig,
        window: DoseWindowConfig,
        clock: Arc<dyn Clock>,
        event_tx: mpsc::UnboundedSender<SessionEvent>,
        state: SessionState,
    ) -> Result<Self, ValidationError> {
        let mut lifecycle = Self::new(config, window, clock, event_tx)?;
        lifecycle.state = Some(state);
        Ok(lifecycle)
    }

    /// Current session, open or closed.
    pub fn state(&self) -> Option<&SessionState> {
        self.state.as_ref()
    }

    /// Key of the current session.
    pub fn session_key(&self) -> Option<&str> {
        self.state.as_ref().map(|s| s.session_key.as_str())
    }

    /// Window context of the current session at the clock's "now".
    pub fn current_context(&self) -> DoseWindowContext {
        self.context_at(self.clock.now())
    }

    /// Window context of the current session at `now`.
    pub fn context_at(&self, now: Timestamp) -> DoseWindowContext {
        match &self.state {
            Some(state) => self.calculator.phase_for(now, state),
            None => self.calculator.phase(now, &Default::default()),
        }
    }

    // ------------------------------------------------------------------------
    // Session identity
    // ------------------------------------------------------------------------

    /// Returns the open session's key, opening a new session if needed.
    ///
    /// A closed session's key is never reused: a session opened before the
    /// rollover hour that would land on the just-closed night is keyed to
    /// the following night instead.
    pub fn ensure_active_session(&mut self, reason: &str) -> String {
        if let Some(state) = self.state.as_ref().filter(|s| !s.is_closed()) {
            return state.session_key.clone();
        }

        let now = self.clock.now();
        let mut key = session_key(now, &self.timezone, self.config.rollover_hour);
        if let Some(closed) = self.state.as_ref().filter(|s| s.session_key == key) {
            let next = session_key(
                now + Duration::days(1),
                &self.timezone,
                self.config.rollover_hour,
            );
            tracing::debug!(closed = %closed.session_key, %next, "night already closed");
            key = next;
        }
        tracing::info!(session_key = %key, reason, "opening session");
        self.state = Some(SessionState::new(key.clone(), now));
        self.emit(SessionEvent::SessionOpened {
            session_key: key.clone(),
            reason: reason.to_string(),
        });
        key
    }

    // ------------------------------------------------------------------------
    // Mutators
    // ------------------------------------------------------------------------

    /// Records dose 1, opening a session if none exists yet.
    ///
    /// # Errors
    ///
    /// Fails if the session is closed or dose 1 is already recorded.
    pub fn record_dose1(&mut self, at: Timestamp) -> Result<DoseWindowContext, ValidationError> {
        if self.state.is_none() {
            self.ensure_active_session("dose1");
        }

        let state = open_mut(&mut self.state)?;
        if state.dose1_at.is_some() {
            return Err(ValidationError::Dose1AlreadyRecorded(
                state.session_key.clone(),
            ));
        }
        state.dose1_at = Some(at);
        tracing::info!(session_key = %state.session_key, %at, "dose 1 recorded");

        self.emit(SessionEvent::Dose1Recorded { at });
        Ok(self.current_context())
    }

    /// Records dose 2, or an extra dose once dose 2 exists.
    ///
    /// For the first dose 2, the window is evaluated at `at`: before the
    /// minimum interval `is_early` must be set; after the window closes the
    /// call is rejected and [`record_late_dose2`](Self::record_late_dose2)
    /// must be used. Doses with index >= 3 are appended to
    /// `extra_doses` and never overwrite `dose2_at`.
    ///
    /// # Errors
    ///
    /// Fails on a closed session, missing dose 1, skipped dose 2, or a
    /// window violation.
    pub fn record_dose2(
        &mut self,
        at: Timestamp,
        is_early: bool,
        is_extra_dose: bool,
    ) -> Result<DoseWindowContext, ValidationError> {
        let window = self.calculator.config().clone();
        let state = open_mut(&mut self.state)?;
        let dose1_at = state.dose1_at.ok_or(ValidationError::Dose1Missing)?;

        if state.dose2_at.is_some() {
            if !is_extra_dose {
                tracing::warn!(
                    session_key = %state.session_key,
                    "dose 2 already recorded; storing as extra dose"
                );
            }
            state.extra_doses.push(at);
            let dose_index = state.dose_count();
            tracing::info!(session_key = %state.session_key, %at, dose_index, "extra dose recorded");
            self.emit(SessionEvent::ExtraDoseRecorded { at, dose_index });
            return Ok(self.current_context());
        }

        if state.dose2_skipped {
            return Err(ValidationError::OutOfRange {
                field: "dose2".to_string(),
                message: "dose 2 was skipped for this session".to_string(),
            });
        }

        let elapsed = measure_interval(dose1_at, at).minutes.max(0);
        if elapsed >= window.max_interval_minutes {
            return Err(ValidationError::WindowExceeded {
                elapsed_minutes: elapsed,
            });
        }
        let early = elapsed < window.min_interval_minutes;
        if early && !is_early {
            return Err(ValidationError::TooEarly {
                elapsed_minutes: elapsed,
                min_minutes: window.min_interval_minutes,
            });
        }

        state.dose2_at = Some(at);
        state.dose2_override = early;
        tracing::info!(session_key = %state.session_key, %at, elapsed, early, "dose 2 recorded");

        self.emit(SessionEvent::Dose2Recorded {
            at,
            overridden: early,
        });
        Ok(self.current_context())
    }

    /// Records dose 2 after an explicit, confirmed late override.
    ///
    /// # Errors
    ///
    /// Fails on a closed session, missing dose 1, or when dose 2 is already
    /// recorded or skipped.
    pub fn record_late_dose2(
        &mut self,
        at: Timestamp,
    ) -> Result<DoseWindowContext, ValidationError> {
        let state = open_mut(&mut self.state)?;
        if state.dose1_at.is_none() {
            return Err(ValidationError::Dose1Missing);
        }
        if state.dose2_at.is_some() || state.dose2_skipped {
            return Err(ValidationError::OutOfRange {
                field: "dose2".to_string(),
                message: "dose 2 already decided for this session".to_string(),
            });
        }

        state.dose2_at = Some(at);
        state.dose2_override = true;
        tracing::warn!(session_key = %state.session_key, %at, "dose 2 recorded via late override");

        self.emit(SessionEvent::Dose2Recorded {
            at,
            overridden: true,
        });
        Ok(self.current_context())
    }

    /// Skips dose 2.
    ///
    /// # Errors
    ///
    /// Fails on a closed session or when skipping is not allowed.
    pub fn record_skip(
        &mut self,
        reason: Option<String>,
    ) -> Result<DoseWindowContext, ValidationError> {
        let context = self.current_context();
        let state = open_mut(&mut self.state)?;
        if state.dose1_at.is_none() {
            return Err(ValidationError::Dose1Missing);
        }
        if !context.skip_allowed {
            return Err(ValidationError::SkipUnavailable {
                phase: context.phase.to_string(),
            });
        }

        state.dose2_skipped = true;
        tracing::info!(session_key = %state.session_key, ?reason, "dose 2 skipped");

        self.emit(SessionEvent::Dose2Skipped { reason });
        Ok(self.current_context())
    }

    /// Applies one snooze to the reminder target.
    ///
    /// # Errors
    ///
    /// Fails on a closed session, at the snooze limit, or outside the
    /// snoozable part of the window.
    pub fn record_snooze(&mut self) -> Result<DoseWindowContext, ValidationError> {
        let max = self.calculator.config().max_snoozes;
        let context = self.current_context();
        let state = open_mut(&mut self.state)?;
        if state.dose1_at.is_none() {
            return Err(ValidationError::Dose1Missing);
        }
        if state.snooze_count >= max {
            return Err(ValidationError::SnoozeLimitReached { max });
        }
        if !context.snooze_allowed {
            return Err(ValidationError::SnoozeUnavailable {
                phase: context.phase.to_string(),
            });
        }

        state.snooze_count += 1;
        let snooze_count = state.snooze_count;
        tracing::info!(session_key = %state.session_key, snooze_count, "snoozed");

        self.emit(SessionEvent::Snoozed { snooze_count });
        Ok(self.current_context())
    }

    /// Records the final wake, moving the session into finalizing.
    ///
    /// # Errors
    ///
    /// Fails on a closed or missing session.
    pub fn record_wake_final(
        &mut self,
        at: Timestamp,
    ) -> Result<DoseWindowContext, ValidationError> {
        let state = open_mut(&mut self.state)?;
        state.wake_final_at = Some(at);
        tracing::info!(session_key = %state.session_key, %at, "final wake recorded");

        self.emit(SessionEvent::WakeFinalRecorded { at });
        Ok(self.current_context())
    }

    /// Saves the morning check-in and closes the session.
    ///
    /// # Errors
    ///
    /// Fails on a closed or missing session.
    pub fn record_check_in(&mut self) -> Result<DoseWindowContext, ValidationError> {
        let state = open_mut(&mut self.state)?;
        state.check_in_completed = true;
        let terminal = if state.dose2_skipped {
            TerminalState::Skipped
        } else {
            TerminalState::Completed
        };
        self.emit(SessionEvent::CheckInCompleted);

        let now = self.clock.now();
        self.close_active_session(now, terminal, "check_in")?;
        Ok(self.current_context())
    }

    /// Reverts a previously recorded action (undo callback target).
    ///
    /// # Errors
    ///
    /// Fails on a closed session or when the action no longer matches the
    /// recorded state.
    pub fn revert(
        &mut self,
        action: &UndoableAction,
    ) -> Result<DoseWindowContext, ValidationError> {
        let state = open_mut(&mut self.state)?;
        let reverted = match action {
            UndoableAction::TakeDose1 { at } => {
                if state.dose1_at == Some(*at) && state.dose2_at.is_none() && !state.dose2_skipped
                {
                    state.dose1_at = None;
                    state.snooze_count = 0;
                    true
                } else {
                    false
                }
            }
            UndoableAction::TakeDose2 { at } => {
                if state.extra_doses.last() == Some(at) {
                    state.extra_doses.pop();
                    true
                } else if state.dose2_at == Some(*at) && state.extra_doses.is_empty() {
                    state.dose2_at = None;
                    state.dose2_override = false;
                    true
                } else {
                    false
                }
            }
            UndoableAction::SkipDose { .. } => std::mem::replace(&mut state.dose2_skipped, false),
            UndoableAction::Snooze { previous_count } => {
                if state.snooze_count == previous_count.saturating_add(1) {
                    state.snooze_count = *previous_count;
                    true
                } else {
                    false
                }
            }
        };

        if !reverted {
            return Err(ValidationError::OutOfRange {
                field: "action".to_string(),
                message: format!("{action:?} does not match the recorded state"),
            });
        }
        tracing::info!(session_key = %state.session_key, ?action, "action reverted");

        self.emit(SessionEvent::ActionReverted {
            action: action.clone(),
        });
        Ok(self.current_context())
    }

    // ------------------------------------------------------------------------
    // Closing
    // ------------------------------------------------------------------------

    /// Closes the session if a fallback rule fires.
    ///
    /// Rules: missed check-in cutoff (`now >= anchor + cutoff`, anchored on
    /// dose 1 when recorded and on `started_at` otherwise) and prep-time soft
    /// rollover (`now >= prep_time && started_at < prep_time`). Neither rule
    /// fires while dose 2 is still pending in `BeforeWindow`, `Active` or
    /// `NearClose`. Idempotent: returns `None` when nothing changed.
    pub fn evaluate_boundaries(&mut self, reason: &str) -> Option<TerminalState> {
        let now = self.clock.now();
        let state = self.state.as_ref().filter(|s| !s.is_closed())?;
        let started_at = state.started_at;
        let anchor = state.dose1_at.unwrap_or(started_at);

        let phase = self.calculator.phase_for(now, state).phase;
        if matches!(
            phase,
            DosePhase::BeforeWindow | DosePhase::Active | DosePhase::NearClose
        ) {
            return None;
        }

        let cutoff = Duration::try_hours(self.config.missed_check_in_cutoff_hours)
            .and_then(|cutoff| anchor.checked_add_signed(cutoff))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let terminal = if now >= cutoff {
            tracing::info!(%anchor, %now, "missed check-in cutoff reached");
            TerminalState::Expired
        } else {
            let prep = self.prep_time_on_local_day(now)?;
            if now >= prep && started_at < prep {
                tracing::info!(%started_at, %prep, "prep-time soft rollover");
                TerminalState::RolledOver
            } else {
                return None;
            }
        };

        let reason = format!("{reason}: {}", terminal.as_str());
        self.close_active_session(now, terminal, &reason).ok()?;
        Some(terminal)
    }

    /// Closes the open session.
    ///
    /// # Errors
    ///
    /// Fails if there is no open session.
    pub fn close_active_session(
        &mut self,
        at: Timestamp,
        terminal_state: TerminalState,
        reason: &str,
    ) -> Result<(), ValidationError> {
        let state = open_mut(&mut self.state)?;
        state.closed_at = Some(at);
        state.terminal_state = Some(terminal_state);
        let session_key = state.session_key.clone();
        tracing::info!(%session_key, terminal = terminal_state.as_str(), reason, "session closed");

        self.emit(SessionEvent::SessionClosed {
            session_key,
            terminal_state,
            reason: reason.to_string(),
        });
        Ok(())
    }

    /// Prep time on the local calendar day of `now`, as a UTC instant.
    fn prep_time_on_local_day(&self, now: Timestamp) -> Option<Timestamp> {
        let minutes = self.config.prep_time_minutes?;
        let time = NaiveTime::from_hms_opt(minutes / 60, minutes % 60, 0)?;
        let local_day = now.with_timezone(&self.timezone).date_naive();
        local_day
            .and_time(time)
            .and_local_timezone(self.timezone)
            .single()
            .map(|t| t.with_timezone(&Utc))
    }

    fn emit(&self, event: SessionEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::debug!("session event receiver dropped");
        }
    }
}

/// Open session, or the reason there is none.
fn open_mut(state: &mut Option<SessionState>) -> Result<&mut SessionState, ValidationError> {
    match state {
        None => Err(ValidationError::NoActiveSession),
        Some(s) if s.is_closed() => Err(ValidationError::SessionClosed(s.session_key.clone())),
        Some(s) => Ok(s),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use crate::types::{DosePhase, SessionStatus};
    use chrono::TimeZone;

    fn evening() -> Timestamp {
        Utc.with_ymd_and_hms(2026, 3, 10, 22, 30, 0).unwrap()
    }

    fn create_lifecycle_with_config(
        config: SessionLifecycleConfig,
    ) -> (
        SessionLifecycle,
        Arc<MockClock>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let clock = Arc::new(MockClock::new(evening()));
        let lifecycle =
            SessionLifecycle::new(config, DoseWindowConfig::default(), clock.clone(), tx)
                .unwrap();
        (lifecycle, clock, rx)
    }

    fn create_lifecycle() -> (
        SessionLifecycle,
        Arc<MockClock>,
        mpsc::UnboundedReceiver<SessionEvent>,
    ) {
        create_lifecycle_with_config(SessionLifecycleConfig::default())
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    mod identity_tests {
        use super::*;

        #[test]
        fn test_ensure_opens_once() {
            let (mut lifecycle, _clock, mut rx) = create_lifecycle();
            let key = lifecycle.ensure_active_session("test");
            assert_eq!(key, "2026-03-10");
            assert_eq!(lifecycle.ensure_active_session("again"), key);

            let events = drain(&mut rx);
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], SessionEvent::SessionOpened { .. }));
        }

        #[test]
        fn test_after_midnight_keeps_evening_key() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap());
            assert_eq!(lifecycle.ensure_active_session("late"), "2026-03-10");
        }

        #[test]
        fn test_dose1_opens_session() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            let ctx = lifecycle.record_dose1(evening()).unwrap();
            assert_eq!(ctx.phase, DosePhase::BeforeWindow);
            assert_eq!(lifecycle.session_key(), Some("2026-03-10"));
        }

        #[test]
        fn test_mutators_without_session() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            assert_eq!(
                lifecycle.record_wake_final(evening()),
                Err(ValidationError::NoActiveSession)
            );
            assert_eq!(lifecycle.current_context().phase, DosePhase::NoDose1);
        }

        #[test]
        fn test_invalid_config_rejected() {
            let (tx, _rx) = mpsc::unbounded_channel();
            let window = DoseWindowConfig {
                min_interval_minutes: 300,
                ..DoseWindowConfig::default()
            };
            let result = SessionLifecycle::new(
                SessionLifecycleConfig::default(),
                window,
                Arc::new(MockClock::new(evening())),
                tx,
            );
            assert!(result.is_err());
        }
    }

    mod dose_tests {
        use super::*;

        #[test]
        fn test_dose1_twice_rejected() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            assert!(matches!(
                lifecycle.record_dose1(evening()),
                Err(ValidationError::Dose1AlreadyRecorded(_))
            ));
        }

        #[test]
        fn test_dose2_requires_dose1() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.ensure_active_session("test");
            assert_eq!(
                lifecycle.record_dose2(evening(), false, false),
                Err(ValidationError::Dose1Missing)
            );
        }

        #[test]
        fn test_dose2_in_window_completes() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.advance_minutes(170);
            let ctx = lifecycle
                .record_dose2(evening() + Duration::minutes(170), false, false)
                .unwrap();
            assert_eq!(ctx.phase, DosePhase::Completed);

            let state = lifecycle.state().unwrap();
            assert_eq!(state.dose_interval().unwrap().minutes, 170);
            assert!(!state.dose2_override);
        }

        #[test]
        fn test_early_dose2_requires_confirmation() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let at = evening() + Duration::minutes(120);

            assert_eq!(
                lifecycle.record_dose2(at, false, false),
                Err(ValidationError::TooEarly {
                    elapsed_minutes: 120,
                    min_minutes: 150
                })
            );
            lifecycle.record_dose2(at, true, false).unwrap();
            assert!(lifecycle.state().unwrap().dose2_override);
        }

        #[test]
        fn test_late_dose2_requires_override() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let at = evening() + Duration::minutes(240);

            assert_eq!(
                lifecycle.record_dose2(at, false, false),
                Err(ValidationError::WindowExceeded {
                    elapsed_minutes: 240
                })
            );
            assert_eq!(lifecycle.state().unwrap().dose2_at, None);

            lifecycle.record_late_dose2(at).unwrap();
            let state = lifecycle.state().unwrap();
            assert_eq!(state.dose2_at, Some(at));
            assert!(state.dose2_override);
        }

        #[test]
        fn test_third_dose_is_extra_and_keeps_dose2() {
            let (mut lifecycle, _clock, mut rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let dose2 = evening() + Duration::minutes(165);
            lifecycle.record_dose2(dose2, false, false).unwrap();

            let extra = evening() + Duration::minutes(200);
            lifecycle.record_dose2(extra, false, true).unwrap();

            let state = lifecycle.state().unwrap();
            assert_eq!(state.dose2_at, Some(dose2));
            assert_eq!(state.extra_doses, vec![extra]);
            assert_eq!(state.dose_count(), 3);

            let events = drain(&mut rx);
            assert!(events.contains(&SessionEvent::ExtraDoseRecorded {
                at: extra,
                dose_index: 3
            }));
        }

        #[test]
        fn test_dose2_after_skip_rejected() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            lifecycle.record_skip(None).unwrap();
            assert!(lifecycle
                .record_dose2(evening() + Duration::minutes(160), false, false)
                .is_err());
        }
    }

    mod skip_and_snooze_tests {
        use super::*;

        #[test]
        fn test_skip_completes() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let ctx = lifecycle.record_skip(Some("felt fine".into())).unwrap();
            assert_eq!(ctx.phase, DosePhase::Completed);
        }

        #[test]
        fn test_skip_twice_rejected() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            lifecycle.record_skip(None).unwrap();
            assert!(matches!(
                lifecycle.record_skip(None),
                Err(ValidationError::SkipUnavailable { .. })
            ));
        }

        #[test]
        fn test_snooze_until_limit() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.advance_minutes(160);

            for expected in 1..=3u8 {
                let ctx = lifecycle.record_snooze().unwrap();
                assert_eq!(ctx.snooze_count, expected);
            }
            assert_eq!(
                lifecycle.record_snooze(),
                Err(ValidationError::SnoozeLimitReached { max: 3 })
            );
        }

        #[test]
        fn test_snooze_outside_active_rejected() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            assert!(matches!(
                lifecycle.record_snooze(),
                Err(ValidationError::SnoozeUnavailable { .. })
            ));

            clock.advance_minutes(230);
            assert!(matches!(
                lifecycle.record_snooze(),
                Err(ValidationError::SnoozeUnavailable { .. })
            ));
        }

        #[test]
        fn test_snooze_moves_target() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.advance_minutes(155);
            let ctx = lifecycle.record_snooze().unwrap();
            assert_eq!(ctx.target_at, Some(evening() + Duration::minutes(175)));
        }
    }

    mod closing_tests {
        use super::*;

        #[test]
        fn test_wake_then_check_in_closes() {
            let (mut lifecycle, clock, mut rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            lifecycle
                .record_dose2(evening() + Duration::minutes(165), false, false)
                .unwrap();

            clock.advance_minutes(480);
            lifecycle.record_wake_final(clock.now()).unwrap();
            assert_eq!(
                lifecycle.state().unwrap().status(),
                SessionStatus::Finalizing
            );

            lifecycle.record_check_in().unwrap();
            let state = lifecycle.state().unwrap();
            assert_eq!(state.status(), SessionStatus::Closed);
            assert_eq!(state.terminal_state, Some(TerminalState::Completed));

            let closes = drain(&mut rx).into_iter().filter(|e| e.is_close()).count();
            assert_eq!(closes, 1);
        }

        #[test]
        fn test_finalizing_phase_without_dose2() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.advance_minutes(100);
            let ctx = lifecycle.record_wake_final(clock.now()).unwrap();
            assert_eq!(ctx.phase, DosePhase::Finalizing);
        }

        #[test]
        fn test_check_in_after_skip_is_skipped_terminal() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            lifecycle.record_skip(None).unwrap();
            lifecycle.record_check_in().unwrap();
            assert_eq!(
                lifecycle.state().unwrap().terminal_state,
                Some(TerminalState::Skipped)
            );
        }

        #[test]
        fn test_closed_session_rejects_mutators() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            lifecycle
                .close_active_session(evening(), TerminalState::Completed, "test")
                .unwrap();

            let closed = ValidationError::SessionClosed("2026-03-10".into());
            assert_eq!(lifecycle.record_dose1(evening()), Err(closed.clone()));
            assert_eq!(
                lifecycle.record_dose2(evening(), true, false),
                Err(closed.clone())
            );
            assert_eq!(lifecycle.record_skip(None), Err(closed.clone()));
            assert_eq!(lifecycle.record_snooze(), Err(closed.clone()));
            assert_eq!(lifecycle.record_wake_final(evening()), Err(closed.clone()));
            assert_eq!(lifecycle.record_check_in(), Err(closed.clone()));
            assert_eq!(
                lifecycle.close_active_session(evening(), TerminalState::Expired, "again"),
                Err(closed)
            );
        }

        #[test]
        fn test_ensure_after_close_opens_new_session() {
            let (mut lifecycle, clock, mut rx) = create_lifecycle();
            lifecycle.ensure_active_session("test");
            lifecycle
                .close_active_session(evening(), TerminalState::Completed, "test")
                .unwrap();

            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 21, 0, 0).unwrap());
            assert_eq!(lifecycle.ensure_active_session("next"), "2026-03-11");
            assert!(!lifecycle.state().unwrap().is_closed());

            let opened = drain(&mut rx)
                .into_iter()
                .filter(|e| matches!(e, SessionEvent::SessionOpened { .. }))
                .count();
            assert_eq!(opened, 2);
        }

        #[test]
        fn test_same_morning_event_after_check_in_keys_next_night() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 1, 0, 0).unwrap());
            lifecycle.record_skip(None).unwrap();
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 7, 0, 0).unwrap());
            lifecycle.record_wake_final(clock.now()).unwrap();
            lifecycle.record_check_in().unwrap();
            assert_eq!(lifecycle.session_key(), Some("2026-03-10"));

            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 10, 0, 0).unwrap());
            assert_eq!(lifecycle.ensure_active_session("morning event"), "2026-03-11");

            // The next evening stays on the same night.
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 22, 0, 0).unwrap());
            assert_eq!(lifecycle.ensure_active_session("evening"), "2026-03-11");
        }

        #[test]
        fn test_cutoff_anchored_on_dose1() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 19, 0, 0).unwrap());
            lifecycle.ensure_active_session("lights_out");
            lifecycle.record_dose1(evening()).unwrap();

            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 23, 0, 0).unwrap());
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 1, 15, 0).unwrap());
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);
            assert_eq!(lifecycle.current_context().phase, DosePhase::Active);
            let ctx = lifecycle.record_dose2(clock.now(), false, false).unwrap();
            assert_eq!(ctx.phase, DosePhase::Completed);

            // Four hours after dose 1, with the dose decision made.
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 2, 30, 0).unwrap());
            assert_eq!(
                lifecycle.evaluate_boundaries("tick"),
                Some(TerminalState::Expired)
            );
        }

        #[test]
        fn test_no_boundary_while_dose2_pending() {
            let config = SessionLifecycleConfig {
                missed_check_in_cutoff_hours: 1,
                ..SessionLifecycleConfig::default().with_prep_time(21, 0)
            };
            let (mut lifecycle, clock, _rx) = create_lifecycle_with_config(config);
            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 20, 0, 0).unwrap());
            lifecycle.ensure_active_session("early event");
            lifecycle.record_dose1(clock.now()).unwrap();

            // Past both the cutoff and prep time
            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 21, 30, 0).unwrap());
            assert_eq!(lifecycle.current_context().phase, DosePhase::BeforeWindow);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.advance_minutes(75);
            assert_eq!(lifecycle.current_context().phase, DosePhase::Active);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.advance_minutes(65);
            assert_eq!(lifecycle.current_context().phase, DosePhase::NearClose);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.advance_minutes(10);
            assert_eq!(lifecycle.current_context().phase, DosePhase::Closed);
            assert_eq!(
                lifecycle.evaluate_boundaries("tick"),
                Some(TerminalState::Expired)
            );
        }

        #[test]
        fn test_missed_check_in_cutoff() {
            let (mut lifecycle, clock, mut rx) = create_lifecycle();
            lifecycle.ensure_active_session("test");

            clock.advance_minutes(239);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.advance_minutes(1);
            assert_eq!(
                lifecycle.evaluate_boundaries("tick"),
                Some(TerminalState::Expired)
            );
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            let closes = drain(&mut rx).into_iter().filter(|e| e.is_close()).count();
            assert_eq!(closes, 1);
        }

        #[test]
        fn test_prep_time_soft_rollover() {
            let config = SessionLifecycleConfig {
                missed_check_in_cutoff_hours: 48,
                ..SessionLifecycleConfig::default().with_prep_time(21, 0)
            };
            let (mut lifecycle, clock, _rx) = create_lifecycle_with_config(config);
            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 19, 0, 0).unwrap());
            lifecycle.ensure_active_session("early event");

            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 20, 59, 0).unwrap());
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            clock.set(Utc.with_ymd_and_hms(2026, 3, 10, 21, 0, 0).unwrap());
            assert_eq!(
                lifecycle.evaluate_boundaries("tick"),
                Some(TerminalState::RolledOver)
            );
        }

        #[test]
        fn test_prep_time_ignores_session_started_after_prep() {
            let config = SessionLifecycleConfig {
                missed_check_in_cutoff_hours: 48,
                ..SessionLifecycleConfig::default().with_prep_time(21, 0)
            };
            let (mut lifecycle, clock, _rx) = create_lifecycle_with_config(config);
            lifecycle.ensure_active_session("dose");

            clock.advance_minutes(60);
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);

            // Next evening's prep time rolls it over
            clock.set(Utc.with_ymd_and_hms(2026, 3, 11, 21, 0, 0).unwrap());
            assert_eq!(
                lifecycle.evaluate_boundaries("tick"),
                Some(TerminalState::RolledOver)
            );
        }

        #[test]
        fn test_evaluate_without_session_is_noop() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            assert_eq!(lifecycle.evaluate_boundaries("tick"), None);
        }
    }

    mod revert_tests {
        use super::*;

        #[test]
        fn test_revert_dose2() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let at = evening() + Duration::minutes(160);
            lifecycle.record_dose2(at, false, false).unwrap();

            lifecycle
                .revert(&UndoableAction::TakeDose2 { at })
                .unwrap();
            assert_eq!(lifecycle.state().unwrap().dose2_at, None);
        }

        #[test]
        fn test_revert_extra_dose_first() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let dose2 = evening() + Duration::minutes(160);
            let extra = evening() + Duration::minutes(200);
            lifecycle.record_dose2(dose2, false, false).unwrap();
            lifecycle.record_dose2(extra, false, true).unwrap();

            assert!(lifecycle
                .revert(&UndoableAction::TakeDose2 { at: dose2 })
                .is_err());
            lifecycle
                .revert(&UndoableAction::TakeDose2 { at: extra })
                .unwrap();
            assert!(lifecycle.state().unwrap().extra_doses.is_empty());
            assert_eq!(lifecycle.state().unwrap().dose2_at, Some(dose2));
        }

        #[test]
        fn test_revert_skip_and_snooze() {
            let (mut lifecycle, clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            clock.advance_minutes(160);
            lifecycle.record_snooze().unwrap();
            lifecycle
                .revert(&UndoableAction::Snooze { previous_count: 0 })
                .unwrap();
            assert_eq!(lifecycle.state().unwrap().snooze_count, 0);

            lifecycle.record_skip(None).unwrap();
            lifecycle
                .revert(&UndoableAction::SkipDose { reason: None })
                .unwrap();
            assert!(!lifecycle.state().unwrap().dose2_skipped);
            assert!(lifecycle
                .revert(&UndoableAction::SkipDose { reason: None })
                .is_err());
        }

        #[test]
        fn test_revert_dose1() {
            let (mut lifecycle, _clock, _rx) = create_lifecycle();
            lifecycle.record_dose1(evening()).unwrap();
            let ctx = lifecycle
                .revert(&UndoableAction::TakeDose1 { at: evening() })
                .unwrap();
            assert_eq!(ctx.phase, DosePhase::NoDose1);
        }
    }

    #[test]
    fn test_restore_with_state() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let mut state = SessionState::new("2026-03-10", evening());
        state.dose1_at = Some(evening());
        let clock = Arc::new(MockClock::new(evening() + Duration::minutes(226)));
        let lifecycle = SessionLifecycle::with_state(
            SessionLifecycleConfig::default(),
            DoseWindowConfig::default(),
            clock,
            tx,
            state,
        )
        .unwrap();
        assert_eq!(lifecycle.current_context().phase, DosePhase::NearClose);
    }
}
