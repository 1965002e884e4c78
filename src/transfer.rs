//! Attended-transfer orchestration.
//!
//! `att_xfer` spans three legs: B (the transferor, this channel), A (the
//! party B is currently bridged to), and C (the transfer target that
//! FreeSWITCH originates). No single event announces the outcome; it has
//! to be inferred from which pattern of correlated events shows up first.

use std::sync::Arc;

use tracing::debug;

use crate::{
    channel::Channel,
    error::{EslError, EslResult},
    event::{EventMessage, EventName},
};

/// Why an attended transfer failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFailure {
    /// The target never answered.
    NoAnswer,
    /// The target rejected the call.
    CallRejected,
    /// The target answered and then hung up before the transfer completed.
    NormalClearing,
}

/// Outcome of an attended transfer.
#[derive(Debug, Clone)]
pub enum TransferResult {
    /// A and C ended up bridged.
    Transferred,
    /// B pulled both legs into a three-way conversation.
    Threeway,
    /// The transfer failed; `None` when the request itself failed or the
    /// socket disconnected mid-transfer.
    Failed(Option<TransferFailure>),
    /// The original remote party (A) hung up during the transfer.
    Hangup(Arc<EventMessage>),
}

/// Accumulates transfer-related events and decides the outcome.
///
/// Rules are checked in a fixed order after every observation; the first
/// rule whose conjuncts have all been seen wins.
#[derive(Debug)]
pub(crate) struct TransferTracker {
    b_leg: String,
    a_leg: Option<String>,
    c_answered: bool,
    c_hungup: bool,
    b_hungup: bool,
    c_bridge_other: Option<String>,
    a_bridge_other: Option<String>,
    a_hangup: Option<Arc<EventMessage>>,
    execute_complete: Option<Arc<EventMessage>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Leg {
    A,
    B,
    C,
}

impl TransferTracker {
    pub fn new(b_leg: String, a_leg: Option<String>) -> Self {
        Self {
            b_leg,
            a_leg,
            c_answered: false,
            c_hungup: false,
            b_hungup: false,
            c_bridge_other: None,
            a_bridge_other: None,
            a_hangup: None,
            execute_complete: None,
        }
    }

    fn leg_of(&self, uuid: &str) -> Leg {
        if uuid == self.b_leg {
            Leg::B
        } else if self.a_leg.as_deref() == Some(uuid) {
            Leg::A
        } else {
            // Any leg outside {A, B} is the originated target.
            Leg::C
        }
    }

    /// Feed one event; returns the outcome once a rule matches.
    pub fn observe(&mut self, event: &Arc<EventMessage>) -> Option<TransferResult> {
        let Some(uuid) = event.uuid() else {
            return None;
        };
        let leg = self.leg_of(uuid);

        match event.event_name() {
            Some(EventName::ChannelAnswer) if leg == Leg::C => self.c_answered = true,
            Some(EventName::ChannelHangup) => match leg {
                Leg::C => self.c_hungup = true,
                Leg::B => self.b_hungup = true,
                Leg::A => self.a_hangup = Some(event.clone()),
            },
            Some(EventName::ChannelBridge) => {
                let other = event.other_leg_uuid().map(|u| u.into_owned());
                match leg {
                    Leg::C => self.c_bridge_other = other,
                    Leg::A => self.a_bridge_other = other,
                    Leg::B => {}
                }
            }
            Some(EventName::ChannelExecuteComplete)
                if leg == Leg::B && event.application().as_deref() == Some("att_xfer") =>
            {
                self.execute_complete = Some(event.clone());
            }
            _ => {}
        }

        self.decide()
    }

    fn complete_var(&self, name: &str) -> Option<String> {
        self.execute_complete
            .as_ref()
            .and_then(|e| e.get_variable(name).map(|v| v.into_owned()))
    }

    fn decide(&self) -> Option<TransferResult> {
        let disposition = self.complete_var("originate_disposition");

        if self.c_hungup && disposition.as_deref() == Some("NO_ANSWER") {
            return Some(TransferResult::Failed(Some(TransferFailure::NoAnswer)));
        }
        if self.c_hungup && disposition.as_deref() == Some("CALL_REJECTED") {
            return Some(TransferResult::Failed(Some(TransferFailure::CallRejected)));
        }
        if self.c_answered
            && self.c_hungup
            && self.complete_var("att_xfer_result").as_deref() == Some("success")
            && self.complete_var("last_bridge_hangup_cause").as_deref()
                == Some("NORMAL_CLEARING")
            && disposition.as_deref() == Some("SUCCESS")
        {
            return Some(TransferResult::Failed(Some(TransferFailure::NormalClearing)));
        }
        if self
            .complete_var("xfer_uuids")
            .is_some_and(|uuids| !uuids.is_empty())
        {
            return Some(TransferResult::Threeway);
        }
        if self.c_answered
            && self.b_hungup
            && self.a_leg.is_some()
            && self.c_bridge_other == self.a_leg
        {
            return Some(TransferResult::Transferred);
        }
        if self.b_hungup
            && self.c_answered
            && self
                .a_bridge_other
                .as_ref()
                .is_some_and(|other| *other != self.b_leg)
        {
            return Some(TransferResult::Transferred);
        }
        if let Some(event) = &self.a_hangup {
            return Some(TransferResult::Hangup(event.clone()));
        }
        None
    }
}

impl Channel {
    /// Attended transfer of this call to `endpoint`.
    ///
    /// Issues `att_xfer` on this leg and watches the event stream for the
    /// pattern that reveals the outcome (see [`TransferResult`]). The
    /// event subscription is released as soon as the outcome is known. A
    /// failed execute request or a mid-transfer disconnect resolves to
    /// `Failed(None)` rather than an error.
    pub async fn attended_transfer(&self, endpoint: &str) -> EslResult<TransferResult> {
        if self.is_disposed() {
            return Err(EslError::ChannelDisposed);
        }
        let b_leg = self.uuid().to_string();
        let a_leg = self.other_leg_uuid();
        debug!(b_leg = %b_leg, a_leg = ?a_leg, endpoint, "starting attended transfer");

        // Subscribe before issuing so no outcome event can slip past.
        let mut events = self.socket().events();
        let mut tracker = TransferTracker::new(b_leg.clone(), a_leg);

        let issued = self
            .socket()
            .execute_app_async(&b_leg, "att_xfer", Some(endpoint), false)
            .await;
        if let Err(e) = issued {
            return match e {
                EslError::CommandFailed { .. }
                | EslError::Timeout { .. }
                | EslError::ConnectionClosed
                | EslError::NotConnected => Ok(TransferResult::Failed(None)),
                other => Err(other),
            };
        }

        while let Some(item) = events.next().await {
            match item {
                Ok(event) => {
                    if let Some(result) = tracker.observe(&event) {
                        debug!(b_leg = %b_leg, ?result, "attended transfer resolved");
                        return Ok(result);
                    }
                }
                // This subscriber lagged out; without the event pattern the
                // outcome is unknowable.
                Err(_) => return Ok(TransferResult::Failed(None)),
            }
        }
        // Stream ended: socket disconnected mid-transfer.
        Ok(TransferResult::Failed(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const A: &str = "aaaa-1111";
    const B: &str = "bbbb-2222";
    const C: &str = "cccc-3333";

    fn event(name: &str, uuid: &str, extra: &[(&str, &str)]) -> Arc<EventMessage> {
        let mut headers = vec![
            ("Event-Name".to_string(), name.to_string()),
            ("Unique-ID".to_string(), uuid.to_string()),
        ];
        for (k, v) in extra {
            headers.push((k.to_string(), v.to_string()));
        }
        Arc::new(EventMessage::from_headers(headers, None))
    }

    fn tracker() -> TransferTracker {
        TransferTracker::new(B.to_string(), Some(A.to_string()))
    }

    #[test]
    fn no_answer_failure() {
        let mut t = tracker();
        assert!(t.observe(&event("CHANNEL_HANGUP", C, &[])).is_none());
        let result = t.observe(&event(
            "CHANNEL_EXECUTE_COMPLETE",
            B,
            &[
                ("Application", "att_xfer"),
                ("variable_originate_disposition", "NO_ANSWER"),
            ],
        ));
        assert!(matches!(
            result,
            Some(TransferResult::Failed(Some(TransferFailure::NoAnswer)))
        ));
    }

    #[test]
    fn call_rejected_failure() {
        let mut t = tracker();
        // Same pattern in either order.
        assert!(t
            .observe(&event(
                "CHANNEL_EXECUTE_COMPLETE",
                B,
                &[
                    ("Application", "att_xfer"),
                    ("variable_originate_disposition", "CALL_REJECTED"),
                ],
            ))
            .is_none());
        let result = t.observe(&event("CHANNEL_HANGUP", C, &[]));
        assert!(matches!(
            result,
            Some(TransferResult::Failed(Some(TransferFailure::CallRejected)))
        ));
    }

    #[test]
    fn target_answered_then_hung_up() {
        let mut t = tracker();
        t.observe(&event("CHANNEL_ANSWER", C, &[]));
        t.observe(&event("CHANNEL_HANGUP", C, &[]));
        let result = t.observe(&event(
            "CHANNEL_EXECUTE_COMPLETE",
            B,
            &[
                ("Application", "att_xfer"),
                ("variable_att_xfer_result", "success"),
                ("variable_last_bridge_hangup_cause", "NORMAL_CLEARING"),
                ("variable_originate_disposition", "SUCCESS"),
            ],
        ));
        assert!(matches!(
            result,
            Some(TransferResult::Failed(Some(TransferFailure::NormalClearing)))
        ));
    }

    #[test]
    fn threeway_from_xfer_uuids() {
        let mut t = tracker();
        let result = t.observe(&event(
            "CHANNEL_EXECUTE_COMPLETE",
            B,
            &[
                ("Application", "att_xfer"),
                ("variable_xfer_uuids", "cccc-3333,aaaa-1111"),
            ],
        ));
        assert!(matches!(result, Some(TransferResult::Threeway)));
    }

    #[test]
    fn transfer_success_via_c_bridge() {
        // B presses the complete key: C answers, B drops, C bridges to A.
        let mut t = tracker();
        assert!(t.observe(&event("CHANNEL_ANSWER", C, &[])).is_none());
        assert!(t.observe(&event("CHANNEL_HANGUP", B, &[])).is_none());
        let result = t.observe(&event(
            "CHANNEL_BRIDGE",
            C,
            &[("Other-Leg-Unique-ID", A)],
        ));
        assert!(matches!(result, Some(TransferResult::Transferred)));
    }

    #[test]
    fn transfer_success_via_a_bridge() {
        let mut t = tracker();
        assert!(t.observe(&event("CHANNEL_HANGUP", B, &[])).is_none());
        assert!(t.observe(&event("CHANNEL_ANSWER", C, &[])).is_none());
        let result = t.observe(&event(
            "CHANNEL_BRIDGE",
            A,
            &[("Other-Leg-Unique-ID", C)],
        ));
        assert!(matches!(result, Some(TransferResult::Transferred)));
    }

    #[test]
    fn a_bridge_back_to_b_is_not_success() {
        let mut t = tracker();
        t.observe(&event("CHANNEL_HANGUP", B, &[]));
        t.observe(&event("CHANNEL_ANSWER", C, &[]));
        // A re-bridging to B means the transfer was abandoned.
        let result = t.observe(&event(
            "CHANNEL_BRIDGE",
            A,
            &[("Other-Leg-Unique-ID", B)],
        ));
        assert!(result.is_none());
    }

    #[test]
    fn a_leg_hangup_wins_when_nothing_else_matches() {
        let mut t = tracker();
        let result = t.observe(&event(
            "CHANNEL_HANGUP",
            A,
            &[("Hangup-Cause", "NORMAL_CLEARING")],
        ));
        match result {
            Some(TransferResult::Hangup(event)) => {
                assert_eq!(event.uuid(), Some(A));
            }
            other => panic!("expected Hangup, got {:?}", other),
        }
    }

    #[test]
    fn unrelated_execute_complete_ignored() {
        let mut t = tracker();
        t.observe(&event("CHANNEL_HANGUP", C, &[]));
        // A completion for another application must not resolve anything.
        let result = t.observe(&event(
            "CHANNEL_EXECUTE_COMPLETE",
            B,
            &[
                ("Application", "playback"),
                ("variable_originate_disposition", "NO_ANSWER"),
            ],
        ));
        assert!(result.is_none());
    }

    #[test]
    fn c_leg_events_from_unknown_uuid() {
        // Anything outside {A, B} counts as the C leg.
        let mut t = tracker();
        t.observe(&event("CHANNEL_ANSWER", "dddd-9999", &[]));
        t.observe(&event("CHANNEL_HANGUP", B, &[]));
        let result = t.observe(&event(
            "CHANNEL_BRIDGE",
            "dddd-9999",
            &[("Other-Leg-Unique-ID", A)],
        ));
        assert!(matches!(result, Some(TransferResult::Transferred)));
    }
}
