//! Call-state types extracted from event headers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Channel state from `switch_channel_state_t`, carried in the
/// `Channel-State` header as a string (`CS_ROUTING`) and in
/// `Channel-State-Number` as an integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ChannelState {
    CsNew = 0,
    CsInit = 1,
    CsRouting = 2,
    CsSoftExecute = 3,
    CsExecute = 4,
    CsExchangeMedia = 5,
    CsPark = 6,
    CsConsumeMedia = 7,
    CsHibernate = 8,
    CsReset = 9,
    CsHangup = 10,
    CsReporting = 11,
    CsDestroy = 12,
    CsNone = 13,
}

impl ChannelState {
    /// Parse from the `Channel-State-Number` integer header value.
    pub fn from_number(n: u8) -> Option<Self> {
        match n {
            0 => Some(Self::CsNew),
            1 => Some(Self::CsInit),
            2 => Some(Self::CsRouting),
            3 => Some(Self::CsSoftExecute),
            4 => Some(Self::CsExecute),
            5 => Some(Self::CsExchangeMedia),
            6 => Some(Self::CsPark),
            7 => Some(Self::CsConsumeMedia),
            8 => Some(Self::CsHibernate),
            9 => Some(Self::CsReset),
            10 => Some(Self::CsHangup),
            11 => Some(Self::CsReporting),
            12 => Some(Self::CsDestroy),
            13 => Some(Self::CsNone),
            _ => None,
        }
    }

    /// Integer discriminant matching `switch_channel_state_t`.
    pub fn as_number(&self) -> u8 {
        *self as u8
    }
}

impl fmt::Display for ChannelState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::CsNew => "CS_NEW",
            Self::CsInit => "CS_INIT",
            Self::CsRouting => "CS_ROUTING",
            Self::CsSoftExecute => "CS_SOFT_EXECUTE",
            Self::CsExecute => "CS_EXECUTE",
            Self::CsExchangeMedia => "CS_EXCHANGE_MEDIA",
            Self::CsPark => "CS_PARK",
            Self::CsConsumeMedia => "CS_CONSUME_MEDIA",
            Self::CsHibernate => "CS_HIBERNATE",
            Self::CsReset => "CS_RESET",
            Self::CsHangup => "CS_HANGUP",
            Self::CsReporting => "CS_REPORTING",
            Self::CsDestroy => "CS_DESTROY",
            Self::CsNone => "CS_NONE",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid channel state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseChannelStateError(pub String);

impl fmt::Display for ParseChannelStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown channel state: {}", self.0)
    }
}

impl std::error::Error for ParseChannelStateError {}

impl FromStr for ChannelState {
    type Err = ParseChannelStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "CS_NEW" => Ok(Self::CsNew),
            "CS_INIT" => Ok(Self::CsInit),
            "CS_ROUTING" => Ok(Self::CsRouting),
            "CS_SOFT_EXECUTE" => Ok(Self::CsSoftExecute),
            "CS_EXECUTE" => Ok(Self::CsExecute),
            "CS_EXCHANGE_MEDIA" => Ok(Self::CsExchangeMedia),
            "CS_PARK" => Ok(Self::CsPark),
            "CS_CONSUME_MEDIA" => Ok(Self::CsConsumeMedia),
            "CS_HIBERNATE" => Ok(Self::CsHibernate),
            "CS_RESET" => Ok(Self::CsReset),
            "CS_HANGUP" => Ok(Self::CsHangup),
            "CS_REPORTING" => Ok(Self::CsReporting),
            "CS_DESTROY" => Ok(Self::CsDestroy),
            "CS_NONE" => Ok(Self::CsNone),
            _ => Err(ParseChannelStateError(s.to_string())),
        }
    }
}

/// Answer state from the `Answer-State` header. Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum AnswerState {
    Hangup,
    Answered,
    Early,
    Ringing,
}

impl fmt::Display for AnswerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Hangup => "hangup",
            Self::Answered => "answered",
            Self::Early => "early",
            Self::Ringing => "ringing",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid answer state string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseAnswerStateError(pub String);

impl fmt::Display for ParseAnswerStateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown answer state: {}", self.0)
    }
}

impl std::error::Error for ParseAnswerStateError {}

impl FromStr for AnswerState {
    type Err = ParseAnswerStateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hangup" => Ok(Self::Hangup),
            "answered" => Ok(Self::Answered),
            "early" => Ok(Self::Early),
            "ringing" => Ok(Self::Ringing),
            _ => Err(ParseAnswerStateError(s.to_string())),
        }
    }
}

/// Call direction from the `Call-Direction` header. Wire format is lowercase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[non_exhaustive]
#[allow(missing_docs)]
pub enum CallDirection {
    Inbound,
    Outbound,
}

impl fmt::Display for CallDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Inbound => "inbound",
            Self::Outbound => "outbound",
        };
        f.write_str(name)
    }
}

/// Error returned when parsing an invalid call direction string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseCallDirectionError(pub String);

impl fmt::Display for ParseCallDirectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown call direction: {}", self.0)
    }
}

impl std::error::Error for ParseCallDirectionError {}

impl FromStr for CallDirection {
    type Err = ParseCallDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "inbound" => Ok(Self::Inbound),
            "outbound" => Ok(Self::Outbound),
            _ => Err(ParseCallDirectionError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unrecognized hangup cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseHangupCauseError(pub String);

impl fmt::Display for ParseHangupCauseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown hangup cause: {}", self.0)
    }
}

impl std::error::Error for ParseHangupCauseError {}

wire_name_enum! {
    error_type: ParseHangupCauseError,
    /// Hangup causes from `switch_call_cause_t`, carried in the
    /// `Hangup-Cause` header. Causes in the ITU Q.850 range also parse
    /// from their numeric code, which is what the `hangup_cause_q850`
    /// channel variable carries. Parsing an unlisted cause yields an
    /// error rather than a catch-all, so callers fall back to the raw
    /// header when they care.
    pub enum HangupCause {
        None => "NONE" | "0",
        UnallocatedNumber => "UNALLOCATED_NUMBER" | "1",
        NoRouteTransitNet => "NO_ROUTE_TRANSIT_NET" | "2",
        NoRouteDestination => "NO_ROUTE_DESTINATION" | "3",
        ChannelUnacceptable => "CHANNEL_UNACCEPTABLE" | "6",
        CallAwardedDelivered => "CALL_AWARDED_DELIVERED" | "7",
        NormalClearing => "NORMAL_CLEARING" | "16",
        UserBusy => "USER_BUSY" | "17",
        NoUserResponse => "NO_USER_RESPONSE" | "18",
        NoAnswer => "NO_ANSWER" | "19",
        SubscriberAbsent => "SUBSCRIBER_ABSENT" | "20",
        CallRejected => "CALL_REJECTED" | "21",
        NumberChanged => "NUMBER_CHANGED" | "22",
        RedirectionToNewDestination => "REDIRECTION_TO_NEW_DESTINATION" | "23",
        ExchangeRoutingError => "EXCHANGE_ROUTING_ERROR" | "25",
        DestinationOutOfOrder => "DESTINATION_OUT_OF_ORDER" | "27",
        InvalidNumberFormat => "INVALID_NUMBER_FORMAT" | "28",
        FacilityRejected => "FACILITY_REJECTED" | "29",
        ResponseToStatusEnquiry => "RESPONSE_TO_STATUS_ENQUIRY" | "30",
        NormalUnspecified => "NORMAL_UNSPECIFIED" | "31",
        NormalCircuitCongestion => "NORMAL_CIRCUIT_CONGESTION" | "34",
        NetworkOutOfOrder => "NETWORK_OUT_OF_ORDER" | "38",
        NormalTemporaryFailure => "NORMAL_TEMPORARY_FAILURE" | "41",
        SwitchCongestion => "SWITCH_CONGESTION" | "42",
        AccessInfoDiscarded => "ACCESS_INFO_DISCARDED" | "43",
        RequestedChanUnavail => "REQUESTED_CHAN_UNAVAIL" | "44",
        FacilityNotSubscribed => "FACILITY_NOT_SUBSCRIBED" | "50",
        OutgoingCallBarred => "OUTGOING_CALL_BARRED" | "52",
        IncomingCallBarred => "INCOMING_CALL_BARRED" | "54",
        BearercapabilityNotauth => "BEARERCAPABILITY_NOTAUTH" | "57",
        BearercapabilityNotavail => "BEARERCAPABILITY_NOTAVAIL" | "58",
        ServiceUnavailable => "SERVICE_UNAVAILABLE" | "63",
        BearercapabilityNotimpl => "BEARERCAPABILITY_NOTIMPL" | "65",
        ChanNotImplemented => "CHAN_NOT_IMPLEMENTED" | "66",
        FacilityNotImplemented => "FACILITY_NOT_IMPLEMENTED" | "69",
        ServiceNotImplemented => "SERVICE_NOT_IMPLEMENTED" | "79",
        InvalidCallReference => "INVALID_CALL_REFERENCE" | "81",
        IncompatibleDestination => "INCOMPATIBLE_DESTINATION" | "88",
        InvalidMsgUnspecified => "INVALID_MSG_UNSPECIFIED" | "95",
        MandatoryIeMissing => "MANDATORY_IE_MISSING" | "96",
        MessageTypeNonexist => "MESSAGE_TYPE_NONEXIST" | "97",
        WrongMessage => "WRONG_MESSAGE" | "98",
        IeNonexist => "IE_NONEXIST" | "99",
        InvalidIeContents => "INVALID_IE_CONTENTS" | "100",
        WrongCallState => "WRONG_CALL_STATE" | "101",
        RecoveryOnTimerExpire => "RECOVERY_ON_TIMER_EXPIRE" | "102",
        MandatoryIeLengthError => "MANDATORY_IE_LENGTH_ERROR" | "103",
        ProtocolError => "PROTOCOL_ERROR" | "111",
        Interworking => "INTERWORKING" | "127",
        OriginatorCancel => "ORIGINATOR_CANCEL",
        Crash => "CRASH",
        SystemShutdown => "SYSTEM_SHUTDOWN",
        LoseRace => "LOSE_RACE",
        ManagerRequest => "MANAGER_REQUEST",
        BlindTransfer => "BLIND_TRANSFER",
        AttendedTransfer => "ATTENDED_TRANSFER",
        AllottedTimeout => "ALLOTTED_TIMEOUT",
        UserChallenge => "USER_CHALLENGE",
        MediaTimeout => "MEDIA_TIMEOUT",
        PickedOff => "PICKED_OFF",
        UserNotRegistered => "USER_NOT_REGISTERED",
        ProgressTimeout => "PROGRESS_TIMEOUT",
        GatewayDown => "GATEWAY_DOWN",
    }
}
