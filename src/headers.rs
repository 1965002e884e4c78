//! Typed names for well-known event headers.

/// Error returned when parsing an unrecognized event header name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseEventHeaderError(pub String);

impl std::fmt::Display for ParseEventHeaderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event header: {}", self.0)
    }
}

impl std::error::Error for ParseEventHeaderError {}

wire_name_enum! {
    error_type: ParseEventHeaderError,
    /// Header names that appear on parsed events (not protocol framing
    /// headers like `Content-Type`). Use with
    /// [`EventMessage::get_header()`](crate::EventMessage::get_header) for
    /// typo-proof lookups.
    pub enum EventHeader {
        EventName => "Event-Name",
        EventSubclass => "Event-Subclass",
        UniqueId => "Unique-ID",
        ChannelCallUuid => "Channel-Call-UUID",
        CallerUniqueId => "Caller-Unique-ID",
        OtherLegUniqueId => "Other-Leg-Unique-ID",
        JobUuid => "Job-UUID",
        ApplicationUuid => "Application-UUID",
        EventUuid => "Event-UUID",
        Application => "Application",
        ApplicationData => "Application-Data",
        ApplicationResponse => "Application-Response",
        ChannelName => "Channel-Name",
        ChannelState => "Channel-State",
        ChannelStateNumber => "Channel-State-Number",
        AnswerState => "Answer-State",
        CallDirection => "Call-Direction",
        HangupCause => "Hangup-Cause",
        DtmfDigit => "DTMF-Digit",
        DtmfDuration => "DTMF-Duration",
        CallerCallerIdName => "Caller-Caller-ID-Name",
        CallerCallerIdNumber => "Caller-Caller-ID-Number",
        CallerDestinationNumber => "Caller-Destination-Number",
        CallerContext => "Caller-Context",
        CoreUuid => "Core-UUID",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_wire_names() {
        assert_eq!(EventHeader::UniqueId.to_string(), "Unique-ID");
        assert_eq!(EventHeader::OtherLegUniqueId.to_string(), "Other-Leg-Unique-ID");
        assert_eq!(EventHeader::ApplicationUuid.to_string(), "Application-UUID");
        assert_eq!(EventHeader::DtmfDigit.to_string(), "DTMF-Digit");
    }

    #[test]
    fn from_str_case_insensitive() {
        assert_eq!("unique-id".parse::<EventHeader>(), Ok(EventHeader::UniqueId));
        assert_eq!("JOB-UUID".parse::<EventHeader>(), Ok(EventHeader::JobUuid));
    }

    #[test]
    fn from_str_unknown() {
        let err = "X-Not-A-Header".parse::<EventHeader>().unwrap_err();
        assert_eq!(err.to_string(), "unknown event header: X-Not-A-Header");
    }

    #[test]
    fn as_ref_str() {
        let h: &str = EventHeader::HangupCause.as_ref();
        assert_eq!(h, "Hangup-Cause");
    }

    #[test]
    fn all_variants_round_trip() {
        for header in EventHeader::ALL {
            let parsed: EventHeader = header.as_str().parse().unwrap();
            assert_eq!(parsed, *header, "round-trip failed for {header}");
        }
    }
}
