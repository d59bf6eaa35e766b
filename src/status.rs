//! Status classification.
//!
//! Maps a raw wire status to the closed `RequestStatus` set and a
//! presentation class. Anything that is not exactly `COMPLETE`, `ERROR` or
//! `TIMEOUT` classifies as pending, so the caller keeps polling.

use portal_types::RequestStatus;
use serde::Serialize;

/// CSS-style class used to render a status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PresentationClass {
    Pending,
    Complete,
    Error,
    Timeout,
}

impl PresentationClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Complete => "complete",
            Self::Error => "error",
            Self::Timeout => "timeout",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub status: RequestStatus,
    pub class: PresentationClass,
}

const TABLE: [(RequestStatus, PresentationClass); 4] = [
    (RequestStatus::Pending, PresentationClass::Pending),
    (RequestStatus::Complete, PresentationClass::Complete),
    (RequestStatus::Error, PresentationClass::Error),
    (RequestStatus::Timeout, PresentationClass::Timeout),
];

pub fn classify(raw: &str) -> Classification {
    let status = RequestStatus::parse(raw).unwrap_or(RequestStatus::Pending);
    Classification {
        status,
        class: presentation_class(status),
    }
}

pub fn presentation_class(status: RequestStatus) -> PresentationClass {
    TABLE
        .iter()
        .find(|(s, _)| *s == status)
        .map(|(_, class)| *class)
        .unwrap_or(PresentationClass::Pending)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn terminal_statuses_map_to_their_class() {
        assert_eq!(classify("COMPLETE").class, PresentationClass::Complete);
        assert_eq!(classify("ERROR").class, PresentationClass::Error);
        assert_eq!(classify("TIMEOUT").status, RequestStatus::Timeout);
        assert_eq!(classify("TIMEOUT").class.as_str(), "timeout");
    }

    #[test]
    fn unknown_and_malformed_fall_back_to_pending() {
        for raw in ["PENDING", "", "complete", " COMPLETE", "IN_PROGRESS", "null"] {
            let c = classify(raw);
            assert_eq!(c.status, RequestStatus::Pending, "raw {raw:?}");
            assert_eq!(c.class, PresentationClass::Pending);
        }
    }

    proptest! {
        #[test]
        fn classify_is_total(raw in ".*") {
            let c = classify(&raw);
            if !matches!(raw.as_str(), "COMPLETE" | "ERROR" | "TIMEOUT") {
                prop_assert_eq!(c.status, RequestStatus::Pending);
            } else {
                prop_assert!(c.status.is_terminal());
            }
        }
    }
}
