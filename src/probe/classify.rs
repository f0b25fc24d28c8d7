// Pure mapping from echo facility outcomes to probe status fields.

use crate::model::ProbeStatus;
use crate::probe::{EchoReply, EchoStatus, TransportError, TransportErrorKind};

pub fn reply_status(reply: &EchoReply) -> ProbeStatus {
    match reply.status {
        EchoStatus::Success => ProbeStatus::Success,
        EchoStatus::TtlExpired => ProbeStatus::TtlExpired,
        EchoStatus::TimedOut => ProbeStatus::TimedOut,
        EchoStatus::DestinationUnreachable => ProbeStatus::Unreachable,
        EchoStatus::Other(_) => ProbeStatus::Unknown,
    }
}

/// Diagnostic attached to a reply, if its status carries one.
pub fn reply_error(reply: &EchoReply) -> Option<String> {
    match &reply.status {
        EchoStatus::Other(desc) => Some(first_clause(desc)),
        _ => None,
    }
}

/// Status and short message for a failed echo attempt.
///
/// Unexpected failures are logged in full; the caller only sees a generic
/// message.
pub fn failure(err: &TransportError) -> (ProbeStatus, String) {
    match err.kind {
        TransportErrorKind::Resolution
        | TransportErrorKind::Socket
        | TransportErrorKind::InvalidArgument
        | TransportErrorKind::Disposed => (ProbeStatus::TransportError, first_clause(&err.message)),
        TransportErrorKind::Unexpected => {
            log::error!("unexpected echo failure: {}", err.message);
            (ProbeStatus::TransportError, "unexpected failure".to_string())
        }
    }
}

/// First clause of a diagnostic: up to the first sentence break, `;`, or
/// OS error suffix, on the first line only.
pub fn first_clause(message: &str) -> String {
    let line = message.lines().next().unwrap_or("").trim();
    let end = [line.find(". "), line.find(';'), line.find(" (os error")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(line.len());
    let clause = line[..end].trim().trim_end_matches('.');
    if clause.is_empty() {
        line.to_string()
    } else {
        clause.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: EchoStatus) -> EchoReply {
        EchoReply {
            status,
            address: None,
            roundtrip_ms: None,
        }
    }

    #[test]
    fn reply_statuses() {
        assert_eq!(reply_status(&reply(EchoStatus::Success)), ProbeStatus::Success);
        assert_eq!(reply_status(&reply(EchoStatus::TtlExpired)), ProbeStatus::TtlExpired);
        assert_eq!(reply_status(&reply(EchoStatus::TimedOut)), ProbeStatus::TimedOut);
        assert_eq!(
            reply_status(&reply(EchoStatus::DestinationUnreachable)),
            ProbeStatus::Unreachable
        );
        assert_eq!(
            reply_status(&reply(EchoStatus::Other("Frag needed".into()))),
            ProbeStatus::Unknown
        );
    }

    #[test]
    fn other_status_keeps_description() {
        let r = reply(EchoStatus::Other("Packet too big. Reduce size".into()));
        assert_eq!(reply_error(&r).as_deref(), Some("Packet too big"));
        assert_eq!(reply_error(&reply(EchoStatus::TimedOut)), None);
    }

    #[test]
    fn transport_failures_are_short() {
        let err = TransportError::new(
            TransportErrorKind::Resolution,
            "No such host is known. (os error 11001)",
        );
        assert_eq!(
            failure(&err),
            (ProbeStatus::TransportError, "No such host is known".to_string())
        );
    }

    #[test]
    fn unexpected_failures_are_generic() {
        let err = TransportError::new(TransportErrorKind::Unexpected, "stack trace ...");
        assert_eq!(
            failure(&err),
            (ProbeStatus::TransportError, "unexpected failure".to_string())
        );
    }

    #[test]
    fn first_clause_keeps_dotted_addresses() {
        assert_eq!(first_clause("10.0.0.1 refused the request; retry later"), "10.0.0.1 refused the request");
        assert_eq!(first_clause("socket error\nsecond line"), "socket error");
        assert_eq!(first_clause("Name or service not known"), "Name or service not known");
    }
}
