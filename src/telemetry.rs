//! Standardized span constructors for bridge observability.

use tracing::{Span, info_span};

/// Span for one inbound Matrix event.
pub fn event(event_type: &str, room_id: &str, sender: &str) -> Span {
    info_span!("matrix_event", r#type = %event_type, room_id = %room_id, sender = %sender)
}

/// Span for an IRC client actor.
pub fn irc_client(server: &str, nick: &str) -> Span {
    info_span!("irc_client", server = %server, nick = %nick)
}

/// Span for a provisioning flow.
pub fn flow(name: &'static str, target: &str) -> Span {
    info_span!("provision", flow = name, target = %target)
}
