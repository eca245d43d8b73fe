//! Messaging topic names.

/// Forward events relayed from participant outboxes.
pub const SAGA_EVENTS: &str = "saga_events";

/// Response events carrying participant outcomes back to the order side.
pub const SAGA_RESPONSES: &str = "saga_responses";
