//! Consensus and request response codes
//!
//! Election replies are a single `i64`: a non-negative value is the
//! responder's term (the elector's term was stale), a negative value is one
//! of the agreed codes below. Non-query requests return a numeric status
//! code where `200` is success.

/// The responder grants the vote or accepts the entries.
pub const RESPONSE_AGREE: i64 = -1;

/// The elector's data log is older than the responder's.
pub const RESPONSE_LOG_MISMATCH: i64 = -2;

/// The responder already voted for another elector in this term.
pub const RESPONSE_REJECT: i64 = -3;

/// The elector's meta log is older than the responder's. Reported before a
/// data-log mismatch so callers can tell the two apart.
pub const RESPONSE_META_LOG_STALE: i64 = -4;

/// A non-query request was executed successfully.
pub const STATUS_SUCCESS: i32 = 200;

/// The member has no known leader to forward the request to.
pub const STATUS_NO_LEADER: i32 = 601;

/// The request failed on the execution path; details travel in the message.
pub const STATUS_EXECUTION_ERROR: i32 = 602;

/// Reader id returned when the receiving group does not host the series.
pub const READER_NOT_HOSTED: i64 = -1;
