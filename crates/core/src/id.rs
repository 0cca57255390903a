//! Identifier generation.
//!
//! Messages, commands and sagas all carry plain string ids rather than a
//! strongly-typed newtype: ids cross the transport boundary as metadata
//! values too, so a newtype would just get unwrapped at every call site.

use uuid::Uuid;

/// Generate a new time-ordered (UUIDv7) identifier, formatted as a string.
///
/// Time-ordering keeps ids roughly sortable by creation time, which is handy
/// when eyeballing logs or test fixtures. Callers that need deterministic
/// ids (tests, replays) should construct messages/commands with an explicit
/// id instead of calling this.
pub fn new_id() -> String {
    Uuid::now_v7().to_string()
}
