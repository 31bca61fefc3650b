//! Process identity, used for diagnostics and session naming only.

/// Returns the id of the current OS process as a 32-bit integer.
///
/// Ids above `i32::MAX` wrap; nothing on the wire depends on the value.
pub fn current_pid() -> i32 {
    std::process::id() as i32
}
