//! Wire format of the "already assigned" placement refusal.
//!
//! When a chunk already has a worker, the scheduler refuses the
//! assignment with `ALREADY_EXISTS` and carries the prior decision in
//! the status description so the consumer can honor it without a second
//! round trip. Both sides of that contract live here.

const PREFIX: &str = "Worker already assigned: ";

/// Render the existing `(worker_id, address)` into a status description.
#[must_use]
pub fn format_already_assigned(worker_id: &str, address: &str) -> String {
    format!("{PREFIX}{worker_id}@{address}")
}

/// Recover `(worker_id, address)` from a status description produced by
/// [`format_already_assigned`]. Returns `None` for anything else.
#[must_use]
pub fn parse_already_assigned(description: &str) -> Option<(String, String)> {
    let rest = description.strip_prefix(PREFIX)?;
    // Worker ids never contain '@'; addresses are host:port.
    let (worker_id, address) = rest.split_once('@')?;
    if worker_id.is_empty() || address.is_empty() {
        return None;
    }
    Some((worker_id.to_string(), address.to_string()))
}
