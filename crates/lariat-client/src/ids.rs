// Opaque id minting and wall-clock stamps for request envelopes.
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

// Request ids are never reused; the prefix makes them easy to spot in
// bus traces.
pub(crate) fn new_request_id() -> String {
    format!("REQ_{}", Uuid::new_v4().simple())
}

pub(crate) fn unix_nanos() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_ids_are_prefixed_and_unique() {
        let first = new_request_id();
        let second = new_request_id();
        assert!(first.starts_with("REQ_"));
        assert_ne!(first, second);
    }

    #[test]
    fn unix_nanos_is_monotonic_enough() {
        let stamp = unix_nanos();
        assert!(stamp > 0);
    }
}
