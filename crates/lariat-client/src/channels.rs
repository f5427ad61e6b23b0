// Channel-name derivations. These must stay stable: servers derive the
// same names independently, so any change here is a wire break.

/// Channel requests are published on; servers for `method` listen here.
pub fn rpc_channel(service: &str, method: &str, topic: &str) -> String {
    join_segments(&[service, method, topic, "req"])
}

/// Client-scoped channel servers send their claims to.
pub fn claim_request_channel(service: &str, client_id: &str) -> String {
    join_segments(&[service, client_id, "claim"])
}

/// Channel the client announces its elected server on.
pub fn claim_response_channel(service: &str, method: &str, topic: &str) -> String {
    join_segments(&[service, method, topic, "elect"])
}

/// Client-scoped channel responses come back on.
pub fn response_channel(service: &str, client_id: &str) -> String {
    join_segments(&[service, client_id, "res"])
}

// Dot-joined with empty segments elided, so a topic-less method derives
// the same name with or without the empty string.
fn join_segments(segments: &[&str]) -> String {
    let mut name = String::new();
    for segment in segments {
        if segment.is_empty() {
            continue;
        }
        if !name.is_empty() {
            name.push('.');
        }
        name.push_str(segment);
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derivations_are_stable() {
        assert_eq!(rpc_channel("media", "mute", "room-1"), "media.mute.room-1.req");
        assert_eq!(claim_request_channel("media", "client-a"), "media.client-a.claim");
        assert_eq!(
            claim_response_channel("media", "mute", "room-1"),
            "media.mute.room-1.elect"
        );
        assert_eq!(response_channel("media", "client-a"), "media.client-a.res");
    }

    #[test]
    fn empty_topic_is_elided() {
        assert_eq!(rpc_channel("media", "mute", ""), "media.mute.req");
        assert_eq!(claim_response_channel("media", "mute", ""), "media.mute.elect");
    }
}
