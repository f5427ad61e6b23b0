// Correlation table mapping in-flight request ids to delivery sinks.
// Drivers insert and remove their own entries; the demultiplexer only
// reads. Lookups clone the sender and release the lock before anyone
// sends, so delivery never holds up registration.
use lariat_wire::{ClaimEnvelope, ResponseEnvelope};
use std::collections::HashMap;
use std::sync::RwLock;
use tokio::sync::mpsc;

#[derive(Default)]
struct Sinks {
    claims: HashMap<String, mpsc::Sender<ClaimEnvelope>>,
    responses: HashMap<String, mpsc::Sender<ResponseEnvelope>>,
}

#[derive(Default)]
pub(crate) struct CorrelationTable {
    sinks: RwLock<Sinks>,
}

impl CorrelationTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Inserts both sinks atomically. Returns false when the request id
    /// is already present, which cannot happen with minted ids.
    pub(crate) fn register(
        &self,
        request_id: &str,
        claims: mpsc::Sender<ClaimEnvelope>,
        responses: mpsc::Sender<ResponseEnvelope>,
    ) -> bool {
        let mut sinks = self.sinks.write().expect("correlation lock");
        if sinks.claims.contains_key(request_id) || sinks.responses.contains_key(request_id) {
            return false;
        }
        sinks.claims.insert(request_id.to_string(), claims);
        sinks.responses.insert(request_id.to_string(), responses);
        true
    }

    /// Fan-out requests skip the claim phase, so only a response sink is
    /// registered.
    pub(crate) fn register_multi(
        &self,
        request_id: &str,
        responses: mpsc::Sender<ResponseEnvelope>,
    ) -> bool {
        let mut sinks = self.sinks.write().expect("correlation lock");
        if sinks.responses.contains_key(request_id) {
            return false;
        }
        sinks.responses.insert(request_id.to_string(), responses);
        true
    }

    pub(crate) fn lookup_claim(&self, request_id: &str) -> Option<mpsc::Sender<ClaimEnvelope>> {
        self.sinks
            .read()
            .expect("correlation lock")
            .claims
            .get(request_id)
            .cloned()
    }

    pub(crate) fn lookup_response(
        &self,
        request_id: &str,
    ) -> Option<mpsc::Sender<ResponseEnvelope>> {
        self.sinks
            .read()
            .expect("correlation lock")
            .responses
            .get(request_id)
            .cloned()
    }

    // Idempotent; unknown ids are a no-op.
    pub(crate) fn unregister(&self, request_id: &str) {
        let mut sinks = self.sinks.write().expect("correlation lock");
        sinks.claims.remove(request_id);
        sinks.responses.remove(request_id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.sinks.read().expect("correlation lock").responses.len()
    }
}

/// Removes the entry on every exit path of a driver, matching the rule
/// that no entry outlives the request that created it.
pub(crate) struct RegistrationGuard<'a> {
    pub(crate) table: &'a CorrelationTable,
    pub(crate) request_id: &'a str,
}

impl Drop for RegistrationGuard<'_> {
    fn drop(&mut self) {
        self.table.unregister(self.request_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim_sink() -> mpsc::Sender<ClaimEnvelope> {
        mpsc::channel(1).0
    }

    fn response_sink() -> mpsc::Sender<ResponseEnvelope> {
        mpsc::channel(1).0
    }

    #[test]
    fn register_then_lookup_then_unregister() {
        let table = CorrelationTable::new();
        assert!(table.register("REQ_a", claim_sink(), response_sink()));
        assert!(table.lookup_claim("REQ_a").is_some());
        assert!(table.lookup_response("REQ_a").is_some());

        table.unregister("REQ_a");
        assert!(table.lookup_claim("REQ_a").is_none());
        assert!(table.lookup_response("REQ_a").is_none());
        // Idempotent.
        table.unregister("REQ_a");
        assert_eq!(table.len(), 0);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let table = CorrelationTable::new();
        assert!(table.register("REQ_a", claim_sink(), response_sink()));
        assert!(!table.register("REQ_a", claim_sink(), response_sink()));
        assert!(!table.register_multi("REQ_a", response_sink()));
    }

    #[test]
    fn multi_registration_has_no_claim_sink() {
        let table = CorrelationTable::new();
        assert!(table.register_multi("REQ_m", response_sink()));
        assert!(table.lookup_claim("REQ_m").is_none());
        assert!(table.lookup_response("REQ_m").is_some());
    }

    #[test]
    fn guard_unregisters_on_drop() {
        let table = CorrelationTable::new();
        assert!(table.register("REQ_g", claim_sink(), response_sink()));
        {
            let _guard = RegistrationGuard {
                table: &table,
                request_id: "REQ_g",
            };
        }
        assert_eq!(table.len(), 0);
    }
}
