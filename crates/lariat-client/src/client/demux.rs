//! Background demultiplexer.
//!
//! # Purpose
//! One task per client consumes the claim and response subscriptions and
//! routes each envelope to the sink its request registered. Envelopes
//! with no sink (the request already finished) and envelopes that find a
//! full sink are dropped; protecting the fabric beats completeness here,
//! and the unary response sink can never be full in well-behaved runs.
use lariat_bus::Subscription;
use lariat_wire::{ClaimEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::client::correlation::CorrelationTable;

pub(crate) async fn run_demux(
    table: Arc<CorrelationTable>,
    mut claims: Subscription<ClaimEnvelope>,
    mut responses: Subscription<ResponseEnvelope>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                claims.close();
                responses.close();
                debug!("demultiplexer shut down");
                break;
            }
            claim = claims.next() => match claim {
                Ok(Some(claim)) => deliver_claim(&table, claim),
                Ok(None) => {
                    debug!("claim stream ended");
                    break;
                }
                Err(err) => {
                    debug!(error = %err, "discarding undecodable claim frame");
                    metrics::counter!("lariat_client_demux_decode_errors_total").increment(1);
                }
            },
            response = responses.next() => match response {
                Ok(Some(response)) => deliver_response(&table, response),
                Ok(None) => {
                    debug!("response stream ended");
                    break;
                }
                Err(err) => {
                    debug!(error = %err, "discarding undecodable response frame");
                    metrics::counter!("lariat_client_demux_decode_errors_total").increment(1);
                }
            },
        }
    }
}

fn deliver_claim(table: &CorrelationTable, claim: ClaimEnvelope) {
    let Some(sink) = table.lookup_claim(&claim.request_id) else {
        metrics::counter!("lariat_client_claims_dropped_total").increment(1);
        return;
    };
    if sink.try_send(claim).is_err() {
        metrics::counter!("lariat_client_claims_dropped_total").increment(1);
    }
}

fn deliver_response(table: &CorrelationTable, response: ResponseEnvelope) {
    let Some(sink) = table.lookup_response(&response.request_id) else {
        // Late delivery for a completed request.
        metrics::counter!("lariat_client_responses_dropped_total").increment(1);
        return;
    };
    if sink.try_send(response).is_err() {
        metrics::counter!("lariat_client_responses_dropped_total").increment(1);
    }
}
