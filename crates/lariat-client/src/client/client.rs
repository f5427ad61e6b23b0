//! Client construction and shutdown.
//!
//! # Purpose
//! Opens the two client-scoped subscriptions (responses, claims), spawns
//! the demultiplexer, and hands out a cheap-clone handle the drivers
//! hang off.
use lariat_bus::{MessageBus, subscribe};
use lariat_wire::{ClaimEnvelope, ResponseEnvelope};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channels;
use crate::client::correlation::CorrelationTable;
use crate::client::demux::run_demux;
use crate::config::ClientOptions;
use crate::error::{Error, Result};

/// Handle for issuing RPCs over a message bus. Clones share one
/// demultiplexer and correlation table.
#[derive(Clone)]
pub struct RpcClient {
    pub(crate) inner: Arc<ClientInner>,
}

pub(crate) struct ClientInner {
    pub(crate) service: String,
    pub(crate) client_id: String,
    pub(crate) bus: Arc<dyn MessageBus>,
    pub(crate) opts: ClientOptions,
    pub(crate) table: Arc<CorrelationTable>,
    pub(crate) shutdown: CancellationToken,
}

impl RpcClient {
    /// Opens the client's bus subscriptions and starts its demultiplexer.
    /// `client_id` must be stable for this instance; response and claim
    /// channels are derived from it.
    pub async fn new(
        service: impl Into<String>,
        client_id: impl Into<String>,
        bus: Arc<dyn MessageBus>,
        opts: ClientOptions,
    ) -> Result<Self> {
        let service = service.into();
        let client_id = client_id.into();
        let buffer = opts.channel_buffer();

        let mut responses = subscribe::<ResponseEnvelope>(
            bus.as_ref(),
            &channels::response_channel(&service, &client_id),
            buffer,
        )
        .await
        .map_err(Error::Internal)?;

        let claims = match subscribe::<ClaimEnvelope>(
            bus.as_ref(),
            &channels::claim_request_channel(&service, &client_id),
            buffer,
        )
        .await
        {
            Ok(claims) => claims,
            Err(err) => {
                // Half-constructed clients must not leak the first
                // subscription.
                responses.close();
                return Err(Error::Internal(err));
            }
        };

        let table = Arc::new(CorrelationTable::new());
        let shutdown = CancellationToken::new();
        tokio::spawn(run_demux(
            Arc::clone(&table),
            claims,
            responses,
            shutdown.clone(),
        ));
        debug!(service = %service, client_id = %client_id, "rpc client started");

        Ok(Self {
            inner: Arc::new(ClientInner {
                service,
                client_id,
                bus,
                opts,
                table,
                shutdown,
            }),
        })
    }

    pub fn service(&self) -> &str {
        &self.inner.service
    }

    pub fn client_id(&self) -> &str {
        &self.inner.client_id
    }

    /// Stops the demultiplexer and releases its subscriptions. Idempotent.
    /// In-flight requests are not interrupted; with deliveries stopped
    /// they fail at their deadlines.
    pub fn close(&self) {
        self.inner.shutdown.cancel();
    }
}
