//! Unary request driver.
//!
//! # Purpose
//! Runs the full single-response lifecycle: publish the request, collect
//! claims, elect a server, announce the election, await that server's
//! response. Response hooks observe the outcome exactly once on every
//! path, and the correlation entry is removed on every path.
use lariat_bus::{self as bus, BusError};
use lariat_wire::{ElectionEnvelope, Packet, Payload, RequestEnvelope, ResponseEnvelope};
use std::any::Any;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::channels;
use crate::client::client::RpcClient;
use crate::client::correlation::RegistrationGuard;
use crate::client::selection::select_server;
use crate::config::RequestOpts;
use crate::error::{Error, Result};
use crate::hooks::{RpcInfo, run_request_hooks, run_response_hooks};
use crate::ids;

impl RpcClient {
    /// Issues `request` on `method`/`topic` and returns the elected
    /// server's response.
    pub async fn request_single<Req: Packet, Res: Packet>(
        &self,
        method: &str,
        topic: &str,
        request: Req,
        opts: RequestOpts,
    ) -> Result<Res> {
        let info = RpcInfo::new(method, topic);
        run_request_hooks(&self.inner.opts.request_hooks, &info, &request);

        let result = self.drive_single::<Req, Res>(&info, &request, &opts).await;

        match &result {
            Ok(response) => run_response_hooks(
                &self.inner.opts.response_hooks,
                &info,
                &request,
                Some(response as &dyn Any),
                None,
            ),
            Err(err) => run_response_hooks(
                &self.inner.opts.response_hooks,
                &info,
                &request,
                None,
                Some(err),
            ),
        }
        result
    }

    async fn drive_single<Req: Packet, Res: Packet>(
        &self,
        info: &RpcInfo,
        request: &Req,
        opts: &RequestOpts,
    ) -> Result<Res> {
        let inner = &self.inner;
        let payload = Payload::pack(request).map_err(Error::MalformedRequest)?;

        let timeout = opts.effective_timeout(&inner.opts);
        let request_id = ids::new_request_id();
        let now = ids::unix_nanos();
        let envelope = RequestEnvelope {
            request_id: request_id.clone(),
            client_id: inner.client_id.clone(),
            sent_at: now,
            expiry: now + timeout.as_nanos() as i64,
            multi: false,
            payload,
        };

        // Claim sink at buffer depth; the response sink holds the single
        // expected response.
        let (claim_tx, mut claim_rx) = mpsc::channel(inner.opts.channel_buffer());
        let (response_tx, mut response_rx) = mpsc::channel(1);
        if !inner.table.register(&request_id, claim_tx, response_tx) {
            return Err(Error::Internal(BusError::Transport(format!(
                "request id collision: {request_id}"
            ))));
        }
        let _registration = RegistrationGuard {
            table: inner.table.as_ref(),
            request_id: request_id.as_str(),
        };

        bus::publish(
            inner.bus.as_ref(),
            &channels::rpc_channel(&inner.service, &info.method, &info.topic),
            &envelope,
        )
        .await
        .map_err(Error::Internal)?;

        let deadline = Instant::now() + timeout;
        let cancel = opts.cancel.clone().unwrap_or_default();

        let server_id = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Canceled),
            elected = select_server(&mut claim_rx, &opts.selection, deadline) => elected?,
        };

        bus::publish(
            inner.bus.as_ref(),
            &channels::claim_response_channel(&inner.service, &info.method, &info.topic),
            &ElectionEnvelope {
                request_id: request_id.clone(),
                server_id,
            },
        )
        .await
        .map_err(Error::Internal)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::Canceled),
            _ = time::sleep_until(deadline) => Err(Error::RequestTimedOut),
            received = response_rx.recv() => match received {
                Some(response) => decode_response::<Res>(response),
                // The sink cannot close while this entry is registered.
                None => Err(Error::Internal(BusError::Closed)),
            },
        }
    }
}

pub(crate) fn decode_response<Res: Packet>(response: ResponseEnvelope) -> Result<Res> {
    if let Some(error) = response.error {
        return Err(Error::from_response(error));
    }
    let payload = response
        .payload
        .ok_or(Error::MalformedResponse(lariat_wire::Error::EmptyResponse))?;
    payload.unpack::<Res>().map_err(Error::MalformedResponse)
}
