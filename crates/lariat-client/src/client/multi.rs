//! Fan-out request driver.
//!
//! # Purpose
//! Publishes a request every listening server answers, and streams each
//! answer to the caller until the call window closes. There is no claim
//! phase; a drainer task converts envelopes as they arrive and runs the
//! response hooks per delivery.
use lariat_bus::{self as bus, BusError};
use lariat_wire::{Packet, Payload, RequestEnvelope, ResponseEnvelope};
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::channels;
use crate::client::client::RpcClient;
use crate::client::correlation::CorrelationTable;
use crate::client::request::decode_response;
use crate::config::RequestOpts;
use crate::error::{Error, Result};
use crate::hooks::{ResponseHook, RpcInfo, run_request_hooks, run_response_hooks};
use crate::ids;

/// Responses from a fan-out request, one entry per responding server.
/// The stream closes when the call window elapses; it is finite and not
/// restartable.
#[derive(Debug)]
pub struct ResponseStream<Res> {
    rx: mpsc::Receiver<Result<Res>>,
}

impl<Res> ResponseStream<Res> {
    /// Next responder's result; `None` once the window has closed.
    pub async fn next(&mut self) -> Option<Result<Res>> {
        self.rx.recv().await
    }

    /// Stops the stream early. The drainer notices on its next delivery
    /// and tears the request down.
    pub fn close(&mut self) {
        self.rx.close();
    }
}

impl RpcClient {
    /// Issues `request` to every server on `method`/`topic` and streams
    /// each response until the call timeout elapses.
    pub async fn request_multi<Req: Packet, Res: Packet>(
        &self,
        method: &str,
        topic: &str,
        request: Req,
        opts: RequestOpts,
    ) -> Result<ResponseStream<Res>> {
        let info = RpcInfo::new(method, topic);
        let request = Arc::new(request);
        run_request_hooks(&self.inner.opts.request_hooks, &info, request.as_ref());

        match self.start_multi::<Req, Res>(&info, &request, &opts).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                // Pre-publish failures still reach the response hooks,
                // once, with no result.
                run_response_hooks(
                    &self.inner.opts.response_hooks,
                    &info,
                    request.as_ref(),
                    None,
                    Some(&err),
                );
                Err(err)
            }
        }
    }

    async fn start_multi<Req: Packet, Res: Packet>(
        &self,
        info: &RpcInfo,
        request: &Arc<Req>,
        opts: &RequestOpts,
    ) -> Result<ResponseStream<Res>> {
        let inner = &self.inner;
        let payload = Payload::pack(request.as_ref()).map_err(Error::MalformedRequest)?;

        let timeout = opts.effective_timeout(&inner.opts);
        let request_id = ids::new_request_id();
        let now = ids::unix_nanos();
        let envelope = RequestEnvelope {
            request_id: request_id.clone(),
            client_id: inner.client_id.clone(),
            sent_at: now,
            expiry: now + timeout.as_nanos() as i64,
            multi: true,
            payload,
        };

        let buffer = inner.opts.channel_buffer();
        let (response_tx, response_rx) = mpsc::channel(buffer);
        if !inner.table.register_multi(&request_id, response_tx) {
            return Err(Error::Internal(BusError::Transport(format!(
                "request id collision: {request_id}"
            ))));
        }

        if let Err(err) = bus::publish(
            inner.bus.as_ref(),
            &channels::rpc_channel(&inner.service, &info.method, &info.topic),
            &envelope,
        )
        .await
        {
            // A request that never went out must not leave an entry for
            // the drainer to babysit.
            inner.table.unregister(&request_id);
            return Err(Error::Internal(err));
        }

        let (out_tx, out_rx) = mpsc::channel(buffer);
        tokio::spawn(drain_responses::<Req, Res>(DrainTask {
            table: Arc::clone(&inner.table),
            request_id,
            timeout,
            response_rx,
            out_tx,
            hooks: inner.opts.response_hooks.clone(),
            info: info.clone(),
            request: Arc::clone(request),
            cancel: opts.cancel.clone().unwrap_or_default(),
        }));

        Ok(ResponseStream { rx: out_rx })
    }
}

struct DrainTask<Req, Res> {
    table: Arc<CorrelationTable>,
    request_id: String,
    timeout: Duration,
    response_rx: mpsc::Receiver<ResponseEnvelope>,
    out_tx: mpsc::Sender<Result<Res>>,
    hooks: Vec<ResponseHook>,
    info: RpcInfo,
    request: Arc<Req>,
    cancel: CancellationToken,
}

async fn drain_responses<Req: Packet, Res: Packet>(mut task: DrainTask<Req, Res>) {
    let deadline = Instant::now() + task.timeout;
    loop {
        tokio::select! {
            _ = time::sleep_until(deadline) => break,
            _ = task.cancel.cancelled() => break,
            received = task.response_rx.recv() => {
                let Some(envelope) = received else { break };
                let item = decode_response::<Res>(envelope);
                match &item {
                    Ok(result) => run_response_hooks(
                        &task.hooks,
                        &task.info,
                        task.request.as_ref(),
                        Some(result as &dyn Any),
                        None,
                    ),
                    Err(err) => run_response_hooks(
                        &task.hooks,
                        &task.info,
                        task.request.as_ref(),
                        None,
                        Some(err),
                    ),
                }
                if task.out_tx.send(item).await.is_err() {
                    debug!(request_id = %task.request_id, "fan-out caller went away");
                    break;
                }
            }
        }
    }
    // Unregister before the stream closes so a late response can never
    // find a sink for a stream the caller has already seen end.
    task.table.unregister(&task.request_id);
}
