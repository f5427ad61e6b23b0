// Typed topic subscriptions that bypass the request/claim handshake.
// `join` sees every message on the method channel; `join_queue` competes
// with the other members of the channel's queue group.
use lariat_bus::{self as bus, Subscription};
use lariat_wire::Packet;

use crate::channels;
use crate::client::client::RpcClient;
use crate::error::{Error, Result};

impl RpcClient {
    pub async fn join<Res: Packet>(&self, method: &str, topic: &str) -> Result<Subscription<Res>> {
        let inner = &self.inner;
        bus::subscribe(
            inner.bus.as_ref(),
            &channels::rpc_channel(&inner.service, method, topic),
            inner.opts.channel_buffer(),
        )
        .await
        .map_err(Error::Internal)
    }

    pub async fn join_queue<Res: Packet>(
        &self,
        method: &str,
        topic: &str,
    ) -> Result<Subscription<Res>> {
        let inner = &self.inner;
        bus::subscribe_queue(
            inner.bus.as_ref(),
            &channels::rpc_channel(&inner.service, method, topic),
            inner.opts.channel_buffer(),
        )
        .await
        .map_err(Error::Internal)
    }
}
