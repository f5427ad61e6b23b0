//! Publish/subscribe RPC client with affinity-weighted server election.
//!
//! Requests go out over a message bus where any number of servers may bid
//! for them with claims; the client elects exactly one server per unary
//! call, or takes answers from every responder on a fan-out call. A
//! single background demultiplexer per client routes bus traffic to
//! in-flight requests through a correlation table.
//!
//! ```
//! use lariat_client::{channels, ClientOptions, LocalBus, Packet, RpcClient};
//! use serde::{Deserialize, Serialize};
//! use std::sync::Arc;
//!
//! #[derive(Debug, Serialize, Deserialize)]
//! struct Notice { text: String }
//!
//! impl Packet for Notice {
//!     const SCHEMA: &'static str = "demo.Notice";
//! }
//!
//! let bus = Arc::new(LocalBus::new());
//! let rt = tokio::runtime::Runtime::new().expect("rt");
//! rt.block_on(async {
//!     let client = RpcClient::new("media", "client-1", bus.clone(), ClientOptions::new())
//!         .await
//!         .expect("client");
//!     let mut notices = client.join::<Notice>("notices", "").await.expect("join");
//!     lariat_bus::publish(
//!         bus.as_ref(),
//!         &channels::rpc_channel("media", "notices", ""),
//!         &Notice { text: "hello".into() },
//!     )
//!     .await
//!     .expect("publish");
//!     let notice = notices.next().await.expect("next").expect("message");
//!     assert_eq!(notice.text, "hello");
//!     client.close();
//! });
//! ```
pub mod channels;
pub mod config;
pub mod error;
pub mod hooks;

mod client;
mod ids;


pub use client::{RpcClient, ResponseStream};
pub use config::{ClientOptions, RequestOpts, SelectionOpts};
pub use error::{Error, Result};
pub use hooks::{RequestHook, ResponseHook, RpcInfo};

pub use lariat_bus::{BusError, LocalBus, MessageBus, RawSubscription, Subscription};
pub use lariat_wire::{Packet, Payload};
