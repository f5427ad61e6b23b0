//! # Purpose
//! Demonstrate a full claim/elect/respond round trip over the in-process
//! bus, with no network involved.
//!
//! # What this demo proves
//! - Two servers bid for a unary request and the higher affinity wins.
//! - A fan-out request collects an answer from every server.
//! - `join` sees raw traffic on a method channel without the handshake.
//!
//! # Flow summary
//! 1. Start an in-process bus and two mock servers with different
//!    affinities.
//! 2. Issue a unary request and check the election picked the stronger
//!    server.
//! 3. Issue a fan-out request and count responders.
//! 4. Join a broadcast method channel and receive a bare message.
//!
//! Prints a summary and exits non-zero on failure.
use anyhow::{Context, Result, bail};
use lariat_bus::{self as bus, LocalBus, Subscription};
use lariat_client::{ClientOptions, RequestOpts, RpcClient, SelectionOpts, channels};
use lariat_wire::{
    ClaimEnvelope, ElectionEnvelope, Packet, Payload, RequestEnvelope, ResponseEnvelope,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

const SERVICE: &str = "render";
const METHOD: &str = "frame";
const TOPIC: &str = "scene-1";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrameRequest {
    scene: String,
}

impl Packet for FrameRequest {
    const SCHEMA: &'static str = "render.FrameRequest";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct FrameResponse {
    scene: String,
    rendered_by: String,
}

impl Packet for FrameResponse {
    const SCHEMA: &'static str = "render.FrameResponse";
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Announcement {
    text: String,
}

impl Packet for Announcement {
    const SCHEMA: &'static str = "render.Announcement";
}

async fn start_render_server(
    bus_handle: Arc<LocalBus>,
    server_id: &'static str,
    affinity: f32,
) -> Result<()> {
    let mut requests = bus::subscribe::<RequestEnvelope>(
        bus_handle.as_ref(),
        &channels::rpc_channel(SERVICE, METHOD, TOPIC),
        16,
    )
    .await
    .context("subscribe requests")?;
    let mut elections = bus::subscribe::<ElectionEnvelope>(
        bus_handle.as_ref(),
        &channels::claim_response_channel(SERVICE, METHOD, TOPIC),
        16,
    )
    .await
    .context("subscribe elections")?;

    tokio::spawn(async move {
        while let Ok(Some(request)) = requests.next().await {
            if request.multi {
                let _ = answer(&bus_handle, server_id, &request).await;
                continue;
            }

            let claim = ClaimEnvelope {
                request_id: request.request_id.clone(),
                server_id: server_id.to_string(),
                affinity,
            };
            if bus::publish(
                bus_handle.as_ref(),
                &channels::claim_request_channel(SERVICE, &request.client_id),
                &claim,
            )
            .await
            .is_err()
            {
                return;
            }

            loop {
                match elections.next().await {
                    Ok(Some(election)) if election.request_id == request.request_id => {
                        if election.server_id == server_id {
                            info!(server_id, "won the election");
                            let _ = answer(&bus_handle, server_id, &request).await;
                        }
                        break;
                    }
                    Ok(Some(_)) => continue,
                    _ => return,
                }
            }
        }
    });
    Ok(())
}

async fn answer(bus_handle: &Arc<LocalBus>, server_id: &str, request: &RequestEnvelope) -> Result<()> {
    let frame: FrameRequest = request.payload.unpack().context("request payload")?;
    let payload = Payload::pack(&FrameResponse {
        scene: frame.scene,
        rendered_by: server_id.to_string(),
    })
    .context("pack response")?;
    bus::publish(
        bus_handle.as_ref(),
        &channels::response_channel(SERVICE, &request.client_id),
        &ResponseEnvelope::ok(&request.request_id, server_id, payload),
    )
    .await
    .context("publish response")?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let bus_handle = Arc::new(LocalBus::new());
    start_render_server(Arc::clone(&bus_handle), "render-alpha", 0.25).await?;
    start_render_server(Arc::clone(&bus_handle), "render-bravo", 0.9).await?;

    let client = RpcClient::new(
        SERVICE,
        "demo-client",
        bus_handle.clone(),
        ClientOptions::new().with_timeout(Duration::from_secs(2)),
    )
    .await
    .context("client")?;

    // Unary: both servers bid, the stronger one renders.
    let opts = RequestOpts::new()
        .with_selection(SelectionOpts::new().with_affinity_timeout(Duration::from_millis(150)));
    let response: FrameResponse = client
        .request_single(
            METHOD,
            TOPIC,
            FrameRequest {
                scene: "sunrise".into(),
            },
            opts,
        )
        .await
        .context("unary request")?;
    info!(rendered_by = %response.rendered_by, "unary response");
    if response.rendered_by != "render-bravo" {
        bail!("expected render-bravo to win, got {}", response.rendered_by);
    }

    // Fan-out: every server answers.
    let mut stream = client
        .request_multi::<FrameRequest, FrameResponse>(
            METHOD,
            TOPIC,
            FrameRequest {
                scene: "sunset".into(),
            },
            RequestOpts::new().with_timeout(Duration::from_millis(300)),
        )
        .await
        .context("fan-out request")?;
    let mut responders = Vec::new();
    while let Some(item) = stream.next().await {
        responders.push(item.context("fan-out item")?.rendered_by);
    }
    responders.sort();
    info!(?responders, "fan-out responses");
    if responders != ["render-alpha", "render-bravo"] {
        bail!("expected both servers to answer, got {responders:?}");
    }

    // Join: watch a broadcast channel without the RPC handshake.
    let mut announcements: Subscription<Announcement> = client
        .join("announce", "")
        .await
        .context("join announcements")?;
    bus::publish(
        bus_handle.as_ref(),
        &channels::rpc_channel(SERVICE, "announce", ""),
        &Announcement {
            text: "maintenance at midnight".into(),
        },
    )
    .await
    .context("publish announcement")?;
    let announcement = announcements
        .next()
        .await
        .context("announcement stream")?
        .context("announcement missing")?;
    info!(text = %announcement.text, "join delivery");

    client.close();

    println!("unary winner:      {}", response.rendered_by);
    println!("fan-out responders: {}", responders.join(", "));
    println!("join message:      {}", announcement.text);
    println!("demo passed");
    Ok(())
}
