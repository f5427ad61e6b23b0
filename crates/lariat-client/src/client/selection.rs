//! Affinity-weighted server election.
//!
//! # Purpose
//! Collects claims from a request's claim sink and elects the server the
//! request will be handed to. Three deadlines can end the collection:
//! the call deadline, an optional affinity window measured from the
//! start, and an optional short-circuit grace measured from the first
//! qualifying claim. Whichever fires, the election resolves the same
//! way: best candidate if one exists, otherwise a failure describing how
//! empty the window was.
use lariat_wire::ClaimEnvelope;
use tokio::sync::mpsc;
use tokio::time::{self, Instant};

use crate::config::SelectionOpts;
use crate::error::{Error, Result};

pub(crate) async fn select_server(
    claims: &mut mpsc::Receiver<ClaimEnvelope>,
    opts: &SelectionOpts,
    deadline: Instant,
) -> Result<String> {
    let started = Instant::now();
    let affinity_deadline = opts
        .affinity_timeout
        .filter(|window| !window.is_zero())
        .map(|window| started + window);
    let mut short_circuit_deadline: Option<Instant> = None;

    let mut best_server: Option<String> = None;
    let mut best_affinity: f32 = 0.0;
    let mut claims_seen: u32 = 0;

    loop {
        // Earliest armed deadline decides the next wake-up.
        let wake_at = [Some(deadline), affinity_deadline, short_circuit_deadline]
            .into_iter()
            .flatten()
            .min()
            .unwrap_or(deadline);

        tokio::select! {
            _ = time::sleep_until(wake_at) => break,
            claim = claims.recv() => {
                let Some(claim) = claim else {
                    // Sink closed; nothing more can arrive, so just wait
                    // out the window before resolving.
                    time::sleep_until(wake_at).await;
                    break;
                };
                claims_seen += 1;

                let meets_floor =
                    opts.minimum_affinity <= 0.0 || claim.affinity >= opts.minimum_affinity;
                if meets_floor && claim.affinity > best_affinity {
                    if opts.accept_first_available {
                        return Ok(claim.server_id);
                    }
                    best_affinity = claim.affinity;
                    best_server = Some(claim.server_id);

                    // The grace window arms on the first upgrade only.
                    if short_circuit_deadline.is_none() {
                        if let Some(grace) =
                            opts.short_circuit_timeout.filter(|grace| !grace.is_zero())
                        {
                            short_circuit_deadline = Some(Instant::now() + grace);
                        }
                    }
                }
            }
        }
    }

    match best_server {
        Some(server_id) => Ok(server_id),
        None if claims_seen == 0 => Err(Error::NoResponse),
        None => Err(Error::Unavailable {
            claims: claims_seen,
        }),
    }
}
