// Client defaults, per-call options, and environment overrides.
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::hooks::{RequestHook, ResponseHook};

pub(crate) const DEFAULT_CHANNEL_BUFFER: usize = 100;
pub(crate) const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(3);

/// Client-wide defaults, merged under per-call [`RequestOpts`].
#[derive(Clone, Default)]
pub struct ClientOptions {
    pub(crate) channel_buffer: Option<usize>,
    pub(crate) timeout: Option<Duration>,
    pub(crate) request_hooks: Vec<RequestHook>,
    pub(crate) response_hooks: Vec<ResponseHook>,
}

impl ClientOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer depth for claim sinks, fan-out response sinks, and bus
    /// subscriptions opened by this client.
    pub fn with_channel_buffer(mut self, depth: usize) -> Self {
        self.channel_buffer = Some(depth.max(1));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Hooks fire in registration order.
    pub fn with_request_hook(mut self, hook: RequestHook) -> Self {
        self.request_hooks.push(hook);
        self
    }

    pub fn with_response_hook(mut self, hook: ResponseHook) -> Self {
        self.response_hooks.push(hook);
        self
    }

    pub(crate) fn channel_buffer(&self) -> usize {
        self.channel_buffer.unwrap_or_else(|| runtime_defaults().channel_buffer)
    }

    pub(crate) fn timeout(&self) -> Duration {
        self.timeout.unwrap_or_else(|| runtime_defaults().timeout)
    }
}

/// Knobs for one server election.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SelectionOpts {
    pub(crate) affinity_timeout: Option<Duration>,
    pub(crate) short_circuit_timeout: Option<Duration>,
    pub(crate) minimum_affinity: f32,
    pub(crate) accept_first_available: bool,
}

impl SelectionOpts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Hard cap on how long the election collects claims, measured from
    /// its start.
    pub fn with_affinity_timeout(mut self, window: Duration) -> Self {
        self.affinity_timeout = Some(window);
        self
    }

    /// Grace period after the first qualifying claim before the election
    /// settles on the best candidate seen so far.
    pub fn with_short_circuit_timeout(mut self, grace: Duration) -> Self {
        self.short_circuit_timeout = Some(grace);
        self
    }

    /// Claims below this affinity never become candidates.
    pub fn with_minimum_affinity(mut self, floor: f32) -> Self {
        self.minimum_affinity = floor;
        self
    }

    /// Elect the first qualifying claim immediately instead of waiting
    /// for a better one.
    pub fn with_accept_first_available(mut self, accept: bool) -> Self {
        self.accept_first_available = accept;
        self
    }
}

/// Per-call options; anything unset falls back to the client defaults.
#[derive(Clone, Default)]
pub struct RequestOpts {
    pub(crate) timeout: Option<Duration>,
    pub(crate) selection: SelectionOpts,
    pub(crate) cancel: Option<CancellationToken>,
}

impl RequestOpts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_selection(mut self, selection: SelectionOpts) -> Self {
        self.selection = selection;
        self
    }

    /// Caller-side cancellation; firing before the deadline fails the
    /// call with `Canceled`.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub(crate) fn effective_timeout(&self, defaults: &ClientOptions) -> Duration {
        self.timeout.unwrap_or_else(|| defaults.timeout())
    }
}

struct RuntimeDefaults {
    channel_buffer: usize,
    timeout: Duration,
}

static RUNTIME_DEFAULTS: OnceLock<RuntimeDefaults> = OnceLock::new();

// Environment overrides are read once; later changes to the process
// environment do not move the defaults.
fn runtime_defaults() -> &'static RuntimeDefaults {
    RUNTIME_DEFAULTS.get_or_init(|| RuntimeDefaults {
        channel_buffer: env_parse("LARIAT_CHANNEL_BUFFER")
            .unwrap_or(DEFAULT_CHANNEL_BUFFER)
            .max(1),
        timeout: env_parse("LARIAT_REQUEST_TIMEOUT_MS")
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
    })
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|value| value.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn per_call_timeout_overrides_client_default() {
        let defaults = ClientOptions::new().with_timeout(Duration::from_secs(5));
        let opts = RequestOpts::new().with_timeout(Duration::from_millis(250));
        assert_eq!(opts.effective_timeout(&defaults), Duration::from_millis(250));
        assert_eq!(
            RequestOpts::new().effective_timeout(&defaults),
            Duration::from_secs(5)
        );
    }

    #[test]
    fn channel_buffer_floor_is_one() {
        let opts = ClientOptions::new().with_channel_buffer(0);
        assert_eq!(opts.channel_buffer(), 1);
    }

    #[test]
    fn selection_opts_default_to_disabled() {
        let opts = SelectionOpts::new();
        assert!(opts.affinity_timeout.is_none());
        assert!(opts.short_circuit_timeout.is_none());
        assert_eq!(opts.minimum_affinity, 0.0);
        assert!(!opts.accept_first_available);
    }
}
