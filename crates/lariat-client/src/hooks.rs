// Request and response hook chains. Hooks observe calls; they cannot
// change them, and a misbehaving hook must not take a driver down.
use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

use crate::error::Error;

/// Method and topic descriptor passed to every hook invocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RpcInfo {
    pub method: String,
    pub topic: String,
}

impl RpcInfo {
    pub fn new(method: impl Into<String>, topic: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            topic: topic.into(),
        }
    }
}

/// Fires before a request is encoded. The message is the caller's typed
/// request; downcast it if the hook cares about a specific type.
pub type RequestHook = Arc<dyn Fn(&RpcInfo, &dyn Any) + Send + Sync>;

/// Fires once per completed unary call and once per delivered fan-out
/// response, with either the typed result or the error.
pub type ResponseHook =
    Arc<dyn Fn(&RpcInfo, &dyn Any, Option<&dyn Any>, Option<&Error>) + Send + Sync>;

pub(crate) fn run_request_hooks(hooks: &[RequestHook], info: &RpcInfo, request: &dyn Any) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook(info, request))).is_err() {
            warn!(method = %info.method, "request hook panicked");
        }
    }
}

pub(crate) fn run_response_hooks(
    hooks: &[ResponseHook],
    info: &RpcInfo,
    request: &dyn Any,
    result: Option<&dyn Any>,
    error: Option<&Error>,
) {
    for hook in hooks {
        if catch_unwind(AssertUnwindSafe(|| hook(info, request, result, error))).is_err() {
            warn!(method = %info.method, "response hook panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn hooks_run_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let hooks: Vec<RequestHook> = [1, 2, 3]
            .into_iter()
            .map(|n| {
                let order = Arc::clone(&order);
                Arc::new(move |_: &RpcInfo, _: &dyn Any| {
                    order.lock().expect("order lock").push(n);
                }) as RequestHook
            })
            .collect();
        run_request_hooks(&hooks, &RpcInfo::new("mute", ""), &());
        assert_eq!(*order.lock().expect("order lock"), vec![1, 2, 3]);
    }

    #[test]
    fn panicking_hook_does_not_stop_the_chain() {
        let fired = Arc::new(AtomicUsize::new(0));
        let panicking: RequestHook = Arc::new(|_: &RpcInfo, _: &dyn Any| panic!("bad hook"));
        let counting: RequestHook = {
            let fired = Arc::clone(&fired);
            Arc::new(move |_: &RpcInfo, _: &dyn Any| {
                fired.fetch_add(1, Ordering::SeqCst);
            })
        };
        run_request_hooks(&[panicking, counting], &RpcInfo::new("mute", ""), &());
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn response_hook_can_downcast_the_result() {
        let seen = Arc::new(std::sync::Mutex::new(String::new()));
        let hook: ResponseHook = {
            let seen = Arc::clone(&seen);
            Arc::new(
                move |_: &RpcInfo, _: &dyn Any, result: Option<&dyn Any>, _: Option<&Error>| {
                    if let Some(text) = result.and_then(|r| r.downcast_ref::<String>()) {
                        seen.lock().expect("seen lock").push_str(text);
                    }
                },
            )
        };
        let result = "typed result".to_string();
        run_response_hooks(
            &[hook],
            &RpcInfo::new("mute", ""),
            &(),
            Some(&result as &dyn Any),
            None,
        );
        assert_eq!(*seen.lock().expect("seen lock"), "typed result");
    }
}
