//! Request-scoped correlation ids.
//!
//! Each inbound HTTP request runs inside [`scope`], which gives it a private
//! binding. Reads outside any scope (startup, shutdown, stdio traffic) see
//! [`UNSET_REQUEST_ID`].

use std::cell::RefCell;
use std::future::Future;

/// Header used to accept and echo correlation ids.
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Value reported when no request is active.
pub const UNSET_REQUEST_ID: &str = "-";

tokio::task_local! {
    static REQUEST_ID: RefCell<String>;
}

/// Run `fut` with its own correlation binding, initially unset.
///
/// The binding is only visible while `fut` itself is being polled, so many
/// scoped futures can be interleaved on one task or one worker thread.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    REQUEST_ID
        .scope(RefCell::new(UNSET_REQUEST_ID.to_string()), fut)
        .await
}

/// Bind `id` in the current scope. Outside a scope this does nothing.
pub fn set_request_id(id: impl Into<String>) {
    let id = id.into();
    let _ = REQUEST_ID.try_with(|cell| *cell.borrow_mut() = id);
}

/// The id bound in the current scope, or `"-"`.
pub fn current_request_id() -> String {
    REQUEST_ID
        .try_with(|cell| cell.borrow().clone())
        .unwrap_or_else(|_| UNSET_REQUEST_ID.to_string())
}

/// Run `f` synchronously with `id` bound, whether or not a scope is active.
///
/// Used for log lines written after the request future has finished, such
/// as the transport line emitted when the response body ends.
pub fn with_request_id<R>(id: &str, f: impl FnOnce() -> R) -> R {
    REQUEST_ID.sync_scope(RefCell::new(id.to_string()), f)
}

pub fn clear_request_id() {
    set_request_id(UNSET_REQUEST_ID);
}

/// Fresh server-side id: a v4 UUID in 32-char lowercase hex form.
pub fn generate_request_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Binds an id for as long as the guard lives and resets it on drop.
///
/// Drop runs on every exit path, including unwinding and a cancelled future.
#[must_use = "the id is cleared as soon as the guard is dropped"]
pub struct RequestIdGuard {
    _priv: (),
}

impl RequestIdGuard {
    pub fn bind(id: impl Into<String>) -> Self {
        set_request_id(id);
        Self { _priv: () }
    }
}

impl Drop for RequestIdGuard {
    fn drop(&mut self) {
        clear_request_id();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_scope_reports_sentinel() {
        set_request_id("ignored");
        assert_eq!(current_request_id(), UNSET_REQUEST_ID);
    }

    #[tokio::test]
    async fn set_get_clear_within_scope() {
        scope(async {
            assert_eq!(current_request_id(), "-");
            set_request_id("abc123");
            assert_eq!(current_request_id(), "abc123");
            clear_request_id();
            assert_eq!(current_request_id(), "-");
        })
        .await;
    }

    #[test]
    fn sync_binding_is_temporary() {
        let seen = with_request_id("late-1", current_request_id);
        assert_eq!(seen, "late-1");
        assert_eq!(current_request_id(), UNSET_REQUEST_ID);
    }

    #[tokio::test]
    async fn guard_clears_on_drop() {
        scope(async {
            {
                let _guard = RequestIdGuard::bind("req-1");
                assert_eq!(current_request_id(), "req-1");
            }
            assert_eq!(current_request_id(), "-");
        })
        .await;
    }

    #[tokio::test]
    async fn interleaved_scopes_do_not_leak() {
        let a = scope(async {
            set_request_id("a");
            for _ in 0..5 {
                tokio::task::yield_now().await;
                assert_eq!(current_request_id(), "a");
            }
        });
        let b = scope(async {
            set_request_id("b");
            for _ in 0..5 {
                tokio::task::yield_now().await;
                assert_eq!(current_request_id(), "b");
            }
        });
        tokio::join!(a, b);
        assert_eq!(current_request_id(), "-");
    }

    #[test]
    fn generated_ids_are_hex_and_distinct() {
        let first = generate_request_id();
        let second = generate_request_id();
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
    }
}
