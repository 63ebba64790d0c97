use std::time::Duration;

pub mod metrics;
pub mod patch;

pub(crate) mod colors;
pub(crate) mod messages;

mod error;

pub use error::*;

/// Interval a user task waits before being re-checked while queued on a
/// saturated platform. Matches the upstream controller's own value; nothing
/// beyond "eventually retried" is required (see the `WaitingForPlatform`
/// wake-up mechanism in `controller::user_task`).
pub(crate) const WAITING_REQUEUE: Duration = Duration::from_secs(60);

/// Requeue interval used once a reconcile has nothing left to do but is not
/// yet eligible for `Action::await_change()` (no watch can tell us when a
/// cloud instance's address becomes resolvable, for instance).
pub(crate) const PROBE_INTERVAL: Duration = Duration::from_secs(30);

/// Backoff applied while a dynamic instance's address is not yet resolvable.
pub(crate) const ADDRESS_PENDING_REQUEUE: Duration = Duration::from_secs(15);

/// Name of the kubernetes resource manager used for server-side apply.
pub(crate) const MANAGER_NAME: &str = "multi-platform-controller";
