//! System-wide timeout and retry defaults.

/// Default outbound routing-client call timeout.
pub const ROUTING_CLIENT_TIMEOUT_SECONDS: u64 = 30;

/// State-store operation timeout. Not currently enforced by either
/// backend directly; Redis calls inherit the connection manager's own
/// timeout behavior, and the in-memory backend never blocks this long.
pub const STATE_STORE_TIMEOUT_SECONDS: u64 = 5;

/// HTTP handler wall-clock budget.
pub const HTTP_HANDLER_TIMEOUT_SECONDS: u64 = 60;

/// Default retry budget for a task that keeps hitting contention or a
/// 4xx/5xx from the routing service before falling back.
pub const DEFAULT_TASK_MAX_RETRIES: u32 = 3;

/// Dispatch loop wakeup interval used to notice tasks whose
/// `earliest_dispatch` has just become due without a fresh enqueue.
pub const DISPATCH_LOOP_POLL_INTERVAL_MS: u64 = 500;
