//! End-to-end HTTP-surface tests, driven through the router directly
//! (`tower::ServiceExt::oneshot`) rather than a bound socket.
