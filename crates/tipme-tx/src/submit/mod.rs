//! Broadcast routes, transports, and multi-route fan-out.

/// Concurrent multi-route fan-out.
mod broadcaster;
/// Block-builder bundle transport.
mod bundle;
/// Shared submission types, errors, and transport traits.
mod types;

pub use broadcaster::Broadcaster;
pub use bundle::{BlockEngineTransport, bundles_endpoint};
pub use types::{
    BroadcastConfig, BroadcastOutcome, BundleSubmitTransport, DEFAULT_ROUTE_TIMEOUT,
    RouteRejection, RpcSubmitConfig, RpcSubmitTransport, SubmitTransportError,
};
