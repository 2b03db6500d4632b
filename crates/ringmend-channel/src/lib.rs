//! ringmend-channel: the resilient request layer under the gateway.
//!
//! A [`Channel`] sends management API requests to cluster nodes, either
//! directly or through a pool of SSH tunnels, one per node.
//!
//! # Failure handling
//!
//! ```text
//! Channel::send(request)
//!   ├── target outside the discovered endpoints → UnknownEndpoint (no request)
//!   └── loop attempt = 1..=retries+1
//!         ├── resolve address (direct host:port, or tunnel local port)
//!         ├── Transport::execute → Ok(response) → return
//!         ├── non-transport error → return
//!         └── transport error
//!               ├── budget spent → return last error
//!               ├── connection-class + tunnels → TunnelPool::rebuild (all tunnels)
//!               └── sleep RetryPolicy::delay(attempt)
//! ```
//!
//! Tunnels are opened lazily on first use. A rebuild closes every open
//! tunnel and reopens one per previously known host, because a dropped
//! shared link (VPN, jump host) usually takes all of them down at once.

pub mod channel;
pub mod error;
pub mod request;
pub mod retry;
pub mod ssh;
pub mod transport;
pub mod tunnel;

pub use channel::{Channel, Routing};
pub use error::{ChannelError, ChannelResult};
pub use request::{Method, Request, Response};
pub use retry::RetryPolicy;
pub use ssh::{SshConfig, SshTunnelFactory};
pub use transport::{Address, HttpTransport, Transport, TransportFuture};
pub use tunnel::{Lease, Tunnel, TunnelFactory, TunnelFuture, TunnelPool};
