//! The resilient channel: validation, routing, retry, tunnel recovery.

use std::collections::HashSet;
use std::sync::Arc;

use ringmend_core::{ChannelSettings, Classify};
use tokio::sync::RwLock;
use tracing::{debug, error, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::request::{Request, Response};
use crate::retry::RetryPolicy;
use crate::transport::{Address, HttpTransport, Transport};
use crate::tunnel::{TunnelFactory, TunnelPool};

/// How requests reach a node's management API.
pub enum Routing {
    /// Connect to `host:port` directly.
    Direct { port: u16 },
    /// Connect to the local end of a per-node tunnel.
    Tunneled(TunnelPool),
}

pub struct Channel {
    transport: Arc<dyn Transport>,
    routing: Routing,
    entry: String,
    retry: RetryPolicy,
    /// Endpoints learned from discovery. Targets outside this set are refused.
    known: RwLock<HashSet<String>>,
}

impl Channel {
    pub fn new(
        entry: impl Into<String>,
        transport: Arc<dyn Transport>,
        routing: Routing,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            transport,
            routing,
            entry: entry.into(),
            retry,
            known: RwLock::new(HashSet::new()),
        }
    }

    /// Talk to every node directly on the configured management port.
    pub fn direct(entry: impl Into<String>, settings: &ChannelSettings) -> Self {
        Self::new(
            entry,
            Arc::new(HttpTransport::from_settings(settings)),
            Routing::Direct {
                port: settings.port,
            },
            RetryPolicy::from_settings(settings),
        )
    }

    /// Reach every node through a tunnel opened by `factory`.
    pub fn tunneled(
        entry: impl Into<String>,
        settings: &ChannelSettings,
        factory: Arc<dyn TunnelFactory>,
    ) -> Self {
        Self::new(
            entry,
            Arc::new(HttpTransport::from_settings(settings)),
            Routing::Tunneled(TunnelPool::new(factory)),
            RetryPolicy::from_settings(settings),
        )
    }

    pub fn entry(&self) -> &str {
        &self.entry
    }

    pub fn tunnels(&self) -> Option<&TunnelPool> {
        match &self.routing {
            Routing::Tunneled(pool) => Some(pool),
            Routing::Direct { .. } => None,
        }
    }

    /// Replace the set of endpoints requests may target.
    pub async fn set_known_endpoints<I>(&self, endpoints: I)
    where
        I: IntoIterator<Item = String>,
    {
        let mut known = self.known.write().await;
        known.clear();
        known.extend(endpoints);
        debug!(endpoints = known.len(), "known endpoints updated");
    }

    /// Send `request`, retrying transport failures within the retry budget.
    ///
    /// The last transport error is returned once the budget is spent.
    /// Protocol and configuration errors are returned immediately.
    pub async fn send(&self, request: &Request) -> ChannelResult<Response> {
        if let Some(target) = request.target_endpoint() {
            if !self.known.read().await.contains(target) {
                return Err(ChannelError::UnknownEndpoint(target.to_string()));
            }
        }

        let logical = request.target_endpoint().unwrap_or(&self.entry).to_string();
        let max_attempts = self.retry.max_attempts();
        let mut attempt: u32 = 1;

        loop {
            let mut generation = None;
            let result = match self.resolve(&logical).await {
                Ok((address, lease_generation)) => {
                    generation = lease_generation;
                    self.transport.execute(&address, request).await
                }
                Err(e) => Err(e),
            };

            let err = match result {
                Ok(response) => {
                    if attempt > 1 {
                        debug!(endpoint = %logical, path = request.path(), attempt, "request recovered");
                    }
                    return Ok(response);
                }
                Err(err) if !err.is_retryable() => return Err(err),
                Err(err) => err,
            };

            if attempt >= max_attempts {
                error!(
                    endpoint = %logical,
                    path = request.path(),
                    attempts = attempt,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(err);
            }

            warn!(
                endpoint = %logical,
                path = request.path(),
                attempt,
                max_attempts,
                class = %err.class(),
                error = %err,
                "request failed, retrying"
            );

            if err.is_connection() {
                if let (Routing::Tunneled(pool), Some(seen)) = (&self.routing, generation) {
                    pool.rebuild(seen).await?;
                }
            }

            tokio::time::sleep(self.retry.delay(attempt)).await;
            attempt += 1;
        }
    }

    /// Close every tunnel. Safe to call more than once.
    pub async fn shutdown(&self) {
        if let Routing::Tunneled(pool) = &self.routing {
            pool.close_all().await;
        }
    }

    /// Physical address for `logical`, plus the tunnel generation it came from.
    async fn resolve(&self, logical: &str) -> ChannelResult<(Address, Option<u64>)> {
        match &self.routing {
            Routing::Direct { port } => Ok((
                Address {
                    host: logical.to_string(),
                    port: *port,
                    host_header: logical.to_string(),
                },
                None,
            )),
            Routing::Tunneled(pool) => {
                let lease = pool.lease(logical).await?;
                Ok((
                    Address {
                        host: "127.0.0.1".to_string(),
                        port: lease.port,
                        host_header: logical.to_string(),
                    },
                    Some(lease.generation),
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    use super::*;
    use crate::transport::TransportFuture;
    use crate::tunnel::testing::FakeTunnelFactory;

    /// Replays scripted outcomes, then answers 200 "ok". Records every address.
    #[derive(Default)]
    struct ScriptedTransport {
        script: StdMutex<VecDeque<ChannelResult<Response>>>,
        calls: StdMutex<Vec<Address>>,
    }

    impl ScriptedTransport {
        fn with(script: Vec<ChannelResult<Response>>) -> Arc<Self> {
            Arc::new(Self {
                script: StdMutex::new(script.into()),
                calls: StdMutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> Vec<Address> {
            self.calls.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        fn execute<'a>(&'a self, address: &'a Address, request: &'a Request) -> TransportFuture<'a> {
            self.calls.lock().unwrap().push(address.clone());
            let next = self
                .script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Response::new(request.path(), 200, "ok")));
            Box::pin(async move { next })
        }
    }

    fn refused(addr: &str) -> ChannelResult<Response> {
        Err(ChannelError::Connect {
            addr: addr.to_string(),
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        })
    }

    fn read_timeout() -> ChannelResult<Response> {
        Err(ChannelError::ReadTimeout {
            addr: "127.0.0.1:1".to_string(),
            path: "/x".to_string(),
            timeout: Duration::from_secs(5),
        })
    }

    fn policy(retries: u32) -> RetryPolicy {
        RetryPolicy::new(retries, Duration::from_secs(5))
    }

    fn direct(transport: Arc<ScriptedTransport>, retries: u32) -> Channel {
        Channel::new("10.0.0.1", transport, Routing::Direct { port: 10000 }, policy(retries))
    }

    #[tokio::test]
    async fn unknown_target_fails_without_a_request() {
        let transport = ScriptedTransport::with(vec![]);
        let channel = direct(transport.clone(), 3);
        channel.set_known_endpoints(vec!["10.0.0.1".to_string()]).await;

        let err = channel
            .send(&Request::get("/storage_service/active_repair/").target("10.9.9.9"))
            .await
            .unwrap_err();

        assert!(matches!(err, ChannelError::UnknownEndpoint(ref h) if h == "10.9.9.9"));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn untargeted_request_goes_to_entry() {
        let transport = ScriptedTransport::with(vec![]);
        let channel = direct(transport.clone(), 3);

        channel.send(&Request::get("/storage_service/cluster_name")).await.unwrap();

        let calls = transport.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].host, "10.0.0.1");
        assert_eq!(calls[0].port, 10000);
    }

    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried_with_backoff() {
        let transport = ScriptedTransport::with(vec![refused("10.0.0.1:10000"), read_timeout()]);
        let channel = direct(transport.clone(), 3);

        let started = tokio::time::Instant::now();
        let resp = channel.send(&Request::get("/column_family/")).await.unwrap();

        assert_eq!(resp.text().unwrap(), "ok");
        assert_eq!(transport.calls().len(), 3);
        // 5s after the first failure, 10s after the second.
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_budget_surfaces_last_error() {
        let transport = ScriptedTransport::with(vec![
            refused("10.0.0.1:10000"),
            refused("10.0.0.1:10000"),
            read_timeout(),
        ]);
        let channel = direct(transport.clone(), 2);

        let err = channel.send(&Request::get("/column_family/")).await.unwrap_err();

        assert!(matches!(err, ChannelError::ReadTimeout { .. }));
        assert_eq!(transport.calls().len(), 3);
    }

    #[tokio::test]
    async fn protocol_errors_are_not_retried() {
        let transport = ScriptedTransport::with(vec![Err(ChannelError::Status {
            path: "/column_family/".to_string(),
            status: 500,
            body: "boom".to_string(),
        })]);
        let channel = direct(transport.clone(), 5);

        let err = channel.send(&Request::get("/column_family/")).await.unwrap_err();

        assert!(matches!(err, ChannelError::Status { status: 500, .. }));
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connection_failure_rebuilds_tunnels_once_and_retries_same_endpoint() {
        let transport = ScriptedTransport::with(vec![
            Ok(Response::new("/x", 200, "warm")),
            Ok(Response::new("/x", 200, "warm")),
            refused("127.0.0.1:40001"),
        ]);
        let factory = Arc::new(FakeTunnelFactory::new());
        let channel = Channel::new(
            "10.0.0.1",
            transport.clone(),
            Routing::Tunneled(TunnelPool::new(factory.clone())),
            policy(3),
        );
        channel
            .set_known_endpoints(vec!["10.0.0.1".to_string(), "10.0.0.2".to_string()])
            .await;

        // Open tunnels to both nodes.
        channel.send(&Request::get("/x")).await.unwrap();
        channel.send(&Request::get("/x").target("10.0.0.2")).await.unwrap();

        let resp = channel
            .send(&Request::get("/storage_service/active_repair/").target("10.0.0.2"))
            .await
            .unwrap();
        assert_eq!(resp.text().unwrap(), "ok");

        let pool = channel.tunnels().unwrap();
        assert_eq!(pool.rebuilds().await, 1);
        // Both tunnels were reopened, not just the failing one.
        assert_eq!(
            factory.opened(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.2"]
        );

        let calls = transport.calls();
        assert_eq!(calls.len(), 4);
        let failed = &calls[2];
        let retried = &calls[3];
        assert_eq!(failed.host_header, "10.0.0.2");
        assert_eq!(retried.host_header, "10.0.0.2");
        assert_eq!(retried.host, "127.0.0.1");
        assert_ne!(retried.port, failed.port);
    }

    #[tokio::test(start_paused = true)]
    async fn read_timeout_does_not_rebuild_tunnels() {
        let transport = ScriptedTransport::with(vec![read_timeout()]);
        let factory = Arc::new(FakeTunnelFactory::new());
        let channel = Channel::new(
            "10.0.0.1",
            transport.clone(),
            Routing::Tunneled(TunnelPool::new(factory.clone())),
            policy(3),
        );

        channel.send(&Request::get("/x")).await.unwrap();

        assert_eq!(channel.tunnels().unwrap().rebuilds().await, 0);
        assert_eq!(factory.opened(), vec!["10.0.0.1"]);
        assert_eq!(transport.calls().len(), 2);
    }

    #[tokio::test]
    async fn shutdown_closes_tunnels() {
        let transport = ScriptedTransport::with(vec![]);
        let factory = Arc::new(FakeTunnelFactory::new());
        let channel = Channel::new(
            "10.0.0.1",
            transport,
            Routing::Tunneled(TunnelPool::new(factory.clone())),
            policy(0),
        );
        channel.send(&Request::get("/x")).await.unwrap();

        channel.shutdown().await;

        assert!(channel.tunnels().unwrap().hosts().await.is_empty());
        assert_eq!(factory.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_credentials_during_rebuild_abort_without_retry() {
        let transport = ScriptedTransport::with(vec![
            Ok(Response::new("/x", 200, "warm")),
            refused("127.0.0.1:40000"),
        ]);
        let factory = Arc::new(FakeTunnelFactory::new());
        let channel = Channel::new(
            "10.0.0.1",
            transport.clone(),
            Routing::Tunneled(TunnelPool::new(factory.clone())),
            policy(3),
        );
        channel.send(&Request::get("/x")).await.unwrap();
        factory.reject("10.0.0.1");

        let started = tokio::time::Instant::now();
        let err = channel.send(&Request::get("/column_family/")).await.unwrap_err();

        assert!(matches!(err, ChannelError::TunnelAuth { ref host, .. } if host == "10.0.0.1"));
        assert_eq!(err.class(), ringmend_core::ErrorClass::Configuration);
        // No backoff sleep and no second request after the failed rebuild.
        assert_eq!(started.elapsed(), Duration::ZERO);
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(channel.tunnels().unwrap().rebuilds().await, 1);
    }
}
