//! Tunnel pool: one forwarded port per management endpoint.
//!
//! Tunnels are opened lazily on first use and kept for the life of the
//! channel. Each host has its own slot lock, held while that host's tunnel
//! is opened or torn down, so a slow host only delays its own callers. A
//! rebuild takes every slot before closing anything, which keeps a job
//! from observing a tunnel that is mid-teardown.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ChannelError, ChannelResult};

/// Boxed future returned by [`TunnelFactory::open`].
pub type TunnelFuture<'a> =
    Pin<Box<dyn Future<Output = ChannelResult<Box<dyn Tunnel>>> + Send + 'a>>;

/// An open port forward to one node's management API.
pub trait Tunnel: Send + std::fmt::Debug {
    /// Local port that forwards to the node.
    fn local_port(&self) -> u16;

    /// Whether the forward is still up.
    fn is_alive(&mut self) -> bool;

    /// Tear the forward down.
    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Opens tunnels to management endpoints.
pub trait TunnelFactory: Send + Sync {
    fn open<'a>(&'a self, host: &'a str) -> TunnelFuture<'a>;
}

/// A tunnel port handed out by the pool, tagged with the pool generation
/// it came from. Passing the generation back to [`TunnelPool::rebuild`]
/// lets concurrent callers that saw the same broken link share one rebuild.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lease {
    pub port: u16,
    pub generation: u64,
}

type Slot = Arc<Mutex<Option<Box<dyn Tunnel>>>>;

#[derive(Default)]
struct PoolState {
    slots: HashMap<String, Slot>,
    generation: u64,
    rebuilds: u32,
}

pub struct TunnelPool {
    factory: Arc<dyn TunnelFactory>,
    /// Never held across an await on a slot or the factory.
    state: Mutex<PoolState>,
    /// Serializes rebuilds.
    rebuilding: Mutex<()>,
}

impl TunnelPool {
    pub fn new(factory: Arc<dyn TunnelFactory>) -> Self {
        Self {
            factory,
            state: Mutex::new(PoolState::default()),
            rebuilding: Mutex::new(()),
        }
    }

    /// Return the local port for `host`, opening or reviving its tunnel.
    pub async fn lease(&self, host: &str) -> ChannelResult<Lease> {
        let slot = self.slot(host).await;
        let mut tunnel = slot.lock().await;

        if let Some(open) = tunnel.as_mut() {
            if open.is_alive() {
                let port = open.local_port();
                return Ok(Lease {
                    port,
                    generation: self.generation().await,
                });
            }
            warn!(%host, "tunnel died, reopening");
            open.close().await;
            *tunnel = None;
        }

        debug!(%host, "opening tunnel");
        let opened = self.factory.open(host).await?;
        let port = opened.local_port();
        *tunnel = Some(opened);
        Ok(Lease {
            port,
            generation: self.generation().await,
        })
    }

    /// Close every open tunnel and reopen one per previously open host.
    ///
    /// `seen_generation` is the generation of the lease whose request
    /// failed. If another caller already rebuilt since then, this is a
    /// no-op. Hosts that cannot be reached yet are left closed and will
    /// be reopened lazily by the next lease; authentication failures
    /// abort the rebuild.
    pub async fn rebuild(&self, seen_generation: u64) -> ChannelResult<()> {
        let _rebuilding = self.rebuilding.lock().await;

        let current = self.generation().await;
        if current != seen_generation {
            debug!(seen = seen_generation, current, "tunnels already rebuilt");
            return Ok(());
        }
        let slots = self.snapshot().await;

        // Every slot is taken before the generation moves, so no lease can
        // pair an old tunnel with the new generation.
        let mut guards = Vec::with_capacity(slots.len());
        for (_, slot) in &slots {
            guards.push(slot.clone().lock_owned().await);
        }
        let mut hosts = Vec::new();
        for ((host, _), guard) in slots.iter().zip(guards.iter_mut()) {
            if let Some(mut tunnel) = guard.take() {
                tunnel.close().await;
                hosts.push(host.clone());
            }
        }
        let generation = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.rebuilds += 1;
            state.generation
        };
        drop(guards);

        info!(tunnels = hosts.len(), generation, "rebuilding all tunnels");

        for host in hosts {
            let slot = self.slot(&host).await;
            let mut tunnel = slot.lock().await;
            if tunnel.is_some() {
                // A lease got there first.
                continue;
            }
            match self.factory.open(&host).await {
                Ok(opened) => *tunnel = Some(opened),
                Err(e @ ChannelError::TunnelAuth { .. }) => return Err(e),
                Err(e) => {
                    warn!(%host, error = %e, "tunnel not restored, will retry on next use");
                }
            }
        }

        Ok(())
    }

    /// Close every tunnel. The pool stays usable and reopens lazily.
    pub async fn close_all(&self) {
        let mut count = 0;
        for (host, slot) in self.snapshot().await {
            if let Some(mut tunnel) = slot.lock().await.take() {
                tunnel.close().await;
                debug!(%host, "tunnel closed");
                count += 1;
            }
        }
        if count > 0 {
            info!(tunnels = count, "all tunnels closed");
        }
    }

    /// Hosts with an open tunnel, sorted.
    pub async fn hosts(&self) -> Vec<String> {
        let mut hosts = Vec::new();
        for (host, slot) in self.snapshot().await {
            if slot.lock().await.is_some() {
                hosts.push(host);
            }
        }
        hosts
    }

    /// Number of full rebuilds performed so far.
    pub async fn rebuilds(&self) -> u32 {
        self.state.lock().await.rebuilds
    }

    async fn slot(&self, host: &str) -> Slot {
        self.state
            .lock()
            .await
            .slots
            .entry(host.to_string())
            .or_default()
            .clone()
    }

    async fn generation(&self) -> u64 {
        self.state.lock().await.generation
    }

    async fn snapshot(&self) -> Vec<(String, Slot)> {
        let state = self.state.lock().await;
        let mut slots: Vec<(String, Slot)> = state
            .slots
            .iter()
            .map(|(host, slot)| (host.clone(), slot.clone()))
            .collect();
        slots.sort_by(|a, b| a.0.cmp(&b.0));
        slots
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::testing::FakeTunnelFactory;
    use super::*;

    async fn opens_reach(factory: &FakeTunnelFactory, count: usize) {
        while factory.opened().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn lease_opens_once_per_host() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());

        let a = pool.lease("10.0.0.1").await.unwrap();
        let again = pool.lease("10.0.0.1").await.unwrap();
        let b = pool.lease("10.0.0.2").await.unwrap();

        assert_eq!(a, again);
        assert_ne!(a.port, b.port);
        assert_eq!(factory.opened(), vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test]
    async fn rebuild_reopens_every_host() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());

        let before = pool.lease("10.0.0.1").await.unwrap();
        pool.lease("10.0.0.2").await.unwrap();

        pool.rebuild(before.generation).await.unwrap();

        assert_eq!(pool.rebuilds().await, 1);
        assert_eq!(factory.closed.lock().unwrap().len(), 2);
        assert_eq!(factory.opened().len(), 4);
        assert_eq!(pool.hosts().await, vec!["10.0.0.1", "10.0.0.2"]);

        let after = pool.lease("10.0.0.1").await.unwrap();
        assert_ne!(after.port, before.port);
        assert_eq!(after.generation, before.generation + 1);
    }

    #[tokio::test]
    async fn stale_generation_skips_rebuild() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());

        let lease = pool.lease("10.0.0.1").await.unwrap();
        pool.rebuild(lease.generation).await.unwrap();
        // A second caller that failed on the same old lease.
        pool.rebuild(lease.generation).await.unwrap();

        assert_eq!(pool.rebuilds().await, 1);
    }

    #[tokio::test]
    async fn dead_tunnel_is_reopened_on_lease() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());

        let first = pool.lease("10.0.0.1").await.unwrap();
        factory.kill_switch.store(true, Ordering::SeqCst);
        let second = pool.lease("10.0.0.1").await.unwrap();

        assert_ne!(first.port, second.port);
        assert_eq!(factory.opened().len(), 2);
    }

    #[tokio::test]
    async fn close_all_empties_pool() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());
        pool.lease("10.0.0.1").await.unwrap();

        pool.close_all().await;

        assert!(pool.hosts().await.is_empty());
        assert_eq!(factory.closed.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn rebuild_aborts_when_a_host_rejects_credentials() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = TunnelPool::new(factory.clone());
        let lease = pool.lease("10.0.0.1").await.unwrap();
        pool.lease("10.0.0.2").await.unwrap();

        factory.reject("10.0.0.1");
        let err = pool.rebuild(lease.generation).await.unwrap_err();

        assert!(matches!(err, ChannelError::TunnelAuth { ref host, .. } if host == "10.0.0.1"));
        // The remaining host is not reopened once credentials are known bad.
        assert_eq!(factory.opened(), vec!["10.0.0.1", "10.0.0.2", "10.0.0.1"]);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_open_does_not_block_other_hosts() {
        let factory = Arc::new(FakeTunnelFactory::new());
        factory.slow_down("10.0.0.1", Duration::from_secs(15));
        let pool = Arc::new(TunnelPool::new(factory.clone()));

        let slow = tokio::spawn({
            let pool = pool.clone();
            async move { pool.lease("10.0.0.1").await }
        });
        opens_reach(&factory, 1).await;

        let fast = tokio::time::timeout(Duration::from_secs(1), pool.lease("10.0.0.2")).await;
        assert!(fast.is_ok(), "lease for 10.0.0.2 waited on 10.0.0.1");
        assert!(!slow.is_finished());

        slow.await.unwrap().unwrap();
        assert_eq!(pool.hosts().await, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[tokio::test(start_paused = true)]
    async fn lease_during_rebuild_waits_only_for_its_own_host() {
        let factory = Arc::new(FakeTunnelFactory::new());
        let pool = Arc::new(TunnelPool::new(factory.clone()));
        let before = pool.lease("10.0.0.1").await.unwrap();
        pool.lease("10.0.0.2").await.unwrap();
        factory.slow_down("10.0.0.1", Duration::from_secs(15));

        let rebuild = tokio::spawn({
            let pool = pool.clone();
            async move { pool.rebuild(before.generation).await }
        });
        // The rebuild is now reopening 10.0.0.1.
        opens_reach(&factory, 3).await;

        let lease = tokio::time::timeout(Duration::from_secs(1), pool.lease("10.0.0.2"))
            .await
            .expect("lease for 10.0.0.2 waited on 10.0.0.1")
            .unwrap();
        assert_eq!(lease.generation, before.generation + 1);

        rebuild.await.unwrap().unwrap();
        assert_eq!(pool.rebuilds().await, 1);
        // 10.0.0.2 was reopened by the lease, not a second time by the rebuild.
        assert_eq!(
            factory.opened(),
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.1", "10.0.0.2"]
        );
    }
}
