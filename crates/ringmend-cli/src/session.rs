//! Settings, channel and gateway for one CLI invocation.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, bail};
use ringmend_channel::{Channel, SshConfig, SshTunnelFactory};
use ringmend_core::Settings;
use ringmend_gateway::{ClusterApi, Gateway};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::GlobalArgs;

pub struct Session {
    pub settings: Settings,
    channel: Arc<Channel>,
    gateway: Arc<Gateway>,
}

impl Session {
    /// Build the channel for the entry host. Tunnels open lazily on first use.
    pub fn open(global: &GlobalArgs) -> anyhow::Result<Self> {
        let settings = load_settings(global)?;
        let Some(host) = global.host.clone() else {
            bail!("either --host or RINGMEND_HOST must be provided");
        };

        let channel = if global.direct {
            info!(%host, port = settings.channel.port, "connecting directly");
            Channel::direct(host, &settings.channel)
        } else {
            let key = global.ssh_key.clone().unwrap_or_else(default_ssh_key);
            if !key.exists() {
                bail!("ssh key {} does not exist", key.display());
            }
            info!(%host, user = %global.ssh_user, key = %key.display(), "connecting through ssh tunnels");
            let factory = SshTunnelFactory::new(SshConfig {
                user: global.ssh_user.clone(),
                key,
                tunnel: settings.tunnel.clone(),
            });
            Channel::tunneled(host, &settings.channel, Arc::new(factory))
        };

        let channel = Arc::new(channel);
        let gateway = Arc::new(Gateway::new(channel.clone()));
        Ok(Self {
            settings,
            channel,
            gateway,
        })
    }

    pub fn api(&self) -> Arc<dyn ClusterApi> {
        self.gateway.clone()
    }

    /// Close every tunnel. Called on every exit path once the session is open.
    pub async fn close(&self) {
        self.channel.shutdown().await;
    }
}

/// Defaults, overridden by the settings file, overridden by flags.
pub fn load_settings(global: &GlobalArgs) -> anyhow::Result<Settings> {
    let mut settings = match &global.config {
        Some(path) => Settings::from_file(path)
            .with_context(|| format!("loading settings from {}", path.display()))?,
        None => Settings::default(),
    };
    if let Some(port) = global.port {
        settings.channel.port = port;
    }
    debug!(?settings, "settings loaded");
    Ok(settings)
}

pub fn default_ssh_key() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_default()
        .join(".ssh")
        .join("id_rsa")
}

/// Flips to `true` on Ctrl-C.
pub fn shutdown_signal() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping");
            tx.send_replace(true);
        }
        // Keep the sender alive so receivers never see a closed channel.
        tx.closed().await;
    });
    rx
}
