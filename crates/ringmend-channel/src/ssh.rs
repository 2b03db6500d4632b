//! SSH port forwards through the system `ssh` client.
//!
//! Each tunnel is an `ssh -N -L` child process. The factory waits until
//! the forwarded local port accepts connections before handing the
//! tunnel out. The client runs in batch mode, so passphrase-protected
//! keys must be loaded into an agent beforehand.
//!
//! Once a tunnel is up its stderr is read until the process exits. ssh
//! reports every refused forward there, and an unread pipe eventually
//! blocks the client and stalls the forward.

use std::future::Future;
use std::path::PathBuf;
use std::pin::Pin;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use ringmend_core::TunnelSettings;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::error::{ChannelError, ChannelResult};
use crate::tunnel::{Tunnel, TunnelFactory, TunnelFuture};

const READY_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone)]
pub struct SshConfig {
    pub user: String,
    pub key: PathBuf,
    pub tunnel: TunnelSettings,
}

pub struct SshTunnelFactory {
    config: SshConfig,
}

impl SshTunnelFactory {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    async fn spawn(&self, host: &str) -> ChannelResult<Box<dyn Tunnel>> {
        let local_port = free_local_port(host).await?;
        let args = ssh_args(&self.config, host, local_port);
        debug!(%host, local_port, "spawning ssh tunnel");

        let mut child = Command::new("ssh")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ChannelError::TunnelUnavailable {
                host: host.to_string(),
                message: format!("failed to spawn ssh: {e}"),
            })?;

        let deadline = tokio::time::Instant::now() + self.config.tunnel.ready_timeout;
        loop {
            let exited = child.try_wait().map_err(|e| ChannelError::TunnelUnavailable {
                host: host.to_string(),
                message: format!("ssh process lost: {e}"),
            })?;
            if let Some(status) = exited {
                let stderr = drain_stderr(&mut child).await;
                let err = classify_exit(&self.config.user, host, status, &stderr);
                error!(
                    user = %self.config.user,
                    %host,
                    key = %self.config.key.display(),
                    error = %err,
                    "ssh tunnel failed"
                );
                return Err(err);
            }

            if tokio::net::TcpStream::connect(("127.0.0.1", local_port)).await.is_ok() {
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(ChannelError::TunnelUnavailable {
                    host: host.to_string(),
                    message: format!(
                        "forward not ready after {:?}",
                        self.config.tunnel.ready_timeout
                    ),
                });
            }
            tokio::time::sleep(READY_POLL).await;
        }

        debug!(%host, local_port, "ssh tunnel ready");
        let stderr = child
            .stderr
            .take()
            .map(|pipe| log_stderr(host.to_string(), pipe));
        Ok(Box::new(SshTunnel {
            host: host.to_string(),
            local_port,
            child,
            stderr,
        }))
    }
}

impl TunnelFactory for SshTunnelFactory {
    fn open<'a>(&'a self, host: &'a str) -> TunnelFuture<'a> {
        Box::pin(self.spawn(host))
    }
}

#[derive(Debug)]
pub struct SshTunnel {
    host: String,
    local_port: u16,
    child: Child,
    stderr: Option<JoinHandle<()>>,
}

impl Tunnel for SshTunnel {
    fn local_port(&self) -> u16 {
        self.local_port
    }

    fn is_alive(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    fn close(&mut self) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(async move {
            if let Err(e) = self.child.kill().await {
                debug!(host = %self.host, error = %e, "ssh tunnel already gone");
            }
            if let Some(task) = self.stderr.take() {
                task.abort();
            }
        })
    }
}

/// Arguments for `ssh` forwarding `127.0.0.1:local_port` to the node's API.
fn ssh_args(config: &SshConfig, host: &str, local_port: u16) -> Vec<String> {
    let forward = format!(
        "127.0.0.1:{local_port}:{}:{}",
        config.tunnel.remote_host, config.tunnel.remote_port
    );
    vec![
        "-N".to_string(),
        "-o".to_string(),
        "BatchMode=yes".to_string(),
        "-o".to_string(),
        "ExitOnForwardFailure=yes".to_string(),
        "-o".to_string(),
        format!("ServerAliveInterval={}", config.tunnel.keepalive.as_secs().max(1)),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
        "-i".to_string(),
        config.key.display().to_string(),
        "-L".to_string(),
        forward,
        format!("{}@{}", config.user, host),
    ]
}

/// Map an early ssh exit to an error class.
///
/// Rejected credentials or host keys are operator problems and abort the
/// run; anything else is treated as an unreachable link and retried.
fn classify_exit(user: &str, host: &str, status: ExitStatus, stderr: &str) -> ChannelError {
    let message = if stderr.trim().is_empty() {
        format!("ssh exited with {status}")
    } else {
        stderr.trim().to_string()
    };

    let auth_failure = ["Permission denied", "Host key verification failed", "not accessible"]
        .iter()
        .any(|marker| stderr.contains(marker));

    if auth_failure {
        ChannelError::TunnelAuth {
            user: user.to_string(),
            host: host.to_string(),
            message,
        }
    } else {
        ChannelError::TunnelUnavailable {
            host: host.to_string(),
            message,
        }
    }
}

/// Log every line `ssh` writes to stderr while the tunnel is up.
///
/// Refused forwards are routine while a node restarts its API and are
/// logged at debug; anything else is a warning.
fn log_stderr<R>(host: String, pipe: R) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(pipe).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) if line.starts_with("channel ") => {
                    debug!(%host, message = %line, "ssh");
                }
                Ok(Some(line)) => warn!(%host, message = %line, "ssh"),
                Ok(None) => break,
                Err(e) => {
                    debug!(%host, error = %e, "ssh stderr closed");
                    break;
                }
            }
        }
    })
}

async fn drain_stderr(child: &mut Child) -> String {
    let mut buf = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut buf).await;
    }
    buf
}

async fn free_local_port(host: &str) -> ChannelResult<u16> {
    let listener = tokio::net::TcpListener::bind(("127.0.0.1", 0))
        .await
        .map_err(|e| ChannelError::TunnelUnavailable {
            host: host.to_string(),
            message: format!("no free local port: {e}"),
        })?;
    let port = listener
        .local_addr()
        .map_err(|e| ChannelError::TunnelUnavailable {
            host: host.to_string(),
            message: format!("no free local port: {e}"),
        })?
        .port();
    Ok(port)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ringmend_core::{Classify, ErrorClass};

    fn config() -> SshConfig {
        SshConfig {
            user: "ringmend".to_string(),
            key: PathBuf::from("/home/op/.ssh/id_rsa"),
            tunnel: TunnelSettings::default(),
        }
    }

    fn exit_status(code: i32) -> ExitStatus {
        #[cfg(unix)]
        {
            use std::os::unix::process::ExitStatusExt;
            ExitStatus::from_raw(code << 8)
        }
        #[cfg(windows)]
        {
            use std::os::windows::process::ExitStatusExt;
            ExitStatus::from_raw(code as u32)
        }
    }

    #[test]
    fn args_forward_local_port_to_remote_api() {
        let args = ssh_args(&config(), "10.0.0.3", 41000);
        assert_eq!(args.first().map(String::as_str), Some("-N"));
        assert!(args.contains(&"127.0.0.1:41000:127.0.0.1:10000".to_string()));
        assert!(args.contains(&"ServerAliveInterval=10".to_string()));
        assert!(args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("ringmend@10.0.0.3"));
    }

    #[test]
    fn permission_denied_is_auth_failure() {
        let err = classify_exit(
            "ringmend",
            "10.0.0.3",
            exit_status(255),
            "ringmend@10.0.0.3: Permission denied (publickey).\n",
        );
        assert!(matches!(err, ChannelError::TunnelAuth { .. }));
        assert_eq!(err.class(), ErrorClass::Configuration);
    }

    #[test]
    fn unreachable_host_is_transport_failure() {
        let err = classify_exit(
            "ringmend",
            "10.0.0.3",
            exit_status(255),
            "ssh: connect to host 10.0.0.3 port 22: Connection timed out\n",
        );
        assert!(matches!(err, ChannelError::TunnelUnavailable { .. }));
        assert!(err.is_connection());
    }

    #[test]
    fn empty_stderr_reports_exit_status() {
        let err = classify_exit("ringmend", "10.0.0.3", exit_status(1), "");
        assert!(err.to_string().contains("ssh exited with"));
    }

    #[tokio::test]
    async fn free_port_is_nonzero() {
        assert_ne!(free_local_port("10.0.0.3").await.unwrap(), 0);
    }

    const REFUSED: &str = "channel 7: open failed: connect failed: Connection refused\n";

    #[tokio::test]
    async fn stderr_is_consumed_while_the_tunnel_is_up() {
        use tokio::io::AsyncWriteExt;

        let (mut writer, reader) = tokio::io::duplex(256);
        let task = log_stderr("10.0.0.3".to_string(), reader);

        let flood = async {
            for _ in 0..20_000 {
                writer.write_all(REFUSED.as_bytes()).await.unwrap();
            }
        };
        tokio::time::timeout(Duration::from_secs(10), flood)
            .await
            .expect("writer blocked on a full stderr pipe");

        drop(writer);
        task.await.unwrap();
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chatty_child_does_not_stall_on_stderr() {
        // Writes about 1 MB to stderr, far past the pipe buffer, then
        // reports on stdout that it got through.
        let script = format!(
            "i=0; while [ $i -lt 16000 ]; do printf '{}' >&2; i=$((i+1)); done; echo through",
            REFUSED.replace('\n', "\\n")
        );
        let mut child = Command::new("sh")
            .arg("-c")
            .arg(script)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .unwrap();
        let task = log_stderr("10.0.0.3".to_string(), child.stderr.take().unwrap());

        let mut stdout = String::new();
        let mut pipe = child.stdout.take().unwrap();
        tokio::time::timeout(Duration::from_secs(30), pipe.read_to_string(&mut stdout))
            .await
            .expect("child stalled writing stderr")
            .unwrap();

        assert_eq!(stdout.trim(), "through");
        assert!(child.wait().await.unwrap().success());
        task.await.unwrap();
    }
}
