//! HTTP/1.1 transport for management API calls.
//!
//! Each call opens a fresh TCP connection, performs the hyper handshake,
//! and sends a single request. Connect and read phases have their own
//! timeouts; either expiring is a transport failure for the channel to
//! retry.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use ringmend_core::ChannelSettings;
use tracing::debug;

use crate::error::{ChannelError, ChannelResult};
use crate::request::{Request, Response};

/// Boxed future returned by [`Transport::execute`].
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = ChannelResult<Response>> + Send + 'a>>;

/// Where a request is physically sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Host to open the TCP connection to.
    pub host: String,
    pub port: u16,
    /// Value of the `Host` header: the logical node the call is for.
    pub host_header: String,
}

impl Address {
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Executes a single request attempt. Injected so tests can script failures.
pub trait Transport: Send + Sync {
    fn execute<'a>(&'a self, address: &'a Address, request: &'a Request) -> TransportFuture<'a>;
}

/// hyper-backed transport.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    connect_timeout: Duration,
    read_timeout: Duration,
}

impl HttpTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            read_timeout,
        }
    }

    pub fn from_settings(settings: &ChannelSettings) -> Self {
        Self::new(settings.connect_timeout, settings.read_timeout)
    }

    async fn send(&self, address: &Address, request: &Request) -> ChannelResult<Response> {
        let addr = address.socket_addr();
        let path = request.path_and_query();

        let stream = tokio::time::timeout(self.connect_timeout, tokio::net::TcpStream::connect(&addr))
            .await
            .map_err(|_| ChannelError::ConnectTimeout {
                addr: addr.clone(),
                timeout: self.connect_timeout,
            })?
            .map_err(|source| ChannelError::Connect {
                addr: addr.clone(),
                source,
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| ChannelError::Connection {
                addr: addr.clone(),
                message: format!("handshake: {e}"),
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "management connection closed with error");
            }
        });

        let req = http::Request::builder()
            .method(request.method().as_http())
            .uri(path.as_str())
            .header(http::header::HOST, address.host_header.as_str())
            .header(http::header::ACCEPT, "application/json")
            .header(http::header::USER_AGENT, concat!("ringmend/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .map_err(|e| ChannelError::InvalidRequest(format!("{path}: {e}")))?;

        let exchange = async {
            let resp = sender.send_request(req).await.map_err(|e| ChannelError::Connection {
                addr: addr.clone(),
                message: format!("send: {e}"),
            })?;
            let status = resp.status();
            let body = resp
                .into_body()
                .collect()
                .await
                .map_err(|e| ChannelError::Connection {
                    addr: addr.clone(),
                    message: format!("read body: {e}"),
                })?
                .to_bytes();
            Ok::<_, ChannelError>((status, body))
        };

        let (status, body) = tokio::time::timeout(self.read_timeout, exchange)
            .await
            .map_err(|_| ChannelError::ReadTimeout {
                addr: addr.clone(),
                path: path.clone(),
                timeout: self.read_timeout,
            })??;

        debug!(%addr, %path, status = status.as_u16(), "management call completed");

        if !status.is_success() {
            return Err(ChannelError::Status {
                path,
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        Ok(Response::new(request.path(), status.as_u16(), body))
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::from_settings(&ChannelSettings::default())
    }
}

impl Transport for HttpTransport {
    fn execute<'a>(&'a self, address: &'a Address, request: &'a Request) -> TransportFuture<'a> {
        Box::pin(self.send(address, request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one connection with a canned HTTP response, returning the raw request.
    async fn serve_once(listener: TcpListener, response: &'static str) -> String {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut buf = vec![0u8; 4096];
        let n = socket.read(&mut buf).await.unwrap();
        socket.write_all(response.as_bytes()).await.unwrap();
        socket.shutdown().await.unwrap();
        String::from_utf8_lossy(&buf[..n]).into_owned()
    }

    fn local_address(port: u16) -> Address {
        Address {
            host: "127.0.0.1".to_string(),
            port,
            host_header: "10.0.0.7".to_string(),
        }
    }

    #[tokio::test]
    async fn returns_body_on_success() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let server = tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 200 OK\r\ncontent-length: 9\r\n\r\n\"RUNNING\"",
        ));

        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1));
        let request = Request::get("/storage_service/repair_async/ks").param("id", 7);
        let resp = transport.execute(&local_address(port), &request).await.unwrap();
        assert_eq!(resp.text().unwrap(), "\"RUNNING\"");

        let raw = server.await.unwrap();
        assert!(raw.starts_with("GET /storage_service/repair_async/ks?id=7 HTTP/1.1"));
        assert!(raw.to_lowercase().contains("host: 10.0.0.7"));
    }

    #[tokio::test]
    async fn non_2xx_is_status_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(serve_once(
            listener,
            "HTTP/1.1 500 Internal Server Error\r\ncontent-length: 4\r\n\r\nboom",
        ));

        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_secs(1));
        let err = transport
            .execute(&local_address(port), &Request::get("/column_family/"))
            .await
            .unwrap_err();
        match err {
            ChannelError::Status { status, body, .. } => {
                assert_eq!(status, 500);
                assert_eq!(body, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn closed_port_is_connection_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let transport = HttpTransport::new(Duration::from_millis(500), Duration::from_millis(500));
        let err = transport
            .execute(&local_address(port), &Request::get("/x"))
            .await
            .unwrap_err();
        assert!(err.is_connection());
    }

    #[tokio::test]
    async fn silent_server_hits_read_timeout() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let _server = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let transport = HttpTransport::new(Duration::from_secs(1), Duration::from_millis(100));
        let err = transport
            .execute(&local_address(port), &Request::get("/x"))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::ReadTimeout { .. }));
        assert!(!err.is_connection());
    }
}
