use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;

use crate::control::protocol::{self, ControlRequest, ControlResponse};
use crate::control::service::ControlService;
use crate::error::{AutosegError, Result};

/// Control-plane listener.
///
/// Connections are served one at a time: read one request, answer it,
/// close.
pub struct ControlServer {
    listener: TcpListener,
    service: ControlService,
    request_timeout: Duration,
}

impl ControlServer {
    pub async fn bind(
        addr: SocketAddr,
        service: ControlService,
        request_timeout: Duration,
    ) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            AutosegError::Fatal(format!("cannot bind control socket {}: {}", addr, e))
        })?;
        Ok(Self {
            listener,
            service,
            request_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub async fn run(self, shutdown: CancellationToken) {
        if let Ok(addr) = self.listener.local_addr() {
            tracing::info!(%addr, "Control server listening");
        }
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("Control server shutting down");
                    break;
                }
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            if let Err(e) = self.serve_connection(stream).await {
                                tracing::warn!(%peer, error = %e, "Control connection failed");
                            }
                        }
                        Err(e) => {
                            tracing::warn!(error = %e, "Control accept failed");
                        }
                    }
                }
            }
        }
    }

    async fn serve_connection(&self, stream: TcpStream) -> Result<()> {
        let mut framed = Framed::new(stream, protocol::codec());
        let frame = match tokio::time::timeout(self.request_timeout, framed.next()).await {
            Ok(Some(frame)) => frame,
            Ok(None) => return Ok(()),
            Err(_) => {
                return Err(AutosegError::Protocol(
                    "timed out waiting for request".to_string(),
                ))
            }
        };

        let response = match frame {
            Ok(bytes) => match protocol::decode::<ControlRequest>(&bytes) {
                Ok(request) => self.service.handle(request).await,
                Err(e) => self.service.reject(&e),
            },
            Err(e) => self.service.reject(&AutosegError::Protocol(e.to_string())),
        };
        send_response(&mut framed, &response).await
    }
}

async fn send_response(
    framed: &mut Framed<TcpStream, tokio_util::codec::LengthDelimitedCodec>,
    response: &ControlResponse,
) -> Result<()> {
    framed.send(protocol::encode(response)?).await?;
    Ok(())
}
