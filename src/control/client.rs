use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;

use crate::control::protocol::{self, ControlRequest, ControlResponse};
use crate::error::{AutosegError, Result};

/// One-shot control client.
#[derive(Debug, Clone)]
pub struct ControlClient {
    addr: String,
    timeout: Duration,
}

impl ControlClient {
    pub fn new(addr: impl Into<String>, timeout: Duration) -> Self {
        Self {
            addr: addr.into(),
            timeout,
        }
    }

    /// Send one request and wait for its response.
    ///
    /// Returns [`AutosegError::NoResponse`] if the server cannot be reached,
    /// closes without answering, or does not answer within the timeout.
    pub async fn request(&self, request: &ControlRequest) -> Result<ControlResponse> {
        match tokio::time::timeout(self.timeout, self.exchange(request)).await {
            Ok(Err(AutosegError::Io(e))) => {
                tracing::debug!(addr = %self.addr, error = %e, "Control exchange failed");
                Err(AutosegError::NoResponse)
            }
            Ok(result) => result,
            Err(_) => Err(AutosegError::NoResponse),
        }
    }

    async fn exchange(&self, request: &ControlRequest) -> Result<ControlResponse> {
        let stream = TcpStream::connect(&self.addr).await?;
        let mut framed = Framed::new(stream, protocol::codec());
        framed.send(protocol::encode(request)?).await?;
        match framed.next().await {
            Some(frame) => protocol::decode(&frame?),
            None => Err(AutosegError::NoResponse),
        }
    }
}
