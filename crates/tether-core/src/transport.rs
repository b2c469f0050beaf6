//! TCP transport for pairing.
//!
//! A thin layer that opens or accepts exactly one stream. Everything above
//! the byte stream (handshake, framing, encryption) lives in
//! [`crate::Channel`].

use std::net::{Ipv4Addr, SocketAddr};

use tokio::net::{TcpListener, TcpStream};

use crate::error::ChannelError;

/// Bind a listener on all interfaces. Port 0 picks an ephemeral port.
pub async fn bind(port: u16) -> Result<TcpListener, ChannelError> {
    let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, port))
        .await
        .map_err(|e| ChannelError::Transport(format!("bind to port {port} failed: {e}")))?;

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Listening on {}", addr);
    }
    Ok(listener)
}

/// Accept one peer.
pub async fn accept(listener: &TcpListener) -> Result<(TcpStream, SocketAddr), ChannelError> {
    let (stream, peer) = listener
        .accept()
        .await
        .map_err(|e| ChannelError::Transport(format!("accept failed: {e}")))?;
    configure(&stream);

    tracing::info!("Accepted peer {}", peer);
    Ok((stream, peer))
}

/// Connect to `address` (`host:port`, IPv6 hosts bracketed).
pub async fn connect(address: &str) -> Result<TcpStream, ChannelError> {
    let stream = TcpStream::connect(address)
        .await
        .map_err(|e| ChannelError::Transport(format!("connect to {address} failed: {e}")))?;
    configure(&stream);

    tracing::info!("Connected to {}", address);
    Ok(stream)
}

/// Tokens and frames are small and latency-bound.
fn configure(stream: &TcpStream) {
    if let Err(e) = stream.set_nodelay(true) {
        tracing::debug!("Failed to set TCP_NODELAY: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_accept_and_connect() {
        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();

        let addr = format!("127.0.0.1:{port}");
        let (accepted, connected) = tokio::join!(accept(&listener), connect(&addr));

        let (_, peer) = accepted.unwrap();
        assert_eq!(peer, connected.unwrap().local_addr().unwrap());
    }

    #[tokio::test]
    async fn connect_failure_is_transport_error() {
        let listener = bind(0).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        assert!(matches!(
            connect(&format!("127.0.0.1:{port}")).await,
            Err(ChannelError::Transport(_))
        ));
    }
}
