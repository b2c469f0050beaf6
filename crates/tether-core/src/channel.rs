//! Paired, authenticated channel over a reliable byte stream.
//!
//! After pairing, every message is split into fixed-size frames and each
//! frame is encrypted separately, so every ciphertext on the wire is exactly
//! [`PairingConfig::wire_frame_len`] bytes long.
//!
//! # Lifecycle
//!
//! ```text
//! new ──> pair/listen/connect ──> (WLAN) sas + verified_oob ──> read/write ──> close
//!                 │
//!                 └── Aborted: pair again with a fresh stream
//! ```

use std::{net::SocketAddr, sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use rand::{CryptoRng, RngCore, rngs::OsRng};
use tether_crypto::{KeyAgreement, SHARED_SECRET_SIZE, SecureChannel, ShortAuthString};
use tether_proto::{Reassembler, split};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    sync::watch,
    time::timeout,
};
use zeroize::Zeroizing;

use crate::{
    config::PairingConfig,
    descriptor::{ChannelDescriptor, ChannelKind},
    error::ChannelError,
    handshake::{HandshakeState, Handshaker},
    transport,
};

/// Closes a [`Channel`] from another task or thread.
///
/// Pending handshakes, reads and writes fail with [`ChannelError::Closed`].
#[derive(Debug, Clone)]
pub struct CloseHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CloseHandle {
    /// Signal the channel to close. Idempotent.
    pub fn close(&self) {
        self.tx.send_replace(true);
    }

    /// Whether close has been signalled.
    pub fn is_closed(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Keyed stream plus receive-side framing state.
struct Session<S> {
    stream: S,
    secure: SecureChannel,
    reassembler: Reassembler,
    inbox: BytesMut,
}

/// One pairing session with one peer.
///
/// Generic over the byte stream so the handshake and data path can run over
/// in-memory streams in tests; `listen` and `connect` use TCP.
pub struct Channel<S = TcpStream, R = OsRng> {
    descriptor: ChannelDescriptor,
    config: PairingConfig,
    rng: R,
    agreement: KeyAgreement,
    state: HandshakeState,
    session: Option<Session<S>>,
    sas: Option<ShortAuthString>,
    peer: Option<SocketAddr>,
    close_tx: Arc<watch::Sender<bool>>,
    closed: watch::Receiver<bool>,
}

impl<S> Channel<S, OsRng> {
    /// Channel using the operating system RNG.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the configuration does not validate
    pub fn new(descriptor: ChannelDescriptor, config: PairingConfig) -> Result<Self, ChannelError> {
        Self::with_rng(descriptor, config, OsRng)
    }
}

impl<S, R> Channel<S, R>
where
    R: RngCore + CryptoRng,
{
    /// Channel drawing all randomness from `rng`.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the configuration does not validate
    pub fn with_rng(
        descriptor: ChannelDescriptor,
        config: PairingConfig,
        mut rng: R,
    ) -> Result<Self, ChannelError> {
        config.validate()?;
        let agreement = KeyAgreement::initialize(config.key_agreement_params(), &mut rng)?;
        let (close_tx, closed) = watch::channel(false);

        Ok(Self {
            descriptor,
            config,
            rng,
            agreement,
            state: HandshakeState::Init,
            session: None,
            sas: None,
            peer: None,
            close_tx: Arc::new(close_tx),
            closed,
        })
    }

    /// Current state.
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Pairing mode and peer address.
    pub fn descriptor(&self) -> &ChannelDescriptor {
        &self.descriptor
    }

    /// Configuration in use.
    pub fn config(&self) -> &PairingConfig {
        &self.config
    }

    /// Peer address, once a TCP peer is connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.peer
    }

    /// Handle that closes this channel from elsewhere.
    pub fn close_handle(&self) -> CloseHandle {
        CloseHandle { tx: Arc::clone(&self.close_tx) }
    }

    /// Generate a fresh pre-shared secret and return the identifier the peer
    /// needs: `host:port:base64Secret`.
    ///
    /// # Errors
    ///
    /// - `IllegalState` on WLAN channels or once pairing has succeeded
    pub fn create_shared_secret(&mut self) -> Result<String, ChannelError> {
        self.require_manual("shared secrets")?;
        self.require_unpaired()?;

        let mut secret = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
        self.rng.fill_bytes(secret.as_mut_slice());
        self.descriptor.set_secret(secret);

        Ok(self.descriptor.to_identifier())
    }

    /// Use a base64 pre-shared secret received out of band.
    ///
    /// # Errors
    ///
    /// - `IllegalState` on WLAN channels or once pairing has succeeded
    /// - `InvalidArgument` if the secret is not 32 bytes of base64
    pub fn set_shared_secret(&mut self, encoded: &str) -> Result<(), ChannelError> {
        self.require_manual("shared secrets")?;
        self.require_unpaired()?;
        self.descriptor.set_encoded_secret(encoded)
    }

    /// Raw SAS bytes to compare out of band.
    ///
    /// # Errors
    ///
    /// - `IllegalState` on MANUAL channels or before WLAN pairing completes
    pub fn oob(&self) -> Result<&[u8], ChannelError> {
        self.sas().map(ShortAuthString::as_bytes)
    }

    /// SAS for display (`3A-F1-07`).
    ///
    /// # Errors
    ///
    /// - `IllegalState` on MANUAL channels or before WLAN pairing completes
    pub fn sas(&self) -> Result<&ShortAuthString, ChannelError> {
        self.require_wlan("SAS")?;
        self.sas
            .as_ref()
            .ok_or_else(|| ChannelError::IllegalState("pairing has not produced a SAS".into()))
    }

    /// Record that the user confirmed the SAS matches on both devices.
    ///
    /// # Errors
    ///
    /// - `IllegalState` on MANUAL channels or outside `AwaitingVerification`
    pub fn verified_oob(&mut self) -> Result<(), ChannelError> {
        self.require_wlan("SAS verification")?;
        if self.state != HandshakeState::AwaitingVerification {
            return Err(ChannelError::IllegalState(format!(
                "cannot verify SAS in state {:?}",
                self.state
            )));
        }

        self.state = HandshakeState::Verified;
        tracing::info!("SAS confirmed, channel verified");
        Ok(())
    }

    fn require_manual(&self, what: &str) -> Result<(), ChannelError> {
        if self.descriptor.kind() != ChannelKind::Manual {
            return Err(ChannelError::IllegalState(format!(
                "{what} are only used by MANUAL channels"
            )));
        }
        Ok(())
    }

    fn require_wlan(&self, what: &str) -> Result<(), ChannelError> {
        if self.descriptor.kind() != ChannelKind::Wlan {
            return Err(ChannelError::IllegalState(format!(
                "{what} is only available on WLAN channels"
            )));
        }
        Ok(())
    }

    fn require_unpaired(&self) -> Result<(), ChannelError> {
        match self.state {
            HandshakeState::Init | HandshakeState::Aborted => Ok(()),
            HandshakeState::Closed => Err(ChannelError::Closed),
            state => Err(ChannelError::IllegalState(format!("channel already paired ({state:?})"))),
        }
    }

    fn is_close_signalled(&self) -> bool {
        *self.closed.borrow()
    }

    fn mark_closed(&mut self) {
        self.state = HandshakeState::Closed;
        self.session = None;
        self.sas = None;
        self.descriptor.clear_secret();
        if let Err(e) = self.agreement.regenerate(&mut self.rng) {
            tracing::error!("Failed to regenerate identity on close: {}", e);
        }
    }
}

impl<S, R> Channel<S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: RngCore + CryptoRng,
{
    /// Run the pairing handshake over `stream`.
    ///
    /// On success MANUAL channels are `Verified`; WLAN channels wait in
    /// `AwaitingVerification` for [`Channel::verified_oob`]. On failure the
    /// channel is `Aborted` and may pair again over a new stream.
    ///
    /// WLAN pairing runs the configured slow hash twice on this task; a close
    /// signalled meanwhile is reported as soon as the hash returns.
    ///
    /// # Errors
    ///
    /// - `IllegalState` if already paired, or a MANUAL channel has no secret
    /// - `Closed` if closed before or during the handshake
    /// - any handshake abort reason (`ProtocolViolation`, `Timeout`,
    ///   `CommitmentMismatch`, `Read`, `Write`)
    pub async fn pair(&mut self, mut stream: S) -> Result<(), ChannelError> {
        if self.is_close_signalled() {
            self.mark_closed();
            return Err(ChannelError::Closed);
        }
        self.require_unpaired()?;

        let kind = self.descriptor.kind();
        tracing::debug!("Pairing {} channel with {}", kind, self.descriptor.address());
        self.state = HandshakeState::Syncing;

        let closed = self.closed.clone();
        let preshared = self.descriptor.secret().map(|s| s.as_slice());
        let handshaker = Handshaker::new(
            &mut stream,
            &mut self.agreement,
            &mut self.rng,
            &self.config,
            kind,
            preshared,
        );

        let outcome = tokio::select! {
            outcome = handshaker.run() => outcome,
            () = until_closed(closed) => Err(ChannelError::Closed),
        };

        let (secure, sas) = match outcome {
            Ok(keyed) => keyed,
            Err(ChannelError::Closed) => {
                self.mark_closed();
                return Err(ChannelError::Closed);
            },
            Err(e) => {
                self.state = HandshakeState::Aborted;
                return Err(e);
            },
        };

        self.session = Some(Session {
            stream,
            secure,
            reassembler: Reassembler::new(self.config.frame_size, self.config.max_message_size)?,
            inbox: BytesMut::with_capacity(self.config.wire_frame_len()),
        });
        self.sas = sas;
        self.state = match kind {
            ChannelKind::Manual => HandshakeState::Verified,
            ChannelKind::Wlan => HandshakeState::AwaitingVerification,
        };

        tracing::info!("Paired {} channel, now {:?}", kind, self.state);
        Ok(())
    }

    /// Send one message.
    ///
    /// # Errors
    ///
    /// - `IllegalState` ("unverified channel") before `Verified`
    /// - `SizeMismatch` if the message exceeds `max_message_size`
    /// - `Write` if the transport fails, `Closed` if closed meanwhile
    pub async fn write(&mut self, data: &[u8]) -> Result<(), ChannelError> {
        self.require_verified()?;
        if data.len() > self.config.max_message_size {
            return Err(ChannelError::SizeMismatch(format!(
                "message of {} bytes exceeds limit of {}",
                data.len(),
                self.config.max_message_size
            )));
        }

        let closed = self.closed.clone();
        let Some(session) = self.session.as_mut() else {
            return Err(ChannelError::IllegalState("no active session".into()));
        };

        let frames = split(data, self.config.frame_size, &mut self.rng)?;
        let mut wire = BytesMut::with_capacity(frames.len() * self.config.wire_frame_len());
        for frame in &frames {
            let plaintext = Zeroizing::new(frame.encode().to_vec());
            wire.extend_from_slice(&session.secure.encrypt(&plaintext, &mut self.rng)?);
        }

        let stream = &mut session.stream;
        let result = tokio::select! {
            result = async {
                stream.write_all(&wire).await?;
                stream.flush().await?;
                Ok::<_, std::io::Error>(())
            } => result.map_err(|e| ChannelError::Write(e.to_string())),
            () = until_closed(closed) => Err(ChannelError::Closed),
        };

        match result {
            Ok(()) => {
                tracing::debug!("Sent {} bytes in {} frames", data.len(), frames.len());
                Ok(())
            },
            Err(ChannelError::Closed) => {
                self.mark_closed();
                Err(ChannelError::Closed)
            },
            Err(e) => Err(e),
        }
    }

    /// Receive one message.
    ///
    /// Blocking reads wait until a message completes, the stream ends or the
    /// channel is closed. Non-blocking reads pull whatever the stream has
    /// ready without waiting and fail with `NotAvailable` if no message is
    /// complete yet; partial frames are kept for the next call.
    ///
    /// # Errors
    ///
    /// - `IllegalState` before `Verified`
    /// - `NotAvailable` (non-blocking only)
    /// - `WrongTag` if a frame fails authentication; the rest of that message
    ///   is skipped
    /// - `SizeMismatch` for a bad frame header or an oversized message
    /// - `Read` if the transport fails or the peer closes, `Closed` if
    ///   closed meanwhile
    pub async fn read(&mut self, blocking: bool) -> Result<Bytes, ChannelError> {
        self.require_verified()?;

        let closed = self.closed.clone();
        let Some(session) = self.session.as_mut() else {
            return Err(ChannelError::IllegalState("no active session".into()));
        };
        let wire_len = self.config.wire_frame_len();

        loop {
            if let Some(message) = session.drain(wire_len)? {
                tracing::debug!("Received {} byte message", message.len());
                return Ok(message);
            }

            if !blocking {
                if !session.pull_ready(wire_len).await? {
                    return Err(ChannelError::NotAvailable);
                }
                continue;
            }

            session.inbox.reserve(wire_len);
            let stream = &mut session.stream;
            let inbox = &mut session.inbox;
            let result = tokio::select! {
                result = stream.read_buf(inbox) => check_eof(result),
                () = until_closed(closed.clone()) => Err(ChannelError::Closed),
            };

            if let Err(e) = result {
                if e == ChannelError::Closed {
                    self.mark_closed();
                }
                return Err(e);
            }
        }
    }

    /// Whether a complete encrypted frame or message is waiting, after
    /// pulling whatever bytes the stream has ready.
    pub async fn has_next(&mut self) -> bool {
        if self.state != HandshakeState::Verified {
            return false;
        }
        let wire_len = self.config.wire_frame_len();
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        while session.inbox.len() < wire_len {
            match session.pull_ready(wire_len).await {
                Ok(true) => {},
                Ok(false) => break,
                Err(e) => {
                    tracing::debug!("Read failed while polling: {}", e);
                    break;
                },
            }
        }
        session.inbox.len() >= wire_len
    }

    /// Close the channel, shutting down the stream and wiping key material.
    ///
    /// Idempotent. Pending operations on other tasks holding a
    /// [`CloseHandle`] observe the close as [`ChannelError::Closed`].
    pub async fn close(&mut self) {
        self.close_tx.send_replace(true);
        if let Some(mut session) = self.session.take() {
            if let Err(e) = session.stream.shutdown().await {
                tracing::debug!("Stream shutdown failed: {}", e);
            }
        }

        if self.state != HandshakeState::Closed {
            tracing::info!("Channel closed");
        }
        self.mark_closed();
    }

    fn require_verified(&mut self) -> Result<(), ChannelError> {
        if self.is_close_signalled() {
            self.mark_closed();
            return Err(ChannelError::Closed);
        }
        match self.state {
            HandshakeState::Verified => Ok(()),
            HandshakeState::Closed => Err(ChannelError::Closed),
            _ => Err(ChannelError::IllegalState("unverified channel".into())),
        }
    }
}

impl<R> Channel<TcpStream, R>
where
    R: RngCore + CryptoRng,
{
    /// Bind `port` on all interfaces, accept one peer and pair.
    ///
    /// Returns the peer's address.
    ///
    /// # Errors
    ///
    /// - `Transport` if binding or accepting fails
    /// - any [`Channel::pair`] error
    pub async fn listen(&mut self, port: u16) -> Result<SocketAddr, ChannelError> {
        let listener = transport::bind(port).await?;
        self.accept(&listener).await
    }

    /// Accept one peer from an existing listener and pair.
    ///
    /// # Errors
    ///
    /// - `Transport` if accepting fails
    /// - any [`Channel::pair`] error
    pub async fn accept(&mut self, listener: &TcpListener) -> Result<SocketAddr, ChannelError> {
        let closed = self.closed.clone();
        let (stream, peer) = tokio::select! {
            accepted = transport::accept(listener) => accepted?,
            () = until_closed(closed) => {
                self.mark_closed();
                return Err(ChannelError::Closed);
            },
        };

        self.peer = Some(peer);
        self.pair(stream).await?;
        Ok(peer)
    }

    /// Connect to the descriptor's `host:port` and pair.
    ///
    /// # Errors
    ///
    /// - `Transport` if the connection fails
    /// - any [`Channel::pair`] error
    pub async fn connect(&mut self) -> Result<(), ChannelError> {
        let stream = transport::connect(&self.descriptor.address()).await?;
        self.peer = stream.peer_addr().ok();
        self.pair(stream).await
    }
}

impl<S> Session<S>
where
    S: AsyncRead + Unpin,
{
    /// Pull bytes the stream has ready without waiting.
    ///
    /// Returns `false` once the stream has nothing ready.
    async fn pull_ready(&mut self, wire_len: usize) -> Result<bool, ChannelError> {
        self.inbox.reserve(wire_len);
        match timeout(Duration::ZERO, self.stream.read_buf(&mut self.inbox)).await {
            Ok(result) => check_eof(result).map(|()| true),
            Err(_) => Ok(false),
        }
    }
}

impl<S> Session<S> {
    /// Decrypt buffered frames until a message completes or fewer than
    /// `wire_len` bytes remain.
    fn drain(&mut self, wire_len: usize) -> Result<Option<Bytes>, ChannelError> {
        while self.inbox.len() >= wire_len {
            let ciphertext = self.inbox.split_to(wire_len);
            let plaintext = match self.secure.decrypt(&ciphertext) {
                Ok(Some(plaintext)) => Zeroizing::new(plaintext),
                Ok(None) => {
                    tracing::warn!("Dropping message with bad authentication tag");
                    self.reassembler.discard_message();
                    return Err(ChannelError::WrongTag);
                },
                Err(e) => return Err(ChannelError::InvalidCiphertext(e.to_string())),
            };

            if let Some(message) = self.reassembler.push_encoded(&plaintext)? {
                return Ok(Some(message));
            }
        }
        Ok(None)
    }
}

impl<S, R> std::fmt::Debug for Channel<S, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Channel")
            .field("descriptor", &self.descriptor)
            .field("state", &self.state)
            .field("peer", &self.peer)
            .finish_non_exhaustive()
    }
}

/// Zero bytes from `read_buf` means the peer closed its end.
fn check_eof(result: std::io::Result<usize>) -> Result<(), ChannelError> {
    match result {
        Ok(0) => Err(ChannelError::Read("peer closed the stream".into())),
        Ok(_) => Ok(()),
        Err(e) => Err(ChannelError::Read(e.to_string())),
    }
}

/// Resolves once close is signalled; never resolves if the sender is gone.
async fn until_closed(mut closed: watch::Receiver<bool>) {
    if closed.wait_for(|closed| *closed).await.is_err() {
        std::future::pending::<()>().await;
    }
}
