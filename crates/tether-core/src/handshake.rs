//! Pairing handshake state machine.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐      ┌─────────┐  WLAN   ┌──────────────────────┐      ┌────────────────────────┐
//! │ Init │─────>│ Syncing │────────>│ ExchangingCommitment │─────>│ ExchangingDecommitment │
//! └──────┘      └─────────┘         └──────────────────────┘      └────────────────────────┘
//!                    │ MANUAL                  │                               │
//!                    │                         │ timeout / bad length          │ opened
//!                    ↓                         ↓                               ↓
//!               ┌───────┐               ┌─────────┐                       ┌───────┐
//!               │ Keyed │               │ Aborted │<──────────────────────│ Keyed │
//!               └───────┘               └─────────┘   mismatch / timeout  └───────┘
//! ```
//!
//! Each [`Handshake`] variant owns only what is valid in that state, and
//! [`Handshaker::step`] consumes one state to produce the next. Every abort
//! regenerates the local identity and verification nonce before it is
//! reported.

use std::{fmt, time::Duration};

use rand::{CryptoRng, RngCore};
use tether_crypto::{KeyAgreement, SecureChannel, ShortAuthString};
use tether_proto::{MAX_TOKEN_LEN, SyncToken};
use tokio::{
    io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt},
    time::{Instant, timeout, timeout_at},
};
use zeroize::Zeroizing;

use crate::{config::PairingConfig, descriptor::ChannelKind, error::ChannelError};

/// Observable handshake and session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandshakeState {
    /// Nothing sent yet
    Init,
    /// Exchanging Ready/ACK tokens
    Syncing,
    /// Commitments crossing the wire
    ExchangingCommitment,
    /// Decommitments crossing the wire
    ExchangingDecommitment,
    /// Shared secret derived
    Keyed,
    /// WLAN channel keyed, SAS not yet confirmed by the user
    AwaitingVerification,
    /// Reads and writes permitted
    Verified,
    /// Handshake failed; a new attempt starts from a fresh identity
    Aborted,
    /// Channel closed locally
    Closed,
}

/// Handshake in progress.
pub enum Handshake {
    /// Not started
    Init,
    /// Ready/ACK synchronization
    Syncing,
    /// Sending our commitment, reading the peer's
    ExchangingCommitment,
    /// Sending our decommitment, reading the peer's
    ExchangingDecommitment {
        /// Our decommitment bytes
        decommitment: Zeroizing<Vec<u8>>,
    },
    /// Finished: channel keys and, for WLAN, the SAS
    Keyed {
        /// Keyed double-AEAD channel
        secure: SecureChannel,
        /// Short authentication string (WLAN only)
        sas: Option<ShortAuthString>,
    },
    /// Failed
    Aborted {
        /// Why
        reason: ChannelError,
    },
}

impl Handshake {
    /// Fieldless view of this state.
    pub fn state(&self) -> HandshakeState {
        match self {
            Self::Init => HandshakeState::Init,
            Self::Syncing => HandshakeState::Syncing,
            Self::ExchangingCommitment => HandshakeState::ExchangingCommitment,
            Self::ExchangingDecommitment { .. } => HandshakeState::ExchangingDecommitment,
            Self::Keyed { .. } => HandshakeState::Keyed,
            Self::Aborted { .. } => HandshakeState::Aborted,
        }
    }

    /// Whether `step` has nothing left to do.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Keyed { .. } | Self::Aborted { .. })
    }
}

impl fmt::Debug for Handshake {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Aborted { reason } => write!(f, "Aborted({reason})"),
            other => write!(f, "{:?}", other.state()),
        }
    }
}

/// Drives a [`Handshake`] over one stream.
///
/// Borrows everything it needs from the owning channel for the duration of
/// one pairing attempt.
///
/// The commitment and decommitment steps each run the slow hash inline on
/// the calling task. While it runs the task cannot observe a close, so a
/// [`crate::CloseHandle::close`] takes effect once the hash returns. Budget
/// `slow_hash` in [`PairingConfig`] accordingly, and on a current-thread
/// runtime expect other tasks to stall for the same time.
pub struct Handshaker<'a, S, R> {
    stream: &'a mut S,
    agreement: &'a mut KeyAgreement,
    rng: &'a mut R,
    config: &'a PairingConfig,
    kind: ChannelKind,
    preshared: Option<&'a [u8]>,
}

impl<'a, S, R> Handshaker<'a, S, R>
where
    S: AsyncRead + AsyncWrite + Unpin,
    R: RngCore + CryptoRng,
{
    /// Handshaker for one attempt. `preshared` is required for MANUAL
    /// channels and ignored for WLAN.
    pub fn new(
        stream: &'a mut S,
        agreement: &'a mut KeyAgreement,
        rng: &'a mut R,
        config: &'a PairingConfig,
        kind: ChannelKind,
        preshared: Option<&'a [u8]>,
    ) -> Self {
        Self { stream, agreement, rng, config, kind, preshared }
    }

    /// Step from `Init` until keyed or aborted.
    ///
    /// # Errors
    ///
    /// The abort reason, already logged.
    pub async fn run(mut self) -> Result<(SecureChannel, Option<ShortAuthString>), ChannelError> {
        let mut handshake = Handshake::Init;
        loop {
            handshake = match handshake {
                Handshake::Keyed { secure, sas } => return Ok((secure, sas)),
                Handshake::Aborted { reason } => return Err(reason),
                pending => self.step(pending).await,
            };
        }
    }

    /// Advance one state. Terminal states are returned unchanged.
    pub async fn step(&mut self, handshake: Handshake) -> Handshake {
        if handshake.is_terminal() {
            return handshake;
        }

        let from = handshake.state();
        let next = match self.advance(handshake).await {
            Ok(next) => next,
            Err(reason) => self.abort(from, reason),
        };

        tracing::debug!(kind = %self.kind, "handshake {:?} -> {:?}", from, next.state());
        next
    }

    async fn advance(&mut self, handshake: Handshake) -> Result<Handshake, ChannelError> {
        match handshake {
            Handshake::Init => {
                if self.kind == ChannelKind::Manual && self.preshared.is_none() {
                    return Err(ChannelError::IllegalState(
                        "manual channel has no shared secret".into(),
                    ));
                }
                Ok(Handshake::Syncing)
            },

            Handshake::Syncing => {
                self.sync().await?;
                match (self.kind, self.preshared) {
                    (ChannelKind::Manual, Some(secret)) => {
                        self.agreement.set_preshared_secret(secret)?;
                        let (secure, _) = self.agreement.finish(&mut *self.rng)?;
                        Ok(Handshake::Keyed { secure, sas: None })
                    },
                    (ChannelKind::Manual, None) => Err(ChannelError::IllegalState(
                        "manual channel has no shared secret".into(),
                    )),
                    (ChannelKind::Wlan, _) => Ok(Handshake::ExchangingCommitment),
                }
            },

            Handshake::ExchangingCommitment => {
                let commitment = self.agreement.commit(&mut *self.rng)?;
                let peer = self
                    .exchange(&commitment.to_bytes(), self.agreement.commitment_len(), "commitment")
                    .await?;
                self.agreement.receive_commitment(&peer)?;

                let decommitment =
                    Zeroizing::new(self.agreement.decommitment()?.as_bytes().to_vec());
                Ok(Handshake::ExchangingDecommitment { decommitment })
            },

            Handshake::ExchangingDecommitment { decommitment } => {
                let peer = self
                    .exchange(&decommitment, self.agreement.decommitment_len(), "decommitment")
                    .await?;
                self.agreement.open_peer_commitment(&peer)?;

                let (secure, sas) = self.agreement.finish(&mut *self.rng)?;
                Ok(Handshake::Keyed { secure, sas })
            },

            terminal @ (Handshake::Keyed { .. } | Handshake::Aborted { .. }) => Ok(terminal),
        }
    }

    fn abort(&mut self, from: HandshakeState, reason: ChannelError) -> Handshake {
        if reason == ChannelError::CommitmentMismatch {
            tracing::warn!("Peer commitment did not open in {:?}; possible active attack", from);
        } else {
            tracing::warn!("Handshake aborted in {:?}: {}", from, reason);
        }

        if let Err(e) = self.agreement.regenerate(&mut *self.rng) {
            tracing::error!("Failed to regenerate identity: {}", e);
        }
        Handshake::Aborted { reason }
    }

    /// Ready/ACK exchange within `sync_timeout`.
    ///
    /// Reads one byte at a time and stops exactly after the last token it
    /// needs, so the peer's commitment stays in the stream.
    async fn sync(&mut self) -> Result<(), ChannelError> {
        let budget = self.config.sync_timeout;
        let deadline = Instant::now() + budget;

        self.send(SyncToken::Ready.as_bytes()).await?;

        let mut ack_sent = false;
        let mut ack_received = false;
        while !(ack_sent && ack_received) {
            let token = match timeout_at(deadline, self.next_token()).await {
                Ok(Ok(token)) => token,
                Ok(Err(e @ ChannelError::ProtocolViolation(_))) => {
                    self.send_fin().await;
                    return Err(e);
                },
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    self.send_fin().await;
                    return Err(ChannelError::Timeout { phase: "sync", elapsed: budget });
                },
            };

            match token {
                SyncToken::Ready if !ack_sent => {
                    self.send(SyncToken::Ack.as_bytes()).await?;
                    ack_sent = true;
                },
                SyncToken::Ack if !ack_received => ack_received = true,
                SyncToken::Fin => {
                    return Err(ChannelError::ProtocolViolation("peer aborted with FIN".into()));
                },
                duplicate => {
                    self.send_fin().await;
                    return Err(ChannelError::ProtocolViolation(format!(
                        "duplicate {duplicate} token"
                    )));
                },
            }
        }

        Ok(())
    }

    async fn next_token(&mut self) -> Result<SyncToken, ChannelError> {
        let mut buf = Vec::with_capacity(MAX_TOKEN_LEN);
        loop {
            let byte =
                self.stream.read_u8().await.map_err(|e| ChannelError::Read(e.to_string()))?;
            buf.push(byte);
            if let Some((token, _)) = SyncToken::decode(&buf)? {
                tracing::trace!("Received {} token", token);
                return Ok(token);
            }
        }
    }

    /// Write ours, then read exactly `len` bytes of theirs within
    /// `exchange_timeout`.
    async fn exchange(
        &mut self,
        outgoing: &[u8],
        len: usize,
        phase: &'static str,
    ) -> Result<Vec<u8>, ChannelError> {
        self.send(outgoing).await?;

        let budget: Duration = self.config.exchange_timeout;
        let mut incoming = vec![0u8; len];
        match timeout(budget, self.stream.read_exact(&mut incoming)).await {
            Ok(Ok(_)) => Ok(incoming),
            Ok(Err(e)) => Err(ChannelError::Read(format!("{phase}: {e}"))),
            Err(_) => Err(ChannelError::Timeout { phase, elapsed: budget }),
        }
    }

    async fn send(&mut self, bytes: &[u8]) -> Result<(), ChannelError> {
        self.stream.write_all(bytes).await.map_err(|e| ChannelError::Write(e.to_string()))?;
        self.stream.flush().await.map_err(|e| ChannelError::Write(e.to_string()))
    }

    async fn send_fin(&mut self) {
        if let Err(e) = self.send(SyncToken::Fin.as_bytes()).await {
            tracing::debug!("Could not send FIN: {}", e);
        }
    }
}
