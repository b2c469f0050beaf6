//! Channel descriptors: what kind of pairing to run and where the peer is.
//!
//! Identifiers are `host:port` for WLAN channels and `host:port:secret` for
//! MANUAL channels, where `secret` is the standard base64 encoding of 32
//! bytes. IPv6 hosts go in brackets (`[::1]:7000`).

use std::fmt;

use base64::{Engine, engine::general_purpose::STANDARD};
use tether_crypto::SHARED_SECRET_SIZE;
use zeroize::Zeroizing;

use crate::error::ChannelError;

/// Pairing mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    /// Commitment-based key agreement, confirmed by comparing the SAS
    Wlan,
    /// Pre-shared secret transferred out of band, no SAS
    Manual,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Wlan => f.write_str("WLAN"),
            Self::Manual => f.write_str("MANUAL"),
        }
    }
}

/// Parsed channel identifier.
#[derive(Clone, PartialEq, Eq)]
pub struct ChannelDescriptor {
    kind: ChannelKind,
    host: String,
    port: u16,
    secret: Option<Zeroizing<[u8; SHARED_SECRET_SIZE]>>,
}

impl ChannelDescriptor {
    /// Descriptor for `host:port` with no secret.
    pub fn new(kind: ChannelKind, host: impl Into<String>, port: u16) -> Self {
        Self { kind, host: host.into(), port, secret: None }
    }

    /// Parse an identifier.
    ///
    /// The port and the optional secret are split off from the right, so an
    /// unbracketed IPv6 host is never mistaken for a port.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if the host or port is missing or malformed, a WLAN
    ///   identifier carries a secret, or the secret is not 32 bytes of base64
    pub fn parse(kind: ChannelKind, identifier: &str) -> Result<Self, ChannelError> {
        let invalid =
            || ChannelError::InvalidArgument(format!("malformed identifier '{identifier}'"));

        let (rest, last) = identifier.rsplit_once(':').ok_or_else(invalid)?;

        let (host, port, secret) = match last.parse::<u16>() {
            Ok(port) => (rest, port, None),
            Err(_) if kind == ChannelKind::Manual => {
                let (host, port) = rest.rsplit_once(':').ok_or_else(invalid)?;
                let port = port.parse::<u16>().map_err(|_| invalid())?;
                (host, port, Some(decode_secret(last)?))
            },
            Err(_) => return Err(invalid()),
        };

        let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
        if host.is_empty() {
            return Err(invalid());
        }

        Ok(Self { kind, host: host.to_string(), port, secret })
    }

    /// Pairing mode.
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    /// Peer (or advertised) host.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Peer (or advertised) port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Replace the port, e.g. once an ephemeral listener is bound.
    pub fn set_port(&mut self, port: u16) {
        self.port = port;
    }

    /// Pre-shared secret, if any.
    pub fn secret(&self) -> Option<&[u8; SHARED_SECRET_SIZE]> {
        self.secret.as_deref()
    }

    /// Store a pre-shared secret.
    pub fn set_secret(&mut self, secret: Zeroizing<[u8; SHARED_SECRET_SIZE]>) {
        self.secret = Some(secret);
    }

    /// Drop the pre-shared secret, zeroizing it.
    pub fn clear_secret(&mut self) {
        self.secret = None;
    }

    /// Store a base64-encoded pre-shared secret.
    ///
    /// # Errors
    ///
    /// - `InvalidArgument` if `encoded` is not 32 bytes of standard base64
    pub fn set_encoded_secret(&mut self, encoded: &str) -> Result<(), ChannelError> {
        self.secret = Some(decode_secret(encoded)?);
        Ok(())
    }

    /// `host:port`, bracketing IPv6 hosts.
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    /// Identifier to hand to the peer: `host:port`, plus `:secret` when one
    /// is set.
    pub fn to_identifier(&self) -> String {
        match &self.secret {
            Some(secret) => format!("{}:{}", self.address(), STANDARD.encode(secret.as_slice())),
            None => self.address(),
        }
    }
}

impl fmt::Debug for ChannelDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelDescriptor")
            .field("kind", &self.kind)
            .field("address", &self.address())
            .field("has_secret", &self.secret.is_some())
            .finish()
    }
}

fn decode_secret(encoded: &str) -> Result<Zeroizing<[u8; SHARED_SECRET_SIZE]>, ChannelError> {
    let bytes = STANDARD
        .decode(encoded)
        .map(Zeroizing::new)
        .map_err(|e| ChannelError::InvalidArgument(format!("shared secret is not base64: {e}")))?;
    if bytes.len() != SHARED_SECRET_SIZE {
        return Err(ChannelError::InvalidArgument(format!(
            "shared secret must be {SHARED_SECRET_SIZE} bytes, got {}",
            bytes.len()
        )));
    }

    let mut secret = Zeroizing::new([0u8; SHARED_SECRET_SIZE]);
    secret.copy_from_slice(&bytes);
    Ok(secret)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "AAECAwQFBgcICQoLDA0ODxAREhMUFRYXGBkaGxwdHh8=";

    #[test]
    fn parses_wlan_address() {
        let descriptor = ChannelDescriptor::parse(ChannelKind::Wlan, "192.168.1.20:7000").unwrap();
        assert_eq!(descriptor.host(), "192.168.1.20");
        assert_eq!(descriptor.port(), 7000);
        assert!(descriptor.secret().is_none());
    }

    #[test]
    fn parses_manual_identifier_with_secret() {
        let identifier = format!("10.0.0.1:9000:{SECRET}");
        let descriptor = ChannelDescriptor::parse(ChannelKind::Manual, &identifier).unwrap();

        assert_eq!(descriptor.port(), 9000);
        let expected: Vec<u8> = (0u8..32).collect();
        assert_eq!(descriptor.secret().unwrap().as_slice(), expected.as_slice());
        assert_eq!(descriptor.to_identifier(), identifier);
    }

    #[test]
    fn manual_secret_is_optional() {
        let descriptor = ChannelDescriptor::parse(ChannelKind::Manual, "localhost:9000").unwrap();
        assert!(descriptor.secret().is_none());
    }

    #[test]
    fn bracketed_ipv6() {
        let identifier = format!("[::1]:7000:{SECRET}");
        let descriptor = ChannelDescriptor::parse(ChannelKind::Manual, &identifier).unwrap();

        assert_eq!(descriptor.host(), "::1");
        assert_eq!(descriptor.address(), "[::1]:7000");
        assert_eq!(descriptor.to_identifier(), identifier);
    }

    #[test]
    fn wlan_rejects_secret() {
        let identifier = format!("10.0.0.1:9000:{SECRET}");
        assert!(matches!(
            ChannelDescriptor::parse(ChannelKind::Wlan, &identifier),
            Err(ChannelError::InvalidArgument(_))
        ));
    }

    #[test]
    fn malformed_identifiers_rejected() {
        for identifier in ["", "host", ":7000", "host:notaport", "host:70000", "host:7000:short"] {
            assert!(
                ChannelDescriptor::parse(ChannelKind::Manual, identifier).is_err(),
                "{identifier} should fail"
            );
        }
    }

    #[test]
    fn debug_hides_secret() {
        let identifier = format!("10.0.0.1:9000:{SECRET}");
        let descriptor = ChannelDescriptor::parse(ChannelKind::Manual, &identifier).unwrap();
        let debug = format!("{descriptor:?}");

        assert!(!debug.contains(SECRET));
        assert!(debug.contains("has_secret: true"));
    }

    #[test]
    fn clear_secret_forgets_it() {
        let identifier = format!("10.0.0.1:9000:{SECRET}");
        let mut descriptor = ChannelDescriptor::parse(ChannelKind::Manual, &identifier).unwrap();

        descriptor.clear_secret();
        assert!(descriptor.secret().is_none());
        assert_eq!(descriptor.to_identifier(), "10.0.0.1:9000");
    }
}
