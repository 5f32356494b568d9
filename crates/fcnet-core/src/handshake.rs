//! Supervisor handshake.
//!
//! The first thing the core does is read its configuration from the
//! supervisor and answer with the sync token:
//!
//! ```text
//! Angel                                   Core
//!   |  d10:privateKey64:...5:admind4:pass...ee  |
//!   | --------------------------------------> |   AwaitingConfig
//!   |                                         |
//!   |  d5:angeld9:syncMagic16:<hex>ee         |
//!   | <-------------------------------------- |   Acknowledged
//! ```
//!
//! Every failure is fatal and nothing is written back in that case. The
//! acknowledgement is produced from a fixed byte template rather than the
//! general encoder; the result is byte-identical to encoding
//! `{"angel": {"syncMagic": <hex>}}`.

use crate::benc::{self, DecodeError, Dict};
use crate::channel::{Channel, ChannelError};
use crate::log::Log;
use fcnet_crypto::CryptoError;
use fcnet_crypto::random::random_8;
use fcnet_crypto::x25519::PrivateKey;
use std::fmt;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use zeroize::Zeroizing;

/// Largest initial configuration accepted from the supervisor.
pub const INITIAL_CONF_BUFF_SIZE: usize = 8192;

/// Acknowledgement template; the token hex goes at [`SYNC_MAGIC_OFFSET`].
const ACK_TEMPLATE: &[u8; ACK_LEN] = b"d5:angeld9:syncMagic16:0000000000000000ee";

/// Length of the acknowledgement document.
pub const ACK_LEN: usize = 41;

/// Byte offset of the token hex inside the acknowledgement.
pub const SYNC_MAGIC_OFFSET: usize = 23;

/// Default prefix length for the tunnel address.
pub const DEFAULT_ADDRESS_PREFIX: u8 = 8;

/// Handshake errors
#[derive(Debug, Error)]
pub enum HandshakeError {
    /// Configuration filled the whole read buffer
    #[error("initial config exceeds {limit} bytes")]
    ConfigTooLarge {
        /// The bound that was hit
        limit: usize,
    },

    /// Configuration is not a valid bencoded dictionary
    #[error("failed to parse initial configuration: {0}")]
    ConfigParse(#[from] DecodeError),

    /// `privateKey` or `admin.pass` is absent
    #[error("expected 'pass' and 'privateKey' in configuration")]
    MissingCredentials,

    /// `privateKey` is not 64 hex characters
    #[error("privateKey must be 64 bytes of hex: {0}")]
    InvalidPrivateKeyEncoding(CryptoError),

    /// A pass-through field has the wrong type or range
    #[error("invalid configuration field '{0}'")]
    InvalidField(&'static str),

    /// Sync token could not be generated
    #[error("failed to generate sync token: {0}")]
    Random(CryptoError),

    /// Channel failure
    #[error(transparent)]
    Channel(#[from] ChannelError),

    /// The handshake already completed
    #[error("handshake already acknowledged")]
    AlreadyAcknowledged,
}

/// Random per-process token echoed to the supervisor.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SyncToken([u8; 8]);

impl SyncToken {
    /// Draw a fresh token from the OS CSPRNG.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::Random`] if the CSPRNG fails.
    pub fn generate() -> Result<Self, HandshakeError> {
        random_8().map(Self).map_err(HandshakeError::Random)
    }

    /// Wrap known bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 8]) -> Self {
        Self(bytes)
    }

    /// Raw token bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 8] {
        &self.0
    }

    /// 16 lowercase hex characters.
    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Debug for SyncToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncToken({})", self.to_hex())
    }
}

/// Secrets extracted from the configuration.
pub struct Credentials {
    /// Node private key
    pub private_key: PrivateKey,
    /// Admin password
    pub admin_password: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials").finish_non_exhaustive()
    }
}

/// Tunnel settings passed through to the transport glue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TunnelRequest {
    /// Requested device name, or `None` to let the OS pick
    pub device: Option<String>,
    /// Prefix length for the node address
    pub address_prefix: u8,
}

/// Everything the core needs from the initial configuration.
pub struct InitialConfig {
    /// Key and password
    pub credentials: Credentials,
    /// Tunnel request, if the supervisor asked for a device
    pub tunnel: Option<TunnelRequest>,
    /// The full document, for collaborators that read other fields
    pub document: Dict,
}

impl fmt::Debug for InitialConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InitialConfig")
            .field("tunnel", &self.tunnel)
            .field("fields", &self.document.len())
            .finish_non_exhaustive()
    }
}

impl InitialConfig {
    /// Extract the fields the core needs from a decoded document.
    ///
    /// # Errors
    ///
    /// Returns [`HandshakeError::MissingCredentials`] or
    /// [`HandshakeError::InvalidPrivateKeyEncoding`] for bad credentials and
    /// [`HandshakeError::InvalidField`] for bad pass-through fields.
    pub fn from_document(document: Dict) -> Result<Self, HandshakeError> {
        let private_key_hex = document.get_bytes(b"privateKey");
        let password = document
            .get_dict(b"admin")
            .and_then(|admin| admin.get_bytes(b"pass"))
            .filter(|pass| !pass.is_empty());

        let (Some(private_key_hex), Some(password)) = (private_key_hex, password) else {
            return Err(HandshakeError::MissingCredentials);
        };

        let private_key = PrivateKey::from_hex(private_key_hex)
            .map_err(HandshakeError::InvalidPrivateKeyEncoding)?;
        let admin_password = Zeroizing::new(password.to_vec());

        let tunnel = match document.get(b"tunDevice") {
            None => None,
            Some(value) => {
                let name = value.as_str().ok_or(HandshakeError::InvalidField("tunDevice"))?;
                let address_prefix = match document.get(b"addressPrefix") {
                    None => DEFAULT_ADDRESS_PREFIX,
                    Some(prefix) => prefix
                        .as_int()
                        .and_then(|p| u8::try_from(p).ok())
                        .filter(|p| *p <= 128)
                        .ok_or(HandshakeError::InvalidField("addressPrefix"))?,
                };
                Some(TunnelRequest {
                    device: (!name.is_empty()).then(|| name.to_string()),
                    address_prefix,
                })
            }
        };

        Ok(Self {
            credentials: Credentials {
                private_key,
                admin_password,
            },
            tunnel,
            document,
        })
    }

    /// Decode and extract in one step.
    ///
    /// # Errors
    ///
    /// As [`InitialConfig::from_document`], plus [`HandshakeError::ConfigParse`].
    pub fn parse(bytes: &[u8]) -> Result<Self, HandshakeError> {
        Self::from_document(benc::decode_dict(bytes)?)
    }
}

/// Build the acknowledgement for a token.
#[must_use]
pub fn acknowledgement(token: &SyncToken) -> [u8; ACK_LEN] {
    let mut ack = *ACK_TEMPLATE;
    let hex = token.to_hex();
    ack[SYNC_MAGIC_OFFSET..SYNC_MAGIC_OFFSET + 16].copy_from_slice(hex.as_bytes());
    ack
}

/// Handshake progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Waiting for the configuration document
    AwaitingConfig,
    /// Configuration accepted and acknowledged
    Acknowledged,
}

/// The supervisor handshake state machine.
#[derive(Debug)]
pub struct Handshake {
    token: SyncToken,
    state: HandshakeState,
    max_config_size: usize,
}

impl Handshake {
    /// Start a handshake that will acknowledge with `token`.
    #[must_use]
    pub fn new(token: SyncToken) -> Self {
        Self {
            token,
            state: HandshakeState::AwaitingConfig,
            max_config_size: INITIAL_CONF_BUFF_SIZE,
        }
    }

    /// Override the configuration size bound.
    #[must_use]
    pub fn with_max_config_size(mut self, max: usize) -> Self {
        self.max_config_size = max;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// The token this handshake acknowledges with.
    #[must_use]
    pub fn token(&self) -> SyncToken {
        self.token
    }

    /// Read the configuration, validate it and acknowledge.
    ///
    /// # Errors
    ///
    /// Any [`HandshakeError`]; all of them are fatal to the process.
    pub async fn run<R, W>(
        &mut self,
        channel: &mut Channel<R, W>,
        log: &dyn Log,
    ) -> Result<InitialConfig, HandshakeError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        if self.state != HandshakeState::AwaitingConfig {
            return Err(HandshakeError::AlreadyAcknowledged);
        }

        let read = channel
            .read_bounded(self.max_config_size, benc::frame)
            .await?;
        if read.bound_reached {
            return Err(HandshakeError::ConfigTooLarge {
                limit: self.max_config_size,
            });
        }
        log.debug(&format!("received {} byte initial config", read.bytes.len()));

        let config = InitialConfig::parse(&read.bytes)?;

        channel.write_raw(&acknowledgement(&self.token)).await?;
        self.state = HandshakeState::Acknowledged;
        log.debug("sent sync acknowledgement");

        Ok(config)
    }
}
