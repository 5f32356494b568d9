//! Shared harness for fcnet integration tests.
//!
//! [`Angel`] plays the supervisor: it owns the far ends of the two pipes a
//! core is started with, writes the initial config and talks to the admin
//! server.

use fcnet_core::benc::{self, Dict};
use fcnet_core::channel::Channel;
use fcnet_core::handshake::ACK_LEN;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream, duplex};

/// Private key whose address is `fcfa:238e:a096:f776:ef0f:a56e:1d12:e024`.
pub const VALID_KEY: &str = "5011000000000000000000000000000000000000000000000000000000000000";

/// Address derived from [`VALID_KEY`].
pub const VALID_ADDRESS: &str = "fcfa:238e:a096:f776:ef0f:a56e:1d12:e024";

/// Private key whose address falls outside `fc00::/8`.
pub const INVALID_KEY: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Admin password used by [`initial_config`].
pub const PASSWORD: &str = "correct horse battery staple";

/// Core-side channel type used in tests.
pub type CoreChannel = Channel<DuplexStream, DuplexStream>;

const PIPE_CAPACITY: usize = 256 * 1024;

/// The supervisor's ends of the pipes.
pub struct Angel {
    to_core: DuplexStream,
    from_core: Channel<DuplexStream, DuplexStream>,
}

/// Create a connected core channel and supervisor.
pub fn pipes() -> (CoreChannel, Angel) {
    let (core_in, to_core) = duplex(PIPE_CAPACITY);
    let (core_out, angel_in) = duplex(PIPE_CAPACITY);
    let (_, unused) = duplex(1);
    (
        Channel::new(core_in, core_out),
        Angel {
            to_core,
            from_core: Channel::new(angel_in, unused),
        },
    )
}

/// A minimal valid initial config.
pub fn initial_config(private_key: &str) -> Dict {
    Dict::new()
        .with("privateKey", private_key)
        .with("admin", Dict::new().with("pass", PASSWORD))
}

impl Angel {
    /// Write raw bytes to the core.
    pub async fn send_raw(&mut self, bytes: &[u8]) {
        self.to_core.write_all(bytes).await.expect("core pipe open");
    }

    /// Write a document to the core.
    pub async fn send(&mut self, document: &Dict) {
        self.send_raw(&document.to_bytes()).await;
    }

    /// Close the pipe into the core.
    pub async fn close_input(&mut self) {
        self.to_core.shutdown().await.expect("shutdown core pipe");
    }

    /// Read the handshake acknowledgement and return its sync magic.
    pub async fn read_ack(&mut self) -> String {
        let read = self
            .from_core
            .read_bounded(ACK_LEN, benc::frame)
            .await
            .expect("ack arrives");
        assert_eq!(read.bytes.len(), ACK_LEN);
        let ack = benc::decode_dict(&read.bytes).expect("ack is a dictionary");
        ack.get_dict(b"angel")
            .and_then(|angel| angel.get_str(b"syncMagic"))
            .expect("ack carries syncMagic")
            .to_string()
    }

    /// Read the next document from the core.
    pub async fn recv(&mut self) -> Dict {
        let read = self
            .from_core
            .read_bounded(PIPE_CAPACITY, benc::frame)
            .await
            .expect("core output open");
        benc::decode_dict(&read.bytes).expect("core writes dictionaries")
    }

    /// Send an unauthenticated request and wait for its response.
    pub async fn call(&mut self, q: &str, txid: &str) -> Dict {
        self.send(&Dict::new().with("q", q).with("txid", txid)).await;
        self.recv().await
    }

    /// Send an authenticated request and wait for its response.
    pub async fn auth_call(&mut self, command: &str, txid: &str, args: Dict) -> Dict {
        self.send(&auth_request(command, txid, args)).await;
        self.recv().await
    }

    /// Everything the core writes until it closes its end.
    pub async fn drain(self) -> Vec<u8> {
        let (mut reader, _) = self.from_core.into_parts();
        let mut out = Vec::new();
        reader.read_to_end(&mut out).await.expect("read to end");
        out
    }
}

/// An authenticated request using a fresh cookie.
pub fn auth_request(command: &str, txid: &str, args: Dict) -> Dict {
    let cookie = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
        .to_string();
    let hash = fcnet_crypto::digest::credential_hash_hex(PASSWORD.as_bytes(), cookie.as_bytes());
    Dict::new()
        .with("q", "auth")
        .with("aq", command)
        .with("cookie", cookie)
        .with("hash", hash)
        .with("txid", txid)
        .with("args", args)
}
