//! Per-operation protocol state machine.
//!
//! Every operation gets its own connection: connect, exchange, drop. Polls
//! send a pre-captured discovery query and scan the reply stream for the
//! `command = 10` snapshot frame; writes run the same query first as a
//! warm-up handshake, because the device drops the connection when a
//! `command = 7` frame arrives cold. Retries always dial a fresh socket - a
//! command frame is never re-sent on a possibly broken one.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use bytes::{Buf, BytesMut};
use thiserror::Error;
use tracing::{debug, instrument, trace, warn};

use crate::DEFAULT_PORT;
use crate::crypto::{self, CryptoError};
use crate::dps::Snapshot;
use crate::protocol::{
    CMD_CONTROL, CMD_DP_QUERY, FrameError, FrameView, build_frame, try_parse_one_frame,
};
use crate::transport::{Connection, Connector, TcpConnector, TransportError};

/// Captured `command = 10` DP snapshot query, replayed verbatim. The device
/// accepts this exact request without any nonce construction.
const DISCOVERY_QUERY: [u8; 88] = [
    0x00, 0x00, 0x55, 0xAA, 0x00, 0x00, 0x05, 0x95, 0x00, 0x00, 0x00, 0x0A,
    0x00, 0x00, 0x00, 0x48, 0x46, 0x2E, 0xBB, 0x16, 0xE2, 0x66, 0x7B, 0x75,
    0xB5, 0xC3, 0xEE, 0xFE, 0xD6, 0x88, 0x6D, 0x56, 0x10, 0xFF, 0xFE, 0x31,
    0xBB, 0x2A, 0x49, 0x54, 0xDA, 0x93, 0x76, 0x33, 0xEB, 0x4D, 0xA2, 0x22,
    0x13, 0xE5, 0x88, 0x05, 0xE3, 0x1F, 0x87, 0xED, 0x15, 0x95, 0x06, 0x54,
    0x5B, 0x23, 0x66, 0xE9, 0x8B, 0x06, 0xC2, 0xF6, 0xF0, 0x19, 0x9F, 0x8A,
    0x2F, 0x35, 0x99, 0x6F, 0x58, 0x0C, 0xD2, 0xBB, 0xAB, 0x2E, 0xB6, 0x6F,
    0x00, 0x00, 0xAA, 0x55,
];

/// Payload prefix observed in working `command = 7` frames: the "3.3"
/// version marker plus header-like fields ahead of the ciphertext.
const CONTROL_PREFIX_TEMPLATE: [u8; 15] = [
    0x33, 0x2E, 0x33, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x03, 0x00, 0x00, 0x00, 0x00,
];

/// Offset of the big-endian request id inside the control prefix.
const REQUEST_ID_OFFSET: usize = 11;

/// Attempts per operation, each on an independent socket.
const ATTEMPTS: u32 = 2;

/// Deadline for a poll's snapshot response.
const POLL_DEADLINE: Duration = Duration::from_secs(3);

/// Deadline for the pre-write handshake response.
const HANDSHAKE_DEADLINE: Duration = Duration::from_secs(4);

/// Receive accumulation cap; overflow bytes are drained and discarded.
const RECV_BUFFER_LIMIT: usize = 4096;

/// Ciphertext slice search: highest candidate start offset (exclusive).
const SLICE_SEARCH_MAX_START: usize = 256;

/// Ciphertext slice search: candidate tail trims, most likely first.
const TAIL_TRIMS: [usize; 5] = [8, 12, 16, 0, 4];

/// Errors from the protocol client.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Caller misconfiguration; not retried.
    #[error("invalid configuration: {0}")]
    Config(&'static str),

    /// Transport failure; retried on a fresh connection.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Cipher failure.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Frame codec failure.
    #[error(transparent)]
    Frame(#[from] FrameError),

    /// No frame with the wanted command arrived before the deadline.
    #[error("no command-{command} frame before the deadline")]
    ResponseTimeout {
        /// Command code that was awaited.
        command: u32,
    },

    /// The device never answered the pre-write warm-up query.
    #[error("handshake timeout: device sent no snapshot response")]
    HandshakeTimeout,

    /// The snapshot frame decrypted to nothing that looks like DP JSON.
    #[error("snapshot response contained no decryptable payload")]
    SnapshotUndecodable,
}

/// Result type alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;

/// Connection parameters for one device session.
///
/// Set once and immutable for the lifetime of a [`Client`];
/// reconfiguration means building a new client.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Device IP or hostname.
    pub host: String,
    /// Device TCP port.
    pub port: u16,
    /// 16-character ASCII local key recovered from the companion app.
    pub local_key: String,
    /// Device id used in write payloads.
    pub device_id: String,
    /// Optional user id; some firmware expects it in write payloads.
    pub user_id: Option<String>,
}

impl SessionConfig {
    /// Create a config with the default port and no user id.
    #[must_use]
    pub fn new(
        host: impl Into<String>,
        local_key: impl Into<String>,
        device_id: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            local_key: local_key.into(),
            device_id: device_id.into(),
            user_id: None,
        }
    }

    /// Override the device port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Attach a user id to write payloads.
    #[must_use]
    pub fn with_user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            return Err(ClientError::Config("host must not be empty"));
        }
        if self.device_id.is_empty() {
            return Err(ClientError::Config("device id must not be empty"));
        }
        if self.local_key.len() != 16 || !self.local_key.is_ascii() {
            return Err(ClientError::Config(
                "local key must be 16 ASCII characters",
            ));
        }
        Ok(())
    }
}

/// Protocol client for one device.
///
/// Single-threaded and synchronous: every call blocks up to its own
/// deadline and owns its socket exclusively. Run one client per device;
/// concurrent calls into one instance must be serialized by the caller.
#[derive(Debug)]
pub struct Client<C: Connector = TcpConnector> {
    config: SessionConfig,
    connector: C,
    sequence: u32,
    request_id: u32,
}

impl Client<TcpConnector> {
    /// Create a client dialing the configured host over TCP.
    pub fn new(config: SessionConfig) -> Result<Self> {
        let connector = TcpConnector::new(config.host.clone(), config.port);
        Self::with_connector(config, connector)
    }
}

impl<C: Connector> Client<C> {
    /// Create a client over a caller-supplied connector.
    pub fn with_connector(config: SessionConfig, connector: C) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            connector,
            sequence: 1,
            request_id: 1,
        })
    }

    /// Session configuration this client was built with.
    #[must_use]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Poll the device for a fresh DP snapshot.
    #[instrument(level = "debug", skip(self), fields(host = %self.config.host))]
    pub fn poll_snapshot(&mut self) -> Result<Snapshot> {
        self.retry(Self::poll_once)
    }

    /// Switch the heater on or off.
    ///
    /// The fixed mode DP rides along with the switch; some firmware
    /// revisions ignore the write without it.
    #[instrument(level = "debug", skip(self))]
    pub fn set_heater(&mut self, on: bool) -> Result<()> {
        let dps = format!("\"1\":{on},\"4\":\"ONLY_TRAD\"");
        self.send_control(&dps)
    }

    /// Write a new target setpoint.
    #[instrument(level = "debug", skip(self))]
    pub fn set_setpoint(&mut self, setpoint: u16) -> Result<()> {
        let dps = format!("\"2\":{setpoint}");
        self.send_control(&dps)
    }

    fn retry<T>(&mut self, mut op: impl FnMut(&mut Self) -> Result<T>) -> Result<T> {
        let mut last_err = None;
        for attempt in 1..=ATTEMPTS {
            match op(self) {
                Ok(value) => return Ok(value),
                Err(err @ ClientError::Config(_)) => return Err(err),
                Err(err) => {
                    warn!(attempt, error = %err, "attempt failed");
                    last_err = Some(err);
                }
            }
        }
        Err(last_err.unwrap_or(ClientError::ResponseTimeout {
            command: CMD_DP_QUERY,
        }))
    }

    fn poll_once(&mut self) -> Result<Snapshot> {
        let mut conn = self.connector.connect()?;
        conn.send(&DISCOVERY_QUERY)?;
        let frame = wait_for_command(&mut conn, CMD_DP_QUERY, POLL_DEADLINE)?;
        let view = FrameView::new(&frame)?;
        let json = search_snapshot_json(&self.config.local_key, view.body())
            .ok_or(ClientError::SnapshotUndecodable)?;
        debug!(len = json.len(), "decrypted DP snapshot");
        Ok(Snapshot::from_json(&json))
    }

    fn send_control(&mut self, dps_body: &str) -> Result<()> {
        let json = self.control_json(dps_body);
        let ciphertext = crypto::ecb_encrypt(self.config.local_key.as_bytes(), json.as_bytes())?;

        let mut prefix = CONTROL_PREFIX_TEMPLATE;
        let request_id = self.next_request_id();
        prefix[REQUEST_ID_OFFSET..REQUEST_ID_OFFSET + 4]
            .copy_from_slice(&request_id.to_be_bytes());

        self.retry(move |client| {
            let sequence = client.next_sequence();
            let frame = build_frame(sequence, CMD_CONTROL, &ciphertext, &prefix);
            client.write_once(&frame)
        })
    }

    /// One handshake + write exchange on a fresh connection. The handshake
    /// read completes (or times out) strictly before the command frame
    /// goes out; sending early makes the device close the connection.
    fn write_once(&mut self, frame: &[u8]) -> Result<()> {
        let mut conn = self.connector.connect()?;
        conn.send(&DISCOVERY_QUERY)?;
        match wait_for_command(&mut conn, CMD_DP_QUERY, HANDSHAKE_DEADLINE) {
            Ok(_) => {}
            Err(ClientError::ResponseTimeout { .. }) => return Err(ClientError::HandshakeTimeout),
            Err(err) => return Err(err),
        }
        conn.send(frame)?;
        debug!(len = frame.len(), "control frame sent");

        // Best-effort drain; some firmware responds, some doesn't.
        let mut scratch = [0u8; 1024];
        let _ = conn.receive(&mut scratch);
        Ok(())
    }

    fn control_json(&self, dps_body: &str) -> String {
        let t = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        let mut json = format!(
            "{{\"devId\":\"{}\",\"dps\":{{{}}},\"t\":{}",
            self.config.device_id, dps_body, t
        );
        if let Some(uid) = &self.config.user_id {
            json.push_str(&format!(",\"uid\":\"{uid}\""));
        }
        json.push('}');
        json
    }

    fn next_sequence(&mut self) -> u32 {
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);
        sequence
    }

    fn next_request_id(&mut self) -> u32 {
        let request_id = self.request_id;
        self.request_id = self.request_id.wrapping_add(1);
        request_id
    }
}

/// Receive until a frame with `command` parses, or the deadline passes.
///
/// Other frames (notably `command = 9` keepalives) are consumed and
/// skipped; the buffer is compacted past each consumed frame rather than
/// discarded, since frames arrive back-to-back over short reads.
fn wait_for_command<T: Connection>(
    conn: &mut T,
    command: u32,
    deadline: Duration,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + deadline;
    let mut buf = BytesMut::with_capacity(RECV_BUFFER_LIMIT);
    let mut chunk = [0u8; 1024];

    while Instant::now() < deadline {
        let received = conn.receive(&mut chunk)?;
        if received > 0 {
            let take = received.min(RECV_BUFFER_LIMIT - buf.len());
            buf.extend_from_slice(&chunk[..take]);
            trace!(bytes = received, buffered = buf.len(), "received");
        }

        while let Some(slice) = try_parse_one_frame(&buf) {
            let frame = buf[slice.start..slice.end()].to_vec();
            buf.advance(slice.end());

            let view = FrameView::new(&frame)?;
            if view.command() == command {
                return Ok(frame);
            }
            trace!(command = view.command(), "skipping frame");
        }
    }
    Err(ClientError::ResponseTimeout { command })
}

/// Brute-force search for the ciphertext slice inside a snapshot frame body.
///
/// The exact slice boundaries within a `command = 10` response are not
/// reliably known, so candidate `(start, tail-trim)` windows whose length
/// is a positive multiple of 16 are decrypted until one yields text that
/// looks like a DP snapshot. Bounded and pure; captures put the real slice
/// at `[4 .. len - 8]`, which the trim order finds first.
#[must_use]
pub fn search_snapshot_json(local_key: &str, body: &[u8]) -> Option<String> {
    let key = local_key.as_bytes();
    for start in 0..body.len().min(SLICE_SEARCH_MAX_START) {
        for trim in TAIL_TRIMS {
            let Some(end) = body.len().checked_sub(trim) else {
                continue;
            };
            if end <= start || (end - start) % 16 != 0 {
                continue;
            }
            let Ok(plain) = crypto::ecb_decrypt(key, &body[start..end]) else {
                continue;
            };
            let Ok(text) = String::from_utf8(plain) else {
                continue;
            };
            let text = text.trim_matches(|c: char| c == '\0' || c.is_whitespace());
            if text.to_ascii_lowercase().contains("\"dps\"") && text.contains('{') {
                return Some(text.to_string());
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::TRAILER_SIZE;

    const KEY: &str = "fdjhl1jhlkjh4ljk";

    fn snapshot_body(json: &str) -> Vec<u8> {
        // Shape of a real command-10 response body: 4 bytes of return code
        // ahead of the ciphertext, then CRC + tail.
        let ciphertext = crypto::ecb_encrypt(KEY.as_bytes(), json.as_bytes()).unwrap();
        let mut body = vec![0u8; 4];
        body.extend_from_slice(&ciphertext);
        body.extend_from_slice(&[0u8; TRAILER_SIZE]);
        body
    }

    #[test]
    fn slice_search_finds_offset_ciphertext() {
        let json = r#"{"devId":"d","dps":{"1":false,"2":75},"t":1}"#;
        let body = snapshot_body(json);
        assert_eq!(search_snapshot_json(KEY, &body).as_deref(), Some(json));
    }

    #[test]
    fn slice_search_handles_zero_offset() {
        // Ciphertext flush against the header, trailer still present.
        let json = r#"{"dps":{"1":true}}"#;
        let mut body = crypto::ecb_encrypt(KEY.as_bytes(), json.as_bytes()).unwrap();
        body.extend_from_slice(&[0u8; TRAILER_SIZE]);
        assert_eq!(search_snapshot_json(KEY, &body).as_deref(), Some(json));
    }

    #[test]
    fn slice_search_rejects_garbage() {
        assert_eq!(search_snapshot_json(KEY, &[0x5Au8; 96]), None);
        assert_eq!(search_snapshot_json(KEY, &[]), None);
    }

    #[test]
    fn slice_search_ignores_non_dps_plaintext() {
        let body = snapshot_body(r#"{"status":"ok"}"#);
        assert_eq!(search_snapshot_json(KEY, &body), None);
    }

    #[test]
    fn control_json_shape() {
        let config = SessionConfig::new("10.0.0.9", KEY, "dev42").with_user_id("u7");
        let client = Client::new(config).unwrap();
        let json = client.control_json("\"2\":80");
        assert!(json.starts_with(r#"{"devId":"dev42","dps":{"2":80},"t":"#));
        assert!(json.ends_with(r#","uid":"u7"}"#));
    }

    #[test]
    fn control_json_without_uid() {
        let config = SessionConfig::new("10.0.0.9", KEY, "dev42");
        let client = Client::new(config).unwrap();
        let json = client.control_json("\"1\":true,\"4\":\"ONLY_TRAD\"");
        assert!(json.contains(r#""dps":{"1":true,"4":"ONLY_TRAD"}"#));
        assert!(!json.contains("uid"));
    }

    #[test]
    fn config_validation() {
        assert!(matches!(
            Client::new(SessionConfig::new("", KEY, "dev")),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            Client::new(SessionConfig::new("h", "tooshort", "dev")),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            Client::new(SessionConfig::new("h", KEY, "")),
            Err(ClientError::Config(_))
        ));
        assert!(Client::new(SessionConfig::new("h", KEY, "dev")).is_ok());
    }

    #[test]
    fn discovery_query_is_a_valid_frame() {
        let slice = try_parse_one_frame(&DISCOVERY_QUERY).unwrap();
        assert_eq!(slice.start, 0);
        assert_eq!(slice.len, DISCOVERY_QUERY.len());
        let view = FrameView::new(&DISCOVERY_QUERY).unwrap();
        assert_eq!(view.command(), CMD_DP_QUERY);
        assert!(view.crc_valid());
    }

    #[test]
    fn request_id_lands_in_prefix() {
        let mut prefix = CONTROL_PREFIX_TEMPLATE;
        prefix[REQUEST_ID_OFFSET..REQUEST_ID_OFFSET + 4].copy_from_slice(&7u32.to_be_bytes());
        assert_eq!(&prefix[..3], b"3.3");
        assert_eq!(prefix[REQUEST_ID_OFFSET + 3], 7);
    }
}
