//! Caller-facing control surface.
//!
//! The facade is what the host automation layer talks to: every method
//! returns a plain success flag, state is pulled through getters, and no
//! error type or panic crosses the boundary. Writes are verified by
//! re-polling the device, and repeated failures open a cooldown window so a
//! struggling device is not hammered.

use std::time::{Duration, Instant};

use tracing::{debug, instrument, warn};

use crate::client::{Client, ClientError, SessionConfig};
use crate::dps::Snapshot;
use crate::transport::{Connector, TcpConnector};

/// Facade-level attempts around the client's own per-operation retries.
const RETRY_COUNT: u32 = 3;

/// Consecutive failures that open the cooldown window.
const FAILURE_THRESHOLD: u32 = 2;

/// Cooldown window length.
const COOLDOWN: Duration = Duration::from_secs(10);

const BUSY_MESSAGE: &str = "controller busy; cooling down after repeated failures";

/// Consecutive-failure counter and cooldown deadline.
///
/// Owned by one controller instance so independent device sessions never
/// interfere. Busy rejections do not feed the counter; only real operation
/// failures do, and any fully successful operation clears both fields.
#[derive(Debug, Default)]
struct Backoff {
    consecutive_failures: u32,
    busy_until: Option<Instant>,
}

impl Backoff {
    fn note_failure(&mut self) {
        self.consecutive_failures += 1;
        if self.consecutive_failures >= FAILURE_THRESHOLD {
            self.busy_until = Some(Instant::now() + COOLDOWN);
        }
    }

    fn note_success(&mut self) {
        self.consecutive_failures = 0;
        self.busy_until = None;
    }

    fn busy(&self) -> bool {
        self.busy_until.is_some_and(|until| Instant::now() < until)
    }
}

/// Non-throwing sauna control facade.
///
/// One instance drives one device. Calls block; concurrent use from
/// multiple threads must be serialized by the caller.
#[derive(Debug)]
pub struct SaunaController<C: Connector = TcpConnector> {
    client: Option<Client<C>>,
    backoff: Backoff,
    last_error: String,
    online: bool,
    heater_on: bool,
    temperature: u16,
    setpoint: u16,
    unit: String,
    last_snapshot_json: String,
}

impl SaunaController<TcpConnector> {
    /// Create an unconfigured controller.
    #[must_use]
    pub fn new() -> Self {
        Self::empty()
    }

    /// Configure the device session. Replaces any previous configuration
    /// wholesale. An empty `user_id` means none.
    #[instrument(level = "debug", skip(self, local_key))]
    pub fn configure(&mut self, host: &str, local_key: &str, device_id: &str, user_id: &str) -> bool {
        let mut config = SessionConfig::new(host, local_key, device_id);
        if !user_id.is_empty() {
            config = config.with_user_id(user_id);
        }
        match Client::new(config) {
            Ok(client) => {
                self.client = Some(client);
                self.last_error.clear();
                self.online = true;
                true
            }
            Err(err) => {
                self.client = None;
                self.last_error = err.to_string();
                self.online = false;
                false
            }
        }
    }
}

impl Default for SaunaController<TcpConnector> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Connector> SaunaController<C> {
    fn empty() -> Self {
        Self {
            client: None,
            backoff: Backoff::default(),
            last_error: String::new(),
            online: false,
            heater_on: false,
            temperature: 0,
            setpoint: 0,
            unit: String::new(),
            last_snapshot_json: String::new(),
        }
    }

    /// Create a controller around an already-built client. This is how a
    /// non-TCP [`Connector`] (or a scripted one) is plugged in.
    #[must_use]
    pub fn with_client(client: Client<C>) -> Self {
        let mut controller = Self::empty();
        controller.client = Some(client);
        controller.online = true;
        controller
    }

    /// Poll the device and refresh the snapshot getters.
    #[instrument(level = "debug", skip(self))]
    pub fn poll_snapshot(&mut self) -> bool {
        if self.reject_if_busy() {
            return false;
        }
        match self.poll_with_retry() {
            Ok(snapshot) => {
                self.apply_snapshot(&snapshot);
                self.backoff.note_success();
                self.online = true;
                self.last_error.clear();
                true
            }
            Err(message) => {
                self.fail(message);
                false
            }
        }
    }

    /// Switch the heater on, verified by re-poll.
    pub fn heater_on(&mut self) -> bool {
        self.write_heater(true)
    }

    /// Switch the heater off, verified by re-poll.
    pub fn heater_off(&mut self) -> bool {
        self.write_heater(false)
    }

    /// Write a new setpoint, verified by re-poll.
    #[instrument(level = "debug", skip(self))]
    pub fn set_setpoint(&mut self, setpoint: u16) -> bool {
        if self.reject_if_busy() {
            return false;
        }
        if let Err(message) = self.write_with_retry(|client| client.set_setpoint(setpoint)) {
            self.fail(message);
            return false;
        }
        self.verify(
            |controller| controller.setpoint == setpoint,
            "command sent but setpoint unchanged",
        )
    }

    /// Message from the most recent failure; empty after a success.
    #[must_use]
    pub fn last_error(&self) -> &str {
        &self.last_error
    }

    /// Whether the device answered the most recent exchange.
    #[must_use]
    pub fn online(&self) -> bool {
        self.online
    }

    /// Heater state from the last snapshot.
    #[must_use]
    pub fn heater_on_fb(&self) -> bool {
        self.heater_on
    }

    /// Measured temperature from the last snapshot.
    #[must_use]
    pub fn temperature(&self) -> u16 {
        self.temperature
    }

    /// Setpoint from the last snapshot.
    #[must_use]
    pub fn setpoint(&self) -> u16 {
        self.setpoint
    }

    /// Unit string from the last snapshot.
    #[must_use]
    pub fn unit(&self) -> &str {
        &self.unit
    }

    /// Raw JSON of the last snapshot.
    #[must_use]
    pub fn last_snapshot_json(&self) -> &str {
        &self.last_snapshot_json
    }

    #[instrument(level = "debug", skip(self))]
    fn write_heater(&mut self, on: bool) -> bool {
        if self.reject_if_busy() {
            return false;
        }
        if let Err(message) = self.write_with_retry(|client| client.set_heater(on)) {
            self.fail(message);
            return false;
        }
        self.verify(
            |controller| controller.heater_on == on,
            "command sent but heater state unchanged",
        )
    }

    /// Re-poll and compare against the intended state. The verification
    /// poll bypasses the cooldown gate; a mismatch is reported distinctly
    /// from a transport failure and is not retried automatically.
    fn verify(&mut self, check: impl Fn(&Self) -> bool, mismatch_message: &str) -> bool {
        match self.poll_with_retry() {
            Err(message) => {
                warn!(error = %message, "verification poll failed");
                self.last_error = format!("verify poll failed: {message}");
                self.online = false;
                self.backoff.note_failure();
                false
            }
            Ok(snapshot) => {
                self.apply_snapshot(&snapshot);
                self.online = true;
                if check(self) {
                    debug!("write verified against fresh snapshot");
                    self.backoff.note_success();
                    self.last_error.clear();
                    true
                } else {
                    warn!("device accepted the write but state did not change");
                    self.last_error = mismatch_message.to_string();
                    false
                }
            }
        }
    }

    fn poll_with_retry(&mut self) -> Result<Snapshot, String> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| "controller not configured".to_string())?;
        let mut last_error = String::new();
        for _ in 0..RETRY_COUNT {
            match client.poll_snapshot() {
                Ok(snapshot) => return Ok(snapshot),
                Err(err) => last_error = err.to_string(),
            }
        }
        Err(last_error)
    }

    fn write_with_retry(
        &mut self,
        mut op: impl FnMut(&mut Client<C>) -> Result<(), ClientError>,
    ) -> Result<(), String> {
        let client = self
            .client
            .as_mut()
            .ok_or_else(|| "controller not configured".to_string())?;
        let mut last_error = String::new();
        for _ in 0..RETRY_COUNT {
            match op(client) {
                Ok(()) => return Ok(()),
                Err(err @ ClientError::Config(_)) => return Err(err.to_string()),
                Err(err) => last_error = err.to_string(),
            }
        }
        Err(last_error)
    }

    fn apply_snapshot(&mut self, snapshot: &Snapshot) {
        if let Some(on) = snapshot.heater_on {
            self.heater_on = on;
        }
        if let Some(value) = snapshot.setpoint {
            self.setpoint = clamp_u16(value);
        }
        if let Some(value) = snapshot.temperature {
            self.temperature = clamp_u16(value);
        }
        if let Some(unit) = &snapshot.unit {
            self.unit.clone_from(unit);
        }
        self.last_snapshot_json.clone_from(&snapshot.raw_json);
    }

    fn reject_if_busy(&mut self) -> bool {
        if self.backoff.busy() {
            self.last_error = BUSY_MESSAGE.to_string();
            self.online = false;
            true
        } else {
            false
        }
    }

    fn fail(&mut self, message: String) {
        warn!(error = %message, "operation failed");
        self.last_error = message;
        self.online = false;
        self.backoff.note_failure();
    }
}

fn clamp_u16(value: i64) -> u16 {
    value.clamp(0, i64::from(u16::MAX)) as u16
}
