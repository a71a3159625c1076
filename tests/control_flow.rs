//! End-to-end exercises of the controller against a scripted device.
//!
//! Each scripted connection serves a fixed sequence of read chunks and logs
//! everything sent to it, so the tests can assert both the surfaced state
//! and the on-wire ordering (handshake strictly before the write frame).

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use saunalink::client::{Client, SessionConfig};
use saunalink::controller::SaunaController;
use saunalink::crypto;
use saunalink::protocol::{CMD_CONTROL, CMD_DP_QUERY, CMD_HEARTBEAT, FrameView, build_frame};
use saunalink::transport::{Connection, Connector, TransportError};

const KEY: &str = "fdjhl1jhlkjh4ljk";
const DEVICE_ID: &str = "bf735huj9kf2lda4x1";

type SendLog = Rc<RefCell<Vec<Vec<u8>>>>;

struct ScriptedConnection {
    reads: VecDeque<Vec<u8>>,
    sent: SendLog,
}

impl Connection for ScriptedConnection {
    fn send(&mut self, data: &[u8]) -> Result<(), TransportError> {
        self.sent.borrow_mut().push(data.to_vec());
        Ok(())
    }

    fn receive(&mut self, buf: &mut [u8]) -> Result<usize, TransportError> {
        match self.reads.pop_front() {
            None => Ok(0),
            Some(chunk) => {
                let n = chunk.len().min(buf.len());
                buf[..n].copy_from_slice(&chunk[..n]);
                if n < chunk.len() {
                    self.reads.push_front(chunk[n..].to_vec());
                }
                Ok(n)
            }
        }
    }
}

struct ScriptedConnector {
    connections: Rc<RefCell<VecDeque<VecDeque<Vec<u8>>>>>,
    sent: SendLog,
    dials: Rc<RefCell<u32>>,
}

impl ScriptedConnector {
    fn new(connections: Vec<Vec<Vec<u8>>>) -> Self {
        let queue = connections
            .into_iter()
            .map(|reads| reads.into_iter().collect())
            .collect();
        Self {
            connections: Rc::new(RefCell::new(queue)),
            sent: Rc::new(RefCell::new(Vec::new())),
            dials: Rc::new(RefCell::new(0)),
        }
    }
}

impl Connector for ScriptedConnector {
    type Conn = ScriptedConnection;

    fn connect(&self) -> Result<ScriptedConnection, TransportError> {
        *self.dials.borrow_mut() += 1;
        let reads = self
            .connections
            .borrow_mut()
            .pop_front()
            .ok_or(TransportError::Closed)?;
        Ok(ScriptedConnection {
            reads,
            sent: Rc::clone(&self.sent),
        })
    }
}

fn snapshot_json(heater_on: bool, setpoint: i64, temperature: i64) -> String {
    format!(
        "{{\"devId\":\"{DEVICE_ID}\",\"dps\":{{\"1\":{heater_on},\"2\":{setpoint},\"3\":{temperature},\"107\":\"c\"}},\"t\":1700000000}}"
    )
}

/// A command-10 response as the device frames it: 4 bytes of return code
/// ahead of the ciphertext.
fn snapshot_frame(json: &str) -> Vec<u8> {
    let ciphertext = crypto::ecb_encrypt(KEY.as_bytes(), json.as_bytes()).unwrap();
    let mut payload = vec![0u8; 4];
    payload.extend_from_slice(&ciphertext);
    build_frame(0x100, CMD_DP_QUERY, &payload, &[])
}

fn keepalive_frame() -> Vec<u8> {
    build_frame(0x101, CMD_HEARTBEAT, &[], &[])
}

fn controller_with(connector: ScriptedConnector) -> SaunaController<ScriptedConnector> {
    let config = SessionConfig::new("scripted", KEY, DEVICE_ID);
    let client = Client::with_connector(config, connector).unwrap();
    SaunaController::with_client(client)
}

#[test]
fn poll_surfaces_device_state() {
    // Keepalive noise first, then the snapshot split across short reads
    // with a stray byte in front.
    let frame = snapshot_frame(&snapshot_json(false, 75, 41));
    let (head, tail) = frame.split_at(20);
    let mut first = vec![0xEEu8];
    first.extend_from_slice(&keepalive_frame());
    first.extend_from_slice(head);

    let connector = ScriptedConnector::new(vec![vec![first, tail.to_vec()]]);
    let mut sauna = controller_with(connector);

    assert!(sauna.poll_snapshot());
    assert!(sauna.online());
    assert_eq!(sauna.last_error(), "");
    assert!(!sauna.heater_on_fb());
    assert_eq!(sauna.setpoint(), 75);
    assert_eq!(sauna.temperature(), 41);
    assert_eq!(sauna.unit(), "c");
    assert!(sauna.last_snapshot_json().contains("\"dps\""));
}

#[test]
fn set_setpoint_verified_against_echoing_device() {
    let handshake = vec![snapshot_frame(&snapshot_json(false, 75, 41))];
    let verify_poll = vec![snapshot_frame(&snapshot_json(false, 80, 41))];
    let connector = ScriptedConnector::new(vec![handshake, verify_poll]);
    let dials = Rc::clone(&connector.dials);
    let sent = Rc::clone(&connector.sent);
    let mut sauna = controller_with(connector);

    assert!(sauna.set_setpoint(80));
    assert_eq!(sauna.setpoint(), 80);
    assert!(sauna.online());
    assert_eq!(sauna.last_error(), "");
    // One connection for handshake + write, a fresh one for verification.
    assert_eq!(*dials.borrow(), 2);

    // On-wire ordering: discovery query, then the command frame, then the
    // verification poll's discovery query.
    let sent = sent.borrow();
    assert_eq!(sent.len(), 3);
    let handshake_view = FrameView::new(&sent[0]).unwrap();
    assert_eq!(handshake_view.command(), CMD_DP_QUERY);
    let control_view = FrameView::new(&sent[1]).unwrap();
    assert_eq!(control_view.command(), CMD_CONTROL);
    let verify_view = FrameView::new(&sent[2]).unwrap();
    assert_eq!(verify_view.command(), CMD_DP_QUERY);
}

#[test]
fn set_setpoint_reports_mismatch_distinctly() {
    let handshake = vec![snapshot_frame(&snapshot_json(false, 75, 41))];
    // Device accepted the frame but kept the old value.
    let verify_poll = vec![snapshot_frame(&snapshot_json(false, 75, 41))];
    let connector = ScriptedConnector::new(vec![handshake, verify_poll]);
    let mut sauna = controller_with(connector);

    assert!(!sauna.set_setpoint(80));
    assert_eq!(sauna.last_error(), "command sent but setpoint unchanged");
    // The device responded throughout; this is not a transport failure.
    assert!(sauna.online());
    assert_eq!(sauna.setpoint(), 75);
}

#[test]
fn heater_write_carries_mode_dp() {
    let handshake = vec![snapshot_frame(&snapshot_json(false, 75, 41))];
    let verify_poll = vec![snapshot_frame(&snapshot_json(true, 75, 41))];
    let connector = ScriptedConnector::new(vec![handshake, verify_poll]);
    let sent = Rc::clone(&connector.sent);
    let mut sauna = controller_with(connector);

    assert!(sauna.heater_on());
    assert!(sauna.heater_on_fb());

    let sent = sent.borrow();
    let control_view = FrameView::new(&sent[1]).unwrap();
    assert_eq!(control_view.command(), CMD_CONTROL);

    // Body: 15-byte version/request-id prefix, ciphertext, CRC + tail.
    let body = control_view.body();
    assert_eq!(&body[..3], b"3.3");
    let ciphertext = &body[15..body.len() - 8];
    let plain = crypto::ecb_decrypt(KEY.as_bytes(), ciphertext).unwrap();
    let json = String::from_utf8(plain).unwrap();
    assert!(json.contains(&format!("\"devId\":\"{DEVICE_ID}\"")));
    assert!(json.contains("\"1\":true"));
    assert!(json.contains("\"4\":\"ONLY_TRAD\""));
}

#[test]
fn repeated_failures_open_cooldown() {
    // No scripted connections at all: every dial fails immediately.
    let connector = ScriptedConnector::new(vec![]);
    let dials = Rc::clone(&connector.dials);
    let mut sauna = controller_with(connector);

    assert!(!sauna.poll_snapshot());
    assert!(!sauna.poll_snapshot());
    let dials_before_busy = *dials.borrow();

    // Cooldown is open now; the next operation is rejected without dialing.
    assert!(!sauna.set_setpoint(80));
    assert!(sauna.last_error().contains("busy"));
    assert_eq!(*dials.borrow(), dials_before_busy);
}
