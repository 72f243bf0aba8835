//! The session state machine, shared by both ends of a connection.
//!
//! A session is sans-IO: the embedder pushes received transport bytes in
//! through [`Session::on_bytes`] and drains outbound frames through
//! [`Session::poll_output`]. Events (establishment, parsed application
//! messages, close) come back as values, never as callbacks, so the
//! whole handshake is testable without a socket.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use glyph_dml::{Error as DmlError, Message, MessageManager, ParseError, ValueError};

use crate::control::{
    ClientKeepAlive, Opcode, ServerKeepAlive, SessionAccept, SessionOffer,
};
use crate::framer::{FramerError, PacketFramer};
use crate::packet::PacketHeader;

/// Which half of the protocol this session speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

/// Longest a client waits for a server heartbeat.
pub const SERVER_HEARTBEAT: Duration = Duration::from_secs(60);
/// Longest a server waits for a client heartbeat.
pub const CLIENT_HEARTBEAT: Duration = Duration::from_secs(10);
/// Handshake deadline, measured from `on_connected`.
pub const CONNECTION_TIMEOUT: Duration = Duration::from_secs(10);

/// Why a session stopped. Surfaced through a [`SessionEvent::Closed`],
/// never as an error across the I/O boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    UnhandledControlMessage,
    InvalidMessage,
    SessionOfferTimedOut,
    FramingError,
    OversizedPacket,
}

/// Why an application message was dropped without reaching the handler.
/// These do not kill the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidMessageReason {
    InvalidHeaderData,
    InvalidMessageData,
    InvalidService,
    InvalidMessageType,
    InsufficientAccess,
    Unknown,
}

#[derive(Debug)]
pub enum SessionEvent {
    /// The handshake completed; fired exactly once.
    Established,
    /// A well-formed application message cleared the access gate.
    Message(Message),
    /// An application message was rejected; the session lives on.
    InvalidMessage(InvalidMessageReason),
    /// The session is done; no further events follow.
    Closed(CloseReason),
}

/// One endpoint of a framed session.
pub struct Session {
    role: Role,
    id: u16,
    established: bool,
    closed: Option<CloseReason>,
    access_level: u8,
    latency: Duration,

    creation_time: Instant,
    connection_time: Option<Instant>,
    establish_time: Option<Instant>,
    last_sent_heartbeat: Option<Instant>,
    last_received_heartbeat: Option<Instant>,
    waiting_for_keep_alive_response: bool,

    framer: PacketFramer,
    outbox: VecDeque<Vec<u8>>,
    manager: Option<Arc<MessageManager>>,
}

impl Session {
    /// A fresh, unconnected session. Servers pick the id; clients pass 0
    /// and learn theirs from the offer.
    pub fn new(role: Role, id: u16) -> Self {
        Self {
            role,
            id,
            established: false,
            closed: None,
            access_level: 0,
            latency: Duration::ZERO,
            creation_time: Instant::now(),
            connection_time: None,
            establish_time: None,
            last_sent_heartbeat: None,
            last_received_heartbeat: None,
            waiting_for_keep_alive_response: false,
            framer: PacketFramer::new(),
            outbox: VecDeque::new(),
            manager: None,
        }
    }

    /// Attaches the message catalog that decodes the application plane.
    pub fn with_manager(mut self, manager: Arc<MessageManager>) -> Self {
        self.manager = Some(manager);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn is_established(&self) -> bool {
        self.established
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_some()
    }

    pub fn access_level(&self) -> u8 {
        self.access_level
    }

    pub fn set_access_level(&mut self, access_level: u8) {
        self.access_level = access_level;
    }

    /// Latest keep-alive round-trip time.
    pub fn latency(&self) -> Duration {
        self.latency
    }

    pub fn max_packet_size(&self) -> u16 {
        self.framer.max_packet_size()
    }

    pub fn set_max_packet_size(&mut self, max_packet_size: u16) {
        self.framer.set_max_packet_size(max_packet_size);
    }

    /// Liveness check for reaping: before establishment the clock runs
    /// from creation, afterwards from the peer's last heartbeat.
    pub fn is_alive(&self) -> bool {
        if !self.established {
            return self.creation_time.elapsed() <= 2 * CONNECTION_TIMEOUT;
        }
        let peer_heartbeat = match self.role {
            Role::Client => SERVER_HEARTBEAT,
            Role::Server => CLIENT_HEARTBEAT,
        };
        match self.last_received_heartbeat {
            Some(last) => last.elapsed() <= 2 * peer_heartbeat,
            None => false,
        }
    }

    /// Next outbound frame, ready for the transport.
    pub fn poll_output(&mut self) -> Option<Vec<u8>> {
        self.outbox.pop_front()
    }

    /// The transport is up. A server opens with its session offer; a
    /// client waits for one.
    pub fn on_connected(&mut self) {
        self.connection_time = Some(Instant::now());
        if self.role == Role::Server {
            let (timestamp, milliseconds) = unix_clock();
            let offer = SessionOffer {
                session_id: self.id,
                timestamp,
                milliseconds,
            };
            debug!(session_id = self.id, "offering session");
            self.send_control(Opcode::SessionOffer, &offer.encode());
        }
    }

    /// Feeds received transport bytes, returning the events they caused
    /// in order.
    pub fn on_bytes(&mut self, data: &[u8]) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        if self.closed.is_some() {
            return events;
        }

        let payloads = match self.framer.feed(data) {
            Ok(payloads) => payloads,
            Err(error) => {
                let reason = match error {
                    FramerError::BadStartSignal(_) => CloseReason::FramingError,
                    FramerError::OversizedPacket(..) => CloseReason::OversizedPacket,
                };
                warn!(?error, "framing failure");
                self.close(reason, &mut events);
                return events;
            }
        };

        for payload in payloads {
            if self.closed.is_some() {
                break;
            }
            self.on_packet(&payload, &mut events);
        }
        events
    }

    fn on_packet(&mut self, payload: &[u8], events: &mut Vec<SessionEvent>) {
        let (header, body) = match PacketHeader::parse(payload) {
            Ok(parsed) => parsed,
            Err(_) => {
                self.close(CloseReason::InvalidMessage, events);
                return;
            }
        };

        if header.control {
            self.on_control_packet(header.opcode, body, events);
        } else if self.established {
            self.on_application_message(body, events);
        } else {
            // Application data before the handshake finishes is a
            // protocol violation.
            self.close(CloseReason::InvalidMessage, events);
        }
    }

    fn on_control_packet(&mut self, opcode: u8, body: &[u8], events: &mut Vec<SessionEvent>) {
        let opcode = match Opcode::from_u8(opcode) {
            Some(opcode) => opcode,
            None => {
                self.close(CloseReason::UnhandledControlMessage, events);
                return;
            }
        };

        match (self.role, opcode) {
            (Role::Client, Opcode::SessionOffer) => self.on_session_offer(body, events),
            (Role::Server, Opcode::SessionAccept) => self.on_session_accept(body, events),
            (_, Opcode::KeepAlive) => self.on_keep_alive(body, events),
            (_, Opcode::KeepAliveRsp) => self.on_keep_alive_response(body, events),
            _ => self.close(CloseReason::UnhandledControlMessage, events),
        }
    }

    fn on_session_offer(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        let offer = match SessionOffer::decode(body) {
            Ok(offer) => offer,
            Err(_) => {
                self.close(CloseReason::InvalidMessage, events);
                return;
            }
        };

        if self.handshake_expired() {
            self.close(CloseReason::SessionOfferTimedOut, events);
            return;
        }

        self.id = offer.session_id;
        let (timestamp, milliseconds) = unix_clock();
        let accept = SessionAccept {
            session_id: self.id,
            timestamp,
            milliseconds,
        };
        self.send_control(Opcode::SessionAccept, &accept.encode());
        debug!(session_id = self.id, "session accepted");
        self.establish(events);
    }

    fn on_session_accept(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        let accept = match SessionAccept::decode(body) {
            Ok(accept) => accept,
            Err(_) => {
                self.close(CloseReason::InvalidMessage, events);
                return;
            }
        };

        if self.handshake_expired() {
            self.close(CloseReason::SessionOfferTimedOut, events);
            return;
        }

        if accept.session_id != self.id {
            self.close(CloseReason::InvalidMessage, events);
            return;
        }

        debug!(session_id = self.id, "session established");
        self.establish(events);
    }

    fn establish(&mut self, events: &mut Vec<SessionEvent>) {
        let now = Instant::now();
        self.established = true;
        self.establish_time = Some(now);
        self.last_received_heartbeat = Some(now);
        events.push(SessionEvent::Established);
    }

    fn handshake_expired(&self) -> bool {
        match self.connection_time {
            Some(connected) => connected.elapsed() > CONNECTION_TIMEOUT,
            None => true,
        }
    }

    fn on_keep_alive(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        // Validate the peer's form of the heartbeat, then echo it back.
        let valid = match self.role {
            Role::Client => ServerKeepAlive::decode(body).is_ok(),
            Role::Server => ClientKeepAlive::decode(body).is_ok(),
        };
        if !valid {
            self.close(CloseReason::InvalidMessage, events);
            return;
        }

        self.last_received_heartbeat = Some(Instant::now());
        self.send_control(Opcode::KeepAliveRsp, body);
    }

    fn on_keep_alive_response(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        let valid = match self.role {
            Role::Client => ClientKeepAlive::decode(body).is_ok(),
            Role::Server => ServerKeepAlive::decode(body).is_ok(),
        };
        if !valid {
            self.close(CloseReason::InvalidMessage, events);
            return;
        }

        if let Some(sent) = self.last_sent_heartbeat {
            self.latency = sent.elapsed();
        }
        self.waiting_for_keep_alive_response = false;
    }

    /// Queues the role-appropriate heartbeat. Only one keep-alive may be
    /// in flight; further calls are no-ops until the response arrives.
    pub fn send_keep_alive(&mut self) {
        if !self.established || self.waiting_for_keep_alive_response || self.closed.is_some() {
            return;
        }
        self.waiting_for_keep_alive_response = true;

        let body = match self.role {
            Role::Client => {
                let elapsed = self
                    .establish_time
                    .map(|t| t.elapsed())
                    .unwrap_or(Duration::ZERO);
                let minutes = elapsed.as_secs() / 60;
                let milliseconds = (elapsed - Duration::from_secs(minutes * 60)).as_millis();
                ClientKeepAlive {
                    session_id: self.id,
                    milliseconds: milliseconds as u16,
                    minutes: minutes as u16,
                }
                .encode()
            }
            Role::Server => ServerKeepAlive {
                timestamp: self.creation_time.elapsed().as_millis() as u32,
            }
            .encode(),
        };

        self.send_control(Opcode::KeepAlive, &body);
        self.last_sent_heartbeat = Some(Instant::now());
    }

    /// Queues an application-plane DML message.
    pub fn send_message(&mut self, message: &Message) -> Result<(), DmlError> {
        let mut body = Vec::with_capacity(message.size());
        message
            .write_to(&mut body)
            .map_err(|e| ParseError::InvalidMessageData(e.to_string()))?;
        self.send_packet(false, 0, &body);
        Ok(())
    }

    fn on_application_message(&mut self, body: &[u8], events: &mut Vec<SessionEvent>) {
        let manager = match &self.manager {
            Some(manager) => Arc::clone(manager),
            None => {
                events.push(SessionEvent::InvalidMessage(InvalidMessageReason::Unknown));
                return;
            }
        };

        let message = match manager.message_from_binary(&mut &body[..]) {
            Ok(message) => message,
            Err(error) => {
                events.push(SessionEvent::InvalidMessage(invalid_reason(&error)));
                return;
            }
        };

        if message.access_level() > self.access_level {
            events.push(SessionEvent::InvalidMessage(
                InvalidMessageReason::InsufficientAccess,
            ));
            return;
        }

        events.push(SessionEvent::Message(message));
    }

    fn send_control(&mut self, opcode: Opcode, body: &[u8]) {
        self.send_packet(true, opcode as u8, body);
    }

    fn send_packet(&mut self, control: bool, opcode: u8, body: &[u8]) {
        if self.closed.is_some() {
            return;
        }
        let mut payload = Vec::with_capacity(4 + body.len());
        PacketHeader::new(control, opcode).write_to(&mut payload);
        payload.extend_from_slice(body);
        self.outbox.push_back(PacketFramer::frame(&payload));
    }

    fn close(&mut self, reason: CloseReason, events: &mut Vec<SessionEvent>) {
        if self.closed.is_some() {
            return;
        }
        debug!(?reason, session_id = self.id, "closing session");
        self.closed = Some(reason);
        self.outbox.clear();
        self.waiting_for_keep_alive_response = false;
        events.push(SessionEvent::Closed(reason));
    }
}

fn invalid_reason(error: &DmlError) -> InvalidMessageReason {
    match error {
        DmlError::Parse(ParseError::InvalidHeaderData(_)) => {
            InvalidMessageReason::InvalidHeaderData
        }
        DmlError::Parse(
            ParseError::InsufficientMessageData(_) | ParseError::InvalidMessageData(_),
        ) => InvalidMessageReason::InvalidMessageData,
        DmlError::Value(ValueError::InvalidService(_)) => InvalidMessageReason::InvalidService,
        DmlError::Value(ValueError::InvalidMessageType { .. }) => {
            InvalidMessageReason::InvalidMessageType
        }
        _ => InvalidMessageReason::Unknown,
    }
}

/// Seconds since the epoch plus the milliseconds into the current
/// second, the split the handshake bodies carry.
fn unix_clock() -> (i32, u32) {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO);
    (now.as_secs() as i32, now.subsec_millis())
}
