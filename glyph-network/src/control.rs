//! Control-plane message bodies.
//!
//! Each body is a small DML record, so the encoding rules (widths,
//! endianness, reserved fields) live in one place.

use glyph_dml::{Error as DmlError, FieldValue, Record};

/// Control opcodes carried in the packet header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    SessionOffer = 0,
    UdpHello = 1,
    KeepAlive = 3,
    KeepAliveRsp = 4,
    SessionAccept = 5,
}

impl Opcode {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => Opcode::SessionOffer,
            1 => Opcode::UdpHello,
            3 => Opcode::KeepAlive,
            4 => Opcode::KeepAliveRsp,
            5 => Opcode::SessionAccept,
            _ => return None,
        })
    }
}

fn encode(record: &Record) -> Vec<u8> {
    let mut out = Vec::with_capacity(record.size());
    // Records of plain fields only fail on an exhausted writer, which a
    // Vec never is.
    record
        .write_to(&mut out)
        .unwrap_or_else(|_| unreachable!("vec writers do not fail"));
    out
}

/// Server → client: here is your session id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOffer {
    pub session_id: u16,
    pub timestamp: i32,
    pub milliseconds: u32,
}

impl SessionOffer {
    fn record() -> Record {
        let mut record = Record::new();
        let _ = record.add_value("m_session_id", FieldValue::UShrt(0));
        let _ = record.add_value("unknown", FieldValue::UInt(0));
        let _ = record.add_value("m_timestamp", FieldValue::Int(0));
        let _ = record.add_value("m_milliseconds", FieldValue::UInt(0));
        record
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut record = Self::record();
        set(&mut record, "m_session_id", FieldValue::UShrt(self.session_id));
        set(&mut record, "m_timestamp", FieldValue::Int(self.timestamp));
        set(
            &mut record,
            "m_milliseconds",
            FieldValue::UInt(self.milliseconds),
        );
        encode(&record)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DmlError> {
        let mut record = Self::record();
        record.read_from(&mut &body[..])?;
        Ok(Self {
            session_id: ushrt(&record, "m_session_id"),
            timestamp: int(&record, "m_timestamp"),
            milliseconds: uint(&record, "m_milliseconds"),
        })
    }
}

/// Client → server: accepting the offered session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAccept {
    pub session_id: u16,
    pub timestamp: i32,
    pub milliseconds: u32,
}

impl SessionAccept {
    fn record() -> Record {
        let mut record = Record::new();
        let _ = record.add_value("unknown", FieldValue::UShrt(0));
        let _ = record.add_value("unknown2", FieldValue::UInt(0));
        let _ = record.add_value("m_timestamp", FieldValue::Int(0));
        let _ = record.add_value("m_milliseconds", FieldValue::UInt(0));
        let _ = record.add_value("m_session_id", FieldValue::UShrt(0));
        record
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut record = Self::record();
        set(&mut record, "m_timestamp", FieldValue::Int(self.timestamp));
        set(
            &mut record,
            "m_milliseconds",
            FieldValue::UInt(self.milliseconds),
        );
        set(&mut record, "m_session_id", FieldValue::UShrt(self.session_id));
        encode(&record)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DmlError> {
        let mut record = Self::record();
        record.read_from(&mut &body[..])?;
        Ok(Self {
            session_id: ushrt(&record, "m_session_id"),
            timestamp: int(&record, "m_timestamp"),
            milliseconds: uint(&record, "m_milliseconds"),
        })
    }
}

/// Client heartbeat: elapsed time since the session was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientKeepAlive {
    pub session_id: u16,
    pub milliseconds: u16,
    pub minutes: u16,
}

impl ClientKeepAlive {
    fn record() -> Record {
        let mut record = Record::new();
        let _ = record.add_value("m_session_id", FieldValue::UShrt(0));
        let _ = record.add_value("m_milliseconds", FieldValue::UShrt(0));
        let _ = record.add_value("m_minutes", FieldValue::UShrt(0));
        record
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut record = Self::record();
        set(&mut record, "m_session_id", FieldValue::UShrt(self.session_id));
        set(
            &mut record,
            "m_milliseconds",
            FieldValue::UShrt(self.milliseconds),
        );
        set(&mut record, "m_minutes", FieldValue::UShrt(self.minutes));
        encode(&record)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DmlError> {
        let mut record = Self::record();
        record.read_from(&mut &body[..])?;
        Ok(Self {
            session_id: ushrt(&record, "m_session_id"),
            milliseconds: ushrt(&record, "m_milliseconds"),
            minutes: ushrt(&record, "m_minutes"),
        })
    }
}

/// Server heartbeat: milliseconds since server startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerKeepAlive {
    pub timestamp: u32,
}

impl ServerKeepAlive {
    fn record() -> Record {
        let mut record = Record::new();
        let _ = record.add_value("m_session_id", FieldValue::UShrt(0));
        let _ = record.add_value("m_timestamp", FieldValue::UInt(0));
        record
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut record = Self::record();
        set(&mut record, "m_timestamp", FieldValue::UInt(self.timestamp));
        encode(&record)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DmlError> {
        let mut record = Self::record();
        record.read_from(&mut &body[..])?;
        Ok(Self {
            timestamp: uint(&record, "m_timestamp"),
        })
    }
}

/// The short heartbeat form sharing the keep-alive opcode pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ping {
    pub session_id: u16,
    pub milliseconds: u16,
    pub minutes: u8,
}

impl Ping {
    fn record() -> Record {
        let mut record = Record::new();
        let _ = record.add_value("m_session_id", FieldValue::UShrt(0));
        let _ = record.add_value("m_milliseconds", FieldValue::UShrt(0));
        let _ = record.add_value("m_minutes", FieldValue::UByt(0));
        record
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut record = Self::record();
        set(&mut record, "m_session_id", FieldValue::UShrt(self.session_id));
        set(
            &mut record,
            "m_milliseconds",
            FieldValue::UShrt(self.milliseconds),
        );
        set(&mut record, "m_minutes", FieldValue::UByt(self.minutes));
        encode(&record)
    }

    pub fn decode(body: &[u8]) -> Result<Self, DmlError> {
        let mut record = Self::record();
        record.read_from(&mut &body[..])?;
        Ok(Self {
            session_id: ushrt(&record, "m_session_id"),
            milliseconds: ushrt(&record, "m_milliseconds"),
            minutes: ubyt(&record, "m_minutes"),
        })
    }
}

fn set(record: &mut Record, name: &str, value: FieldValue) {
    if let Some(field) = record.field_mut(name) {
        let _ = field.set_value(value);
    }
}

fn ushrt(record: &Record, name: &str) -> u16 {
    match record.field(name).map(|f| f.value()) {
        Some(FieldValue::UShrt(v)) => *v,
        _ => 0,
    }
}

fn ubyt(record: &Record, name: &str) -> u8 {
    match record.field(name).map(|f| f.value()) {
        Some(FieldValue::UByt(v)) => *v,
        _ => 0,
    }
}

fn int(record: &Record, name: &str) -> i32 {
    match record.field(name).map(|f| f.value()) {
        Some(FieldValue::Int(v)) => *v,
        _ => 0,
    }
}

fn uint(record: &Record, name: &str) -> u32 {
    match record.field(name).map(|f| f.value()) {
        Some(FieldValue::UInt(v)) => *v,
        _ => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_offer_golden_bytes() {
        let offer = SessionOffer {
            session_id: 0xABCD,
            timestamp: 0xAABBCCDDu32 as i32,
            milliseconds: 0xAABBCCDD,
        };
        let bytes = offer.encode();
        assert_eq!(
            bytes,
            [
                0xCD, 0xAB, // session id
                0x00, 0x00, 0x00, 0x00, // reserved
                0xDD, 0xCC, 0xBB, 0xAA, // timestamp
                0xDD, 0xCC, 0xBB, 0xAA, // milliseconds
            ]
        );
        assert_eq!(SessionOffer::decode(&bytes).unwrap(), offer);
    }

    #[test]
    fn session_accept_golden_bytes() {
        let accept = SessionAccept {
            session_id: 0xABCD,
            timestamp: 0xAABBCCDDu32 as i32,
            milliseconds: 0xAABBCCDD,
        };
        let bytes = accept.encode();
        assert_eq!(
            bytes,
            [
                0x00, 0x00, // reserved
                0x00, 0x00, 0x00, 0x00, // reserved
                0xDD, 0xCC, 0xBB, 0xAA, // timestamp
                0xDD, 0xCC, 0xBB, 0xAA, // milliseconds
                0xCD, 0xAB, // session id
            ]
        );
        assert_eq!(SessionAccept::decode(&bytes).unwrap(), accept);
    }

    #[test]
    fn keep_alive_golden_bytes() {
        let client = ClientKeepAlive {
            session_id: 0xABCD,
            milliseconds: 0xABCD,
            minutes: 0xABCD,
        };
        assert_eq!(client.encode(), [0xCD, 0xAB, 0xCD, 0xAB, 0xCD, 0xAB]);

        let server = ServerKeepAlive {
            timestamp: 0xAABBCCDD,
        };
        assert_eq!(server.encode(), [0x00, 0x00, 0xDD, 0xCC, 0xBB, 0xAA]);

        let ping = Ping {
            session_id: 0xABCD,
            milliseconds: 0xABCD,
            minutes: 0xAB,
        };
        assert_eq!(ping.encode(), [0xCD, 0xAB, 0xCD, 0xAB, 0xAB]);
        assert_eq!(Ping::decode(&ping.encode()).unwrap(), ping);
    }

    #[test]
    fn truncated_bodies_fail_to_decode() {
        assert!(SessionOffer::decode(&[0xCD, 0xAB, 0x00]).is_err());
        assert!(ClientKeepAlive::decode(&[]).is_err());
    }
}
