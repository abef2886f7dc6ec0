//! Strict grammar for the printf-style mobility payloads.
//!
//! The wire formats are preserved for interoperability:
//!
//! - join request: `SIZE:%d,SPEED:%.2f,DTD:%.2f`
//! - INFO:   `INFO|REAR:%s,LENGTH:%.2f,SPEED:%.2f,SIZE:%d,DTD:%.2f`
//! - STATUS: `STATUS|CMDSPEED:%.2f,DTD:%.2f,SPEED:%.2f`
//!
//! Fields are matched key by key in the declared order. A malformed payload
//! yields a [`ProtocolError`] naming the offending field instead of silently
//! mis-parsing.

use crate::error::ProtocolError;

/// Parameters of a join-at-rear request
#[derive(Debug, Clone, PartialEq)]
pub struct JoinRequestParams {
    /// Size of the candidate's current platoon (1 for a lone vehicle)
    pub size: usize,
    /// Candidate speed (m/s)
    pub speed: f64,
    /// Candidate downtrack distance (m)
    pub dtd: f64,
}

/// Parameters of a leader INFO broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct InfoParams {
    /// Static id of the rearmost platoon vehicle
    pub rear_id: String,
    /// Physical platoon length, front bumper to rear bumper (m)
    pub length: f64,
    /// Leader speed (m/s)
    pub speed: f64,
    /// Current platoon size
    pub size: usize,
    /// Leader downtrack distance (m)
    pub dtd: f64,
}

/// Parameters of a member STATUS broadcast
#[derive(Debug, Clone, PartialEq)]
pub struct StatusParams {
    /// Member commanded speed (m/s)
    pub cmd_speed: f64,
    /// Member downtrack distance (m)
    pub dtd: f64,
    /// Member actual speed (m/s)
    pub speed: f64,
}

/// A decoded operation payload
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    Info(InfoParams),
    Status(StatusParams),
}

impl OperationPayload {
    /// Decode an operation payload by its `KIND|` prefix
    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let (kind, body) = input
            .split_once('|')
            .ok_or_else(|| ProtocolError::UnknownKind(input.to_string()))?;
        match kind {
            "INFO" => InfoParams::parse_body(body).map(OperationPayload::Info),
            "STATUS" => StatusParams::parse_body(body).map(OperationPayload::Status),
            other => Err(ProtocolError::UnknownKind(other.to_string())),
        }
    }
}

impl JoinRequestParams {
    pub fn encode(&self) -> String {
        format!(
            "SIZE:{},SPEED:{:.2},DTD:{:.2}",
            self.size, self.speed, self.dtd
        )
    }

    pub fn parse(input: &str) -> Result<Self, ProtocolError> {
        let mut fields = FieldReader::new(input);
        let size = fields.next_usize("SIZE")?;
        let speed = fields.next_f64("SPEED")?;
        let dtd = fields.next_f64("DTD")?;
        fields.finish()?;
        Ok(Self { size, speed, dtd })
    }
}

impl InfoParams {
    pub fn encode(&self) -> String {
        format!(
            "INFO|REAR:{},LENGTH:{:.2},SPEED:{:.2},SIZE:{},DTD:{:.2}",
            self.rear_id, self.length, self.speed, self.size, self.dtd
        )
    }

    fn parse_body(body: &str) -> Result<Self, ProtocolError> {
        let mut fields = FieldReader::new(body);
        let rear_id = fields.next_str("REAR")?.to_string();
        let length = fields.next_f64("LENGTH")?;
        let speed = fields.next_f64("SPEED")?;
        let size = fields.next_usize("SIZE")?;
        let dtd = fields.next_f64("DTD")?;
        fields.finish()?;
        Ok(Self {
            rear_id,
            length,
            speed,
            size,
            dtd,
        })
    }
}

impl StatusParams {
    pub fn encode(&self) -> String {
        format!(
            "STATUS|CMDSPEED:{:.2},DTD:{:.2},SPEED:{:.2}",
            self.cmd_speed, self.dtd, self.speed
        )
    }

    fn parse_body(body: &str) -> Result<Self, ProtocolError> {
        let mut fields = FieldReader::new(body);
        let cmd_speed = fields.next_f64("CMDSPEED")?;
        let dtd = fields.next_f64("DTD")?;
        let speed = fields.next_f64("SPEED")?;
        fields.finish()?;
        Ok(Self {
            cmd_speed,
            dtd,
            speed,
        })
    }
}

/// Walks a comma-separated `KEY:value` list, enforcing key order
struct FieldReader<'a> {
    parts: std::str::Split<'a, char>,
}

impl<'a> FieldReader<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            parts: input.split(','),
        }
    }

    fn next_str(&mut self, key: &'static str) -> Result<&'a str, ProtocolError> {
        let part = self.parts.next().ok_or(ProtocolError::MissingField(key))?;
        let (found, value) = part
            .split_once(':')
            .ok_or(ProtocolError::MissingField(key))?;
        if found != key {
            return Err(ProtocolError::UnexpectedKey {
                expected: key,
                found: found.to_string(),
            });
        }
        Ok(value)
    }

    fn next_f64(&mut self, key: &'static str) -> Result<f64, ProtocolError> {
        let value = self.next_str(key)?;
        value
            .parse::<f64>()
            .map_err(|_| ProtocolError::InvalidNumber {
                field: key,
                value: value.to_string(),
            })
    }

    fn next_usize(&mut self, key: &'static str) -> Result<usize, ProtocolError> {
        let value = self.next_str(key)?;
        value
            .parse::<usize>()
            .map_err(|_| ProtocolError::InvalidNumber {
                field: key,
                value: value.to_string(),
            })
    }

    fn finish(mut self) -> Result<(), ProtocolError> {
        match self.parts.next() {
            None => Ok(()),
            Some(extra) => Err(ProtocolError::TrailingInput(extra.to_string())),
        }
    }
}
