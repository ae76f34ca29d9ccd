//! OSC message codec.
//!
//! Frames follow the OSC 1.0 layout: a null-terminated address string, a
//! type tag string starting with `,`, then the big-endian argument payload.
//! Every string is padded with nulls to a 4-byte boundary.
//!
//! Supported tags: `i` (int32), `f` (float32), `s` (string) and float arrays
//! written as `[f...]`. Incoming `d` (float64) values are accepted and narrowed
//! to float32 since the engine never needs the extra precision.

use std::fmt;

use crate::error::{Error, Result};

/// A single typed OSC argument.
#[derive(Debug, Clone, PartialEq)]
pub enum OscArg {
    Int(i32),
    Float(f32),
    Str(String),
    FloatArray(Vec<f32>),
}

impl OscArg {
    /// Numeric view of the argument, if it has one.
    pub fn as_f32(&self) -> Option<f32> {
        match self {
            OscArg::Int(v) => Some(*v as f32),
            OscArg::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Interpret the argument as an identifier (path and solution ids).
    ///
    /// Integral floats are printed without a fraction so that `5`, `5.0`
    /// and `"5"` all name the same path.
    pub fn as_id(&self) -> Option<String> {
        match self {
            OscArg::Int(v) => Some(v.to_string()),
            OscArg::Float(v) if v.fract() == 0.0 && v.is_finite() => Some(format!("{}", *v as i64)),
            OscArg::Float(v) => Some(v.to_string()),
            OscArg::Str(s) => Some(s.clone()),
            OscArg::FloatArray(_) => None,
        }
    }

    fn push_tags(&self, tags: &mut String) {
        match self {
            OscArg::Int(_) => tags.push('i'),
            OscArg::Float(_) => tags.push('f'),
            OscArg::Str(_) => tags.push('s'),
            OscArg::FloatArray(values) => {
                tags.push('[');
                for _ in values {
                    tags.push('f');
                }
                tags.push(']');
            }
        }
    }

    fn write_payload(&self, out: &mut Vec<u8>) {
        match self {
            OscArg::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscArg::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
            OscArg::Str(s) => write_padded_str(out, s),
            OscArg::FloatArray(values) => {
                for v in values {
                    out.extend_from_slice(&v.to_be_bytes());
                }
            }
        }
    }
}

impl From<i32> for OscArg {
    fn from(v: i32) -> Self {
        OscArg::Int(v)
    }
}

impl From<f32> for OscArg {
    fn from(v: f32) -> Self {
        OscArg::Float(v)
    }
}

impl From<&str> for OscArg {
    fn from(v: &str) -> Self {
        OscArg::Str(v.to_string())
    }
}

impl From<String> for OscArg {
    fn from(v: String) -> Self {
        OscArg::Str(v)
    }
}

impl From<Vec<f32>> for OscArg {
    fn from(v: Vec<f32>) -> Self {
        OscArg::FloatArray(v)
    }
}

impl fmt::Display for OscArg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OscArg::Int(v) => write!(f, "{}", v),
            OscArg::Float(v) => write!(f, "{}", v),
            OscArg::Str(s) => f.write_str(s),
            OscArg::FloatArray(values) => {
                let parts: Vec<String> = values.iter().map(|v| v.to_string()).collect();
                write!(f, "[{}]", parts.join(" "))
            }
        }
    }
}

/// An addressed OSC message.
#[derive(Debug, Clone, PartialEq)]
pub struct OscMessage {
    pub address: String,
    pub args: Vec<OscArg>,
}

impl OscMessage {
    pub fn new(address: impl Into<String>, args: Vec<OscArg>) -> Self {
        Self {
            address: address.into(),
            args,
        }
    }

    /// Type tag string for the arguments, including the leading comma.
    pub fn type_tags(&self) -> String {
        let mut tags = String::from(",");
        for arg in &self.args {
            arg.push_tags(&mut tags);
        }
        tags
    }

    pub fn encode(&self) -> Vec<u8> {
        encode(&self.address, &self.args)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        decode(bytes)
    }
}

/// Encode an address and argument list into a single OSC frame.
pub fn encode(address: &str, args: &[OscArg]) -> Vec<u8> {
    let mut out = Vec::with_capacity(padded_len(address.len()) + 8 + args.len() * 4);
    write_padded_str(&mut out, address);

    let mut tags = String::from(",");
    for arg in args {
        arg.push_tags(&mut tags);
    }
    write_padded_str(&mut out, &tags);

    for arg in args {
        arg.write_payload(&mut out);
    }
    out
}

/// Decode one OSC frame.
///
/// Fails with [`Error::MalformedMessage`] when the frame is truncated, when a
/// tag has no matching payload, or when payload bytes are left over once all
/// tags are consumed.
pub fn decode(bytes: &[u8]) -> Result<OscMessage> {
    let mut reader = Reader { bytes, pos: 0 };

    let address = reader.read_str()?;
    if address.starts_with("#bundle") {
        return Err(Error::MalformedMessage("OSC bundles are not supported".to_string()));
    }
    if !address.starts_with('/') {
        return Err(Error::MalformedMessage(format!(
            "address '{}' does not start with '/'",
            address
        )));
    }

    // A frame that stops right after the address carries no arguments.
    if reader.remaining() == 0 {
        return Ok(OscMessage::new(address, Vec::new()));
    }

    let tags = reader.read_str()?;
    let Some(tags) = tags.strip_prefix(',') else {
        return Err(Error::MalformedMessage(format!(
            "type tag string '{}' does not start with ','",
            tags
        )));
    };

    let mut args = Vec::with_capacity(tags.len());
    let mut array: Option<Vec<f32>> = None;
    for tag in tags.chars() {
        match (tag, array.as_mut()) {
            ('[', None) => array = Some(Vec::new()),
            ('[', Some(_)) => {
                return Err(Error::MalformedMessage("nested arrays are not supported".to_string()))
            }
            (']', Some(_)) => {
                if let Some(values) = array.take() {
                    args.push(OscArg::FloatArray(values));
                }
            }
            (']', None) => {
                return Err(Error::MalformedMessage("unbalanced ']' in type tags".to_string()))
            }
            ('f', Some(values)) => values.push(reader.read_f32()?),
            ('d', Some(values)) => values.push(reader.read_f64()? as f32),
            (other, Some(_)) => {
                return Err(Error::MalformedMessage(format!(
                    "unsupported array element tag '{}'",
                    other
                )))
            }
            ('i', None) => args.push(OscArg::Int(reader.read_i32()?)),
            ('f', None) => args.push(OscArg::Float(reader.read_f32()?)),
            ('d', None) => args.push(OscArg::Float(reader.read_f64()? as f32)),
            ('s', None) => args.push(OscArg::Str(reader.read_str()?)),
            (other, None) => {
                return Err(Error::MalformedMessage(format!("unsupported type tag '{}'", other)))
            }
        }
    }

    if array.is_some() {
        return Err(Error::MalformedMessage("unterminated array in type tags".to_string()));
    }
    if reader.remaining() != 0 {
        return Err(Error::MalformedMessage(format!(
            "{} trailing bytes after {} arguments",
            reader.remaining(),
            args.len()
        )));
    }

    Ok(OscMessage::new(address, args))
}

/// Length of a string once null-terminated and padded to 4 bytes.
fn padded_len(len: usize) -> usize {
    (len + 4) & !3
}

fn write_padded_str(out: &mut Vec<u8>, s: &str) {
    out.extend_from_slice(s.as_bytes());
    let pad = padded_len(s.len()) - s.len();
    out.extend(std::iter::repeat(0u8).take(pad));
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::MalformedMessage(format!(
                "truncated frame: needed {} bytes at offset {}, {} left",
                n,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn read_str(&mut self) -> Result<String> {
        let rest = &self.bytes[self.pos..];
        let Some(nul) = rest.iter().position(|&b| b == 0) else {
            return Err(Error::MalformedMessage(format!(
                "unterminated string at offset {}",
                self.pos
            )));
        };
        let s = std::str::from_utf8(&rest[..nul])
            .map_err(|e| Error::MalformedMessage(format!("invalid UTF-8 string: {}", e)))?
            .to_string();
        self.take(padded_len(nul))?;
        Ok(s)
    }

    fn read_word(&mut self) -> Result<[u8; 4]> {
        let mut word = [0u8; 4];
        word.copy_from_slice(self.take(4)?);
        Ok(word)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_be_bytes(self.read_word()?))
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_be_bytes(self.read_word()?))
    }

    fn read_f64(&mut self) -> Result<f64> {
        let mut word = [0u8; 8];
        word.copy_from_slice(self.take(8)?);
        Ok(f64::from_be_bytes(word))
    }
}
