//! Length-tagged binary framing (spec.md §6): one tag byte per value,
//! big-endian payloads. Selected per-connection by a handshake byte; this
//! module only knows how to write the frame, not how the handshake picks it.

const TAG_UINT8: u8 = 0x01;
const TAG_INT32: u8 = 0x02;
const TAG_INT64: u8 = 0x03;
const TAG_FLOAT: u8 = 0x04;
const TAG_FIXSTR: u8 = 0x05;
const TAG_STR32: u8 = 0x06;
const TAG_MAP16: u8 = 0x07;

const FIXSTR_MAX_LEN: usize = 31;

#[derive(Default)]
pub struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_uint8(&mut self, v: u8) -> &mut Self {
        self.buf.push(TAG_UINT8);
        self.buf.push(v);
        self
    }

    pub fn write_int32(&mut self, v: i32) -> &mut Self {
        self.buf.push(TAG_INT32);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_int64(&mut self, v: i64) -> &mut Self {
        self.buf.push(TAG_INT64);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    pub fn write_float(&mut self, v: f32) -> &mut Self {
        self.buf.push(TAG_FLOAT);
        self.buf.extend_from_slice(&v.to_be_bytes());
        self
    }

    /// Writes a string, choosing `fixstr` when it fits in 31 bytes and
    /// `str32` otherwise.
    pub fn write_str(&mut self, s: &str) -> &mut Self {
        let bytes = s.as_bytes();
        if bytes.len() <= FIXSTR_MAX_LEN {
            self.buf.push(TAG_FIXSTR);
            self.buf.push(bytes.len() as u8);
            self.buf.extend_from_slice(bytes);
        } else {
            self.buf.push(TAG_STR32);
            self.buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            self.buf.extend_from_slice(bytes);
        }
        self
    }

    /// Writes a `map16` header; the caller writes `count` key/value pairs
    /// immediately afterward with no further framing between them.
    pub fn write_map_header(&mut self, count: u16) -> &mut Self {
        self.buf.push(TAG_MAP16);
        self.buf.extend_from_slice(&count.to_be_bytes());
        self
    }
}

#[derive(Debug, PartialEq)]
pub enum Value {
    U8(u8),
    I32(i32),
    I64(i64),
    F32(f32),
    Str(String),
}

/// Encodes `entries` as a `map16` of string keys to tagged values — the
/// shape every read-side handler in this module's sibling aggregators
/// produces for the binary framing.
pub fn encode_map(entries: &[(&str, Value)]) -> Vec<u8> {
    let mut enc = Encoder::new();
    enc.write_map_header(entries.len() as u16);
    for (key, value) in entries {
        enc.write_str(key);
        match value {
            Value::U8(v) => enc.write_uint8(*v),
            Value::I32(v) => enc.write_int32(*v),
            Value::I64(v) => enc.write_int64(*v),
            Value::F32(v) => enc.write_float(*v),
            Value::Str(v) => enc.write_str(v),
        };
    }
    enc.into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uint8_round_trips_tag_and_value() {
        let mut enc = Encoder::new();
        enc.write_uint8(200);
        assert_eq!(enc.into_bytes(), vec![TAG_UINT8, 200]);
    }

    #[test]
    fn int64_is_big_endian() {
        let mut enc = Encoder::new();
        enc.write_int64(1);
        let bytes = enc.into_bytes();
        assert_eq!(bytes[0], TAG_INT64);
        assert_eq!(&bytes[1..], &1i64.to_be_bytes());
    }

    #[test]
    fn short_string_uses_fixstr() {
        let mut enc = Encoder::new();
        enc.write_str("example.com");
        let bytes = enc.into_bytes();
        assert_eq!(bytes[0], TAG_FIXSTR);
        assert_eq!(bytes[1], 11);
    }

    #[test]
    fn long_string_uses_str32() {
        let long = "a".repeat(64);
        let mut enc = Encoder::new();
        enc.write_str(&long);
        let bytes = enc.into_bytes();
        assert_eq!(bytes[0], TAG_STR32);
        assert_eq!(u32::from_be_bytes(bytes[1..5].try_into().unwrap()), 64);
    }

    #[test]
    fn encode_map_writes_header_then_pairs() {
        let bytes = encode_map(&[("total", Value::I64(5))]);
        assert_eq!(bytes[0], TAG_MAP16);
        assert_eq!(u16::from_be_bytes(bytes[1..3].try_into().unwrap()), 1);
    }
}
