//! Bit-exact binary header/state codec (spec §6): explicit little-endian
//! `u32`/`u64` fields, no generic serializer — the layout is fixed and
//! externally specified, the same way the teacher hand-rolls
//! `write_atomic` for its own on-disk DAG format rather than reaching for
//! one.

use super::State;
use crate::error::CheckpointError;
use crate::record::{BinarySubtype, Record, Variant};

const MAGIC: &[u8; 4] = b"KaRL";
const VERSION: u32 = 1;

#[derive(Debug, Clone)]
pub struct Header {
    pub version: u32,
    pub originator: String,
    pub states: u64,
    pub initial_clock: u64,
    pub last_clock: u64,
    pub initial_toi: u64,
    pub last_toi: u64,
    pub buffer_filter_tag: String,
}

fn variant_tag(v: &Variant) -> u32 {
    match v {
        Variant::Empty => 0,
        Variant::Integer(_) => 1,
        Variant::Double(_) => 2,
        Variant::String(_) => 3,
        Variant::IntegerArray(_) => 4,
        Variant::DoubleArray(_) => 5,
        Variant::Binary(..) => 6,
        Variant::Any(_) => 7,
    }
}

fn encode_payload(v: &Variant) -> Vec<u8> {
    match v {
        Variant::Empty => vec![],
        Variant::Integer(n) => n.to_le_bytes().to_vec(),
        Variant::Double(d) => d.to_le_bytes().to_vec(),
        Variant::String(s) => s.as_bytes().to_vec(),
        Variant::IntegerArray(a) => {
            let mut out = (a.len() as u32).to_le_bytes().to_vec();
            for n in a {
                out.extend_from_slice(&n.to_le_bytes());
            }
            out
        }
        Variant::DoubleArray(a) => {
            let mut out = (a.len() as u32).to_le_bytes().to_vec();
            for n in a {
                out.extend_from_slice(&n.to_le_bytes());
            }
            out
        }
        Variant::Binary(bytes, subtype) => {
            let mut out = vec![*subtype as u8];
            out.extend_from_slice(bytes);
            out
        }
        Variant::Any(payload) => {
            let tag = payload.tag();
            let data = payload.to_bytes();
            let mut out = (tag.len() as u32).to_le_bytes().to_vec();
            out.extend_from_slice(tag.as_bytes());
            out.extend_from_slice(&data);
            out
        }
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], CheckpointError> {
        if self.pos + n > self.bytes.len() {
            return Err(CheckpointError::Truncated {
                expected: self.pos + n - self.bytes.len(),
            });
        }
        let slice = &self.bytes[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    fn u32(&mut self) -> Result<u32, CheckpointError> {
        Ok(u32::from_le_bytes(self.take(4)?.try_into().unwrap()))
    }

    fn u64(&mut self) -> Result<u64, CheckpointError> {
        Ok(u64::from_le_bytes(self.take(8)?.try_into().unwrap()))
    }

    fn string(&mut self, len: usize) -> Result<String, CheckpointError> {
        String::from_utf8(self.take(len)?.to_vec()).map_err(|_| CheckpointError::InvalidUtf8)
    }
}

fn decode_variant(tag: u32, payload: &[u8]) -> Result<Variant, CheckpointError> {
    match tag {
        0 => Ok(Variant::Empty),
        1 => {
            let arr: [u8; 8] = payload.try_into().map_err(|_| CheckpointError::Truncated { expected: 8 })?;
            Ok(Variant::Integer(i64::from_le_bytes(arr)))
        }
        2 => {
            let arr: [u8; 8] = payload.try_into().map_err(|_| CheckpointError::Truncated { expected: 8 })?;
            Ok(Variant::Double(f64::from_le_bytes(arr)))
        }
        3 => Ok(Variant::String(
            String::from_utf8(payload.to_vec()).map_err(|_| CheckpointError::InvalidUtf8)?,
        )),
        4 => {
            let mut r = Reader::new(payload);
            let n = r.u32()? as usize;
            let mut arr = Vec::with_capacity(n);
            for _ in 0..n {
                arr.push(i64::from_le_bytes(r.take(8)?.try_into().unwrap()));
            }
            Ok(Variant::IntegerArray(arr))
        }
        5 => {
            let mut r = Reader::new(payload);
            let n = r.u32()? as usize;
            let mut arr = Vec::with_capacity(n);
            for _ in 0..n {
                arr.push(f64::from_le_bytes(r.take(8)?.try_into().unwrap()));
            }
            Ok(Variant::DoubleArray(arr))
        }
        6 => {
            if payload.is_empty() {
                return Ok(Variant::Binary(vec![], BinarySubtype::Raw));
            }
            let subtype = match payload[0] {
                0 => BinarySubtype::Raw,
                1 => BinarySubtype::Jpeg,
                2 => BinarySubtype::Text,
                3 => BinarySubtype::Xml,
                _ => BinarySubtype::UnknownFile,
            };
            Ok(Variant::Binary(payload[1..].to_vec(), subtype))
        }
        7 => {
            let mut r = Reader::new(payload);
            let tag_len = r.u32()? as usize;
            let tag = r.string(tag_len)?;
            let bytes = payload[r.pos..].to_vec();
            Ok(Variant::Any(crate::record::any::AnyPayload::Raw { tag, bytes }))
        }
        other => Err(CheckpointError::InvalidRecordType(other)),
    }
}

/// Serializes `states` into the bit-exact layout of spec §6.
pub fn write_checkpoint(originator: &str, buffer_filter_tag: &str, states: &[State]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&VERSION.to_le_bytes());
    out.extend_from_slice(&(originator.len() as u32).to_le_bytes());
    out.extend_from_slice(originator.as_bytes());
    out.extend_from_slice(&(states.len() as u64).to_le_bytes());

    let all_clocks: Vec<u64> = states.iter().flat_map(|s| s.records.iter().map(|(_, r)| r.clock)).collect();
    let all_tois: Vec<u64> = states.iter().flat_map(|s| s.records.iter().map(|(_, r)| r.toi)).collect();
    let initial_clock = all_clocks.iter().min().copied().unwrap_or(0);
    let last_clock = all_clocks.iter().max().copied().unwrap_or(0);
    let initial_toi = all_tois.iter().min().copied().unwrap_or(0);
    let last_toi = all_tois.iter().max().copied().unwrap_or(0);

    out.extend_from_slice(&initial_clock.to_le_bytes());
    out.extend_from_slice(&last_clock.to_le_bytes());
    out.extend_from_slice(&initial_toi.to_le_bytes());
    out.extend_from_slice(&last_toi.to_le_bytes());
    out.extend_from_slice(&(buffer_filter_tag.len() as u32).to_le_bytes());
    out.extend_from_slice(buffer_filter_tag.as_bytes());

    for state in states {
        let mut body = Vec::new();
        body.extend_from_slice(&(state.records.len() as u32).to_le_bytes());
        for (name, record) in &state.records {
            body.extend_from_slice(&(name.len() as u32).to_le_bytes());
            body.extend_from_slice(name.as_bytes());
            body.extend_from_slice(&variant_tag(record.variant()).to_le_bytes());
            body.extend_from_slice(&record.clock.to_le_bytes());
            body.extend_from_slice(&record.toi.to_le_bytes());
            body.extend_from_slice(&record.quality.to_le_bytes());
            let payload = encode_payload(record.variant());
            body.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            body.extend_from_slice(&payload);
        }
        out.extend_from_slice(&(body.len() as u64).to_le_bytes());
        out.extend_from_slice(&body);
    }
    out
}

pub fn read_checkpoint(bytes: &[u8]) -> Result<(Header, Vec<State>), CheckpointError> {
    let mut r = Reader::new(bytes);
    if r.take(4)? != MAGIC {
        return Err(CheckpointError::BadMagic);
    }
    let version = r.u32()?;
    if version != VERSION {
        return Err(CheckpointError::UnsupportedVersion(version));
    }
    let originator_len = r.u32()? as usize;
    let originator = r.string(originator_len)?;
    let state_count = r.u64()?;
    let initial_clock = r.u64()?;
    let last_clock = r.u64()?;
    let initial_toi = r.u64()?;
    let last_toi = r.u64()?;
    let tag_len = r.u32()? as usize;
    let buffer_filter_tag = r.string(tag_len)?;

    let header = Header {
        version,
        originator,
        states: state_count,
        initial_clock,
        last_clock,
        initial_toi,
        last_toi,
        buffer_filter_tag,
    };

    let mut states = Vec::with_capacity(state_count as usize);
    for _ in 0..state_count {
        let _state_size = r.u64()?;
        let record_count = r.u32()?;
        let mut records = Vec::with_capacity(record_count as usize);
        for _ in 0..record_count {
            let name_len = r.u32()? as usize;
            let name = r.string(name_len)?;
            let tag = r.u32()?;
            let clock = r.u64()?;
            let toi = r.u64()?;
            let quality = r.u32()?;
            let size = r.u32()? as usize;
            let payload = r.take(size)?;
            let variant = decode_variant(tag, payload)?;
            let mut record = Record::new();
            record.set(variant);
            record.clock = clock;
            record.toi = toi;
            record.quality = quality;
            record.write_quality = quality;
            records.push((name, record));
        }
        states.push(State { records });
    }
    Ok((header, states))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_scalar_and_array_variants() {
        let records = vec![
            ("x".to_string(), Record::integer(42)),
            ("arr".to_string(), Record::integer_array(vec![1, 2, 3])),
            ("s".to_string(), Record::string("hi")),
        ];
        let state = State { records };
        let bytes = write_checkpoint("agent-a", "", std::slice::from_ref(&state));
        let (header, states) = read_checkpoint(&bytes).unwrap();
        assert_eq!(header.originator, "agent-a");
        assert_eq!(states[0].records.len(), 3);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let err = read_checkpoint(b"xxxxxxxx").unwrap_err();
        assert!(matches!(err, CheckpointError::BadMagic));
    }

    #[test]
    fn truncated_input_reports_expected_bytes() {
        let err = read_checkpoint(b"KaRL").unwrap_err();
        assert!(matches!(err, CheckpointError::Truncated { .. }));
    }
}
