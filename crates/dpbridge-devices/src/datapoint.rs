//! Datapoint codec.
//!
//! Vendor MCUs tunnel typed key/value "datapoints" through a single
//! manufacturer-specific command. A frame is a two byte header followed by
//! one or more records:
//!
//! ```text
//! sequence(1) | status(1) | dp_id(1) type(1) length(2, BE) payload(length) | ...
//! ```
//!
//! Everything here is pure: decoding the same bytes twice always yields the
//! same records, and a frame either decodes completely or not at all.

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize, Serializer};

/// Size of a record header: id, type tag and a 16-bit length.
pub const RECORD_HEADER_LEN: usize = 4;

/// Size of the frame header preceding the records.
pub const FRAME_HEADER_LEN: usize = 2;

/// Datapoint type tag as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum DatapointType {
    /// Opaque bytes
    Raw = 0x00,
    /// One byte, nonzero is true
    Bool = 0x01,
    /// 4-byte big-endian signed integer
    Value = 0x02,
    /// UTF-8 text of the declared length
    String = 0x03,
    /// One byte numeric code
    Enum = 0x04,
    /// 1 to 4 bytes of big-endian bit flags
    Bitmap = 0x05,
}

impl DatapointType {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x00 => Some(Self::Raw),
            0x01 => Some(Self::Bool),
            0x02 => Some(Self::Value),
            0x03 => Some(Self::String),
            0x04 => Some(Self::Enum),
            0x05 => Some(Self::Bitmap),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Bool => "bool",
            Self::Value => "value",
            Self::String => "string",
            Self::Enum => "enum",
            Self::Bitmap => "bitmap",
        }
    }
}

impl std::fmt::Display for DatapointType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Decoded payload of a datapoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DatapointValue {
    Raw(Vec<u8>),
    Bool(bool),
    Value(i32),
    String(String),
    Enum(u8),
    /// Flags plus the number of bytes they occupy on the wire
    Bitmap { bits: u32, width: u8 },
}

impl DatapointValue {
    pub fn dp_type(&self) -> DatapointType {
        match self {
            Self::Raw(_) => DatapointType::Raw,
            Self::Bool(_) => DatapointType::Bool,
            Self::Value(_) => DatapointType::Value,
            Self::String(_) => DatapointType::String,
            Self::Enum(_) => DatapointType::Enum,
            Self::Bitmap { .. } => DatapointType::Bitmap,
        }
    }

    /// Numeric view for value, enum, bool and bitmap datapoints.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Value(v) => Some(i64::from(*v)),
            Self::Enum(v) => Some(i64::from(*v)),
            Self::Bool(v) => Some(i64::from(*v)),
            Self::Bitmap { bits, .. } => Some(i64::from(*bits)),
            Self::Raw(_) | Self::String(_) => None,
        }
    }

    /// Bitmap with the narrowest width that holds `bits`.
    pub fn bitmap(bits: u32) -> Self {
        let width = if bits <= 0xFF {
            1
        } else if bits <= 0xFFFF {
            2
        } else {
            4
        };
        Self::Bitmap { bits, width }
    }

    fn encoded_payload(&self) -> Result<Vec<u8>, EncodeError> {
        Ok(match self {
            Self::Raw(bytes) => bytes.clone(),
            Self::Bool(v) => vec![u8::from(*v)],
            Self::Value(v) => v.to_be_bytes().to_vec(),
            Self::String(s) => s.as_bytes().to_vec(),
            Self::Enum(v) => vec![*v],
            Self::Bitmap { bits, width } => {
                let width = usize::from(*width);
                if !(1..=4).contains(&width) || (width < 4 && *bits >> (width * 8) != 0) {
                    return Err(EncodeError::InvalidBitmap {
                        bits: *bits,
                        width: width as u8,
                    });
                }
                bits.to_be_bytes()[4 - width..].to_vec()
            }
        })
    }
}

/// One datapoint as read off the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatapointRecord {
    pub id: u8,
    pub dp_type: DatapointType,
    #[serde(serialize_with = "serialize_hex")]
    pub payload: Vec<u8>,
    pub value: DatapointValue,
}

impl DatapointRecord {
    /// Build a record from a value, computing its wire payload.
    pub fn new(id: u8, value: DatapointValue) -> Result<Self, EncodeError> {
        let payload = value.encoded_payload()?;
        check_length(id, payload.len())?;
        Ok(Self {
            id,
            dp_type: value.dp_type(),
            payload,
            value,
        })
    }

    /// Encoded size of this record including its header.
    pub fn encoded_len(&self) -> usize {
        RECORD_HEADER_LEN + self.payload.len()
    }

    fn write_to(&self, buf: &mut BytesMut) {
        buf.put_u8(self.id);
        buf.put_u8(self.dp_type.tag());
        buf.put_u16(self.payload.len() as u16);
        buf.put_slice(&self.payload);
    }
}

pub(crate) fn serialize_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

/// Errors raised while decoding datapoints. Any of them rejects the whole frame.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("Frame too short: {0} bytes")]
    FrameTooShort(usize),

    #[error("Frame carries no datapoints")]
    EmptyFrame,

    #[error("Truncated datapoint header at offset {offset}: {remaining} bytes remain")]
    TruncatedHeader { offset: usize, remaining: usize },

    #[error("Truncated payload for datapoint {dp_id}: declared {declared} bytes, {remaining} remain")]
    TruncatedPayload {
        dp_id: u8,
        declared: usize,
        remaining: usize,
    },

    #[error("Unknown type tag 0x{tag:02x} for datapoint {dp_id}")]
    UnknownType { dp_id: u8, tag: u8 },

    #[error("Invalid length {length} for {dp_type} datapoint {dp_id}")]
    InvalidLength {
        dp_id: u8,
        dp_type: DatapointType,
        length: usize,
    },

    #[error("Datapoint {dp_id} string is not valid UTF-8")]
    InvalidUtf8 { dp_id: u8 },
}

/// Errors raised while encoding datapoints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EncodeError {
    #[error("Datapoint {dp_id} declared as {expected} but value is {found}")]
    TypeMismatch {
        dp_id: u8,
        expected: DatapointType,
        found: DatapointType,
    },

    #[error("Datapoint {dp_id} payload of {length} bytes exceeds the 16-bit length field")]
    PayloadTooLarge { dp_id: u8, length: usize },

    #[error("Bitmap {bits:#x} does not fit in {width} bytes")]
    InvalidBitmap { bits: u32, width: u8 },
}

fn check_length(dp_id: u8, length: usize) -> Result<(), EncodeError> {
    if length > usize::from(u16::MAX) {
        return Err(EncodeError::PayloadTooLarge { dp_id, length });
    }
    Ok(())
}

/// Decode records back-to-back until the buffer is exhausted.
///
/// An empty buffer yields no records.
pub fn decode(raw: &[u8]) -> Result<Vec<DatapointRecord>, DecodeError> {
    let mut buf = raw;
    let mut records = Vec::new();

    while buf.has_remaining() {
        let offset = raw.len() - buf.remaining();
        if buf.remaining() < RECORD_HEADER_LEN {
            return Err(DecodeError::TruncatedHeader {
                offset,
                remaining: buf.remaining(),
            });
        }

        let id = buf.get_u8();
        let tag = buf.get_u8();
        let length = usize::from(buf.get_u16());

        if buf.remaining() < length {
            return Err(DecodeError::TruncatedPayload {
                dp_id: id,
                declared: length,
                remaining: buf.remaining(),
            });
        }
        let payload = buf[..length].to_vec();
        buf.advance(length);

        let dp_type =
            DatapointType::from_tag(tag).ok_or(DecodeError::UnknownType { dp_id: id, tag })?;
        let value = decode_payload(id, dp_type, &payload)?;

        records.push(DatapointRecord {
            id,
            dp_type,
            payload,
            value,
        });
    }

    Ok(records)
}

fn decode_payload(
    dp_id: u8,
    dp_type: DatapointType,
    payload: &[u8],
) -> Result<DatapointValue, DecodeError> {
    let invalid_length = || DecodeError::InvalidLength {
        dp_id,
        dp_type,
        length: payload.len(),
    };

    match dp_type {
        DatapointType::Raw => Ok(DatapointValue::Raw(payload.to_vec())),
        DatapointType::Bool => match payload {
            [b] => Ok(DatapointValue::Bool(*b != 0)),
            _ => Err(invalid_length()),
        },
        DatapointType::Value => match payload {
            [a, b, c, d] => Ok(DatapointValue::Value(i32::from_be_bytes([*a, *b, *c, *d]))),
            _ => Err(invalid_length()),
        },
        DatapointType::String => std::str::from_utf8(payload)
            .map(|s| DatapointValue::String(s.to_string()))
            .map_err(|_| DecodeError::InvalidUtf8 { dp_id }),
        DatapointType::Enum => match payload {
            [b] => Ok(DatapointValue::Enum(*b)),
            _ => Err(invalid_length()),
        },
        DatapointType::Bitmap => {
            if payload.is_empty() || payload.len() > 4 {
                return Err(invalid_length());
            }
            let bits = payload
                .iter()
                .fold(0u32, |acc, byte| (acc << 8) | u32::from(*byte));
            Ok(DatapointValue::Bitmap {
                bits,
                width: payload.len() as u8,
            })
        }
    }
}

/// Encode one record. The declared type must agree with the value.
pub fn encode(id: u8, dp_type: DatapointType, value: &DatapointValue) -> Result<Vec<u8>, EncodeError> {
    if value.dp_type() != dp_type {
        return Err(EncodeError::TypeMismatch {
            dp_id: id,
            expected: dp_type,
            found: value.dp_type(),
        });
    }
    encode_records(&[DatapointRecord::new(id, value.clone())?])
}

/// Encode records back-to-back, the inverse of [`decode`].
pub fn encode_records(records: &[DatapointRecord]) -> Result<Vec<u8>, EncodeError> {
    let mut buf = BytesMut::with_capacity(records.iter().map(|r| r.encoded_len()).sum());
    for record in records {
        check_length(record.id, record.payload.len())?;
        record.write_to(&mut buf);
    }
    Ok(buf.to_vec())
}

/// A complete "set/report datapoint" frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct McuFrame {
    pub sequence: u8,
    pub status: u8,
    pub records: Vec<DatapointRecord>,
}

impl McuFrame {
    /// Decode a frame. At least one record must follow the header.
    pub fn decode(raw: &[u8]) -> Result<Self, DecodeError> {
        if raw.len() < FRAME_HEADER_LEN {
            return Err(DecodeError::FrameTooShort(raw.len()));
        }
        let records = decode(&raw[FRAME_HEADER_LEN..])?;
        if records.is_empty() {
            return Err(DecodeError::EmptyFrame);
        }
        Ok(Self {
            sequence: raw[0],
            status: raw[1],
            records,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, EncodeError> {
        let records = encode_records(&self.records)?;
        Ok(frame_payload(u16::from(self.sequence), self.status, &records))
    }
}

/// Prefix already-encoded records with a frame header.
///
/// Only the low byte of the session sequence fits in the frame.
pub fn frame_payload(sequence: u16, status: u8, records: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(FRAME_HEADER_LEN + records.len());
    buf.put_u8((sequence & 0xFF) as u8);
    buf.put_u8(status);
    buf.put_slice(records);
    buf.to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_value_record() {
        let raw = [0x67, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0xfa];
        let records = decode(&raw).unwrap();

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, 103);
        assert_eq!(records[0].dp_type, DatapointType::Value);
        assert_eq!(records[0].payload, vec![0x00, 0x00, 0x00, 0xfa]);
        assert_eq!(records[0].value, DatapointValue::Value(250));
    }

    #[test]
    fn test_decode_value_is_signed() {
        let raw = [0x1b, 0x02, 0x00, 0x04, 0xff, 0xff, 0xff, 0xf9];
        let records = decode(&raw).unwrap();
        assert_eq!(records[0].value, DatapointValue::Value(-7));
    }

    #[test]
    fn test_decode_multiple_records_in_order() {
        let raw = [
            0x08, 0x01, 0x00, 0x01, 0x01, // dp 8 bool true
            0x65, 0x04, 0x00, 0x01, 0x02, // dp 101 enum 2
            0x10, 0x03, 0x00, 0x02, b'o', b'k', // dp 16 string
            0x11, 0x05, 0x00, 0x02, 0x01, 0x02, // dp 17 bitmap
            0x12, 0x00, 0x00, 0x00, // dp 18 empty raw
        ];
        let records = decode(&raw).unwrap();

        let ids: Vec<u8> = records.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![8, 101, 16, 17, 18]);
        assert_eq!(records[0].value, DatapointValue::Bool(true));
        assert_eq!(records[1].value, DatapointValue::Enum(2));
        assert_eq!(records[2].value, DatapointValue::String("ok".to_string()));
        assert_eq!(
            records[3].value,
            DatapointValue::Bitmap {
                bits: 0x0102,
                width: 2
            }
        );
        assert_eq!(records[4].value, DatapointValue::Raw(vec![]));
    }

    #[test]
    fn test_decode_empty_buffer() {
        assert!(decode(&[]).unwrap().is_empty());
    }

    #[test]
    fn test_truncated_header_rejects_frame() {
        let raw = [0x08, 0x01, 0x00, 0x01, 0x01, 0x65, 0x04];
        assert_eq!(
            decode(&raw),
            Err(DecodeError::TruncatedHeader {
                offset: 5,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_truncated_payload_rejects_frame() {
        let raw = [0x67, 0x02, 0x00, 0x04, 0x00, 0x00];
        assert_eq!(
            decode(&raw),
            Err(DecodeError::TruncatedPayload {
                dp_id: 0x67,
                declared: 4,
                remaining: 2
            })
        );
    }

    #[test]
    fn test_unknown_type_tag() {
        let raw = [0x01, 0x09, 0x00, 0x01, 0x00];
        assert_eq!(
            decode(&raw),
            Err(DecodeError::UnknownType { dp_id: 1, tag: 9 })
        );
    }

    #[test]
    fn test_wrong_length_for_type() {
        let raw = [0x01, 0x02, 0x00, 0x02, 0x00, 0x01];
        assert!(matches!(
            decode(&raw),
            Err(DecodeError::InvalidLength {
                dp_type: DatapointType::Value,
                length: 2,
                ..
            })
        ));
    }

    #[test]
    fn test_invalid_utf8() {
        let raw = [0x01, 0x03, 0x00, 0x02, 0xff, 0xfe];
        assert_eq!(decode(&raw), Err(DecodeError::InvalidUtf8 { dp_id: 1 }));
    }

    #[test]
    fn test_encode_value() {
        let bytes = encode(103, DatapointType::Value, &DatapointValue::Value(250)).unwrap();
        assert_eq!(bytes, vec![0x67, 0x02, 0x00, 0x04, 0x00, 0x00, 0x00, 0xfa]);
    }

    #[test]
    fn test_encode_type_mismatch() {
        let err = encode(1, DatapointType::Enum, &DatapointValue::Bool(true)).unwrap_err();
        assert_eq!(
            err,
            EncodeError::TypeMismatch {
                dp_id: 1,
                expected: DatapointType::Enum,
                found: DatapointType::Bool
            }
        );
    }

    #[test]
    fn test_encode_bitmap_width() {
        let bytes = encode(
            5,
            DatapointType::Bitmap,
            &DatapointValue::Bitmap {
                bits: 0x0001,
                width: 2,
            },
        )
        .unwrap();
        assert_eq!(bytes, vec![0x05, 0x05, 0x00, 0x02, 0x00, 0x01]);

        assert!(matches!(
            encode(
                5,
                DatapointType::Bitmap,
                &DatapointValue::Bitmap { bits: 0x1ff, width: 1 }
            ),
            Err(EncodeError::InvalidBitmap { .. })
        ));
        assert_eq!(
            DatapointValue::bitmap(0x1ff),
            DatapointValue::Bitmap {
                bits: 0x1ff,
                width: 2
            }
        );
    }

    #[test]
    fn test_encode_decode_mixed_records() {
        let records = vec![
            DatapointRecord::new(1, DatapointValue::Raw(vec![1, 2, 3])).unwrap(),
            DatapointRecord::new(2, DatapointValue::Value(-1)).unwrap(),
            DatapointRecord::new(3, DatapointValue::String("héllo".to_string())).unwrap(),
        ];
        let bytes = encode_records(&records).unwrap();
        assert_eq!(decode(&bytes).unwrap(), records);
    }

    #[test]
    fn test_frame_decode() {
        let raw = [0x71, 0x00, 0x02, 0x04, 0x00, 0x01, 0x01];
        let frame = McuFrame::decode(&raw).unwrap();
        assert_eq!(frame.sequence, 0x71);
        assert_eq!(frame.status, 0x00);
        assert_eq!(frame.records.len(), 1);
        assert_eq!(frame.records[0].value, DatapointValue::Enum(1));
        assert_eq!(frame.encode().unwrap(), raw.to_vec());
    }

    #[test]
    fn test_frame_requires_records() {
        assert_eq!(McuFrame::decode(&[0x01]), Err(DecodeError::FrameTooShort(1)));
        assert_eq!(McuFrame::decode(&[0x01, 0x00]), Err(DecodeError::EmptyFrame));
    }

    #[test]
    fn test_frame_payload_uses_low_sequence_byte() {
        let payload = frame_payload(0x0102, 0x00, &[0xaa]);
        assert_eq!(payload, vec![0x02, 0x00, 0xaa]);
    }
}
