//! Response frame: `<seq> OK\n[data]` or `<seq> ERROR\n<message>`.
//!
//! Decoding a response body is shape-dependent: a HELLO response carries a
//! version line, a STATUS response carries the status block, a LIST
//! response carries image lines, and everything else carries nothing. The
//! caller (the client coordinator, which knows what it sent) supplies the
//! expected [`ResponseShape`].

use crate::codec::status::{decode_image_lines, encode_image_lines, ImageLine, StatusReport};
use crate::error::CodecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseShape {
    Empty,
    Version,
    Status,
    Images,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OkPayload {
    Empty,
    Version(String),
    Status(StatusReport),
    Images(Vec<ImageLine>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResponseOutcome {
    Ok(OkPayload),
    Error(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFrame {
    pub seq: u32,
    pub outcome: ResponseOutcome,
}

pub fn encode_response(frame: &ResponseFrame) -> String {
    match &frame.outcome {
        ResponseOutcome::Error(message) => format!("{} ERROR\n{}\n", frame.seq, message),
        ResponseOutcome::Ok(payload) => {
            let data = match payload {
                OkPayload::Empty => String::new(),
                OkPayload::Version(v) => format!("VERSION {}\n", v),
                OkPayload::Status(status) => status.encode(),
                OkPayload::Images(images) => encode_image_lines(images),
            };
            format!("{} OK\n{}", frame.seq, data)
        }
    }
}

pub fn decode_response(payload: &str, shape: ResponseShape) -> Result<ResponseFrame, CodecError> {
    let mut tokens = payload.splitn(2, '\n');
    let header = tokens.next().ok_or(CodecError::EmptyFrame)?;
    let rest = tokens.next().unwrap_or("");

    let mut header_tokens = header.split_whitespace();
    let seq_str = header_tokens.next().ok_or(CodecError::EmptyFrame)?;
    let seq: u32 = seq_str
        .parse()
        .map_err(|_| CodecError::BadSequence(seq_str.to_owned()))?;
    if seq == 0 {
        return Err(CodecError::BadSequence(seq_str.to_owned()));
    }
    let status_word = header_tokens
        .next()
        .ok_or_else(|| CodecError::BadData("missing OK/ERROR".to_owned()))?;

    match status_word {
        "ERROR" => {
            if rest.is_empty() && !payload.contains('\n') {
                return Err(CodecError::MissingDataSeparator);
            }
            Ok(ResponseFrame {
                seq,
                outcome: ResponseOutcome::Error(rest.trim_end_matches('\n').to_owned()),
            })
        }
        "OK" => {
            let payload = match shape {
                ResponseShape::Empty => OkPayload::Empty,
                ResponseShape::Version => {
                    let line = rest
                        .lines()
                        .next()
                        .ok_or_else(|| CodecError::BadData("missing VERSION line".to_owned()))?;
                    let version = line
                        .strip_prefix("VERSION ")
                        .ok_or_else(|| CodecError::BadData(format!("expected VERSION line, got '{}'", line)))?;
                    OkPayload::Version(version.to_owned())
                }
                ResponseShape::Status => OkPayload::Status(StatusReport::decode(rest)?),
                ResponseShape::Images => OkPayload::Images(decode_image_lines(rest)?),
            };
            Ok(ResponseFrame { seq, outcome: ResponseOutcome::Ok(payload) })
        }
        other => Err(CodecError::BadData(format!("expected OK/ERROR, got '{}'", other))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_ok_round_trips() {
        let frame = ResponseFrame { seq: 2, outcome: ResponseOutcome::Ok(OkPayload::Empty) };
        let encoded = encode_response(&frame);
        let decoded = decode_response(&encoded, ResponseShape::Empty).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn error_round_trips() {
        let frame = ResponseFrame {
            seq: 2,
            outcome: ResponseOutcome::Error("resolution out of range".to_owned()),
        };
        let encoded = encode_response(&frame);
        let decoded = decode_response(&encoded, ResponseShape::Empty).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn version_round_trips() {
        let frame = ResponseFrame {
            seq: 1,
            outcome: ResponseOutcome::Ok(OkPayload::Version("0.4".to_owned())),
        };
        let encoded = encode_response(&frame);
        let decoded = decode_response(&encoded, ResponseShape::Version).unwrap();
        assert_eq!(decoded, frame);
    }
}
