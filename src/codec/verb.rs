//! Command frame: `<seq> <VERB> [args...]`.
//!
//! Parsing here is purely syntactic — numeric literals must be well formed
//! and the verb must be recognised, but mode strings (`awb`, `exposure`,
//! `metering`, ...) are passed through as-is. Semantic range/mode
//! validation happens in `server::dispatch`, which is what turns a
//! syntactically valid but semantically bad command into an ERROR response
//! instead of a decode failure.

use crate::codec::numeric::{parse_fraction, parse_float, parse_i32, parse_u16, parse_u32, parse_usize, Fraction};
use crate::error::CodecError;

#[derive(Debug, Clone, PartialEq)]
pub enum Verb {
    Hello { timestamp: f64 },
    Ack,
    Status,
    Resolution { width: u32, height: u32 },
    Framerate { rate: Fraction },
    Awb { mode: String, gains: Option<(f64, f64)> },
    Exposure { mode: String, speed_ms: Option<u32> },
    Iso { value: u32 },
    Metering { mode: String },
    Levels { brightness: i32, contrast: i32, saturation: i32, exposure_compensation: i32 },
    Flip { horizontal: bool, vertical: bool },
    Agc { mode: String },
    Denoise { enabled: bool },
    Quality { value: i32 },
    Blink,
    Capture { count: u32, video_port: u16, sync: Option<f64> },
    List,
    Clear,
    Send { index: usize, port: u16 },
}

impl Verb {
    pub fn name(&self) -> &'static str {
        match self {
            Verb::Hello { .. } => "HELLO",
            Verb::Ack => "ACK",
            Verb::Status => "STATUS",
            Verb::Resolution { .. } => "RESOLUTION",
            Verb::Framerate { .. } => "FRAMERATE",
            Verb::Awb { .. } => "AWB",
            Verb::Exposure { .. } => "EXPOSURE",
            Verb::Iso { .. } => "ISO",
            Verb::Metering { .. } => "METERING",
            Verb::Levels { .. } => "LEVELS",
            Verb::Flip { .. } => "FLIP",
            Verb::Agc { .. } => "AGC",
            Verb::Denoise { .. } => "DENOISE",
            Verb::Quality { .. } => "QUALITY",
            Verb::Blink => "BLINK",
            Verb::Capture { .. } => "CAPTURE",
            Verb::List => "LIST",
            Verb::Clear => "CLEAR",
            Verb::Send { .. } => "SEND",
        }
    }
}

/// A fully decoded command: its sequence number and verb.
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    pub seq: u32,
    pub verb: Verb,
}

/// Encodes a command frame as `<seq> <VERB> [args...]\n`.
pub fn encode_command(frame: &CommandFrame) -> String {
    let args = match &frame.verb {
        Verb::Hello { timestamp } => format!("{}", timestamp),
        Verb::Ack | Verb::Status | Verb::Blink | Verb::List | Verb::Clear => String::new(),
        Verb::Resolution { width, height } => format!("{} {}", width, height),
        Verb::Framerate { rate } => format!("{}", rate),
        Verb::Awb { mode, gains } => match gains {
            Some((r, b)) => format!("{} {} {}", mode, r, b),
            None => mode.clone(),
        },
        Verb::Exposure { mode, speed_ms } => match speed_ms {
            Some(speed) => format!("{} {}", mode, speed),
            None => mode.clone(),
        },
        Verb::Iso { value } => format!("{}", value),
        Verb::Metering { mode } => mode.clone(),
        Verb::Levels { brightness, contrast, saturation, exposure_compensation } => {
            format!("{} {} {} {}", brightness, contrast, saturation, exposure_compensation)
        }
        Verb::Flip { horizontal, vertical } => {
            format!("{} {}", *horizontal as u8, *vertical as u8)
        }
        Verb::Agc { mode } => mode.clone(),
        Verb::Denoise { enabled } => format!("{}", *enabled as u8),
        Verb::Quality { value } => format!("{}", value),
        Verb::Capture { count, video_port, sync } => match sync {
            Some(ts) => format!("{} {} {}", count, video_port, ts),
            None => format!("{} {}", count, video_port),
        },
        Verb::Send { index, port } => format!("{} {}", index, port),
    };

    let verb_name = frame.verb.name();
    if args.is_empty() {
        format!("{} {}\n", frame.seq, verb_name)
    } else {
        format!("{} {} {}\n", frame.seq, verb_name, args)
    }
}

/// Decodes a single command line (without its trailing newline, though a
/// trailing newline is tolerated).
pub fn decode_command(line: &str) -> Result<CommandFrame, CodecError> {
    let line = line.trim_end_matches(['\n', '\r']);
    let mut tokens = line.split_whitespace();

    let seq_str = tokens.next().ok_or(CodecError::EmptyFrame)?;
    let seq: u32 = seq_str
        .parse()
        .map_err(|_| CodecError::BadSequence(seq_str.to_owned()))?;
    if seq == 0 {
        return Err(CodecError::BadSequence(seq_str.to_owned()));
    }

    let verb_name = tokens
        .next()
        .ok_or_else(|| CodecError::UnknownVerb(String::new()))?;
    let args: Vec<&str> = tokens.collect();

    let verb = parse_verb(verb_name, &args)?;
    Ok(CommandFrame { seq, verb })
}

fn parse_verb(verb_name: &str, args: &[&str]) -> Result<Verb, CodecError> {
    match verb_name {
        "HELLO" => {
            expect_args(args, 1, "HELLO")?;
            Ok(Verb::Hello { timestamp: parse_float(args[0])? })
        }
        "ACK" => {
            expect_args(args, 0, "ACK")?;
            Ok(Verb::Ack)
        }
        "STATUS" => {
            expect_args(args, 0, "STATUS")?;
            Ok(Verb::Status)
        }
        "RESOLUTION" => {
            expect_args(args, 2, "RESOLUTION")?;
            Ok(Verb::Resolution { width: parse_u32(args[0])?, height: parse_u32(args[1])? })
        }
        "FRAMERATE" => {
            expect_args(args, 1, "FRAMERATE")?;
            Ok(Verb::Framerate { rate: parse_fraction(args[0])? })
        }
        "AWB" => match args.len() {
            1 => Ok(Verb::Awb { mode: args[0].to_owned(), gains: None }),
            3 => Ok(Verb::Awb {
                mode: args[0].to_owned(),
                gains: Some((parse_float(args[1])?, parse_float(args[2])?)),
            }),
            n => Err(CodecError::BadData(format!("AWB expects 1 or 3 args, got {}", n))),
        },
        "EXPOSURE" => match args.len() {
            1 => Ok(Verb::Exposure { mode: args[0].to_owned(), speed_ms: None }),
            2 => Ok(Verb::Exposure { mode: args[0].to_owned(), speed_ms: Some(parse_u32(args[1])?) }),
            n => Err(CodecError::BadData(format!("EXPOSURE expects 1 or 2 args, got {}", n))),
        },
        "ISO" => {
            expect_args(args, 1, "ISO")?;
            Ok(Verb::Iso { value: parse_u32(args[0])? })
        }
        "METERING" => {
            expect_args(args, 1, "METERING")?;
            Ok(Verb::Metering { mode: args[0].to_owned() })
        }
        "LEVELS" => {
            expect_args(args, 4, "LEVELS")?;
            Ok(Verb::Levels {
                brightness: parse_i32(args[0])?,
                contrast: parse_i32(args[1])?,
                saturation: parse_i32(args[2])?,
                exposure_compensation: parse_i32(args[3])?,
            })
        }
        "FLIP" => {
            expect_args(args, 2, "FLIP")?;
            Ok(Verb::Flip { horizontal: parse_bool(args[0])?, vertical: parse_bool(args[1])? })
        }
        "AGC" => {
            expect_args(args, 1, "AGC")?;
            Ok(Verb::Agc { mode: args[0].to_owned() })
        }
        "DENOISE" => {
            expect_args(args, 1, "DENOISE")?;
            Ok(Verb::Denoise { enabled: parse_bool(args[0])? })
        }
        "QUALITY" => {
            expect_args(args, 1, "QUALITY")?;
            Ok(Verb::Quality { value: parse_i32(args[0])? })
        }
        "BLINK" => {
            expect_args(args, 0, "BLINK")?;
            Ok(Verb::Blink)
        }
        "CAPTURE" => match args.len() {
            0 => Ok(Verb::Capture { count: 1, video_port: 0, sync: None }),
            1 => Ok(Verb::Capture { count: parse_u32(args[0])?, video_port: 0, sync: None }),
            2 => Ok(Verb::Capture {
                count: parse_u32(args[0])?,
                video_port: parse_u16(args[1])?,
                sync: None,
            }),
            3 => Ok(Verb::Capture {
                count: parse_u32(args[0])?,
                video_port: parse_u16(args[1])?,
                sync: Some(parse_float(args[2])?),
            }),
            n => Err(CodecError::BadData(format!("CAPTURE expects 0-3 args, got {}", n))),
        },
        "LIST" => {
            expect_args(args, 0, "LIST")?;
            Ok(Verb::List)
        }
        "CLEAR" => {
            expect_args(args, 0, "CLEAR")?;
            Ok(Verb::Clear)
        }
        "SEND" => {
            expect_args(args, 2, "SEND")?;
            Ok(Verb::Send { index: parse_usize(args[0])?, port: parse_u16(args[1])? })
        }
        other => Err(CodecError::UnknownVerb(other.to_owned())),
    }
}

fn expect_args(args: &[&str], n: usize, verb: &str) -> Result<(), CodecError> {
    if args.len() != n {
        Err(CodecError::BadData(format!(
            "{} expects {} arg(s), got {}",
            verb,
            n,
            args.len()
        )))
    } else {
        Ok(())
    }
}

fn parse_bool(s: &str) -> Result<bool, CodecError> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(CodecError::BadData(format!("expected 0/1, got '{}'", s))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(frame: CommandFrame) {
        let encoded = encode_command(&frame);
        let decoded = decode_command(&encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn hello_round_trips() {
        round_trip(CommandFrame { seq: 1, verb: Verb::Hello { timestamp: 1000.25 } });
    }

    #[test]
    fn capture_with_sync_round_trips() {
        round_trip(CommandFrame {
            seq: 3,
            verb: Verb::Capture { count: 2, video_port: 0, sync: Some(1700000000.5) },
        });
    }

    #[test]
    fn send_round_trips() {
        round_trip(CommandFrame { seq: 4, verb: Verb::Send { index: 0, port: 9000 } });
    }

    #[test]
    fn zero_sequence_is_rejected() {
        assert!(decode_command("0 STATUS\n").is_err());
    }

    #[test]
    fn unknown_verb_is_rejected() {
        assert!(decode_command("1 FROBNICATE\n").is_err());
    }

    #[test]
    fn non_numeric_sequence_is_rejected() {
        assert!(decode_command("abc STATUS\n").is_err());
    }

    #[test]
    fn trailing_whitespace_is_tolerated() {
        assert!(decode_command("1 STATUS   \n").is_ok());
    }
}
