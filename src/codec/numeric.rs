//! Numeric literal helpers shared by the command and status codecs.
//!
//! Integers are plain decimal. Floats require a decimal point (no exponent
//! support — the protocol never needs one). Fractions are `num/denom`.
//! Timestamps are seconds-since-epoch with an optional fractional part,
//! reusing the float parser.

use crate::error::CodecError;

/// A rational framerate, e.g. `30` (30/1) or `30000/1001`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    pub num: u32,
    pub denom: u32,
}

impl Fraction {
    pub fn whole(n: u32) -> Self {
        Fraction { num: n, denom: 1 }
    }

    /// `1000/denom*num` effectively: the millisecond period implied by this
    /// rate, rounded down. Used to validate exposure speed against framerate.
    pub fn period_ms(&self) -> u32 {
        if self.num == 0 {
            return 0;
        }
        (1000u64 * self.denom as u64 / self.num as u64) as u32
    }
}

impl std::fmt::Display for Fraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.denom == 1 {
            write!(f, "{}", self.num)
        } else {
            write!(f, "{}/{}", self.num, self.denom)
        }
    }
}

pub fn parse_fraction(s: &str) -> Result<Fraction, CodecError> {
    match s.split_once('/') {
        Some((num, denom)) => {
            let num = parse_u32(num)?;
            let denom = parse_u32(denom)?;
            if denom == 0 {
                return Err(CodecError::BadNumber(s.to_owned()));
            }
            Ok(Fraction { num, denom })
        }
        None => Ok(Fraction::whole(parse_u32(s)?)),
    }
}

pub fn parse_u32(s: &str) -> Result<u32, CodecError> {
    s.parse::<u32>()
        .map_err(|_| CodecError::BadNumber(s.to_owned()))
}

pub fn parse_i32(s: &str) -> Result<i32, CodecError> {
    s.parse::<i32>()
        .map_err(|_| CodecError::BadNumber(s.to_owned()))
}

pub fn parse_u16(s: &str) -> Result<u16, CodecError> {
    s.parse::<u16>()
        .map_err(|_| CodecError::BadNumber(s.to_owned()))
}

pub fn parse_usize(s: &str) -> Result<usize, CodecError> {
    s.parse::<usize>()
        .map_err(|_| CodecError::BadNumber(s.to_owned()))
}

/// Parses a float with a mandatory decimal point, per the wire format.
/// Accepts plain integers too (e.g. `"5"` as `5.0`) since the data model's
/// fractional timestamps degrade to whole seconds in that case.
pub fn parse_float(s: &str) -> Result<f64, CodecError> {
    s.parse::<f64>()
        .map_err(|_| CodecError::BadNumber(s.to_owned()))
}

/// Encodes a timestamp the way STATUS's `TIMESTAMP` line and image records
/// do: seconds with a fixed 6-digit fractional part.
pub fn format_timestamp(ts: f64) -> String {
    format!("{:.6}", ts)
}

/// Formats a gain or signed level with one decimal place, as used by the
/// AWB line's red/blue gains.
pub fn format_gain(v: f64) -> String {
    format!("{:.2}", v)
}
