//! STATUS and LIST response data blocks: fixed line order, fixed field
//! layout, per SPEC_FULL.md §6.

use crate::camera::{AwbMode, CameraSettings, ExposureMode, MeteringMode, Resolution};
use crate::codec::numeric::{
    format_gain, format_timestamp, parse_float, parse_fraction, parse_i32, parse_u32, Fraction,
};
use crate::error::CodecError;

/// The full STATUS data block, line order fixed by the wire format.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub resolution: Resolution,
    pub framerate: Fraction,
    pub awb_mode: AwbMode,
    pub awb_red: f64,
    pub awb_blue: f64,
    pub exposure_mode: ExposureMode,
    pub exposure_speed_ms: u32,
    pub exposure_compensation: i32,
    pub iso: u32,
    pub metering_mode: MeteringMode,
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub hflip: bool,
    pub vflip: bool,
    pub timestamp: f64,
    pub images: u32,
}

impl StatusReport {
    pub fn from_settings(settings: &CameraSettings, timestamp: f64, images: u32) -> Self {
        let (red, blue) = settings.awb_gains.unwrap_or((0.0, 0.0));
        StatusReport {
            resolution: settings.resolution,
            framerate: settings.framerate,
            awb_mode: settings.awb_mode,
            awb_red: red,
            awb_blue: blue,
            exposure_mode: settings.exposure_mode,
            exposure_speed_ms: settings.exposure_speed_ms.unwrap_or(0),
            exposure_compensation: settings.exposure_compensation,
            iso: settings.iso,
            metering_mode: settings.metering_mode,
            brightness: settings.brightness,
            contrast: settings.contrast,
            saturation: settings.saturation,
            hflip: settings.hflip,
            vflip: settings.vflip,
            timestamp,
            images,
        }
    }

    pub fn encode(&self) -> String {
        format!(
            "RESOLUTION {w} {h}\n\
             FRAMERATE {fr}\n\
             AWB {awb} {red} {blue}\n\
             EXPOSURE {exp} {speed} {comp}\n\
             ISO {iso}\n\
             METERING {metering}\n\
             LEVELS {b} {c} {s}\n\
             FLIP {h_flip} {v_flip}\n\
             TIMESTAMP {ts}\n\
             IMAGES {images}\n",
            w = self.resolution.width,
            h = self.resolution.height,
            fr = self.framerate,
            awb = self.awb_mode.as_str(),
            red = format_gain(self.awb_red),
            blue = format_gain(self.awb_blue),
            exp = self.exposure_mode.as_str(),
            speed = self.exposure_speed_ms,
            comp = self.exposure_compensation,
            iso = self.iso,
            metering = self.metering_mode.as_str(),
            b = self.brightness,
            c = self.contrast,
            s = self.saturation,
            h_flip = bool_flag(self.hflip),
            v_flip = bool_flag(self.vflip),
            ts = format_timestamp(self.timestamp),
            images = self.images,
        )
    }

    pub fn decode(data: &str) -> Result<Self, CodecError> {
        let mut lines = data.lines();

        let resolution = parse_line(&mut lines, "RESOLUTION", 2)?;
        let width = parse_u32(&resolution[0])?;
        let height = parse_u32(&resolution[1])?;

        let framerate_line = parse_line(&mut lines, "FRAMERATE", 1)?;
        let framerate = parse_fraction(&framerate_line[0])?;

        let awb = parse_line(&mut lines, "AWB", 3)?;
        let awb_mode = AwbMode::parse(&awb[0])
            .ok_or_else(|| CodecError::BadData(format!("unknown AWB mode: {}", awb[0])))?;
        let awb_red = parse_float(&awb[1])?;
        let awb_blue = parse_float(&awb[2])?;

        let exposure = parse_line(&mut lines, "EXPOSURE", 3)?;
        let exposure_mode = ExposureMode::parse(&exposure[0])
            .ok_or_else(|| CodecError::BadData(format!("unknown exposure mode: {}", exposure[0])))?;
        let exposure_speed_ms = parse_u32(&exposure[1])?;
        let exposure_compensation = parse_i32(&exposure[2])?;

        let iso_line = parse_line(&mut lines, "ISO", 1)?;
        let iso = parse_u32(&iso_line[0])?;

        let metering_line = parse_line(&mut lines, "METERING", 1)?;
        let metering_mode = MeteringMode::parse(&metering_line[0])
            .ok_or_else(|| CodecError::BadData(format!("unknown metering mode: {}", metering_line[0])))?;

        let levels = parse_line(&mut lines, "LEVELS", 3)?;
        let brightness = parse_i32(&levels[0])?;
        let contrast = parse_i32(&levels[1])?;
        let saturation = parse_i32(&levels[2])?;

        let flip = parse_line(&mut lines, "FLIP", 2)?;
        let hflip = parse_bool_flag(&flip[0])?;
        let vflip = parse_bool_flag(&flip[1])?;

        let ts_line = parse_line(&mut lines, "TIMESTAMP", 1)?;
        let timestamp = parse_float(&ts_line[0])?;

        let images_line = parse_line(&mut lines, "IMAGES", 1)?;
        let images = parse_u32(&images_line[0])?;

        Ok(StatusReport {
            resolution: Resolution { width, height },
            framerate,
            awb_mode,
            awb_red,
            awb_blue,
            exposure_mode,
            exposure_speed_ms,
            exposure_compensation,
            iso,
            metering_mode,
            brightness,
            contrast,
            saturation,
            hflip,
            vflip,
            timestamp,
            images,
        })
    }
}

/// One `IMAGE <index> <timestamp> <size>` line from a LIST response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageLine {
    pub index: usize,
    pub timestamp: f64,
    pub size: usize,
}

pub fn encode_image_lines(images: &[ImageLine]) -> String {
    let mut out = String::new();
    for img in images {
        out.push_str(&format!(
            "IMAGE {} {} {}\n",
            img.index,
            format_timestamp(img.timestamp),
            img.size
        ));
    }
    out
}

pub fn decode_image_lines(data: &str) -> Result<Vec<ImageLine>, CodecError> {
    let mut out = Vec::new();
    for line in data.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            continue;
        }
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() != 4 || parts[0] != "IMAGE" {
            return Err(CodecError::BadData(format!("malformed IMAGE line: '{}'", line)));
        }
        out.push(ImageLine {
            index: parts[1]
                .parse()
                .map_err(|_| CodecError::BadData(format!("bad image index: '{}'", parts[1])))?,
            timestamp: parse_float(parts[2])?,
            size: parts[3]
                .parse()
                .map_err(|_| CodecError::BadData(format!("bad image size: '{}'", parts[3])))?,
        });
    }
    Ok(out)
}

fn bool_flag(v: bool) -> &'static str {
    if v {
        "1"
    } else {
        "0"
    }
}

fn parse_bool_flag(s: &str) -> Result<bool, CodecError> {
    match s {
        "0" => Ok(false),
        "1" => Ok(true),
        _ => Err(CodecError::BadData(format!("expected 0/1, got '{}'", s))),
    }
}

/// Pulls the next non-empty line, checks its leading keyword, and returns
/// the remaining whitespace-split fields. Used by `StatusReport::decode` to
/// keep each field's error message specific to the line it came from.
fn parse_line<'a>(
    lines: &mut std::str::Lines<'a>,
    keyword: &str,
    expected_fields: usize,
) -> Result<Vec<&'a str>, CodecError> {
    let line = lines
        .next()
        .ok_or_else(|| CodecError::BadData(format!("missing {} line", keyword)))?;
    let mut parts = line.split_whitespace();
    let head = parts
        .next()
        .ok_or_else(|| CodecError::BadData(format!("missing {} line", keyword)))?;
    if head != keyword {
        return Err(CodecError::BadData(format!(
            "expected {} line, got '{}'",
            keyword, line
        )));
    }
    let fields: Vec<&str> = parts.collect();
    if fields.len() != expected_fields {
        return Err(CodecError::BadData(format!(
            "{} line expected {} fields, got {}",
            keyword,
            expected_fields,
            fields.len()
        )));
    }
    Ok(fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips() {
        let settings = CameraSettings::default();
        let report = StatusReport::from_settings(&settings, 1000.5, 3);
        let encoded = report.encode();
        let decoded = StatusReport::decode(&encoded).unwrap();
        assert_eq!(decoded, report);
    }

    #[test]
    fn image_lines_round_trip() {
        let lines = vec![
            ImageLine { index: 0, timestamp: 1000.0, size: 512 },
            ImageLine { index: 1, timestamp: 1000.5, size: 480 },
        ];
        let encoded = encode_image_lines(&lines);
        let decoded = decode_image_lines(&encoded).unwrap();
        assert_eq!(decoded, lines);
    }

    #[test]
    fn status_rejects_out_of_order_lines() {
        let bad = "FRAMERATE 30\nRESOLUTION 1920 1080\n";
        assert!(StatusReport::decode(bad).is_err());
    }
}
