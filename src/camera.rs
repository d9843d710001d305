//! The camera capability: an opaque interface injected into the server, plus
//! the settings record it is configured with.
//!
//! This module defines the trait only. A concrete driver (the real camera)
//! is an external collaborator and out of scope for this crate; a
//! [`FakeCamera`] is provided (behind the `test-support` feature) so the
//! server and its tests never depend on real hardware.

use crate::error::{ArgumentError, CameraError};
use std::time::Duration;

/// Camera resolution in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

/// Auto white balance mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AwbMode {
    Off,
    Auto,
    Sunlight,
    Cloudy,
    Shade,
    Tungsten,
    Fluorescent,
    Incandescent,
    Flash,
    Horizon,
}

impl AwbMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AwbMode::Off => "off",
            AwbMode::Auto => "auto",
            AwbMode::Sunlight => "sunlight",
            AwbMode::Cloudy => "cloudy",
            AwbMode::Shade => "shade",
            AwbMode::Tungsten => "tungsten",
            AwbMode::Fluorescent => "fluorescent",
            AwbMode::Incandescent => "incandescent",
            AwbMode::Flash => "flash",
            AwbMode::Horizon => "horizon",
        }
    }

    pub fn parse(s: &str) -> Option<AwbMode> {
        Some(match s {
            "off" => AwbMode::Off,
            "auto" => AwbMode::Auto,
            "sunlight" => AwbMode::Sunlight,
            "cloudy" => AwbMode::Cloudy,
            "shade" => AwbMode::Shade,
            "tungsten" => AwbMode::Tungsten,
            "fluorescent" => AwbMode::Fluorescent,
            "incandescent" => AwbMode::Incandescent,
            "flash" => AwbMode::Flash,
            "horizon" => AwbMode::Horizon,
            _ => return None,
        })
    }
}

/// Exposure mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExposureMode {
    Off,
    Auto,
    Night,
    NightPreview,
    Backlight,
    Spotlight,
    Sports,
    Snow,
    Beach,
    VeryLong,
    FixedFps,
    Antishake,
    Fireworks,
}

impl ExposureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExposureMode::Off => "off",
            ExposureMode::Auto => "auto",
            ExposureMode::Night => "night",
            ExposureMode::NightPreview => "nightpreview",
            ExposureMode::Backlight => "backlight",
            ExposureMode::Spotlight => "spotlight",
            ExposureMode::Sports => "sports",
            ExposureMode::Snow => "snow",
            ExposureMode::Beach => "beach",
            ExposureMode::VeryLong => "verylong",
            ExposureMode::FixedFps => "fixedfps",
            ExposureMode::Antishake => "antishake",
            ExposureMode::Fireworks => "fireworks",
        }
    }

    pub fn parse(s: &str) -> Option<ExposureMode> {
        Some(match s {
            "off" => ExposureMode::Off,
            "auto" => ExposureMode::Auto,
            "night" => ExposureMode::Night,
            "nightpreview" => ExposureMode::NightPreview,
            "backlight" => ExposureMode::Backlight,
            "spotlight" => ExposureMode::Spotlight,
            "sports" => ExposureMode::Sports,
            "snow" => ExposureMode::Snow,
            "beach" => ExposureMode::Beach,
            "verylong" => ExposureMode::VeryLong,
            "fixedfps" => ExposureMode::FixedFps,
            "antishake" => ExposureMode::Antishake,
            "fireworks" => ExposureMode::Fireworks,
            _ => return None,
        })
    }
}

/// Metering mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeteringMode {
    Average,
    Spot,
    Backlit,
    Matrix,
}

impl MeteringMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            MeteringMode::Average => "average",
            MeteringMode::Spot => "spot",
            MeteringMode::Backlit => "backlit",
            MeteringMode::Matrix => "matrix",
        }
    }

    pub fn parse(s: &str) -> Option<MeteringMode> {
        Some(match s {
            "average" => MeteringMode::Average,
            "spot" => MeteringMode::Spot,
            "backlit" => MeteringMode::Backlit,
            "matrix" => MeteringMode::Matrix,
            _ => return None,
        })
    }
}

use crate::codec::numeric::Fraction;

/// The full set of camera settings tracked by the server and reported by
/// STATUS. Mirrors the data model of SPEC_FULL.md §3.
#[derive(Debug, Clone, PartialEq)]
pub struct CameraSettings {
    pub resolution: Resolution,
    pub framerate: Fraction,
    pub awb_mode: AwbMode,
    pub awb_gains: Option<(f64, f64)>,
    pub exposure_mode: ExposureMode,
    pub exposure_speed_ms: Option<u32>,
    pub iso: u32,
    pub metering_mode: MeteringMode,
    pub brightness: i32,
    pub contrast: i32,
    pub saturation: i32,
    pub exposure_compensation: i32,
    pub hflip: bool,
    pub vflip: bool,
    pub denoise: bool,
    pub quality: i32,
    /// Auto gain control mode, set by the `AGC` verb. Not part of the
    /// read/validate invariants beyond being an opaque mode string.
    pub agc_mode: String,
}

impl Default for CameraSettings {
    fn default() -> Self {
        CameraSettings {
            resolution: Resolution { width: 1920, height: 1080 },
            framerate: Fraction::whole(30),
            awb_mode: AwbMode::Auto,
            awb_gains: None,
            exposure_mode: ExposureMode::Auto,
            exposure_speed_ms: None,
            iso: 0,
            metering_mode: MeteringMode::Average,
            brightness: 50,
            contrast: 0,
            saturation: 0,
            exposure_compensation: 0,
            hflip: false,
            vflip: false,
            denoise: true,
            quality: 85,
            agc_mode: "auto".to_owned(),
        }
    }
}

impl CameraSettings {
    /// Validates `framerate <-> exposure_speed_ms` and gain/speed ignore
    /// rules from SPEC_FULL.md §3. Called whenever either field changes.
    pub fn check_exposure_invariant(&self) -> Result<(), ArgumentError> {
        if self.exposure_mode == ExposureMode::Off {
            if let Some(speed) = self.exposure_speed_ms {
                let limit = self.framerate.period_ms();
                if limit > 0 && speed > limit {
                    return Err(ArgumentError::ExposureSpeed { speed, limit });
                }
            }
        }
        Ok(())
    }
}

/// An image captured by the camera: a timestamp and the raw payload bytes.
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub timestamp: f64,
    pub bytes: Vec<u8>,
}

/// The camera capability injected into the server. Object-safe and `Send`
/// so the dispatch loop can hold it behind a `Box<dyn Camera>` without
/// depending on a concrete driver.
#[async_trait::async_trait]
pub trait Camera: Send {
    /// Applies new settings. Implementations should treat this as atomic:
    /// either the whole settings record takes effect, or none of it does.
    async fn configure(&mut self, settings: &CameraSettings) -> Result<(), CameraError>;

    /// Captures `count` images, optionally using the camera's video port,
    /// optionally waiting until `at_time` (seconds since epoch) before the
    /// first capture. Returns one entry per captured image, in capture
    /// order.
    async fn capture(
        &mut self,
        count: u32,
        use_video_port: bool,
        at_time: Option<f64>,
    ) -> Result<Vec<CapturedImage>, CameraError>;

    /// Pulses the camera's LED for `duration`.
    async fn blink(&mut self, duration: Duration) -> Result<(), CameraError>;

    /// Releases the underlying hardware resource. Called once at server
    /// shutdown.
    async fn close(&mut self) -> Result<(), CameraError>;
}

/// An in-memory camera used by tests. Records every call it receives so
/// assertions can check what the dispatch loop actually asked of the
/// camera, and returns synthetic (but size-accurate) image bytes.
#[cfg(feature = "test-support")]
pub struct FakeCamera {
    pub settings: CameraSettings,
    pub configure_calls: Vec<CameraSettings>,
    pub blink_calls: Vec<Duration>,
    pub fail_next_capture: bool,
    /// Bytes-per-image produced by `capture`, used so LIST/SEND sizes are
    /// non-trivial without needing a real image encoder.
    pub image_size: usize,
}

#[cfg(feature = "test-support")]
impl Default for FakeCamera {
    fn default() -> Self {
        FakeCamera {
            settings: CameraSettings::default(),
            configure_calls: Vec::new(),
            blink_calls: Vec::new(),
            fail_next_capture: false,
            image_size: 64,
        }
    }
}

#[cfg(feature = "test-support")]
#[async_trait::async_trait]
impl Camera for FakeCamera {
    async fn configure(&mut self, settings: &CameraSettings) -> Result<(), CameraError> {
        self.settings = settings.clone();
        self.configure_calls.push(settings.clone());
        Ok(())
    }

    async fn capture(
        &mut self,
        count: u32,
        _use_video_port: bool,
        at_time: Option<f64>,
    ) -> Result<Vec<CapturedImage>, CameraError> {
        if self.fail_next_capture {
            self.fail_next_capture = false;
            return Err(CameraError::Capture("injected test failure".to_owned()));
        }
        let base = at_time.unwrap_or_else(now_unix);
        let period = if self.settings.framerate.num > 0 {
            self.settings.framerate.denom as f64 / self.settings.framerate.num as f64
        } else {
            0.0
        };
        let mut images = Vec::with_capacity(count as usize);
        for i in 0..count {
            images.push(CapturedImage {
                timestamp: base + period * i as f64,
                bytes: vec![0xAAu8; self.image_size],
            });
        }
        Ok(images)
    }

    async fn blink(&mut self, duration: Duration) -> Result<(), CameraError> {
        self.blink_calls.push(duration);
        Ok(())
    }

    async fn close(&mut self) -> Result<(), CameraError> {
        Ok(())
    }
}

#[cfg(feature = "test-support")]
fn now_unix() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
