//! QR token rendering
//!
//! Turns a retrieval URL into a PNG QR code. Encoding parameters are fixed
//! (byte mode, quartile error correction, 10 px modules, standard quiet
//! zone), so the same URL always renders to the same bytes.

use image::{ImageFormat, Luma};
use qrcode::bits::Bits;
use qrcode::types::{EcLevel, QrError, Version};
use qrcode::QrCode;
use std::fmt;
use std::io::Cursor;
use tracing::debug;

/// Pixel width and height of one QR module
pub const MODULE_PX: u32 = 10;

/// Modules of blank border on each side
#[cfg(any(test, feature = "test-util"))]
const QUIET_ZONE: u32 = 4;

const MAX_VERSION: i16 = 40;

#[derive(Debug)]
pub enum TokenError {
    /// The payload does not fit any QR version at the chosen level
    Encoding(String),
    /// The matrix could not be written out (or read back) as PNG
    Image(String),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::Encoding(msg) => write!(f, "QR encoding error: {}", msg),
            TokenError::Image(msg) => write!(f, "QR image error: {}", msg),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<image::ImageError> for TokenError {
    fn from(err: image::ImageError) -> Self {
        TokenError::Image(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, TokenError>;

/// Renders retrieval URLs as QR PNG images
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QrTokenGenerator {
    ec_level: EcLevel,
    module_px: u32,
}

impl Default for QrTokenGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl QrTokenGenerator {
    pub fn new() -> Self {
        Self {
            ec_level: EcLevel::Q,
            module_px: MODULE_PX,
        }
    }

    /// Encode `url` in byte mode using the smallest version that fits
    pub fn encode(&self, url: &str) -> Result<QrCode> {
        let mut last_err = QrError::DataTooLong;

        for version in 1..=MAX_VERSION {
            let mut bits = Bits::new(Version::Normal(version));
            let pushed = bits
                .push_byte_data(url.as_bytes())
                .and_then(|()| bits.push_terminator(self.ec_level));

            match pushed {
                Ok(()) => {
                    return QrCode::with_bits(bits, self.ec_level)
                        .map_err(|e| TokenError::Encoding(e.to_string()));
                }
                Err(e) => last_err = e,
            }
        }

        Err(TokenError::Encoding(format!(
            "{} ({} bytes exceeds capacity)",
            last_err,
            url.len()
        )))
    }

    /// Render `url` as PNG bytes
    pub fn generate(&self, url: &str) -> Result<Vec<u8>> {
        let code = self.encode(url)?;
        let image = code
            .render::<Luma<u8>>()
            .module_dimensions(self.module_px, self.module_px)
            .build();

        let mut bytes: Vec<u8> = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;

        debug!(
            url_len = url.len(),
            modules = code.width(),
            png_len = bytes.len(),
            "Rendered QR token"
        );
        Ok(bytes)
    }

    /// Check that `png` is a token rendered by this generator for `url`,
    /// by sampling the center of every module and comparing it with the
    /// expected matrix.
    #[cfg(any(test, feature = "test-util"))]
    pub fn verify(&self, png: &[u8], url: &str) -> Result<bool> {
        use qrcode::types::Color;

        let expected = self.encode(url)?;
        let width = expected.width() as u32;
        let image = image::load_from_memory_with_format(png, ImageFormat::Png)?.to_luma8();

        let side = (width + 2 * QUIET_ZONE) * self.module_px;
        if image.width() != side || image.height() != side {
            return Ok(false);
        }

        let half = self.module_px / 2;
        let colors = expected.to_colors();
        for (i, color) in colors.iter().enumerate() {
            let x = (i as u32 % width + QUIET_ZONE) * self.module_px + half;
            let y = (i as u32 / width + QUIET_ZONE) * self.module_px + half;
            let dark = image.get_pixel(x, y).0[0] < 128;
            if dark != (*color == Color::Dark) {
                return Ok(false);
            }
        }

        Ok(true)
    }
}
