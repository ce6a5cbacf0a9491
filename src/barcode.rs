//! Barcode Generator
//!
//! Encodes a payload into a horizontal linear barcode raster, then turns it
//! into the vertical orientation the label templates expect.

use std::fmt;
use std::str::FromStr;

use barcoders::sym::codabar::Codabar;
use barcoders::sym::code128::Code128;
use barcoders::sym::code39::Code39;
use barcoders::sym::code93::Code93;
use barcoders::sym::ean13::EAN13;
use barcoders::sym::ean8::EAN8;
use font8x8::{UnicodeFonts, BASIC_FONTS};
use image::{imageops, GrayImage, Luma};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Quiet zone added around the bars, in modules before scaling.
pub const BARCODE_MARGIN: u32 = 2;

/// Code 128 needs a leading character-set selector; set B covers printable ASCII.
const CODE128_CHARSET_B: char = '\u{0181}';

/// Caption glyphs are 8x8 before scaling.
const GLYPH_SIZE: u32 = 8;

/// White rows between the bars and the caption.
const CAPTION_GAP: u32 = 2;

const BLACK: Luma<u8> = Luma([0]);
const WHITE: Luma<u8> = Luma([255]);

#[derive(Debug, Error)]
pub enum BarcodeError {
    #[error("{symbology} cannot encode '{payload}': {reason}")]
    Rejected {
        symbology: Symbology,
        payload: String,
        reason: String,
    },

    #[error("Unknown barcode format '{0}'")]
    UnknownFormat(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Symbology {
    #[serde(rename = "CODE_128")]
    Code128,
    #[serde(rename = "CODE_39")]
    Code39,
    #[serde(rename = "CODE_93")]
    Code93,
    #[serde(rename = "EAN_13")]
    Ean13,
    #[serde(rename = "EAN_8")]
    Ean8,
    #[serde(rename = "CODABAR")]
    Codabar,
}

impl Symbology {
    pub fn name(&self) -> &'static str {
        match self {
            Symbology::Code128 => "CODE_128",
            Symbology::Code39 => "CODE_39",
            Symbology::Code93 => "CODE_93",
            Symbology::Ean13 => "EAN_13",
            Symbology::Ean8 => "EAN_8",
            Symbology::Codabar => "CODABAR",
        }
    }

    /// Bar/space module pattern, 1 = bar.
    fn modules(&self, payload: &str) -> Result<Vec<u8>, barcoders::error::Error> {
        match self {
            Symbology::Code128 => {
                Code128::new(format!("{}{}", CODE128_CHARSET_B, payload)).map(|c| c.encode())
            }
            Symbology::Code39 => Code39::new(payload).map(|c| c.encode()),
            Symbology::Code93 => Code93::new(payload).map(|c| c.encode()),
            Symbology::Ean13 => EAN13::new(payload).map(|c| c.encode()),
            Symbology::Ean8 => EAN8::new(payload).map(|c| c.encode()),
            Symbology::Codabar => Codabar::new(payload).map(|c| c.encode()),
        }
    }
}

impl fmt::Display for Symbology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Symbology {
    type Err = BarcodeError;

    /// Accepts `CODE_128`, `code128`, `Code-128` and the like.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '_' && *c != '-' && !c.is_whitespace())
            .collect::<String>()
            .to_ascii_uppercase();

        match normalized.as_str() {
            "CODE128" => Ok(Symbology::Code128),
            "CODE39" => Ok(Symbology::Code39),
            "CODE93" => Ok(Symbology::Code93),
            "EAN13" => Ok(Symbology::Ean13),
            "EAN8" => Ok(Symbology::Ean8),
            "CODABAR" => Ok(Symbology::Codabar),
            _ => Err(BarcodeError::UnknownFormat(s.to_string())),
        }
    }
}

/// Turns a string into pixels.
pub trait BarcodeEncoder: Send + Sync {
    /// Horizontal raster, at least `width` x `height`, with `margin` quiet modules.
    fn encode(&self, payload: &str, width: u32, height: u32, margin: u32)
        -> Result<GrayImage, BarcodeError>;
}

/// Linear symbologies rendered as black bars on white, with the payload
/// printed underneath unless the caption is turned off.
#[derive(Debug, Clone, Copy)]
pub struct LinearEncoder {
    symbology: Symbology,
    caption: bool,
}

impl LinearEncoder {
    pub fn new(symbology: Symbology) -> Self {
        Self {
            symbology,
            caption: true,
        }
    }

    pub fn with_caption(mut self, caption: bool) -> Self {
        self.caption = caption;
        self
    }
}

impl BarcodeEncoder for LinearEncoder {
    fn encode(
        &self,
        payload: &str,
        width: u32,
        height: u32,
        margin: u32,
    ) -> Result<GrayImage, BarcodeError> {
        let modules = self
            .symbology
            .modules(payload)
            .map_err(|e| BarcodeError::Rejected {
                symbology: self.symbology,
                payload: payload.to_string(),
                reason: e.to_string(),
            })?;

        let mut img = rasterize(&modules, width, height, margin);
        if self.caption {
            draw_caption(&mut img, payload);
        }
        Ok(img)
    }
}

/// Scale the module pattern by a whole factor and center it.
fn rasterize(modules: &[u8], width: u32, height: u32, margin: u32) -> GrayImage {
    let input_width = modules.len() as u32;
    let full_width = input_width + margin;
    let output_width = width.max(full_width);
    let output_height = height.max(1);
    let scale = output_width / full_width;
    let left_padding = (output_width - input_width * scale) / 2;

    let mut img = GrayImage::from_pixel(output_width, output_height, WHITE);
    for (i, module) in modules.iter().enumerate() {
        if *module == 0 {
            continue;
        }
        let start = left_padding + i as u32 * scale;
        for x in start..start + scale {
            for y in 0..output_height {
                img.put_pixel(x, y, BLACK);
            }
        }
    }
    img
}

/// Largest whole glyph scale that fits the caption across the raster and in
/// its bottom third. Zero means the raster is too small for text.
fn caption_scale(chars: u32, width: u32, height: u32) -> u32 {
    if chars == 0 {
        return 0;
    }
    let by_width = width / (chars * GLYPH_SIZE);
    let by_height = (height / 3).saturating_sub(CAPTION_GAP) / GLYPH_SIZE;
    by_width.min(by_height)
}

/// Blank the bottom band of the bars and print `text` there, centered.
/// The raster keeps its size.
fn draw_caption(img: &mut GrayImage, text: &str) {
    let chars = text.chars().count() as u32;
    let scale = caption_scale(chars, img.width(), img.height());
    if scale == 0 {
        return;
    }

    let glyph_size = GLYPH_SIZE * scale;
    let band_top = img.height() - glyph_size - CAPTION_GAP;
    for y in band_top..img.height() {
        for x in 0..img.width() {
            img.put_pixel(x, y, WHITE);
        }
    }

    let left = (img.width() - chars * glyph_size) / 2;
    let top = band_top + CAPTION_GAP;
    for (i, c) in text.chars().enumerate() {
        let glyph = BASIC_FONTS.get(c).unwrap_or([0; 8]);
        let origin = left + i as u32 * glyph_size;
        for (row, bits) in glyph.iter().enumerate() {
            for col in 0..GLYPH_SIZE {
                if (*bits >> col) & 1 == 0 {
                    continue;
                }
                let x0 = origin + col * scale;
                let y0 = top + row as u32 * scale;
                for y in y0..y0 + scale {
                    for x in x0..x0 + scale {
                        img.put_pixel(x, y, BLACK);
                    }
                }
            }
        }
    }
}

/// Produces vertical barcode rasters sized per configuration.
pub struct BarcodeGenerator {
    encoder: Box<dyn BarcodeEncoder>,
    width: u32,
    height: u32,
}

impl BarcodeGenerator {
    pub fn new(encoder: Box<dyn BarcodeEncoder>, width: u32, height: u32) -> Self {
        Self {
            encoder,
            width,
            height,
        }
    }

    /// Encode, then rotate 270 degrees. Width and height are swapped.
    pub fn generate(&self, payload: &str) -> Result<GrayImage, BarcodeError> {
        let horizontal = self
            .encoder
            .encode(payload, self.width, self.height, BARCODE_MARGIN)?;
        Ok(imageops::rotate270(&horizontal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn generator(symbology: Symbology, width: u32, height: u32) -> BarcodeGenerator {
        BarcodeGenerator::new(Box::new(LinearEncoder::new(symbology)), width, height)
    }

    fn bars_only(symbology: Symbology, width: u32, height: u32) -> BarcodeGenerator {
        let encoder = LinearEncoder::new(symbology).with_caption(false);
        BarcodeGenerator::new(Box::new(encoder), width, height)
    }

    fn has_black(img: &GrayImage, xs: std::ops::Range<u32>, ys: std::ops::Range<u32>) -> bool {
        ys.flat_map(|y| xs.clone().map(move |x| (x, y)))
            .any(|(x, y)| img.get_pixel(x, y) == &BLACK)
    }

    #[test]
    fn test_symbology_names_parse() {
        assert_eq!("CODE_128".parse::<Symbology>().unwrap(), Symbology::Code128);
        assert_eq!("code39".parse::<Symbology>().unwrap(), Symbology::Code39);
        assert_eq!("Ean-13".parse::<Symbology>().unwrap(), Symbology::Ean13);
        assert!("QR_CODE".parse::<Symbology>().is_err());
    }

    #[test]
    fn test_horizontal_raster_respects_configured_size() {
        let encoder = LinearEncoder::new(Symbology::Code128);
        let img = encoder.encode("111-111111", 300, 80, BARCODE_MARGIN).unwrap();
        assert_eq!(img.width(), 300);
        assert_eq!(img.height(), 80);
    }

    #[test]
    fn test_raster_grows_when_too_narrow() {
        let encoder = LinearEncoder::new(Symbology::Code128);
        let img = encoder.encode("111-111111", 1, 10, BARCODE_MARGIN).unwrap();
        assert!(img.width() > 1);
    }

    #[test]
    fn test_vertical_orientation() {
        let img = bars_only(Symbology::Code128, 300, 80)
            .generate("111-111111")
            .unwrap();
        assert_eq!(img.width(), 80);
        assert_eq!(img.height(), 300);
        // Bars run across the width after rotation: every row is uniform.
        for y in 0..img.height() {
            let first = img.get_pixel(0, y);
            assert!((0..img.width()).all(|x| img.get_pixel(x, y) == first));
        }
    }

    #[test]
    fn test_caption_printed_under_bars() {
        let encoder = LinearEncoder::new(Symbology::Code128);
        let img = encoder.encode("111-111111", 300, 80, BARCODE_MARGIN).unwrap();

        // 10 glyphs at scale 3: bars on rows 0..54, gap 54..56, text 56..80.
        assert!(has_black(&img, 0..300, 0..1));
        assert!(!has_black(&img, 0..300, 54..56));
        assert!(has_black(&img, 0..300, 56..80));
        // Text is centered: the 30px either side of it stays white.
        assert!(!has_black(&img, 0..30, 56..80));
        assert!(!has_black(&img, 270..300, 56..80));
    }

    #[test]
    fn test_caption_skipped_when_raster_too_small() {
        let encoder = LinearEncoder::new(Symbology::Code128);
        let img = encoder.encode("111-111111", 300, 10, BARCODE_MARGIN).unwrap();
        let bottom = img.height() - 1;
        assert!((0..img.width()).all(|x| img.get_pixel(x, 0) == img.get_pixel(x, bottom)));
    }

    #[test]
    fn test_caption_off_keeps_bars_full_height() {
        let encoder = LinearEncoder::new(Symbology::Code128).with_caption(false);
        let img = encoder.encode("111-111111", 300, 80, BARCODE_MARGIN).unwrap();
        assert!((0..300).all(|x| img.get_pixel(x, 0) == img.get_pixel(x, 79)));
    }

    #[test]
    fn test_every_linear_symbology_encodes_and_rotates() {
        let cases = [
            (Symbology::Code128, "111-111111"),
            (Symbology::Code39, "111-111111"),
            (Symbology::Code93, "111-111111"),
            (Symbology::Codabar, "111-111111"),
            (Symbology::Ean13, "750103131130"),
            (Symbology::Ean8, "9638507"),
        ];
        for (symbology, payload) in cases {
            let img = bars_only(symbology, 300, 80).generate(payload).unwrap();
            assert_eq!((img.width(), img.height()), (80, 300), "{}", symbology);
            assert!(has_black(&img, 0..80, 0..300), "{} has no bars", symbology);
            assert!(img.pixels().any(|p| *p == WHITE), "{} has no spaces", symbology);
        }
    }

    #[test]
    fn test_code39_rejects_lowercase() {
        let err = generator(Symbology::Code39, 200, 50).generate("abc").unwrap_err();
        assert!(matches!(
            err,
            BarcodeError::Rejected { symbology: Symbology::Code39, .. }
        ));
    }

    #[test]
    fn test_rejected_payload_is_encoding_error() {
        let err = generator(Symbology::Ean13, 200, 50)
            .generate("not-digits")
            .unwrap_err();
        assert!(matches!(err, BarcodeError::Rejected { .. }));
    }

    proptest! {
        #[test]
        fn prop_rotation_swaps_dimensions(
            id in 0i64..1_000_000,
            heat in 0u32..10_000_000,
            width in 1u32..600,
            height in 1u32..200,
        ) {
            let payload = format!("{}-{}", id, heat);
            let encoder = LinearEncoder::new(Symbology::Code128);
            let horizontal = encoder.encode(&payload, width, height, BARCODE_MARGIN).unwrap();
            let vertical = generator(Symbology::Code128, width, height).generate(&payload).unwrap();
            prop_assert_eq!(vertical.width(), horizontal.height());
            prop_assert_eq!(vertical.height(), horizontal.width());
        }
    }
}
