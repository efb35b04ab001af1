//! Renders pairing challenges with the `qrcode` crate.
//!
//! - SVG, error-correction level H, 4×4 px modules, `#333` on white, wrapped
//!   in a `data:image/svg+xml;base64,…` URL.
//! - Dense Unicode (two rows per character) for terminal logs.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use qrcode::render::{svg, unicode};
use qrcode::{EcLevel, QrCode};

use crate::application::qr_issuer::{ChallengeRenderer, RenderError, RenderedChallenge};

const MODULE_PX: u32 = 4;
const DARK: &str = "#333333";
const LIGHT: &str = "#ffffff";
const DATA_URL_PREFIX: &str = "data:image/svg+xml;base64,";

#[derive(Debug, Clone, Copy, Default)]
pub struct QrCodeRenderer;

impl QrCodeRenderer {
    pub fn new() -> Self {
        Self
    }

    fn encode(payload: &str) -> Result<QrCode, RenderError> {
        QrCode::with_error_correction_level(payload.as_bytes(), EcLevel::H)
            .map_err(|e| RenderError(e.to_string()))
    }
}

impl ChallengeRenderer for QrCodeRenderer {
    fn render(&self, payload: &str) -> Result<RenderedChallenge, RenderError> {
        let code = Self::encode(payload)?;

        let image = code
            .render::<svg::Color>()
            .module_dimensions(MODULE_PX, MODULE_PX)
            .dark_color(svg::Color(DARK))
            .light_color(svg::Color(LIGHT))
            .quiet_zone(true)
            .build();

        let terminal = code
            .render::<unicode::Dense1x2>()
            .dark_color(unicode::Dense1x2::Light)
            .light_color(unicode::Dense1x2::Dark)
            .build();

        Ok(RenderedChallenge {
            data_url: format!("{DATA_URL_PREFIX}{}", STANDARD.encode(image.as_bytes())),
            terminal,
        })
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
