//! QR code rendering for public menu links

use crate::errors::{AppError, Result};
use qrcode::render::svg;
use qrcode::{EcLevel, QrCode};

/// Render a menu URL as an SVG QR code
///
/// Medium error correction keeps the code scannable on printed table
/// cards even with minor damage.
pub fn menu_qr_svg(url: &str) -> Result<String> {
    let code = QrCode::with_error_correction_level(url.as_bytes(), EcLevel::M).map_err(|e| {
        AppError::Internal {
            message: format!("QR encoding failed: {}", e),
        }
    })?;

    let image = code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .quiet_zone(true)
        .dark_color(svg::Color("#000000"))
        .light_color(svg::Color("#ffffff"))
        .build();

    Ok(image)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_renders_svg() {
        let svg = menu_qr_svg("http://localhost:8080/menu/joes-diner").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("http://www.w3.org/2000/svg"));
    }

    #[test]
    fn test_distinct_urls_render_differently() {
        let a = menu_qr_svg("http://localhost:8080/menu/joes-diner").unwrap();
        let b = menu_qr_svg("http://localhost:8080/menu/cafe-luna").unwrap();
        assert_ne!(a, b);
    }
}
