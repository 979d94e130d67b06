use anyhow::Result;
use base64::Engine;
use rusqlite::{params, Connection};

use crate::database::{Database, FromRow};
use crate::errors::{WebError, WebResult};
use crate::models::sqlite_current_timestamp;

/// Images larger than this on either side are scaled down before storing.
const MAX_DIMENSION: u32 = 2048;

/// Where a stored image can be fetched from.
pub fn image_url(image_id: i64) -> String {
    format!("/media/images/{}", image_id)
}

/// Turn an uploaded image into the WebP bytes we store.
///
/// Accepts plain base64 or a `data:<mime>;base64,` URL, checks that it is an image
/// we can decode, and shrinks it to fit in 2048x2048.
pub fn decode_upload(payload: &str, max_bytes: usize) -> WebResult<Vec<u8>> {
    let encoded = match payload.split_once(";base64,") {
        Some((header, data)) if header.starts_with("data:") => data,
        _ => payload,
    }
    .trim();
    if encoded.is_empty() {
        return Err(WebError::validation("Image is required"));
    }
    // Cheap size check before decoding anything
    if encoded.len() / 4 * 3 > max_bytes {
        return Err(WebError::validation("Image is too large"));
    }
    let raw = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .map_err(|e| WebError::validation(format!("Image is not valid base64: {}", e)))?;
    let mut img = image::load_from_memory(&raw)
        .map_err(|e| WebError::validation(format!("Image could not be decoded: {}", e)))?;
    if img.width() > MAX_DIMENSION || img.height() > MAX_DIMENSION {
        img = img.resize(
            MAX_DIMENSION,
            MAX_DIMENSION,
            image::imageops::FilterType::Lanczos3,
        );
    }
    // The webp encoder only takes 8-bit RGB(A)
    let img = image::DynamicImage::ImageRgba8(img.to_rgba8());
    let content_bytes = webp::Encoder::from_image(&img)
        .map_err(|e| anyhow::anyhow!("WebP encoding error: {:?}", e))?
        .encode(75.0);
    Ok(content_bytes.to_vec())
}

#[derive(Debug, Clone)]
pub struct Image {
    pub id: i64,
    pub format: String,
    pub content_bytes: Vec<u8>,
}

impl FromRow for Image {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get("id")?,
            format: row.get("format")?,
            content_bytes: row.get("content_bytes")?,
        })
    }
}

impl Image {
    pub fn get_image(db: &Database, image_id: i64) -> Result<Option<Image>> {
        Ok(db
            .collect_rows("SELECT * FROM images WHERE id = ?", params![image_id])?
            .pop())
    }

    /// Store WebP bytes produced by [`decode_upload`].
    pub fn insert(conn: &Connection, content_bytes: &[u8]) -> rusqlite::Result<i64> {
        conn.execute(
            "INSERT INTO images (format, content_bytes, created_on) VALUES ('webp', ?, ?)",
            params![content_bytes, sqlite_current_timestamp()],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn delete(conn: &Connection, image_id: i64) -> rusqlite::Result<()> {
        conn.execute("DELETE FROM images WHERE id = ?", params![image_id])?;
        Ok(())
    }
}

/// A small PNG as a data URL, for tests that need a valid upload.
#[cfg(test)]
pub(crate) fn sample_png_data_url(width: u32, height: u32) -> String {
    let img = image::RgbImage::from_pixel(width, height, image::Rgb([200, 120, 40]));
    let mut png = std::io::Cursor::new(Vec::new());
    img.write_to(&mut png, image::ImageFormat::Png).unwrap();
    format!(
        "data:image/png;base64,{}",
        base64::engine::general_purpose::STANDARD.encode(png.into_inner())
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_url_is_reencoded_as_webp() {
        let bytes = decode_upload(&sample_png_data_url(4, 3), 1_000_000).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, image::ImageFormat::WebP).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (4, 3));
    }

    #[test]
    fn plain_base64_is_accepted() {
        let url = sample_png_data_url(2, 2);
        let (_, plain) = url.split_once(",").unwrap();
        assert!(decode_upload(plain, 1_000_000).is_ok());
    }

    #[test]
    fn large_images_are_scaled_down() {
        let bytes = decode_upload(&sample_png_data_url(4096, 100), 100_000_000).unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.width(), MAX_DIMENSION);
        assert!(decoded.height() < 100);
    }

    #[test]
    fn garbage_is_rejected() {
        for payload in ["", "data:image/png;base64,", "!!!not base64!!!", "aGVsbG8gd29ybGQ="] {
            assert!(
                matches!(decode_upload(payload, 1_000_000), Err(WebError::Validation(_))),
                "{:?} should be rejected",
                payload
            );
        }
    }

    #[test]
    fn oversized_payload_is_rejected_before_decoding() {
        let err = decode_upload(&sample_png_data_url(8, 8), 10).unwrap_err();
        assert!(matches!(err, WebError::Validation(msg) if msg.contains("too large")));
    }
}
