use std::io::Cursor;

use anyhow::{anyhow, Result};
use image::ImageFormat;

pub const THUMBNAIL_EDGE: u32 = 256;

pub fn detect_mime_type(data: &[u8]) -> Option<String> {
    if data.len() > 12 {
        let ftyp = &data[4..12];
        if ftyp.starts_with(b"ftyp") {
            let brand = &ftyp[4..8];
            if brand == b"heic" || brand == b"heif" || brand == b"hevc" {
                return Some("image/heic".to_string());
            }
        }
    }

    infer::get(data).map(|kind| kind.mime_type().to_string())
}

pub fn is_image(data: &[u8]) -> bool {
    detect_mime_type(data).is_some_and(|mime| mime.starts_with("image/"))
}

/// PNG thumbnail whose longest side is at most [`THUMBNAIL_EDGE`].
pub fn thumbnail_png(data: &[u8]) -> Result<Vec<u8>> {
    let decoded = image::load_from_memory(data)
        .map_err(|err| anyhow!("Failed to decode image for thumbnail: {}", err))?;
    let thumbnail = decoded.thumbnail(THUMBNAIL_EDGE, THUMBNAIL_EDGE);
    let mut out = Cursor::new(Vec::new());
    thumbnail
        .write_to(&mut out, ImageFormat::Png)
        .map_err(|err| anyhow!("Failed to encode thumbnail: {}", err))?;
    Ok(out.into_inner())
}
