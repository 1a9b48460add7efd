/// Extension for a downloaded image, from its magic bytes first and its
/// `Content-Type` header second.
pub fn infer_image_extension(bytes: &[u8], content_type: Option<&str>) -> &'static str {
    match bytes {
        [0xFF, 0xD8, 0xFF, ..] => return "jpg",
        [0x89, 0x50, 0x4E, 0x47, ..] => return "png",
        [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50, ..] => return "webp",
        _ => {}
    }

    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match essence.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => "jpg",
        Some("image/webp") => "webp",
        Some("image/png") => "png",
        _ => {
            tracing::warn!(
                "Unrecognized image format (first 4 bytes: {:02X?}, content type: {:?}), falling back to png",
                &bytes[..bytes.len().min(4)],
                content_type
            );
            "png"
        }
    }
}
