//! File-extension → image MIME type lookup.

use std::path::Path;

/// The image MIME type for `path`'s extension, or `None` for anything that is
/// not a recognised image format.
pub fn image_mime_type(path: &Path) -> Option<&'static str> {
  let ext = path.extension()?.to_str()?.to_ascii_lowercase();
  let mime = match ext.as_str() {
    "jpg" | "jpeg" | "jpe" => "image/jpeg",
    "png" => "image/png",
    "gif" => "image/gif",
    "webp" => "image/webp",
    "bmp" => "image/bmp",
    "tif" | "tiff" => "image/tiff",
    "heic" => "image/heic",
    "heif" => "image/heif",
    "avif" => "image/avif",
    "svg" => "image/svg+xml",
    "ico" => "image/vnd.microsoft.icon",
    _ => return None,
  };
  Some(mime)
}
