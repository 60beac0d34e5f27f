use std::path::Path;

/// Maps a request path to a content type by file extension.
pub fn mime_of(path: &str) -> &'static str {
    match Path::new(path).extension().and_then(|e| e.to_str()) {
        Some("html") => "text/html",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        Some("png") => "image/png",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("ico") => "image/x-icon",
        _ => "text/plain",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_of_known_extensions() {
        assert_eq!(mime_of("/index.html"), "text/html");
        assert_eq!(mime_of("/style.css"), "text/css");
        assert_eq!(mime_of("/app.js"), "application/javascript");
        assert_eq!(mime_of("/logo.png"), "image/png");
        assert_eq!(mime_of("/photo.jpeg"), "image/jpeg");
        assert_eq!(mime_of("/favicon.ico"), "image/x-icon");
    }

    #[test]
    fn test_mime_of_defaults_to_plain_text() {
        assert_eq!(mime_of("/README"), "text/plain");
        assert_eq!(mime_of("/data.bin"), "text/plain");
    }
}
