use http::HeaderValue;

/// Content types the response helpers know how to label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaType {
    Json,
    Form,
    Html,
    Xhtml,
    Xml,
    Js,
    Css,
    Text,
    Markdown,
    Binary,
    Gif,
    Jpeg,
    Png,
    Icon,
    Svg,
    Pdf,
    Wav,
    Mp3,
    Ogg,
    Mp4,
    Matroska,
    Webm,
}

impl MediaType {
    /// Look a type up by its short name or extension (`"json"`, `"jpg"`, ...).
    pub fn from_extension(ext: &str) -> Option<Self> {
        let media = match ext.to_ascii_lowercase().as_str() {
            "json" => MediaType::Json,
            "form" => MediaType::Form,
            "html" | "htm" => MediaType::Html,
            "xhtml" => MediaType::Xhtml,
            "xml" => MediaType::Xml,
            "js" | "mjs" => MediaType::Js,
            "css" => MediaType::Css,
            "txt" | "text" => MediaType::Text,
            "md" => MediaType::Markdown,
            "bin" | "dat" => MediaType::Binary,
            "gif" => MediaType::Gif,
            "jpg" | "jpeg" => MediaType::Jpeg,
            "png" => MediaType::Png,
            "ico" => MediaType::Icon,
            "svg" => MediaType::Svg,
            "pdf" => MediaType::Pdf,
            "wav" => MediaType::Wav,
            "mp3" => MediaType::Mp3,
            "ogg" => MediaType::Ogg,
            "mp4" => MediaType::Mp4,
            "mkv" => MediaType::Matroska,
            "webm" => MediaType::Webm,
            _ => return None,
        };

        Some(media)
    }

    /// Pick a type from a file name.
    ///
    /// Names without an extension are binary, dotfiles are text and unknown
    /// extensions fall back to binary.
    pub fn from_file_name(name: &str) -> Self {
        let name = name.rsplit('/').next().unwrap_or(name);

        match name.rsplit_once('.') {
            None => MediaType::Binary,
            Some(("", _)) => MediaType::Text,
            Some((_, ext)) => Self::from_extension(ext).unwrap_or(MediaType::Binary),
        }
    }

    pub fn essence(&self) -> &'static str {
        match self {
            MediaType::Json => "application/json",
            MediaType::Form => "application/x-www-form-urlencoded",
            MediaType::Html => "text/html",
            MediaType::Xhtml => "application/xhtml+xml",
            MediaType::Xml => "application/xml",
            MediaType::Js => "application/javascript",
            MediaType::Css => "text/css",
            MediaType::Text => "text/plain",
            MediaType::Markdown => "text/markdown",
            MediaType::Binary => "application/octet-stream",
            MediaType::Gif => "image/gif",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Icon => "image/x-icon",
            MediaType::Svg => "image/svg+xml",
            MediaType::Pdf => "application/pdf",
            MediaType::Wav => "audio/wav",
            MediaType::Mp3 => "audio/mpeg",
            MediaType::Ogg => "audio/ogg",
            MediaType::Mp4 => "video/mp4",
            MediaType::Matroska => "video/x-matroska",
            MediaType::Webm => "video/webm",
        }
    }

    /// Textual types are labelled with `charset=utf-8`.
    pub fn is_text(&self) -> bool {
        matches!(
            self,
            MediaType::Json
                | MediaType::Form
                | MediaType::Html
                | MediaType::Xhtml
                | MediaType::Xml
                | MediaType::Js
                | MediaType::Css
                | MediaType::Text
                | MediaType::Markdown
        )
    }

    /// The full `Content-Type` value.
    pub fn header_value(&self) -> HeaderValue {
        if self.is_text() {
            HeaderValue::from_str(&format!("{}; charset=utf-8", self.essence()))
                .unwrap_or_else(|_| HeaderValue::from_static("text/plain"))
        } else {
            HeaderValue::from_static(self.essence())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_values() {
        assert_eq!(
            MediaType::Text.header_value(),
            "text/plain; charset=utf-8"
        );
        assert_eq!(
            MediaType::Json.header_value(),
            "application/json; charset=utf-8"
        );
        assert_eq!(
            MediaType::Form.header_value(),
            "application/x-www-form-urlencoded; charset=utf-8"
        );
        assert_eq!(MediaType::Binary.header_value(), "application/octet-stream");
        assert_eq!(MediaType::Png.header_value(), "image/png");
    }

    #[test]
    fn test_from_file_name() {
        assert_eq!(MediaType::from_file_name("index.html"), MediaType::Html);
        assert_eq!(MediaType::from_file_name("a/b/photo.JPG"), MediaType::Jpeg);
        assert_eq!(MediaType::from_file_name("README"), MediaType::Binary);
        assert_eq!(MediaType::from_file_name(".gitignore"), MediaType::Text);
        assert_eq!(MediaType::from_file_name("archive.xyz"), MediaType::Binary);
    }
}
