//! Validation primitives for media payloads and reactions.

use std::sync::LazyLock;

use axum::body::Bytes;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use regex::Regex;
use url::{Host, Url};

/// A file received as the `file` part of a multipart request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
    pub data: Bytes,
}

impl UploadedFile {
    pub fn to_base64(&self) -> String {
        BASE64_STANDARD.encode(&self.data)
    }
}

/// Where the bytes of a media message come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSource {
    File,
    Url,
    Base64,
}

impl MediaSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaSource::File => "file",
            MediaSource::Url => "url",
            MediaSource::Base64 => "base64",
        }
    }
}

static DATA_URI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)^data:[^;]+;base64,(.*)$").expect("valid data uri regex"));

static TLD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-z\x{00a1}-\x{ffff}]{2,}|xn--[a-z0-9-]{2,})$").expect("valid tld regex")
});

static EMOJI: LazyLock<Regex> = LazyLock::new(|| {
    let modifier = r"(?:\x{FE0F}|\p{Emoji_Modifier})?";
    let pictographic = format!(r"\p{{Extended_Pictographic}}{modifier}");
    let pattern = format!(
        concat!(
            r"^(?:",
            // regional indicator pair (flags)
            r"[\x{{1F1E6}}-\x{{1F1FF}}]{{2}}",
            // keycaps
            r"|[0-9#*]\x{{FE0F}}?\x{{20E3}}",
            // pictographs, ZWJ sequences and tag sequences
            r"|{pic}(?:\x{{200D}}{pic})*[\x{{E0020}}-\x{{E007E}}]*\x{{E007F}}?",
            r")$"
        ),
        pic = pictographic
    );
    Regex::new(&pattern).expect("valid emoji regex")
});

/// Strip a `data:<mime>;base64,` prefix, keeping only the payload.
pub fn normalize_base64_media(media: Option<&str>) -> String {
    let Some(media) = media else {
        return String::new();
    };
    match DATA_URI.captures(media).and_then(|c| c.get(1)) {
        Some(payload) if !payload.as_str().is_empty() => payload.as_str().to_string(),
        _ => media.to_string(),
    }
}

/// Standard-alphabet base64 with correct length and padding.
pub fn is_base64(value: &str) -> bool {
    if value.is_empty() || value.len() % 4 != 0 {
        return false;
    }
    if !value
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'+' || b == b'/' || b == b'=')
    {
        return false;
    }
    match value.find('=') {
        None => true,
        Some(pos) if pos == value.len() - 1 => true,
        Some(pos) => pos == value.len() - 2 && value.ends_with("=="),
    }
}

/// http(s)/ftp address with a routable host. A scheme-less `host.tld/...`
/// is accepted as well.
pub fn is_url(value: &str) -> bool {
    if value.is_empty() || value.chars().any(char::is_whitespace) {
        return false;
    }

    let parsed = if value.contains("://") {
        Url::parse(value)
    } else if value.contains('@') {
        return false;
    } else {
        Url::parse(&format!("http://{value}"))
    };
    let Ok(url) = parsed else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https" | "ftp") {
        return false;
    }

    match url.host() {
        Some(Host::Domain(domain)) => {
            let domain = domain.trim_end_matches('.');
            let mut labels = domain.rsplit('.');
            match (labels.next(), labels.next()) {
                (Some(tld), Some(_)) => TLD.is_match(tld),
                _ => false,
            }
        }
        Some(Host::Ipv4(_)) | Some(Host::Ipv6(_)) => true,
        None => false,
    }
}

/// Classify a media value. An uploaded file wins over the string field.
pub fn classify(media: &str, file: Option<&UploadedFile>) -> Option<MediaSource> {
    if file.is_some() {
        Some(MediaSource::File)
    } else if is_url(media) {
        Some(MediaSource::Url)
    } else if is_base64(media) {
        Some(MediaSource::Base64)
    } else {
        None
    }
}

/// Empty string (reaction removal) or exactly one emoji.
pub fn is_emoji(value: &str) -> bool {
    value.is_empty() || EMOJI.is_match(value)
}
