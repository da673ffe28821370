//! Content validity classification.
//!
//! Vendors and misconfigured storage occasionally answer with HTML error
//! pages labeled (or mislabeled) as images. Anything that reaches a cache
//! tier, or is served from one, goes through this classifier first.
//!
//! Classification only looks at the declared content type and the first
//! [`SNIFF_LEN`] bytes of the payload, so it can run on the head of a
//! stream without buffering the whole object.

/// Number of leading bytes inspected for HTML markers.
pub const SNIFF_LEN: usize = 512;

/// Shortest payload the signature fallback will consider.
const MIN_SIGNATURE_LEN: usize = 8;

/// Content types accepted without looking at the payload.
const IMAGE_CONTENT_TYPES: &[&str] = &[
    "image/jpeg",
    "image/png",
    "image/gif",
    "image/webp",
    "image/svg+xml",
    "image/avif",
];

const HTML_MARKERS: &[&[u8]] = &[b"<html", b"<!doctype html"];

// =============================================================================
// Validity
// =============================================================================

/// Outcome of classifying a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    /// Declared content type is an allowlisted image type
    Image,

    /// No usable content type, but the payload carries a known image signature
    Sniffed,

    /// An HTML page, whatever the declared content type says
    Html,

    /// Empty, unknown type, or no recognizable signature
    Invalid,
}

impl Validity {
    /// Whether the payload may be served as an image and written to a cache.
    pub const fn is_valid(&self) -> bool {
        matches!(self, Validity::Image | Validity::Sniffed)
    }
}

// =============================================================================
// Classification
// =============================================================================

/// Classify a payload from its declared content type and leading bytes.
///
/// `head` may be the whole payload or only its first [`SNIFF_LEN`] bytes.
pub fn classify(content_type: Option<&str>, head: &[u8]) -> Validity {
    if is_html(content_type, head) {
        return Validity::Html;
    }

    if head.is_empty() {
        return Validity::Invalid;
    }

    let content_type = content_type.map(str::trim).unwrap_or("");
    let lowered = content_type.to_ascii_lowercase();

    if IMAGE_CONTENT_TYPES.iter().any(|t| lowered.contains(t)) {
        return Validity::Image;
    }

    let untyped = lowered.is_empty() || lowered.starts_with("application/octet-stream");
    if untyped && sniff_image_signature(head).is_some() {
        return Validity::Sniffed;
    }

    Validity::Invalid
}

/// True when the payload is servable as an image.
pub fn is_valid(content_type: Option<&str>, head: &[u8]) -> bool {
    classify(content_type, head).is_valid()
}

/// True when the declared type is HTML or the leading bytes contain an HTML marker.
pub fn is_html(content_type: Option<&str>, head: &[u8]) -> bool {
    if let Some(content_type) = content_type {
        if content_type.to_ascii_lowercase().contains("text/html") {
            return true;
        }
    }

    let window = &head[..head.len().min(SNIFF_LEN)];
    let lowered = window.to_ascii_lowercase();
    HTML_MARKERS
        .iter()
        .any(|marker| contains_subslice(&lowered, marker))
}

/// Identify an image by its magic bytes.
///
/// Returns the MIME type for JPEG, PNG, GIF and WEBP signatures. Payloads
/// shorter than 8 bytes never match.
pub fn sniff_image_signature(head: &[u8]) -> Option<&'static str> {
    if head.len() < MIN_SIGNATURE_LEN {
        return None;
    }

    if head.starts_with(&[0xFF, 0xD8]) {
        Some("image/jpeg")
    } else if head.starts_with(&[0x89, 0x50, 0x4E, 0x47]) {
        Some("image/png")
    } else if head.starts_with(&[0x47, 0x49, 0x46]) {
        Some("image/gif")
    } else if head.len() >= 12 && &head[0..4] == b"RIFF" && &head[8..12] == b"WEBP" {
        Some("image/webp")
    } else {
        None
    }
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

// =============================================================================
// Tests
// =============================================================================
