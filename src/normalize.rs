// URL normalization — canonicalize watch URLs so the extractor never walks a playlist.

use url::Url;

/// Best-effort canonicalization of a media URL.
///
/// If the input parses and carries a `v` video-identifier parameter, the
/// result is a bare watch URL containing only that identifier; playlist
/// indices, timestamps, and tracking parameters are dropped. Anything that
/// fails to parse (or has no `v` parameter) passes through unchanged —
/// normalization must never reject a request.
pub fn normalize_media_url(raw: &str) -> String {
    let parsed = match Url::parse(raw) {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };

    match parsed.query_pairs().find(|(key, _)| key == "v") {
        Some((_, id)) if !id.is_empty() => {
            format!("https://www.youtube.com/watch?v={}", id)
        }
        _ => raw.to_string(),
    }
}
