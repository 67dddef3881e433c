//! `Content-Disposition` header values.

use crate::config::DownloadConfig;

fn is_plain_ascii(c: char) -> bool {
    c.is_ascii() && !c.is_ascii_control() && c != '"' && c != '\\'
}

/// Attachment disposition for `filename`.
///
/// ASCII names go out as a plain quoted `filename`. Other names get an RFC
/// 5987 `filename*=UTF-8''...` value plus a quoted fallback: the name with
/// non-ASCII characters stripped, or the generic APK name when nothing
/// usable is left.
pub fn content_disposition(filename: &str) -> String {
    // Never let a path through, only its last segment.
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename)
        .trim();

    let fallback: String = name.chars().filter(|c| is_plain_ascii(*c)).collect();
    let fallback = fallback.trim();
    let fallback = if fallback.is_empty() || fallback.starts_with('.') {
        DownloadConfig::FALLBACK_FILENAME
    } else {
        fallback
    };

    if !name.is_empty() && name.chars().all(is_plain_ascii) {
        return format!("attachment; filename=\"{}\"", name);
    }

    if name.is_empty() || name.chars().any(|c| c.is_control()) {
        return format!("attachment; filename=\"{}\"", fallback);
    }

    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        fallback,
        urlencoding::encode(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ascii_name() {
        assert_eq!(
            content_disposition("app-release.apk"),
            "attachment; filename=\"app-release.apk\""
        );
    }

    #[test]
    fn test_unicode_name() {
        assert_eq!(
            content_disposition("应用-v1.apk"),
            "attachment; filename=\"-v1.apk\"; filename*=UTF-8''%E5%BA%94%E7%94%A8-v1.apk"
        );
    }

    #[test]
    fn test_all_non_ascii_falls_back() {
        assert_eq!(
            content_disposition("测试.apk"),
            "attachment; filename=\"download.apk\"; filename*=UTF-8''%E6%B5%8B%E8%AF%95.apk"
        );
    }

    #[test]
    fn test_path_and_empty() {
        assert_eq!(
            content_disposition(r"AppA\release\a.apk"),
            "attachment; filename=\"a.apk\""
        );
        assert_eq!(
            content_disposition(""),
            "attachment; filename=\"download.apk\""
        );
    }
}
