//! Response shaping: download file name headers and per-client transfer
//! behavior.

/// User-agent fragments of browsers that mishandle compressed or transformed
/// package downloads.
const MOBILE_MARKERS: &[&str] = &["android", "iphone", "ipad", "mobile"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClientClass {
    #[default]
    Standard,
    MobileBrowser,
}

impl ClientClass {
    pub fn from_user_agent(user_agent: Option<&str>) -> Self {
        let Some(user_agent) = user_agent else {
            return Self::Standard;
        };
        let lowered = user_agent.to_ascii_lowercase();
        if MOBILE_MARKERS.iter().any(|marker| lowered.contains(marker)) {
            Self::MobileBrowser
        } else {
            Self::Standard
        }
    }

    pub fn transfer_mode(self) -> TransferMode {
        match self {
            Self::Standard => TransferMode::Negotiable,
            Self::MobileBrowser => TransferMode::Identity,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Leave encoding to the normal HTTP negotiation.
    Negotiable,
    /// Send the bytes as stored and forbid intermediaries from rewriting them.
    Identity,
}

impl TransferMode {
    pub fn headers(self) -> &'static [(&'static str, &'static str)] {
        match self {
            Self::Negotiable => &[],
            Self::Identity => &[
                ("content-encoding", "identity"),
                ("cache-control", "no-transform"),
            ],
        }
    }
}

/// `Content-Disposition` value carrying both an ASCII fallback name and the
/// exact UTF-8 name.
pub fn content_disposition(file_name: &str) -> String {
    format!(
        "attachment; filename=\"{}\"; filename*=UTF-8''{}",
        ascii_fallback(file_name),
        urlencoding::encode(file_name)
    )
}

fn ascii_fallback(file_name: &str) -> String {
    let fallback: String = file_name
        .chars()
        .map(|ch| match ch {
            '"' | '\\' => '_',
            ch if ch.is_ascii() && !ch.is_ascii_control() => ch,
            _ => '_',
        })
        .collect();
    if fallback.trim_matches('_').is_empty() {
        "download.apk".to_string()
    } else {
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mobile_browsers_are_detected() {
        let android = "Mozilla/5.0 (Linux; Android 13; Pixel 7) AppleWebKit/537.36 Chrome/120 Mobile Safari/537.36";
        assert_eq!(
            ClientClass::from_user_agent(Some(android)),
            ClientClass::MobileBrowser
        );
        let desktop = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) Chrome/120 Safari/537.36";
        assert_eq!(ClientClass::from_user_agent(Some(desktop)), ClientClass::Standard);
        assert_eq!(ClientClass::from_user_agent(None), ClientClass::Standard);
    }

    #[test]
    fn mobile_transfer_disables_transformations() {
        let headers = ClientClass::MobileBrowser.transfer_mode().headers();
        assert!(headers.contains(&("content-encoding", "identity")));
        assert!(headers.contains(&("cache-control", "no-transform")));
        assert!(ClientClass::Standard.transfer_mode().headers().is_empty());
    }

    #[test]
    fn disposition_carries_ascii_and_utf8_names() {
        assert_eq!(
            content_disposition("app-release.apk"),
            "attachment; filename=\"app-release.apk\"; filename*=UTF-8''app-release.apk"
        );
        let value = content_disposition("应用 v1.apk");
        assert!(value.starts_with("attachment; filename=\"__ v1.apk\";"));
        assert!(value.ends_with("filename*=UTF-8''%E5%BA%94%E7%94%A8%20v1.apk"));
    }

    #[test]
    fn quotes_cannot_break_the_header() {
        let value = content_disposition("a\"b.apk");
        assert!(value.contains("filename=\"a_b.apk\""));
        assert_eq!(ascii_fallback("测试"), "download.apk");
    }
}
