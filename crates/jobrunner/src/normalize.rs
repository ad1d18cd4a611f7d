//! Job id post-processing and decoding of scheduler output.

use serde::{Deserialize, Serialize};

/// Job id reported for everything run in local mode.
pub const LOCAL_JOB_ID: &str = "0";

/// Strip the server/array suffix from a raw job id.
///
/// `"12345.server"` becomes `"12345"`. A dot at position zero is kept, as is
/// the literal local id.
pub fn normalize_job_id(raw: &str, strip_suffix: bool) -> String {
    if !strip_suffix || raw == LOCAL_JOB_ID {
        return raw.to_string();
    }
    match raw.find('.') {
        Some(idx) if idx > 0 => raw[..idx].to_string(),
        _ => raw.to_string(),
    }
}

/// Character encoding of text produced by child processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputEncoding {
    /// UTF-8; invalid sequences are replaced.
    #[default]
    Utf8,
    /// ISO-8859-1, one byte per character.
    Latin1,
}

impl OutputEncoding {
    /// Resolve the encoding from the locale variables of the current process.
    pub fn from_env() -> Self {
        Self::from_locale_vars(|key| std::env::var(key).ok())
    }

    /// Resolve the encoding from `LC_ALL`, `LC_CTYPE` and `LANG`, first set wins.
    pub fn from_locale_vars(lookup: impl Fn(&str) -> Option<String>) -> Self {
        ["LC_ALL", "LC_CTYPE", "LANG"]
            .into_iter()
            .filter_map(|key| lookup(key).filter(|v| !v.is_empty()))
            .next()
            .and_then(|locale| {
                let charset = locale.split_once('.').map(|(_, c)| c)?;
                let charset = charset.split('@').next().unwrap_or(charset);
                Self::from_name(charset)
            })
            .unwrap_or_default()
    }

    /// Parse a charset name such as `UTF-8` or `ISO-8859-1`.
    pub fn from_name(name: &str) -> Option<Self> {
        let normalized: String = name
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .map(|c| c.to_ascii_lowercase())
            .collect();
        match normalized.as_str() {
            "utf8" => Some(OutputEncoding::Utf8),
            "latin1" | "iso88591" | "l1" => Some(OutputEncoding::Latin1),
            _ => None,
        }
    }

    /// Decode raw process output.
    pub fn decode(&self, bytes: &[u8]) -> String {
        match self {
            OutputEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            OutputEncoding::Latin1 => bytes.iter().map(|&b| char::from(b)).collect(),
        }
    }
}
