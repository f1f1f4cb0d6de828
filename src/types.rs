use serde::Serialize;

/// A normalized email address: trimmed and lower-cased.
/// Both stores key on this, so `A@X.com ` and `a@x.com` are the same entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EmailAddr(String);

impl EmailAddr {
    pub fn new(raw: &str) -> Self {
        Self(raw.trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for EmailAddr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which flow a challenge belongs to. Selects the email template and
/// nothing else; verification logic is purpose-agnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Purpose {
    Registration,
    Reset,
}

impl Purpose {
    /// The original wire format treats anything that isn't "reset" as a
    /// registration request.
    pub fn from_request(kind: Option<&str>) -> Self {
        match kind {
            Some("reset") => Self::Reset,
            _ => Self::Registration,
        }
    }
}

impl std::fmt::Display for Purpose {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Registration => f.write_str("registration"),
            Self::Reset => f.write_str("reset"),
        }
    }
}
