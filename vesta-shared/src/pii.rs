use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// A wrapper for sensitive guest data that masks its value in Debug output and can be customized for Serialization.
#[derive(Clone, Deserialize)]
pub struct Masked<T>(pub T);

impl<T: fmt::Display> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: fmt::Display> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        // In logs, we might want to mask, but in API responses we need the real value.
        // This wrapper is primarily for preventing accidental leakage in log macros like tracing::info!("{:?}", event).
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

/// Truncated guest identity safe to ship to the payment gateway as intent metadata.
/// Keeps the mailbox prefix (max 3 chars) and the domain so support can correlate
/// a gateway event with a guest without storing the full address off-platform.
pub fn truncate_identity(email: &str) -> String {
    match email.split_once('@') {
        Some((local, domain)) => {
            let prefix: String = local.chars().take(3).collect();
            format!("{}***@{}", prefix, domain)
        }
        None => {
            let prefix: String = email.chars().take(3).collect();
            format!("{}***", prefix)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_debug_never_prints_value() {
        let email = Masked("guest@example.com".to_string());
        assert_eq!(format!("{:?}", email), "********");
        assert_eq!(format!("{}", email), "********");
    }

    #[test]
    fn truncate_keeps_domain_only() {
        assert_eq!(truncate_identity("charlotte@example.com"), "cha***@example.com");
        assert_eq!(truncate_identity("al@inn.io"), "al***@inn.io");
        assert_eq!(truncate_identity("not-an-email"), "not***");
    }
}
