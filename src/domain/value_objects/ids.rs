use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Random hex token identifying an [`ItemInstance`](crate::domain::entities::ItemInstance).
///
/// 12 hex characters, generated with reject-and-retry on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemInstanceId(pub String);

/// Random hex token identifying a [`JobInstance`](crate::domain::entities::JobInstance).
///
/// 6 hex characters, generated with reject-and-retry on collision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct JobId(pub String);

impl fmt::Display for ItemInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl AsRef<str> for ItemInstanceId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for JobId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

pub const ITEM_INSTANCE_ID_LEN: usize = 12;
pub const JOB_ID_LEN: usize = 6;

/// Draws a random lowercase-hex string of `len` characters.
pub fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    const HEX: &[u8] = b"0123456789abcdef";
    (0..len)
        .map(|_| HEX[rng.gen_range(0..HEX.len())] as char)
        .collect()
}

impl ItemInstanceId {
    pub fn random() -> Self {
        Self(random_hex(ITEM_INSTANCE_ID_LEN))
    }
}

impl JobId {
    pub fn random() -> Self {
        Self(random_hex(JOB_ID_LEN))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_hex_has_requested_length_and_alphabet() {
        let s = random_hex(12);
        assert_eq!(s.len(), 12);
        assert!(s.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
    }

    #[test]
    fn item_instance_id_and_job_id_display_raw_token() {
        let id = ItemInstanceId("abc123def456".to_string());
        assert_eq!(id.to_string(), "abc123def456");
    }
}
