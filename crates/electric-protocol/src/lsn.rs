//! LSN: an opaque, totally-ordered WAL position.
//!
//! The core never interprets an LSN -- it is compared only via the WAL
//! source's comparator (`electric_core::collaborators::WalSource::compare`).
//! Here it is just a byte string with a convenience hex `Display` for logs.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Lsn(pub Vec<u8>);

impl Lsn {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for Lsn {
    fn from(bytes: Vec<u8>) -> Self {
        Lsn(bytes)
    }
}

impl std::fmt::Display for Lsn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "0x")?;
        for b in &self.0 {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_lsn_displays_as_bare_prefix() {
        let lsn = Lsn(vec![]);
        assert!(lsn.is_empty());
        assert_eq!(lsn.to_string(), "0x");
    }

    #[test]
    fn lsn_displays_as_uppercase_hex() {
        let lsn = Lsn(vec![0x0a, 0xff]);
        assert_eq!(lsn.to_string(), "0x0AFF");
    }
}
