//! Short record identifiers.
//!
//! Record ids are a fixed single-letter prefix followed by a zero-padded
//! decimal counter (`M000001`, `M000002`, ...). The fixed width keeps
//! lexical and numeric ordering in agreement, so the storage layer can
//! sort ids as plain text. Ids are issued by a counter persisted in the
//! metadata table and are never reused.

use std::fmt;

use crate::error::{Result, VaultError};

/// Zero-padded width of the counter part.
const ID_WIDTH: usize = 6;

/// A fixed-prefix, fixed-width counter id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShortId {
    prefix: char,
    n: u64,
}

impl ShortId {
    /// The first id for a given prefix, e.g. `M000001`.
    pub fn first(prefix: char) -> Self {
        Self { prefix, n: 1 }
    }

    /// The successor id. Counter values are never reused, so the
    /// successor of the highest issued id is always free.
    pub fn next(self) -> Self {
        Self {
            prefix: self.prefix,
            n: self.n + 1,
        }
    }

    /// Parse an id previously produced by [`ShortId::to_string`].
    pub fn parse(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        let prefix = chars
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .ok_or_else(|| VaultError::InvalidInput(format!("Invalid id: {:?}", s)))?;
        let digits = chars.as_str();
        if digits.len() < ID_WIDTH {
            return Err(VaultError::InvalidInput(format!("Invalid id: {:?}", s)));
        }
        let n: u64 = digits
            .parse()
            .map_err(|_| VaultError::InvalidInput(format!("Invalid id: {:?}", s)))?;
        Ok(Self { prefix, n })
    }
}

impl fmt::Display for ShortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:0width$}", self.prefix, self.n, width = ID_WIDTH)
    }
}
