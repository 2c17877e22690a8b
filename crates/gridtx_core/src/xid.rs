//! Global transaction identifier.
//!
//! An [`Xid`] names one branch of a global transaction. This coordinator never
//! sub-branches, so the branch qualifier is always empty and identity is
//! defined by the format id and the global transaction id alone.
//!
//! ## Binary Format
//!
//! ```text
//! ┌──────────────┬──────────┬──────────────┬──────────┬──────────────┐
//! │ format_id    │ gtrid len│ gtrid        │ bqual len│ bqual        │
//! │ i32 BE (4)   │ u8 (1)   │ 1..=64 bytes │ u8 (1)   │ 0 bytes      │
//! └──────────────┴──────────┴──────────────┴──────────┴──────────────┘
//! ```
//!
//! The format is fixed-width where it matters for cross-node comparison, so a
//! decoded remote copy compares equal to the local one.

use crate::error::{TxError, TxResult};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::OnceLock;
use uuid::Uuid;

/// Read access to the three parts of an XA-style identifier.
///
/// Implemented by [`Xid`] and by identifier types from other coordinators so
/// that they can be compared with, or copied into, an [`Xid`].
pub trait XidLike {
    /// Caller-defined namespace of the identifier.
    fn format_id(&self) -> i32;

    /// Global transaction id bytes.
    fn global_transaction_id(&self) -> &[u8];

    /// Branch qualifier bytes.
    fn branch_qualifier(&self) -> &[u8];
}

/// Immutable identifier of a global transaction.
#[derive(Clone)]
pub struct Xid {
    format_id: i32,
    gtrid: Box<[u8]>,
    hash: OnceLock<i32>,
}

impl Xid {
    /// Maximum length of the global transaction id.
    pub const MAX_GTRID_SIZE: usize = 64;

    /// Maximum length of the branch qualifier.
    pub const MAX_BQUAL_SIZE: usize = 64;

    /// Creates an identifier.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::InvalidArgument`] if `global_transaction_id` is empty
    /// or longer than [`Self::MAX_GTRID_SIZE`].
    pub fn new(format_id: i32, global_transaction_id: impl Into<Vec<u8>>) -> TxResult<Self> {
        let gtrid = global_transaction_id.into();
        if gtrid.is_empty() || gtrid.len() > Self::MAX_GTRID_SIZE {
            return Err(TxError::invalid_argument(format!(
                "global transaction id must be 1..={} bytes, got {}",
                Self::MAX_GTRID_SIZE,
                gtrid.len()
            )));
        }
        Ok(Self {
            format_id,
            gtrid: gtrid.into_boxed_slice(),
            hash: OnceLock::new(),
        })
    }

    /// Creates an identifier with a random 16-byte global transaction id.
    #[must_use]
    pub fn generate(format_id: i32) -> Self {
        Self {
            format_id,
            gtrid: Box::new(Uuid::new_v4().into_bytes()),
            hash: OnceLock::new(),
        }
    }

    /// Copies a foreign identifier by value.
    ///
    /// # Errors
    ///
    /// Returns [`TxError::InvalidArgument`] if the foreign identifier carries a
    /// branch qualifier or an out-of-range global transaction id.
    pub fn from_foreign(other: &dyn XidLike) -> TxResult<Self> {
        if !other.branch_qualifier().is_empty() {
            return Err(TxError::invalid_argument(
                "branch qualifiers are not supported",
            ));
        }
        Self::new(other.format_id(), other.global_transaction_id())
    }

    /// Returns the format id.
    #[must_use]
    pub fn format_id(&self) -> i32 {
        self.format_id
    }

    /// Returns the global transaction id bytes.
    #[must_use]
    pub fn global_transaction_id(&self) -> &[u8] {
        &self.gtrid
    }

    /// Returns true if `other` names the same transaction.
    ///
    /// Foreign identifiers match only when their branch qualifier is empty.
    #[must_use]
    pub fn matches(&self, other: &dyn XidLike) -> bool {
        other.branch_qualifier().is_empty()
            && self.format_id == other.format_id()
            && *self.gtrid == *other.global_transaction_id()
    }

    /// Returns the cached hash code, computing it on first use.
    #[must_use]
    pub fn hash_code(&self) -> i32 {
        *self.hash.get_or_init(|| {
            self.gtrid
                .iter()
                .fold(31i32.wrapping_add(self.format_id), |h, &b| {
                    h.wrapping_mul(31).wrapping_add(i32::from(b as i8))
                })
        })
    }

    /// Returns the encoded length in bytes.
    #[must_use]
    pub fn encoded_len(&self) -> usize {
        4 + 1 + self.gtrid.len() + 1
    }

    /// Encodes the identifier into its fixed binary form.
    #[must_use]
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.encoded_len());
        buf.extend_from_slice(&self.format_id.to_be_bytes());
        // gtrid length is bounded by MAX_GTRID_SIZE at construction
        buf.push(self.gtrid.len() as u8);
        buf.extend_from_slice(&self.gtrid);
        buf.push(0);
        buf
    }

    /// Decodes an identifier produced by [`Self::encode`].
    ///
    /// # Errors
    ///
    /// Returns [`TxError::InvalidArgument`] for truncated input, invalid
    /// lengths, a non-empty branch qualifier or trailing bytes.
    pub fn decode(data: &[u8]) -> TxResult<Self> {
        if data.len() < 6 {
            return Err(TxError::invalid_argument(format!(
                "encoded xid too short: {} bytes",
                data.len()
            )));
        }
        let format_id = i32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let gtrid_len = data[4] as usize;
        let gtrid_end = 5 + gtrid_len;
        if data.len() < gtrid_end + 1 {
            return Err(TxError::invalid_argument("encoded xid truncated"));
        }
        let bqual_len = data[gtrid_end] as usize;
        if bqual_len > Self::MAX_BQUAL_SIZE {
            return Err(TxError::invalid_argument(format!(
                "branch qualifier too long: {bqual_len} bytes"
            )));
        }
        if bqual_len != 0 {
            return Err(TxError::invalid_argument(
                "branch qualifiers are not supported",
            ));
        }
        if data.len() != gtrid_end + 1 {
            return Err(TxError::invalid_argument(format!(
                "{} trailing bytes after encoded xid",
                data.len() - gtrid_end - 1
            )));
        }
        Self::new(format_id, &data[5..gtrid_end])
    }
}

impl XidLike for Xid {
    fn format_id(&self) -> i32 {
        self.format_id
    }

    fn global_transaction_id(&self) -> &[u8] {
        &self.gtrid
    }

    fn branch_qualifier(&self) -> &[u8] {
        &[]
    }
}

impl PartialEq for Xid {
    fn eq(&self, other: &Self) -> bool {
        self.format_id == other.format_id && self.gtrid == other.gtrid
    }
}

impl Eq for Xid {}

impl Hash for Xid {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hash_code());
    }
}

impl PartialOrd for Xid {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Xid {
    fn cmp(&self, other: &Self) -> Ordering {
        self.format_id
            .cmp(&other.format_id)
            .then_with(|| self.gtrid.cmp(&other.gtrid))
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Xid{{format_id={}, gtrid=", self.format_id)?;
        for b in self.gtrid.iter() {
            write!(f, "{b:02x}")?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    struct ForeignXid {
        format: i32,
        gtrid: Vec<u8>,
        bqual: Vec<u8>,
    }

    impl XidLike for ForeignXid {
        fn format_id(&self) -> i32 {
            self.format
        }

        fn global_transaction_id(&self) -> &[u8] {
            &self.gtrid
        }

        fn branch_qualifier(&self) -> &[u8] {
            &self.bqual
        }
    }

    #[test]
    fn rejects_empty_gtrid() {
        assert!(matches!(
            Xid::new(1, Vec::new()),
            Err(TxError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn rejects_oversized_gtrid() {
        assert!(Xid::new(1, vec![0u8; 64]).is_ok());
        assert!(matches!(
            Xid::new(1, vec![0u8; 65]),
            Err(TxError::InvalidArgument { .. })
        ));
    }

    #[test]
    fn equality_ignores_hash_cache() {
        let a = Xid::new(7, b"abc".to_vec()).unwrap();
        let b = Xid::new(7, b"abc".to_vec()).unwrap();
        let _ = a.hash_code();
        assert_eq!(a, b);
        assert_eq!(a.hash_code(), b.hash_code());

        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }

    #[test]
    fn format_id_distinguishes() {
        let a = Xid::new(1, b"abc".to_vec()).unwrap();
        let b = Xid::new(2, b"abc".to_vec()).unwrap();
        assert_ne!(a, b);
        assert!(a < b);
    }

    #[test]
    fn foreign_identifier_matches_without_branch() {
        let xid = Xid::new(3, b"tx-1".to_vec()).unwrap();
        let foreign = ForeignXid {
            format: 3,
            gtrid: b"tx-1".to_vec(),
            bqual: Vec::new(),
        };
        assert!(xid.matches(&foreign));
        assert_eq!(Xid::from_foreign(&foreign).unwrap(), xid);

        let branched = ForeignXid {
            bqual: vec![1],
            ..foreign
        };
        assert!(!xid.matches(&branched));
        assert!(Xid::from_foreign(&branched).is_err());
    }

    #[test]
    fn generated_ids_are_distinct() {
        let a = Xid::generate(9);
        let b = Xid::generate(9);
        assert_ne!(a, b);
        assert_eq!(a.global_transaction_id().len(), 16);
    }

    #[test]
    fn encoding_layout() {
        let xid = Xid::new(-2, vec![0xab, 0xcd]).unwrap();
        let bytes = xid.encode();
        assert_eq!(bytes, vec![0xff, 0xff, 0xff, 0xfe, 2, 0xab, 0xcd, 0]);
        assert_eq!(bytes.len(), xid.encoded_len());
        assert_eq!(Xid::decode(&bytes).unwrap(), xid);
    }

    #[test]
    fn decode_rejects_malformed_input() {
        assert!(Xid::decode(&[0, 0, 0, 1, 3, 1]).is_err());
        assert!(Xid::decode(&[0, 0, 0, 1, 0, 0]).is_err());
        assert!(Xid::decode(&[0, 0, 0, 1, 1, 9, 1, 5]).is_err());
        assert!(Xid::decode(&[0, 0, 0, 1, 1, 9, 0, 0]).is_err());
    }

    #[test]
    fn display_is_hex() {
        let xid = Xid::new(1, vec![0x0a, 0xff]).unwrap();
        assert_eq!(xid.to_string(), "Xid{format_id=1, gtrid=0aff}");
    }
}
