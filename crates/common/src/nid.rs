//! Network identifier (NID) normalization.
//!
//! NIDs arrive as decimal (`1193046`), hexadecimal with a `0x`/`0X` prefix
//! (`0x123456`), or with readability hyphens (`0x12-34-56`). Storage keeps
//! the canonical 32-bit value; textual variants only exist at the input and
//! output boundary.

use crate::domain::{DomainError, DomainResult};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// The reserved NID value meaning "all devices in the group"
pub const BROADCAST_NID: u32 = 0xFFFF_FFFF;

/// Canonical 32-bit network identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Nid(u32);

impl Nid {
    pub const BROADCAST: Nid = Nid(BROADCAST_NID);

    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(self) -> u32 {
        self.0
    }

    pub fn is_broadcast(self) -> bool {
        self.0 == BROADCAST_NID
    }

    /// Parse and range-check a NID supplied at an input boundary
    pub fn parse(raw: &str) -> DomainResult<Self> {
        let value = normalize(raw).ok_or_else(|| {
            DomainError::InvalidNid(format!(
                "'{}' is not a decimal or 0x-prefixed hexadecimal number",
                raw
            ))
        })?;

        u32::try_from(value).map(Nid).map_err(|_| {
            DomainError::InvalidNid(format!(
                "'{}' exceeds maximum allowed value of {} (0xFFFFFFFF)",
                raw, BROADCAST_NID
            ))
        })
    }

    /// Parse an optional NID where blank input means "not supplied"
    pub fn parse_optional(raw: Option<&str>) -> DomainResult<Option<Self>> {
        match raw.map(str::trim) {
            None | Some("") => Ok(None),
            Some(text) => Self::parse(text).map(Some),
        }
    }

    pub fn to_decimal_string(self) -> String {
        self.0.to_string()
    }

    pub fn to_lower_hex_string(self) -> String {
        format!("0x{:x}", self.0)
    }

    pub fn to_upper_hex_string(self) -> String {
        format!("0X{:X}", self.0)
    }

    /// Storage representation (BIGINT column)
    pub fn to_i64(self) -> i64 {
        i64::from(self.0)
    }

    pub fn from_i64(value: i64) -> DomainResult<Self> {
        u32::try_from(value)
            .map(Nid)
            .map_err(|_| DomainError::InvalidNid(format!("stored value {} is out of range", value)))
    }
}

impl fmt::Display for Nid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Nid {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Nid::parse(s)
    }
}

/// Strip hyphens and whitespace, then parse as base-16 when prefixed with
/// `0x`/`0X`, otherwise as base-10. Range checking is left to [`Nid::parse`].
pub fn normalize(raw: &str) -> Option<u64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '-' && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return None;
    }

    match cleaned
        .strip_prefix("0x")
        .or_else(|| cleaned.strip_prefix("0X"))
    {
        Some(hex) if !hex.is_empty() => u64::from_str_radix(hex, 16).ok(),
        Some(_) => None,
        None => cleaned.parse::<u64>().ok(),
    }
}

/// Every textual form of `raw` that must compare equal during routing
pub fn variants(raw: &str) -> BTreeSet<String> {
    let mut forms = BTreeSet::new();
    forms.insert(raw.to_string());
    forms.insert(raw.to_lowercase());
    forms.insert(raw.to_uppercase());

    if let Some(value) = normalize(raw) {
        forms.insert(value.to_string());
        forms.insert(format!("0x{:x}", value));
        forms.insert(format!("0X{:X}", value));
    }

    forms
}

/// Textual forms of the broadcast sentinel
pub fn broadcast_variants() -> BTreeSet<String> {
    let mut forms = variants(&BROADCAST_NID.to_string());
    forms.insert(format!("0x{:X}", BROADCAST_NID));
    forms
}

/// The NID predicate in play for one routing decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NidMatcher {
    /// Effective NID is the broadcast sentinel: every candidate passes
    Broadcast,
    /// Candidates must carry this NID (or the broadcast sentinel)
    Exact(Nid),
    /// Effective NID text could not be normalized: only broadcast candidates pass
    Unresolved,
}

impl NidMatcher {
    /// Build a matcher from raw effective-NID text; `None` when the text is blank
    pub fn from_raw(raw: &str) -> Option<Self> {
        if raw.trim().is_empty() {
            return None;
        }

        Some(match normalize(raw).and_then(|v| u32::try_from(v).ok()) {
            Some(BROADCAST_NID) => NidMatcher::Broadcast,
            Some(value) => NidMatcher::Exact(Nid(value)),
            None => NidMatcher::Unresolved,
        })
    }

    pub fn from_nid(nid: Nid) -> Self {
        if nid.is_broadcast() {
            NidMatcher::Broadcast
        } else {
            NidMatcher::Exact(nid)
        }
    }

    pub fn admits(&self, candidate: Option<Nid>) -> bool {
        match (self, candidate) {
            (NidMatcher::Broadcast, _) => true,
            (_, Some(nid)) if nid.is_broadcast() => true,
            (NidMatcher::Exact(expected), Some(nid)) => *expected == nid,
            _ => false,
        }
    }
}
