//! # Cache Eligibility Policy
//!
//! An origin response may be stored only when its status is exactly 200 and
//! its serialized entry is strictly smaller than the backend item ceiling.
//! Everything else is still served, just never stored.

use crate::core::config::DEFAULT_MAX_ITEM_BYTES;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Cache policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachePolicy {
    /// Only responses with this status are stored
    pub cacheable_status: u16,

    /// Serialized entries must be strictly smaller than this
    pub max_item_bytes: usize,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            cacheable_status: 200,
            max_item_bytes: DEFAULT_MAX_ITEM_BYTES,
        }
    }
}

/// Why a response was not stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ineligible {
    /// Status other than the cacheable one
    Status(u16),
    /// Serialized entry reaches the item ceiling
    Size { bytes: usize, limit: usize },
    /// Body exceeded the ceiling while being read and was streamed through
    Streamed { limit: usize },
}

impl Ineligible {
    /// Short reason label for logs and metrics
    pub fn reason(&self) -> &'static str {
        match self {
            Self::Status(_) => "status",
            Self::Size { .. } | Self::Streamed { .. } => "size",
        }
    }
}

impl fmt::Display for Ineligible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(status) => write!(f, "status {} is not cacheable", status),
            Self::Size { bytes, limit } => {
                write!(f, "entry of {} bytes reaches the {} byte limit", bytes, limit)
            }
            Self::Streamed { limit } => {
                write!(f, "body exceeded the {} byte limit while streaming", limit)
            }
        }
    }
}

impl CachePolicy {
    pub fn new(max_item_bytes: usize) -> Self {
        Self {
            max_item_bytes,
            ..Default::default()
        }
    }

    /// Status check, done before paying for serialization
    pub fn check_status(&self, status: u16) -> Result<(), Ineligible> {
        if status == self.cacheable_status {
            Ok(())
        } else {
            Err(Ineligible::Status(status))
        }
    }

    /// Size check on the serialized entry
    pub fn check_size(&self, serialized_len: usize) -> Result<(), Ineligible> {
        if serialized_len < self.max_item_bytes {
            Ok(())
        } else {
            Err(Ineligible::Size {
                bytes: serialized_len,
                limit: self.max_item_bytes,
            })
        }
    }

    /// Number of raw body bytes worth buffering before a response can no longer fit
    pub fn buffer_limit(&self) -> usize {
        self.max_item_bytes
    }
}
