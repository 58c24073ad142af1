//! Attribute, size and date criteria.
//!
//! [`FilterCriteria`] is the default [`EntryCriteria`] implementation: an
//! attribute mask/value pair plus optional size and last-write ranges. An
//! entry passes when `attr & mask == value` and every configured range
//! contains the entry's value.

use std::time::SystemTime;

use super::EntryCriteria;

/// Attribute/size/date test applied to every enumerated entry.
#[derive(Debug, Clone, Default)]
pub struct FilterCriteria {
    /// Attribute bits to examine. Bits outside the mask are ignored.
    pub attr_mask: u32,
    /// Required value of the masked attribute bits.
    pub attr_value: u32,
    /// Minimum size in bytes, inclusive.
    pub min_size: Option<u64>,
    /// Maximum size in bytes, inclusive.
    pub max_size: Option<u64>,
    /// Entries modified before this instant are rejected.
    pub modified_after: Option<SystemTime>,
    /// Entries modified after this instant are rejected.
    pub modified_before: Option<SystemTime>,
}

impl FilterCriteria {
    /// Require the given attribute bits to be set.
    #[must_use]
    pub fn with_required_attrs(mut self, bits: u32) -> Self {
        self.attr_mask |= bits;
        self.attr_value |= bits;
        self
    }

    /// Require the given attribute bits to be clear.
    #[must_use]
    pub fn with_forbidden_attrs(mut self, bits: u32) -> Self {
        self.attr_mask |= bits;
        self.attr_value &= !bits;
        self
    }

    /// Set the inclusive size range.
    #[must_use]
    pub fn with_size_range(mut self, min: Option<u64>, max: Option<u64>) -> Self {
        self.min_size = min;
        self.max_size = max;
        self
    }

    /// Set the last-write time range.
    #[must_use]
    pub fn with_modified_range(
        mut self,
        after: Option<SystemTime>,
        before: Option<SystemTime>,
    ) -> Self {
        self.modified_after = after;
        self.modified_before = before;
        self
    }
}

impl EntryCriteria for FilterCriteria {
    fn accepts(&self, attr: u32, size: u64, modified: SystemTime) -> bool {
        if attr & self.attr_mask != self.attr_value {
            return false;
        }
        if let Some(min) = self.min_size {
            if size < min {
                return false;
            }
        }
        if let Some(max) = self.max_size {
            if size > max {
                return false;
            }
        }
        if let Some(after) = self.modified_after {
            if modified < after {
                return false;
            }
        }
        if let Some(before) = self.modified_before {
            if modified > before {
                return false;
            }
        }
        true
    }
}
