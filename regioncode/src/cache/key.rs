use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::geo::BoundingBox;

/// Identity of one cached region index.
///
/// Value-equal: two keys with the same resource, column and envelope hash
/// equal and share a cache slot. An envelope, when present, narrows the
/// entry to features intersecting it, and is part of the identity so a
/// windowed index never masquerades as the full dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RegionCacheKey {
    /// Dataset identifier on the tabular backend
    pub resource: String,
    /// Column the index is built over (geometry or key attribute)
    pub column: String,
    /// Optional spatial window
    pub envelope: Option<BoundingBox>,
}

impl RegionCacheKey {
    /// Creates a key covering the whole dataset.
    pub fn new(resource: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            column: column.into(),
            envelope: None,
        }
    }

    /// Narrows the key to a spatial window.
    pub fn with_envelope(mut self, envelope: BoundingBox) -> Self {
        self.envelope = Some(envelope);
        self
    }
}

impl Display for RegionCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.resource, self.column)?;
        if let Some(envelope) = &self.envelope {
            write!(f, " @{}", envelope)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    fn hash_of(key: &RegionCacheKey) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    #[test]
    fn test_value_equality() {
        let a = RegionCacheKey::new("abcd-1234", "the_geom");
        let b = RegionCacheKey::new("abcd-1234", "the_geom");
        assert_eq!(a, b);
        assert_eq!(hash_of(&a), hash_of(&b));
    }

    #[test]
    fn test_envelope_distinguishes_keys() {
        let full = RegionCacheKey::new("abcd-1234", "the_geom");
        let windowed =
            RegionCacheKey::new("abcd-1234", "the_geom").with_envelope(BoundingBox::new(
                0.0, 0.0, 1.0, 1.0,
            ));
        assert_ne!(full, windowed);
    }

    #[test]
    fn test_display_without_envelope() {
        let key = RegionCacheKey::new("abcd-1234", "ward");
        assert_eq!(key.to_string(), "abcd-1234/ward");
    }

    #[test]
    fn test_display_with_envelope() {
        let key = RegionCacheKey::new("abcd-1234", "ward")
            .with_envelope(BoundingBox::new(1.0, 2.0, 3.0, 4.0));
        assert_eq!(key.to_string(), "abcd-1234/ward @1,2,3,4");
    }
}
