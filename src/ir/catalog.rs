//! Class catalog and raw-category remapping.

use std::collections::{BTreeMap, HashMap};

use super::ids::{ClassIndex, RawCategoryId};
use crate::error::CanonlabelError;

/// Reserved name of class index 0.
pub const BACKGROUND: &str = "BACKGROUND";

/// Ordered, index-stable list of class names.
///
/// Index 0 is always [`BACKGROUND`]; source categories follow in the order
/// the source declared them. The name lookup is exactly the enumeration of
/// the list.
#[derive(Clone, Debug, PartialEq)]
pub struct ClassCatalog {
    names: Vec<String>,
    by_name: HashMap<String, ClassIndex>,
}

impl ClassCatalog {
    /// Builds `[BACKGROUND] + names`.
    ///
    /// # Errors
    /// Fails with [`CanonlabelError::DuplicateClassName`] if a name repeats,
    /// including a source category literally named `BACKGROUND`.
    pub fn with_background<I, S>(names: I) -> Result<Self, CanonlabelError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self {
            names: Vec::new(),
            by_name: HashMap::new(),
        };
        catalog.push(BACKGROUND.to_string())?;
        for name in names {
            catalog.push(name.into())?;
        }
        Ok(catalog)
    }

    fn push(&mut self, name: String) -> Result<(), CanonlabelError> {
        if self.by_name.contains_key(&name) {
            return Err(CanonlabelError::DuplicateClassName(name));
        }
        self.by_name
            .insert(name.clone(), ClassIndex::new(self.names.len()));
        self.names.push(name);
        Ok(())
    }

    /// Number of classes, background included.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Always false: the background class is always present.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn name(&self, index: ClassIndex) -> Option<&str> {
        self.names.get(index.as_usize()).map(String::as_str)
    }

    pub fn index_of(&self, name: &str) -> Option<ClassIndex> {
        self.by_name.get(name).copied()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The name -> index mapping.
    pub fn class_dict(&self) -> &HashMap<String, ClassIndex> {
        &self.by_name
    }

    /// Iterates `(index, name)` pairs in catalog order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassIndex, &str)> + '_ {
        self.names
            .iter()
            .enumerate()
            .map(|(i, name)| (ClassIndex::new(i), name.as_str()))
    }
}

/// Immutable mapping from source category ids to catalog indices starting at 1.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RawCategoryMap {
    map: BTreeMap<RawCategoryId, ClassIndex>,
}

impl RawCategoryMap {
    /// Assigns indices 1, 2, ... to `raw_ids` in iteration order.
    ///
    /// # Errors
    /// Fails with [`CanonlabelError::DuplicateRawCategory`] if an id repeats.
    pub fn from_ordered<I>(raw_ids: I) -> Result<Self, CanonlabelError>
    where
        I: IntoIterator<Item = RawCategoryId>,
    {
        let mut map = BTreeMap::new();
        for (position, raw_id) in raw_ids.into_iter().enumerate() {
            if map.insert(raw_id, ClassIndex::new(position + 1)).is_some() {
                return Err(CanonlabelError::DuplicateRawCategory(raw_id.as_u64()));
            }
        }
        Ok(Self { map })
    }

    pub fn get(&self, raw_id: RawCategoryId) -> Option<ClassIndex> {
        self.map.get(&raw_id).copied()
    }

    /// Remaps `raw_id`, naming `context` in the error when it is unknown.
    pub fn remap(
        &self,
        raw_id: RawCategoryId,
        context: impl FnOnce() -> String,
    ) -> Result<ClassIndex, CanonlabelError> {
        self.get(raw_id)
            .ok_or_else(|| CanonlabelError::UnknownRawCategory {
                raw_id: raw_id.as_u64(),
                context: context(),
            })
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (RawCategoryId, ClassIndex)> + '_ {
        self.map.iter().map(|(raw, idx)| (*raw, *idx))
    }
}
