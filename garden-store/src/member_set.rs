//! Sorted address set used for strategy participation and allowlists.

use serde::{Deserialize, Deserializer, Serialize};

use crate::address::Address;

/// A set of addresses kept as a sorted vector.
///
/// Serialises as a plain list so the query layer sees an ordinary array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct MemberSet(Vec<Address>);

impl MemberSet {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Insert an address. Returns `false` when it was already present.
    pub fn insert(&mut self, address: Address) -> bool {
        match self.0.binary_search(&address) {
            Ok(_) => false,
            Err(pos) => {
                self.0.insert(pos, address);
                true
            }
        }
    }

    /// Remove an address. Returns `false` when it was not present.
    pub fn remove(&mut self, address: &Address) -> bool {
        match self.0.binary_search(address) {
            Ok(pos) => {
                self.0.remove(pos);
                true
            }
            Err(_) => false,
        }
    }

    pub fn contains(&self, address: &Address) -> bool {
        self.0.binary_search(address).is_ok()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Address> {
        self.0.iter()
    }
}

impl FromIterator<Address> for MemberSet {
    fn from_iter<I: IntoIterator<Item = Address>>(iter: I) -> Self {
        let mut set = Self::new();
        for address in iter {
            set.insert(address);
        }
        set
    }
}

// Deserialising normalises any list to sorted and de-duplicated.
impl<'de> Deserialize<'de> for MemberSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = Vec::<Address>::deserialize(deserializer)?;
        Ok(raw.into_iter().collect())
    }
}
