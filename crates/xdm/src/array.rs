use crate::item::Item;

/// An array: an ordered list of members, each of which may itself be a sequence.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct XdmArray {
    members: Vec<Item>,
}

impl XdmArray {
    pub fn new(members: Vec<Item>) -> Self {
        Self { members }
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// 1-based member access.
    pub fn get(&self, position: usize) -> Option<&Item> {
        position.checked_sub(1).and_then(|i| self.members.get(i))
    }

    pub fn members(&self) -> &[Item] {
        &self.members
    }
}

impl FromIterator<Item> for XdmArray {
    fn from_iter<T: IntoIterator<Item = Item>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
