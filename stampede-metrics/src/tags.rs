use smallvec::SmallVec;

use crate::key::KeyId;

/// Sorted, deduplicated list of interned `key=value` pairs identifying one series.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct TagSet {
    // Request series carry four tags; keep them inline.
    pub(crate) tags: SmallVec<[(KeyId, KeyId); 4]>,
}

impl TagSet {
    /// Builds a tag set from arbitrary pairs. Later duplicates of a key win.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (KeyId, KeyId)>) -> Self {
        let mut tags: SmallVec<[(KeyId, KeyId); 4]> = SmallVec::new();
        for (k, v) in pairs {
            match tags.iter_mut().find(|(existing, _)| *existing == k) {
                Some(slot) => slot.1 = v,
                None => tags.push((k, v)),
            }
        }
        tags.sort_unstable_by_key(|(k, _)| *k);
        Self { tags }
    }

    pub fn is_empty(&self) -> bool {
        self.tags.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tags.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (KeyId, KeyId)> + '_ {
        self.tags.iter().copied()
    }

    pub fn get(&self, key: KeyId) -> Option<KeyId> {
        let idx = self.tags.partition_point(|(k, _)| *k < key);
        self.tags
            .get(idx)
            .and_then(|(k, v)| (*k == key).then_some(*v))
    }

    /// Keeps only the given keys, in the order they appear in the set.
    pub fn project(&self, keys: &[KeyId]) -> TagSet {
        let tags = self
            .tags
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .copied()
            .collect();
        TagSet { tags }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_pairs_sorts_and_overrides_duplicates() {
        let a = KeyId::from(1);
        let b = KeyId::from(2);
        let c = KeyId::from(3);

        let set = TagSet::from_pairs([(c, a), (a, b), (c, b)]);
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(a), Some(b));
        assert_eq!(set.get(c), Some(b));
        assert_eq!(set.get(b), None);
        assert_eq!(set.iter().map(|(k, _)| k).collect::<Vec<_>>(), vec![a, c]);
    }

    #[test]
    fn project_drops_unlisted_keys() {
        let a = KeyId::from(1);
        let b = KeyId::from(2);
        let set = TagSet::from_pairs([(a, a), (b, b)]);
        let projected = set.project(&[b]);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected.get(b), Some(b));
        assert!(set.project(&[]).is_empty());
    }
}
