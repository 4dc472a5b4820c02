//! Chained hashing over fixed-size pages (spec.md §4.4): `findChain(hash)`
//! returns the head of a bucket's entry chain, `insertEntry(hash)` appends a
//! new entry and links it into the chain. Entries live in a `PagedVector` so
//! growing the map never moves already-inserted entries — only the bucket
//! head pointers change.

use std::hash::Hash;

use crate::paged_vector::PagedVector;

struct Entry<K, V> {
    hash: u64,
    key: K,
    value: V,
    next: Option<usize>,
}

pub struct PagedHashMap<K, V> {
    buckets: Vec<Option<usize>>,
    entries: PagedVector<Entry<K, V>>,
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    use std::hash::Hasher;
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

impl<K: Eq + Hash, V> PagedHashMap<K, V> {
    #[must_use]
    pub fn with_bucket_count(bucket_count: usize) -> Self {
        Self {
            buckets: vec![None; bucket_count.max(1)],
            entries: PagedVector::new(),
        }
    }

    fn bucket_index(&self, hash: u64) -> usize {
        (hash as usize) % self.buckets.len()
    }

    /// Head of the chain for `hash`'s bucket, or `None` if the bucket is
    /// empty.
    #[must_use]
    pub fn find_chain(&self, hash: u64) -> Option<usize> {
        self.buckets[self.bucket_index(hash)]
    }

    /// Appends a new entry and links it to the front of its bucket's
    /// chain, returning the new entry's index.
    pub fn insert_entry(&mut self, hash: u64, key: K, value: V) -> usize {
        let bucket = self.bucket_index(hash);
        let next = self.buckets[bucket];
        let index = self.entries.len();
        self.entries.push(Entry {
            hash,
            key,
            value,
            next,
        });
        self.buckets[bucket] = Some(index);
        index
    }

    fn probe(&self, hash: u64, key: &K) -> Option<usize> {
        let mut cursor = self.find_chain(hash);
        while let Some(index) = cursor {
            let entry = self.entries.get(index).expect("chain index always valid");
            if entry.hash == hash && entry.key == *key {
                return Some(index);
            }
            cursor = entry.next;
        }
        None
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = hash_of(key);
        self.probe(hash, key).map(|i| &self.entries.get(i).unwrap().value)
    }

    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = hash_of(key);
        let index = self.probe(hash, key)?;
        Some(&mut self.entries.get_mut(index).unwrap().value)
    }

    /// Hash the key, probe its chain, and either return the existing
    /// entry or insert a fresh one built from `make` (spec.md §4.4's "hash
    /// key, probe or insert entry, apply lift").
    pub fn get_or_insert_with(&mut self, key: K, make: impl FnOnce() -> V) -> &mut V {
        let hash = hash_of(&key);
        let index = match self.probe(hash, &key) {
            Some(index) => index,
            None => self.insert_entry(hash, key, make()),
        };
        &mut self.entries.get_mut(index).unwrap().value
    }

    pub fn iter(&self) -> impl Iterator<Item = (&K, &V)> {
        self.entries.iter().map(|entry| (&entry.key, &entry.value))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Folds `other`'s entries into `self`, applying `combine` wherever a
    /// key is present on both sides — the keyed half of spec.md §4.4's
    /// "combines per-worker partial slices into one global slice".
    pub fn merge(&mut self, other: PagedHashMap<K, V>, combine: impl Fn(&mut V, V)) {
        for entry in other.entries {
            let existing = self.get_mut(&entry.key);
            match existing {
                Some(value) => combine(value, entry.value),
                None => {
                    self.insert_entry(entry.hash, entry.key, entry.value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_then_find_round_trips() {
        let mut map: PagedHashMap<u64, i64> = PagedHashMap::with_bucket_count(4);
        *map.get_or_insert_with(1, || 0) += 10;
        *map.get_or_insert_with(1, || 0) += 5;
        *map.get_or_insert_with(2, || 0) += 1;
        assert_eq!(*map.get(&1).unwrap(), 15);
        assert_eq!(*map.get(&2).unwrap(), 1);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn colliding_keys_chain_without_clobbering_each_other() {
        // bucket_count = 1 forces every key into the same chain.
        let mut map: PagedHashMap<u64, i64> = PagedHashMap::with_bucket_count(1);
        for k in 0..20 {
            *map.get_or_insert_with(k, || 0) += k as i64;
        }
        for k in 0..20 {
            assert_eq!(*map.get(&k).unwrap(), k as i64);
        }
    }
}
