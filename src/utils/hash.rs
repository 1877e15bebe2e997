use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{BuildHasherDefault, Hash, Hasher};

/// A `HashMap` with a deterministic hasher, the keys used across the renderer
/// are small integers or pre-hashed names.
pub type FastHashMap<K, V> = HashMap<K, V, BuildHasherDefault<DefaultHasher>>;

/// A `HashSet` with a deterministic hasher.
pub type FastHashSet<K> = HashSet<K, BuildHasherDefault<DefaultHasher>>;

/// Hashes a value into 64 bits.
#[inline]
pub fn hash64<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut state = DefaultHasher::new();
    v.hash(&mut state);
    state.finish()
}
