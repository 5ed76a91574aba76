// MiniTalk Fast Hashing - map aliases for hot dispatch paths.
//
// Method caches and globals are probed on every send; route them all
// through one hasher choice.

pub type HashMap<K, V> = std::collections::HashMap<K, V, ahash::RandomState>;
pub type HashSet<T> = std::collections::HashSet<T, ahash::RandomState>;
