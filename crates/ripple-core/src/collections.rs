//! Hash maps keyed by host node ids and cache keys. `ahash` unless the
//! `std-hash` feature asks for the standard hasher.

#[cfg(feature = "std-hash")]
pub mod map {
    pub use std::collections::HashMap;
}

#[cfg(not(feature = "std-hash"))]
pub mod map {
    pub type HashMap<K, V> = hashbrown::HashMap<K, V, ahash::RandomState>;
}
