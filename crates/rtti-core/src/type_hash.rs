//! Deterministic hash-based identity for properties and functions.
//!
//! [`TypeHash`] is a 64-bit hash computed from names, so the same name always
//! produces the same hash regardless of registration order. The registry uses
//! it as the key of its property and function maps.
//!
//! # Hash Computation
//!
//! Uses XXHash64 with domain-specific mixing constants so that a type, a
//! property and a function sharing a name never collide.
//!
//! # Examples
//!
//! ```
//! use rtti_core::TypeHash;
//!
//! let a = TypeHash::from_property("Mesh", "material");
//! let b = TypeHash::from_property("Mesh", "material");
//! assert_eq!(a, b);
//! assert_ne!(a, TypeHash::from_property("Light", "material"));
//! ```

use std::fmt;
use xxhash_rust::xxh64::xxh64;

/// Mixing constants, one per hash domain.
pub mod hash_constants {
    /// Separator constant for path components (owner and member names).
    pub const SEP: u64 = 0x4bc94d6bd06053ad;

    /// Types.
    pub const TYPE: u64 = 0x2fac10b63a6cc57c;

    /// Free functions.
    pub const FUNCTION: u64 = 0x5ea77ffbcdf5f302;

    /// Methods.
    pub const METHOD: u64 = 0x7d3c8b4a92e15f6d;

    /// Properties.
    pub const PROPERTY: u64 = 0x1a095090689d4647;

    /// One constant per parameter slot so that `(a, b)` and `(b, a)` differ.
    pub const PARAM_MARKERS: [u64; 8] = [
        0x9e3779b97f4a7c15,
        0xbf58476d1ce4e5b9,
        0x94d049bb133111eb,
        0xd6e8feb86659fd93,
        0xe7037ed1a0b428db,
        0xc6a4a7935bd1e995,
        0x8648dbbc94d49b8d,
        0xa2b48b2c69e0d657,
    ];
}

/// A deterministic 64-bit hash identifying a type, property or function.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct TypeHash(pub u64);

impl TypeHash {
    /// Hash of a registered type name.
    #[inline]
    pub fn from_name(name: &str) -> Self {
        TypeHash(hash_constants::TYPE ^ xxh64(name.as_bytes(), 0))
    }

    /// Hash of `owner::name`.
    #[inline]
    pub fn from_property(owner: &str, name: &str) -> Self {
        let owner_hash = xxh64(owner.as_bytes(), 0);
        let name_hash = xxh64(name.as_bytes(), 0);
        TypeHash(
            (hash_constants::PROPERTY ^ owner_hash)
                .wrapping_mul(hash_constants::SEP)
                .wrapping_add(name_hash),
        )
    }

    /// Hash of a free function and its parameter types, in order.
    #[inline]
    pub fn from_function(name: &str, param_hashes: &[TypeHash]) -> Self {
        Self::mix_params(hash_constants::FUNCTION ^ xxh64(name.as_bytes(), 0), param_hashes)
    }

    #[inline]
    pub fn from_method(owner: TypeHash, name: &str, param_hashes: &[TypeHash]) -> Self {
        Self::mix_params(
            hash_constants::METHOD ^ owner.0 ^ xxh64(name.as_bytes(), 0),
            param_hashes,
        )
    }

    fn mix_params(mut hash: u64, param_hashes: &[TypeHash]) -> Self {
        for (i, param) in param_hashes.iter().enumerate() {
            let marker = hash_constants::PARAM_MARKERS
                .get(i)
                .copied()
                .unwrap_or_else(|| hash_constants::PARAM_MARKERS[0].wrapping_add(i as u64));
            hash = hash.wrapping_mul(hash_constants::SEP).wrapping_add(marker ^ param.0);
        }
        TypeHash(hash)
    }
}

impl fmt::Debug for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeHash({:#018x})", self.0)
    }
}

impl fmt::Display for TypeHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#018x}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_hash_is_deterministic() {
        assert_eq!(TypeHash::from_name("int"), TypeHash::from_name("int"));
        assert_ne!(TypeHash::from_name("int"), TypeHash::from_name("uint"));
    }

    #[test]
    fn domains_do_not_collide() {
        let ty = TypeHash::from_name("value");
        let func = TypeHash::from_function("value", &[]);
        let prop = TypeHash::from_property("", "value");
        assert_ne!(ty, func);
        assert_ne!(ty, prop);
        assert_ne!(func, prop);
    }

    #[test]
    fn property_hash_depends_on_owner() {
        assert_ne!(
            TypeHash::from_property("Mesh", "name"),
            TypeHash::from_property("Texture", "name")
        );
    }

    #[test]
    fn parameter_order_matters() {
        let int = TypeHash::from_name("int");
        let float = TypeHash::from_name("float");
        assert_ne!(
            TypeHash::from_function("lerp", &[int, float]),
            TypeHash::from_function("lerp", &[float, int])
        );
    }

    #[test]
    fn method_hash_depends_on_owner() {
        let a = TypeHash::from_name("A");
        let b = TypeHash::from_name("B");
        assert_ne!(
            TypeHash::from_method(a, "update", &[]),
            TypeHash::from_method(b, "update", &[])
        );
    }
}
