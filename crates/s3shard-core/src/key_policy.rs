//! Routing-key derivation.
//!
//! Objects that share their first two `/`-separated segments are placed on the
//! same partition, e.g. every block file of one tenant's trace block:
//!
//! ```
//! use s3shard_core::key_policy::derive_routing_key;
//!
//! assert_eq!(
//!     derive_routing_key("single-tenant/0003b3c9-8689-41a6-835c-1374ce2d5879/bloom-0"),
//!     "single-tenant/0003b3c9-8689-41a6-835c-1374ce2d5879"
//! );
//! assert_eq!(derive_routing_key("simple-file"), "simple-file");
//! ```

/// Derive the routing key of `object_key`.
///
/// Equivalent to splitting on `/` into at most three parts and joining the
/// first two back with `/`; keys with no `/` are returned unchanged. Anything
/// after the second `/` is ignored. No slash normalization is done, so
/// `"a/"` routes as `"a/"` and `"/a/b"` routes as `"/a"`.
///
/// The result always borrows a prefix of the input.
#[must_use]
pub fn derive_routing_key(object_key: &str) -> &str {
    let Some(first) = object_key.find('/') else {
        return object_key;
    };
    match object_key[first + 1..].find('/') {
        Some(second) => &object_key[..first + 1 + second],
        None => object_key,
    }
}
