//! Read-through cache tiers for both raw tick archives ([`byte_cache`])
//! and pre-aggregated day-of-bars ([`bar_cache`]), plus the
//! [`object_store`] abstraction the S3-shaped tiers are built on.

pub mod bar_cache;
pub mod byte_cache;
pub mod object_store;

pub use bar_cache::{create_bar_path, BarCache, DirectBarNoCache, LocalBarCache, S3BarCache};
pub use byte_cache::{ByteCache, LocalByteCache, S3ByteCache};
pub use object_store::{MockObjectStore, ObjectStore, PutRequest};
