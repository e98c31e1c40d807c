//! vodgate — an HTTP gateway in front of a single object-storage bucket.
//!
//! Two request classes are served against the bucket:
//!
//! - **Range proxy**: `GET`/`HEAD` requests for one object, translating HTTP
//!   `Range` semantics into storage-layer partial reads and storage metadata
//!   back into HTTP headers.
//! - **Manifest mapper**: given a key prefix, enumerates matching objects and
//!   emits the ordered JSON sequences/clips document consumed by a downstream
//!   stream-assembly module.
//!
//! The gateway holds no cache and no write path; every request re-queries the
//! store with whatever credential the store client was built with.

pub mod core;
pub mod gateway;
pub mod storage;
pub mod vod;
