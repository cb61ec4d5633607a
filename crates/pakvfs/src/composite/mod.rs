//! Composite containers.
//!
//! - [`ManyCodec`] turns a list of loose files into a flat
//!   [`BinaryArchive`](crate::BinaryArchive), one entry per path.
//! - [`MultiArchive`] joins independent containers under one namespace,
//!   routing each lookup by name prefix.
//!
//! Both resolve ties by declaration order: the first match wins.

mod many;
mod multi;

pub use many::ManyCodec;
pub use multi::MultiArchive;
