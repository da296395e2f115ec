//! Core data model: providers, share descriptors, and file descriptors.
//!
//! These types are the currency every other module trades in:
//! - [`Provider`] - enumeration of supported services with URL matching
//! - [`ShareDescriptor`] - one normalized resolution request
//! - [`Extras`] - the write-once side channel between engine and adapter
//! - [`FileDescriptor`] - one file or folder node in a listing

mod descriptor;
mod file;
mod provider;

pub use descriptor::{ShareDescriptor, ShareDescriptorBuilder};
pub use descriptor::{Extras, extras_keys};
pub use file::{FileDescriptor, FileKind, human_size};
pub use provider::Provider;
