//! Descriptor readiness layer.
//!
//! Sockets in this crate are non-blocking; every blocking call is a loop of
//! "try the syscall, wait until the descriptor is ready, retry". This module
//! provides the waiting half:
//! - [`descriptor_set`]: the [`DescriptorSet`] abstraction with the native
//!   bitmask layout and a portable count-prefixed layout
//! - [`readiness`]: `select(2)` waits over sets or a single descriptor
//!
//! [`DescriptorSet`]: descriptor_set::DescriptorSet

pub mod descriptor_set;
pub(crate) mod fd;
pub mod readiness;
