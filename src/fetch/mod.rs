//! Random-access subsystem: coordinate translation and handle caching
//!
//! [`coords`] turns record-relative positions into file byte offsets and
//! reads payload spans; [`handles`] bounds the open file descriptors those
//! reads go through.

pub mod coords;
pub mod handles;
