//! Crate used to run SD cards as a block device over an SDIO host controller
//!
//! The host-controller specifics sit behind the [`host::SdHost`] trait, so
//! the adapter drives any vendor peripheral driver that can satisfy it, and
//! a plain mock in tests.

#![no_std]

#[cfg(test)]
extern crate std;

pub mod card;
pub mod config;
pub mod errors;
pub mod host;
pub mod io;
pub mod sd;

#[cfg(test)]
pub(crate) mod mock;
