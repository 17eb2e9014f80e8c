//!
//! Implementation agnostic binding slot allocator
//! and resource state tracker for D3D12 like APIs.
//!

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod allocator;
mod cache;
mod config;
mod error;
mod free_list;
mod layout;
mod persistent;
mod state;
mod transient;

pub use {
    self::{
        allocator::*, cache::*, config::*, error::*, free_list::*, layout::*, persistent::*,
        state::*, transient::*,
    },
    gpu_slot_types::*,
};
