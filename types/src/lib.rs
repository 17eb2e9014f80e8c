#![no_std]

mod device;
mod types;

pub use self::{device::*, types::*};
