//! Basic types shared by promap crates.

// lets `#[derive(Data)]` refer to `::promap_common` from within this crate
extern crate self as promap_common;

mod data;

pub use crate::data::Data;
pub use promap_common_macros::Data;
