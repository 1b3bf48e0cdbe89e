// Utils module
pub mod directory_utils;

pub use directory_utils::*;
