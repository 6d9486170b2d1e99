//! Conversion helpers shared by the tracker and the binary.

pub mod image_conversion;
pub mod safe_cast;
