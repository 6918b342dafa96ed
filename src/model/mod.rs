pub mod luma;

pub use luma::{LumaDisparity, LumaDisparityConfig};
