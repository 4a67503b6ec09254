pub mod arena;
pub mod logging;
pub mod math;
