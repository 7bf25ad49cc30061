pub mod analyze;
pub mod backends;

pub use analyze::*;
pub use backends::*;
