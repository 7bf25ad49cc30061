pub mod analysis;
pub mod backends;
