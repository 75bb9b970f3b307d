pub mod constants;
pub mod models;

pub use constants::*;
pub use models::*;
