pub mod config;
pub mod token;
pub mod utils;

pub use self::config::*;
pub use self::token::*;
pub use self::utils::*;
