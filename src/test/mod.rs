pub mod db;
pub mod utils;

pub use utils::*;
