pub mod pool;
pub mod schema;
pub mod seed;

pub use pool::*;
pub use schema::*;
pub use seed::*;
