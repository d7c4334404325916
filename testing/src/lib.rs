pub mod core;
pub mod rbac;

mod utils;
pub use utils::*;
