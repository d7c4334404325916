pub(crate) mod cache;
pub mod correction;
pub mod error;
pub mod platform;
pub mod resolution;

pub use cache::FetchState;
pub use platform::Platform;
