pub mod permission;
pub mod policy;
pub mod query;
pub mod resource;
pub mod role;
pub mod traits;

pub use self::policy::{Policy, StoredPolicies, merge_duplicates};
pub use self::resource::ResourcePath;
