use crate::ac::traits::{
    PermissionBackend,
    RoleBackend,
};

/// AuthzPlatform - Authorization Platform
///
/// The external authorization service as seen by the permission engine.
///
/// This trait is applicable to everything that correctly implements the
/// relevant backends that compose this trait.
pub trait AuthzPlatform: PermissionBackend
    + RoleBackend

    + Send
    + Sync
{
    fn as_dyn(&self) -> &dyn AuthzPlatform;
}

impl<P: PermissionBackend
    + RoleBackend

    + Send
    + Sync
> AuthzPlatform for P {
    fn as_dyn(&self) -> &(dyn AuthzPlatform) {
        self
    }
}
