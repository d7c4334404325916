// Mirrors `test_sp7::rbac`.  That crate depends on this one, so within
// unit tests its registry is a distinct type from ours.
use crate::{
    catalog::Catalog,
    registry::{
        Builder,
        Registry,
    },
};

pub(crate) fn catalog() -> Catalog {
    Catalog::from_json(include_str!("../../testing/data/catalog.json"))
        .expect("sample catalog must parse")
}

pub(crate) fn registry() -> Registry {
    Builder::new()
        .catalog(catalog())
        .build()
        .expect("sample registry must build")
}
