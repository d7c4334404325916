use sp7rbac::{
    Builder,
    Catalog,
    Registry,
};

pub const CATALOG_JSON: &str = include_str!("../data/catalog.json");

pub fn sample_catalog() -> Catalog {
    Catalog::from_json(CATALOG_JSON)
        .expect("sample catalog must parse")
}

pub fn sample_registry() -> Registry {
    Builder::new()
        .catalog(sample_catalog())
        .build()
        .expect("sample registry must build")
}
