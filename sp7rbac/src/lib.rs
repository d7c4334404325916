pub mod catalog;
pub mod codec;
pub mod compressor;
pub mod error;
pub mod registry;
#[cfg(test)]
mod testing;

pub use crate::{
    catalog::Catalog,
    codec::PolicyCodec,
    registry::{
        Builder,
        Registry,
    },
};
