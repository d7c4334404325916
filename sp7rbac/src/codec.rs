//! Conversion between stored and editable policies
//!
//! The backend stores grants as `{resource: [actions]}` with wildcard
//! actions and one entry per concrete table.  Editors instead see a list
//! of [`Policy`](sp7core::ac::Policy) records with wildcards expanded,
//! tables folded into their tools where possible, and the internal field
//! sentinel hidden.  [`PolicyCodec::decode`] and [`PolicyCodec::encode`]
//! convert between the two such that `encode(decode(x))` grants exactly
//! what `x` grants, plus the basic policies implied by collection
//! access.

use crate::registry::Registry;

#[derive(Clone, Copy)]
pub struct PolicyCodec<'r> {
    registry: &'r Registry,
}

mod impls;
