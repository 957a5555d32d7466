//! Local state module - observable attributes owned by a logical entity
//!
//! Attributes are declared up front with a kind and a default. Every write
//! produces explicit `AttributeChanged` events which are dispatched to the
//! watchers registered for those attribute names.

mod store;
mod types;

pub use store::{LocalState, WatchFn};
pub use types::{AttributeChanged, ParamKind, ParamSpec, PropertyMap, WatcherId};
