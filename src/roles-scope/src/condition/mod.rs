//! Condition trees: integrity checks, breadth-first flattening, content
//! addressing and canonicalization.

pub mod flatten;
pub mod id;
pub mod integrity;
pub mod normalize;

pub use flatten::{check_breadth_first, flatten_condition, unflatten_condition};
pub use id::{condition_address, condition_id, creation_bytecode, pack_conditions};
pub use integrity::{check_condition_integrity, check_node};
pub use normalize::normalize_condition;
