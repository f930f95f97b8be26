//! The operator library.
//!
//! Every function here returns a [`Policy`](crate::Policy). Operators that
//! take a policy run it as a sub-chain and decide what happens to its
//! outputs.

pub mod annotation;
pub mod constraint;
pub mod control;
pub mod navigation;
pub mod recovery;

pub use annotation::{pop_context, push_context, wrap_context};
pub use constraint::{
    choose, fail, forbid, forbid_value, matches, permit_values, require, require_value,
};
pub use control::{
    apply, check, collect, each, for_each, given, policies, regarding, unit, unit_value,
    with_value,
};
pub use navigation::{append_value, children, define_as, get_node, get_value, path, select, set_value};
pub use recovery::{attempt, attempt_or, optional, trace, unless_errors};
