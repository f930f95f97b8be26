//! Navigation and mutation operators.

use calcifer_core::Document;
use tracing::trace;

use crate::policy::{Arg, Policy};

/// Move the cursor. Missing mapping keys are created as null.
pub fn select(selector: impl Into<String>) -> Policy {
    let selector = selector.into();
    Policy::new(format!("select({:?})", selector), move |ctx| {
        let moved = ctx.select(&selector)?;
        trace!("select {:?} -> {}", selector, moved.cursor());
        Ok(vec![moved])
    })
}

/// Put the cursor node into the branch result.
pub fn get_node() -> Policy {
    Policy::new("get_node()", |ctx| {
        let node = ctx.current().clone();
        Ok(vec![ctx.with_result(node)])
    })
}

/// Put the cursor value into the branch result.
///
/// Nodes and values share one representation, so this reads the same thing
/// as [`get_node`]; both spellings are kept for readability of chains.
pub fn get_value() -> Policy {
    Policy::new("get_value()", |ctx| {
        let value = ctx.current().clone();
        Ok(vec![ctx.with_result(value)])
    })
}

/// Put the cursor path, in its string form, into the branch result.
pub fn path() -> Policy {
    Policy::new("path()", |ctx| {
        let path = Document::from(ctx.cursor().to_string());
        Ok(vec![ctx.with_result(path)])
    })
}

pub fn set_value(value: impl Into<Arg>) -> Policy {
    let value = value.into();
    Policy::new(format!("set_value({})", value), move |ctx| {
        let resolved = value.resolve(&ctx)?;
        trace!("set {} = {}", ctx.cursor(), resolved);
        Ok(vec![ctx.set_value(resolved)?])
    })
}

/// Union a value into the sequence under the cursor.
pub fn append_value(value: impl Into<Arg>) -> Policy {
    let value = value.into();
    Policy::new(format!("append_value({})", value), move |ctx| {
        let resolved = value.resolve(&ctx)?;
        trace!("append {} += {}", ctx.cursor(), resolved);
        Ok(vec![ctx.append_value(resolved)?])
    })
}

/// Bind the cursor value to `name` for later `Arg::Bound` lookups.
pub fn define_as(name: impl Into<String>) -> Policy {
    let name = name.into();
    Policy::new(format!("define_as({:?})", name), move |ctx| {
        let value = ctx.current().clone();
        Ok(vec![ctx.bind(name.clone(), value)])
    })
}

/// One branch per immediate child of the cursor node.
pub fn children() -> Policy {
    Policy::new("children()", |ctx| {
        let branches = ctx.children();
        trace!("children of {}: {}", ctx.cursor(), branches.len());
        Ok(branches)
    })
}
