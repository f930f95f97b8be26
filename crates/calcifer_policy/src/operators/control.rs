//! Control-flow operators.

use calcifer_core::{Context, CoreResult, Document, Path};
use tracing::trace;

use crate::builder::Op;
use crate::policy::{ApplyFn, Arg, BindFn, CheckFn, Policy};

/// The identity policy.
pub fn unit() -> Policy {
    Policy::new("unit()", |ctx| Ok(vec![ctx]))
}

/// Set the branch result to a constant.
pub fn unit_value(value: impl Into<Document>) -> Policy {
    let value = value.into();
    Policy::new(format!("unit_value({})", value), move |ctx| {
        Ok(vec![ctx.with_result(value.clone())])
    })
}

/// Thread every output of one policy into the next, depth-first.
pub fn collect(policies: Vec<Policy>) -> Policy {
    let label = policies
        .iter()
        .map(Policy::label)
        .collect::<Vec<_>>()
        .join(" >> ");
    Policy::new(label, move |ctx| {
        let mut branches = vec![ctx];
        for policy in &policies {
            branches = policy.run_all(branches)?;
            if branches.is_empty() {
                break;
            }
        }
        Ok(branches)
    })
}

/// Alias of [`collect`].
pub fn policies(policies: Vec<Policy>) -> Policy {
    collect(policies)
}

fn restore_cursor(branches: Vec<Context>, cursor: &Path) -> CoreResult<Vec<Context>> {
    branches
        .into_iter()
        .map(|branch| branch.with_cursor(cursor.clone()))
        .collect()
}

/// Run `policy` at `selector`, then move every output back.
pub fn regarding(selector: impl Into<String>, policy: Policy) -> Policy {
    let selector = selector.into();
    Policy::new(
        format!("regarding({:?}, {})", selector, policy.label()),
        move |ctx| {
            let saved = ctx.cursor().clone();
            let inner = ctx.select(&selector)?;
            restore_cursor(policy.run(inner)?, &saved)
        },
    )
}

/// Read the node at `selector` into the result and run `policy` where the
/// cursor already is.
pub fn given(selector: impl Into<String>, policy: Policy) -> Policy {
    let selector = selector.into();
    Policy::new(
        format!("given({:?}, {})", selector, policy.label()),
        move |ctx| {
            let saved = ctx.cursor().clone();
            let at = saved.resolve(&selector)?;
            let value = ctx.root().node(&at).cloned().unwrap_or_default();
            restore_cursor(policy.run(ctx.with_result(value))?, &saved)
        },
    )
}

/// Evaluate a predicate and remember whether it held.
pub fn check(name: impl Into<String>, predicate: CheckFn, args: Vec<Arg>) -> Policy {
    let name = name.into();
    Policy::new(format!("check({})", name), move |ctx| {
        let values = Arg::resolve_all(&args, &ctx)?;
        let held = predicate(&values).map_err(|fault| fault.into_core(name.clone()))?;
        trace!("check {} at {}: {}", name, ctx.cursor(), held);
        Ok(vec![ctx.with_check(name.clone(), held)])
    })
}

/// Call a function on resolved arguments and keep its return as the result.
pub fn apply(name: impl Into<String>, function: ApplyFn, args: Vec<Arg>) -> Policy {
    let name = name.into();
    Policy::new(format!("apply({})", name), move |ctx| {
        let values = Arg::resolve_all(&args, &ctx)?;
        let result = function(&values).map_err(|fault| fault.into_core(name.clone()))?;
        Ok(vec![ctx.with_result(result)])
    })
}

/// Build the continuation from the current result.
pub fn with_value(name: impl Into<String>, binder: BindFn) -> Policy {
    let name = name.into();
    Policy::new(format!("with_value({})", name), move |ctx| {
        let op: Op = binder(ctx.result()).map_err(|fault| fault.into_core(name.clone()))?;
        op.compile().run(ctx)
    })
}

/// One branch per element. Same fan-out as `children`.
pub fn each() -> Policy {
    Policy::new("each()", |ctx| Ok(ctx.children()))
}

/// Run `policy` inside each element, restoring the parent cursor.
pub fn for_each(policy: Policy) -> Policy {
    Policy::new(format!("for_each({})", policy.label()), move |ctx| {
        let saved = ctx.cursor().clone();
        let mut out = Vec::new();
        for child in ctx.children() {
            out.extend(restore_cursor(policy.run(child)?, &saved)?);
        }
        Ok(out)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{fail, select, set_value};
    use calcifer_core::{CoreError, Fault};
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn seed(value: Value) -> Context {
        Context::seed(Document::from(value))
    }

    #[test]
    fn test_collect_threads_branches() {
        let policy = collect(vec![select("list"), each(), set_value(0)]);
        let out = policy.run(seed(json!({"list": [1, 2, 3]}))).unwrap();
        assert_eq!(out.len(), 3);
        let paths: Vec<String> = out.iter().map(|c| c.cursor().to_string()).collect();
        assert_eq!(paths, vec!["/list/0", "/list/1", "/list/2"]);
    }

    #[test]
    fn test_empty_collect_is_unit() {
        let out = collect(Vec::new()).run(seed(json!({"a": 1}))).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    fn test_regarding_restores_cursor_on_forbidden_branches() {
        let policy = regarding("/deep/er", fail("nope"));
        let ctx = seed(json!({})).select("/top").unwrap();
        let out = policy.run(ctx).unwrap();
        assert_eq!(out.len(), 1);
        assert!(out[0].is_terminal());
        assert_eq!(out[0].cursor().to_string(), "/top");
        assert_eq!(out[0].shared_errors()[0].document_path.to_string(), "/deep/er");
    }

    #[test]
    fn test_given_reads_without_moving() {
        let policy = given("/limit", set_value(Arg::Result));
        let ctx = seed(json!({"limit": 9, "x": null})).select("/x").unwrap();
        let out = policy.run(ctx).unwrap();
        assert_eq!(out[0].cursor().to_string(), "/x");
        assert_eq!(Value::from(out[0].root()), json!({"limit": 9, "x": 9}));
    }

    #[test]
    fn test_check_records_outcome() {
        let predicate: CheckFn = Arc::new(|args| Ok(args[0] == Document::from(3)));
        let out = check("is_three", predicate, vec![Arg::Cursor])
            .run(seed(json!(3)))
            .unwrap();
        let outcome = out[0].last_check().unwrap();
        assert_eq!(outcome.name, "is_three");
        assert!(outcome.held);
    }

    #[test]
    fn test_apply_fault_names_callback() {
        let function: ApplyFn = Arc::new(|_| Err(Fault::new("boom")));
        let err = apply("explode", function, Vec::new())
            .run(seed(json!({})))
            .unwrap_err();
        assert_eq!(
            err,
            CoreError::Callback {
                name: "explode".to_string(),
                message: "boom".to_string()
            }
        );
    }

    #[test]
    fn test_with_value_builds_continuation() {
        let binder: BindFn = Arc::new(|result| {
            Ok(Op::Select {
                selector: result.as_str().unwrap_or("").to_string(),
            })
        });
        let ctx = seed(json!({"target": null})).with_result(Document::from("/target"));
        let out = with_value("goto", binder).run(ctx).unwrap();
        assert_eq!(out[0].cursor().to_string(), "/target");
    }

    #[test]
    fn test_for_each_restores_parent() {
        let policy = collect(vec![select("list"), for_each(set_value(true))]);
        let out = policy.run(seed(json!({"list": [false, false]}))).unwrap();
        assert_eq!(out.len(), 2);
        assert!(out.iter().all(|c| c.cursor().to_string() == "/list"));
        assert_eq!(Value::from(out[1].root()), json!({"list": [false, true]}));
    }

    #[test]
    fn test_each_over_scalar_prunes() {
        let out = each().run(seed(json!(1))).unwrap();
        assert!(out.is_empty());
    }
}
