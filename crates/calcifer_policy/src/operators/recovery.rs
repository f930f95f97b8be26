//! Error-handling operators.

use calcifer_core::Document;
use tracing::debug;

use crate::operators::annotation::wrap_context;
use crate::policy::Policy;

/// Run `policy`; an evaluation fault restores the input branch and records
/// the fault as an error. The branch stays live.
pub fn attempt(policy: Policy) -> Policy {
    Policy::new(format!("attempt({})", policy.label()), move |ctx| {
        match policy.run(ctx.clone()) {
            Ok(branches) => Ok(branches),
            Err(fault) => {
                debug!("Recovered fault at {}: {}", ctx.cursor(), fault);
                Ok(vec![ctx.record_error(fault.to_string())])
            }
        }
    })
}

/// Run `policy`; if it faults or prunes every branch, run `handler` on the
/// input branch instead.
///
/// The handler sees the fault message as the branch result, or `null` when
/// the body pruned.
pub fn attempt_or(policy: Policy, handler: Policy) -> Policy {
    Policy::new(
        format!("attempt_or({}, {})", policy.label(), handler.label()),
        move |ctx| {
            let failure = match policy.run(ctx.clone()) {
                Ok(branches) if !branches.is_empty() => return Ok(branches),
                Ok(_) => Document::Null,
                Err(fault) => {
                    debug!("Handling fault at {}: {}", ctx.cursor(), fault);
                    Document::from(fault.to_string())
                }
            };
            handler.run(ctx.with_result(failure))
        },
    )
}

/// Run `policy`; if it prunes every branch, pass the input through.
pub fn optional(policy: Policy) -> Policy {
    Policy::new(format!("optional({})", policy.label()), move |ctx| {
        let branches = policy.run(ctx.clone())?;
        if branches.is_empty() {
            return Ok(vec![ctx]);
        }
        Ok(branches)
    })
}

/// Run `policy` only on branches without error records.
pub fn unless_errors(policy: Policy) -> Policy {
    Policy::new(format!("unless_errors({})", policy.label()), move |ctx| {
        if ctx.has_errors() {
            return Ok(vec![ctx]);
        }
        policy.run(ctx)
    })
}

/// Annotate `policy` with `label` and log when it is entered.
pub fn trace(label: impl Into<String>, policy: Policy) -> Policy {
    let label = label.into();
    let wrapped = wrap_context(label.clone(), policy);
    Policy::new(format!("trace({:?})", label), move |ctx| {
        debug!("trace {} at {}", label, ctx.cursor());
        wrapped.run(ctx)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{collect, fail, matches, select, set_value, unit};
    use crate::policy::Arg;
    use crate::policy::Criterion;
    use calcifer_core::{Context, Document};
    use serde_json::{json, Value};

    fn seed(value: Value) -> Context {
        Context::seed(Document::from(value))
    }

    #[test]
    fn test_attempt_recovers_fault() {
        let policy = attempt(collect(vec![set_value(1), select("/s/x")]));
        let out = policy.run(seed(json!({"s": 3}))).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].is_terminal());
        assert_eq!(Value::from(out[0].root()), json!({"s": 3}));
        assert!(out[0].shared_errors()[0].message.contains("Path not found"));
    }

    #[test]
    fn test_attempt_without_fault_is_transparent() {
        let out = attempt(unit()).run(seed(json!(1))).unwrap();
        assert_eq!(out.len(), 1);
        assert!(!out[0].has_errors());
    }

    #[test]
    fn test_attempt_or_runs_handler_on_fault() {
        let handler = collect(vec![select("/reason"), set_value(Arg::Result)]);
        let policy = attempt_or(select("/s/x"), handler);
        let out = policy.run(seed(json!({"s": 3}))).unwrap();
        assert_eq!(out.len(), 1);
        let reason = out[0].root().get("reason").and_then(Document::as_str).unwrap();
        assert!(reason.contains("Path not found"));
    }

    #[test]
    fn test_attempt_or_runs_handler_on_prune() {
        let policy = attempt_or(matches(Criterion::equals(2)), fail("not two"));
        let out = policy.run(seed(json!(1))).unwrap();
        assert!(out[0].is_terminal());
        assert_eq!(out[0].shared_errors()[0].message, "not two");

        let kept = policy.run(seed(json!(2))).unwrap();
        assert!(!kept[0].is_terminal());
        assert!(!kept[0].has_errors());
    }

    #[test]
    fn test_optional_passes_through_on_empty() {
        let out = optional(matches(Criterion::equals(2))).run(seed(json!(1))).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].current(), &Document::from(1));
    }

    #[test]
    fn test_unless_errors() {
        let guarded = unless_errors(set_value("touched"));
        let clean = guarded.run(seed(json!(null))).unwrap();
        assert_eq!(clean[0].current(), &Document::from("touched"));

        let dirty = seed(json!(null)).record_error("earlier");
        let out = guarded.run(dirty).unwrap();
        assert!(out[0].current().is_null());
    }

    #[test]
    fn test_trace_annotates_errors() {
        let out = trace("stage", fail("bad")).run(seed(json!({}))).unwrap();
        assert_eq!(out[0].shared_errors()[0].annotation_path, vec!["stage".to_string()]);
        assert!(out[0].annotations().is_empty());
    }
}
