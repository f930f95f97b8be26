//! Non-determinism and constraint operators.
//!
//! Pruning drops a branch silently. Forbidding keeps it in the explored set
//! as a terminal branch carrying an error record.

use calcifer_core::{CoreError, Document};
use tracing::debug;

use crate::policy::{Arg, Criterion, Policy};

/// Keep the branch only if the cursor value meets `criterion`.
pub fn matches(criterion: Criterion) -> Policy {
    Policy::new(format!("match({})", criterion), move |ctx| {
        if criterion.matches(ctx.current()) {
            return Ok(vec![ctx]);
        }
        debug!(
            "Pruned at {}: {} does not match {}",
            ctx.cursor(),
            ctx.current(),
            criterion
        );
        Ok(Vec::new())
    })
}

/// Keep the branch only if the cursor value is one of `values`.
pub fn permit_values(values: Vec<Document>) -> Policy {
    let label = format!("permit_values({})", Document::from(values.clone()));
    Policy::new(label, move |ctx| {
        if values.contains(ctx.current()) {
            return Ok(vec![ctx]);
        }
        debug!("Pruned at {}: {} is not permitted", ctx.cursor(), ctx.current());
        Ok(Vec::new())
    })
}

/// Fork one branch per candidate.
///
/// An unknown (null) cursor node takes each candidate in turn. A known value
/// survives only in the branch whose candidate equals it.
pub fn choose(values: Vec<Document>) -> Policy {
    let label = format!("choose({})", Document::from(values.clone()));
    Policy::new(label, move |ctx| {
        if ctx.current().is_null() {
            return values
                .iter()
                .map(|candidate| ctx.clone().set_value(candidate.clone()))
                .collect();
        }
        if values.contains(ctx.current()) {
            Ok(vec![ctx])
        } else {
            Ok(Vec::new())
        }
    })
}

/// Forbid the branch if the resolved value is null or falsy.
pub fn require_value(value: impl Into<Arg>) -> Policy {
    let value = value.into();
    Policy::new(format!("require_value({})", value), move |ctx| {
        let resolved = value.resolve(&ctx)?;
        if resolved.is_truthy() {
            return Ok(vec![ctx]);
        }
        let message = if resolved.is_null() {
            "Required value is missing".to_string()
        } else {
            format!("Required value is empty: {}", resolved)
        };
        Ok(vec![ctx.forbid(message)])
    })
}

/// Forbid the branch if the cursor value equals the resolved value.
pub fn forbid_value(value: impl Into<Arg>) -> Policy {
    let value = value.into();
    Policy::new(format!("forbid_value({})", value), move |ctx| {
        let resolved = value.resolve(&ctx)?;
        if ctx.current() != &resolved {
            return Ok(vec![ctx]);
        }
        Ok(vec![ctx.forbid(format!("Forbidden value: {}", resolved))])
    })
}

/// Forbid the branch when the preceding check held. The check is consumed.
pub fn forbid() -> Policy {
    Policy::new("forbid()", |ctx| {
        let (ctx, check) = ctx.take_check();
        let check = check.ok_or_else(|| CoreError::MissingCheck {
            operator: "forbid".to_string(),
        })?;
        if !check.held {
            return Ok(vec![ctx]);
        }
        Ok(vec![ctx.forbid(format!("Forbidden by check `{}`", check.name))])
    })
}

/// Forbid the branch when the preceding check did not hold.
pub fn require() -> Policy {
    Policy::new("require()", |ctx| {
        let (ctx, check) = ctx.take_check();
        let check = check.ok_or_else(|| CoreError::MissingCheck {
            operator: "require".to_string(),
        })?;
        if check.held {
            return Ok(vec![ctx]);
        }
        Ok(vec![ctx.forbid(format!("Check `{}` did not hold", check.name))])
    })
}

/// Forbid unconditionally.
pub fn fail(message: impl Into<String>) -> Policy {
    let message = message.into();
    Policy::new(format!("fail({:?})", message), move |ctx| {
        Ok(vec![ctx.forbid(message.clone())])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{check, collect, each, select};
    use crate::policy::CheckFn;
    use calcifer_core::Context;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn seed(value: Value) -> Context {
        Context::seed(Document::from(value))
    }

    #[test]
    fn test_match_prunes_silently() {
        let policy = collect(vec![select("xs"), each(), matches(Criterion::equals(2))]);
        let out = policy.run(seed(json!({"xs": [1, 2, 3]}))).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].cursor().to_string(), "/xs/1");
        assert!(!out[0].has_errors());
    }

    #[test]
    fn test_permit_values() {
        let policy = permit_values(vec!["red".into(), "green".into()]);
        assert_eq!(policy.run(seed(json!("red"))).unwrap().len(), 1);
        assert!(policy.run(seed(json!("blue"))).unwrap().is_empty());
    }

    #[test]
    fn test_choose_forks_unknown() {
        let policy = choose(vec![1.into(), 2.into()]);
        let out = policy.run(seed(json!(null))).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].root(), &Document::from(2));

        let known = policy.run(seed(json!(2))).unwrap();
        assert_eq!(known.len(), 1);
        assert!(policy.run(seed(json!(5))).unwrap().is_empty());
    }

    #[test]
    fn test_require_value() {
        for (value, forbidden) in [
            (json!(null), true),
            (json!(""), true),
            (json!([]), true),
            (json!(0), true),
            (json!("set"), false),
        ] {
            let out = require_value(Arg::Cursor).run(seed(value.clone())).unwrap();
            assert_eq!(out[0].is_terminal(), forbidden, "{value}");
        }
    }

    #[test]
    fn test_forbid_value() {
        let out = forbid_value(3).run(seed(json!(3))).unwrap();
        assert!(out[0].is_terminal());
        assert_eq!(out[0].shared_errors()[0].message, "Forbidden value: 3");

        let out = forbid_value(3).run(seed(json!(4))).unwrap();
        assert!(!out[0].is_terminal());
    }

    #[test]
    fn test_forbid_and_require_follow_check() {
        let is_big: CheckFn = Arc::new(|args| Ok(args[0].as_i64().unwrap_or(0) > 10));
        let forbid_big = collect(vec![check("big", is_big.clone(), vec![Arg::Cursor]), forbid()]);
        let require_big = collect(vec![check("big", is_big, vec![Arg::Cursor]), require()]);

        assert!(forbid_big.run(seed(json!(11))).unwrap()[0].is_terminal());
        assert!(!forbid_big.run(seed(json!(1))).unwrap()[0].is_terminal());
        assert!(require_big.run(seed(json!(1))).unwrap()[0].is_terminal());
        assert!(!require_big.run(seed(json!(11))).unwrap()[0].is_terminal());
    }

    #[test]
    fn test_forbid_without_check_faults() {
        let err = forbid().run(seed(json!({}))).unwrap_err();
        assert_eq!(
            err,
            CoreError::MissingCheck {
                operator: "forbid".to_string()
            }
        );
    }

    #[test]
    fn test_check_is_consumed_by_forbid() {
        let never: CheckFn = Arc::new(|_| Ok(false));
        let policy = collect(vec![check("never", never, vec![]), forbid(), forbid()]);
        let err = policy.run(seed(json!({}))).unwrap_err();
        assert!(matches!(err, CoreError::MissingCheck { .. }));
    }
}
