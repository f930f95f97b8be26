//! Context annotation operators.

use crate::policy::Policy;

pub fn push_context(label: impl Into<String>) -> Policy {
    let label = label.into();
    Policy::new(format!("push_context({:?})", label), move |ctx| {
        Ok(vec![ctx.push_annotation(label.clone())])
    })
}

/// Pop the innermost annotation. Fails on an empty stack.
pub fn pop_context() -> Policy {
    Policy::new("pop_context()", |ctx| Ok(vec![ctx.pop_annotation()?]))
}

/// Push `label`, run `policy`, and restore the caller's stack on every
/// output, forbidden branches included.
pub fn wrap_context(label: impl Into<String>, policy: Policy) -> Policy {
    let label = label.into();
    Policy::new(
        format!("wrap_context({:?}, {})", label, policy.label()),
        move |ctx| {
            let outer = ctx.annotations().to_vec();
            let branches = policy.run(ctx.push_annotation(label.clone()))?;
            Ok(branches
                .into_iter()
                .map(|branch| branch.with_annotations(outer.clone()))
                .collect())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operators::{collect, each, fail, select};
    use calcifer_core::{Context, CoreError, Document};
    use serde_json::json;

    #[test]
    fn test_wrap_context_balances() {
        let policy = wrap_context(
            "outer",
            collect(vec![select("xs"), each(), wrap_context("inner", fail("x"))]),
        );
        let ctx = Context::seed(Document::from(json!({"xs": [1, 2]})));
        let out = policy.run(ctx).unwrap();
        assert_eq!(out.len(), 2);
        for branch in &out {
            assert!(branch.annotations().is_empty());
            assert_eq!(
                branch.shared_errors()[0].annotation_path,
                vec!["outer".to_string(), "inner".to_string()]
            );
        }
    }

    #[test]
    fn test_push_then_pop() {
        let policy = collect(vec![push_context("a"), pop_context()]);
        let out = policy.run(Context::seed(Document::Null)).unwrap();
        assert!(out[0].annotations().is_empty());

        let err = pop_context().run(Context::seed(Document::Null)).unwrap_err();
        assert!(matches!(err, CoreError::AnnotationUnderflow { .. }));
    }

    #[test]
    fn test_wrap_context_restores_popped_labels() {
        let policy = collect(vec![
            push_context("rule"),
            wrap_context("step", collect(vec![pop_context(), pop_context()])),
        ]);
        let out = policy.run(Context::seed(Document::Null)).unwrap();
        assert_eq!(out[0].annotations().to_vec(), vec!["rule".to_string()]);
    }
}
