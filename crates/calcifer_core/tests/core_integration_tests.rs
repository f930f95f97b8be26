//! Integration tests for the document model, branch contexts and merging.

use serde_json::{json, Value};

use calcifer_core::{ConflictPolicy, Context, Document, Merger};

/// Forked branches edit independently and merge back together.
#[test]
fn test_fork_edit_merge() {
    let seed = Document::from(json!({
        "orders": {"a": {"status": "new"}, "b": {"status": "new"}},
        "audit": [],
    }));

    let parent = Context::seed(seed.clone()).select("/orders").unwrap();
    let branches: Vec<Context> = parent
        .children()
        .into_iter()
        .map(|child| {
            let id = child.cursor().last().map(|s| s.as_key()).unwrap_or_default();
            child
                .select("status")
                .and_then(|c| c.set_value("shipped".into()))
                .and_then(|c| c.select("/audit"))
                .and_then(|c| c.append_value(Document::from(id)))
                .unwrap()
        })
        .collect();

    assert_eq!(branches.len(), 2);
    assert_eq!(Value::from(parent.root()), Value::from(&seed));

    let merged = Merger::new(ConflictPolicy::Fail)
        .merge_all(&seed, branches.iter().map(Context::root))
        .unwrap();
    assert_eq!(
        Value::from(&merged),
        json!({
            "orders": {"a": {"status": "shipped"}, "b": {"status": "shipped"}},
            "audit": ["a", "b"],
        })
    );
}

/// Forbidden branches are left out by the caller; the survivor wins.
#[test]
fn test_forbidden_branch_excluded() {
    let seed = Document::from(json!({"x": 1}));
    let kept = Context::seed(seed.clone())
        .select("/x")
        .unwrap()
        .set_value(2.into())
        .unwrap();
    let forbidden = Context::seed(seed.clone())
        .select("/x")
        .unwrap()
        .set_value(3.into())
        .unwrap()
        .forbid("three is not allowed");

    let survivors: Vec<&Context> = [&kept, &forbidden]
        .into_iter()
        .filter(|c| !c.is_terminal())
        .collect();
    let merged = Merger::new(ConflictPolicy::Fail)
        .merge_all(&seed, survivors.into_iter().map(Context::root))
        .unwrap();

    assert_eq!(Value::from(&merged), json!({"x": 2}));
    assert_eq!(forbidden.shared_errors()[0].document_path.to_string(), "/x");
}
