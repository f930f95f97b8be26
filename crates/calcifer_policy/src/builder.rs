//! Policy construction.
//!
//! A [`PolicyBuilder`] records a chain of [`Op`] nodes. Each builder method
//! consumes the builder and returns a new one; nothing is evaluated until
//! [`PolicyBuilder::finalize`] compiles the tree into a [`Policy`].
//!
//! ```ignore
//! let policy = PolicyBuilder::new()
//!     .select("/items")
//!     .each()
//!     .forbid_value(3)
//!     .finalize();
//! ```

use std::fmt;
use std::sync::Arc;

use calcifer_core::{Document, Fault};
use regex::Regex;
use tracing::debug;

use crate::operators;
use crate::policy::{ApplyFn, Arg, BindFn, CheckFn, Criterion, Policy};

/// One node of a policy expression.
#[derive(Clone)]
pub enum Op {
    Unit,
    UnitValue(Document),
    Select { selector: String },
    GetNode,
    GetValue,
    Path,
    SetValue(Arg),
    AppendValue(Arg),
    DefineAs(String),
    Children,
    Each,
    ForEach(Box<Op>),
    Collect(Vec<Op>),
    Regarding { selector: String, body: Box<Op> },
    Given { selector: String, body: Box<Op> },
    Check { name: String, predicate: CheckFn, args: Vec<Arg> },
    Apply { name: String, function: ApplyFn, args: Vec<Arg> },
    WithValue { name: String, binder: BindFn },
    Match(Criterion),
    PermitValues(Vec<Document>),
    Choose(Vec<Document>),
    RequireValue(Arg),
    ForbidValue(Arg),
    Forbid,
    Require,
    Fail(String),
    /// Without `catch`, a fault becomes an error record.
    Attempt { body: Box<Op>, catch: Option<Box<Op>> },
    Optional(Box<Op>),
    UnlessErrors(Box<Op>),
    /// In a chain, wraps everything after it in an annotation.
    Trace(String),
    PushContext(String),
    PopContext,
    WrapContext { label: String, body: Box<Op> },
}

impl Op {
    /// Compile this expression into a runnable policy.
    pub fn compile(&self) -> Policy {
        match self {
            Op::Unit => operators::unit(),
            Op::UnitValue(value) => operators::unit_value(value.clone()),
            Op::Select { selector } => operators::select(selector.clone()),
            Op::GetNode => operators::get_node(),
            Op::GetValue => operators::get_value(),
            Op::Path => operators::path(),
            Op::SetValue(arg) => operators::set_value(arg.clone()),
            Op::AppendValue(arg) => operators::append_value(arg.clone()),
            Op::DefineAs(name) => operators::define_as(name.clone()),
            Op::Children => operators::children(),
            Op::Each => operators::each(),
            Op::ForEach(body) => operators::for_each(body.compile()),
            Op::Collect(ops) => compile_chain(ops),
            Op::Regarding { selector, body } => operators::regarding(selector.clone(), body.compile()),
            Op::Given { selector, body } => operators::given(selector.clone(), body.compile()),
            Op::Check {
                name,
                predicate,
                args,
            } => operators::check(name.clone(), Arc::clone(predicate), args.clone()),
            Op::Apply {
                name,
                function,
                args,
            } => operators::apply(name.clone(), Arc::clone(function), args.clone()),
            Op::WithValue { name, binder } => operators::with_value(name.clone(), Arc::clone(binder)),
            Op::Match(criterion) => operators::matches(criterion.clone()),
            Op::PermitValues(values) => operators::permit_values(values.clone()),
            Op::Choose(values) => operators::choose(values.clone()),
            Op::RequireValue(arg) => operators::require_value(arg.clone()),
            Op::ForbidValue(arg) => operators::forbid_value(arg.clone()),
            Op::Forbid => operators::forbid(),
            Op::Require => operators::require(),
            Op::Fail(message) => operators::fail(message.clone()),
            Op::Attempt { body, catch: None } => operators::attempt(body.compile()),
            Op::Attempt {
                body,
                catch: Some(handler),
            } => operators::attempt_or(body.compile(), handler.compile()),
            Op::Optional(body) => operators::optional(body.compile()),
            Op::UnlessErrors(body) => operators::unless_errors(body.compile()),
            Op::Trace(label) => operators::trace(label.clone(), operators::unit()),
            Op::PushContext(label) => operators::push_context(label.clone()),
            Op::PopContext => operators::pop_context(),
            Op::WrapContext { label, body } => operators::wrap_context(label.clone(), body.compile()),
        }
    }
}

/// Compile a chain, folding everything after a `Trace` into its body.
fn compile_chain(ops: &[Op]) -> Policy {
    let mut policies = Vec::with_capacity(ops.len());
    for (index, op) in ops.iter().enumerate() {
        if let Op::Trace(label) = op {
            let rest = compile_chain(&ops[index + 1..]);
            policies.push(operators::trace(label.clone(), rest));
            break;
        }
        policies.push(op.compile());
    }
    operators::collect(policies)
}

fn write_list<T: fmt::Display>(f: &mut fmt::Formatter<'_>, items: &[T]) -> fmt::Result {
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{}", item)?;
    }
    Ok(())
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Unit => write!(f, "unit()"),
            Op::UnitValue(value) => write!(f, "unit_value({})", value),
            Op::Select { selector } => write!(f, "select({:?})", selector),
            Op::GetNode => write!(f, "get_node()"),
            Op::GetValue => write!(f, "get_value()"),
            Op::Path => write!(f, "path()"),
            Op::SetValue(arg) => write!(f, "set_value({})", arg),
            Op::AppendValue(arg) => write!(f, "append_value({})", arg),
            Op::DefineAs(name) => write!(f, "define_as({:?})", name),
            Op::Children => write!(f, "children()"),
            Op::Each => write!(f, "each()"),
            Op::ForEach(body) => write!(f, "for_each({})", body),
            Op::Collect(ops) if ops.is_empty() => write!(f, "unit()"),
            Op::Collect(ops) => {
                for (index, op) in ops.iter().enumerate() {
                    if index > 0 {
                        write!(f, " >> ")?;
                    }
                    write!(f, "{}", op)?;
                }
                Ok(())
            }
            Op::Regarding { selector, body } => write!(f, "regarding({:?}, {})", selector, body),
            Op::Given { selector, body } => write!(f, "given({:?}, {})", selector, body),
            Op::Check { name, args, .. } => {
                write!(f, "check({}", name)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Op::Apply { name, args, .. } => {
                write!(f, "apply({}", name)?;
                for arg in args {
                    write!(f, ", {}", arg)?;
                }
                write!(f, ")")
            }
            Op::WithValue { name, .. } => write!(f, "with_value({})", name),
            Op::Match(criterion) => write!(f, "match({})", criterion),
            Op::PermitValues(values) => {
                write!(f, "permit_values(")?;
                write_list(f, values)?;
                write!(f, ")")
            }
            Op::Choose(values) => {
                write!(f, "choose(")?;
                write_list(f, values)?;
                write!(f, ")")
            }
            Op::RequireValue(arg) => write!(f, "require_value({})", arg),
            Op::ForbidValue(arg) => write!(f, "forbid_value({})", arg),
            Op::Forbid => write!(f, "forbid()"),
            Op::Require => write!(f, "require()"),
            Op::Fail(message) => write!(f, "fail({:?})", message),
            Op::Attempt { body, catch: None } => write!(f, "attempt({})", body),
            Op::Attempt {
                body,
                catch: Some(handler),
            } => write!(f, "attempt_or({}, {})", body, handler),
            Op::Optional(body) => write!(f, "optional({})", body),
            Op::UnlessErrors(body) => write!(f, "unless_errors({})", body),
            Op::Trace(label) => write!(f, "trace({:?})", label),
            Op::PushContext(label) => write!(f, "push_context({:?})", label),
            Op::PopContext => write!(f, "pop_context()"),
            Op::WrapContext { label, body } => write!(f, "wrap_context({:?}, {})", label, body),
        }
    }
}

impl fmt::Debug for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Op({})", self)
    }
}

/// Fluent, immutable builder for policy chains.
#[derive(Clone, Default)]
pub struct PolicyBuilder {
    ops: Vec<Op>,
}

impl PolicyBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(mut self, op: Op) -> Self {
        self.ops.push(op);
        self
    }

    /// Append any operator or sub-chain.
    pub fn then(self, op: impl Into<Op>) -> Self {
        self.push(op.into())
    }

    pub fn ops(&self) -> &[Op] {
        &self.ops
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn to_op(&self) -> Op {
        Op::Collect(self.ops.clone())
    }

    /// Compile the chain into one policy.
    pub fn finalize(&self) -> Policy {
        let op = self.to_op();
        debug!("Finalizing policy: {}", op);
        op.compile()
    }

    pub fn unit(self) -> Self {
        self.push(Op::Unit)
    }

    pub fn unit_value(self, value: impl Into<Document>) -> Self {
        self.push(Op::UnitValue(value.into()))
    }

    pub fn select(self, selector: impl Into<String>) -> Self {
        self.push(Op::Select {
            selector: selector.into(),
        })
    }

    pub fn get_node(self) -> Self {
        self.push(Op::GetNode)
    }

    pub fn get_value(self) -> Self {
        self.push(Op::GetValue)
    }

    pub fn path(self) -> Self {
        self.push(Op::Path)
    }

    /// Alias of [`PolicyBuilder::path`].
    pub fn scope(self) -> Self {
        self.push(Op::Path)
    }

    pub fn set_value(self, value: impl Into<Arg>) -> Self {
        self.push(Op::SetValue(value.into()))
    }

    pub fn append_value(self, value: impl Into<Arg>) -> Self {
        self.push(Op::AppendValue(value.into()))
    }

    pub fn define_as(self, name: impl Into<String>) -> Self {
        self.push(Op::DefineAs(name.into()))
    }

    pub fn children(self) -> Self {
        self.push(Op::Children)
    }

    pub fn each(self) -> Self {
        self.push(Op::Each)
    }

    pub fn for_each(self, body: impl Into<Op>) -> Self {
        self.push(Op::ForEach(Box::new(body.into())))
    }

    pub fn regarding(self, selector: impl Into<String>, body: impl Into<Op>) -> Self {
        self.push(Op::Regarding {
            selector: selector.into(),
            body: Box::new(body.into()),
        })
    }

    pub fn given(self, selector: impl Into<String>, body: impl Into<Op>) -> Self {
        self.push(Op::Given {
            selector: selector.into(),
            body: Box::new(body.into()),
        })
    }

    pub fn check<F>(self, name: impl Into<String>, predicate: F, args: Vec<Arg>) -> Self
    where
        F: Fn(&[Document]) -> Result<bool, Fault> + Send + Sync + 'static,
    {
        self.push(Op::Check {
            name: name.into(),
            predicate: Arc::new(predicate),
            args,
        })
    }

    pub fn apply<F>(self, name: impl Into<String>, function: F, args: Vec<Arg>) -> Self
    where
        F: Fn(&[Document]) -> Result<Document, Fault> + Send + Sync + 'static,
    {
        self.push(Op::Apply {
            name: name.into(),
            function: Arc::new(function),
            args,
        })
    }

    pub fn with_value<F>(self, name: impl Into<String>, binder: F) -> Self
    where
        F: Fn(&Document) -> Result<Op, Fault> + Send + Sync + 'static,
    {
        self.push(Op::WithValue {
            name: name.into(),
            binder: Arc::new(binder),
        })
    }

    pub fn matches(self, criterion: Criterion) -> Self {
        self.push(Op::Match(criterion))
    }

    pub fn match_value(self, value: impl Into<Document>) -> Self {
        self.matches(Criterion::Equals(value.into()))
    }

    pub fn match_with<F>(self, name: impl Into<String>, predicate: F) -> Self
    where
        F: Fn(&Document) -> bool + Send + Sync + 'static,
    {
        self.matches(Criterion::satisfies(name, predicate))
    }

    pub fn match_pattern(self, pattern: Regex) -> Self {
        self.matches(Criterion::Pattern(pattern))
    }

    pub fn permit_values(self, values: impl IntoIterator<Item = Document>) -> Self {
        self.push(Op::PermitValues(values.into_iter().collect()))
    }

    pub fn choose(self, values: impl IntoIterator<Item = Document>) -> Self {
        self.push(Op::Choose(values.into_iter().collect()))
    }

    pub fn require_value(self, value: impl Into<Arg>) -> Self {
        self.push(Op::RequireValue(value.into()))
    }

    pub fn forbid_value(self, value: impl Into<Arg>) -> Self {
        self.push(Op::ForbidValue(value.into()))
    }

    pub fn forbid(self) -> Self {
        self.push(Op::Forbid)
    }

    pub fn require(self) -> Self {
        self.push(Op::Require)
    }

    pub fn fail(self, message: impl Into<String>) -> Self {
        self.push(Op::Fail(message.into()))
    }

    pub fn attempt(self, body: impl Into<Op>) -> Self {
        self.push(Op::Attempt {
            body: Box::new(body.into()),
            catch: None,
        })
    }

    /// Like [`attempt`](Self::attempt), but run `handler` on the input branch
    /// when `body` faults or prunes every branch.
    pub fn attempt_or(self, body: impl Into<Op>, handler: impl Into<Op>) -> Self {
        self.push(Op::Attempt {
            body: Box::new(body.into()),
            catch: Some(Box::new(handler.into())),
        })
    }

    pub fn optional(self, body: impl Into<Op>) -> Self {
        self.push(Op::Optional(Box::new(body.into())))
    }

    pub fn unless_errors(self, body: impl Into<Op>) -> Self {
        self.push(Op::UnlessErrors(Box::new(body.into())))
    }

    /// Annotate every later operator of this chain with `label`.
    pub fn trace(self, label: impl Into<String>) -> Self {
        self.push(Op::Trace(label.into()))
    }

    pub fn push_context(self, label: impl Into<String>) -> Self {
        self.push(Op::PushContext(label.into()))
    }

    pub fn pop_context(self) -> Self {
        self.push(Op::PopContext)
    }

    pub fn wrap_context(self, label: impl Into<String>, body: impl Into<Op>) -> Self {
        self.push(Op::WrapContext {
            label: label.into(),
            body: Box::new(body.into()),
        })
    }
}

impl From<PolicyBuilder> for Op {
    fn from(builder: PolicyBuilder) -> Self {
        Op::Collect(builder.ops)
    }
}

impl fmt::Display for PolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_op())
    }
}

impl fmt::Debug for PolicyBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PolicyBuilder({})", self.to_op())
    }
}
