//! Error taxonomy for scene compilation and expression parsing.
//!
//! Everything in [`CompileError`] aborts the whole compile attempt: no
//! partial graph is ever linked or initialized. The only place these are
//! downgraded to recoverable errors is the hot-reload boundary in
//! [`crate::reload`].

use thiserror::Error;

/// Fatal error raised while parsing or evaluating an arithmetic expression.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExprError {
    #[error("attempt to pop token from empty text")]
    UnexpectedEnd,

    #[error("bad number {0:?}")]
    BadNumber(String),

    #[error("unhandled input {0:?}")]
    BadChar(String),

    #[error("unknown function {0:?}")]
    UnknownFunction(String),

    #[error("function {0:?} applied to {1} arguments")]
    BadArity(String, usize),

    #[error("unknown variable {0:?}")]
    UnknownVariable(String),

    #[error("unbalanced parentheses")]
    Unbalanced,

    #[error("malformed expression")]
    Malformed,
}

/// Fatal error raised while compiling or linking a scene document.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("failed to parse scene document: {0}")]
    Json(#[from] serde_json::Error),

    #[error("scene document must be a JSON array")]
    BadDocument,

    #[error("unknown or malformed object")]
    MalformedNode,

    #[error("unknown node type {0:?}")]
    UnknownNodeType(String),

    #[error("node {id:?}: required input {attr:?} missing")]
    MissingInput { id: String, attr: String },

    #[error("node {id:?}: malformed value for input {attr:?}")]
    MalformedInput { id: String, attr: String },

    #[error("node id {0:?} not unique")]
    DuplicateId(String),

    #[error("unresolved link from={from_node}:{attr} to={target}:{slot}")]
    UnresolvedLink {
        from_node: String,
        attr: String,
        target: String,
        slot: String,
    },

    #[error("bad link at attr {attr:?}: node {target:?} is not a {expected} node")]
    BadLink {
        attr: String,
        target: String,
        expected: &'static str,
    },

    #[error("node {id:?}: {msg}")]
    Verify { id: String, msg: String },

    #[error("did not find a layer node with id \"__main__\"")]
    RootNotFound,

    #[error("expression has {0} components, at most 4 allowed")]
    TooManyComponents(usize),

    #[error(transparent)]
    Expr(#[from] ExprError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
