#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # Cascade Expression
//!
//! Expression evaluation and templating over JSON variable environments.
//!
//! Two front doors:
//!
//! - [`Condition`] — a compiled expression used to gate conditional edges and
//!   trigger activation. Evaluation is strict about producing a boolean.
//! - [`TemplateProcessor`] — substitutes `${expression}` and `{{path}}`
//!   placeholders through strings, maps, and lists, with strict or lenient
//!   handling of missing variables.
//!
//! Expressions are parsed once into an AST ([`Expr`]) and evaluated against
//! an [`EvaluationContext`] of JSON values.

pub mod ast;
pub mod condition;
pub mod context;
pub mod error;
pub mod eval;
pub mod parser;
pub mod template;
pub mod value_utils;

pub use ast::{BinaryOp, Expr, UnaryOp};
pub use condition::{Condition, evaluate_predicate};
pub use context::EvaluationContext;
pub use error::ExpressionError;
pub use eval::Evaluator;
pub use template::{TemplateMode, TemplateProcessor};
