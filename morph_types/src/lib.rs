//! Morph Type Vocabulary
//!
//! This crate contains the type-shape vocabulary shared by the codec and its
//! tooling: type descriptors, the type-expression language used to write
//! them, and the serde model of schema documents. It performs no conversion
//! itself.

pub mod decl;
pub mod expr;
pub mod shape;

// Re-export commonly used types at the crate root
pub use decl::*;
pub use expr::TypeExprError;
pub use shape::*;
