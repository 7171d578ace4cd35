//! Scoped variables.
//!
//! Variables live in four scopes resolved in a fixed precedence order
//! (request, collection, environment, global). The store is shared between
//! concurrent script invocations; each invocation gets a [`VariableHandle`]
//! limiting which scopes it may write. Outgoing request text is resolved with
//! [`substitute_variables`].

pub mod error;
pub mod handle;
pub mod model;
pub mod store;
pub mod substitution;
pub mod system;

pub use error::VarError;
pub use handle::VariableHandle;
pub use model::{validate_key, Variable, VariableScope, VariableType, SECRET_MASK};
pub use store::VariableStore;
pub use substitution::{
    substitute_request, substitute_variables, SubstitutedRequest, Substitution, VariableSource,
};
pub use system::{resolve_system_expression, resolve_system_variable};
