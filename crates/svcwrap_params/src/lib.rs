//! # svcwrap_params
//!
//! Typed parameter model for svcwrap.
//!
//! Every value a caller submits to a wrapped tool passes through a
//! [`Parameter`]: it is coerced, range/choice/length checked, optionally run
//! through a custom validator, and finally rendered as a command-line token.
//!
//! ## Variants
//!
//! - **Boolean**: flag emitted when true (or when false, if `reverse`)
//! - **String / Text**: optional maximum length, shell-safe quoting
//! - **Integer / Float**: inclusive range, unbounded when `min == max == 0`
//! - **Choice**: single key or an ordered subset of keys (`multi`)
//! - **Static**: value fixed at construction
//!
//! ## Example
//!
//! ```rust
//! use svcwrap_params::{IntegerOptions, Parameter, ParameterInfo};
//!
//! let mut n = Parameter::integer(
//!     ParameterInfo::new("n", "Iterations").flag("-n"),
//!     IntegerOptions { minimum: 1, maximum: 10, default: None },
//! );
//! n.set("4").unwrap();
//! assert_eq!(n.compile_arg().as_deref(), Some("-n 4"));
//! assert!(n.set(11).is_err());
//! ```

pub mod error;
pub mod parameter;
pub mod set;
pub mod value;

pub use error::{ParamError, ParamResult, ValidationError, ValidationErrors};
pub use parameter::{
    shell_quote, BooleanOptions, Choice, ChoiceOptions, ChoiceSelection, CustomValidator,
    FloatOptions, IntegerOptions, Parameter, ParameterDefinition, ParameterInfo, ParameterKind,
    StaticOptions, StringOptions, Verdict, DEFAULT_DELIMITER,
};
pub use set::{ParameterGroup, ParameterGroupDefinition, ParameterSet};
pub use value::{is_truthy_str, ParameterValue};
