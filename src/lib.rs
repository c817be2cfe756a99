//! Layerfilter: a capability-aware filter engine for layered components.
//!
//! A component carries an ordered stack of per-solution layers. Filters over components
//! are expressed as a closed AST which this crate can:
//! - classify by how much of it a relational store can evaluate natively
//! - compile into a relational predicate IR for pushdown
//! - evaluate directly against a materialized component (the reference semantics)
//! - plan, splitting work between the store and an in-memory residual and declaring
//!   the pre-fetch lookups the store cannot do on its own

/// Declares a wire tag enum: canonical spelling for output, lenient matching on input.
/// Aliases must already be normalized (lowercase, no separators).
macro_rules! wire_tag {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $( $variant:ident => $canonical:literal $(| $alias:literal)* ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant),*
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $canonical),*
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let tag = crate::types::normalize_tag(s);
                $(
                    if tag == crate::types::normalize_tag($canonical) $(|| tag == $alias)* {
                        return Ok($name::$variant);
                    }
                )*
                Err(format!("unknown {} '{}'", stringify!($name), s))
            }
        }

        impl TryFrom<String> for $name {
            type Error = String;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

mod types;
mod expr;
mod config;
mod capability;
mod ir;
mod compiler;
mod evaluator;
mod prefetch;
mod selectivity;
mod plan;
mod store;
mod filter;

pub use types::*;
pub use expr::*;
pub use config::*;
pub use capability::*;
pub use ir::*;
pub use compiler::*;
pub use evaluator::*;
pub use prefetch::*;
pub use selectivity::*;
pub use plan::*;
pub use store::*;
pub use filter::*;

use thiserror::Error;

/// Unified error type for layerfilter operations.
///
/// Classification, predicate building and evaluation never fail; errors only arise at
/// the edges where payloads are decoded or collaborators are called.
#[derive(Debug, Error)]
pub enum LayerFilterError {
    #[error("Wire error: {0}")]
    Wire(#[from] serde_json::Error),
    #[error("Config error: {0}")]
    Config(String),
    #[error("Prefetch error: {0}")]
    Prefetch(String),
    #[error("Store error: {0}")]
    Store(String),
}
