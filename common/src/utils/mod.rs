//! Utility functions and helpers.

pub mod id_generator;
pub mod sql_validator;

pub use id_generator::IdGenerator;
pub use sql_validator::{
    ForbidDropTable, ForbidTruncate, QueryType, RequireLimit, SqlValidator, ValidatorChain,
};
