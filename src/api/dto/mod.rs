//! Data Transfer Objects for REST request/response serialization.
//!
//! Session paths travel in URL segments and must be percent-encoded by
//! clients (`dir%2Fnotebook.ipynb`).

pub mod session_dto;
pub mod variable_dto;

pub use session_dto::*;
pub use variable_dto::*;
