//! Common transport-layer types shared between the API server and the auth crate.
//! These structs describe the request/response payloads that cross crate
//! boundaries so the shapes are defined once.

mod errors;
mod tokens;
mod users;

pub use errors::{ErrorDetail, FieldErrors, NON_FIELD_ERRORS};
pub use tokens::{AccessToken, TokenPair};
pub use users::{AdminUserDto, UserDto};

/// Message attached to a field that was absent from the request body.
pub const REQUIRED_FIELD: &str = "This field is required.";

/// Message attached to a field that was present but empty.
pub const BLANK_FIELD: &str = "This field may not be blank.";
