//! Form data validation against a pipeline's form schema.

pub mod validator;

pub use validator::{FieldHandler, FormDataValidator};
