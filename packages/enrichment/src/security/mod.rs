//! Secret handling for backend credentials.

pub mod credentials;

pub use credentials::{ApiFlavor, BackendCredentials, SecretString};
