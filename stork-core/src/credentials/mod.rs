pub mod address;
pub mod store;

pub use store::{BasicAuth, CredentialStore};
