pub mod store;

pub use store::{CredentialStore, JsonFileStore};
