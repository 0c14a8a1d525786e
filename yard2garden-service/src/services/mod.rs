pub mod credentials;
pub mod generation;
pub mod metrics;
pub mod prompts;
pub mod providers;

pub use credentials::{resolve_credential, GcpSecretManager, SecretStore, SecretStoreError};
pub use generation::{GenerationClient, GenerationError};
