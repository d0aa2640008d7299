//! Secret Source Adapters

mod env;

pub use env::EnvSecretSource;
