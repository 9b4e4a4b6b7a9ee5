//! Auth scope and client mutators, mirroring OAuth records to the stack's
//! auth server.

pub mod client;
pub mod scope;

pub use client::AuthClientMutator;
pub use scope::AuthScopeMutator;
