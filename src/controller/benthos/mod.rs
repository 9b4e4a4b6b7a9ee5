//! Benthos server and stream mutators.

pub mod server;
pub mod stream;

pub use server::BenthosServerMutator;
pub use stream::BenthosStreamMutator;
