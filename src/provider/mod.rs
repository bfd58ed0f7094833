mod client;
mod types;

#[cfg(test)]
pub mod mock;

pub use client::{DeepInfraClient, FragmentStream, StreamItem, TextGenerator};
pub use types::GenerationResult;
