pub mod embedding;
pub mod vector_index;

pub use embedding::{DeterministicEmbeddingProvider, EmbeddingProvider, ExternalEmbeddingProvider, FastEmbedProvider};
pub use vector_index::VectorIndex;
