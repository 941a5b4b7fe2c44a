//! 索引模块

pub mod embedding;
pub mod vector;

pub use embedding::{create_embedding_model, EmbeddingModel, HttpEmbeddingModel, SimpleEmbeddingModel};
pub use vector::{create_vector_index, MemoryVectorIndex, VectorIndex, VectorMetadata, VectorSearchResult};
