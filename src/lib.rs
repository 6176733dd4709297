pub mod answer;
pub mod chunking;
pub mod config;
pub mod database;
pub mod document;
pub mod embeddings;
pub mod error;
pub mod index;
pub mod llm;
pub mod memory;
pub mod rag;

pub use error::{RagError, Result};
