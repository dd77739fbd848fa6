pub mod embedder;
pub mod index;
pub mod memory;
pub mod prompt;
pub mod retriever;
pub mod sqlite;

pub use embedder::Embedder;
pub use index::{IndexEntry, IndexMeta, RetrievedChunk, VectorIndex};
pub use memory::{ConversationMemory, ConversationTurn};
pub use prompt::{AssembledPrompt, PromptAssembler};
pub use retriever::Retriever;
