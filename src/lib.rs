//! AutoMentor: a local retrieval-augmented automotive assistant.
//!
//! Documents from a source directory are loaded, chunked, embedded and stored
//! in a versioned vector index. Questions are answered by retrieving the
//! closest chunks, assembling a grounded prompt with the conversation so far,
//! and asking a local language model.

pub mod cli;
pub mod core;
pub mod ingest;
pub mod llm;
pub mod rag;
pub mod server;
pub mod session;
pub mod state;
