//! admission-rag - 대입 모집요강 하이브리드 RAG
//!
//! 학과명이 언급된 질문은 정형 데이터에서 공백 무시 정확 매칭으로,
//! 그 밖의 질문은 LanceDB 벡터 검색으로 근거를 찾아
//! 페이지 출처와 함께 답변합니다.

pub mod cli;
pub mod config;
pub mod embedding;
pub mod ingest;
pub mod knowledge;
pub mod llm;
pub mod rag;

#[cfg(test)]
mod testing;

// Re-exports
pub use config::{get_api_key, get_data_dir, has_api_key, RetrievalLimits, Settings};
pub use embedding::{EmbedMode, EmbeddingProvider, GeminiEmbedding};
pub use knowledge::{
    AdmissionRecord, ChunkMetadata, Collection, CollectionEntry, LanceCollection,
    MemoryCollection, RawChunk, SearchResult,
};
pub use llm::{CompletionOptions, GeminiGenerative, GenerativeModel, TextStream};
pub use rag::{
    AdmissionAssistant, Answer, AskError, AssembledContext, RetrievalMode, SourceCitation,
    StreamingAnswer, NOT_FOUND_MESSAGE,
};
