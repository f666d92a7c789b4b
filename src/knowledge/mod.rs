//! Knowledge 모듈 - 정형/원본 두 컬렉션 저장소
//!
//! - Record: 학과별 정형 레코드, 원본 텍스트 청크, 병렬 벡터 검색 결과
//! - Collection: 전체 조회 + 유사도 검색 인터페이스 (메모리 구현 포함)
//! - Lance: LanceDB 테이블 기반 컬렉션
//! - Chunker: 페이지 분리 및 긴 페이지 분할

mod chunker;
mod collection;
mod lance;
mod record;

// Re-exports
pub use chunker::{split_pages, ChunkConfig, PageChunker};
pub use collection::{cosine_similarity, Collection, CollectionEntry, MemoryCollection};
pub use lance::LanceCollection;
pub use record::{AdmissionRecord, ChunkMetadata, RawChunk, SearchResult};
