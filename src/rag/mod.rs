//! RAG 모듈 - 하이브리드 질의응답
//!
//! - Keyword: 질문에서 학과명 추출
//! - Router: 학과 매칭(전체 조회 + 정확 매칭) / 유사도 검색 분기
//! - Context: 두 구획 컨텍스트 조립 + 출처 중복 제거
//! - Prompt: 단계별 답변 프롬프트
//! - Assistant: 질문 하나를 끝까지 처리하는 파이프라인

mod assistant;
mod context;
mod keyword;
mod prompt;
mod router;

// Re-exports
pub use assistant::{AdmissionAssistant, Answer, AskError, PreparedQuestion, StreamingAnswer};
pub use context::{
    dedup_citations, first_page, AssembledContext, ContextAssembler, SourceCitation, RAW_HEADER,
    STRUCTURED_HEADER,
};
pub use keyword::{interpret_keyword, normalize_keyword, KeywordExtractor};
pub use prompt::{build_answer_prompt, NOT_FOUND_MESSAGE};
pub use router::{filter_by_major, major_matches, strip_whitespace, QueryRouter, Retrieval, RetrievalMode};
