//! 질문 처리 파이프라인
//!
//! 키워드 추출 → 검색 방식 결정 → 질문 임베딩(1회) → 두 컬렉션 검색 → 컨텍스트 조립 → 답변 생성.
//! 질문 경로의 외부 호출은 각각 최대 한 번이며 재시도하지 않습니다.

use std::sync::Arc;

use futures::StreamExt;

use crate::config::{get_api_key, RetrievalLimits, Settings, RAW_COLLECTION, STRUCTURED_COLLECTION};
use crate::embedding::{EmbedMode, EmbeddingProvider, GeminiEmbedding};
use crate::knowledge::{AdmissionRecord, ChunkMetadata, Collection, LanceCollection};
use crate::llm::{collect_text, CompletionOptions, GeminiGenerative, GenerativeModel, TextStream};

use super::context::{AssembledContext, ContextAssembler, SourceCitation};
use super::keyword::KeywordExtractor;
use super::prompt::{build_answer_prompt, NOT_FOUND_MESSAGE};
use super::router::{QueryRouter, RetrievalMode};

// ============================================================================
// Errors
// ============================================================================

/// 질문 처리 실패 (단계별)
#[derive(Debug, thiserror::Error)]
pub enum AskError {
    #[error("Keyword extraction failed: {0:#}")]
    Extraction(anyhow::Error),

    #[error("Query embedding failed: {0:#}")]
    Embedding(anyhow::Error),

    #[error("Store unavailable: {0:#}")]
    StoreUnavailable(anyhow::Error),

    #[error("Answer synthesis failed: {0:#}")]
    Synthesis(anyhow::Error),
}

// ============================================================================
// Answer Types
// ============================================================================

/// 완성된 답변
#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub citations: Vec<SourceCitation>,
    pub mode: RetrievalMode,
}

impl Answer {
    /// 모델이 "찾을 수 없음" 문장으로 답했는지 (참고용)
    pub fn is_not_found(&self) -> bool {
        self.text.contains(NOT_FOUND_MESSAGE)
    }
}

/// 스트리밍 답변 (출처는 생성 전에 확정됨)
pub struct StreamingAnswer {
    pub mode: RetrievalMode,
    pub citations: Vec<SourceCitation>,
    pub fragments: TextStream,
}

impl StreamingAnswer {
    /// 조각을 끝까지 받아 [`Answer`]로
    pub async fn collect(self) -> Result<Answer, AskError> {
        let text = collect_text(self.fragments)
            .await
            .map_err(AskError::Synthesis)?;
        Ok(Answer {
            text,
            citations: self.citations,
            mode: self.mode,
        })
    }
}

/// 생성 직전까지 준비된 질문
#[derive(Debug, Clone)]
pub struct PreparedQuestion {
    pub mode: RetrievalMode,
    pub context: AssembledContext,
    pub prompt: String,
}

// ============================================================================
// AdmissionAssistant
// ============================================================================

/// 모집요강 질의응답기
///
/// 모델, 임베딩, 컬렉션을 모두 주입받습니다. 질문마다 새 상태를 만들고 버립니다.
#[derive(Clone)]
pub struct AdmissionAssistant {
    extractor: KeywordExtractor,
    answer_model: Arc<dyn GenerativeModel>,
    embedder: Arc<dyn EmbeddingProvider>,
    router: QueryRouter,
    options: CompletionOptions,
}

impl AdmissionAssistant {
    /// 기본 설정으로 생성
    pub fn new(
        keyword_model: Arc<dyn GenerativeModel>,
        answer_model: Arc<dyn GenerativeModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        structured: Arc<dyn Collection<AdmissionRecord>>,
        raw: Arc<dyn Collection<ChunkMetadata>>,
    ) -> Self {
        Self::with_settings(
            keyword_model,
            answer_model,
            embedder,
            structured,
            raw,
            &Settings::default(),
        )
    }

    /// 설정(센티널, 검색 개수, 타임아웃)을 지정해 생성
    pub fn with_settings(
        keyword_model: Arc<dyn GenerativeModel>,
        answer_model: Arc<dyn GenerativeModel>,
        embedder: Arc<dyn EmbeddingProvider>,
        structured: Arc<dyn Collection<AdmissionRecord>>,
        raw: Arc<dyn Collection<ChunkMetadata>>,
        settings: &Settings,
    ) -> Self {
        let options = CompletionOptions::with_timeout(settings.request_timeout);
        Self {
            extractor: KeywordExtractor::new(
                keyword_model,
                settings.none_sentinel.clone(),
                options.clone(),
            ),
            answer_model,
            embedder,
            router: QueryRouter::new(structured, raw, settings.limits),
            options,
        }
    }

    /// Gemini + LanceDB로 생성
    ///
    /// 두 컬렉션 중 하나라도 없으면 에러입니다 (먼저 `ingest` 필요).
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        let api_key = get_api_key()?;

        let keyword_model = GeminiGenerative::new(api_key.clone(), settings.keyword_model.clone())?;
        let answer_model = GeminiGenerative::new(api_key.clone(), settings.answer_model.clone())?;
        let embedder = GeminiEmbedding::new(api_key, settings.embedding_dimension)?;

        let lance_path = settings.lance_path();
        let structured: LanceCollection<AdmissionRecord> =
            LanceCollection::open(&lance_path, STRUCTURED_COLLECTION, settings.embedding_dimension)
                .await?;
        let raw: LanceCollection<ChunkMetadata> =
            LanceCollection::open(&lance_path, RAW_COLLECTION, settings.embedding_dimension).await?;

        for (name, exists) in [
            (STRUCTURED_COLLECTION, structured.exists().await?),
            (RAW_COLLECTION, raw.exists().await?),
        ] {
            if !exists {
                anyhow::bail!(
                    "Collection '{}' not found in {}. Run `admission-rag ingest` first.",
                    name,
                    lance_path.display()
                );
            }
        }

        tracing::info!(
            "Assistant ready (keyword: {}, answer: {}, embedding: {})",
            settings.keyword_model,
            settings.answer_model,
            embedder.name()
        );

        Ok(Self::with_settings(
            Arc::new(keyword_model),
            Arc::new(answer_model),
            Arc::new(embedder),
            Arc::new(structured),
            Arc::new(raw),
            settings,
        ))
    }

    /// 검색 개수 변경
    pub fn with_limits(mut self, limits: RetrievalLimits) -> Self {
        self.router = self.router.with_limits(limits);
        self
    }

    /// 생성 직전까지 처리 (추출, 검색, 조립)
    pub async fn prepare(&self, question: &str) -> Result<PreparedQuestion, AskError> {
        let keyword = self
            .extractor
            .extract(question)
            .await
            .map_err(AskError::Extraction)?;
        let mode = RetrievalMode::from_keyword(keyword);

        let query_embedding = self
            .embedder
            .embed(question, EmbedMode::Query)
            .await
            .map_err(AskError::Embedding)?;

        let retrieval = self
            .router
            .retrieve(&mode, &query_embedding)
            .await
            .map_err(AskError::StoreUnavailable)?;

        let context = ContextAssembler::assemble(&retrieval.structured, &retrieval.raw);
        tracing::debug!(
            "Context: {} chars, {} citations",
            context.text.chars().count(),
            context.citations.len()
        );

        let prompt = build_answer_prompt(&context.text, question);

        Ok(PreparedQuestion {
            mode,
            context,
            prompt,
        })
    }

    /// 질문에 대한 전체 답변
    pub async fn ask(&self, question: &str) -> Result<Answer, AskError> {
        let prepared = self.prepare(question).await?;

        let text = self
            .answer_model
            .complete(&prepared.prompt, &self.options)
            .await
            .map_err(AskError::Synthesis)?;

        Ok(Answer {
            text,
            citations: prepared.context.citations,
            mode: prepared.mode,
        })
    }

    /// 질문에 대한 스트리밍 답변
    ///
    /// 스트림 중간의 실패는 조각 대신 `Err`로 나옵니다.
    pub async fn ask_stream(&self, question: &str) -> Result<StreamingAnswer, AskError> {
        let prepared = self.prepare(question).await?;

        let fragments = self
            .answer_model
            .complete_stream(&prepared.prompt, &self.options)
            .await
            .map_err(AskError::Synthesis)?;

        Ok(StreamingAnswer {
            mode: prepared.mode,
            citations: prepared.context.citations,
            fragments: Box::pin(fragments.map(|f| f.map_err(|e| e.context("Answer stream failed")))),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::CollectionEntry;
    use crate::rag::{RAW_HEADER, STRUCTURED_HEADER};
    use crate::testing::{FailingEmbedding, FixedEmbedding, RecordingCollection, ScriptedModel};

    fn record_entry(i: usize, major: &str, page: &str) -> CollectionEntry<AdmissionRecord> {
        let record = AdmissionRecord {
            major: Some(major.to_string()),
            recruitment_number: Some("30".to_string()),
            source_page: Some(page.to_string()),
            ..Default::default()
        };
        CollectionEntry {
            id: format!("dept_{}", i),
            document: record.summary(),
            metadata: record,
            embedding: vec![1.0, 0.0],
        }
    }

    fn chunk_entry(page: u32, text: &str) -> CollectionEntry<ChunkMetadata> {
        CollectionEntry {
            id: format!("page_{}", page),
            document: text.to_string(),
            metadata: ChunkMetadata {
                source_page: Some(page),
            },
            embedding: vec![1.0, 0.0],
        }
    }

    struct Fixture {
        keyword: Arc<ScriptedModel>,
        answer: Arc<ScriptedModel>,
        embedder: Arc<FixedEmbedding>,
        structured: Arc<RecordingCollection<AdmissionRecord>>,
        raw: Arc<RecordingCollection<ChunkMetadata>>,
    }

    impl Fixture {
        fn new(
            keyword: ScriptedModel,
            answer: ScriptedModel,
            records: Vec<CollectionEntry<AdmissionRecord>>,
            chunks: Vec<CollectionEntry<ChunkMetadata>>,
        ) -> Self {
            Self {
                keyword: Arc::new(keyword),
                answer: Arc::new(answer),
                embedder: Arc::new(FixedEmbedding::new(2)),
                structured: Arc::new(RecordingCollection::new("structured_data", records)),
                raw: Arc::new(RecordingCollection::new("raw_chunks", chunks)),
            }
        }

        fn assistant(&self) -> AdmissionAssistant {
            AdmissionAssistant::new(
                self.keyword.clone(),
                self.answer.clone(),
                self.embedder.clone(),
                self.structured.clone(),
                self.raw.clone(),
            )
        }
    }

    #[tokio::test]
    async fn test_targeted_question_with_trailing_period() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["컴퓨터 공학과."]),
            ScriptedModel::new(vec!["컴퓨터공학과는 30명을 모집합니다. (p.12)"]),
            vec![
                record_entry(0, "경영학부", "8"),
                record_entry(1, "컴퓨터공학과", "12"),
            ],
            vec![chunk_entry(12, "모집단위별 모집인원")],
        );

        let answer = fixture
            .assistant()
            .ask("컴퓨터 공학과 모집 인원 알려줘")
            .await
            .unwrap();

        assert_eq!(
            answer.mode,
            RetrievalMode::EntityTargeted("컴퓨터 공학과".to_string())
        );
        assert_eq!(answer.citations[0].text, "출처 (정형 데이터): 컴퓨터공학과 (p.12)");
        assert_eq!(answer.citations[0].page, 12);
        assert!(!answer.is_not_found());

        let prompt = &fixture.answer.prompts()[0];
        assert!(prompt.contains("\"major\": \"컴퓨터공학과\""));
        assert!(!prompt.contains("경영학부"));
        assert!(prompt.contains("컴퓨터 공학과 모집 인원 알려줘"));

        assert_eq!(fixture.structured.get_calls(), 1);
        assert_eq!(fixture.raw.query_limits(), vec![3]);
    }

    #[tokio::test]
    async fn test_unknown_major_falls_back_to_raw_citation() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["천문우주학과"]),
            ScriptedModel::new(vec![NOT_FOUND_MESSAGE]),
            vec![record_entry(0, "경영학부", "8")],
            vec![chunk_entry(5, "전형 일정 안내")],
        );

        let answer = fixture.assistant().ask("천문우주학과 경쟁률은?").await.unwrap();

        assert_eq!(
            answer.citations,
            vec![SourceCitation {
                text: "출처 (원본 텍스트): page_5 (p.5)".to_string(),
                page: 5,
            }]
        );
        assert!(answer.is_not_found());
    }

    #[tokio::test]
    async fn test_unknown_major_leaves_structured_section_blank() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["천문우주학과"]),
            ScriptedModel::new(vec![]),
            vec![record_entry(0, "경영학부", "8")],
            vec![chunk_entry(5, "전형 일정 안내")],
        );

        let prepared = fixture.assistant().prepare("천문우주학과 경쟁률은?").await.unwrap();
        let text = &prepared.context.text;

        let structured_end = text.find(STRUCTURED_HEADER).unwrap() + STRUCTURED_HEADER.len();
        let raw_at = text.find(RAW_HEADER).unwrap();
        assert!(text[structured_end..raw_at].trim().is_empty());
        assert!(text[raw_at..].contains("전형 일정 안내"));
        assert!(!text.contains("경영학부"));
        assert_eq!(prepared.mode, RetrievalMode::EntityTargeted("천문우주학과".to_string()));
    }

    #[tokio::test]
    async fn test_sentinel_routes_to_similarity_search() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["없음"]),
            ScriptedModel::new(vec!["정시 원서 접수는 1월입니다."]),
            vec![record_entry(0, "경영학부", "8")],
            vec![chunk_entry(2, "원서 접수 일정")],
        );

        let answer = fixture.assistant().ask("정시 원서 접수 언제야?").await.unwrap();

        assert_eq!(answer.mode, RetrievalMode::OpenEnded);
        assert_eq!(fixture.structured.get_calls(), 0);
        assert_eq!(fixture.structured.query_limits(), vec![10]);
        assert_eq!(fixture.raw.query_limits(), vec![5]);
    }

    #[tokio::test]
    async fn test_each_external_call_once() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["경영학부"]),
            ScriptedModel::new(vec!["답변"]),
            vec![record_entry(0, "경영학부", "8")],
            vec![chunk_entry(8, "경영학부 소개")],
        );

        fixture.assistant().ask("경영학부 수능 반영 비율").await.unwrap();

        assert_eq!(fixture.keyword.prompts().len(), 1);
        assert_eq!(fixture.answer.prompts().len(), 1);
        assert_eq!(fixture.embedder.modes(), vec![EmbedMode::Query]);
    }

    #[tokio::test]
    async fn test_stream_fragments_concatenate() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["경영학부"]),
            ScriptedModel::with_fragments(vec![vec!["경영학부는 ", "30명을 ", "모집합니다."]]),
            vec![record_entry(0, "경영학부", "8")],
            vec![],
        );

        let streaming = fixture.assistant().ask_stream("경영학부 인원").await.unwrap();
        assert_eq!(streaming.citations.len(), 1);

        let answer = streaming.collect().await.unwrap();
        assert_eq!(answer.text, "경영학부는 30명을 모집합니다.");
    }

    #[tokio::test]
    async fn test_extraction_failure_is_classified() {
        let fixture = Fixture::new(
            ScriptedModel::failing("quota exceeded"),
            ScriptedModel::new(vec![]),
            vec![],
            vec![],
        );

        let err = fixture.assistant().ask("질문").await.unwrap_err();
        assert!(matches!(err, AskError::Extraction(_)));
        assert!(err.to_string().contains("quota exceeded"));
        assert!(fixture.answer.prompts().is_empty());
    }

    #[tokio::test]
    async fn test_store_failure_is_classified() {
        let assistant = AdmissionAssistant::new(
            Arc::new(ScriptedModel::new(vec!["수학과"])),
            Arc::new(ScriptedModel::new(vec![])),
            Arc::new(FixedEmbedding::new(2)),
            Arc::new(RecordingCollection::<AdmissionRecord>::unavailable("structured_data")),
            Arc::new(RecordingCollection::<ChunkMetadata>::new("raw_chunks", vec![])),
        );

        let err = assistant.ask("수학과 면접").await.unwrap_err();
        assert!(matches!(err, AskError::StoreUnavailable(_)));
    }

    #[tokio::test]
    async fn test_embedding_failure_is_classified() {
        let assistant = AdmissionAssistant::new(
            Arc::new(ScriptedModel::new(vec!["없음"])),
            Arc::new(ScriptedModel::new(vec![])),
            Arc::new(FailingEmbedding),
            Arc::new(RecordingCollection::<AdmissionRecord>::new("structured_data", vec![])),
            Arc::new(RecordingCollection::<ChunkMetadata>::new("raw_chunks", vec![])),
        );

        let err = assistant.ask("입학 일정").await.unwrap_err();
        assert!(matches!(err, AskError::Embedding(_)));
    }

    #[tokio::test]
    async fn test_synthesis_failure_is_classified() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["없음"]),
            ScriptedModel::failing("deadline exceeded"),
            vec![],
            vec![],
        );

        let err = fixture.assistant().ask("질문").await.unwrap_err();
        assert!(matches!(err, AskError::Synthesis(_)));
    }

    #[tokio::test]
    async fn test_custom_limits() {
        let fixture = Fixture::new(
            ScriptedModel::new(vec!["없음"]),
            ScriptedModel::new(vec!["답변"]),
            vec![],
            vec![],
        );

        let limits = RetrievalLimits {
            targeted_raw: 1,
            open_structured: 4,
            open_raw: 2,
        };
        fixture.assistant().with_limits(limits).ask("질문").await.unwrap();

        assert_eq!(fixture.structured.query_limits(), vec![4]);
        assert_eq!(fixture.raw.query_limits(), vec![2]);
    }
}
