//! 검색 라우터
//!
//! 학과명이 추출되면 정형 컬렉션 전체에서 공백 무시 부분 문자열로 정확히 매칭하고,
//! 원본 텍스트는 유사도 검색으로 보충합니다.
//! 학과명이 없으면 두 컬렉션 모두 유사도 검색만 합니다.

use std::fmt;
use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::RetrievalLimits;
use crate::knowledge::{AdmissionRecord, ChunkMetadata, Collection, SearchResult};

/// 검색 방식
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalMode {
    /// 특정 학과 질문 (추출된 학과명)
    EntityTargeted(String),
    /// 학과를 특정하지 않은 질문
    OpenEnded,
}

impl RetrievalMode {
    /// 키워드 추출 결과로 방식 결정
    pub fn from_keyword(keyword: Option<String>) -> Self {
        match keyword {
            Some(entity) if !strip_whitespace(&entity).is_empty() => {
                RetrievalMode::EntityTargeted(entity)
            }
            _ => RetrievalMode::OpenEnded,
        }
    }

    pub fn entity(&self) -> Option<&str> {
        match self {
            RetrievalMode::EntityTargeted(entity) => Some(entity),
            RetrievalMode::OpenEnded => None,
        }
    }
}

impl fmt::Display for RetrievalMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalMode::EntityTargeted(entity) => write!(f, "학과 매칭 ({})", entity),
            RetrievalMode::OpenEnded => write!(f, "유사도 검색"),
        }
    }
}

/// 모든 유니코드 공백 제거
pub fn strip_whitespace(text: &str) -> String {
    text.chars().filter(|c| !c.is_whitespace()).collect()
}

/// 레코드의 학과명이 (공백 제거한) 학과명을 포함하는지
///
/// 학과명이 없는 레코드는 빈 문자열로 취급하므로 빈 키가 아니면 매칭되지 않습니다.
pub fn major_matches(stripped_entity: &str, record: &AdmissionRecord) -> bool {
    let major = strip_whitespace(record.major.as_deref().unwrap_or(""));
    major.contains(stripped_entity)
}

/// 전체 레코드 중 학과명이 매칭되는 것만 저장 순서대로 남기기
pub fn filter_by_major(
    all: SearchResult<AdmissionRecord>,
    entity: &str,
) -> SearchResult<AdmissionRecord> {
    let stripped = strip_whitespace(entity);
    all.retain(|record| major_matches(&stripped, record))
}

/// 검색 결과 묶음
#[derive(Debug, Clone)]
pub struct Retrieval {
    pub mode: RetrievalMode,
    pub structured: SearchResult<AdmissionRecord>,
    pub raw: SearchResult<ChunkMetadata>,
}

/// 두 컬렉션에 대한 검색 라우터
#[derive(Clone)]
pub struct QueryRouter {
    structured: Arc<dyn Collection<AdmissionRecord>>,
    raw: Arc<dyn Collection<ChunkMetadata>>,
    limits: RetrievalLimits,
}

impl QueryRouter {
    pub fn new(
        structured: Arc<dyn Collection<AdmissionRecord>>,
        raw: Arc<dyn Collection<ChunkMetadata>>,
        limits: RetrievalLimits,
    ) -> Self {
        Self {
            structured,
            raw,
            limits,
        }
    }

    /// 검색 개수 변경
    pub fn with_limits(mut self, limits: RetrievalLimits) -> Self {
        self.limits = limits;
        self
    }

    /// 방식에 따라 검색
    ///
    /// # Arguments
    /// * `mode` - 검색 방식
    /// * `query_embedding` - 질문 임베딩 (질문당 한 번 계산한 것)
    pub async fn retrieve(&self, mode: &RetrievalMode, query_embedding: &[f32]) -> Result<Retrieval> {
        let (structured, raw) = match mode {
            RetrievalMode::EntityTargeted(entity) => {
                let all = self
                    .structured
                    .get()
                    .await
                    .with_context(|| format!("Failed to read '{}'", self.structured.name()))?;
                let total = all.len();
                let matched = filter_by_major(all, entity);

                if matched.is_empty() {
                    // 없는 학과와 요강에 안 나온 학과는 구분하지 않음
                    tracing::debug!("No record matched '{}' among {} records", entity, total);
                }

                let raw = self.query_raw(query_embedding, self.limits.targeted_raw).await?;
                (matched, raw)
            }
            RetrievalMode::OpenEnded => {
                let structured = self
                    .structured
                    .query(query_embedding, self.limits.open_structured)
                    .await
                    .with_context(|| format!("Failed to query '{}'", self.structured.name()))?;
                let raw = self.query_raw(query_embedding, self.limits.open_raw).await?;
                (structured, raw)
            }
        };

        tracing::info!(
            "Retrieved {} structured / {} raw ({})",
            structured.len(),
            raw.len(),
            mode
        );

        Ok(Retrieval {
            mode: mode.clone(),
            structured,
            raw,
        })
    }

    async fn query_raw(&self, embedding: &[f32], n: usize) -> Result<SearchResult<ChunkMetadata>> {
        self.raw
            .query(embedding, n)
            .await
            .with_context(|| format!("Failed to query '{}'", self.raw.name()))
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::CollectionEntry;
    use crate::testing::RecordingCollection;

    fn record_entry(i: usize, major: Option<&str>) -> CollectionEntry<AdmissionRecord> {
        let record = AdmissionRecord {
            major: major.map(String::from),
            source_page: Some(format!("{}", i + 10)),
            ..Default::default()
        };
        CollectionEntry {
            id: format!("dept_{}", i),
            document: record.summary(),
            metadata: record,
            embedding: vec![1.0, i as f32],
        }
    }

    fn chunk_entry(page: u32) -> CollectionEntry<ChunkMetadata> {
        CollectionEntry {
            id: format!("page_{}", page),
            document: format!("{}쪽 본문", page),
            metadata: ChunkMetadata {
                source_page: Some(page),
            },
            embedding: vec![1.0, page as f32],
        }
    }

    fn stores() -> (
        Arc<RecordingCollection<AdmissionRecord>>,
        Arc<RecordingCollection<ChunkMetadata>>,
    ) {
        let structured = RecordingCollection::new(
            "structured_data",
            vec![
                record_entry(0, Some("컴퓨터공학과")),
                record_entry(1, Some("경영학부")),
                record_entry(2, None),
                record_entry(3, Some("컴퓨터 공학과(야간)")),
                record_entry(4, Some("소프트웨어·컴퓨터공학과")),
            ],
        );
        let raw = RecordingCollection::new("raw_chunks", (1..=8).map(chunk_entry).collect());
        (Arc::new(structured), Arc::new(raw))
    }

    fn router(
        structured: &Arc<RecordingCollection<AdmissionRecord>>,
        raw: &Arc<RecordingCollection<ChunkMetadata>>,
    ) -> QueryRouter {
        QueryRouter::new(structured.clone(), raw.clone(), RetrievalLimits::default())
    }

    #[test]
    fn test_strip_whitespace_unicode() {
        assert_eq!(strip_whitespace(" 컴퓨터 \t공학과\u{3000}\n"), "컴퓨터공학과");
    }

    #[test]
    fn test_major_matches_ignores_spacing() {
        let record = AdmissionRecord {
            major: Some("컴퓨터 공학과".to_string()),
            ..Default::default()
        };
        assert!(major_matches(&strip_whitespace("컴퓨터공학과"), &record));
        assert!(major_matches(&strip_whitespace("컴퓨터"), &record));
        assert!(!major_matches(&strip_whitespace("경영학부"), &record));
        assert!(!major_matches("컴퓨터", &AdmissionRecord::default()));
    }

    #[test]
    fn test_mode_from_keyword() {
        assert_eq!(RetrievalMode::from_keyword(None), RetrievalMode::OpenEnded);
        assert_eq!(
            RetrievalMode::from_keyword(Some(" ".to_string())),
            RetrievalMode::OpenEnded
        );
        assert_eq!(
            RetrievalMode::from_keyword(Some("수학과".to_string())).entity(),
            Some("수학과")
        );
    }

    #[tokio::test]
    async fn test_targeted_scans_all_and_keeps_store_order() {
        let (structured, raw) = stores();
        let mode = RetrievalMode::EntityTargeted("컴퓨터 공학과".to_string());

        let retrieval = router(&structured, &raw).retrieve(&mode, &[1.0, 0.0]).await.unwrap();

        assert_eq!(
            retrieval.structured.ids(),
            &["dept_0".to_string(), "dept_3".to_string(), "dept_4".to_string()]
        );
        assert_eq!(structured.get_calls(), 1);
        assert!(structured.query_limits().is_empty());
        assert_eq!(raw.query_limits(), vec![3]);
        assert_eq!(retrieval.raw.len(), 3);
    }

    #[tokio::test]
    async fn test_targeted_no_match_still_has_raw() {
        let (structured, raw) = stores();
        let mode = RetrievalMode::EntityTargeted("천문우주학과".to_string());

        let retrieval = router(&structured, &raw).retrieve(&mode, &[1.0, 0.0]).await.unwrap();

        assert!(retrieval.structured.is_empty());
        assert_eq!(retrieval.raw.len(), 3);
    }

    #[tokio::test]
    async fn test_open_ended_never_scans() {
        let (structured, raw) = stores();

        let retrieval = router(&structured, &raw)
            .retrieve(&RetrievalMode::OpenEnded, &[1.0, 0.0])
            .await
            .unwrap();

        assert_eq!(structured.get_calls(), 0);
        assert_eq!(structured.query_limits(), vec![10]);
        assert_eq!(raw.query_limits(), vec![5]);
        assert_eq!(retrieval.structured.len(), 5);
        assert_eq!(retrieval.raw.len(), 5);
    }

    #[tokio::test]
    async fn test_store_failure_is_error() {
        let structured = Arc::new(RecordingCollection::<AdmissionRecord>::unavailable("structured_data"));
        let (_, raw) = stores();
        let router = QueryRouter::new(structured, raw, RetrievalLimits::default());

        let mode = RetrievalMode::EntityTargeted("수학과".to_string());
        assert!(router.retrieve(&mode, &[1.0, 0.0]).await.is_err());
    }
}
