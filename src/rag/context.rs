//! 컨텍스트 조립
//!
//! 검색 결과를 두 구획(정형 요약, 원본 텍스트)의 프롬프트 컨텍스트로 만들고,
//! 출처 목록을 `(페이지, 문구)` 기준으로 중복 제거합니다.
//! 출처 정보가 깨져 있어도 조립은 멈추지 않고 해당 출처만 빠집니다.

use std::collections::HashSet;

use anyhow::{Context, Result};
use url::Url;

use crate::knowledge::{AdmissionRecord, ChunkMetadata, SearchResult};

/// 정형 데이터 구획 헤더
pub const STRUCTURED_HEADER: &str = "--- [핵심 요약 정보 (구조화된 데이터)] ---";

/// 원본 텍스트 구획 헤더
pub const RAW_HEADER: &str = "--- [관련 원본 텍스트 (추가 정보)] ---";

// ============================================================================
// SourceCitation
// ============================================================================

/// 답변 출처 (문구 + 원본 페이지)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceCitation {
    pub text: String,
    pub page: u32,
}

impl SourceCitation {
    /// 원본 문서의 해당 페이지 링크 (`<url>#page=<n>`)
    pub fn link(&self, document_url: &str) -> Result<Url> {
        let mut url = Url::parse(document_url)
            .with_context(|| format!("Invalid document URL: {}", document_url))?;
        url.set_fragment(Some(&format!("page={}", self.page)));
        Ok(url)
    }

    /// 정형 레코드 출처
    ///
    /// 페이지를 정수로 읽을 수 없으면 `None`입니다.
    pub fn for_record(record: &AdmissionRecord) -> Option<Self> {
        let source_page = record.source_page.as_deref().unwrap_or("N/A");

        let Some(page) = first_page(source_page) else {
            tracing::debug!(
                "Dropping citation for {:?}: unreadable source_page {:?}",
                record.major,
                source_page
            );
            return None;
        };

        Some(Self {
            text: format!(
                "출처 (정형 데이터): {} (p.{})",
                record.major.as_deref().unwrap_or("정보"),
                source_page
            ),
            page,
        })
    }

    /// 원본 텍스트 청크 출처 (페이지가 없으면 0)
    pub fn for_chunk(id: &str, metadata: &ChunkMetadata) -> Self {
        let page = metadata.source_page.unwrap_or(0);
        Self {
            text: format!("출처 (원본 텍스트): {} (p.{})", id, page),
            page,
        }
    }
}

/// `"12, 13"` 같은 페이지 목록의 첫 페이지
pub fn first_page(source_page: &str) -> Option<u32> {
    source_page.split(',').next()?.trim().parse().ok()
}

/// `(페이지, 문구)`가 같은 출처 제거 (처음 나온 것 유지)
pub fn dedup_citations(citations: Vec<SourceCitation>) -> Vec<SourceCitation> {
    let mut seen = HashSet::new();
    citations
        .into_iter()
        .filter(|c| seen.insert((c.page, c.text.clone())))
        .collect()
}

// ============================================================================
// ContextAssembler
// ============================================================================

/// 조립된 컨텍스트
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledContext {
    /// 프롬프트에 넣을 텍스트
    pub text: String,
    /// 중복 제거된 출처 (정형 먼저, 그다음 원본)
    pub citations: Vec<SourceCitation>,
}

/// 검색 결과를 컨텍스트로 조립
pub struct ContextAssembler;

impl ContextAssembler {
    pub fn assemble(
        structured: &SearchResult<AdmissionRecord>,
        raw: &SearchResult<ChunkMetadata>,
    ) -> AssembledContext {
        let mut text = String::new();
        let mut citations = Vec::with_capacity(structured.len() + raw.len());

        text.push_str(STRUCTURED_HEADER);
        text.push('\n');
        for (_, document, record) in structured.iter() {
            text.push_str(&render_record(record, document));
            text.push('\n');
            citations.extend(SourceCitation::for_record(record));
        }

        text.push('\n');
        text.push_str(RAW_HEADER);
        text.push('\n');
        text.push_str(&raw.documents().join("\n"));

        for (id, _, metadata) in raw.iter() {
            citations.push(SourceCitation::for_chunk(id, metadata));
        }

        AssembledContext {
            text,
            citations: dedup_citations(citations),
        }
    }
}

/// 레코드를 들여쓴 JSON으로 (직렬화 실패 시 요약 문서)
fn render_record(record: &AdmissionRecord, document: &str) -> String {
    serde_json::to_string_pretty(record).unwrap_or_else(|e| {
        tracing::debug!("Failed to render record as JSON: {}", e);
        document.to_string()
    })
}

// ============================================================================
// Tests
// ============================================================================
