//! 저장 레코드와 검색 결과 타입
//!
//! - [`AdmissionRecord`]: 학과/전형 단위 정형 데이터 (정형 컬렉션의 메타데이터)
//! - [`RawChunk`]: 페이지 또는 청크 단위 원본 텍스트
//! - [`SearchResult`]: ids / documents / metadatas 세 벡터가 같은 길이로 정렬된 검색 결과

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ============================================================================
// AdmissionRecord
// ============================================================================

/// 모집요강 학과별 레코드
///
/// 값이 없으면 `None`으로 두고, 문자열 변환은 컨텍스트를 만들 때만 합니다.
/// `source_page`는 `"12, 13"` 같은 목록이나 `"N/A"` 같은 값이 올 수 있어 문자열로 둡니다.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AdmissionRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub major: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruitment_unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recruitment_number: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub csat_ratios: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evaluation_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_page: Option<String>,
    /// 스키마 밖의 추가 항목 (추출 단계가 더 넣어준 값)
    #[serde(flatten)]
    pub extra: BTreeMap<String, String>,
}

impl AdmissionRecord {
    /// 추출 JSON 항목을 검증해 레코드로 변환
    ///
    /// 객체가 아니거나 값이 하나도 없으면 에러입니다.
    /// 숫자/배열/객체 값은 표시용 문자열로 바꿉니다.
    pub fn from_json(item: &Value) -> Result<Self> {
        let Value::Object(map) = item else {
            anyhow::bail!("Admission entry must be a JSON object, got: {}", item);
        };

        let mut record = AdmissionRecord::default();

        for (key, value) in map {
            let Some(text) = display_value(value) else {
                continue;
            };

            match key.as_str() {
                "major" => record.major = Some(text),
                "recruitment_unit" => record.recruitment_unit = Some(text),
                "selection_category" => record.selection_category = Some(text),
                "recruitment_number" => record.recruitment_number = Some(text),
                "csat_ratios" => record.csat_ratios = Some(text),
                "evaluation_method" => record.evaluation_method = Some(text),
                "source_page" => record.source_page = Some(text),
                _ => {
                    record.extra.insert(key.clone(), text);
                }
            }
        }

        if record.is_empty() {
            anyhow::bail!("Admission entry has no values: {}", item);
        }

        Ok(record)
    }

    /// 모든 항목이 비어있는지
    pub fn is_empty(&self) -> bool {
        self.major.is_none()
            && self.recruitment_unit.is_none()
            && self.selection_category.is_none()
            && self.recruitment_number.is_none()
            && self.csat_ratios.is_none()
            && self.evaluation_method.is_none()
            && self.source_page.is_none()
            && self.extra.is_empty()
    }

    /// 임베딩용 요약 문서 (검색 키워드만)
    pub fn summary(&self) -> String {
        format!(
            "학과명: {}. 모집단위: {}. 전형 종류: {}.",
            self.major.as_deref().unwrap_or(""),
            self.recruitment_unit.as_deref().unwrap_or(""),
            self.selection_category.as_deref().unwrap_or(""),
        )
    }
}

/// JSON 값을 표시용 문자열로 변환 (`null`과 빈 문자열은 `None`)
fn display_value(value: &Value) -> Option<String> {
    let text = match value {
        Value::Null => return None,
        Value::String(s) => s.trim().to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => items
            .iter()
            .filter_map(display_value)
            .collect::<Vec<_>>()
            .join(", "),
        Value::Object(_) => value.to_string(),
    };

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

// ============================================================================
// RawChunk
// ============================================================================

/// 원본 텍스트 조각
#[derive(Debug, Clone, PartialEq)]
pub struct RawChunk {
    /// `page_<n>` 또는 `page_<n>_<k>`
    pub id: String,
    /// 본문
    pub text: String,
    /// 원본 페이지 번호 (1부터)
    pub source_page: u32,
}

impl RawChunk {
    /// 페이지 전체 청크
    pub fn page(source_page: u32, text: impl Into<String>) -> Self {
        Self {
            id: format!("page_{}", source_page),
            text: text.into(),
            source_page,
        }
    }

    /// 페이지 일부 청크
    pub fn part(source_page: u32, index: usize, text: impl Into<String>) -> Self {
        Self {
            id: format!("page_{}_{}", source_page, index),
            text: text.into(),
            source_page,
        }
    }

    /// 저장용 메타데이터
    pub fn metadata(&self) -> ChunkMetadata {
        ChunkMetadata {
            source_page: Some(self.source_page),
        }
    }
}

/// 원본 텍스트 컬렉션 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    #[serde(default)]
    pub source_page: Option<u32>,
}

// ============================================================================
// SearchResult
// ============================================================================

/// 검색 결과 (인덱스 정렬된 병렬 벡터)
///
/// 세 벡터는 항상 같은 길이입니다. 결과가 없으면 빈 상태입니다.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult<M> {
    ids: Vec<String>,
    documents: Vec<String>,
    metadatas: Vec<M>,
}

impl<M> Default for SearchResult<M> {
    fn default() -> Self {
        Self {
            ids: Vec::new(),
            documents: Vec::new(),
            metadatas: Vec::new(),
        }
    }
}

impl<M> SearchResult<M> {
    /// 빈 결과
    pub fn new() -> Self {
        Self::default()
    }

    /// 병렬 벡터로부터 생성 (길이가 다르면 에러)
    pub fn from_parts(ids: Vec<String>, documents: Vec<String>, metadatas: Vec<M>) -> Result<Self> {
        if ids.len() != documents.len() || ids.len() != metadatas.len() {
            anyhow::bail!(
                "Misaligned search result: {} ids, {} documents, {} metadatas",
                ids.len(),
                documents.len(),
                metadatas.len()
            );
        }

        Ok(Self {
            ids,
            documents,
            metadatas,
        })
    }

    /// 항목 추가
    pub fn push(&mut self, id: impl Into<String>, document: impl Into<String>, metadata: M) {
        self.ids.push(id.into());
        self.documents.push(document.into());
        self.metadatas.push(metadata);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn documents(&self) -> &[String] {
        &self.documents
    }

    pub fn metadatas(&self) -> &[M] {
        &self.metadatas
    }

    /// (id, document, metadata) 순회
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, &M)> {
        self.ids
            .iter()
            .zip(self.documents.iter())
            .zip(self.metadatas.iter())
            .map(|((id, doc), meta)| (id.as_str(), doc.as_str(), meta))
    }

    /// 조건을 만족하는 항목만 남기기 (순서 유지)
    pub fn retain<F>(self, mut keep: F) -> Self
    where
        F: FnMut(&M) -> bool,
    {
        let mut result = Self::new();
        for ((id, doc), meta) in self
            .ids
            .into_iter()
            .zip(self.documents)
            .zip(self.metadatas)
        {
            if keep(&meta) {
                result.push(id, doc, meta);
            }
        }
        result
    }
}

// ============================================================================
// Tests
// ============================================================================
