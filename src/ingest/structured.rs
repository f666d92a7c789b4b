//! 정형 데이터 적재
//!
//! 추출 결과 JSON(`{"department_info": [...]}` 또는 배열)을 레코드로 검증하고,
//! 요약 문서를 임베딩해 `dept_<i>` ID로 정형 컬렉션을 통째로 교체합니다.

use anyhow::{Context, Result};
use serde_json::Value;

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::knowledge::{AdmissionRecord, Collection, CollectionEntry};

/// `department_info`의 항목 하나 (원래 위치 포함)
#[derive(Debug, Clone)]
pub struct DepartmentEntry {
    /// `department_info` 배열 안의 위치 (`dept_<index>` id가 됨)
    pub index: usize,
    pub record: AdmissionRecord,
}

/// 추출 결과 JSON에서 학과 레코드 목록 파싱
///
/// 잘못된 항목은 경고 후 건너뛰고, 남은 항목은 원래 위치를 유지합니다.
/// 유효한 항목이 없으면 에러입니다.
pub fn parse_department_info(json: &str) -> Result<Vec<DepartmentEntry>> {
    let value: Value = serde_json::from_str(json).context("Failed to parse admission JSON")?;

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("department_info") {
            Some(Value::Array(items)) => items,
            _ => anyhow::bail!("JSON has no 'department_info' array"),
        },
        _ => anyhow::bail!("Admission JSON must be an object or an array"),
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        match AdmissionRecord::from_json(item) {
            Ok(record) => records.push(DepartmentEntry { index: i, record }),
            Err(e) => tracing::warn!("Skipping department_info[{}]: {}", i, e),
        }
    }

    if records.is_empty() {
        anyhow::bail!("No valid entries in 'department_info'");
    }

    Ok(records)
}

/// 레코드를 임베딩해 정형 컬렉션 교체
///
/// # Returns
/// 저장된 레코드 수
pub async fn ingest_structured(
    records: Vec<DepartmentEntry>,
    embedder: &dyn EmbeddingProvider,
    collection: &dyn Collection<AdmissionRecord>,
) -> Result<usize> {
    let documents: Vec<String> = records.iter().map(|entry| entry.record.summary()).collect();

    tracing::info!(
        "Embedding {} admission records into '{}'",
        documents.len(),
        collection.name()
    );

    let embeddings = embedder
        .embed_batch(&documents, EmbedMode::Document)
        .await
        .context("Failed to embed admission records")?;

    let entries: Vec<CollectionEntry<AdmissionRecord>> = records
        .into_iter()
        .zip(documents)
        .zip(embeddings)
        .map(|((entry, document), embedding)| CollectionEntry {
            id: format!("dept_{}", entry.index),
            document,
            metadata: entry.record,
            embedding,
        })
        .collect();

    let count = collection
        .replace_all(entries)
        .await
        .context("Failed to store admission records")?;

    tracing::info!("Stored {} records in '{}'", count, collection.name());
    Ok(count)
}

// ============================================================================
// Tests
// ============================================================================
