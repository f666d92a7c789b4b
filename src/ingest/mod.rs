//! 적재 모듈
//!
//! 추출 파이프라인이 만든 결과물(학과별 JSON, 페이지별 원본 텍스트)을
//! 임베딩해서 두 컬렉션에 통째로 교체 저장합니다.
//! 입력 파일 해시를 매니페스트에 남겨 같은 파일은 다시 적재하지 않습니다.

mod raw;
mod structured;

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use raw::{chunks_from_pages, chunks_from_text, extract_pdf_pages, ingest_raw};
pub use structured::{ingest_structured, parse_department_info, DepartmentEntry};

// ============================================================================
// Manifest
// ============================================================================

/// 컬렉션별 마지막 적재 기록
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// 입력 파일 경로
    pub source: String,
    /// 입력 파일 SHA-256
    pub sha256: String,
    /// 저장된 엔트리 수
    pub records: usize,
    /// 적재 시각
    pub ingested_at: DateTime<Utc>,
}

/// 적재 매니페스트 (`manifest.json`)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestManifest {
    #[serde(default)]
    pub collections: BTreeMap<String, ManifestEntry>,
}

impl IngestManifest {
    /// 매니페스트 로드 (없으면 빈 매니페스트)
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))
    }

    /// 매니페스트 저장
    pub fn save(&self, path: &Path) -> Result<()> {
        let text = serde_json::to_string_pretty(self).context("Failed to serialize manifest")?;
        std::fs::write(path, text)
            .with_context(|| format!("Failed to write manifest: {}", path.display()))
    }

    /// 같은 입력으로 이미 적재했는지
    pub fn is_unchanged(&self, collection: &str, sha256: &str) -> bool {
        self.collections
            .get(collection)
            .map(|e| e.sha256 == sha256)
            .unwrap_or(false)
    }

    /// 적재 결과 기록
    pub fn record(&mut self, collection: &str, source: &Path, sha256: String, records: usize) {
        self.collections.insert(
            collection.to_string(),
            ManifestEntry {
                source: source.display().to_string(),
                sha256,
                records,
                ingested_at: Utc::now(),
            },
        );
    }
}

/// 바이트 SHA-256 (16진수)
pub fn sha256_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

// ============================================================================
// Tests
// ============================================================================
