//! 설정 모듈
//!
//! 데이터 디렉토리, API 키, 모델 이름, 검색 개수 등 실행 설정을 한곳에 모읍니다.
//! 환경변수에서 읽고, CLI 플래그가 있으면 그 값으로 덮어씁니다.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;

// ============================================================================
// Defaults
// ============================================================================

/// 정형 데이터 컬렉션 (학과별 모집 정보)
pub const STRUCTURED_COLLECTION: &str = "structured_data";

/// 원본 텍스트 컬렉션 (페이지/청크 단위)
pub const RAW_COLLECTION: &str = "raw_chunks";

/// 키워드 추출 모델
pub const DEFAULT_KEYWORD_MODEL: &str = "gemini-2.5-flash";

/// 최종 답변 생성 모델
pub const DEFAULT_ANSWER_MODEL: &str = "gemini-2.5-flash";

/// 학과명이 없을 때 추출기가 돌려주는 값
pub const DEFAULT_NONE_SENTINEL: &str = "없음";

/// 생성 모델 요청 타임아웃 (초)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 600;

/// 데이터 디렉토리 환경변수
const DATA_DIR_ENV: &str = "ADMISSION_RAG_DATA_DIR";

/// 원본 PDF URL 환경변수 (출처 링크용)
const DOCUMENT_URL_ENV: &str = "ADMISSION_RAG_DOCUMENT_URL";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로
///
/// `ADMISSION_RAG_DATA_DIR`가 있으면 그 경로, 없으면 `~/.admission-rag/`
pub fn get_data_dir() -> PathBuf {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV) {
        if !dir.is_empty() {
            return PathBuf::from(dir);
        }
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".admission-rag")
}

// ============================================================================
// Retrieval Limits
// ============================================================================

/// 검색 결과 개수 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetrievalLimits {
    /// 학과명 매칭 시 보충용 원본 텍스트 개수
    pub targeted_raw: usize,
    /// 유사도 검색 시 정형 데이터 개수
    pub open_structured: usize,
    /// 유사도 검색 시 원본 텍스트 개수
    pub open_raw: usize,
}

impl Default for RetrievalLimits {
    fn default() -> Self {
        Self {
            targeted_raw: 3,
            open_structured: 10,
            open_raw: 5,
        }
    }
}

// ============================================================================
// Settings
// ============================================================================

/// 실행 설정
#[derive(Debug, Clone)]
pub struct Settings {
    /// LanceDB와 매니페스트가 저장되는 디렉토리
    pub data_dir: PathBuf,
    /// 키워드 추출 모델
    pub keyword_model: String,
    /// 답변 생성 모델
    pub answer_model: String,
    /// 임베딩 차원 (768, 1536, 3072)
    pub embedding_dimension: usize,
    /// "학과명 없음" 센티널
    pub none_sentinel: String,
    /// 생성 모델 요청 타임아웃
    pub request_timeout: Duration,
    /// 출처 링크에 쓰는 원본 PDF URL
    pub document_url: Option<String>,
    /// 검색 개수
    pub limits: RetrievalLimits,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: get_data_dir(),
            keyword_model: DEFAULT_KEYWORD_MODEL.to_string(),
            answer_model: DEFAULT_ANSWER_MODEL.to_string(),
            embedding_dimension: crate::embedding::DEFAULT_DIMENSION,
            none_sentinel: DEFAULT_NONE_SENTINEL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            document_url: None,
            limits: RetrievalLimits::default(),
        }
    }
}

impl Settings {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Self {
        let document_url = std::env::var(DOCUMENT_URL_ENV)
            .ok()
            .filter(|u| !u.trim().is_empty());

        Self {
            document_url,
            ..Default::default()
        }
    }

    /// LanceDB 경로
    pub fn lance_path(&self) -> PathBuf {
        self.data_dir.join("admissions.lance")
    }

    /// 적재 매니페스트 경로
    pub fn manifest_path(&self) -> PathBuf {
        self.data_dir.join("manifest.json")
    }

    /// 데이터 디렉토리 생성
    pub fn ensure_data_dir(&self) -> Result<()> {
        if !self.data_dir.exists() {
            std::fs::create_dir_all(&self.data_dir).map_err(|e| {
                anyhow::anyhow!(
                    "Failed to create data directory {}: {}",
                    self.data_dir.display(),
                    e
                )
            })?;
        }
        Ok(())
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 환경변수 (우선순위 순)
const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "GOOGLE_AI_API_KEY"];

/// API 키 로드 (환경변수에서)
///
/// 우선순위: `GEMINI_API_KEY` > `GOOGLE_API_KEY` > `GOOGLE_AI_API_KEY`
pub fn get_api_key() -> Result<String> {
    for var in API_KEY_VARS {
        if let Ok(key) = std::env::var(var) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", var);
                return Ok(key);
            }
        }
    }

    anyhow::bail!(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_API_KEY environment variable.\n\
         Get your API key at: https://aistudio.google.com/app/apikey"
    )
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    API_KEY_VARS
        .iter()
        .any(|var| std::env::var(var).map(|k| !k.is_empty()).unwrap_or(false))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_limits() {
        let limits = RetrievalLimits::default();
        assert_eq!(limits.targeted_raw, 3);
        assert_eq!(limits.open_structured, 10);
        assert_eq!(limits.open_raw, 5);
    }

    #[test]
    fn test_settings_paths() {
        let settings = Settings {
            data_dir: PathBuf::from("/tmp/admission"),
            ..Default::default()
        };
        assert_eq!(
            settings.lance_path(),
            PathBuf::from("/tmp/admission/admissions.lance")
        );
        assert_eq!(
            settings.manifest_path(),
            PathBuf::from("/tmp/admission/manifest.json")
        );
    }

    #[test]
    fn test_default_sentinel() {
        let settings = Settings::default();
        assert_eq!(settings.none_sentinel, "없음");
        assert_eq!(settings.request_timeout, Duration::from_secs(600));
    }
}
