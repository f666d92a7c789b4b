//! Collection - 벡터 컬렉션 트레이트 및 메모리 구현
//!
//! 정형 컬렉션과 원본 텍스트 컬렉션이 같은 인터페이스를 씁니다.
//! - `get()`: 전체 컬렉션을 저장 순서대로 반환
//! - `query()`: 임베딩 최근접 이웃 검색

use std::sync::RwLock;

use anyhow::Result;
use async_trait::async_trait;

use super::record::SearchResult;

// ============================================================================
// Types
// ============================================================================

/// 컬렉션 저장 엔트리
#[derive(Debug, Clone)]
pub struct CollectionEntry<M> {
    /// 고유 ID (`dept_<i>`, `page_<n>` 등)
    pub id: String,
    /// 검색/표시용 문서 텍스트
    pub document: String,
    /// 메타데이터
    pub metadata: M,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

// ============================================================================
// Collection Trait
// ============================================================================

/// 벡터 컬렉션 트레이트 (async)
#[async_trait]
pub trait Collection<M>: Send + Sync
where
    M: Send + Sync + 'static,
{
    /// 컬렉션 이름
    fn name(&self) -> &str;

    /// 전체 조회 (저장 순서 유지)
    async fn get(&self) -> Result<SearchResult<M>>;

    /// 유사도 검색
    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<SearchResult<M>>;

    /// 컬렉션 전체 교체
    async fn replace_all(&self, entries: Vec<CollectionEntry<M>>) -> Result<usize>;

    /// 엔트리 개수
    async fn count(&self) -> Result<usize>;
}

// ============================================================================
// MemoryCollection
// ============================================================================

/// 메모리 컬렉션 (전수 코사인 유사도)
///
/// 작은 코퍼스나 테스트에 씁니다. 동점은 저장 순서를 따릅니다.
pub struct MemoryCollection<M> {
    name: String,
    entries: RwLock<Vec<CollectionEntry<M>>>,
}

impl<M> MemoryCollection<M> {
    /// 빈 컬렉션 생성
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(Vec::new()),
        }
    }

    /// 엔트리로 생성
    pub fn with_entries(name: impl Into<String>, entries: Vec<CollectionEntry<M>>) -> Self {
        Self {
            name: name.into(),
            entries: RwLock::new(entries),
        }
    }
}

#[async_trait]
impl<M> Collection<M> for MemoryCollection<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<SearchResult<M>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut result = SearchResult::new();
        for entry in entries.iter() {
            result.push(entry.id.clone(), entry.document.clone(), entry.metadata.clone());
        }
        Ok(result)
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<SearchResult<M>> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let mut scored: Vec<(f32, &CollectionEntry<M>)> = entries
            .iter()
            .map(|e| (cosine_similarity(embedding, &e.embedding), e))
            .collect();

        // 안정 정렬: 동점이면 저장 순서
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(n_results);

        let mut result = SearchResult::new();
        for (_, entry) in scored {
            result.push(entry.id.clone(), entry.document.clone(), entry.metadata.clone());
        }
        Ok(result)
    }

    async fn replace_all(&self, entries: Vec<CollectionEntry<M>>) -> Result<usize> {
        let mut stored = self
            .entries
            .write()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;

        let count = entries.len();
        *stored = entries;
        Ok(count)
    }

    async fn count(&self) -> Result<usize> {
        let entries = self
            .entries
            .read()
            .map_err(|e| anyhow::anyhow!("Lock error: {}", e))?;
        Ok(entries.len())
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 길이가 다르거나 영벡터면 0.0을 반환합니다.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

// ============================================================================
// Tests
// ============================================================================
