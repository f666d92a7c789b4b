//! 테스트용 가짜 구현 (임베딩, 생성 모델, 호출 기록 컬렉션)

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::knowledge::{Collection, CollectionEntry, MemoryCollection, SearchResult};
use crate::llm::{CompletionOptions, GenerativeModel, TextStream};

// ============================================================================
// FixedEmbedding
// ============================================================================

/// 모든 텍스트에 같은 벡터를 돌려주는 임베딩
pub struct FixedEmbedding {
    dimension: usize,
    modes: Mutex<Vec<EmbedMode>>,
}

impl FixedEmbedding {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            modes: Mutex::new(Vec::new()),
        }
    }

    /// 호출마다 기록된 용도
    pub fn modes(&self) -> Vec<EmbedMode> {
        self.modes.lock().unwrap().clone()
    }
}

#[async_trait]
impl EmbeddingProvider for FixedEmbedding {
    async fn embed(&self, _text: &str, mode: EmbedMode) -> Result<Vec<f32>> {
        self.modes.lock().unwrap().push(mode);
        Ok(vec![1.0; self.dimension])
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        "fixed"
    }
}

/// 항상 실패하는 임베딩
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str, _mode: EmbedMode) -> Result<Vec<f32>> {
        anyhow::bail!("embedding service unavailable")
    }

    fn dimension(&self) -> usize {
        4
    }

    fn name(&self) -> &str {
        "failing"
    }
}

// ============================================================================
// ScriptedModel
// ============================================================================

/// 정해진 응답을 순서대로 돌려주는 생성 모델
///
/// 응답 하나는 조각 목록이고, 스트리밍이면 조각 단위로 내보냅니다.
/// 대본이 떨어지면 에러입니다.
pub struct ScriptedModel {
    responses: Mutex<VecDeque<Result<Vec<String>, String>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedModel {
    pub fn new(responses: Vec<&str>) -> Self {
        Self::with_fragments(responses.into_iter().map(|r| vec![r]).collect())
    }

    pub fn with_fragments(responses: Vec<Vec<&str>>) -> Self {
        let responses = responses
            .into_iter()
            .map(|parts| Ok(parts.into_iter().map(String::from).collect()))
            .collect();

        Self {
            responses: Mutex::new(responses),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            responses: Mutex::new(VecDeque::from(vec![Err(message.to_string())])),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// 받은 프롬프트 기록
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    fn next(&self, prompt: &str) -> Result<Vec<String>> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        match self.responses.lock().unwrap().pop_front() {
            Some(Ok(parts)) => Ok(parts),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => anyhow::bail!("script exhausted"),
        }
    }
}

#[async_trait]
impl GenerativeModel for ScriptedModel {
    async fn complete(&self, prompt: &str, _options: &CompletionOptions) -> Result<String> {
        Ok(self.next(prompt)?.concat())
    }

    async fn complete_stream(
        &self,
        prompt: &str,
        _options: &CompletionOptions,
    ) -> Result<TextStream> {
        let parts = self.next(prompt)?;
        Ok(Box::pin(futures::stream::iter(parts.into_iter().map(Ok))))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ============================================================================
// RecordingCollection
// ============================================================================

/// 호출을 기록하는 메모리 컬렉션
pub struct RecordingCollection<M> {
    inner: MemoryCollection<M>,
    get_calls: AtomicUsize,
    query_limits: Mutex<Vec<usize>>,
    fail: bool,
}

impl<M> RecordingCollection<M> {
    pub fn new(name: &str, entries: Vec<CollectionEntry<M>>) -> Self {
        Self {
            inner: MemoryCollection::with_entries(name, entries),
            get_calls: AtomicUsize::new(0),
            query_limits: Mutex::new(Vec::new()),
            fail: false,
        }
    }

    /// 모든 조회가 실패하는 컬렉션
    pub fn unavailable(name: &str) -> Self {
        Self {
            fail: true,
            ..Self::new(name, Vec::new())
        }
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    /// `query()`에 넘어온 결과 개수들
    pub fn query_limits(&self) -> Vec<usize> {
        self.query_limits.lock().unwrap().clone()
    }
}

#[async_trait]
impl<M> Collection<M> for RecordingCollection<M>
where
    M: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn get(&self) -> Result<SearchResult<M>> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            anyhow::bail!("store unavailable");
        }
        self.inner.get().await
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<SearchResult<M>> {
        self.query_limits.lock().unwrap().push(n_results);
        if self.fail {
            anyhow::bail!("store unavailable");
        }
        self.inner.query(embedding, n_results).await
    }

    async fn replace_all(&self, entries: Vec<CollectionEntry<M>>) -> Result<usize> {
        self.inner.replace_all(entries).await
    }

    async fn count(&self) -> Result<usize> {
        self.inner.count().await
    }
}
