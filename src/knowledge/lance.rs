//! LanceDB Collection - 디스크 기반 벡터 컬렉션
//!
//! 테이블 하나가 컬렉션 하나입니다. 메타데이터는 JSON 문자열 컬럼으로 저장해
//! 정형 레코드와 원본 텍스트 메타데이터를 같은 스키마로 다룹니다.
//! ref: https://lancedb.github.io/lancedb/

use std::marker::PhantomData;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, RecordBatch, RecordBatchIterator, StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::{Connection, CreateTableMode};
use lancedb::query::{ExecutableQuery, QueryBase};
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::collection::{Collection, CollectionEntry};
use super::record::SearchResult;

// ============================================================================
// LanceCollection
// ============================================================================

/// LanceDB 컬렉션 구현
pub struct LanceCollection<M> {
    db: Connection,
    name: String,
    dimension: i32,
    _metadata: PhantomData<fn() -> M>,
}

impl<M> LanceCollection<M> {
    /// LanceDB 컬렉션 열기
    ///
    /// # Arguments
    /// * `path` - .lance 디렉토리 경로
    /// * `name` - 테이블 이름
    /// * `dimension` - 임베딩 차원
    pub async fn open(path: &Path, name: &str, dimension: usize) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        Ok(Self {
            db,
            name: name.to_string(),
            dimension,
            _metadata: PhantomData,
        })
    }

    /// 테이블 스키마
    fn create_schema(&self) -> Schema {
        Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new("document", DataType::Utf8, false),
            Field::new("metadata", DataType::Utf8, false),
            Field::new(
                "embedding",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, true)),
                    self.dimension,
                ),
                false,
            ),
        ])
    }

    /// 테이블 존재 여부 확인
    pub async fn exists(&self) -> Result<bool> {
        let names = self
            .db
            .table_names()
            .execute()
            .await
            .context("Failed to list LanceDB tables")?;
        Ok(names.contains(&self.name))
    }

    /// 테이블 열기 (없으면 에러)
    async fn open_table(&self) -> Result<lancedb::table::Table> {
        if !self.exists().await? {
            anyhow::bail!(
                "Collection '{}' not found. Run `admission-rag ingest` first.",
                self.name
            );
        }

        self.db
            .open_table(&self.name)
            .execute()
            .await
            .with_context(|| format!("Failed to open collection '{}'", self.name))
    }
}

impl<M: Serialize> LanceCollection<M> {
    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(&self, entries: &[CollectionEntry<M>]) -> Result<RecordBatch> {
        if entries.is_empty() {
            anyhow::bail!("Cannot create batch from empty entries");
        }

        let expected = self.dimension as usize;
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != expected) {
            anyhow::bail!(
                "Embedding for '{}' has dimension {}, expected {}",
                bad.id,
                bad.embedding.len(),
                expected
            );
        }

        let ids: Vec<&str> = entries.iter().map(|e| e.id.as_str()).collect();
        let documents: Vec<&str> = entries.iter().map(|e| e.document.as_str()).collect();
        let metadatas: Vec<String> = entries
            .iter()
            .map(|e| serde_json::to_string(&e.metadata))
            .collect::<std::result::Result<_, _>>()
            .context("Failed to serialize metadata")?;

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            self.dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(self.create_schema()),
            vec![
                Arc::new(StringArray::from(ids)),
                Arc::new(StringArray::from(documents)),
                Arc::new(StringArray::from(metadatas)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }
}

/// RecordBatch들을 SearchResult로 변환
fn batches_to_result<M: DeserializeOwned>(batches: Vec<RecordBatch>) -> Result<SearchResult<M>> {
    let mut result = SearchResult::new();

    for batch in batches {
        let ids = string_column(&batch, "id")?;
        let documents = string_column(&batch, "document")?;
        let metadatas = string_column(&batch, "metadata")?;

        for i in 0..batch.num_rows() {
            let metadata: M = serde_json::from_str(metadatas.value(i)).with_context(|| {
                format!("Failed to parse metadata for '{}'", ids.value(i))
            })?;
            result.push(ids.value(i), documents.value(i), metadata);
        }
    }

    Ok(result)
}

fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow::anyhow!("Missing {} column", name))
}

#[async_trait]
impl<M> Collection<M> for LanceCollection<M>
where
    M: Serialize + DeserializeOwned + Send + Sync + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn get(&self) -> Result<SearchResult<M>> {
        let table = self.open_table().await?;
        let total = table.count_rows(None).await.context("Failed to count rows")?;

        // 전체 스캔 (기본 limit에 잘리지 않도록 행 수를 명시)
        let stream = table
            .query()
            .limit(total.max(1))
            .execute()
            .await
            .context("Failed to scan collection")?;

        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        batches_to_result(batches)
    }

    async fn query(&self, embedding: &[f32], n_results: usize) -> Result<SearchResult<M>> {
        let table = self.open_table().await?;

        let stream = table
            .vector_search(embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(n_results)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        // 결과는 _distance 오름차순
        let batches: Vec<RecordBatch> = stream.try_collect().await?;
        batches_to_result(batches)
    }

    async fn replace_all(&self, entries: Vec<CollectionEntry<M>>) -> Result<usize> {
        let batch = self.entries_to_batch(&entries)?;
        let schema = batch.schema();
        let replacing = self.exists().await?;

        // 덮어쓰기는 커밋 한 번이라 실패해도 이전 테이블이 남음
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);
        self.db
            .create_table(&self.name, batches)
            .mode(CreateTableMode::Overwrite)
            .execute()
            .await
            .with_context(|| format!("Failed to write collection '{}'", self.name))?;

        if replacing {
            tracing::info!("Replaced existing collection '{}'", self.name);
        }

        Ok(entries.len())
    }

    async fn count(&self) -> Result<usize> {
        if !self.exists().await? {
            return Ok(0);
        }

        let table = self.open_table().await?;
        let count = table.count_rows(None).await.context("Failed to count rows")?;
        Ok(count)
    }
}

// ============================================================================
// Tests
// ============================================================================
