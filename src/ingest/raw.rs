//! 원본 텍스트 적재
//!
//! OCR 결과 텍스트(`--- Page N ---` 구분) 또는 텍스트 레이어가 있는 PDF를
//! 페이지 청크로 나누고 임베딩해 원본 텍스트 컬렉션을 통째로 교체합니다.

use std::path::Path;

use anyhow::{Context, Result};

use crate::embedding::{EmbedMode, EmbeddingProvider};
use crate::knowledge::{
    split_pages, ChunkMetadata, Collection, CollectionEntry, PageChunker, RawChunk,
};

/// 원본 텍스트를 청크로 변환
///
/// # Arguments
/// * `text` - 페이지 구분자가 포함된 원본 텍스트
/// * `max_characters` - 지정하면 이보다 긴 페이지를 문단 경계에서 분할
pub fn chunks_from_text(text: &str, max_characters: Option<usize>) -> Vec<RawChunk> {
    chunks_from_pages(split_pages(text), max_characters)
}

/// 페이지 목록을 청크로 변환 (`max_characters`가 없으면 페이지당 하나)
pub fn chunks_from_pages(pages: Vec<(u32, String)>, max_characters: Option<usize>) -> Vec<RawChunk> {
    match max_characters {
        Some(max) => PageChunker::with_max_characters(max).chunk_pages(&pages),
        None => pages
            .into_iter()
            .map(|(page, body)| RawChunk::page(page, body))
            .collect(),
    }
}

/// PDF 텍스트 레이어에서 페이지별 텍스트 추출
///
/// 스캔본(텍스트 레이어 없음)은 빈 결과와 함께 경고를 남깁니다.
/// 이 경우 OCR 결과 텍스트 파일로 적재해야 합니다.
pub fn extract_pdf_pages(path: &Path) -> Result<Vec<(u32, String)>> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read PDF: {:?}", path))?;

    let text = pdf_extract::extract_text_from_mem(&bytes)
        .with_context(|| format!("Failed to extract text from PDF: {:?}", path))?;

    if text.trim().is_empty() {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
        return Ok(vec![]);
    }

    Ok(split_pages(&text))
}

/// 청크를 임베딩해 원본 텍스트 컬렉션 교체
///
/// # Returns
/// 저장된 청크 수
pub async fn ingest_raw(
    chunks: Vec<RawChunk>,
    embedder: &dyn EmbeddingProvider,
    collection: &dyn Collection<ChunkMetadata>,
) -> Result<usize> {
    if chunks.is_empty() {
        anyhow::bail!("No page text to ingest");
    }

    let documents: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();

    tracing::info!(
        "Embedding {} raw chunks into '{}'",
        documents.len(),
        collection.name()
    );

    let embeddings = embedder
        .embed_batch(&documents, EmbedMode::Document)
        .await
        .context("Failed to embed raw chunks")?;

    let entries: Vec<CollectionEntry<ChunkMetadata>> = chunks
        .into_iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| CollectionEntry {
            metadata: chunk.metadata(),
            id: chunk.id,
            document: chunk.text,
            embedding,
        })
        .collect();

    let count = collection
        .replace_all(entries)
        .await
        .context("Failed to store raw chunks")?;

    tracing::info!("Stored {} chunks in '{}'", count, collection.name());
    Ok(count)
}

// ============================================================================
// Tests
// ============================================================================
