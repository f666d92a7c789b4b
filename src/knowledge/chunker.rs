//! 원본 텍스트 분할
//!
//! OCR 결과 텍스트를 `--- Page N ---` 구분자로 페이지별로 나누고,
//! 긴 페이지는 문단 경계에서 다시 잘라 [`RawChunk`]로 만듭니다.

use std::sync::OnceLock;

use regex::Regex;

use super::record::RawChunk;

// ============================================================================
// Page Splitting
// ============================================================================

fn page_marker() -> &'static Regex {
    static MARKER: OnceLock<Regex> = OnceLock::new();
    MARKER.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*-{3}[ \t]*Page[ \t]*(\d+)[ \t]*-{3}[ \t]*$")
            .expect("page marker regex is valid")
    })
}

/// `--- Page N ---` 구분자로 페이지 분리
///
/// 페이지 번호는 구분자에서 읽습니다. 구분자가 없으면 폼피드(`\x0c`)로 나누고
/// 1부터 번호를 매깁니다. 빈 페이지와 첫 구분자 앞의 텍스트는 버립니다.
pub fn split_pages(text: &str) -> Vec<(u32, String)> {
    let marker = page_marker();
    let markers: Vec<_> = marker.captures_iter(text).collect();

    if markers.is_empty() {
        return text
            .split('\x0c')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .enumerate()
            .map(|(i, p)| (i as u32 + 1, p.to_string()))
            .collect();
    }

    let preamble = markers
        .first()
        .and_then(|caps| caps.get(0))
        .map(|m| text[..m.start()].trim())
        .unwrap_or_default();
    if !preamble.is_empty() {
        tracing::warn!(
            "Dropping {} bytes before the first page marker",
            preamble.len()
        );
    }

    let mut pages = Vec::with_capacity(markers.len());

    for (i, caps) in markers.iter().enumerate() {
        let (Some(whole), Some(number)) = (caps.get(0), caps.get(1)) else {
            continue;
        };

        let start = whole.end();
        let end = markers
            .get(i + 1)
            .and_then(|next| next.get(0))
            .map(|m| m.start())
            .unwrap_or(text.len());

        let body = text[start..end].trim();
        if body.is_empty() {
            continue;
        }

        match number.as_str().parse::<u32>() {
            Ok(page) => pages.push((page, body.to_string())),
            Err(e) => tracing::warn!("Skipping page with bad number {}: {}", number.as_str(), e),
        }
    }

    pages
}

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone)]
pub struct ChunkConfig {
    /// 최소 청크 크기 (문자 수)
    pub min_characters: usize,
    /// 최대 청크 크기 (문자 수)
    pub max_characters: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            min_characters: 200,
            max_characters: 1500,
        }
    }
}

// ============================================================================
// PageChunker
// ============================================================================

/// 페이지 청커
///
/// 최대 크기 이하 페이지는 그대로 `page_<n>` 하나로 두고,
/// 넘는 페이지만 문단 → 줄 → 문자 경계 순서로 잘라 `page_<n>_<k>`로 만듭니다.
pub struct PageChunker {
    config: ChunkConfig,
}

impl PageChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self { config }
    }

    /// 최대 크기만 지정
    pub fn with_max_characters(max_characters: usize) -> Self {
        Self::new(ChunkConfig {
            min_characters: (max_characters / 6).min(ChunkConfig::default().min_characters),
            max_characters,
        })
    }

    /// 페이지 목록을 청크로 변환
    pub fn chunk_pages(&self, pages: &[(u32, String)]) -> Vec<RawChunk> {
        let mut chunks = Vec::new();

        for (page, text) in pages {
            let parts = self.split_page(text);
            if parts.len() <= 1 {
                chunks.push(RawChunk::page(*page, text.trim()));
            } else {
                chunks.extend(
                    parts
                        .into_iter()
                        .enumerate()
                        .map(|(k, part)| RawChunk::part(*page, k + 1, part)),
                );
            }
        }

        chunks
    }

    /// 페이지 하나를 문단 경계에서 분할
    fn split_page(&self, text: &str) -> Vec<String> {
        let max = self.config.max_characters;
        if max == 0 || text.chars().count() <= max {
            return vec![text.trim().to_string()];
        }

        let mut chunks = Vec::new();
        let mut current = String::new();

        for para in text.split("\n\n") {
            let para = para.trim();
            if para.is_empty() {
                continue;
            }

            if !current.is_empty() && char_len(&current) + char_len(para) + 2 > max {
                chunks.push(std::mem::take(&mut current));
            }

            if char_len(para) > max {
                if !current.is_empty() {
                    chunks.push(std::mem::take(&mut current));
                }
                chunks.extend(split_lines(para, max));
                continue;
            }

            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(para);
        }

        if !current.is_empty() {
            chunks.push(current);
        }

        self.merge_small_chunks(chunks)
    }

    /// 작은 청크를 앞 청크에 병합
    fn merge_small_chunks(&self, chunks: Vec<String>) -> Vec<String> {
        if self.config.min_characters == 0 {
            return chunks;
        }

        let mut result: Vec<String> = Vec::new();

        for chunk in chunks {
            if let Some(last) = result.last_mut() {
                if char_len(last) < self.config.min_characters
                    && char_len(last) + char_len(&chunk) + 2 <= self.config.max_characters
                {
                    last.push_str("\n\n");
                    last.push_str(&chunk);
                    continue;
                }
            }
            result.push(chunk);
        }

        result
    }
}

/// 긴 문단을 줄 단위로, 한 줄이 너무 길면 문자 단위로 분할
fn split_lines(para: &str, max: usize) -> Vec<String> {
    let mut chunks = Vec::new();
    let mut current = String::new();

    for line in para.lines() {
        if char_len(line) > max {
            if !current.is_empty() {
                chunks.push(std::mem::take(&mut current));
            }
            let chars: Vec<char> = line.chars().collect();
            chunks.extend(chars.chunks(max).map(|c| c.iter().collect::<String>()));
            continue;
        }

        if !current.is_empty() && char_len(&current) + char_len(line) + 1 > max {
            chunks.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push('\n');
        }
        current.push_str(line);
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

// ============================================================================
// Tests
// ============================================================================
