//! 키워드 추출 - 질문에서 학과명 하나를 뽑거나 "없음"을 받습니다.
//!
//! 모델 응답은 검증하지 않고 정규화만 합니다. 존재하지 않는 학과명은
//! 이후 정확 매칭에서 0건으로 끝납니다.

use std::sync::Arc;

use anyhow::Result;

use crate::llm::{CompletionOptions, GenerativeModel};

/// 키워드 추출 프롬프트
fn keyword_prompt(question: &str, sentinel: &str) -> String {
    format!(
        "다음 질문에서 대학 '학과명' 또는 '전공명'을 정확히 하나만 추출해줘. \
         학과명이 언급되지 않았다면 '{}'이라고만 대답해줘. 질문: \"{}\"",
        sentinel, question
    )
}

/// 모델 응답 정규화
///
/// 앞뒤 공백, 끝의 마침표, 감싸는 따옴표를 더 이상 바뀌지 않을 때까지 제거합니다.
/// 내부 공백은 그대로 둡니다 (공백 무시 비교는 라우터가 합니다).
pub fn normalize_keyword(raw: &str) -> String {
    const QUOTES: [(char, char); 5] = [
        ('\'', '\''),
        ('"', '"'),
        ('`', '`'),
        ('‘', '’'),
        ('“', '”'),
    ];

    let mut current = raw;
    loop {
        let before = current;
        current = current.trim().trim_end_matches('.');

        for (open, close) in QUOTES {
            if let Some(inner) = current
                .strip_prefix(open)
                .and_then(|s| s.strip_suffix(close))
            {
                current = inner;
            }
        }

        if current == before {
            break;
        }
    }

    current.to_string()
}

/// 정규화된 응답 해석
///
/// 센티널이거나 비어있으면 `None`, 아니면 추출된 학과명입니다.
pub fn interpret_keyword(raw: &str, sentinel: &str) -> Option<String> {
    let keyword = normalize_keyword(raw);
    if keyword.is_empty() || keyword == sentinel {
        None
    } else {
        Some(keyword)
    }
}

/// 키워드 추출기
#[derive(Clone)]
pub struct KeywordExtractor {
    model: Arc<dyn GenerativeModel>,
    sentinel: String,
    options: CompletionOptions,
}

impl KeywordExtractor {
    /// 새 추출기 생성
    pub fn new(
        model: Arc<dyn GenerativeModel>,
        sentinel: impl Into<String>,
        options: CompletionOptions,
    ) -> Self {
        Self {
            model,
            sentinel: sentinel.into(),
            options,
        }
    }

    /// 질문에서 학과명 추출 (모델 호출 1회)
    pub async fn extract(&self, question: &str) -> Result<Option<String>> {
        let prompt = keyword_prompt(question, &self.sentinel);
        let raw = self.model.complete(&prompt, &self.options).await?;

        let keyword = interpret_keyword(&raw, &self.sentinel);
        tracing::debug!("Keyword extractor: {:?} -> {:?}", raw, keyword);

        Ok(keyword)
    }
}

// ============================================================================
// Tests
// ============================================================================
