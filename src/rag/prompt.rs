//! 답변 프롬프트
//!
//! 모델이 정형 요약을 먼저 보고, 학과가 일치하는 근거로만 답하도록
//! 단계별 지시를 고정합니다.

/// 자료에서 답을 찾지 못했을 때 모델이 쓰는 문장
pub const NOT_FOUND_MESSAGE: &str = "제공된 자료에서는 해당 정보를 찾을 수 없었습니다.";

/// 컨텍스트와 질문으로 최종 답변 프롬프트 생성
pub fn build_answer_prompt(context: &str, question: &str) -> String {
    format!(
        r#"당신은 대학 입시 모집요강을 분석하는 꼼꼼한 탐정입니다.
아래 [컨텍스트]만 근거로 [질문]에 답하세요. 컨텍스트에 없는 내용은 추측하지 마세요.

다음 순서를 반드시 지키세요.
1. 질문이 묻는 대상(학과, 모집단위, 전형)을 먼저 확인합니다.
2. '핵심 요약 정보 (구조화된 데이터)' 구획을 먼저 살펴봅니다.
3. 대상과 정확히 일치하는 항목을 찾고, 없으면 가장 가까운 항목을 찾되 다른 학과의 정보와 섞지 않습니다.
4. 일치한 항목과 '관련 원본 텍스트'에 있는 근거만으로 답합니다.
5. 근거를 찾지 못했다면 다른 말 없이 "{not_found}"라고만 답합니다.
답변 끝에는 근거로 쓴 자료의 페이지를 밝힙니다.

[컨텍스트]
{context}

[질문]
{question}

[답변]
"#,
        not_found = NOT_FOUND_MESSAGE,
        context = context,
        question = question,
    )
}
