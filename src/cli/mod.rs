//! CLI 모듈
//!
//! admission-rag 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use futures::StreamExt;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::config::{get_api_key, has_api_key, Settings, RAW_COLLECTION, STRUCTURED_COLLECTION};
use crate::embedding::GeminiEmbedding;
use crate::ingest::{
    chunks_from_pages, chunks_from_text, extract_pdf_pages, ingest_raw, ingest_structured,
    parse_department_info, sha256_hex, IngestManifest,
};
use crate::knowledge::{AdmissionRecord, ChunkMetadata, Collection, LanceCollection, RawChunk};
use crate::rag::{AdmissionAssistant, SourceCitation};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "admission-rag")]
#[command(version, about = "대입 모집요강 하이브리드 RAG 질의응답", long_about = None)]
pub struct Cli {
    /// 데이터 디렉토리 (기본: ADMISSION_RAG_DATA_DIR 또는 로컬 데이터 디렉토리)
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// 출처 링크에 쓸 원본 PDF URL (기본: ADMISSION_RAG_DOCUMENT_URL)
    #[arg(long, global = true)]
    pub document_url: Option<String>,

    /// 임베딩 차원 (768, 1536, 3072)
    #[arg(long, global = true)]
    pub dimension: Option<usize>,

    /// 답변 생성 모델
    #[arg(long, global = true)]
    pub model: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 추출 결과를 컬렉션에 적재
    Ingest {
        #[command(subcommand)]
        target: IngestTarget,
    },

    /// 질문 하나에 답변
    Ask {
        /// 질문
        question: String,

        /// 답변을 생성되는 대로 출력
        #[arg(short, long)]
        stream: bool,
    },

    /// 대화형 질의응답 ('exit' 또는 '종료'로 끝내기)
    Chat {
        /// 스트리밍 없이 완성된 답변만 출력
        #[arg(long)]
        no_stream: bool,
    },

    /// 상태 확인
    Status,
}

#[derive(Subcommand)]
pub enum IngestTarget {
    /// 학과별 정형 데이터 (최종 추출 JSON)
    Structured {
        /// `{"department_info": [...]}` 또는 배열 JSON 파일
        #[arg(long)]
        json: PathBuf,

        /// 입력이 바뀌지 않았어도 다시 적재
        #[arg(long)]
        force: bool,
    },

    /// 페이지별 원본 텍스트
    Raw {
        /// `--- Page N ---`로 구분된 OCR 텍스트 파일
        #[arg(long, conflicts_with = "pdf", required_unless_present = "pdf")]
        text: Option<PathBuf>,

        /// 텍스트 레이어가 있는 PDF 파일
        #[arg(long)]
        pdf: Option<PathBuf>,

        /// 이보다 긴 페이지는 문단 경계에서 분할
        #[arg(long)]
        max_chars: Option<usize>,

        /// 입력이 바뀌지 않았어도 다시 적재
        #[arg(long)]
        force: bool,
    },
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::from_env();
    if let Some(data_dir) = cli.data_dir {
        settings.data_dir = data_dir;
    }
    if let Some(url) = cli.document_url {
        settings.document_url = Some(url);
    }
    if let Some(dimension) = cli.dimension {
        settings.embedding_dimension = dimension;
    }
    if let Some(model) = cli.model {
        settings.answer_model = model;
    }

    match cli.command {
        Commands::Ingest { target } => match target {
            IngestTarget::Structured { json, force } => {
                cmd_ingest_structured(&settings, &json, force).await
            }
            IngestTarget::Raw {
                text,
                pdf,
                max_chars,
                force,
            } => cmd_ingest_raw(&settings, text, pdf, max_chars, force).await,
        },
        Commands::Ask { question, stream } => cmd_ask(&settings, &question, stream).await,
        Commands::Chat { no_stream } => cmd_chat(&settings, !no_stream).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 정형 데이터 적재 명령어 (ingest structured)
async fn cmd_ingest_structured(settings: &Settings, json: &Path, force: bool) -> Result<()> {
    require_api_key()?;

    let bytes = tokio::fs::read(json)
        .await
        .with_context(|| format!("입력 파일 읽기 실패: {}", json.display()))?;
    println!("[*] 입력: {} ({})", json.display(), format_bytes(bytes.len()));

    let collection: LanceCollection<AdmissionRecord> = LanceCollection::open(
        &settings.lance_path(),
        STRUCTURED_COLLECTION,
        settings.embedding_dimension,
    )
    .await
    .context("정형 컬렉션 열기 실패")?;

    let sha256 = sha256_hex(&bytes);
    let mut manifest = load_manifest(settings)?;
    if !force && manifest.is_unchanged(STRUCTURED_COLLECTION, &sha256) && collection.exists().await? {
        println!("[!] 이미 적재된 입력입니다. 다시 적재하려면 --force를 지정하세요.");
        return Ok(());
    }

    let text = String::from_utf8(bytes).context("JSON 파일이 UTF-8이 아닙니다")?;
    let records = parse_department_info(&text)?;
    println!("[*] 학과 레코드 {} 건 임베딩 중...", records.len());

    let embedder = GeminiEmbedding::new(get_api_key()?, settings.embedding_dimension)?;
    let count = ingest_structured(records, &embedder, &collection)
        .await
        .context("정형 데이터 적재 실패")?;

    manifest.record(STRUCTURED_COLLECTION, json, sha256, count);
    manifest.save(&settings.manifest_path())?;

    println!("[OK] '{}'에 {} 건 저장됨", STRUCTURED_COLLECTION, count);
    Ok(())
}

/// 원본 텍스트 적재 명령어 (ingest raw)
async fn cmd_ingest_raw(
    settings: &Settings,
    text: Option<PathBuf>,
    pdf: Option<PathBuf>,
    max_chars: Option<usize>,
    force: bool,
) -> Result<()> {
    require_api_key()?;

    let source = match (&text, &pdf) {
        (Some(path), None) | (None, Some(path)) => path.clone(),
        _ => bail!("--text 또는 --pdf 중 하나를 지정해야 합니다"),
    };

    let bytes = tokio::fs::read(&source)
        .await
        .with_context(|| format!("입력 파일 읽기 실패: {}", source.display()))?;
    println!("[*] 입력: {} ({})", source.display(), format_bytes(bytes.len()));

    let collection: LanceCollection<ChunkMetadata> = LanceCollection::open(
        &settings.lance_path(),
        RAW_COLLECTION,
        settings.embedding_dimension,
    )
    .await
    .context("원본 텍스트 컬렉션 열기 실패")?;

    let sha256 = sha256_hex(&bytes);
    let mut manifest = load_manifest(settings)?;
    if !force && manifest.is_unchanged(RAW_COLLECTION, &sha256) && collection.exists().await? {
        println!("[!] 이미 적재된 입력입니다. 다시 적재하려면 --force를 지정하세요.");
        return Ok(());
    }

    let chunks: Vec<RawChunk> = if pdf.is_some() {
        let pages = extract_pdf_pages(&source)?;
        if pages.is_empty() {
            bail!("PDF에서 텍스트를 추출하지 못했습니다. OCR 결과 텍스트를 --text로 지정하세요.");
        }
        chunks_from_pages(pages, max_chars)
    } else {
        let text = String::from_utf8(bytes).context("텍스트 파일이 UTF-8이 아닙니다")?;
        chunks_from_text(&text, max_chars)
    };
    println!("[*] 청크 {} 개 임베딩 중...", chunks.len());

    let embedder = GeminiEmbedding::new(get_api_key()?, settings.embedding_dimension)?;
    let count = ingest_raw(chunks, &embedder, &collection)
        .await
        .context("원본 텍스트 적재 실패")?;

    manifest.record(RAW_COLLECTION, &source, sha256, count);
    manifest.save(&settings.manifest_path())?;

    println!("[OK] '{}'에 {} 건 저장됨", RAW_COLLECTION, count);
    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(settings: &Settings, question: &str, stream: bool) -> Result<()> {
    require_api_key()?;

    let assistant = AdmissionAssistant::from_settings(settings)
        .await
        .context("질의응답기 초기화 실패")?;

    answer_question(&assistant, settings, question, stream).await
}

/// 대화 명령어 (chat)
///
/// 질문마다 실패해도 오류만 출력하고 다음 질문을 받습니다.
async fn cmd_chat(settings: &Settings, stream: bool) -> Result<()> {
    require_api_key()?;

    let assistant = AdmissionAssistant::from_settings(settings)
        .await
        .context("질의응답기 초기화 실패")?;

    println!("모집요강에 대해 질문하세요. ('exit' 또는 '종료'로 끝내기)");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n질문> ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if is_exit_command(question) {
            break;
        }

        if let Err(e) = answer_question(&assistant, settings, question, stream).await {
            println!("\n[!] 오류: {:#}", e);
        }
    }

    println!("종료합니다.");
    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("admission-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 데이터 디렉토리: {}", settings.data_dir.display());

    if has_api_key() {
        println!("[OK] API 키: 설정됨");
    } else {
        println!("[!] API 키: 미설정");
        println!("    설정: export GEMINI_API_KEY=your-key");
    }

    match &settings.document_url {
        Some(url) => println!("[*] 원본 문서: {}", url),
        None => println!("[*] 원본 문서: 미설정 (출처 링크 없음)"),
    }

    let lance_path = settings.lance_path();
    for name in [STRUCTURED_COLLECTION, RAW_COLLECTION] {
        let count = match LanceCollection::<ChunkMetadata>::open(
            &lance_path,
            name,
            settings.embedding_dimension,
        )
        .await
        {
            Ok(collection) => collection.count().await,
            Err(e) => Err(e),
        };

        match count {
            Ok(0) => println!("[!] {}: 비어있음 (ingest 필요)", name),
            Ok(n) => println!("[OK] {}: {} 건", name, n),
            Err(e) => println!("[!] {}: 조회 실패 ({})", name, e),
        }
    }

    match IngestManifest::load(&settings.manifest_path()) {
        Ok(manifest) => {
            for (name, entry) in &manifest.collections {
                println!(
                    "     {} <- {} ({} 건, {}, sha256 {})",
                    name,
                    entry.source,
                    entry.records,
                    entry.ingested_at.format("%Y-%m-%d %H:%M"),
                    entry.sha256.get(..12).unwrap_or(&entry.sha256)
                );
            }
        }
        Err(e) => println!("[!] 매니페스트 읽기 실패: {}", e),
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 질문 하나 처리 후 답변과 출처 출력
async fn answer_question(
    assistant: &AdmissionAssistant,
    settings: &Settings,
    question: &str,
    stream: bool,
) -> Result<()> {
    if stream {
        let streaming = assistant.ask_stream(question).await?;
        tracing::debug!("Retrieval mode: {}", streaming.mode);

        println!();
        let mut fragments = streaming.fragments;
        while let Some(fragment) = fragments.next().await {
            print!("{}", fragment?);
            std::io::stdout().flush()?;
        }
        println!();

        print_citations(&streaming.citations, settings.document_url.as_deref());
    } else {
        let answer = assistant.ask(question).await?;
        tracing::debug!("Retrieval mode: {}", answer.mode);

        println!("\n{}", answer.text);
        print_citations(&answer.citations, settings.document_url.as_deref());
    }

    Ok(())
}

/// 출처 출력 (문서 URL이 있으면 페이지 링크 포함)
fn print_citations(citations: &[SourceCitation], document_url: Option<&str>) {
    if citations.is_empty() {
        return;
    }

    println!("\n[출처]");
    for line in citation_lines(citations, document_url) {
        println!("  {}", line);
    }
}

fn citation_lines(citations: &[SourceCitation], document_url: Option<&str>) -> Vec<String> {
    citations
        .iter()
        .map(|citation| match document_url.map(|url| citation.link(url)) {
            Some(Ok(link)) => format!("- {} <{}>", citation.text, link),
            Some(Err(e)) => {
                tracing::debug!("Citation link skipped: {}", e);
                format!("- {}", citation.text)
            }
            None => format!("- {}", citation.text),
        })
        .collect()
}

fn is_exit_command(input: &str) -> bool {
    matches!(input.to_lowercase().as_str(), "exit" | "quit" | "종료")
}

fn require_api_key() -> Result<()> {
    if !has_api_key() {
        bail!(
            "API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export GEMINI_API_KEY=your-api-key\n  \
             또는\n  \
             export GOOGLE_API_KEY=your-api-key\n\n\
             API 키 발급: https://aistudio.google.com/app/apikey"
        );
    }
    Ok(())
}

fn load_manifest(settings: &Settings) -> Result<IngestManifest> {
    settings.ensure_data_dir()?;
    IngestManifest::load(&settings.manifest_path())
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn citation(text: &str, page: u32) -> SourceCitation {
        SourceCitation {
            text: text.to_string(),
            page,
        }
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1048576), "1.00 MB");
    }

    #[test]
    fn test_exit_commands() {
        assert!(is_exit_command("exit"));
        assert!(is_exit_command("EXIT"));
        assert!(is_exit_command("종료"));
        assert!(!is_exit_command("종료일은?"));
    }

    #[test]
    fn test_citation_lines_with_links() {
        let citations = vec![citation("출처 (정형 데이터): 경영학부 (p.9)", 9)];
        let lines = citation_lines(&citations, Some("https://example.ac.kr/guide.pdf"));
        assert_eq!(
            lines,
            vec!["- 출처 (정형 데이터): 경영학부 (p.9) <https://example.ac.kr/guide.pdf#page=9>"]
        );
    }

    #[test]
    fn test_citation_lines_without_url() {
        let citations = vec![citation("출처 (원본 텍스트): page_5 (p.5)", 5)];
        assert_eq!(
            citation_lines(&citations, None),
            vec!["- 출처 (원본 텍스트): page_5 (p.5)"]
        );
        assert_eq!(
            citation_lines(&citations, Some("not a url")),
            vec!["- 출처 (원본 텍스트): page_5 (p.5)"]
        );
    }

    #[test]
    fn test_cli_parses_ingest_raw() {
        let cli = Cli::try_parse_from([
            "admission-rag",
            "ingest",
            "raw",
            "--text",
            "pages.txt",
            "--max-chars",
            "1500",
        ])
        .unwrap();

        match cli.command {
            Commands::Ingest {
                target: IngestTarget::Raw { text, max_chars, .. },
            } => {
                assert_eq!(text, Some(PathBuf::from("pages.txt")));
                assert_eq!(max_chars, Some(1500));
            }
            _ => panic!("unexpected command"),
        }
    }

    #[test]
    fn test_cli_global_overrides() {
        let cli = Cli::try_parse_from([
            "admission-rag",
            "ask",
            "경영학부 모집인원",
            "--dimension",
            "1536",
            "--document-url",
            "https://example.ac.kr/guide.pdf",
        ])
        .unwrap();

        assert_eq!(cli.dimension, Some(1536));
        assert_eq!(cli.document_url.as_deref(), Some("https://example.ac.kr/guide.pdf"));
        assert!(matches!(cli.command, Commands::Ask { stream: false, .. }));
    }

    #[test]
    fn test_cli_raw_requires_one_source() {
        assert!(Cli::try_parse_from(["admission-rag", "ingest", "raw"]).is_err());
        assert!(Cli::try_parse_from([
            "admission-rag",
            "ingest",
            "raw",
            "--text",
            "a.txt",
            "--pdf",
            "a.pdf"
        ])
        .is_err());
    }
}
