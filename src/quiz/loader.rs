use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use log::{info, warn};
use reqwest::{header::CONTENT_TYPE, StatusCode, Url};
use thiserror::Error;

use crate::quiz::{Question, PLACEHOLDER};

/// Where the question bank comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    Url(Url),
}

impl Source {
    /// `http(s)://` addresses are fetched over the network, anything else is a path.
    pub fn parse(raw: &str) -> Self {
        match Url::parse(raw) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Source::Url(url),
            _ => Source::File(PathBuf::from(raw)),
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Url(url) => write!(f, "{}", url),
        }
    }
}

/// What to do with a block that does not describe a valid question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BlockPolicy {
    /// Log the block and leave it out of the deck.
    #[default]
    Skip,
    /// Fail the whole load.
    Reject,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server answered with status {0}")]
    Status(StatusCode),
    #[error("expected a text resource, got `{0}`")]
    NotText(String),
    #[error("loading timed out after {0:?}")]
    Timeout(Duration),
    #[error("malformed question bank: {0}")]
    Malformed(#[from] BlockError),
    #[error("question bank contains no usable questions")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("block {block} (line {line}): {kind}")]
pub struct BlockError {
    /// 1-based position of the block in the file.
    pub block: usize,
    /// 1-based line the block starts on.
    pub line: usize,
    pub kind: BlockErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BlockErrorKind {
    #[error("expected 5 lines, found {0}")]
    LineCount(usize),
    #[error("the {0} must contain the `___` placeholder exactly once")]
    Placeholder(&'static str),
    #[error("the option list has an empty entry")]
    EmptyOption,
    #[error("expected at least 2 options, found {0}")]
    TooFewOptions(usize),
    #[error("option `{0}` is listed more than once")]
    DuplicateOption(String),
    #[error("the options do not include the answer `{0}`")]
    MissingAnswer(String),
}

struct Block<'a> {
    number: usize,
    line: usize,
    lines: Vec<&'a str>,
}

impl Block<'_> {
    fn error(&self, kind: BlockErrorKind) -> BlockError {
        BlockError {
            block: self.number,
            line: self.line,
            kind,
        }
    }
}

/// Groups the non-blank lines of `text` into blocks. Any run of blank lines
/// ends a block, so stray separators never produce empty blocks.
fn split_blocks(text: &str) -> Vec<Block<'_>> {
    let text = text.trim_start_matches('\u{feff}');
    let mut blocks = Vec::new();
    let mut current: Option<Block> = None;

    for (idx, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            blocks.extend(current.take());
            continue;
        }
        current
            .get_or_insert_with(|| Block {
                number: blocks.len() + 1,
                line: idx + 1,
                lines: Vec::new(),
            })
            .lines
            .push(line);
    }
    blocks.extend(current);
    blocks
}

fn parse_block(block: &Block) -> Result<Question, BlockError> {
    let &[sentence, translation, missing_word, missing_word_translation, options] =
        block.lines.as_slice()
    else {
        return Err(block.error(BlockErrorKind::LineCount(block.lines.len())));
    };

    for (field, text) in [("sentence", sentence), ("translation", translation)] {
        if text.matches(PLACEHOLDER).count() != 1 {
            return Err(block.error(BlockErrorKind::Placeholder(field)));
        }
    }

    let options: Vec<String> = options
        .split(',')
        .map(|option| option.trim().to_string())
        .collect();
    if options.iter().any(|option| option.is_empty()) {
        return Err(block.error(BlockErrorKind::EmptyOption));
    }
    if options.len() < 2 {
        return Err(block.error(BlockErrorKind::TooFewOptions(options.len())));
    }
    let mut seen = HashSet::new();
    if let Some(duplicate) = options.iter().find(|option| !seen.insert(option.as_str())) {
        return Err(block.error(BlockErrorKind::DuplicateOption(duplicate.clone())));
    }
    if !options.iter().any(|option| option == missing_word) {
        return Err(block.error(BlockErrorKind::MissingAnswer(
            missing_word.to_string(),
        )));
    }

    Ok(Question::new(
        sentence.to_string(),
        translation.to_string(),
        missing_word.to_string(),
        missing_word_translation.to_string(),
        options,
    ))
}

/// Parses a whole question bank.
///
/// Each block holds five lines: the sentence with a `___` blank, its
/// translation with the same blank, the missing word, the translation of
/// the missing word and a comma separated list of options.
pub fn parse_deck(text: &str, policy: BlockPolicy) -> Result<Vec<Question>, LoadError> {
    let mut questions = Vec::new();
    for block in split_blocks(text) {
        match parse_block(&block) {
            Ok(question) => questions.push(question),
            Err(err) if policy == BlockPolicy::Skip => warn!("Skipping {}", err),
            Err(err) => return Err(err.into()),
        }
    }

    if questions.is_empty() {
        return Err(LoadError::Empty);
    }
    Ok(questions)
}

/// Reads the raw question bank without interpreting it.
pub async fn fetch(source: &Source) -> Result<String, LoadError> {
    match source {
        Source::File(path) => tokio::fs::read_to_string(path)
            .await
            .map_err(|source| LoadError::Io {
                path: path.clone(),
                source,
            }),
        Source::Url(url) => {
            let response = reqwest::get(url.clone()).await?;
            let status = response.status();
            if !status.is_success() {
                return Err(LoadError::Status(status));
            }
            if let Some(content_type) = response.headers().get(CONTENT_TYPE) {
                let content_type = content_type.to_str().unwrap_or_default();
                if !content_type.to_ascii_lowercase().starts_with("text/") {
                    return Err(LoadError::NotText(content_type.to_string()));
                }
            }
            Ok(response.text().await?)
        }
    }
}

pub async fn load(
    source: &Source,
    policy: BlockPolicy,
    timeout: Duration,
) -> Result<Vec<Question>, LoadError> {
    info!("Loading questions from {}", source);
    let text = tokio::time::timeout(timeout, fetch(source))
        .await
        .map_err(|_| LoadError::Timeout(timeout))??;

    let questions = parse_deck(&text, policy)?;
    info!("Loaded {} questions from {}", questions.len(), source);
    Ok(questions)
}

#[cfg(test)]
mod tests {
    use super::*;

    const APPLE: &str = "Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat\nesse, trinke, gehe, lese";
    const WATER: &str = "Du ___ Wasser.\nYou ___ water.\ntrinkst\ndrink\nisst,trinkst";

    fn block_error(text: &str) -> BlockError {
        match parse_deck(text, BlockPolicy::Reject) {
            Err(LoadError::Malformed(err)) => err,
            other => panic!("expected a malformed block, got {:?}", other),
        }
    }

    #[test]
    fn parses_a_single_block() {
        let questions = parse_deck(APPLE, BlockPolicy::Reject).unwrap();
        assert_eq!(
            questions,
            vec![Question::new(
                "Ich ___ einen Apfel.".to_string(),
                "I ___ an apple.".to_string(),
                "esse".to_string(),
                "eat".to_string(),
                vec![
                    "esse".to_string(),
                    "trinke".to_string(),
                    "gehe".to_string(),
                    "lese".to_string(),
                ],
            )]
        );
    }

    #[test]
    fn parses_one_question_per_block() {
        let text = format!("{}\n\n{}\n", APPLE, WATER);
        let questions = parse_deck(&text, BlockPolicy::Reject).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[1].missing_word, "trinkst");
        assert_eq!(questions[1].options, vec!["isst", "trinkst"]);
        for question in &questions {
            let hits = question
                .options
                .iter()
                .filter(|o| **o == question.missing_word)
                .count();
            assert_eq!(hits, 1);
        }
    }

    #[test]
    fn tolerates_crlf_and_extra_blank_lines() {
        let text = format!("\n\n{}\n\n  \n\n{}\n\n", APPLE, WATER).replace('\n', "\r\n");
        let questions = parse_deck(&text, BlockPolicy::Reject).unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].options[3], "lese");
    }

    #[test]
    fn rejects_short_blocks() {
        let err = block_error("Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat");
        assert_eq!(err.kind, BlockErrorKind::LineCount(4));
        assert_eq!((err.block, err.line), (1, 1));
    }

    #[test]
    fn rejects_blocks_with_extra_lines() {
        let err = block_error(&format!("{}\nextra", APPLE));
        assert_eq!(err.kind, BlockErrorKind::LineCount(6));
    }

    #[test]
    fn reports_the_position_of_the_broken_block() {
        let err = block_error(&format!("{}\n\n\nDu trinkst Wasser.\nYou ___ water.\ntrinkst\ndrink\nisst, trinkst", APPLE));
        assert_eq!(err.kind, BlockErrorKind::Placeholder("sentence"));
        assert_eq!((err.block, err.line), (2, 8));
    }

    #[test]
    fn rejects_translation_without_placeholder() {
        let err = block_error("Ich ___ einen Apfel.\nI eat an apple.\nesse\neat\nesse, trinke");
        assert_eq!(err.kind, BlockErrorKind::Placeholder("translation"));
    }

    #[test]
    fn rejects_options_without_the_answer() {
        let err = block_error("Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat\ntrinke, gehe");
        assert_eq!(err.kind, BlockErrorKind::MissingAnswer("esse".to_string()));
    }

    #[test]
    fn rejects_bad_option_lists() {
        let err = block_error("Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat\nesse, , gehe");
        assert_eq!(err.kind, BlockErrorKind::EmptyOption);

        let err = block_error("Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat\nesse");
        assert_eq!(err.kind, BlockErrorKind::TooFewOptions(1));

        let err = block_error("Ich ___ einen Apfel.\nI ___ an apple.\nesse\neat\nesse, gehe, esse");
        assert_eq!(err.kind, BlockErrorKind::DuplicateOption("esse".to_string()));
    }

    #[test]
    fn skip_policy_drops_only_malformed_blocks() {
        let text = format!("{}\n\nbroken\nblock\n\n{}", APPLE, WATER);
        let questions = parse_deck(&text, BlockPolicy::Skip).unwrap();
        assert_eq!(questions.len(), 2);
        assert!(matches!(
            parse_deck(&text, BlockPolicy::Reject),
            Err(LoadError::Malformed(_))
        ));
    }

    #[test]
    fn deck_without_questions_is_an_error() {
        assert!(matches!(parse_deck("", BlockPolicy::Skip), Err(LoadError::Empty)));
        assert!(matches!(
            parse_deck("only\nnonsense", BlockPolicy::Skip),
            Err(LoadError::Empty)
        ));
    }

    #[test]
    fn source_detects_urls() {
        assert!(matches!(
            Source::parse("https://example.com/questions.txt"),
            Source::Url(_)
        ));
        assert_eq!(
            Source::parse("questions.txt"),
            Source::File(PathBuf::from("questions.txt"))
        );
        assert_eq!(
            Source::parse("C:\\decks\\german.txt"),
            Source::File(PathBuf::from("C:\\decks\\german.txt"))
        );
    }

    #[tokio::test]
    async fn loads_from_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("questions.txt");
        std::fs::write(&path, format!("{}\n\n{}\n", APPLE, WATER)).unwrap();

        let questions = load(&Source::File(path), BlockPolicy::Reject, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(questions.len(), 2);
        assert_eq!(questions[0].sentence, "Ich ___ einen Apfel.");
    }

    #[tokio::test]
    async fn missing_file_is_a_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = Source::File(dir.path().join("missing.txt"));
        let err = load(&source, BlockPolicy::Skip, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Io { .. }));
    }

    /// Answers the first request on a local port with `response` and returns the URL.
    async fn serve_once(response: &'static [u8]) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/questions.txt", listener.local_addr().unwrap());
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(response).await;
        });
        url
    }

    #[tokio::test]
    async fn silent_server_times_out() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/questions.txt", listener.local_addr().unwrap());

        let err = load(&Source::parse(&url), BlockPolicy::Skip, Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Timeout(timeout) if timeout == Duration::from_millis(200)));
        assert_eq!(err.to_string(), "loading timed out after 200ms");
        drop(listener);
    }

    #[tokio::test]
    async fn error_status_is_a_load_error() {
        let url = serve_once(
            b"HTTP/1.1 404 Not Found\r\ncontent-length: 0\r\nconnection: close\r\n\r\n",
        )
        .await;

        let err = load(&Source::parse(&url), BlockPolicy::Skip, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::Status(StatusCode::NOT_FOUND)));
    }

    #[tokio::test]
    async fn loads_a_text_resource_over_http() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-type: text/plain; charset=utf-8\r\ncontent-length: 71\r\nconnection: close\r\n\r\nIch ___ einen Apfel.\nI ___ an apple.\nesse\neat\nesse, trinke, gehe, lese\n",
        )
        .await;

        let questions = load(&Source::parse(&url), BlockPolicy::Reject, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(questions.len(), 1);
        assert_eq!(questions[0].missing_word, "esse");
        assert_eq!(questions[0].options, vec!["esse", "trinke", "gehe", "lese"]);
    }

    #[tokio::test]
    async fn non_text_resource_is_rejected() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: 2\r\nconnection: close\r\n\r\n{}",
        )
        .await;

        let err = load(&Source::parse(&url), BlockPolicy::Skip, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(matches!(err, LoadError::NotText(content_type) if content_type == "application/json"));
    }
}
