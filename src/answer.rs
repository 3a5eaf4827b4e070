//! Grounded answer generation.
//!
//! The [`AnswerGenerator`] turns a question and its retrieval hits into a
//! prompt that restricts the model to the supplied articles, then either
//! returns the whole answer ([`GenerationMode::Batch`]) or writes it to an
//! output as it arrives ([`GenerationMode::Stream`]). Streaming can be
//! cancelled at any chunk boundary; output already written stays written.
//!
//! With no hits the model is never called and the answer is
//! [`NO_MATCHING_ARTICLES`].

use std::future::Future;
use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::StreamExt;

use crate::config::Config;
use crate::context::build_context;
use crate::embedding;
use crate::generation::{self, ChatMessage, ChatModel, TextStream};
use crate::models::RetrievalHit;
use crate::retriever::Retriever;
use crate::vector_index::SqliteVectorIndex;

/// Answer text when retrieval found nothing.
pub const NO_MATCHING_ARTICLES: &str = "No matching articles.";

/// Marker printed after a stream was cancelled by the user.
pub const CANCELLED_MARKER: &str = "[cancelled]";

const SYSTEM_PROMPT: &str = "Answer exclusively on the basis of the supplied documents. \
If the question cannot be answered from these documents, say so explicitly.";

const ANSWER_INSTRUCTION: &str = "Answer briefly (3-5 sentences) and name your sources \
(title and full URL) for every document you used.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GenerationMode {
    #[default]
    Batch,
    Stream,
}

/// What a streamed generation produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSummary {
    pub chunks: usize,
    pub cancelled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// Retrieval returned nothing; see [`NO_MATCHING_ARTICLES`].
    NoEvidence,
    Text(String),
    Streamed(StreamSummary),
}

pub struct AnswerGenerator {
    chat: Arc<dyn ChatModel>,
}

impl AnswerGenerator {
    pub fn new(chat: Arc<dyn ChatModel>) -> Self {
        Self { chat }
    }

    pub fn build_messages(&self, query: &str, hits: &[RetrievalHit]) -> Vec<ChatMessage> {
        let user = format!(
            "Documents:\n{}\n\nQuestion: {}\n\n{}",
            build_context(hits),
            query,
            ANSWER_INSTRUCTION
        );
        vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
    }

    /// Start a streaming answer. `None` when there is no evidence.
    pub async fn answer_stream(
        &self,
        query: &str,
        hits: &[RetrievalHit],
    ) -> Result<Option<TextStream>> {
        if hits.is_empty() {
            return Ok(None);
        }
        let messages = self.build_messages(query, hits);
        let stream = self
            .chat
            .stream(&messages)
            .await
            .with_context(|| format!("Generation with {} failed", self.chat.model_name()))?;
        Ok(Some(stream))
    }

    /// Generate an answer.
    ///
    /// In stream mode every chunk is written to `out` and flushed as it
    /// arrives. `cancel` is raced against opening the stream and against
    /// each wait for the next chunk; once it resolves the stream is dropped
    /// and the summary reports `cancelled`.
    pub async fn generate<W, C>(
        &self,
        query: &str,
        hits: &[RetrievalHit],
        mode: GenerationMode,
        out: &mut W,
        cancel: C,
    ) -> Result<Answer>
    where
        W: Write + ?Sized,
        C: Future<Output = ()>,
    {
        if hits.is_empty() {
            return Ok(Answer::NoEvidence);
        }

        match mode {
            GenerationMode::Batch => {
                let messages = self.build_messages(query, hits);
                let text = self
                    .chat
                    .complete(&messages)
                    .await
                    .with_context(|| format!("Generation with {} failed", self.chat.model_name()))?;
                Ok(Answer::Text(text))
            }
            GenerationMode::Stream => {
                tokio::pin!(cancel);
                let mut summary = StreamSummary {
                    chunks: 0,
                    cancelled: false,
                };

                let started = tokio::select! {
                    biased;
                    _ = &mut cancel => None,
                    started = self.answer_stream(query, hits) => Some(started?),
                };
                let mut stream = match started {
                    None => {
                        summary.cancelled = true;
                        tracing::debug!("stream cancelled before the first chunk");
                        return Ok(Answer::Streamed(summary));
                    }
                    Some(None) => return Ok(Answer::NoEvidence),
                    Some(Some(stream)) => stream,
                };

                loop {
                    tokio::select! {
                        biased;
                        _ = &mut cancel => {
                            summary.cancelled = true;
                            break;
                        }
                        next = stream.next() => match next {
                            Some(Ok(chunk)) => {
                                out.write_all(chunk.as_bytes())?;
                                out.flush()?;
                                summary.chunks += 1;
                            }
                            Some(Err(e)) => return Err(e.context("Generation stream failed")),
                            None => break,
                        },
                    }
                }
                drop(stream);
                tracing::debug!(chunks = summary.chunks, cancelled = summary.cancelled, "stream finished");
                Ok(Answer::Streamed(summary))
            }
        }
    }
}

/// Resolves on Ctrl-C. Never resolves when the signal handler is unavailable.
pub async fn ctrl_c() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::debug!(error = %e, "cannot listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

/// Run the `ask` command: retrieve, then answer on stdout.
pub async fn run_ask(config: &Config, query: &str, k: usize, mode: GenerationMode) -> Result<Answer> {
    let embedder = embedding::create_embedder(&config.embedding)?;
    let index = Arc::new(
        SqliteVectorIndex::open(&config.index.path, &config.index.collection, config.index.metric)
            .await?,
    );
    let hits = Retriever::new(embedder, index.clone()).retrieve(query, k).await;
    index.close().await;
    let hits = hits?;

    if hits.is_empty() {
        println!("{}", NO_MATCHING_ARTICLES);
        return Ok(Answer::NoEvidence);
    }

    let generator = AnswerGenerator::new(generation::create_chat_model(&config.generation)?);
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let answer = generator.generate(query, &hits, mode, &mut out, ctrl_c()).await?;

    match &answer {
        Answer::NoEvidence => writeln!(out, "{}", NO_MATCHING_ARTICLES)?,
        Answer::Text(text) => writeln!(out, "{}", text)?,
        Answer::Streamed(summary) if summary.cancelled => writeln!(out, "\n{}", CANCELLED_MARKER)?,
        Answer::Streamed(_) => writeln!(out)?,
    }
    out.flush()?;
    Ok(answer)
}
