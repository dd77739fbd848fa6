use std::io::BufRead;

use anyhow::Result;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::runtime::Handle;

use crate::rag::VectorIndex;
use crate::session::{Answer, ChatSession, RagPipeline};

/// Reads questions line by line until `exit`, `quit` or end of input.
/// A failed turn is reported and the loop keeps going.
pub async fn run_repl<R, W>(
    pipeline: &RagPipeline,
    index: &VectorIndex,
    session: &mut ChatSession,
    mut input: R,
    output: &mut W,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    session.start();
    let mut line = String::new();

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        line.clear();
        if input.read_line(&mut line).await? == 0 {
            break;
        }

        let question = line.trim();
        if question.is_empty() {
            continue;
        }
        if question.eq_ignore_ascii_case("exit") || question.eq_ignore_ascii_case("quit") {
            break;
        }

        match pipeline.ask(index, session, question).await {
            Ok(answer) => output.write_all(render_answer(&answer).as_bytes()).await?,
            Err(err) => {
                output
                    .write_all(format!("\nError: {}\n", err).as_bytes())
                    .await?
            }
        }
        output.flush().await?;
    }

    session.close();
    Ok(())
}

/// Terminal input for the REPL.
///
/// Lines are read on a detached thread and piped into the runtime, so a pending
/// read never keeps the process alive once the REPL has been abandoned (Ctrl-C).
pub fn stdin_reader() -> impl AsyncBufRead + Unpin {
    let (reader, writer) = tokio::io::duplex(LINE_BUFFER);
    let handle = Handle::current();

    std::thread::spawn(move || pump_lines(std::io::stdin().lock(), writer, handle));

    BufReader::new(reader)
}

const LINE_BUFFER: usize = 8 * 1024;

/// Copies lines from `input` into `writer` until EOF, a read error, or the
/// reading side goes away.
fn pump_lines<I: BufRead>(mut input: I, mut writer: tokio::io::DuplexStream, handle: Handle) {
    let mut line = String::new();
    loop {
        line.clear();
        match input.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {
                if handle.block_on(writer.write_all(line.as_bytes())).is_err() {
                    break;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "stopped reading terminal input");
                break;
            }
        }
    }
}

fn render_answer(answer: &Answer) -> String {
    let mut out = format!("\nAutoMentor:\n{}\n", answer.answer);
    if !answer.sources.is_empty() {
        out.push_str("\nSources:\n");
        for source in &answer.sources {
            let location = match (source.page, source.row) {
                (Some(page), _) => format!(" (page {})", page),
                (None, Some(row)) => format!(" (row {})", row + 1),
                (None, None) => String::new(),
            };
            out.push_str(&format!("  - {}{}\n", source.source, location));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::settings::ModelSettings;
    use crate::core::config::DistanceMetric;
    use crate::core::errors::RagError;
    use crate::llm::{ChatRequest, Generator, LlmProvider};
    use crate::rag::index::tests::entry;
    use crate::rag::{Embedder, PromptAssembler, Retriever};
    use crate::session::SessionState;
    use async_trait::async_trait;
    use std::sync::Arc;

    struct Echo;

    #[async_trait]
    impl LlmProvider for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn health_check(&self) -> Result<bool, RagError> {
            Ok(true)
        }

        async fn chat(&self, request: ChatRequest, _model_id: &str) -> Result<String, RagError> {
            let prompt = &request.messages[0].content;
            if prompt.contains("Current question: fail") {
                return Err(RagError::Generation("model offline".into()));
            }
            Ok("Check the manual.".to_string())
        }

        async fn embed(&self, inputs: &[String], _model_id: &str) -> Result<Vec<Vec<f32>>, RagError> {
            Ok(inputs.iter().map(|_| vec![1.0, 0.0]).collect())
        }
    }

    fn pipeline() -> RagPipeline {
        let provider: Arc<dyn LlmProvider> = Arc::new(Echo);
        RagPipeline::new(
            Retriever::new(Embedder::new(provider.clone(), "m", 4), 1),
            PromptAssembler::new(10_000),
            Generator::new(provider, ModelSettings::default()),
            false,
        )
    }

    fn index() -> VectorIndex {
        VectorIndex::build(vec![entry("leaf", vec![1.0, 0.0])], "m", DistanceMetric::Cosine)
            .expect("build")
    }

    #[tokio::test]
    async fn answers_until_exit() {
        let mut session = ChatSession::new(None);
        let mut output = Vec::new();

        run_repl(
            &pipeline(),
            &index(),
            &mut session,
            &b"battery?\n\nQUIT\nnever asked\n"[..],
            &mut output,
        )
        .await
        .expect("repl");

        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("AutoMentor:\nCheck the manual."));
        assert!(text.contains("  - leaf.txt"));
        assert_eq!(session.memory().len(), 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn piped_lines_reach_the_repl_and_eof_ends_it() {
        let (reader, writer) = tokio::io::duplex(LINE_BUFFER);
        let handle = Handle::current();
        let pump = std::thread::spawn(move || {
            pump_lines(&b"battery?\n"[..], writer, handle);
        });

        let mut session = ChatSession::new(None);
        let mut output = Vec::new();
        run_repl(
            &pipeline(),
            &index(),
            &mut session,
            BufReader::new(reader),
            &mut output,
        )
        .await
        .expect("repl");
        pump.join().expect("pump thread");

        assert_eq!(session.memory().len(), 1);
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn errors_are_printed_and_loop_continues() {
        let mut session = ChatSession::new(None);
        let mut output = Vec::new();

        run_repl(
            &pipeline(),
            &index(),
            &mut session,
            &b"fail\nsecond try\n"[..],
            &mut output,
        )
        .await
        .expect("repl");

        let text = String::from_utf8(output).expect("utf8");
        assert!(text.contains("Error: generation service error: model offline"));
        assert_eq!(session.memory().len(), 1);
    }
}
