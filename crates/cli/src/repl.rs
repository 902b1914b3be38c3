// Interactive read-eval-print loop over an orchestrator

use anyhow::Result;
use std::future::Future;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use toolmux_core::{render_catalog, Orchestrator, TurnKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplCommand {
    Empty,
    Exit,
    Tools,
    History,
    Message(String),
}

impl ReplCommand {
    pub fn parse(line: &str) -> Self {
        let line = line.trim();
        match line.to_ascii_lowercase().as_str() {
            "" => Self::Empty,
            "exit" | "quit" => Self::Exit,
            "tools" => Self::Tools,
            "history" => Self::History,
            _ => Self::Message(line.to_string()),
        }
    }
}

/// Run until end of input, an exit command or `interrupt` resolves.
///
/// `interrupt` is polled both while waiting for input and while a turn is
/// in flight; an interrupted turn is abandoned.
pub async fn run<R, W, F, Fut>(
    orchestrator: &mut Orchestrator,
    input: R,
    mut output: W,
    interrupt: F,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    F: Fn() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut lines = input.lines();
    say(
        &mut output,
        "Chat started. Type 'tools' to list tools, 'history' to review, 'exit' to quit.",
    )
    .await?;

    loop {
        output.write_all(b"\nYou: ").await?;
        output.flush().await?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = interrupt() => {
                say(&mut output, "\nInterrupted").await?;
                break;
            }
        };
        let Some(line) = line else {
            break;
        };

        match ReplCommand::parse(&line) {
            ReplCommand::Empty => continue,
            ReplCommand::Exit => break,
            ReplCommand::Tools => {
                let catalog = orchestrator.catalog();
                if catalog.is_empty() {
                    say(&mut output, "No tools available").await?;
                } else {
                    say(&mut output, &render_catalog(catalog)).await?;
                }
            }
            ReplCommand::History => {
                let state = orchestrator.state();
                if state.is_empty() {
                    say(&mut output, "(no conversation yet)").await?;
                } else {
                    say(&mut output, &state.transcript()).await?;
                }
            }
            ReplCommand::Message(text) => {
                let before = orchestrator.state().len();
                let outcome = tokio::select! {
                    outcome = orchestrator.handle_user_input(&text) => outcome,
                    _ = interrupt() => {
                        tracing::warn!("Turn abandoned on interrupt");
                        say(&mut output, "\nInterrupted").await?;
                        break;
                    }
                };

                // Show tool activity from this turn before the answer
                for turn in &orchestrator.state().turns()[before..] {
                    if matches!(turn.kind, TurnKind::ToolRequest { .. } | TurnKind::ToolResult { .. }) {
                        say(&mut output, &format!("  · {}", turn.summary())).await?;
                    }
                }

                match outcome {
                    Ok(answer) => say(&mut output, &format!("Assistant: {}", answer)).await?,
                    Err(e) => {
                        tracing::warn!(error = %e, "Turn failed");
                        say(&mut output, &format!("Error: {}", e)).await?;
                    }
                }
            }
        }
    }

    say(&mut output, "Goodbye.").await?;
    Ok(())
}

async fn say<W: AsyncWrite + Unpin>(output: &mut W, text: &str) -> Result<()> {
    output.write_all(text.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await?;
    Ok(())
}
