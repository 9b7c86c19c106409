// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Transport adapters — write a run's events to a byte stream.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, instrument};

use forge_core::error::Result;
use forge_core::types::ProgressEvent;

use crate::orchestrator::RunHandle;

/// Wire framing for progress events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Framing {
    /// One compact JSON object per line.
    #[default]
    JsonLines,
    /// Server-sent events: `data: {...}` followed by a blank line.
    Sse,
}

impl Framing {
    pub fn frame(self, event: &ProgressEvent) -> Result<String> {
        Ok(match self {
            Self::JsonLines => {
                let mut line = event.to_json_line()?;
                line.push('\n');
                line
            }
            Self::Sse => event.to_sse_frame()?,
        })
    }
}

/// Forward every event of `handle` to `writer`, flushing after each one so
/// the far side sees progress as it happens.
///
/// Returns the terminal event, or `None` if the stream closed without one.
/// A write error drops the handle, which abandons the run.
#[instrument(skip_all, fields(run_id = %handle.run_id(), ?framing))]
pub async fn stream_events<W>(
    mut handle: RunHandle,
    framing: Framing,
    writer: &mut W,
) -> Result<Option<ProgressEvent>>
where
    W: AsyncWrite + Unpin,
{
    while let Some(event) = handle.next_event().await {
        let frame = framing.frame(&event)?;
        writer.write_all(frame.as_bytes()).await?;
        writer.flush().await?;
        if event.is_terminal() {
            debug!("terminal event written");
            return Ok(Some(event));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{Workspace, solid_png};
    use forge_core::types::{StepDescriptor, StepKind};

    #[test]
    fn frames_carry_the_wire_field_names() {
        let event = ProgressEvent::StepStart {
            step: 0,
            total: 2,
            label: "decrypt".into(),
        };
        assert_eq!(
            Framing::JsonLines.frame(&event).unwrap(),
            "{\"event\":\"step_start\",\"step\":0,\"total\":2,\"label\":\"decrypt\"}\n"
        );

        let done = ProgressEvent::Complete {
            message: "Workflow completed (1 steps)".into(),
            filename: "a.docx".into(),
        };
        let sse = Framing::Sse.frame(&done).unwrap();
        assert!(sse.starts_with("data: {\"event\":\"complete\""));
        assert!(sse.ends_with("\"filename\":\"a.docx\"}\n\n"));
    }

    #[tokio::test]
    async fn json_lines_stream_ends_with_terminal_event() {
        let ws = Workspace::new();
        let orch = ws.orchestrator();
        let input = ws.input("photo.png", &solid_png(20, 20));
        let handle = orch
            .execute(
                input,
                vec![
                    StepDescriptor::new(StepKind::ResizeImage).with_config("percentage", 50),
                ],
            )
            .unwrap();

        let mut out = Vec::new();
        let terminal = stream_events(handle, Framing::JsonLines, &mut out)
            .await
            .unwrap();

        assert!(matches!(terminal, Some(ProgressEvent::Complete { .. })));
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        let last: serde_json::Value = serde_json::from_str(lines[2]).unwrap();
        assert_eq!(last["event"], "complete");
        assert_eq!(last["filename"], "photo_resized.png");
    }
}
