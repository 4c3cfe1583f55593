//! Console Renderer
//!
//! The single owner of console output. Everything shown to the operator
//! arrives as a [`RenderRequest`] over a bounded queue.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

/// ANSI erase display + cursor home
pub const CLEAR_SCREEN: &str = "\x1b[2J\x1b[1;1H";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderRequest {
    Lines(Vec<String>),
    Clear,
}

impl RenderRequest {
    pub fn line(line: impl Into<String>) -> Self {
        RenderRequest::Lines(vec![line.into()])
    }
}

pub struct Renderer<W> {
    writer: W,
    requests: mpsc::Receiver<RenderRequest>,
}

impl<W: AsyncWrite + Unpin> Renderer<W> {
    pub fn new(writer: W, requests: mpsc::Receiver<RenderRequest>) -> Self {
        Self { writer, requests }
    }

    /// Drain requests until every sender is gone
    pub async fn run(mut self) -> std::io::Result<W> {
        while let Some(request) = self.requests.recv().await {
            match request {
                RenderRequest::Lines(lines) => {
                    for line in lines {
                        self.writer.write_all(line.as_bytes()).await?;
                        self.writer.write_all(b"\n").await?;
                    }
                }
                RenderRequest::Clear => {
                    self.writer.write_all(CLEAR_SCREEN.as_bytes()).await?;
                }
            }
            self.writer.flush().await?;
        }
        Ok(self.writer)
    }
}
