//! Interactive channel
//!
//! Line-oriented input and output for the REPL and the approval prompts.
//! Everything the user sees goes through a [`Console`], so the controller
//! can be driven from a script in tests.

use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

use crate::{Error, Result};

/// Prefix for controller status lines
pub const STATUS_PREFIX: &str = "⚙️: ";
/// Prefix for messages from the reasoning process
pub const AGENT_PREFIX: &str = "🤖: ";

/// Line-oriented interactive channel
#[async_trait]
pub trait Console: Send {
    /// Show `prompt` and read one line, without its line terminator.
    /// Returns `None` once input is closed.
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>>;

    /// Write one line
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Ask a yes/no question until it gets a yes or a no
    async fn confirm(&mut self, question: &str) -> Result<bool> {
        let prompt = format!("{} (y/n): ", question);
        loop {
            let Some(answer) = self.read_line(&prompt).await? else {
                return Err(Error::Console(
                    "Input closed while waiting for confirmation".to_string(),
                ));
            };
            match answer.trim().to_lowercase().as_str() {
                "y" | "yes" => return Ok(true),
                "n" | "no" => return Ok(false),
                _ => self.write_line("Please answer y or n.").await?,
            }
        }
    }

    /// Controller status line
    async fn status(&mut self, message: &str) -> Result<()> {
        self.write_line(&format!("{}{}", STATUS_PREFIX, message)).await
    }

    /// Message from the reasoning process
    async fn agent(&mut self, message: &str) -> Result<()> {
        self.write_line(&format!("{}{}", AGENT_PREFIX, message)).await
    }
}

/// Console over any async line reader and writer
pub struct LineConsole<R, W> {
    reader: R,
    writer: W,
}

impl LineConsole<BufReader<tokio::io::Stdin>, tokio::io::Stdout> {
    /// Console on the process's stdin and stdout
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> LineConsole<R, W> {
    pub fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// The underlying writer
    pub fn writer(&self) -> &W {
        &self.writer
    }
}

#[async_trait]
impl<R, W> Console for LineConsole<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn read_line(&mut self, prompt: &str) -> Result<Option<String>> {
        self.writer.write_all(prompt.as_bytes()).await?;
        self.writer.flush().await?;

        // Invalid UTF-8 is replaced, not fatal
        let mut raw = Vec::new();
        if self.reader.read_until(b'\n', &mut raw).await? == 0 {
            return Ok(None);
        }
        let mut line = String::from_utf8_lossy(&raw).into_owned();
        if line.ends_with('\n') {
            line.pop();
            if line.ends_with('\r') {
                line.pop();
            }
        }
        Ok(Some(line))
    }

    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await?;
        Ok(())
    }
}

/// Wrap text in green
pub fn green(text: &str) -> String {
    format!("\x1b[32m{}\x1b[0m", text)
}

/// Wrap text in red
pub fn red(text: &str) -> String {
    format!("\x1b[31m{}\x1b[0m", text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{console, console_bytes, output};

    #[tokio::test]
    async fn test_read_line_strips_terminators() {
        let mut c = console("hello\r\nworld\nlast");
        assert_eq!(c.read_line("> ").await.unwrap().as_deref(), Some("hello"));
        assert_eq!(c.read_line("> ").await.unwrap().as_deref(), Some("world"));
        assert_eq!(c.read_line("> ").await.unwrap().as_deref(), Some("last"));
        assert_eq!(c.read_line("> ").await.unwrap(), None);
        assert_eq!(output(&c), "> > > > ");
    }

    #[tokio::test]
    async fn test_read_line_replaces_invalid_utf8() {
        let mut c = console_bytes(b"caf\xe9\nok\n");
        assert_eq!(
            c.read_line("").await.unwrap().as_deref(),
            Some("caf\u{FFFD}")
        );
        assert_eq!(c.read_line("").await.unwrap().as_deref(), Some("ok"));
    }

    #[tokio::test]
    async fn test_confirm_reprompts_until_answered() {
        let mut c = console("maybe\n YES \n");
        assert!(c.confirm("Do you approve this tool call?").await.unwrap());

        let out = output(&c);
        assert_eq!(out.matches("Do you approve this tool call? (y/n): ").count(), 2);
        assert!(out.contains("Please answer y or n."));
    }

    #[tokio::test]
    async fn test_confirm_no() {
        let mut c = console("n\n");
        assert!(!c.confirm("Proceed?").await.unwrap());
    }

    #[test]
    fn test_confirm_eof_is_error() {
        let mut c = console("");
        let result = tokio_test::block_on(c.confirm("Proceed?"));
        assert!(matches!(result, Err(Error::Console(_))));
    }

    #[tokio::test]
    async fn test_prefixed_lines() {
        let mut c = console("");
        c.status("Waiting for you to complete authorization...")
            .await
            .unwrap();
        c.agent("Ai: hello").await.unwrap();
        assert_eq!(
            output(&c),
            "⚙️: Waiting for you to complete authorization...\n🤖: Ai: hello\n"
        );
    }
}
