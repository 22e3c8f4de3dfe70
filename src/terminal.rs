//! The channel-facing I/O surface the shell and long-running commands
//! write through and occasionally read a line back from (the silent
//! password prompt inside nested `ssh`).

use async_trait::async_trait;

#[async_trait]
pub trait Terminal: Send {
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()>;
    async fn write_str(&mut self, s: &str) -> anyhow::Result<()>;
    /// Read one line with local echo suppressed, for the nested-`ssh`
    /// password prompt.
    async fn read_password(&mut self) -> anyhow::Result<String>;
}

/// An in-memory sink, used by tests that want to inspect everything a
/// command wrote, or to script a canned password response.
#[derive(Default)]
pub struct RecordingSink {
    pub lines: Vec<String>,
    pub scripted_password: String,
}

#[async_trait]
impl Terminal for RecordingSink {
    async fn write_line(&mut self, line: &str) -> anyhow::Result<()> {
        self.lines.push(line.to_string());
        Ok(())
    }

    async fn write_str(&mut self, s: &str) -> anyhow::Result<()> {
        self.lines.push(s.to_string());
        Ok(())
    }

    async fn read_password(&mut self) -> anyhow::Result<String> {
        Ok(self.scripted_password.clone())
    }
}
