//! Default stream consumer: prints each message as a document

use async_trait::async_trait;
use std::fs::File;
use std::io::{self, BufWriter, Stdout, Write};
use std::path::Path;
use tracing::{debug, warn};

use crate::common::errors::Result;
use crate::common::traits::MessageHandler;

/// Where printed messages go
pub enum OutputSink {
    Stdout(Stdout),
    File(BufWriter<File>),
}

impl OutputSink {
    pub fn stdout() -> Self {
        OutputSink::Stdout(io::stdout())
    }

    /// Open `path` for writing, or stdout when `path` is `None`.
    ///
    /// A file that cannot be created also falls back to stdout.
    pub fn open(path: Option<&Path>) -> Self {
        let Some(path) = path else {
            return Self::stdout();
        };

        match File::create(path) {
            Ok(file) => {
                debug!("Writing stream output to {}", path.display());
                OutputSink::File(BufWriter::new(file))
            }
            Err(e) => {
                warn!("Cannot open {} ({}), writing to stdout", path.display(), e);
                Self::stdout()
            }
        }
    }

    pub fn is_stdout(&self) -> bool {
        matches!(self, OutputSink::Stdout(_))
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            OutputSink::Stdout(out) => out.write(buf),
            OutputSink::File(out) => out.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            OutputSink::Stdout(out) => out.flush(),
            OutputSink::File(out) => out.flush(),
        }
    }
}

/// Render one message as a block-style YAML document between `---` and `...`
pub fn render_document(value: &serde_json::Value) -> Result<String> {
    // serde_yaml emits no start marker and always ends with a newline
    Ok(format!("---\n{}...\n", serde_yaml::to_string(value)?))
}

/// Handler that parses each message and writes it out as a document
pub struct DocumentPrinter<W> {
    out: W,
    printed: u64,
}

impl DocumentPrinter<OutputSink> {
    /// Printer writing to `path`, or stdout
    pub fn open(path: Option<&Path>) -> Self {
        Self::new(OutputSink::open(path))
    }
}

impl<W: Write + Send> DocumentPrinter<W> {
    pub fn new(out: W) -> Self {
        Self { out, printed: 0 }
    }

    /// Number of messages written so far
    pub fn printed(&self) -> u64 {
        self.printed
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> MessageHandler for DocumentPrinter<W> {
    async fn consume(&mut self, message: &str) -> Result<()> {
        let value: serde_json::Value = serde_json::from_str(message)?;
        self.out.write_all(render_document(&value)?.as_bytes())?;
        self.out.flush()?;
        self.printed += 1;
        Ok(())
    }
}
