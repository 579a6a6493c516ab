use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;

use rtail::config::{
    Encoding, LineTerminator, MalformedLinePolicy, RotationStart, TailConfig, TailConfigLayer,
};
use rtail::tail::WriterSink;
use rtail::{ChunkedTail, Tail};

#[derive(Parser, Debug)]
#[command(name = "rtail", version, about = "Print the last lines of a file and optionally follow it")]
pub struct Cli {
    /// File to read
    pub file: PathBuf,

    /// Number of lines
    #[arg(short = 'n', long = "lines", default_value_t = 10)]
    pub lines: usize,

    /// Keep printing lines as the file grows
    #[arg(short, long)]
    pub follow: bool,

    /// Chunk size for backward and forward reads
    #[arg(long, value_name = "BYTES")]
    pub window_size: Option<usize>,

    /// Follow polling cadence
    #[arg(long, value_name = "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Text encoding of the file
    #[arg(long, value_enum)]
    pub encoding: Option<Encoding>,

    /// Whether a `\r` before `\n` belongs to the terminator
    #[arg(long, value_enum)]
    pub line_terminator: Option<LineTerminator>,

    /// What to do with lines that are not valid in the encoding
    #[arg(long, value_enum)]
    pub malformed_line: Option<MalformedLinePolicy>,

    /// Where to resume after the file was truncated or replaced
    #[arg(long, value_enum)]
    pub rotation_start: Option<RotationStart>,

    /// Give up after this many polls without the file (default: never)
    #[arg(long, value_name = "N")]
    pub max_rotation_retries: Option<u32>,

    /// Config file layered over ~/.config/rtail/config.toml
    #[arg(long)]
    pub config: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

impl Cli {
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "rtail=debug"
        } else if self.quiet {
            "rtail=error"
        } else {
            "rtail=info"
        }
    }

    /// Command-line settings as the topmost config layer
    pub fn overrides(&self) -> TailConfigLayer {
        TailConfigLayer {
            window_size_bytes: self.window_size,
            poll_interval_ms: self.poll_interval_ms,
            line_terminator: self.line_terminator,
            malformed_line: self.malformed_line,
            encoding: self.encoding,
            rotation_start: self.rotation_start,
            max_rotation_retries: self.max_rotation_retries,
        }
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let config = TailConfig::resolve(cli.config.as_deref(), &cli.overrides())?;
    tracing::debug!(?config, "Resolved config");

    let tail = ChunkedTail::new(config);
    if cli.follow {
        follow(tail, cli.file, cli.lines).await
    } else {
        print_tail(&tail, &cli.file, cli.lines)
    }
}

fn print_tail(tail: &ChunkedTail, path: &Path, n: usize) -> Result<()> {
    let lines = tail
        .tail(path, n)
        .with_context(|| format!("Failed to tail {}", path.display()))?;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    for line in &lines {
        writeln!(out, "{}", line)?;
    }
    out.flush()?;
    Ok(())
}

/// Run the blocking follow loop off the runtime and stop it on Ctrl+C.
async fn follow(tail: ChunkedTail, path: PathBuf, n: usize) -> Result<()> {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let display = path.display().to_string();

    let mut task = tokio::task::spawn_blocking(move || {
        let mut sink = WriterSink::new(std::io::stdout().lock());
        tail.follow(&path, n, &mut sink, &token)
    });

    let result = tokio::select! {
        joined = &mut task => joined,
        _ = tokio::signal::ctrl_c() => {
            tracing::debug!("Received Ctrl+C, stopping");
            cancel.cancel();
            task.await
        }
    };

    result
        .context("Follow task panicked")?
        .with_context(|| format!("Failed to follow {}", display))?;
    Ok(())
}
