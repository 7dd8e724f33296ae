//! `probe`/`dump` command-line front end for the demuxing core.
//!
//! Thin by design: all format detection and parsing lives in the library;
//! this binary only wires argv onto [`condemux::registry`] and maps the
//! result onto the exit codes the core documents (0 success, 2 unsupported
//! format, 3 malformed container, 4 I/O error, 5 usage).

use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

use condemux::byte_source::FileByteSource;
#[cfg(feature = "http")]
use condemux::byte_source::HttpByteSource;
use condemux::error::ErrorKind;
use condemux::{ByteSource, Demuxer};

#[derive(Parser)]
#[command(name = "condemux")]
#[command(about = "Probe and dump audio containers without decoding them")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the detected format, streams, and durations.
    Probe { path: String },
    /// Write one stream's raw chunks to a file, back to back.
    Dump {
        path: String,
        #[arg(long)]
        stream: u32,
        #[arg(long = "out")]
        out: PathBuf,
    },
}

fn main() -> ExitCode {
    #[cfg(feature = "tracing")]
    init_tracing();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(5);
        }
    };

    match cli.command {
        Command::Probe { path } => run_probe(&path),
        Command::Dump { path, stream, out } => run_dump(&path, stream, &out),
    }
}

#[cfg(feature = "tracing")]
fn init_tracing() {
    use tracing_subscriber::EnvFilter;
    let filter = if std::env::var("DEMUX_LOG").is_ok() {
        EnvFilter::new("condemux=debug")
    } else {
        EnvFilter::new("condemux=warn")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn open_source(path: &str) -> Result<Box<dyn ByteSource>, ExitCode> {
    #[cfg(feature = "http")]
    if path.starts_with("http://") || path.starts_with("https://") {
        return HttpByteSource::open(path)
            .map(|s| Box::new(s) as Box<dyn ByteSource>)
            .map_err(|e| exit_for_error(&e));
    }
    FileByteSource::open(path)
        .map(|s| Box::new(s) as Box<dyn ByteSource>)
        .map_err(|e| exit_for_error(&e))
}

fn exit_for_error(err: &condemux::DemuxError) -> ExitCode {
    eprintln!("condemux: {err}");
    match err.kind {
        ErrorKind::Unsupported => ExitCode::from(2),
        ErrorKind::Format => ExitCode::from(3),
        ErrorKind::Io | ErrorKind::Timeout | ErrorKind::Memory | ErrorKind::Closed => ExitCode::from(4),
        ErrorKind::Validation => ExitCode::from(3),
    }
}

fn run_probe(path: &str) -> ExitCode {
    let source = match open_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut demuxer = match condemux::registry().create_with_hint(source, Some(path)) {
        Ok(d) => d,
        Err(e) => return exit_for_error(&e),
    };

    if let Err(e) = demuxer.parse_container() {
        return exit_for_error(&e);
    }

    println!("duration_ms: {}", demuxer.duration_ms());
    println!("streams:");
    for stream in demuxer.streams() {
        println!(
            "  [{}] {:?} codec={} rate={} channels={} bits={} duration_samples={} duration_ms={}",
            stream.stream_id,
            stream.codec_family,
            stream.codec_name,
            stream.sample_rate,
            stream.channels,
            stream.bits_per_sample,
            stream.duration_samples,
            stream.duration_ms,
        );
    }

    let recovered = demuxer.error_stats().total();
    if recovered > 0 {
        println!("recovered errors: {recovered}");
        for (kind, count) in demuxer.error_stats().iter() {
            println!("  {kind}: {count}");
        }
    }

    ExitCode::from(0)
}

fn run_dump(path: &str, stream_id: u32, out: &PathBuf) -> ExitCode {
    let source = match open_source(path) {
        Ok(s) => s,
        Err(code) => return code,
    };

    let mut demuxer = match condemux::registry().create_with_hint(source, Some(path)) {
        Ok(d) => d,
        Err(e) => return exit_for_error(&e),
    };

    if let Err(e) = demuxer.parse_container() {
        return exit_for_error(&e);
    }

    if demuxer.stream_info(stream_id).is_none() {
        eprintln!("condemux: no stream {stream_id} in {path}");
        return ExitCode::from(5);
    }

    let mut out_file = match File::create(out) {
        Ok(f) => f,
        Err(e) => return exit_for_error(&e.into()),
    };

    loop {
        let chunk = match demuxer.read_chunk_for_stream(stream_id) {
            Ok(c) => c,
            Err(e) => return exit_for_error(&e),
        };
        if !chunk.is_valid() {
            break;
        }
        if let Err(e) = out_file.write_all(&chunk.data) {
            return exit_for_error(&e.into());
        }
    }

    ExitCode::from(0)
}
