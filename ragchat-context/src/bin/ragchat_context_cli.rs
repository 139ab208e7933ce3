use clap::Parser;
use ragchat_context::text::{DEFAULT_DELIMITERS, TextSplitter};
use serde::Serialize;
use std::fs;
use std::io::{self, Read};
use std::process;

/// A CLI tool to split a text file into JSON chunks using ragchat-context.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the input text file. If not provided, reads from stdin.
    #[arg(short, long)]
    input: Option<String>,

    /// Maximum length for each chunk, in characters.
    #[arg(short = 's', long, default_value_t = 1000)]
    chunk_size: usize,

    /// Number of characters neighbouring chunks may share.
    #[arg(short = 'o', long, default_value_t = 200)]
    chunk_overlap: usize,

    /// Comma-separated list of regex patterns for delimiters.
    /// Defaults to paragraph, line, sentence and word boundaries.
    #[arg(short, long, value_delimiter = ',')]
    delimiters: Option<Vec<String>>,
}

#[derive(Serialize)]
struct ChunkOutput<'a> {
    sequence: usize,
    source_offset: usize,
    chars: usize,
    text: &'a str,
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let document = if let Some(input_path) = args.input {
        fs::read_to_string(input_path)?
    } else {
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    };

    let splitter = match args.delimiters {
        Some(patterns) => {
            TextSplitter::with_delimiters(&patterns, args.chunk_size, args.chunk_overlap)?
        }
        None => TextSplitter::with_delimiters(
            DEFAULT_DELIMITERS,
            args.chunk_size,
            args.chunk_overlap,
        )?,
    };

    let chunks = splitter.split(&document);
    let output: Vec<ChunkOutput> = chunks
        .iter()
        .map(|c| ChunkOutput {
            sequence: c.sequence,
            source_offset: c.source_offset,
            chars: c.char_len(),
            text: &c.text,
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
