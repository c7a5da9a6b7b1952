// Command-line interface for blobpatch.
//
// Subcommands: `diff` (build a patch), `apply` (reconstruct the new file),
// `info` (print patch metadata). Command functions return exit codes;
// `run()` dispatches and never returns.

use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process;

use clap::{ArgAction, Parser, Subcommand};

use crate::io::{apply_files, diff_files};
use crate::patch::codec;

const BUF_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Clap CLI definition
// ---------------------------------------------------------------------------

/// Chunk-based binary patch tool.
#[derive(Parser, Debug)]
#[command(
    name = "blobpatch",
    version,
    about = "Chunk-based binary patch encoder/decoder",
    arg_required_else_help = true
)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,

    /// Force overwrite existing output files.
    #[arg(short = 'f', long, global = true)]
    force: bool,

    /// Quiet mode (suppress non-error output).
    #[arg(short = 'q', long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Verbose output (repeat for more detail).
    #[arg(short = 'v', long, global = true, action = ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build a patch transforming OLD into NEW.
    Diff {
        /// The old file.
        old: PathBuf,
        /// The new file.
        new: PathBuf,
        /// Patch output path.
        patch: PathBuf,
    },
    /// Reconstruct the new file from OLD and PATCH.
    Apply {
        /// The old file.
        old: PathBuf,
        /// The patch file.
        patch: PathBuf,
        /// Reconstructed output path.
        output: PathBuf,
    },
    /// Print patch header metadata and chunk statistics.
    Info {
        /// The patch file.
        patch: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn refuse_existing_output(path: &Path, force: bool) -> bool {
    if path.exists() && !force {
        eprintln!(
            "blobpatch: output file exists, use -f to overwrite: {}",
            path.display()
        );
        return true;
    }
    false
}

fn cmd_diff(old: &Path, new: &Path, patch: &Path, cli: &Cli) -> i32 {
    if refuse_existing_output(patch, cli.force) {
        return 1;
    }

    let stats = match diff_files(old, new, patch) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("blobpatch: diff: {e}");
            return 1;
        }
    };

    if !cli.quiet {
        eprintln!(
            "blobpatch: {} -> {}: {} patch bytes for {} new bytes ({} chunks)",
            old.display(),
            new.display(),
            stats.patch_size,
            stats.new_size,
            stats.chunk_count
        );
        if cli.verbose > 0 {
            eprintln!(
                "blobpatch: {} references, {} literals carrying {} bytes inline",
                stats.reference_chunks, stats.literal_chunks, stats.literal_bytes
            );
        }
    }
    0
}

fn cmd_apply(old: &Path, patch: &Path, output: &Path, cli: &Cli) -> i32 {
    if refuse_existing_output(output, cli.force) {
        return 1;
    }

    let stats = match apply_files(old, patch, output) {
        Ok(stats) => stats,
        Err(e) => {
            eprintln!("blobpatch: apply: {e}");
            return 1;
        }
    };

    if !cli.quiet {
        eprintln!(
            "blobpatch: reconstructed {} bytes from {} chunks into {}",
            stats.output_size,
            stats.chunk_count,
            output.display()
        );
    }
    0
}

fn cmd_info(patch_path: &Path) -> i32 {
    let file = match File::open(patch_path) {
        Ok(file) => file,
        Err(e) => {
            eprintln!("blobpatch: info: {}: {e}", patch_path.display());
            return 1;
        }
    };
    let mut reader = BufReader::with_capacity(BUF_SIZE, file);
    let patch = match codec::read_patch(&mut reader) {
        Ok(patch) => patch,
        Err(e) => {
            eprintln!("blobpatch: info: {}: {e}", patch_path.display());
            return 1;
        }
    };

    println!("version:          {}", patch.version);
    println!("old file:         {}", patch.old_path.display());
    println!("new file:         {}", patch.new_path.display());
    println!(
        "escape alphabet:  forbidden={} substitute={} escape={} escape2={}",
        patch.escape.to_be_escaped,
        patch.escape.substitute,
        patch.escape.escape,
        patch.escape.escape2
    );
    println!("chunks:           {}", patch.chunks.len());
    println!("  references:     {}", patch.reference_chunks());
    println!("  literals:       {}", patch.literal_chunks());
    println!("  literal bytes:  {}", patch.literal_bytes());
    println!("new file size:    {}", patch.new_file_len());
    0
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Main CLI entry point. Parses arguments via clap, dispatches commands.
pub fn run() -> ! {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"))
        .format_timestamp(None)
        .format_target(false)
        .init();

    let cli = Cli::parse();

    let exit_code = match &cli.command {
        Cmd::Diff { old, new, patch } => cmd_diff(old, new, patch, &cli),
        Cmd::Apply { old, patch, output } => cmd_apply(old, patch, output, &cli),
        Cmd::Info { patch } => cmd_info(patch),
    };

    process::exit(exit_code);
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
