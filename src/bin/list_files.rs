//! Recursive file listing with per-file stats and totals.
//!
//! ```text
//! list_files <extensions> <path> [path2] ...
//! ```
//!
//! `extensions` is a comma-delimited list of extensions to keep; paths may
//! be files or directories (directories are walked recursively, dotfiles
//! skipped).

use std::path::{Path, PathBuf};

use anyhow::Result;
use clap::Parser;

use recio::fsutil;

#[derive(Parser)]
#[command(about = "Recursively list files matching a set of extensions")]
struct Args {
    /// Comma-delimited list of valid extensions (e.g. "txt,lz4").
    extensions: String,
    /// Files or directories to scan.
    #[arg(required = true)]
    paths: Vec<PathBuf>,
}

/// Formats epoch seconds as `YYYY-MM-DD HH:MM:SS` (UTC), using the
/// civil-from-days conversion.
fn format_time(epoch_secs: i64) -> String {
    let days = epoch_secs.div_euclid(86_400);
    let secs = epoch_secs.rem_euclid(86_400);
    let (h, m, s) = (secs / 3600, (secs / 60) % 60, secs % 60);

    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let y = yoe + era * 400;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let d = doy - (153 * mp + 2) / 5 + 1;
    let month = if mp < 10 { mp + 3 } else { mp - 9 };
    let year = if month <= 2 { y + 1 } else { y };
    format!("{year:04}-{month:02}-{d:02} {h:02}:{m:02}:{s:02}")
}

fn main() -> Result<()> {
    let args = Args::parse();
    let extensions: Vec<String> = args.extensions.split(',').map(str::to_owned).collect();
    let valid = |p: &Path| extensions.iter().any(|e| fsutil::has_extension(p, e));

    let mut total_bytes: u64 = 0;
    let mut total_files: u64 = 0;
    for path in &args.paths {
        let files = fsutil::list(path, Some(&valid))?;
        for fi in &files {
            total_bytes += fi.size;
            println!(
                "{} {:>20}\t{}",
                format_time(fi.last_modified),
                fi.size,
                fi.filename.display()
            );
        }
        total_files += files.len() as u64;
    }
    println!("{total_bytes} byte(s) in {total_files} file(s)");
    Ok(())
}
