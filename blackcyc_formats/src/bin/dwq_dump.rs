use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use blackcyc_formats::{DwqMetadata, read_metadata};
use clap::Parser;
use serde::Serialize;
use walkdir::WalkDir;

/// Inspect DWQ containers and report what each one holds.
#[derive(Parser, Debug)]
#[command(about = "Dump Black Cyc DWQ image metadata", version)]
struct Args {
    /// DWQ files to inspect
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Directory to scan recursively for .dwq files
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Emit one JSON record per file instead of columns
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct DumpRecord {
    path: String,
    base_type: String,
    pack_type: u16,
    alpha: bool,
    width: u32,
    height: u32,
    packed_size: i32,
}

impl DumpRecord {
    fn new(path: &PathBuf, meta: &DwqMetadata) -> Self {
        DumpRecord {
            path: path.display().to_string(),
            base_type: meta.base_type.clone(),
            pack_type: meta.pack_type,
            alpha: meta.alpha,
            width: meta.width,
            height: meta.height,
            packed_size: meta.packed_size,
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let paths = resolve_paths(&args)?;
    if paths.is_empty() {
        bail!("no files to inspect; pass paths or --root");
    }

    for path in &paths {
        let file =
            File::open(path).with_context(|| format!("opening {}", path.display()))?;
        let mut reader = BufReader::new(file);
        let meta = read_metadata(&mut reader)
            .with_context(|| format!("probing {}", path.display()))?;

        match meta {
            None => eprintln!("{}: not a DWQ image", path.display()),
            Some(meta) if args.json => {
                let record = DumpRecord::new(path, &meta);
                println!("{}", serde_json::to_string(&record)?);
            }
            Some(meta) => {
                let alpha = if meta.alpha { "+mask" } else { "" };
                println!(
                    "{path:<40} {base:<10} type {pack:>2}{alpha:<5} {width:>5}x{height:<5} packed {packed}",
                    path = path.display(),
                    base = meta.base_type,
                    pack = meta.pack_type,
                    alpha = alpha,
                    width = meta.width,
                    height = meta.height,
                    packed = meta.packed_size,
                );
            }
        }
    }

    Ok(())
}

fn resolve_paths(args: &Args) -> Result<Vec<PathBuf>> {
    let mut paths = args.paths.clone();

    if let Some(root) = args.root.as_ref() {
        for entry in WalkDir::new(root).into_iter().filter_map(|res| res.ok()) {
            if entry.file_type().is_file()
                && entry
                    .path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("dwq"))
                    .unwrap_or(false)
            {
                paths.push(entry.into_path());
            }
        }
    }

    paths.sort();
    paths.dedup();

    Ok(paths)
}
