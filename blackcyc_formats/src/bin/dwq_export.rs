//! Decode DWQ containers into PNG files.

use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use blackcyc_formats::{DwqDecoder, read_metadata};
use clap::Parser;

#[derive(Parser, Debug)]
#[command(about = "Export Black Cyc DWQ images as PNG", version)]
struct Args {
    /// DWQ files to decode
    #[arg(value_name = "PATH", required = true)]
    inputs: Vec<PathBuf>,

    /// Destination directory (defaults to each input's directory)
    #[arg(long, value_name = "DIR")]
    dest: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(dest) = args.dest.as_ref() {
        fs::create_dir_all(dest)
            .with_context(|| format!("creating destination {}", dest.display()))?;
    }

    let decoder = DwqDecoder::new();
    for input in &args.inputs {
        let output = output_path(input, args.dest.as_deref())?;
        export(&decoder, input, &output)
            .with_context(|| format!("exporting {}", input.display()))?;
        println!("{} -> {}", input.display(), output.display());
    }

    Ok(())
}

fn output_path(input: &Path, dest: Option<&Path>) -> Result<PathBuf> {
    let mut output = input.with_extension("png");
    if let Some(dest) = dest {
        let name = output
            .file_name()
            .with_context(|| format!("{} has no file name", input.display()))?;
        output = dest.join(name);
    }
    if output == input {
        bail!("{} would overwrite its own input", output.display());
    }
    Ok(output)
}

fn export(decoder: &DwqDecoder, input: &Path, output: &Path) -> Result<()> {
    let file = File::open(input).context("opening input")?;
    let mut reader = BufReader::new(file);

    let Some(meta) = read_metadata(&mut reader).context("probing header")? else {
        bail!("not a DWQ image");
    };

    let image = decoder.decode(&mut reader, &meta).context("decoding payload")?;
    let rgba = image.to_rgba8888().context("converting pixels")?;
    let buffer = image::RgbaImage::from_raw(image.width, image.height, rgba)
        .context("assembling RGBA buffer")?;
    buffer
        .save_with_format(output, image::ImageFormat::Png)
        .with_context(|| format!("writing {}", output.display()))?;

    Ok(())
}
