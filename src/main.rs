use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Parser;

use docx_mailmerge::config::load_merge_data;
use docx_mailmerge::{Merge, OpenOptions};

#[derive(Parser, Debug)]
#[command(name = "docx-mailmerge")]
#[command(about = "Mail merge for .docx templates: {{ field }} text substitution and *_image picture embedding", long_about = None)]
struct Args {
    /// Input .docx template
    #[arg(value_name = "DOCX")]
    input: PathBuf,

    /// Output .docx (default: <input_stem>_merged.docx)
    #[arg(short, long, value_name = "DOCX")]
    output: Option<PathBuf>,

    /// Merge data file (.toml or .json) with [fields] and [images.*]
    #[arg(long, value_name = "FILE")]
    data: Option<PathBuf>,

    /// List the template's merge fields as JSON and exit
    #[arg(long)]
    list_fields: bool,

    /// Keep the template's word/settings.xml instead of forcing a minimal one
    #[arg(long)]
    keep_settings: bool,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut merge = Merge::open_with(
        &args.input,
        OpenOptions {
            force_settings: !args.keep_settings,
        },
    )?;

    if args.list_fields {
        let listing = serde_json::json!({
            "text_fields": merge.text_field_names(),
            "image_fields": merge.image_field_names(),
        });
        println!("{}", serde_json::to_string_pretty(&listing).context("serialize field listing")?);
        return Ok(());
    }

    let data_path = args
        .data
        .context("missing --data <FILE> (or use --list-fields)")?;
    let data = load_merge_data(&data_path)?;
    let base_dir = data_path.parent().unwrap_or_else(|| Path::new("."));
    let values = data.into_field_values(base_dir)?;

    let output = match args.output {
        Some(p) => p,
        None => {
            let stem = args
                .input
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("output")
                .to_string();
            args.input.with_file_name(format!("{stem}_merged.docx"))
        }
    };

    merge.apply(values)?;
    merge.write_to(&output)?;
    eprintln!("Wrote {}", output.display());
    Ok(())
}
