use anyhow::{bail, Context, Result};
use clap::Parser;
use env_logger::{Builder, Env};
use jbig2enc_core::jbig2structs::Jbig2Config;
use jbig2enc_core::jbig2sym::load_pbm;
use jbig2enc_core::{get_build_info, get_version, Jbig2Encoder};
use log::{info, LevelFilter};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[clap(author, version, about = "Encode PBM images as JBIG2", long_about = None)]
struct Args {
    /// Input PBM files, one page each
    #[clap(required = true, value_parser)]
    inputs: Vec<PathBuf>,

    /// Output file (the page stream in --pdf mode)
    #[clap(short, long, value_parser, default_value = "out.jb2")]
    output: PathBuf,

    /// Classifier match threshold (0.0 - 1.0)
    #[clap(short, long, value_parser)]
    threshold: Option<f32>,

    /// Symbol coding that reproduces every page exactly
    #[clap(long)]
    lossless: bool,

    /// Generic region coding only, no symbol dictionaries
    #[clap(long, conflicts_with = "lossless")]
    generic: bool,

    /// Write PDF fragments: page stream(s) plus a .sym globals stream
    #[clap(long)]
    pdf: bool,

    /// Resolution written to the page information segments
    #[clap(long, value_parser, default_value_t = 300)]
    dpi: u32,

    /// Text region strip height as a power of two (0 - 3)
    #[clap(long, value_parser, default_value_t = 0)]
    log_strips: u8,

    /// Enable typical prediction in generic regions
    #[clap(long)]
    tpgdon: bool,

    /// Fall back to generic coding beyond this many symbols
    #[clap(long, value_parser)]
    max_symbols: Option<usize>,

    /// Log more (repeat for trace level)
    #[clap(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    let mut builder = Builder::from_env(Env::new().default_filter_or("warn"));
    builder.filter_module("jbig2enc_core", level);
    builder.filter_module("jbig2", level);
    builder.init();
}

fn build_config(args: &Args) -> Jbig2Config {
    let mut config = if args.generic {
        Jbig2Config::generic_only()
    } else if args.lossless {
        Jbig2Config::lossless()
    } else {
        Jbig2Config::default()
    };
    if let Some(threshold) = args.threshold {
        config.classifier.threshold = threshold;
    }
    config.classifier.max_symbols = args.max_symbols;
    config.generic.tpgdon = args.tpgdon;
    config.dpi = args.dpi;
    config.log_strips = args.log_strips;
    config.want_full_headers = !args.pdf;
    config
}

/// `out.jb2` for a single page, `out.0001.jb2`, `out.0002.jb2`, ...
/// otherwise.
fn page_path(output: &Path, index: usize, count: usize) -> PathBuf {
    if count == 1 {
        return output.to_path_buf();
    }
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".into());
    let ext = output
        .extension()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "jb2".into());
    output.with_file_name(format!("{}.{:04}.{}", stem, index + 1, ext))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);
    info!("{} ({})", get_version(), get_build_info());

    let config = build_config(&args);
    let mut encoder = Jbig2Encoder::new(&config).context("invalid encoder settings")?;

    for input in &args.inputs {
        let image =
            load_pbm(input).with_context(|| format!("failed to read {}", input.display()))?;
        info!(
            "{}: {}x{} pixels",
            input.display(),
            image.width,
            image.height
        );
        encoder
            .add_page(&image)
            .with_context(|| format!("failed to encode {}", input.display()))?;
    }

    if args.pdf {
        let result = encoder.flush_pdf()?;
        if result.pages.is_empty() {
            bail!("no pages were encoded");
        }
        if let Some(globals) = &result.global_data {
            let sym_path = args.output.with_extension("sym");
            fs::write(&sym_path, globals)
                .with_context(|| format!("failed to write {}", sym_path.display()))?;
            info!("wrote {} bytes of globals to {}", globals.len(), sym_path.display());
        }
        let count = result.pages.len();
        for (i, page) in result.pages.iter().enumerate() {
            let path = page_path(&args.output, i, count);
            fs::write(&path, page).with_context(|| format!("failed to write {}", path.display()))?;
            info!("wrote {} bytes to {}", page.len(), path.display());
        }
    } else {
        let data = encoder.flush()?;
        fs::write(&args.output, &data)
            .with_context(|| format!("failed to write {}", args.output.display()))?;
        info!("wrote {} bytes to {}", data.len(), args.output.display());
    }
    Ok(())
}
