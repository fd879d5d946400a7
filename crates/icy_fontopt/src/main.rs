mod options;

pub use options::*;

use std::{
    fs,
    path::{Path, PathBuf},
    time::Instant,
};

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use flexi_logger::{Cleanup, Criterion, FileSpec, Logger, LoggerHandle, Naming};
use icy_rlefont::{
    AcceptPolicy, GlyphStore, RleFont, assemble_font, encode_font, get_encoded_size, import_psf, init_dictionary, optimize,
};

pub type FontOptResult<T> = anyhow::Result<T>;

#[derive(Parser, Debug)]
#[command(version, about = "Compresses bitmap fonts for microcontroller firmware", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Import a PSF font into a new glyph store
    Import {
        psf: PathBuf,
        store: PathBuf,

        /// Font name, defaults to the file stem
        #[arg(long)]
        name: Option<String>,

        /// Start with an empty dictionary
        #[arg(long, default_value_t = false)]
        no_init: bool,
    },

    /// Run optimization sessions, saving the store after each one
    Optimize {
        store: PathBuf,

        /// Number of sessions, 0 runs until interrupted
        #[arg(long)]
        limit: Option<usize>,

        /// Passes per session
        #[arg(long)]
        passes: Option<usize>,

        /// Only keep edits that shrink the font
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// Print the encoded size and dictionary usage
    Size { store: PathBuf },

    /// Assemble the binary font object
    Export { store: PathBuf, output: PathBuf },

    /// Assemble the font and check every glyph decodes to its bitmap
    Verify { store: PathBuf },
}

fn start_logger() -> Option<LoggerHandle> {
    let builder = match Logger::try_with_env_or_str("info") {
        Ok(builder) => builder,
        Err(err) => {
            eprintln!("Failed to initialize logging: {err}");
            return None;
        }
    };
    let result = if let Some(log_dir) = Options::get_log_dir() {
        builder
            .log_to_file(FileSpec::default().directory(&log_dir).basename("icy_fontopt").suffix("log").suppress_timestamp())
            .rotate(Criterion::Size(64 * 1024), Naming::Numbers, Cleanup::KeepLogFiles(3))
            .create_symlink(log_dir.join("icy_fontopt.log"))
            // progress is reported at info level
            .duplicate_to_stderr(flexi_logger::Duplicate::Info)
            .start()
    } else {
        eprintln!("Failed to create log file");
        builder.log_to_stderr().start()
    };
    match result {
        Ok(handle) => Some(handle),
        Err(err) => {
            eprintln!("Failed to start logger: {err}");
            None
        }
    }
}

fn main() {
    let args = Args::parse();
    let _logger = start_logger();
    let options = Options::load_options();

    if let Err(err) = run(args.command, options) {
        log::error!("{err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command, mut options: Options) -> FontOptResult<()> {
    match command {
        Command::Import { psf, store, name, no_init } => {
            let name = name.unwrap_or_else(|| psf.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_default());
            let data = fs::read(&psf).with_context(|| format!("reading {}", psf.display()))?;
            let mut glyphs = import_psf(&data, &name)?;
            if !no_init {
                init_dictionary(&mut glyphs)?;
            }
            glyphs.save_file(&store)?;
            log::info!("Done: {} unique glyphs, {} bytes encoded", glyphs.glyph_count(), get_encoded_size(&glyphs));
        }

        Command::Optimize { store, limit, passes, strict } => {
            if let Some(passes) = passes {
                options.optimizer.passes_per_session = passes;
            }
            if strict {
                options.optimizer.acceptance = AcceptPolicy::StrictImprovement;
            }
            let limit = limit.unwrap_or(options.session_limit);
            optimize_loop(&store, &options, limit)?;
        }

        Command::Size { store } => {
            let glyphs = load_store(&store)?;
            let encoded = encode_font(&glyphs);
            println!("Glyphs:     {}", glyphs.glyph_count());
            println!("RLE dict:   {}", encoded.dictionary.rle_count());
            println!("Ref dict:   {}", encoded.dictionary.ref_count());
            println!("Encoded:    {} bytes", encoded.encoded_size());
            let font = assemble_font(&glyphs, &options.partition)?;
            println!("Font data:  {} bytes in {} ranges", font.data_size(), font.char_ranges.len());
        }

        Command::Export { store, output } => {
            let glyphs = load_store(&store)?;
            let font = assemble_font(&glyphs, &options.partition)?;
            let bytes = font.to_bytes()?;
            fs::write(&output, &bytes).with_context(|| format!("writing {}", output.display()))?;
            log::info!("Wrote {} bytes to {}", bytes.len(), output.display());
        }

        Command::Verify { store } => {
            let glyphs = load_store(&store)?;
            let font = assemble_font(&glyphs, &options.partition)?;
            let font = RleFont::read(&font.to_bytes()?)?;
            let mut failures = 0;
            for (code, index) in glyphs.char_to_glyph() {
                let expected = glyphs.glyph(index);
                match font.glyph_pixels(code)? {
                    Some(decoded) if decoded.pixels == expected.data && decoded.width == expected.width => {}
                    _ => {
                        log::warn!("Glyph for {code:#06x} does not decode to its bitmap");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                bail!("{failures} glyphs failed to verify");
            }
            log::info!("All {} characters verified", glyphs.char_to_glyph().len());
        }
    }
    Ok(())
}

fn load_store(path: &Path) -> FontOptResult<GlyphStore> {
    GlyphStore::load_file(path).with_context(|| format!("loading {}", path.display()))
}

fn optimize_loop(path: &Path, options: &Options, limit: usize) -> FontOptResult<()> {
    let mut glyphs = load_store(path)?;
    let old_size = get_encoded_size(&glyphs);
    log::info!("Original size is {old_size} bytes");

    let start = Instant::now();
    let mut iteration = 0;
    while limit == 0 || iteration < limit {
        let report = optimize(&mut glyphs, &options.optimizer);
        glyphs.save_file(path)?;
        iteration += 1;

        let saved = old_size.saturating_sub(report.size_after) as u64;
        let bytes_per_min = saved * 60 / (start.elapsed().as_secs() + 1);
        log::info!(
            "iteration {iteration}, size {} bytes, speed {bytes_per_min} B/min",
            report.size_after
        );
    }
    Ok(())
}
