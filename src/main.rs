//! Command-line front-end for packing and inspecting `.lottie` archives.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use dotlottie::cli::{Command, PackArgs};
use dotlottie::io::LocalFileReader;
use dotlottie::zip::ZipExtractor;
use dotlottie::{
    ArchiveSource, Cli, Loader, LoaderConfig, PackRequest, Packager, PackagerConfig, ThemeKey,
    TracingObserver, Transport,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli);

    let _ = rustls::crypto::aws_lc_rs::default_provider().install_default();

    let transport = Arc::new(Transport::default());
    match &cli.command {
        Command::Pack(args) => pack(args, transport.clone()).await?,
        Command::List { archive, long } => list(archive, *long).await?,
        Command::Load { source, theme } => {
            load(&cli, source, theme.as_deref(), transport.clone()).await?
        }
    }

    let transferred = transport.http().transferred_bytes();
    if transferred > 0 && !cli.quiet {
        eprintln!("Total bytes transferred: {}", format_size(transferred));
    }
    Ok(())
}

fn init_logging(cli: &Cli) {
    let default_level = if cli.verbose {
        "info"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    let filter =
        EnvFilter::try_from_env("DOTLOTTIE_LOG").unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn pack(args: &PackArgs, transport: Arc<Transport>) -> Result<()> {
    let packager = Packager::new(
        PackagerConfig::default()
            .with_fetcher(transport)
            .with_observer(Arc::new(TracingObserver)),
    );

    let mut request = PackRequest::new(&args.source, &args.destination).with_options(args.options());
    request.themes = args.themes.clone();

    let archive = packager
        .pack(&request)
        .await
        .with_context(|| format!("failed to pack {}", args.source))?;
    println!("{}", archive.display());
    Ok(())
}

async fn list(archive: &Path, long: bool) -> Result<()> {
    let reader = Arc::new(
        LocalFileReader::new(archive)
            .with_context(|| format!("cannot open {}", archive.display()))?,
    );
    let entries = ZipExtractor::new(reader).list_files().await?;

    if long {
        println!("{:>10}  {:>10}  {:>5}  Name", "Length", "Size", "Cmpr");
        println!("{}", "-".repeat(48));
    }

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;
    for entry in entries.iter().filter(|e| !e.is_directory) {
        if long {
            println!(
                "{:>10}  {:>10}  {}  {}",
                entry.uncompressed_size,
                entry.compressed_size,
                ratio(entry.compressed_size, entry.uncompressed_size),
                entry.file_name
            );
            total_uncompressed = total_uncompressed.saturating_add(entry.uncompressed_size);
            total_compressed = total_compressed.saturating_add(entry.compressed_size);
            file_count += 1;
        } else {
            println!("{}", entry.file_name);
        }
    }

    if long {
        println!("{}", "-".repeat(48));
        println!(
            "{:>10}  {:>10}  {}  {} files",
            total_uncompressed,
            total_compressed,
            ratio(total_compressed, total_uncompressed),
            file_count
        );
    }
    Ok(())
}

async fn load(cli: &Cli, source: &str, theme: Option<&str>, transport: Arc<Transport>) -> Result<()> {
    let source = if source.contains("://") {
        ArchiveSource::url(source)?
    } else {
        ArchiveSource::file(source)
    };

    let mut config = LoaderConfig::default()
        .with_fetcher(transport)
        .with_observer(Arc::new(TracingObserver));
    if let Some(dir) = &cli.work_dir {
        config = config.with_working_dir(dir);
    }

    let handle = Loader::new(config)
        .load(&source)
        .await
        .with_context(|| format!("failed to load {}", source.cache_key()))?;

    if let Some(theme) = theme {
        println!("{}", handle.animation_path(theme).display());
        return Ok(());
    }

    for animation in handle.animations() {
        println!("{}\t{}", animation.id(), animation.path.display());
    }
    for key in handle.theme_keys() {
        println!("{key}\t{}", handle.animation_path(key).display());
    }
    if !handle.theme_keys().any(|k| k.as_str() == ThemeKey::LIGHT) {
        println!(
            "{}\t{}",
            ThemeKey::LIGHT,
            handle.default_animation_path().display()
        );
    }
    for image in handle.images() {
        println!("image\t{}", image.display());
    }
    Ok(())
}

/// Share of bytes saved by compression, as the `unzip -v` column.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 {
        let kept = u128::from(compressed) * 100 / u128::from(uncompressed);
        format!("{:>4}%", 100u128.saturating_sub(kept))
    } else {
        "  0%".to_string()
    }
}

fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{size} bytes")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratio_handles_hostile_sizes() {
        assert_eq!(ratio(25, 100), "  75%");
        assert_eq!(ratio(u64::MAX, 10), "   0%");
        assert_eq!(ratio(u64::MAX, u64::MAX), "   0%");
        assert_eq!(ratio(7, 0), "  0%");
    }
}
