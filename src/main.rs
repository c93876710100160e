use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dupfinder::config::{DetectorConfig, EncoderSource, FingerprintAlgorithm};
use dupfinder::core::{DuplicateReport, DuplicateResolver, FingerprintDuplicates, ImageSource};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::time::{Duration, Instant};

#[derive(Parser, Debug)]
#[command(name = "dupfinder", version, about = "Find duplicate images within or across folders")]
struct Cli {
    #[command(flatten)]
    options: Options,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Options {
    /// JSON config file (default: `<config dir>/dupfinder/config.json` if present)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Also write the report as JSON
    #[arg(long, global = true, value_name = "FILE")]
    json: Option<PathBuf>,

    /// Include subdirectories
    #[arg(long, global = true)]
    recursive: bool,

    /// Take at most this many images from each folder
    #[arg(long, global = true, value_name = "N")]
    max_images: Option<usize>,

    /// Fingerprint algorithm
    #[arg(long, global = true, value_enum)]
    algorithm: Option<FingerprintAlgorithm>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Find images with identical fingerprints inside one folder
    Scan {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
    },

    /// Find duplicates between two folders
    Compare {
        /// First folder
        #[arg(short, long, value_name = "DIR")]
        left: PathBuf,
        /// Second folder
        #[arg(short, long, value_name = "DIR")]
        right: PathBuf,
        /// Also match by encoder feature distance
        #[arg(long)]
        features: bool,
        /// Encoder weights (`.npy` projection matrix); implies --features
        #[arg(long, value_name = "FILE")]
        weights: Option<PathBuf>,
        /// Feature distance threshold (strict)
        #[arg(long, value_name = "DIST")]
        threshold: Option<f64>,
        /// Skip the feature pass for images already grouped by fingerprint
        #[arg(long)]
        skip_exact: bool,
    },
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let mut config = load_config(&cli.options)?;

    let report = match cli.command {
        Commands::Scan { path } => {
            let resolver = DuplicateResolver::fingerprint_only(&config)?;
            let source = ImageSource::open(&path, &config.source)?;

            println!(
                "▶ Scanning for duplicates in: {} ({:?} hash)",
                path.display(),
                resolver.algorithm()
            );
            let report = benchmark("fingerprinting", || {
                with_spinner("Hashing images…", || resolver.within(&source))
            })?;
            print_report(&report);
            report
        }

        Commands::Compare {
            left,
            right,
            features,
            weights,
            threshold,
            skip_exact,
        } => {
            if features || weights.is_some() {
                config.features.enabled = true;
            }
            if let Some(path) = weights {
                config.features.encoder = EncoderSource::Weights { path };
            }
            if let Some(threshold) = threshold {
                config.features.threshold = threshold;
            }
            if skip_exact {
                config.features.skip_exact_matches = true;
            }

            let resolver = DuplicateResolver::new(&config)?;
            let left_source = ImageSource::open(&left, &config.source)?;
            let right_source = ImageSource::open(&right, &config.source)?;

            println!(
                "▶ Comparing {} with {} ({:?} hash)",
                left.display(),
                right.display(),
                resolver.algorithm()
            );
            let message = if resolver.features_enabled() {
                "Hashing and encoding images…"
            } else {
                "Hashing images…"
            };
            let report = benchmark("comparing folders", || {
                with_spinner(message, || resolver.across(&left_source, &right_source))
            })??;
            print_report(&report);
            report
        }
    };

    if let Some(path) = cli.options.json {
        report
            .write_json(&path)
            .with_context(|| format!("Failed to write report to {:?}", path))?;
        println!("\n✅ Report written to {}", path.display());
    }

    Ok(())
}

/// Config file (explicit or default location), then CLI overrides.
fn load_config(options: &Options) -> Result<DetectorConfig> {
    let mut config = match &options.config {
        Some(path) => DetectorConfig::load(path)
            .with_context(|| format!("Failed to load config {:?}", path))?,
        None => match DetectorConfig::default_location().filter(|p| p.is_file()) {
            Some(path) => {
                log::info!("Using config {}", path.display());
                DetectorConfig::load(&path)
                    .with_context(|| format!("Failed to load config {:?}", path))?
            }
            None => DetectorConfig::default(),
        },
    };

    if options.recursive {
        config.source.recursive = true;
    }
    if let Some(max) = options.max_images {
        config.source.max_images = Some(max);
    }
    if let Some(algorithm) = options.algorithm {
        config.fingerprint.algorithm = algorithm;
    }
    Ok(config)
}

fn print_report(report: &DuplicateReport) {
    match &report.fingerprint_duplicates {
        FingerprintDuplicates::Within(groups) => {
            if groups.is_empty() {
                println!("No duplicates found.");
            } else {
                println!("Found {} duplicate group(s):", groups.len());
                for (i, group) in groups.iter().enumerate() {
                    println!(" Group {} (hash {}):", i + 1, group.fingerprint);
                    for id in &group.members {
                        println!("   ▶ {}", id);
                    }
                }
            }
        }
        FingerprintDuplicates::Across(groups) => {
            if groups.is_empty() {
                println!("No identical images across folders.");
            } else {
                println!("Found {} identical group(s) across folders:", groups.len());
                for (i, group) in groups.iter().enumerate() {
                    println!(" Group {} (hash {}):", i + 1, group.fingerprint);
                    for id in &group.left {
                        println!("   ▶ {} (left)", id);
                    }
                    for id in &group.right {
                        println!("   ▶ {} (right)", id);
                    }
                }
            }
        }
    }

    if !report.feature_duplicates.is_empty() {
        println!("\n✨ Feature matches:");
        for pair in &report.feature_duplicates {
            println!(
                "   {} ≈ {} (distance {:.4})",
                pair.left, pair.right, pair.distance
            );
        }
    }

    if !report.issues.is_empty() {
        eprintln!("\n⚠️  Skipped {} image(s):", report.issues.len());
        for issue in &report.issues {
            eprintln!("   {}", issue);
        }
    }
}

/// Show a spinner with `message` while `f()` runs.
fn with_spinner<T, F: FnOnce() -> T>(message: &'static str, f: F) -> Result<T> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::with_template("{spinner:.green} {msg}")?);
    spinner.set_message(message);
    spinner.enable_steady_tick(Duration::from_millis(100));
    let result = f();
    spinner.finish_and_clear();
    Ok(result)
}

/// Run `f()`, print how long it took (with `label`), and return its result.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    println!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}
