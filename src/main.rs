//! epub-a11y - Accessibility metadata for EPUB publications

use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use epub_a11y::{Engine, EngineConfig, EpubVersion, MappingResolver, read_epub, write_epub};

#[derive(Parser)]
#[command(name = "epub-a11y")]
#[command(version, about = "Add accessibility metadata to EPUB publications", long_about = None)]
#[command(after_help = "EXAMPLES:
    epub-a11y book.epub fixed.epub                     Add roles, languages and metadata
    epub-a11y book.epub fixed.epub --alt-text alt.json Also write operator alt text
    epub-a11y --list-images book.epub                  Show images that need alt text

ALT TEXT FILE:
    A JSON object mapping an image reference (\"OEBPS/Text/ch1.xhtml#2\") or an
    image path (\"OEBPS/Images/map.png\") to its alt text.")]
struct Cli {
    /// Input EPUB
    #[arg(value_name = "INPUT")]
    input: String,

    /// Output EPUB
    #[arg(value_name = "OUTPUT", required_unless_present = "list_images")]
    output: Option<String>,

    /// Operator alt text, as a JSON object
    #[arg(long, value_name = "FILE")]
    alt_text: Option<String>,

    /// Apply the rules of this EPUB version (2, 3.0, 3.3) instead of the declared one
    #[arg(long, value_name = "VERSION", value_parser = parse_version)]
    target: Option<EpubVersion>,

    /// List images that need alt text without changing anything
    #[arg(long)]
    list_images: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Leave document titles alone
    #[arg(long)]
    no_titles: bool,

    /// Leave content-document language attributes alone
    #[arg(long)]
    no_content_language: bool,

    /// Do not add landmark types to their targets
    #[arg(long)]
    no_landmarks: bool,

    /// Do not add accessibility metadata to the package
    #[arg(long)]
    no_metadata: bool,

    /// Log every decision
    #[arg(short, long)]
    verbose: bool,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,
}

fn parse_version(s: &str) -> Result<EpubVersion, String> {
    s.parse()
}

fn init_logging(verbose: bool, quiet: bool) {
    let default = if verbose {
        "epub_a11y=debug"
    } else if quiet {
        "epub_a11y=error"
    } else {
        "epub_a11y=warn"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let result = if cli.list_images {
        list_images(&cli)
    } else {
        run(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn engine(cli: &Cli) -> Engine {
    let mut config = EngineConfig::default()
        .with_titles(!cli.no_titles)
        .with_content_language(!cli.no_content_language)
        .with_landmarks(!cli.no_landmarks)
        .with_accessibility_metadata(!cli.no_metadata);
    if let Some(version) = cli.target {
        config = config.with_target_version(version);
    }
    Engine::new(config)
}

fn list_images(cli: &Cli) -> Result<(), String> {
    let publication = read_epub(&cli.input).map_err(|e| e.to_string())?;
    let pending = engine(cli).pending_alt_text(&publication);

    if cli.json {
        let json = serde_json::to_string_pretty(&pending).map_err(|e| e.to_string())?;
        println!("{json}");
        return Ok(());
    }

    for request in &pending {
        match &request.suggested_text {
            Some(title) => println!("{}\t{}\t{title}", request.image.key(), request.image.image),
            None => println!("{}\t{}", request.image.key(), request.image.image),
        }
    }
    if !cli.quiet {
        eprintln!("{} images need alt text", pending.len());
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<(), String> {
    let Some(output) = &cli.output else {
        return Err("an output file is required".to_string());
    };

    let mut resolver = match &cli.alt_text {
        Some(path) => load_alt_text(path)?,
        None => MappingResolver::new(),
    };

    let mut publication = read_epub(&cli.input).map_err(|e| e.to_string())?;
    let report = engine(cli).run(&mut publication, &mut resolver);
    write_epub(&publication, output).map_err(|e| e.to_string())?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{json}");
    } else if !cli.quiet {
        print!("{report}");
        println!("Wrote {output}");
    }
    Ok(())
}

fn load_alt_text(path: &str) -> Result<MappingResolver, String> {
    let json = std::fs::read_to_string(path).map_err(|e| format!("{path}: {e}"))?;
    let texts: HashMap<String, String> =
        serde_json::from_str(&json).map_err(|e| format!("{path}: {e}"))?;
    Ok(MappingResolver::from_map(texts))
}
