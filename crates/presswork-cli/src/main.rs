use std::path::{Path, PathBuf};

use bytes::Bytes;
use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use presswork_common::{PressworkConfig, PressworkError};
use presswork_common::telemetry::{self, TelemetryConfig};
use presswork_editor_core::{
    AssetRef, Editor, ImageNode, IngestSource, MemoryFile, NodeRef, Notifier, NotifyKind,
    Operation, Transaction,
};
use presswork_media::{
    AssetResolver, CompressionEngine, FsStore, HttpStore, JpegCodec, MediaPipeline, NameGenerator,
    ObjectStore, StoreError, extension_for, sniff_image_type,
};

#[derive(Parser)]
#[command(version, about = "Presswork - article image tooling", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to a .kdl or .json config file
    #[arg(long, global = true, env = "PRESSWORK_CONFIG")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compress an image under the configured byte ceiling
    Compress {
        input: PathBuf,

        /// Output file (defaults to the input name with the codec's extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compress and upload images, printing their public locators
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Move an article's embedded images to the asset store
    Recompress {
        article: PathBuf,

        /// Where to write the updated article (stdout if omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rewrite an article in canonical markup
    Normalize {
        article: PathBuf,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Insert images into an article through the ingest pipeline
    InsertImage {
        article: PathBuf,

        #[arg(required = true)]
        images: Vec<PathBuf>,

        /// Gap between top-level blocks to insert at (end of article if omitted)
        #[arg(long)]
        at: Option<usize>,

        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_miette()?;

    let cli = Cli::parse();

    let mut telemetry_config = TelemetryConfig::from_env("presswork");
    if cli.verbose {
        telemetry_config = telemetry_config.with_level(tracing::Level::DEBUG);
    }
    telemetry::init(telemetry_config);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compress { input, output } => compress(&config, input, output).await?,
        Commands::Upload { files } => upload(&config, files).await?,
        Commands::Recompress { article, output } => recompress(&config, article, output).await?,
        Commands::Normalize { article, output } => {
            let markup = read_article(&article).await?;
            let editor = Editor::from_markup(&markup);
            write_article(output.as_deref(), &editor.to_markup()).await?;
        }
        Commands::InsertImage {
            article,
            images,
            at,
            output,
        } => insert_images(&config, article, images, at, output).await?,
    }

    Ok(())
}

/// File named on the command line, else the user config file if present,
/// else defaults. `PRESSWORK_*` variables override either.
fn load_config(path: Option<&Path>) -> Result<PressworkConfig, PressworkError> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(|| default_config_path().filter(|p| p.exists()));
    let mut config = match &path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "loading config");
            PressworkConfig::load(path)?
        }
        None => PressworkConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    Ok(config)
}

fn default_config_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("presswork").join("config.kdl"))
}

/// The configured asset store: the HTTP bucket API when an endpoint is set,
/// otherwise a local directory.
enum Store {
    Fs(FsStore),
    Http(HttpStore),
}

impl ObjectStore for Store {
    async fn put_new(&self, name: &str, bytes: Bytes, content_type: &str) -> Result<(), StoreError> {
        match self {
            Store::Fs(store) => store.put_new(name, bytes, content_type).await,
            Store::Http(store) => store.put_new(name, bytes, content_type).await,
        }
    }
}

fn build_pipeline(config: &PressworkConfig) -> Result<MediaPipeline<Store>> {
    let storage = &config.storage;
    let store = match &storage.endpoint {
        Some(endpoint) => Store::Http(HttpStore::new(
            endpoint.as_str(),
            storage.bucket.as_str(),
            storage.api_key.clone(),
        )),
        None => {
            let dir = storage
                .store_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from("assets"));
            Store::Fs(FsStore::new(dir))
        }
    };

    let mut resolver = AssetResolver::new(store, storage.public_base_url()?);
    if let Some(namespace) = &storage.namespace {
        resolver = resolver.with_names(NameGenerator::with_namespace(namespace));
    }
    let engine = CompressionEngine::new(JpegCodec::default(), config.compression.clone());
    Ok(MediaPipeline::new(engine, resolver))
}

async fn compress(config: &PressworkConfig, input: PathBuf, output: Option<PathBuf>) -> Result<()> {
    let bytes = read_file(&input).await?;
    let engine = CompressionEngine::new(JpegCodec::default(), config.compression.clone());

    let compressed = engine.compress(&bytes, bytes.len() as u64)?;
    let output =
        output.unwrap_or_else(|| input.with_extension(extension_for(compressed.content_type)));
    tokio::fs::write(&output, &compressed.bytes)
        .await
        .map_err(|e| PressworkError::write(&output, e))?;

    println!(
        "✓ {} → {} ({} → {} bytes, {}x{} at quality {:.2}, {} attempt(s))",
        input.display(),
        output.display(),
        bytes.len(),
        compressed.bytes.len(),
        compressed.dimensions.width,
        compressed.dimensions.height,
        compressed.quality,
        compressed.attempts,
    );
    Ok(())
}

async fn upload(config: &PressworkConfig, files: Vec<PathBuf>) -> Result<()> {
    let pipeline = build_pipeline(config)?;

    let mut inputs = Vec::with_capacity(files.len());
    for path in files {
        let bytes = read_file(&path).await?;
        inputs.push((path, bytes));
    }

    let results = n0_future::join_all(
        inputs
            .iter()
            .map(|(_, bytes)| pipeline.publish(bytes, bytes.len() as u64)),
    )
    .await;

    let mut failed = 0;
    for ((path, _), result) in inputs.iter().zip(results) {
        match result {
            Ok(published) => println!("✓ {} → {}", path.display(), published.record.locator),
            Err(err) => {
                failed += 1;
                eprintln!("⚠ {}: {:?}", path.display(), miette::Report::new(err));
            }
        }
    }
    if failed > 0 {
        return Err(miette::miette!("{failed} upload(s) failed"));
    }
    Ok(())
}

async fn recompress(
    config: &PressworkConfig,
    article: PathBuf,
    output: Option<PathBuf>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let markup = read_article(&article).await?;
    let mut editor = Editor::from_markup(&markup);

    let targets: Vec<(NodeRef, ImageNode, Bytes)> = editor
        .document()
        .images()
        .into_iter()
        .filter_map(|(path, image)| match &image.src {
            AssetRef::Embedded { bytes, .. } => Some((
                editor.document().node_ref(&path)?,
                image.clone(),
                bytes.clone(),
            )),
            AssetRef::Stored(_) => None,
        })
        .collect();
    if targets.is_empty() {
        eprintln!("No embedded images in {}", article.display());
        write_article(output.as_deref(), &markup).await?;
        return Ok(());
    }
    eprintln!("→ Uploading {} embedded image(s)...", targets.len());

    let results = n0_future::join_all(
        targets
            .iter()
            .map(|(_, _, bytes)| pipeline.publish(bytes, bytes.len() as u64)),
    )
    .await;

    let mut txn = Transaction::new();
    for ((node, image, _), result) in targets.into_iter().zip(results) {
        match result {
            Ok(published) => {
                let size = published.dimensions;
                let attrs = ImageNode {
                    src: AssetRef::Stored(published.record.locator),
                    width: image.width.or(Some(size.width)),
                    height: image.height.or(Some(size.height)),
                    alt: image.alt,
                };
                txn.push(Operation::SetNodeAttributes { node, attrs });
            }
            Err(err) => eprintln!("⚠ kept embedded image: {:?}", miette::Report::new(err)),
        }
    }
    let moved = txn.ops().len();
    editor.apply(txn)?;

    write_article(output.as_deref(), &editor.to_markup()).await?;
    eprintln!("✓ Moved {moved} image(s) to the asset store");
    Ok(())
}

/// Reports editor notifications on stderr.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Success => eprintln!("✓ {message}"),
            NotifyKind::Info => eprintln!("→ {message}"),
            NotifyKind::Error => eprintln!("⚠ {message}"),
        }
    }
}

async fn insert_images(
    config: &PressworkConfig,
    article: PathBuf,
    images: Vec<PathBuf>,
    at: Option<usize>,
    output: Option<PathBuf>,
) -> Result<()> {
    let pipeline = build_pipeline(config)?;
    let markup = read_article(&article).await?;
    let mut editor = Editor::from_markup(&markup)
        .with_config(config.ingest.clone())
        .with_notifier(ConsoleNotifier);

    let mut files = Vec::with_capacity(images.len());
    for path in images {
        let bytes = read_file(&path).await?;
        // Stand in for the type a browser would report for the file.
        let declared_type = sniff_image_type(&bytes).unwrap_or("application/octet-stream");
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        files.push(MemoryFile::new(name, declared_type, bytes));
    }
    let count = files.len();

    let source = match at {
        Some(gap) => IngestSource::Drop { gap },
        None => IngestSource::Picker,
    };
    let inserted = editor.ingest_files(source, files, &pipeline).await;

    write_article(output.as_deref(), &editor.to_markup()).await?;
    eprintln!("✓ Inserted {} of {count} image(s)", inserted.len());
    if inserted.len() < count {
        return Err(miette::miette!("{} image(s) were not inserted", count - inserted.len()));
    }
    Ok(())
}

async fn read_file(path: &Path) -> Result<Vec<u8>, PressworkError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| PressworkError::read(path, e))
}

async fn read_article(path: &Path) -> Result<String, PressworkError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| PressworkError::read(path, e))
}

async fn write_article(output: Option<&Path>, markup: &str) -> Result<(), PressworkError> {
    match output {
        Some(path) => {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| PressworkError::write(parent, e))?;
            }
            tokio::fs::write(path, markup)
                .await
                .map_err(|e| PressworkError::write(path, e))
        }
        None => {
            println!("{markup}");
            Ok(())
        }
    }
}

fn init_miette() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .with_cause_chain()
                .color(true)
                .context_lines(5)
                .tab_width(2)
                .break_words(true)
                .build(),
        )
    }))
    .into_diagnostic()?;
    miette::set_panic_hook();
    Ok(())
}
