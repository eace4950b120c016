//! Image ingestion: dropped, pasted and picked files into image nodes.
//!
//! A gesture is split in two halves. [`Editor::begin_ingest`] runs
//! synchronously, validates each candidate file, reserves the insertion
//! anchor and hands back one [`IngestJob`] per accepted file. Jobs do the
//! slow part (reading, compression, upload) without touching the document,
//! and their [`IngestOutcome`]s are applied one at a time with
//! [`Editor::complete_ingest`], in whatever order they finish.

use std::collections::BTreeMap;
use std::future::Future;
use std::io;

use bytes::Bytes;
use n0_future::{FuturesUnordered, StreamExt};
use presswork_common::AssetMode;
use presswork_media::{
    Dimensions, ImageCodec, MediaPipeline, ObjectStore, probe_dimensions, sniff_image_type,
};

use crate::document::{Document, NodeRef, Operation, Transaction};
use crate::editor::{BatchState, Editor};
use crate::error::{IngestError, ValidationError};
use crate::node::{AssetRef, Block, ImageNode};
use crate::platform::NotifyKind;

/// A file offered by a drop, paste or picker gesture.
///
/// Name, declared type and declared length are available without reading
/// the contents, so files can be rejected up front.
pub trait IncomingFile {
    fn name(&self) -> &str;
    /// MIME type reported by the platform.
    fn declared_type(&self) -> &str;
    fn declared_len(&self) -> u64;
    fn read(self) -> impl Future<Output = io::Result<Bytes>> + Send;
}

/// A file whose bytes are already in memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryFile {
    name: String,
    declared_type: String,
    bytes: Bytes,
}

impl MemoryFile {
    pub fn new(
        name: impl Into<String>,
        declared_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into(),
            bytes: bytes.into(),
        }
    }
}

impl IncomingFile for MemoryFile {
    fn name(&self) -> &str {
        &self.name
    }

    fn declared_type(&self) -> &str {
        &self.declared_type
    }

    fn declared_len(&self) -> u64 {
        self.bytes.len() as u64
    }

    async fn read(self) -> io::Result<Bytes> {
        Ok(self.bytes)
    }
}

/// Where a gesture came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestSource {
    /// Files dropped at a gap between blocks.
    Drop { gap: usize },
    /// Clipboard contents, inserted at the selection. Any plain text in the
    /// clipboard goes in as paragraphs after the images.
    Paste { text: Option<String> },
    /// The file picker, inserted at the selection.
    Picker,
}

/// Identifies the files of one gesture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BatchId(pub u64);

/// What happens to an accepted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Embed the original bytes as a data URL.
    Embed,
    /// Compress and upload.
    Upload,
}

/// One accepted file, ready to run.
#[derive(Debug, Clone)]
pub struct IngestJob<F> {
    pub batch: BatchId,
    /// Position of the file within its gesture.
    pub ordinal: usize,
    pub name: String,
    pub disposition: Disposition,
    pub file: F,
}

/// A node ready to insert.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestedImage {
    pub node: ImageNode,
    /// Pixel size of the asset the node points at.
    pub natural: Option<Dimensions>,
}

/// A finished job.
#[derive(Debug)]
pub struct IngestOutcome {
    pub batch: BatchId,
    pub ordinal: usize,
    pub name: String,
    pub result: Result<IngestedImage, IngestError>,
}

impl<F: IncomingFile> IngestJob<F> {
    /// Read, and compress and upload if needed. Never touches the document.
    ///
    /// Compression is CPU-bound and runs inline when the future is polled.
    /// A job owns its file and borrows only the pipeline, so hosts that want
    /// compressions to run in parallel can move jobs to worker threads and
    /// hand the outcomes back to [`Editor::complete_ingest`].
    pub async fn run<S: ObjectStore, C: ImageCodec>(
        self,
        pipeline: &MediaPipeline<S, C>,
    ) -> IngestOutcome {
        let IngestJob {
            batch,
            ordinal,
            name,
            disposition,
            file,
        } = self;
        let result = fetch(file, &name, disposition, pipeline).await;
        IngestOutcome {
            batch,
            ordinal,
            name,
            result,
        }
    }
}

async fn fetch<F: IncomingFile, S: ObjectStore, C: ImageCodec>(
    file: F,
    name: &str,
    disposition: Disposition,
    pipeline: &MediaPipeline<S, C>,
) -> Result<IngestedImage, IngestError> {
    let declared_type = file.declared_type().to_string();
    let declared_len = file.declared_len();
    let bytes = file.read().await.map_err(IngestError::unexpected)?;

    match disposition {
        Disposition::Embed => {
            // The declared type is only a hint; embedded bytes must really be
            // an image.
            let mime = sniff_image_type(&bytes).ok_or_else(|| ValidationError::NotAnImage {
                name: name.to_string(),
                declared_type,
            })?;
            let natural = probe_dimensions(&bytes);
            let mut node = ImageNode::new(AssetRef::embedded(mime, bytes));
            if let Some(size) = natural {
                node = node.with_size(size.width, size.height);
            }
            Ok(IngestedImage { node, natural })
        }
        Disposition::Upload => {
            let published = pipeline.publish(&bytes, declared_len).await?;
            tracing::debug!(name, locator = %published.record.locator, "image uploaded");
            let size = published.dimensions;
            let node = ImageNode::new(AssetRef::Stored(published.record.locator))
                .with_size(size.width, size.height);
            Ok(IngestedImage {
                node,
                natural: Some(size),
            })
        }
    }
}

impl Editor {
    /// Validate a gesture's files and reserve its insertion anchor.
    ///
    /// Rejected files are reported through the notifier and produce no job.
    /// When editing is not permitted the gesture is ignored entirely.
    pub fn begin_ingest<F: IncomingFile>(
        &mut self,
        source: IngestSource,
        files: Vec<F>,
    ) -> Vec<IngestJob<F>> {
        if !self.is_editable() {
            tracing::debug!(?source, "ingest ignored, editing not permitted");
            return Vec::new();
        }

        let anchor = match &source {
            IngestSource::Drop { gap } => (*gap).min(self.document().len()),
            IngestSource::Paste { .. } | IngestSource::Picker => self.insertion_gap(),
        };
        if let IngestSource::Paste { text: Some(text) } = &source {
            self.insert_pasted_text(anchor, text);
        }

        let batch = BatchId(self.next_batch);
        self.next_batch += 1;

        let mut jobs = Vec::new();
        for (ordinal, file) in files.into_iter().enumerate() {
            match self.validate(&file) {
                Ok(disposition) => jobs.push(IngestJob {
                    batch,
                    ordinal,
                    name: file.name().to_string(),
                    disposition,
                    file,
                }),
                Err(err) => {
                    tracing::warn!(%err, "rejected file");
                    self.notify(NotifyKind::Error, &err.to_string());
                }
            }
        }

        if !jobs.is_empty() {
            tracing::debug!(?batch, anchor, files = jobs.len(), "ingest dispatched");
            self.batches.insert(
                batch,
                BatchState {
                    anchor,
                    anchor_revision: self.document().revision(),
                    placed: BTreeMap::new(),
                    pending: jobs.len(),
                },
            );
        }
        jobs
    }

    /// Pasted text lands at the anchor. The anchor is taken again afterwards
    /// at the same gap, so images go in front of the text.
    fn insert_pasted_text(&mut self, anchor: usize, text: &str) {
        let blocks: Vec<Block> = text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(Block::paragraph)
            .collect();
        if blocks.is_empty() {
            return;
        }
        let txn = Transaction::new().with(Operation::ReplaceRange {
            range: anchor..anchor,
            blocks,
        });
        if let Err(err) = self.apply(txn) {
            tracing::warn!(%err, "pasted text not inserted");
        }
    }

    fn validate(&self, file: &impl IncomingFile) -> Result<Disposition, ValidationError> {
        let declared_type = file.declared_type();
        if !declared_type
            .trim()
            .to_ascii_lowercase()
            .starts_with("image/")
        {
            return Err(ValidationError::NotAnImage {
                name: file.name().to_string(),
                declared_type: declared_type.to_string(),
            });
        }
        let len = file.declared_len();
        let too_large = |limit| ValidationError::TooLarge {
            name: file.name().to_string(),
            len,
            limit,
        };
        if len > self.config.max_input_bytes {
            return Err(too_large(self.config.max_input_bytes));
        }

        let fits_inline = len <= self.config.inline_max_bytes;
        match self.config.mode {
            AssetMode::Upload => Ok(Disposition::Upload),
            AssetMode::Inline if fits_inline => Ok(Disposition::Embed),
            AssetMode::Inline => Err(too_large(self.config.inline_max_bytes)),
            AssetMode::Auto if fits_inline => Ok(Disposition::Embed),
            AssetMode::Auto => Ok(Disposition::Upload),
        }
    }

    /// Apply a finished job as one transaction.
    ///
    /// Returns the inserted node. Completions for a closed editor or an
    /// unknown batch are dropped.
    pub fn complete_ingest(&mut self, outcome: IngestOutcome) -> Option<NodeRef> {
        if self.is_closed() {
            tracing::debug!(name = %outcome.name, "editor closed, dropping ingest result");
            return None;
        }
        let Some(state) = self.batches.get_mut(&outcome.batch) else {
            tracing::debug!(batch = ?outcome.batch, "unknown batch, dropping ingest result");
            return None;
        };
        state.pending = state.pending.saturating_sub(1);
        let finished = state.pending == 0;

        let inserted = match outcome.result {
            Ok(image) => self.place(outcome.batch, outcome.ordinal, image),
            Err(err) => {
                tracing::warn!(name = %outcome.name, %err, "image ingest failed");
                self.notify(NotifyKind::Error, &err.to_string());
                None
            }
        };

        if finished {
            self.batches.remove(&outcome.batch);
        }
        inserted
    }

    fn place(&mut self, batch: BatchId, ordinal: usize, image: IngestedImage) -> Option<NodeRef> {
        let gap = {
            let state = self.batches.get(&batch)?;
            placement_gap(self.document(), state, ordinal)
        };
        let IngestedImage { node, natural } = image;
        if let (Some(natural), Some(locator)) = (natural, node.src.locator()) {
            self.natural_sizes.insert(locator.clone(), natural);
        }

        match self.apply(Transaction::new().insert_node(gap, Block::Image(node))) {
            Ok(applied) => {
                let node = NodeRef::new(vec![gap], applied.revision);
                if let Some(state) = self.batches.get_mut(&batch) {
                    state.placed.insert(ordinal, node.clone());
                }
                tracing::debug!(?batch, ordinal, gap, "image inserted");
                Some(node)
            }
            Err(err) => {
                let err = IngestError::unexpected(err);
                tracing::warn!(%err, "image insert failed");
                self.notify(NotifyKind::Error, &err.to_string());
                None
            }
        }
    }

    /// Run a whole gesture: validate, run every job concurrently and insert
    /// each image as soon as it is ready. Returns the inserted nodes in
    /// completion order.
    ///
    /// All jobs are polled on the calling task, so uploads overlap but
    /// compressions run one after another. Drive [`Editor::begin_ingest`]
    /// and [`IngestJob::run`] directly to spread compression over threads.
    pub async fn ingest_files<F, S, C>(
        &mut self,
        source: IngestSource,
        files: Vec<F>,
        pipeline: &MediaPipeline<S, C>,
    ) -> Vec<NodeRef>
    where
        F: IncomingFile,
        S: ObjectStore,
        C: ImageCodec,
    {
        let jobs = self.begin_ingest(source, files);
        let pending: FuturesUnordered<_> = jobs.into_iter().map(|job| job.run(pipeline)).collect();
        n0_future::pin!(pending);

        let mut inserted = Vec::new();
        while let Some(outcome) = pending.next().await {
            if let Some(node) = self.complete_ingest(outcome) {
                inserted.push(node);
            }
        }
        inserted
    }
}

/// Right after the nearest earlier sibling already placed, else right
/// before the nearest later one, else at the reserved anchor.
fn placement_gap(doc: &Document, state: &BatchState, ordinal: usize) -> usize {
    let resolve = |node: &NodeRef| doc.resolve(node).ok().map(|path| path[0]);
    state
        .placed
        .range(..ordinal)
        .rev()
        .find_map(|(_, node)| resolve(node))
        .map(|index| index + 1)
        .or_else(|| {
            state
                .placed
                .range(ordinal + 1..)
                .find_map(|(_, node)| resolve(node))
        })
        .or_else(|| doc.map_gap(state.anchor, state.anchor_revision))
        .unwrap_or(doc.len())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::Arc;

    use bytes::Bytes;
    use image::{ImageFormat, RgbImage};
    use presswork_common::{CompressionConfig, IngestConfig};
    use presswork_media::{
        AssetResolver, CompressionEngine, JpegCodec, MemoryStore, StoreError,
    };
    use url::Url;

    use super::*;
    use crate::platform::tests::RecordingNotifier;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        });
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn png_file(name: &str, width: u32, height: u32) -> MemoryFile {
        MemoryFile::new(name, "image/png", png(width, height))
    }

    fn pipeline<S: ObjectStore>(store: S) -> MediaPipeline<S> {
        MediaPipeline::new(
            CompressionEngine::new(JpegCodec::default(), CompressionConfig::default()),
            AssetResolver::new(store, Url::parse("https://cdn.example.com/img/").unwrap()),
        )
    }

    fn config(mode: AssetMode) -> IngestConfig {
        IngestConfig {
            mode,
            ..IngestConfig::default()
        }
    }

    fn editor(mode: AssetMode) -> (Editor, RecordingNotifier) {
        let notifier = RecordingNotifier::default();
        let editor = Editor::from_markup("<p>one</p><p>two</p>")
            .with_config(config(mode))
            .with_notifier(notifier.clone());
        (editor, notifier)
    }

    fn image_widths(editor: &Editor) -> Vec<u32> {
        editor
            .document()
            .images()
            .into_iter()
            .filter_map(|(_, image)| image.width)
            .collect()
    }

    struct DownStore;

    impl ObjectStore for DownStore {
        async fn put_new(&self, _: &str, _: Bytes, _: &str) -> Result<(), StoreError> {
            Err(StoreError::unavailable("bucket offline"))
        }
    }

    #[test]
    fn test_non_image_drop_is_rejected() {
        let (mut editor, notifier) = editor(AssetMode::Upload);
        let before = editor.to_markup();

        let jobs = editor.begin_ingest(
            IngestSource::Drop { gap: 1 },
            vec![MemoryFile::new("notes.txt", "text/plain", &b"hello"[..])],
        );

        assert!(jobs.is_empty());
        assert_eq!(editor.to_markup(), before);
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].0, NotifyKind::Error);
        assert!(messages[0].1.contains("notes.txt"), "{messages:?}");
    }

    #[test]
    fn test_oversized_file_rejected_before_reading() {
        let (editor, notifier) = editor(AssetMode::Upload);
        let mut editor = editor.with_config(IngestConfig {
            max_input_bytes: 16,
            ..config(AssetMode::Upload)
        });

        let jobs = editor.begin_ingest(IngestSource::Picker, vec![png_file("big.png", 8, 8)]);

        assert!(jobs.is_empty());
        assert_eq!(notifier.kinds(), vec![NotifyKind::Error]);
    }

    #[test]
    fn test_inline_mode_refuses_what_it_cannot_embed() {
        let (editor, notifier) = editor(AssetMode::Inline);
        let mut editor = editor.with_config(IngestConfig {
            inline_max_bytes: 16,
            ..config(AssetMode::Inline)
        });
        let jobs = editor.begin_ingest(IngestSource::Picker, vec![png_file("a.png", 8, 8)]);
        assert!(jobs.is_empty());
        assert_eq!(notifier.kinds(), vec![NotifyKind::Error]);
    }

    #[test]
    fn test_auto_mode_splits_by_size() {
        let (editor, _) = editor(AssetMode::Auto);
        let small = png_file("small.png", 4, 4);
        let limit = small.declared_len();
        let mut editor = editor.with_config(IngestConfig {
            inline_max_bytes: limit,
            ..config(AssetMode::Auto)
        });

        let jobs = editor.begin_ingest(
            IngestSource::Picker,
            vec![small, png_file("large.png", 64, 64)],
        );
        let dispositions: Vec<_> = jobs.iter().map(|job| job.disposition).collect();
        assert_eq!(dispositions, vec![Disposition::Embed, Disposition::Upload]);
    }

    #[test]
    fn test_gesture_ignored_without_permission() {
        let (mut editor, notifier) = editor(AssetMode::Upload);
        editor.set_editing_permitted(false);
        let jobs = editor.begin_ingest(
            IngestSource::Drop { gap: 0 },
            vec![png_file("a.png", 8, 8), MemoryFile::new("b.txt", "text/plain", "b")],
        );
        assert!(jobs.is_empty());
        assert!(notifier.messages().is_empty());
        assert_eq!(editor.document().revision(), 0);
    }

    #[tokio::test]
    async fn test_paste_keeps_clipboard_order_whatever_finishes_first() {
        let (mut editor, _) = editor(AssetMode::Inline);
        editor.set_cursor(1);
        let pipeline = pipeline(MemoryStore::new());

        let files = (1..=4)
            .map(|i| png_file(&format!("{i}.png"), i * 10, 10))
            .collect();
        let jobs = editor.begin_ingest(IngestSource::Paste { text: None }, files);
        let mut outcomes = Vec::new();
        for job in jobs {
            outcomes.push(job.run(&pipeline).await);
        }

        // Someone types at the top while the images are in flight.
        editor
            .apply(Transaction::new().insert_node(0, Block::paragraph("zero")))
            .unwrap();

        for index in [2, 0, 3, 1] {
            let outcome = outcomes.remove(outcomes.iter().position(|o| o.ordinal == index).unwrap());
            assert!(editor.complete_ingest(outcome).is_some());
        }

        assert_eq!(image_widths(&editor), vec![10, 20, 30, 40]);
        let kinds: Vec<_> = editor.document().blocks().iter().map(Block::kind).collect();
        use crate::node::NodeKind::*;
        assert_eq!(kinds, vec![Paragraph, Paragraph, Image, Image, Image, Image, Paragraph]);
        assert!(editor.batches.is_empty());
    }

    #[test]
    fn test_jobs_can_run_on_worker_threads() {
        let (mut editor, _) = editor(AssetMode::Upload);
        let pipeline = pipeline(MemoryStore::new());
        let files = (1..=3)
            .map(|i| png_file(&format!("{i}.png"), 100 * i, 50))
            .collect();
        let jobs = editor.begin_ingest(IngestSource::Drop { gap: 1 }, files);

        let mut outcomes: Vec<IngestOutcome> = std::thread::scope(|scope| {
            let workers: Vec<_> = jobs
                .into_iter()
                .map(|job| {
                    let pipeline = &pipeline;
                    scope.spawn(move || {
                        tokio::runtime::Builder::new_current_thread()
                            .build()
                            .unwrap()
                            .block_on(job.run(pipeline))
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).collect()
        });

        outcomes.reverse();
        for outcome in outcomes {
            assert!(editor.complete_ingest(outcome).is_some());
        }
        assert_eq!(image_widths(&editor), vec![100, 200, 300]);
        assert_eq!(pipeline.resolver().store().len(), 3);
    }

    #[tokio::test]
    async fn test_pasted_text_follows_images() {
        let (mut editor, _) = editor(AssetMode::Inline);
        editor.set_cursor(2);
        let pipeline = pipeline(MemoryStore::new());

        let inserted = editor
            .ingest_files(
                IngestSource::Paste {
                    text: Some("first line\n\nsecond line".to_string()),
                },
                vec![png_file("a.png", 12, 10)],
                &pipeline,
            )
            .await;

        assert_eq!(inserted.len(), 1);
        let texts: Vec<_> = editor
            .document()
            .blocks()
            .iter()
            .map(Block::plain_text)
            .collect();
        assert_eq!(texts, vec!["one", "two", "", "first line", "second line"]);
        assert!(editor.document().blocks()[2].as_image().is_some());
    }

    #[tokio::test]
    async fn test_upload_mode_stores_and_links() {
        let (mut editor, notifier) = editor(AssetMode::Upload);
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(store.clone());

        let inserted = editor
            .ingest_files(
                IngestSource::Drop { gap: 2 },
                vec![png_file("photo.png", 1200, 900)],
                &pipeline,
            )
            .await;

        assert_eq!(inserted.len(), 1);
        assert_eq!(store.len(), 1);
        assert!(notifier.messages().is_empty());
        let image = editor.document().image(&inserted[0]).unwrap().clone();
        assert_eq!(image.size(), Some(Dimensions::new(1000, 750)));
        let locator = image.src.locator().unwrap();
        assert!(locator.as_str().starts_with("https://cdn.example.com/img/"));
        assert!(locator.as_str().ends_with(".jpg"));

        // The upload's pixel size is remembered for reset.
        editor
            .set_image_size(&inserted[0], 300, 0, true)
            .unwrap();
        let node = editor.document().node_ref(&[2]).unwrap();
        assert_eq!(
            editor.reset_to_natural_size(&node, &()),
            Ok(Dimensions::new(1000, 750))
        );
    }

    #[tokio::test]
    async fn test_upload_failure_inserts_nothing() {
        let (mut editor, notifier) = editor(AssetMode::Upload);
        let before = editor.to_markup();
        let pipeline = pipeline(DownStore);

        let inserted = editor
            .ingest_files(
                IngestSource::Picker,
                vec![png_file("a.png", 32, 32)],
                &pipeline,
            )
            .await;

        assert!(inserted.is_empty());
        assert_eq!(editor.to_markup(), before);
        let messages = notifier.messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0], (NotifyKind::Error, "storage unavailable".to_string()));
    }

    #[tokio::test]
    async fn test_one_failure_does_not_block_the_rest() {
        let (mut editor, notifier) = editor(AssetMode::Inline);
        let pipeline = pipeline(MemoryStore::new());

        let inserted = editor
            .ingest_files(
                IngestSource::Drop { gap: 0 },
                vec![
                    png_file("a.png", 20, 10),
                    MemoryFile::new("fake.png", "image/png", &b"not really a png"[..]),
                    png_file("c.png", 40, 10),
                ],
                &pipeline,
            )
            .await;

        assert_eq!(inserted.len(), 2);
        assert_eq!(image_widths(&editor), vec![20, 40]);
        assert_eq!(notifier.kinds(), vec![NotifyKind::Error]);
    }

    #[tokio::test]
    async fn test_completions_after_close_are_dropped() {
        let (mut editor, _) = editor(AssetMode::Inline);
        let pipeline = pipeline(MemoryStore::new());
        let jobs = editor.begin_ingest(IngestSource::Picker, vec![png_file("a.png", 8, 8)]);
        let mut outcomes = Vec::new();
        for job in jobs {
            outcomes.push(job.run(&pipeline).await);
        }

        editor.close();
        for outcome in outcomes {
            assert_eq!(editor.complete_ingest(outcome), None);
        }
        assert!(editor.document().images().is_empty());
    }
}
