//! End-to-end runs over small scan collections.
//!
//! Every test uses image-mode folders (loose JPEGs) and a scripted text
//! backend, so no pdfium library and no API key is needed.

use async_trait::async_trait;
use baroque::pipeline::extract::PageExtractor;
use baroque::pipeline::llm::{Completion, ModelTier, TextRequest};
use baroque::{
    import_output_tree, run_with, write_and_compile, BackendError, DigitiseError,
    DocumentCompiler, ErrorPolicy, Operation, PageError, PageKey, PageOutcome, PayloadFormat,
    PayloadStrictness, PipelineConfig, PipelineProgressCallback, TextBackend, TextService,
};
use image::{DynamicImage, RgbImage};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

// ── Fixtures ─────────────────────────────────────────────────────────────

/// Answers every request with a fixed text per operation and counts calls.
#[derive(Default)]
struct CountingBackend {
    calls: AtomicUsize,
    ops: Mutex<Vec<Operation>>,
}

impl CountingBackend {
    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextBackend for CountingBackend {
    fn name(&self) -> &str {
        "counting"
    }

    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Tagged
    }

    async fn complete(
        &self,
        _tier: ModelTier,
        request: &TextRequest,
    ) -> Result<Completion, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.ops.lock().unwrap().push(request.operation);
        let text = match request.operation {
            Operation::Transcribe => "Le vent souffle du nord.",
            Operation::Translate => "The wind blows from the north.",
            Operation::Format => "\\textit{Le vent}",
            Operation::Analyse => "\\section{Voyage}",
        };
        Ok(Completion::complete(format!(
            "Reading the hand.</thinking>\n<output>{text}</output>"
        )))
    }
}

/// Fails every transcription permanently.
struct RejectingBackend;

#[async_trait]
impl TextBackend for RejectingBackend {
    fn name(&self) -> &str {
        "rejecting"
    }

    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Tagged
    }

    async fn complete(
        &self,
        _tier: ModelTier,
        _request: &TextRequest,
    ) -> Result<Completion, BackendError> {
        Err(BackendError::Permanent("401 invalid x-api-key".into()))
    }
}

struct Collection {
    _tmp: TempDir,
    input: PathBuf,
    output: PathBuf,
}

impl Collection {
    fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let input = tmp.path().join("input_data");
        let output = tmp.path().join("raw-output");
        fs::create_dir_all(&input).unwrap();
        Self {
            _tmp: tmp,
            input,
            output,
        }
    }

    fn folder(&self, name: &str) -> PathBuf {
        let dir = self.input.join(name);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn out(&self, rel: &str) -> PathBuf {
        self.output.join(rel)
    }

    fn config(&self) -> baroque::PipelineConfigBuilder {
        PipelineConfig::builder()
            .input_root(&self.input)
            .output_root(&self.output)
            .retry_delay_ms(0)
            .max_attempts(2)
    }
}

fn write_scan(dir: &Path, name: &str, shade: u8) {
    let img = RgbImage::from_fn(60, 90, |x, y| {
        image::Rgb([shade, (x * 4) as u8, (y * 2) as u8])
    });
    DynamicImage::ImageRgb8(img).save(dir.join(name)).unwrap();
}

/// Three scans whose natural order differs from their byte order.
fn three_scans(c: &Collection, folder: &str) {
    let dir = c.folder(folder);
    write_scan(&dir, "scan 1.jpg", 10);
    write_scan(&dir, "scan 10.jpg", 90);
    write_scan(&dir, "scan 2.jpg", 50);
}

fn service(backend: Arc<dyn TextBackend>) -> TextService {
    TextService::new(backend, 2, Duration::ZERO, PayloadStrictness::Lenient)
}

async fn run(
    config: &PipelineConfig,
    backend: &Arc<CountingBackend>,
) -> Result<baroque::RunReport, DigitiseError> {
    let svc = service(Arc::clone(backend) as Arc<dyn TextBackend>);
    let extractor = PageExtractor::with_pdfium(800);
    run_with(config, &svc, &extractor, &CancellationToken::new()).await
}

fn snapshot(c: &Collection, folder: &str) -> Vec<(String, Vec<u8>)> {
    let mut files = Vec::new();
    for n in ["001", "002", "003"] {
        for rel in [
            format!("{folder}/french_page_{n}.txt"),
            format!("{folder}/english_page_{n}.txt"),
            format!("{folder}/images/page_{n}.jpg"),
        ] {
            let bytes = fs::read(c.out(&rel)).unwrap();
            files.push((rel, bytes));
        }
    }
    files
}

// ── Resumability ─────────────────────────────────────────────────────────

#[tokio::test]
async fn first_run_writes_every_page_in_natural_order() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    let backend = Arc::new(CountingBackend::default());

    let report = run(&c.config().build().unwrap(), &backend).await.unwrap();

    assert_eq!(report.stats.computed, 3);
    assert_eq!(report.stats.failed, 0);
    assert!(!report.cancelled);
    // One transcription and one translation per page.
    assert_eq!(backend.calls(), 6);
    assert_eq!(
        fs::read_to_string(c.out("Journal 1/french_page_001.txt")).unwrap(),
        "Le vent souffle du nord."
    );
    assert_eq!(
        fs::read_to_string(c.out("Journal 1/english_page_003.txt")).unwrap(),
        "The wind blows from the north."
    );
    assert!(c.out("Journal 1/images/page_002.jpg").is_file());
    assert!(c.out("cache.sqlite3").is_file());
    assert!(!c.out("Journal 1/french_page_001.tex").exists());
}

#[tokio::test]
async fn second_run_makes_no_calls_and_changes_nothing() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    let config = c.config().build().unwrap();
    let backend = Arc::new(CountingBackend::default());

    run(&config, &backend).await.unwrap();
    let before = snapshot(&c, "Journal 1");
    let calls_after_first = backend.calls();

    let report = run(&config, &backend).await.unwrap();

    assert_eq!(backend.calls(), calls_after_first);
    assert_eq!(report.stats.cache_hits, 3);
    assert_eq!(report.stats.computed, 0);
    assert_eq!(snapshot(&c, "Journal 1"), before);
}

#[tokio::test]
async fn cache_hit_restores_deleted_files() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    let config = c.config().build().unwrap();
    let backend = Arc::new(CountingBackend::default());
    run(&config, &backend).await.unwrap();

    let english = c.out("Journal 1/english_page_002.txt");
    let image = c.out("Journal 1/images/page_002.jpg");
    let image_bytes = fs::read(&image).unwrap();
    fs::remove_file(&english).unwrap();
    fs::remove_file(&image).unwrap();

    let report = run(&config, &backend).await.unwrap();

    assert_eq!(report.stats.cache_hits, 3);
    assert_eq!(backend.calls(), 6);
    assert_eq!(
        fs::read_to_string(&english).unwrap(),
        "The wind blows from the north."
    );
    assert_eq!(fs::read(&image).unwrap(), image_bytes);
}

#[tokio::test]
async fn files_on_disk_count_as_done_without_a_cache() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    let backend = Arc::new(CountingBackend::default());
    run(&c.config().build().unwrap(), &backend).await.unwrap();

    // A fresh cache elsewhere: only the output files say the pages are done.
    let fresh_cache = c._tmp.path().join("other.sqlite3");
    let config = c.config().cache_path(&fresh_cache).build().unwrap();
    let report = run(&config, &backend).await.unwrap();

    assert_eq!(report.stats.filesystem_hits, 3);
    assert_eq!(report.stats.cache_hits, 0);
    assert_eq!(backend.calls(), 6);
}

#[tokio::test]
async fn overwrite_recomputes_every_page() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    let backend = Arc::new(CountingBackend::default());
    run(&c.config().build().unwrap(), &backend).await.unwrap();

    let config = c.config().overwrite(true).build().unwrap();
    let report = run(&config, &backend).await.unwrap();

    assert_eq!(report.stats.computed, 3);
    assert_eq!(report.stats.skipped(), 0);
    assert_eq!(backend.calls(), 12);
}

#[tokio::test]
async fn format_step_writes_markup_siblings() {
    let c = Collection::new();
    let dir = c.folder("Journal 1");
    write_scan(&dir, "only.jpg", 30);
    let backend = Arc::new(CountingBackend::default());

    let config = c.config().format_markup(true).build().unwrap();
    run(&config, &backend).await.unwrap();

    assert_eq!(
        *backend.ops.lock().unwrap(),
        [
            Operation::Transcribe,
            Operation::Translate,
            Operation::Format,
            Operation::Format
        ]
    );
    assert_eq!(
        fs::read_to_string(c.out("Journal 1/french_page_001.tex")).unwrap(),
        "\\textit{Le vent}"
    );
    assert!(c.out("Journal 1/english_page_001.tex").is_file());
}

// ── Structure and failures ───────────────────────────────────────────────

#[test]
fn mixed_folder_is_rejected_before_any_page() {
    tokio_test::block_on(async {
        let c = Collection::new();
        three_scans(&c, "Journal 1");
        let mixed = c.folder("Journal 2");
        write_scan(&mixed, "cover.jpg", 0);
        fs::write(mixed.join("volume.pdf"), b"%PDF-1.4").unwrap();
        let backend = Arc::new(CountingBackend::default());

        let err = run(&c.config().build().unwrap(), &backend).await.unwrap_err();

        assert!(matches!(
            err,
            DigitiseError::MixedSources { ref folder, pdfs: 1, images: 1 } if folder == "Journal 2"
        ));
        assert_eq!(backend.calls(), 0);
        assert!(!c.out("Journal 1").exists());
    });
}

#[tokio::test]
async fn unreadable_scan_is_skipped_and_keeps_its_number() {
    let c = Collection::new();
    let dir = c.folder("Journal 1");
    write_scan(&dir, "a.jpg", 10);
    fs::write(dir.join("b.jpg"), b"not a jpeg").unwrap();
    write_scan(&dir, "c.jpg", 90);
    let backend = Arc::new(CountingBackend::default());

    let config = c.config().error_policy(ErrorPolicy::Skip).build().unwrap();
    let report = run(&config, &backend).await.unwrap();

    assert_eq!(report.stats.computed, 2);
    assert_eq!(report.stats.failed, 1);
    assert_eq!(report.failures[0].key, PageKey::new("Journal 1", "b.jpg", 2));
    assert!(matches!(
        report.failures[0].error,
        PageError::ImageFailed { .. }
    ));
    assert!(!c.out("Journal 1/english_page_002.txt").exists());
    assert!(c.out("Journal 1/english_page_003.txt").is_file());
}

#[tokio::test]
async fn abort_policy_stops_at_first_failure_and_keeps_earlier_pages() {
    let c = Collection::new();
    let dir = c.folder("Journal 1");
    write_scan(&dir, "a.jpg", 10);
    fs::write(dir.join("b.jpg"), b"not a jpeg").unwrap();
    write_scan(&dir, "c.jpg", 90);
    let backend = Arc::new(CountingBackend::default());

    let err = run(&c.config().build().unwrap(), &backend).await.unwrap_err();

    assert!(matches!(err, DigitiseError::PageFailed { .. }));
    assert!(c.out("Journal 1/english_page_001.txt").is_file());
    assert!(!c.out("Journal 1/english_page_003.txt").exists());
}

#[tokio::test]
async fn permanent_backend_error_fails_the_page_without_writing() {
    let c = Collection::new();
    let dir = c.folder("Journal 1");
    write_scan(&dir, "a.jpg", 10);

    let config = c.config().error_policy(ErrorPolicy::Skip).build().unwrap();
    let svc = service(Arc::new(RejectingBackend));
    let report = run_with(
        &config,
        &svc,
        &PageExtractor::with_pdfium(800),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    assert_eq!(report.stats.failed, 1);
    assert!(matches!(
        report.failures[0].error,
        PageError::LlmFailed {
            operation: Operation::Transcribe,
            attempts: 1,
            ..
        }
    ));
    assert!(!c.out("Journal 1/french_page_001.txt").exists());
}

// ── Cancellation ─────────────────────────────────────────────────────────

/// Cancels the run as soon as the first page is persisted.
struct CancelAfterFirst {
    token: CancellationToken,
    completed: AtomicUsize,
}

impl PipelineProgressCallback for CancelAfterFirst {
    fn on_page_complete(&self, _key: &PageKey, _french_len: usize, _english_len: usize) {
        self.completed.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
    }

    fn on_page_skipped(&self, _key: &PageKey, outcome: PageOutcome) {
        assert_eq!(outcome, PageOutcome::CacheHit);
    }
}

#[tokio::test]
async fn cancellation_stops_between_pages_and_resumes() {
    let c = Collection::new();
    three_scans(&c, "Journal 1");
    three_scans(&c, "Journal 2");
    let backend = Arc::new(CountingBackend::default());
    let token = CancellationToken::new();
    let cb = Arc::new(CancelAfterFirst {
        token: token.clone(),
        completed: AtomicUsize::new(0),
    });

    let config = c
        .config()
        .progress_callback(Arc::clone(&cb) as Arc<dyn PipelineProgressCallback>)
        .build()
        .unwrap();
    let svc = service(Arc::clone(&backend) as Arc<dyn TextBackend>);
    let extractor = PageExtractor::with_pdfium(800);
    let report = run_with(&config, &svc, &extractor, &token).await.unwrap();

    assert!(report.cancelled);
    assert_eq!(report.stats.computed, 1);
    assert_eq!(cb.completed.load(Ordering::SeqCst), 1);
    assert!(c.out("Journal 1/english_page_001.txt").is_file());
    assert!(!c.out("Journal 1/english_page_002.txt").exists());
    assert!(!c.out("Journal 2").exists());

    // Resuming picks up the cached page and computes the remaining five.
    let report = run(&c.config().build().unwrap(), &backend).await.unwrap();
    assert_eq!(report.stats.cache_hits, 1);
    assert_eq!(report.stats.computed, 5);
    assert_eq!(backend.calls(), 12);
}

// ── Overwrite ────────────────────────────────────────────────────────────

/// Answers with text tagged by an edition label, so reruns are distinguishable.
struct EditionBackend(&'static str);

#[async_trait]
impl TextBackend for EditionBackend {
    fn name(&self) -> &str {
        "edition"
    }

    fn payload_format(&self) -> PayloadFormat {
        PayloadFormat::Tagged
    }

    async fn complete(
        &self,
        _tier: ModelTier,
        request: &TextRequest,
    ) -> Result<Completion, BackendError> {
        let text = match request.operation {
            Operation::Format => format!("\\textbf{{markup {}}}", self.0),
            _ => format!("text {}", self.0),
        };
        Ok(Completion::complete(format!("<output>{text}</output>")))
    }
}

struct NoCompiler;

#[async_trait]
impl DocumentCompiler for NoCompiler {
    async fn compile(&self, _tex: &Path) -> Result<(), String> {
        Ok(())
    }
}

#[tokio::test]
async fn overwrite_without_format_replaces_old_markup() {
    let c = Collection::new();
    let dir = c.folder("Journal 1");
    write_scan(&dir, "a.jpg", 10);
    let extractor = PageExtractor::with_pdfium(800);
    let token = CancellationToken::new();

    let first = c.config().format_markup(true).build().unwrap();
    let svc = service(Arc::new(EditionBackend("one")));
    run_with(&first, &svc, &extractor, &token).await.unwrap();
    assert!(c.out("Journal 1/english_page_001.tex").is_file());

    let second = c.config().overwrite(true).build().unwrap();
    let svc = service(Arc::new(EditionBackend("two")));
    let report = run_with(&second, &svc, &extractor, &token).await.unwrap();
    assert_eq!(report.stats.computed, 1);

    assert!(!c.out("Journal 1/french_page_001.tex").exists());
    assert!(!c.out("Journal 1/english_page_001.tex").exists());
    assert_eq!(
        fs::read_to_string(c.out("Journal 1/english_page_001.txt")).unwrap(),
        "text two"
    );

    let folders = import_output_tree(&c.output).unwrap();
    let tex = write_and_compile(&folders[0], &NoCompiler).await.unwrap();
    let doc = fs::read_to_string(tex).unwrap();
    assert!(doc.contains("text two"));
    assert!(!doc.contains("markup one"));
}
