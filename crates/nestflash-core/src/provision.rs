//! Firmware cache provisioning
//!
//! Downloads the mode-keyed firmware bundle and unpacks it into the
//! cache directory. A boot stage image younger than the freshness
//! threshold marks the whole cache valid for the request, so a failed
//! flash can be retried without re-fetching a multi-megabyte archive.
//!
//! Freshness is judged by file modification time rather than content
//! hashing; the bundles ship no checksum manifest.

use crate::error::FlashError;
use crate::firmware::{FirmwareRequest, FlashMode};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime};

/// Cache entries younger than this skip the download entirely
pub const FRESHNESS_THRESHOLD: Duration = Duration::from_secs(3600);

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);
/// Bundles are a few MiB; allow a slow link
const FETCH_TIMEOUT: Duration = Duration::from_secs(300);

const RELEASE_BASE: &str =
    "https://github.com/codykociemba/NoLongerEvil-Thermostat/releases/download/v1.0.0";

/// Where the mode-keyed firmware bundles live
#[derive(Debug, Clone)]
pub struct ArchiveSource {
    pub standard_url: String,
    pub local_only_url: String,
}

impl ArchiveSource {
    pub fn url_for(&self, mode: FlashMode) -> &str {
        match mode {
            FlashMode::Standard => &self.standard_url,
            FlashMode::LocalOnly => &self.local_only_url,
        }
    }
}

impl Default for ArchiveSource {
    fn default() -> Self {
        Self {
            standard_url: format!("{}/firmware-files.zip", RELEASE_BASE),
            local_only_url: format!("{}/firmware-local-only.zip", RELEASE_BASE),
        }
    }
}

/// Network seam: fetches a bundle URL into `dest`
pub trait ArchiveFetcher: Send {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FlashError>;
}

/// ureq-backed fetcher used in production
pub struct HttpFetcher {
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new() -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(CONNECT_TIMEOUT)
            .timeout(FETCH_TIMEOUT)
            .build();
        Self { agent }
    }
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ArchiveFetcher for HttpFetcher {
    fn fetch(&self, url: &str, dest: &Path) -> Result<(), FlashError> {
        let response = self
            .agent
            .get(url)
            .call()
            .map_err(|e| FlashError::Download(e.to_string()))?;

        let mut reader = response.into_reader();
        let mut file = File::create(dest).map_err(|e| FlashError::Download(e.to_string()))?;
        let mut buffer = [0u8; 8192];
        loop {
            let n = reader
                .read(&mut buffer)
                .map_err(|e| FlashError::Download(e.to_string()))?;
            if n == 0 {
                break;
            }
            file.write_all(&buffer[..n])
                .map_err(|e| FlashError::Download(e.to_string()))?;
        }
        Ok(())
    }
}

/// Ensures the cache under a base directory can satisfy a request
pub struct Provisioner {
    source: ArchiveSource,
    fetcher: Box<dyn ArchiveFetcher>,
    freshness: Duration,
}

impl Provisioner {
    pub fn new(source: ArchiveSource) -> Self {
        Self::with_fetcher(source, Box::new(HttpFetcher::new()))
    }

    /// Substitute the network seam (tests use a recording fake)
    pub fn with_fetcher(source: ArchiveSource, fetcher: Box<dyn ArchiveFetcher>) -> Self {
        Self {
            source,
            fetcher,
            freshness: FRESHNESS_THRESHOLD,
        }
    }

    /// Override the freshness threshold
    pub fn with_freshness(mut self, freshness: Duration) -> Self {
        self.freshness = freshness;
        self
    }

    /// Ensure the firmware files for `request` are present under
    /// `base_dir`, downloading and extracting the bundle unless the
    /// cache is fresh.
    ///
    /// A fresh boot stage image validates the cache for the entire
    /// request. Progress is reported through `log`; failures are
    /// terminal for the attempt.
    pub fn ensure(
        &self,
        base_dir: &Path,
        request: FirmwareRequest,
        log: &mut dyn FnMut(String),
    ) -> Result<(), FlashError> {
        let boot_stage = base_dir.join(request.boot_stage_name());
        if is_fresh(&boot_stage, self.freshness) {
            log::debug!("cache fresh at {}, skipping download", boot_stage.display());
            log("Using existing firmware files (recently downloaded)".to_string());
            return Ok(());
        }

        let url = self.source.url_for(request.mode);
        std::fs::create_dir_all(base_dir).map_err(|e| FlashError::Download(e.to_string()))?;

        log(format!("Downloading firmware from {}...", url));
        let scratch = tempfile::Builder::new()
            .suffix(".zip")
            .tempfile()
            .map_err(|e| FlashError::Download(e.to_string()))?;
        self.fetcher.fetch(url, scratch.path())?;

        log("Download complete, extracting...".to_string());
        extract_archive(scratch.path(), base_dir)?;
        log("Firmware extracted successfully".to_string());
        Ok(())
    }
}

/// Whether `path` exists and was modified within `threshold`
fn is_fresh(path: &Path, threshold: Duration) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < threshold,
        // mtime in the future counts as fresh
        Err(_) => true,
    }
}

/// Unpack every archive entry into `dest`, overwriting stale copies
fn extract_archive(archive: &Path, dest: &Path) -> Result<(), FlashError> {
    let file = File::open(archive).map_err(|e| FlashError::Extraction(e.to_string()))?;
    let mut zip = zip::ZipArchive::new(file).map_err(|e| FlashError::Extraction(e.to_string()))?;

    for i in 0..zip.len() {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| FlashError::Extraction(e.to_string()))?;
        let Some(name) = entry.enclosed_name() else {
            return Err(FlashError::Extraction(format!(
                "unsafe path in archive: {}",
                entry.name()
            )));
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path)
                .map_err(|e| FlashError::Extraction(e.to_string()))?;
            continue;
        }
        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| FlashError::Extraction(e.to_string()))?;
        }
        let mut out = File::create(&out_path).map_err(|e| FlashError::Extraction(e.to_string()))?;
        std::io::copy(&mut entry, &mut out).map_err(|e| FlashError::Extraction(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::firmware::Generation;
    use std::io::Write as _;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Fetcher that counts calls and writes a prepared archive
    struct FakeFetcher {
        calls: Arc<AtomicUsize>,
        payload: Vec<u8>,
    }

    impl FakeFetcher {
        fn new(payload: Vec<u8>) -> (Self, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    calls: calls.clone(),
                    payload,
                },
                calls,
            )
        }
    }

    impl ArchiveFetcher for FakeFetcher {
        fn fetch(&self, _url: &str, dest: &Path) -> Result<(), FlashError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            std::fs::write(dest, &self.payload).map_err(|e| FlashError::Download(e.to_string()))
        }
    }

    /// Fetcher that always fails with a network error
    struct FailingFetcher;

    impl ArchiveFetcher for FailingFetcher {
        fn fetch(&self, url: &str, _dest: &Path) -> Result<(), FlashError> {
            Err(FlashError::Download(format!("connection refused: {}", url)))
        }
    }

    fn zip_with(entries: &[(&str, &[u8])]) -> Vec<u8> {
        let mut buf = std::io::Cursor::new(Vec::new());
        {
            let mut writer = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default();
            for (name, data) in entries {
                writer.start_file(*name, options).unwrap();
                writer.write_all(data).unwrap();
            }
            writer.finish().unwrap();
        }
        buf.into_inner()
    }

    fn standard_gen2() -> FirmwareRequest {
        FirmwareRequest {
            mode: FlashMode::Standard,
            generation: Generation::Gen2,
        }
    }

    fn local_only_gen1() -> FirmwareRequest {
        FirmwareRequest {
            mode: FlashMode::LocalOnly,
            generation: Generation::Gen1,
        }
    }

    fn provisioner_with(payload: Vec<u8>) -> (Provisioner, Arc<AtomicUsize>) {
        let (fetcher, calls) = FakeFetcher::new(payload);
        (
            Provisioner::with_fetcher(ArchiveSource::default(), Box::new(fetcher)),
            calls,
        )
    }

    #[test]
    fn test_fresh_cache_skips_download() {
        let dir = tempfile::tempdir().unwrap();
        // Just written, so well within the threshold
        std::fs::write(dir.path().join("x-load-gen2.bin"), b"boot").unwrap();

        let (provisioner, calls) = provisioner_with(Vec::new());
        provisioner
            .ensure(dir.path(), standard_gen2(), &mut |_| {})
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stale_cache_downloads_once() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("x-load-gen2.bin"), b"boot").unwrap();

        let payload = zip_with(&[("x-load-gen2.bin", b"fresh boot")]);
        let (provisioner, calls) = provisioner_with(payload);
        // Zero threshold makes any existing file stale
        let provisioner = provisioner.with_freshness(Duration::ZERO);

        provisioner
            .ensure(dir.path(), standard_gen2(), &mut |_| {})
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            std::fs::read(dir.path().join("x-load-gen2.bin")).unwrap(),
            b"fresh boot"
        );
    }

    #[test]
    fn test_empty_cache_downloads_and_extracts() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().join("firmware");

        let payload = zip_with(&[
            ("x-load-gen1-simple.bin", b"xload".as_slice()),
            ("u-boot-simple.bin", b"uboot".as_slice()),
            ("uImage-simple", b"kernel".as_slice()),
        ]);
        let (provisioner, calls) = provisioner_with(payload);

        provisioner
            .ensure(&base, local_only_gen1(), &mut |_| {})
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(base.join("x-load-gen1-simple.bin").is_file());
        assert!(base.join("u-boot-simple.bin").is_file());
        assert!(base.join("uImage-simple").is_file());

        // Second run sees the fresh boot stage and stays offline
        provisioner
            .ensure(&base, local_only_gen1(), &mut |_| {})
            .unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_extraction_overwrites_stale_copies() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("uImage"), b"old kernel").unwrap();

        let payload = zip_with(&[("uImage", b"new kernel".as_slice())]);
        let (provisioner, _) = provisioner_with(payload);
        let provisioner = provisioner.with_freshness(Duration::ZERO);

        provisioner
            .ensure(dir.path(), standard_gen2(), &mut |_| {})
            .unwrap();
        assert_eq!(
            std::fs::read(dir.path().join("uImage")).unwrap(),
            b"new kernel"
        );
    }

    #[test]
    fn test_network_failure_is_download_error() {
        let dir = tempfile::tempdir().unwrap();
        let provisioner =
            Provisioner::with_fetcher(ArchiveSource::default(), Box::new(FailingFetcher));

        let err = provisioner
            .ensure(dir.path(), standard_gen2(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, FlashError::Download(_)));
    }

    #[test]
    fn test_corrupt_archive_is_extraction_error() {
        let dir = tempfile::tempdir().unwrap();
        let (provisioner, _) = provisioner_with(b"this is not a zip".to_vec());

        let err = provisioner
            .ensure(dir.path(), standard_gen2(), &mut |_| {})
            .unwrap_err();
        assert!(matches!(err, FlashError::Extraction(_)));
    }

    #[test]
    fn test_mode_keyed_urls() {
        let source = ArchiveSource::default();
        assert!(source.url_for(FlashMode::Standard).ends_with("firmware-files.zip"));
        assert!(source
            .url_for(FlashMode::LocalOnly)
            .ends_with("firmware-local-only.zip"));
    }
}
