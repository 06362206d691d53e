//! Title metadata extraction through `hactoolnet`.
//!
//! The tool is run with `--listtitles` and its text output is scanned for
//! the title id, version, content type and main content archive.

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;
use tracing::debug;

use crate::error::{Result, ToolError};
use crate::model::content::{ContentCategory, ContentMeta};
use crate::model::title::TitleId;

/// Interval between checks on a running extractor.
const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Anything that can read title metadata from a content package.
pub trait MetadataExtractor {
    fn extract(&self, package: &Path) -> Result<ContentMeta>;
}

/// Runs `hactoolnet -k <keys> -t pfs0 <package> --listtitles`.
#[derive(Debug, Clone)]
pub struct Hactoolnet {
    program: PathBuf,
    keys: PathBuf,
    timeout: Duration,
}

impl Hactoolnet {
    /// Both the tool and the key file must exist.
    pub fn new(program: impl Into<PathBuf>, keys: impl Into<PathBuf>, timeout: Duration) -> Result<Self> {
        let program = program.into();
        let keys = keys.into();
        for path in [&program, &keys] {
            if !path.is_file() {
                return Err(ToolError::MissingPrerequisite(path.clone()));
            }
        }
        Ok(Self {
            program,
            keys,
            timeout,
        })
    }

    /// Run the tool and return its standard output.
    fn list_titles(&self, package: &Path) -> Result<String> {
        let mut child = Command::new(&self.program)
            .arg("-k")
            .arg(&self.keys)
            .arg("-t")
            .arg("pfs0")
            .arg(package)
            .arg("--listtitles")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| ToolError::io(&self.program, e))?;

        // Drain stdout on another thread so a full pipe cannot stall the child.
        let mut stdout = child.stdout.take();
        let reader = std::thread::spawn(move || {
            let mut buf = Vec::new();
            if let Some(out) = stdout.as_mut() {
                let _ = out.read_to_end(&mut buf);
            }
            buf
        });

        let deadline = Instant::now() + self.timeout;
        let status = loop {
            match child.try_wait().map_err(|e| ToolError::io(&self.program, e))? {
                Some(status) => break status,
                None if Instant::now() >= deadline => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(ToolError::ExtractorTimeout {
                        path: package.to_path_buf(),
                        secs: self.timeout.as_secs(),
                    });
                }
                None => std::thread::sleep(POLL_INTERVAL),
            }
        };

        let output = reader.join().unwrap_or_default();
        if !status.success() {
            return Err(ToolError::Extraction {
                path: package.to_path_buf(),
                reason: format!("extractor exited with {status}"),
            });
        }
        Ok(String::from_utf8_lossy(&output).into_owned())
    }
}

impl MetadataExtractor for Hactoolnet {
    fn extract(&self, package: &Path) -> Result<ContentMeta> {
        let output = self.list_titles(package)?;
        parse_listing(&output, package)
    }
}

/// `<title id> v<version>` in the listing table.
static TITLE_VERSION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(0100[0-9A-Fa-f]{12}) v([0-9]+)\b").expect("valid regex"));

/// Main content archive inside the package.
static CONTENT_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"pfs0:/([0-9a-f]{32})\.nca").expect("valid regex"));

/// Owning application named next to add-on content.
static APPLICATION_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"title (0100[0-9A-Fa-f]{12})").expect("valid regex"));

/// Extract [`ContentMeta`] from `--listtitles` output.
///
/// `package` is only used in error messages.
pub fn parse_listing(output: &str, package: &Path) -> Result<ContentMeta> {
    let fail = |reason: &str| ToolError::Extraction {
        path: package.to_path_buf(),
        reason: reason.to_string(),
    };

    let category = if output.contains("Application") {
        ContentCategory::Application
    } else if output.contains("Patch") {
        ContentCategory::Patch
    } else if output.contains("AddOnContent") {
        ContentCategory::AddOnContent
    } else {
        return Err(fail("no content type in listing"));
    };

    let caps = TITLE_VERSION_REGEX
        .captures(output)
        .ok_or_else(|| fail("no title id in listing"))?;
    let title_id: TitleId = caps[1].parse()?;
    let version_code: u32 = caps[2]
        .parse()
        .map_err(|_| fail("version code out of range"))?;

    let content_id = CONTENT_ID_REGEX
        .captures(output)
        .map(|c| c[1].to_string());
    let application_id = APPLICATION_REGEX
        .captures(output)
        .and_then(|c| c[1].parse::<TitleId>().ok());

    if category == ContentCategory::AddOnContent && content_id.is_none() {
        return Err(fail("no content archive listed for add-on content"));
    }

    debug!(
        package = %package.display(),
        title = %title_id,
        version = version_code,
        category = ?category,
        "Parsed title listing"
    );
    Ok(ContentMeta {
        title_id,
        version_code,
        category,
        content_id,
        application_id,
    })
}
