//! Update-availability report (`updates.csv`).

use std::io::Write;
use std::path::{Path, PathBuf};

use crate::export::versions::VersionDirectory;
use crate::model::content::{ContentCategory, ContentMeta};

/// Header row of the report.
pub const HEADER: &str =
    "Filename, Title ID, Version Code, Latest Version Code, Latest Updated Date, Update Available";

/// Write one row per update package to `output_path`.
///
/// Returns the number of rows written. Packages whose application is not in
/// the version directory get empty latest-version columns and `None`.
pub fn export_updates_csv(
    packages: &[(PathBuf, ContentMeta)],
    versions: &VersionDirectory,
    output_path: &Path,
) -> anyhow::Result<usize> {
    let mut file = std::fs::File::create(output_path)?;
    writeln!(file, "{HEADER}")?;

    let mut rows = 0;
    for (path, meta) in packages {
        if meta.category != ContentCategory::Patch {
            continue;
        }
        writeln!(file, "{}", update_row(path, meta, versions))?;
        rows += 1;
    }
    file.flush()?;
    Ok(rows)
}

fn update_row(path: &Path, meta: &ContentMeta, versions: &VersionDirectory) -> String {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let (latest_code, latest_date, available) =
        match versions.latest(meta.owning_application()) {
            Some(latest) => (
                latest.version_code.to_string(),
                latest.release_date,
                (latest.version_code != meta.version_code).to_string(),
            ),
            None => {
                tracing::warn!(file = %filename, "No version data for update");
                (String::new(), String::new(), "None".to_string())
            }
        };

    format!(
        "{}, {}, {}, {}, {}, {}",
        quote(&filename),
        meta.title_id,
        meta.version_code,
        latest_code,
        csv_escape(&latest_date),
        available
    )
}

/// Always quote (RFC 4180 quote doubling).
fn quote(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

/// Escape a value for CSV (RFC 4180).
///
/// Wraps in double quotes if the value contains commas, quotes, or newlines.
fn csv_escape(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') || value.contains('\r') {
        quote(value)
    } else {
        value.to_string()
    }
}
