use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

const MANIFEST_ENTRY: &str = "manifest.json";
const DB_FILE: &str = "gradebook.sqlite3";
const DB_ENTRY: &str = "db/gradebook.sqlite3";
const ZIP_MAGIC: [u8; 4] = [0x50, 0x4B, 0x03, 0x04];
pub const BUNDLE_FORMAT_V1: &str = "gradebook-workspace-v1";
pub const RAW_SQLITE_FORMAT: &str = "raw-sqlite3";

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Manifest {
    format: String,
    #[serde(default)]
    schema_version: i64,
    #[serde(default)]
    app_version: String,
    #[serde(default)]
    exported_at: String,
    db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ExportSummary {
    pub bundle_format: String,
    pub entry_count: usize,
    pub db_sha256: String,
}

#[derive(Debug, Clone)]
pub struct ImportSummary {
    pub bundle_format_detected: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn display(path: &Path) -> std::borrow::Cow<'_, str> {
    path.to_string_lossy()
}

/// Zips the workspace database with a manifest recording its checksum.
pub fn export_workspace_bundle(
    workspace_path: &Path,
    out_path: &Path,
    schema_version: i64,
) -> anyhow::Result<ExportSummary> {
    let db_path = workspace_path.join(DB_FILE);
    if !db_path.is_file() {
        bail!("workspace database not found: {}", display(&db_path));
    }
    let db_bytes =
        std::fs::read(&db_path).with_context(|| format!("reading {}", display(&db_path)))?;

    let manifest = Manifest {
        format: BUNDLE_FORMAT_V1.to_string(),
        schema_version,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        exported_at: chrono::Utc::now().to_rfc3339(),
        db_sha256: sha256_hex(&db_bytes),
    };
    let manifest_json =
        serde_json::to_vec_pretty(&manifest).context("serializing bundle manifest")?;

    if let Some(parent) = out_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", display(parent)))?;
    }
    let out_file =
        File::create(out_path).with_context(|| format!("creating {}", display(out_path)))?;

    let mut zip = ZipWriter::new(out_file);
    let opts = FileOptions::default().compression_method(CompressionMethod::Deflated);
    let entries: [(&str, &[u8]); 2] = [(MANIFEST_ENTRY, &manifest_json), (DB_ENTRY, &db_bytes)];
    for (name, bytes) in entries {
        zip.start_file(name, opts)
            .with_context(|| format!("starting bundle entry {}", name))?;
        zip.write_all(bytes)
            .with_context(|| format!("writing bundle entry {}", name))?;
    }
    zip.finish().context("finalizing bundle")?;

    Ok(ExportSummary {
        bundle_format: manifest.format,
        entry_count: entries.len(),
        db_sha256: manifest.db_sha256,
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> anyhow::Result<Vec<u8>> {
    let mut entry = archive
        .by_name(name)
        .with_context(|| format!("bundle is missing {}", name))?;
    let mut bytes = Vec::new();
    entry
        .read_to_end(&mut bytes)
        .with_context(|| format!("extracting {}", name))?;
    Ok(bytes)
}

/// Returns the database bytes after checking the manifest against them.
fn read_verified_db(in_path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(in_path).with_context(|| format!("opening {}", display(in_path)))?;
    let mut archive = ZipArchive::new(file).context("invalid zip archive")?;

    let manifest: Manifest = serde_json::from_slice(&read_entry(&mut archive, MANIFEST_ENTRY)?)
        .context("manifest.json is not a valid bundle manifest")?;
    if manifest.format != BUNDLE_FORMAT_V1 {
        bail!("unsupported bundle format: {}", manifest.format);
    }

    let db_bytes = read_entry(&mut archive, DB_ENTRY)?;
    let actual = sha256_hex(&db_bytes);
    if !actual.eq_ignore_ascii_case(&manifest.db_sha256) {
        bail!(
            "database checksum mismatch (manifest {}, bundle {})",
            manifest.db_sha256,
            actual
        );
    }
    Ok(db_bytes)
}

/// Writes next to the target first so a failed write never leaves a
/// half-written database in place.
fn install_db(dst: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    let staging = dst.with_extension("sqlite3.importing");
    {
        let mut out =
            File::create(&staging).with_context(|| format!("creating {}", display(&staging)))?;
        out.write_all(bytes)
            .and_then(|_| out.flush())
            .with_context(|| format!("writing {}", display(&staging)))?;
    }
    if dst.exists() {
        std::fs::remove_file(dst).with_context(|| format!("removing {}", display(dst)))?;
    }
    std::fs::rename(&staging, dst).with_context(|| format!("installing {}", display(dst)))
}

/// Replaces the workspace database with the one inside `in_path`. A file
/// that is not a zip is taken to be a bare SQLite copy.
pub fn import_workspace_bundle(
    in_path: &Path,
    workspace_path: &Path,
) -> anyhow::Result<ImportSummary> {
    std::fs::create_dir_all(workspace_path)
        .with_context(|| format!("creating {}", display(workspace_path)))?;
    let dst = workspace_path.join(DB_FILE);

    let (bytes, format) = if is_zip_file(in_path)? {
        (read_verified_db(in_path)?, BUNDLE_FORMAT_V1)
    } else {
        let raw = std::fs::read(in_path).with_context(|| format!("reading {}", display(in_path)))?;
        (raw, RAW_SQLITE_FORMAT)
    };
    install_db(&dst, &bytes)?;

    Ok(ImportSummary {
        bundle_format_detected: format.to_string(),
    })
}

fn is_zip_file(path: &Path) -> anyhow::Result<bool> {
    let mut f = File::open(path).with_context(|| format!("opening {}", display(path)))?;
    let mut sig = [0u8; 4];
    let read = f.read(&mut sig).context("reading file signature")?;
    Ok(read == sig.len() && sig == ZIP_MAGIC)
}
