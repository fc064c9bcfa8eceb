// Tar packaging for model and module artifacts.
//
// Archives are built so that every entry is relative to the artifact root.
// The service unpacks them under its own root, so no absolute prefix or
// enclosing directory may leak into entry names.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};

use tar::{Archive, Builder};
use tracing::debug;

use crate::error::{Error, IoContext, Result};
use crate::hash::sha256_file;

/// Pack `src` (a directory or a single file) into a tar at `dst` and return
/// the SHA-256 digest of the finished archive.
pub fn create_archive(src: &Path, dst: &Path) -> Result<String> {
    // `my/model/` and `my/model` must produce the same archive
    let src: PathBuf = src.components().collect();
    debug!(src = %src.display(), dst = %dst.display(), "creating tar archive");

    let file = File::create(dst)
        .io_context(|| format!("create archive {}", dst.display()))?;
    // the archive may be written inside `src` and must not pack itself
    let output = fs::canonicalize(dst)
        .io_context(|| format!("resolve archive path {}", dst.display()))?;
    let mut builder = Builder::new(BufWriter::new(file));
    builder.follow_symlinks(false);

    if src.is_dir() {
        builder
            .append_dir(".", &src)
            .io_context(|| format!("archive directory {}", src.display()))?;
        append_tree(&mut builder, &src, Path::new(""), &output)?;
    } else {
        let name = src.file_name().ok_or_else(|| {
            Error::io(
                format!("archive {}", src.display()),
                io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"),
            )
        })?;
        builder
            .append_path_with_name(&src, name)
            .io_context(|| format!("archive file {}", src.display()))?;
    }

    let mut writer = builder
        .into_inner()
        .io_context(|| format!("finish archive {}", dst.display()))?;
    writer
        .flush()
        .io_context(|| format!("flush archive {}", dst.display()))?;
    drop(writer);

    let digest = sha256_file(dst)?;
    debug!(%digest, "archive created");
    Ok(digest)
}

/// Append the content of `dir` under `prefix`, depth first in name order.
/// Symlinks are stored as links and `output` is skipped.
fn append_tree<W: Write>(
    builder: &mut Builder<W>,
    dir: &Path,
    prefix: &Path,
    output: &Path,
) -> Result<()> {
    let mut entries = fs::read_dir(dir)
        .and_then(|entries| entries.collect::<io::Result<Vec<_>>>())
        .io_context(|| format!("list {}", dir.display()))?;
    entries.sort_by_key(|entry| entry.file_name());

    for entry in entries {
        let path = entry.path();
        let name = prefix.join(entry.file_name());
        let kind = entry
            .file_type()
            .io_context(|| format!("inspect {}", path.display()))?;

        if kind.is_file() && fs::canonicalize(&path).map_or(false, |p| p == output) {
            debug!(path = %path.display(), "skipping the archive being written");
            continue;
        }
        if kind.is_dir() {
            builder
                .append_dir(&name, &path)
                .io_context(|| format!("archive directory {}", path.display()))?;
            append_tree(builder, &path, &name, output)?;
        } else {
            builder
                .append_path_with_name(&path, &name)
                .io_context(|| format!("archive file {}", path.display()))?;
        }
    }
    Ok(())
}

/// Unpack the tar at `src` into `dst`, refusing entries that would land
/// outside of `dst`.
pub fn extract_archive(src: &Path, dst: &Path) -> Result<()> {
    debug!(src = %src.display(), dst = %dst.display(), "extracting archive");
    let file = File::open(src).io_context(|| format!("open archive {}", src.display()))?;
    fs::create_dir_all(dst)
        .io_context(|| format!("create extraction directory {}", dst.display()))?;

    let mut archive = Archive::new(BufReader::new(file));
    let entries = archive
        .entries()
        .io_context(|| format!("iterate entries of {}", src.display()))?;
    for entry in entries {
        let mut entry = entry.io_context(|| format!("read entry of {}", src.display()))?;
        let path = entry
            .path()
            .io_context(|| "read entry path")?
            .into_owned();
        if !stays_inside(&path) {
            return Err(Error::UnsafeArchiveEntry(path));
        }
        entry
            .unpack_in(dst)
            .io_context(|| format!("unpack {}", path.display()))?;
    }

    debug!("extraction done");
    Ok(())
}

fn stays_inside(path: &Path) -> bool {
    path.components()
        .all(|component| matches!(component, Component::Normal(_) | Component::CurDir))
}
