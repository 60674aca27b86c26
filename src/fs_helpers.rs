use std::fs::File;
use std::io::{BufWriter, Error, ErrorKind, Write};
use std::path::Path;

use tempfile::NamedTempFile;

pub fn ensure_directory(fs_path: &Path) -> Result<(), Error> {
    if !fs_path.exists() {
        if let Err(e) = std::fs::create_dir_all(fs_path) {
            if e.kind() == ErrorKind::AlreadyExists {
                return Ok(());
            }
            return Err(e);
        }
    } else if !fs_path.is_dir() {
        // use ErrorKind::NotADirectory when it becomes stable
        return Err(Error::new(
            ErrorKind::Other,
            "target object should be a directory",
        ));
    }
    Ok(())
}

/// Writes a file so that readers observe either the old contents or the
/// complete new ones: the data goes to a temporary file in the same
/// directory, which is renamed over `path` only after `write` succeeded.
pub fn write_atomically(
    path: &Path,
    write: impl FnOnce(&mut BufWriter<&File>) -> Result<(), Error>,
) -> Result<(), Error> {
    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let temporary = NamedTempFile::new_in(directory)?;
    {
        let mut writer = BufWriter::new(temporary.as_file());
        write(&mut writer)?;
        writer.flush()?;
    }
    // Note: if we need to tolerate OS crashes or power loss,
    // the file must also be synced before the rename.
    temporary.persist(path).map_err(|e| e.error)?;
    Ok(())
}
