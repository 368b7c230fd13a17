use std::fs;
use std::io::{self, Write};
use std::path::Path;

pub fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err),
    }
}

/// Replaces `path` with `contents` through a sibling temp file and a rename,
/// so readers never observe a half-written file.
pub fn write_replace(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("state");
    let tmp_path = path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()));

    let mut file = fs::File::create(&tmp_path)?;
    let written = file.write_all(contents).and_then(|()| file.flush());
    drop(file);
    if let Err(err) = written.and_then(|()| fs::rename(&tmp_path, path)) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err);
    }
    Ok(())
}
