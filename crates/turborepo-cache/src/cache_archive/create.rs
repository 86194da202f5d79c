//! Tars the files a task declares as outputs into a single archive, written
//! to a temp path in the same directory and renamed into place on finish so
//! a reader never observes a partially written artifact.

use std::{
    fs::OpenOptions,
    io::{BufWriter, Write},
    sync::atomic::{AtomicU64, Ordering},
};

use tar::{EntryType, Header};
use turbopath::{AbsoluteSystemPath, AbsoluteSystemPathBuf, AnchoredSystemPath};

use crate::error::CacheError;

static TEMP_FILE_COUNTER: AtomicU64 = AtomicU64::new(0);

fn generate_temp_path(final_path: &AbsoluteSystemPath) -> AbsoluteSystemPathBuf {
    let file_name = final_path.file_name().unwrap_or("cache").to_string();
    let unique_id = TEMP_FILE_COUNTER.fetch_add(1, Ordering::Relaxed);
    let temp_name = format!(".{file_name}.{}.{unique_id}.tmp", std::process::id());
    final_path
        .parent()
        .expect("cache path must have a parent")
        .join_component(&temp_name)
}

/// What kind of tar entry a file on disk becomes. Carrying the size on
/// `Regular` keeps the zero-length check next to the data that drives it,
/// instead of re-reading `file_info` once for the header and again to decide
/// whether to open the file.
enum EntryKind {
    Regular(u64),
    Directory,
    Symlink,
}

fn classify(file_info: &std::fs::Metadata) -> Result<EntryKind, CacheError> {
    if file_info.is_symlink() {
        Ok(EntryKind::Symlink)
    } else if file_info.is_dir() {
        Ok(EntryKind::Directory)
    } else if file_info.is_file() {
        Ok(EntryKind::Regular(file_info.len()))
    } else {
        Err(CacheError::CreateUnsupportedFileType)
    }
}

/// Writes a cache archive via write-to-temp-then-rename. If `finish` is
/// never called (error, panic), `Drop` removes the orphaned temp file.
pub struct CacheWriter<'a> {
    builder: tar::Builder<Box<dyn Write + 'a>>,
    temp_path: Option<AbsoluteSystemPathBuf>,
    final_path: Option<AbsoluteSystemPathBuf>,
}

impl<'a> Drop for CacheWriter<'a> {
    fn drop(&mut self) {
        if let Some(temp_path) = self.temp_path.take() {
            let _ = temp_path.remove_file();
        }
    }
}

impl<'a> CacheWriter<'a> {
    /// Wraps an arbitrary writer (an in-memory buffer destined for an HTTP
    /// upload, rather than a file on disk). `finish` has nothing to rename.
    pub fn from_writer(writer: impl Write + 'a, use_compression: bool) -> Result<Self, CacheError> {
        let writer: Box<dyn Write + 'a> = if use_compression {
            Box::new(zstd::Encoder::new(writer, 0)?.auto_finish())
        } else {
            Box::new(writer)
        };

        Ok(CacheWriter {
            builder: tar::Builder::new(writer),
            temp_path: None,
            final_path: None,
        })
    }

    pub fn create(path: &AbsoluteSystemPath) -> Result<Self, CacheError> {
        let temp_path = generate_temp_path(path);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        let file = temp_path.open_with_options(options)?;
        let file_buffer = BufWriter::with_capacity(2usize.pow(20), file);

        let is_compressed = path.extension() == Some("zst");
        let writer: Box<dyn Write + 'a> = if is_compressed {
            Box::new(zstd::Encoder::new(file_buffer, 0)?.auto_finish())
        } else {
            Box::new(file_buffer)
        };

        Ok(CacheWriter {
            builder: tar::Builder::new(writer),
            temp_path: Some(temp_path),
            final_path: Some(path.to_owned()),
        })
    }

    pub fn add_file(
        &mut self,
        anchor: &AbsoluteSystemPath,
        file_path: &AnchoredSystemPath,
    ) -> Result<(), CacheError> {
        let source_path = anchor.resolve(file_path);
        let file_info = source_path.symlink_metadata()?;
        let kind = classify(&file_info)?;

        // tar conventionally marks directory entries with a trailing slash in
        // their path; `to_unix` doesn't add one on its own.
        let mut entry_path = file_path.to_unix().to_string();
        if matches!(kind, EntryKind::Directory) && !entry_path.ends_with('/') {
            entry_path.push('/');
        }

        let mut header = Self::header_for(&kind, &file_info);

        match kind {
            EntryKind::Regular(len) if len > 0 => {
                let file = source_path.open()?;
                self.builder.append_data(&mut header, &entry_path, file)?;
            }
            EntryKind::Symlink => {
                let target = source_path.read_link()?;
                self.builder
                    .append_link(&mut header, &entry_path, &target)?;
            }
            EntryKind::Regular(_) | EntryKind::Directory => {
                self.builder
                    .append_data(&mut header, &entry_path, std::io::empty())?;
            }
        }

        Ok(())
    }

    fn header_for(kind: &EntryKind, file_info: &std::fs::Metadata) -> Header {
        let mut header = Header::new_gnu();

        #[cfg(unix)]
        let mode = {
            use std::os::unix::fs::MetadataExt;
            file_info.mode()
        };
        #[cfg(not(unix))]
        let mode: u32 = 0o755;
        header.set_mode(mode);

        match kind {
            EntryKind::Symlink => {
                header.set_entry_type(EntryType::Symlink);
                header.set_size(0);
            }
            EntryKind::Directory => {
                header.set_entry_type(EntryType::Directory);
                header.set_size(0);
            }
            EntryKind::Regular(len) => {
                header.set_entry_type(EntryType::Regular);
                header.set_size(*len);
            }
        }

        header.set_uid(0);
        header.set_gid(0);
        header.as_gnu_mut().unwrap().set_atime(0);
        header.set_mtime(0);
        header.as_gnu_mut().unwrap().set_ctime(0);

        header
    }

    pub fn finish(mut self) -> Result<(), CacheError> {
        self.builder.finish()?;
        if let (Some(temp_path), Some(final_path)) = (self.temp_path.take(), self.final_path.take())
        {
            temp_path.rename(&final_path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;
    use turbopath::AnchoredSystemPathBuf;

    use super::*;
    use crate::cache_archive::restore::CacheReader;

    #[test]
    fn round_trips_a_regular_file() -> Result<(), CacheError> {
        let input_dir = tempdir().unwrap();
        let archive_dir = tempdir().unwrap();
        let input_path = AbsoluteSystemPathBuf::new(input_dir.path().to_str().unwrap())?;
        let archive_path =
            AbsoluteSystemPathBuf::new(archive_dir.path().join("out.tar.zst").to_str().unwrap())?;

        let file = AnchoredSystemPathBuf::from_raw("hello.txt");
        input_path.resolve(&file).write("hello")?;

        let mut writer = CacheWriter::create(&archive_path)?;
        writer.add_file(&input_path, &file)?;
        writer.finish()?;

        let restore_dir = tempdir().unwrap();
        let restore_path = AbsoluteSystemPathBuf::new(restore_dir.path().to_str().unwrap())?;
        let mut reader = CacheReader::open(&archive_path)?;
        let restored = reader.restore(&restore_path)?;

        assert_eq!(restored.len(), 1);
        assert_eq!(restore_path.resolve(&file).read_to_string()?, "hello");
        Ok(())
    }

    #[test]
    fn round_trips_a_directory_entry_with_trailing_slash() -> Result<(), CacheError> {
        let input_dir = tempdir().unwrap();
        let archive_dir = tempdir().unwrap();
        let input_path = AbsoluteSystemPathBuf::new(input_dir.path().to_str().unwrap())?;
        let archive_path =
            AbsoluteSystemPathBuf::new(archive_dir.path().join("out.tar.zst").to_str().unwrap())?;

        let dir = AnchoredSystemPathBuf::from_raw("nested");
        input_path.resolve(&dir).create_dir_all()?;

        let mut writer = CacheWriter::create(&archive_path)?;
        writer.add_file(&input_path, &dir)?;
        writer.finish()?;

        let restore_dir = tempdir().unwrap();
        let restore_path = AbsoluteSystemPathBuf::new(restore_dir.path().to_str().unwrap())?;
        let mut reader = CacheReader::open(&archive_path)?;
        let restored = reader.restore(&restore_path)?;

        assert_eq!(restored.len(), 1);
        assert!(restore_path.resolve(&dir).exists());
        Ok(())
    }

    #[test]
    fn drop_without_finish_removes_temp_file() -> Result<(), CacheError> {
        let archive_dir = tempdir().unwrap();
        let archive_path = AbsoluteSystemPathBuf::new(
            archive_dir.path().join("out.tar.zst").to_str().unwrap(),
        )?;
        {
            let _writer = CacheWriter::create(&archive_path)?;
        }
        let leftover: Vec<_> = std::fs::read_dir(archive_dir.path())?
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftover.is_empty());
        Ok(())
    }
}
