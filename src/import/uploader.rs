use std::path::{Path, PathBuf};
use thiserror::Error;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;

/// Accepted extensions and their MIME types.
pub const ACCEPTED_TYPES: &[(&str, &str)] = &[
    ("xlsx", "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet"),
    ("xls", "application/vnd.ms-excel"),
    ("csv", "text/csv"),
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadRejection {
    #[error("No file selected")]
    NoFile,
    #[error("Only one file can be uploaded at a time ({0} given)")]
    TooManyFiles(usize),
    #[error("{name} is not a spreadsheet (.xlsx, .xls or .csv)")]
    WrongType { name: String },
    #[error("{name} is {size} bytes; the limit is {max} bytes")]
    TooLarge { name: String, size: u64, max: u64 },
    #[error("{name} could not be read: {reason}")]
    Unreadable { name: String, reason: String },
}

/// A dropped or picked file, before any content is read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateFile {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub mime: Option<String>,
}

impl CandidateFile {
    pub fn from_path(path: &Path) -> Result<Self, UploadRejection> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let meta = std::fs::metadata(path).map_err(|e| UploadRejection::Unreadable {
            name: name.clone(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            name,
            size: meta.len(),
            mime: None,
        })
    }

    pub fn extension(&self) -> Option<String> {
        Path::new(&self.name)
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
    }

    pub fn is_csv(&self) -> bool {
        self.extension().as_deref() == Some("csv")
    }

    pub fn mime_type(&self) -> &'static str {
        self.extension()
            .and_then(|ext| ACCEPTED_TYPES.iter().find(|(e, _)| *e == ext).map(|(_, m)| *m))
            .unwrap_or("application/octet-stream")
    }
}

/// Single-file acceptance gate. It never parses; it only decides whether the
/// caller's upload callback runs.
#[derive(Debug, Clone)]
pub struct FileUploader {
    max_bytes: u64,
    uploading: bool,
}

impl Default for FileUploader {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BYTES)
    }
}

impl FileUploader {
    pub fn new(max_bytes: u64) -> Self {
        Self {
            max_bytes,
            uploading: false,
        }
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    pub fn check<'a>(&self, files: &'a [CandidateFile]) -> Result<&'a CandidateFile, UploadRejection> {
        let file = match files {
            [] => return Err(UploadRejection::NoFile),
            [one] => one,
            many => return Err(UploadRejection::TooManyFiles(many.len())),
        };
        let ext_ok = file
            .extension()
            .is_some_and(|ext| ACCEPTED_TYPES.iter().any(|(e, _)| *e == ext));
        let mime_ok = file
            .mime
            .as_deref()
            .is_some_and(|m| ACCEPTED_TYPES.iter().any(|(_, accepted)| *accepted == m));
        if !ext_ok && !mime_ok {
            return Err(UploadRejection::WrongType {
                name: file.name.clone(),
            });
        }
        if file.size > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                name: file.name.clone(),
                size: file.size,
                max: self.max_bytes,
            });
        }
        Ok(file)
    }

    /// Runs `on_upload` with the accepted file, or returns why it was refused.
    pub fn offer<F>(&self, files: &[CandidateFile], on_upload: F) -> Result<(), UploadRejection>
    where
        F: FnOnce(&CandidateFile),
    {
        let file = self.check(files)?;
        log::debug!("accepted upload {} ({} bytes)", file.name, file.size);
        on_upload(file);
        Ok(())
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.uploading = uploading;
    }

    pub fn is_uploading(&self) -> bool {
        self.uploading
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    fn file(name: &str, size: u64) -> CandidateFile {
        CandidateFile {
            path: PathBuf::from(name),
            name: name.to_string(),
            size,
            mime: None,
        }
    }

    #[test]
    fn accepts_single_spreadsheet() {
        let uploader = FileUploader::default();
        let called = Cell::new(false);
        uploader
            .offer(&[file("contacts.XLSX", 2048)], |f| {
                assert_eq!(f.name, "contacts.XLSX");
                called.set(true);
            })
            .unwrap();
        assert!(called.get());
    }

    #[test]
    fn rejections_skip_callback() {
        let uploader = FileUploader::new(1024);
        let cases = [
            (vec![], UploadRejection::NoFile),
            (vec![file("a.csv", 1), file("b.csv", 1)], UploadRejection::TooManyFiles(2)),
            (vec![file("photo.png", 1)], UploadRejection::WrongType { name: "photo.png".into() }),
            (
                vec![file("big.csv", 2048)],
                UploadRejection::TooLarge { name: "big.csv".into(), size: 2048, max: 1024 },
            ),
        ];
        for (files, expected) in cases {
            let result = uploader.offer(&files, |_| panic!("callback must not run"));
            assert_eq!(result, Err(expected));
        }
    }

    #[test]
    fn mime_alone_is_enough() {
        let mut f = file("export", 10);
        f.mime = Some("text/csv".into());
        assert!(FileUploader::default().check(&[f]).is_ok());
    }

    #[test]
    fn reads_size_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("list.csv");
        std::fs::write(&path, "Nombre,Telefono\n").unwrap();
        let candidate = CandidateFile::from_path(&path).unwrap();
        assert_eq!(candidate.size, 16);
        assert!(candidate.is_csv());
        assert_eq!(candidate.mime_type(), "text/csv");
    }
}
