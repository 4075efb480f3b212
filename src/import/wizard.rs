use thiserror::Error;

use super::preview::LocalPreview;
use super::uploader::{CandidateFile, FileUploader, UploadRejection};
use super::{ColumnMapper, DetectedFormat, SampleRow};
use crate::api::models::{CallSettings, ExcelPreview, ExcelUpload};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WizardStep {
    SelectFile,
    MapColumns,
    Configure,
    Submitted,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WizardBlock {
    #[error("Select a file first")]
    NoFile,
    #[error("Wait for the preview to load")]
    NoPreview,
    #[error("Map every required column before continuing")]
    MissingRequiredColumns,
    #[error("Choose the account this batch belongs to")]
    NoAccount,
    #[error(transparent)]
    Rejected(#[from] UploadRejection),
}

#[derive(Debug, Clone)]
pub struct LoadedFile {
    pub name: String,
    pub bytes: Vec<u8>,
    pub is_csv: bool,
}

/// Multi-step state for importing a contact list into a new batch.
pub struct ImportWizard {
    step: WizardStep,
    uploader: FileUploader,
    file: Option<LoadedFile>,
    mapper: Option<ColumnMapper>,
    total_rows: u64,
    // Bumped on every accepted file; previews for older files are dropped.
    selection: u64,
    auto_batch_name: Option<String>,
    pub account_id: String,
    pub batch_name: String,
    pub description: String,
    pub allow_duplicates: bool,
    pub call_settings: CallSettings,
}

impl ImportWizard {
    pub fn new(max_upload_bytes: u64) -> Self {
        Self {
            step: WizardStep::SelectFile,
            uploader: FileUploader::new(max_upload_bytes),
            file: None,
            mapper: None,
            total_rows: 0,
            selection: 0,
            auto_batch_name: None,
            account_id: String::new(),
            batch_name: String::new(),
            description: String::new(),
            allow_duplicates: false,
            call_settings: CallSettings::default(),
        }
    }

    pub fn step(&self) -> WizardStep {
        self.step
    }

    pub fn uploader(&self) -> &FileUploader {
        &self.uploader
    }

    pub fn set_uploading(&mut self, uploading: bool) {
        self.uploader.set_uploading(uploading);
    }

    pub fn file(&self) -> Option<&LoadedFile> {
        self.file.as_ref()
    }

    pub fn mapper(&self) -> Option<&ColumnMapper> {
        self.mapper.as_ref()
    }

    pub fn mapper_mut(&mut self) -> Option<&mut ColumnMapper> {
        self.mapper.as_mut()
    }

    pub fn total_rows(&self) -> u64 {
        self.total_rows
    }

    /// Identifies the file currently selected. A preview started for one
    /// selection is only applied while that selection is still current.
    pub fn selection(&self) -> u64 {
        self.selection
    }

    /// Accepts dropped/picked files and reads the chosen one. Any previous
    /// preview is discarded.
    pub fn select_files(&mut self, files: &[CandidateFile]) -> Result<&LoadedFile, WizardBlock> {
        let mut loaded = None;
        self.uploader.offer(files, |f| loaded = Some(f.clone()))?;
        let candidate = loaded.ok_or(WizardBlock::NoFile)?;
        let bytes = std::fs::read(&candidate.path).map_err(|e| UploadRejection::Unreadable {
            name: candidate.name.clone(),
            reason: e.to_string(),
        })?;
        self.mapper = None;
        self.total_rows = 0;
        self.selection += 1;
        let untouched = self.batch_name.trim().is_empty()
            || self.auto_batch_name.as_deref() == Some(self.batch_name.as_str());
        if untouched {
            let name = default_batch_name(&candidate.name);
            self.batch_name = name.clone();
            self.auto_batch_name = Some(name);
        }
        self.step = WizardStep::SelectFile;
        Ok(self.file.insert(LoadedFile {
            is_csv: candidate.is_csv(),
            name: candidate.name,
            bytes,
        }))
    }

    pub fn apply_local_preview(&mut self, preview: LocalPreview) {
        self.total_rows = preview.total_rows;
        self.install_sample(preview.rows, preview.format);
    }

    /// Returns false, leaving the state alone, when `selection` is no longer
    /// the current file.
    pub fn apply_remote_preview(&mut self, selection: u64, preview: ExcelPreview) -> bool {
        if selection != self.selection {
            return false;
        }
        self.total_rows = preview.total_rows;
        let format = preview
            .detected_format
            .as_deref()
            .map(DetectedFormat::parse_lenient)
            .unwrap_or_else(|| super::preview::detect_format(&preview.columns));
        self.install_sample(preview.sample_rows, format);
        true
    }

    fn install_sample(&mut self, rows: Vec<SampleRow>, format: DetectedFormat) {
        match self.mapper.as_mut() {
            Some(mapper) => mapper.set_sample(rows, format),
            None => self.mapper = Some(ColumnMapper::new(rows, format)),
        }
        self.step = WizardStep::MapColumns;
    }

    /// Overrides the detected format; the sample stays the same.
    pub fn set_format(&mut self, format: DetectedFormat) {
        if let Some(mapper) = self.mapper.as_mut() {
            let rows = mapper.rows().to_vec();
            mapper.set_sample(rows, format);
        }
    }

    pub fn can_leave_mapping(&self) -> Result<(), WizardBlock> {
        if self.file.is_none() {
            return Err(WizardBlock::NoFile);
        }
        let mapper = self.mapper.as_ref().ok_or(WizardBlock::NoPreview)?;
        if mapper.has_blocking_errors() {
            return Err(WizardBlock::MissingRequiredColumns);
        }
        Ok(())
    }

    pub fn advance(&mut self) -> Result<WizardStep, WizardBlock> {
        self.step = match self.step {
            WizardStep::SelectFile => {
                if self.file.is_none() {
                    return Err(WizardBlock::NoFile);
                }
                if self.mapper.is_none() {
                    return Err(WizardBlock::NoPreview);
                }
                WizardStep::MapColumns
            }
            WizardStep::MapColumns => {
                self.can_leave_mapping()?;
                WizardStep::Configure
            }
            other => other,
        };
        Ok(self.step)
    }

    pub fn back(&mut self) -> WizardStep {
        self.step = match self.step {
            WizardStep::Configure => WizardStep::MapColumns,
            _ => WizardStep::SelectFile,
        };
        self.step
    }

    /// Builds the multipart request. Blocked while any required column is
    /// unmapped; no network call happens in that case.
    pub fn build_upload(&self) -> Result<ExcelUpload, WizardBlock> {
        self.can_leave_mapping()?;
        let account_id = self.account_id.trim();
        if account_id.is_empty() {
            return Err(WizardBlock::NoAccount);
        }
        let file = self.file.as_ref().ok_or(WizardBlock::NoFile)?;
        Ok(ExcelUpload {
            file_name: file.name.clone(),
            bytes: file.bytes.clone(),
            account_id: account_id.to_string(),
            batch_name: non_empty(&self.batch_name),
            description: non_empty(&self.description),
            allow_duplicates: self.allow_duplicates,
            call_settings: Some(self.call_settings.clone()),
        })
    }

    /// Request for the backend preview of a spreadsheet that cannot be
    /// sampled locally. Mapping is not checked yet at this point.
    pub fn preview_request(&self) -> Result<ExcelUpload, WizardBlock> {
        let file = self.file.as_ref().ok_or(WizardBlock::NoFile)?;
        Ok(ExcelUpload {
            file_name: file.name.clone(),
            bytes: file.bytes.clone(),
            account_id: self.account_id.trim().to_string(),
            batch_name: None,
            description: None,
            allow_duplicates: self.allow_duplicates,
            call_settings: None,
        })
    }

    pub fn mark_submitted(&mut self) {
        self.step = WizardStep::Submitted;
        self.mapper = None;
    }
}

fn non_empty(s: &str) -> Option<String> {
    let t = s.trim();
    (!t.is_empty()).then(|| t.to_string())
}

fn default_batch_name(file_name: &str) -> String {
    std::path::Path::new(file_name)
        .file_stem()
        .map(|s| s.to_string_lossy().replace(['_', '-'], " "))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::import::{Field, preview::sample_csv, uploader::CandidateFile};

    fn write_csv(dir: &tempfile::TempDir, name: &str, body: &str) -> CandidateFile {
        let path = dir.path().join(name);
        std::fs::write(&path, body).unwrap();
        CandidateFile::from_path(&path).unwrap()
    }

    #[test]
    fn blocks_submission_until_required_columns_are_mapped() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(&dir, "marzo_cobranza.csv", "Nombre,Telefono,Monto\nAna,+56911111111,1000\n");
        let mut wizard = ImportWizard::new(1024 * 1024);
        let loaded = wizard.select_files(&[file]).unwrap();
        assert!(loaded.is_csv);
        let preview = sample_csv(&wizard.file().unwrap().bytes).unwrap();
        wizard.apply_local_preview(preview);
        assert_eq!(wizard.step(), WizardStep::MapColumns);
        wizard.account_id = "acc-1".into();

        assert_eq!(wizard.build_upload().unwrap_err(), WizardBlock::MissingRequiredColumns);
        assert_eq!(wizard.advance().unwrap_err(), WizardBlock::MissingRequiredColumns);

        wizard.set_format(DetectedFormat::Generic);
        assert_eq!(wizard.advance().unwrap(), WizardStep::Configure);
        let upload = wizard.build_upload().unwrap();
        assert_eq!(upload.batch_name.as_deref(), Some("marzo cobranza"));
        assert_eq!(upload.account_id, "acc-1");
        assert!(upload.description.is_none());
    }

    #[test]
    fn requires_an_account() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(&dir, "list.csv", "Nombre,Celular\nAna,+56911111111\n");
        let mut wizard = ImportWizard::new(1024);
        wizard.select_files(&[file]).unwrap();
        let preview = sample_csv(&wizard.file().unwrap().bytes).unwrap();
        wizard.apply_local_preview(preview);
        assert_eq!(wizard.build_upload().unwrap_err(), WizardBlock::NoAccount);
    }

    #[test]
    fn remote_preview_uses_detected_format() {
        let mut wizard = ImportWizard::new(1024);
        let row: SampleRow = [("Nombre", "Ana"), ("Telefono", "+56911111111")].into_iter().collect();
        let current = wizard.selection();
        assert!(wizard.apply_remote_preview(current, ExcelPreview {
            columns: vec!["Nombre".into(), "Telefono".into()],
            sample_rows: vec![row],
            total_rows: 40,
            detected_format: Some("marketing".into()),
        }));
        let mapper = wizard.mapper().unwrap();
        assert_eq!(mapper.format(), DetectedFormat::Marketing);
        assert!(mapper.has_blocking_errors());
        assert!(!mapper.mapping().contains_key(&Field::Email));
        assert_eq!(wizard.total_rows(), 40);
    }

    #[test]
    fn late_preview_for_a_replaced_file_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut wizard = ImportWizard::new(1024 * 1024);
        let sheet = write_csv(&dir, "a.xlsx", "not really a workbook");
        wizard.select_files(&[sheet]).unwrap();
        let pending = wizard.selection();

        let csv = write_csv(&dir, "b.csv", "Nombre,Telefono\nAna,+56911111111\n");
        wizard.select_files(&[csv]).unwrap();
        let preview = sample_csv(&wizard.file().unwrap().bytes).unwrap();
        wizard.apply_local_preview(preview);

        let row: SampleRow = [("Cliente", "Luis"), ("Movil", "+56922222222")].into_iter().collect();
        let applied = wizard.apply_remote_preview(pending, ExcelPreview {
            columns: vec!["Cliente".into(), "Movil".into()],
            sample_rows: vec![row],
            total_rows: 900,
            detected_format: Some("generic".into()),
        });
        assert!(!applied);
        assert_eq!(wizard.file().unwrap().name, "b.csv");
        let mapper = wizard.mapper().unwrap();
        assert_eq!(mapper.columns(), ["Nombre", "Telefono"]);
        assert_eq!(wizard.total_rows(), 1);
    }

    #[test]
    fn batch_name_follows_the_file_until_edited() {
        let dir = tempfile::tempdir().unwrap();
        let mut wizard = ImportWizard::new(1024);
        wizard.select_files(&[write_csv(&dir, "enero_lista.csv", "Nombre\nAna\n")]).unwrap();
        assert_eq!(wizard.batch_name, "enero lista");
        wizard.select_files(&[write_csv(&dir, "febrero-lista.csv", "Nombre\nAna\n")]).unwrap();
        assert_eq!(wizard.batch_name, "febrero lista");

        wizard.batch_name = "Cobranza Q1".into();
        wizard.select_files(&[write_csv(&dir, "marzo.csv", "Nombre\nAna\n")]).unwrap();
        assert_eq!(wizard.batch_name, "Cobranza Q1");
    }

    #[test]
    fn preview_request_needs_only_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut wizard = ImportWizard::new(1024);
        assert_eq!(wizard.preview_request().unwrap_err(), WizardBlock::NoFile);
        let file = write_csv(&dir, "list.csv", "Nombre\nAna\n");
        wizard.select_files(&[file]).unwrap();
        let req = wizard.preview_request().unwrap();
        assert_eq!(req.file_name, "list.csv");
        assert!(req.call_settings.is_none());
        assert!(!req.bytes.is_empty());
    }

    #[test]
    fn rejected_file_leaves_state_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let file = write_csv(&dir, "notes.txt", "hello");
        let mut wizard = ImportWizard::new(1024);
        let err = wizard.select_files(&[file]).unwrap_err();
        assert!(matches!(err, WizardBlock::Rejected(UploadRejection::WrongType { .. })));
        assert!(wizard.file().is_none());
    }
}
