#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("failed to write document XML: {0}")]
    Xml(#[from] xml::writer::Error),

    #[error("failed to build docx package: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
