pub mod error;
pub mod pdf;
pub mod source;
pub mod text;

pub use pdf::PdfWorker;
pub use source::{collect_inputs, EncodedFile, SourceFile};
pub use text::process_text_file;
