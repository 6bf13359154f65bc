pub mod record;
pub mod store;

pub use record::{Artifact, Attachment, Message, Role, DEFAULT_ARTIFACT_NAME};
pub use store::{export_json, import_artifacts, HistoryStore};
