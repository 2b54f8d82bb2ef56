pub mod csv;

pub use self::csv::{
    export_filename, sanitize_description, to_csv_text, ExportArtifact, ExportError, CONTENT_TYPE,
    HEADER,
};
