use chrono::NaiveDate;
use ledgerscan_core::{Transaction, TransactionType};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Date; Refund (+); Expense (-); Description.
pub const HEADER: [&str; 4] = ["日期", "退款(+)", "消費(-)", "交易說明"];
pub const DELIMITER: u8 = b';';
pub const BYTE_ORDER_MARK: &str = "\u{feff}";
pub const CONTENT_TYPE: &str = "text/csv;charset=utf-8";

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("Export produced invalid UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),
}

/// A ready-to-download ledger file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub filename: String,
    pub content_type: &'static str,
    /// UTF-8 with a leading byte-order mark.
    pub bytes: Vec<u8>,
}

impl ExportArtifact {
    /// `None` when there is nothing to export.
    pub fn build(
        transactions: &[Transaction],
        export_date: NaiveDate,
    ) -> Result<Option<Self>, ExportError> {
        if transactions.is_empty() {
            return Ok(None);
        }

        let text = to_csv_text(transactions)?;
        let mut bytes = Vec::with_capacity(BYTE_ORDER_MARK.len() + text.len());
        bytes.extend_from_slice(BYTE_ORDER_MARK.as_bytes());
        bytes.extend_from_slice(text.as_bytes());

        tracing::debug!(rows = transactions.len(), bytes = bytes.len(), "ledger export built");

        Ok(Some(ExportArtifact {
            filename: export_filename(export_date),
            content_type: CONTENT_TYPE,
            bytes,
        }))
    }

    /// Same as [`ExportArtifact::build`], dated with today's UTC date.
    pub fn build_now(transactions: &[Transaction]) -> Result<Option<Self>, ExportError> {
        Self::build(transactions, chrono::Utc::now().date_naive())
    }

    pub fn write_to_dir(&self, dir: &Path) -> Result<PathBuf, ExportError> {
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

pub fn export_filename(date: NaiveDate) -> String {
    format!("ledger_export_{}.csv", date.format("%Y-%m-%d"))
}

/// Semicolons become commas. Each line break (`\r\n`, `\r` or `\n`) becomes a single
/// space. Nothing else changes.
pub fn sanitize_description(description: &str) -> String {
    description
        .replace(';', ",")
        .replace("\r\n", " ")
        .replace(['\r', '\n'], " ")
}

/// Header plus one line per transaction, newline-joined, without BOM or trailing newline.
pub fn to_csv_text(transactions: &[Transaction]) -> Result<String, ExportError> {
    let mut writer = csv::WriterBuilder::new()
        .delimiter(DELIMITER)
        .quote_style(csv::QuoteStyle::Never)
        .terminator(csv::Terminator::Any(b'\n'))
        .has_headers(false)
        .from_writer(Vec::new());

    writer.write_record(HEADER)?;

    // The store holds rows top-of-document first; the ledger is filled bottom-up,
    // so the export always runs in reverse store order. Not a sort.
    for tx in transactions.iter().rev() {
        writer.write_record(row(tx))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Io(e.into_error()))?;
    let text = String::from_utf8(bytes)?;
    Ok(text.strip_suffix('\n').map(str::to_string).unwrap_or(text))
}

fn row(tx: &Transaction) -> [String; 4] {
    let (refund, expense) = match tx.kind {
        TransactionType::Income => (format!("+{}", tx.amount), String::new()),
        TransactionType::Expense => (String::new(), format!("-{}", tx.amount)),
    };
    [
        tx.date.to_string(),
        refund,
        expense,
        sanitize_description(&tx.description),
    ]
}
