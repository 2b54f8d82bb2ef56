//! The request contract sent to the recognition service: structured-output schema,
//! instructions, and the inline image.

use ledgerscan_core::TransactionType;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::encode::ImagePayload;

pub const SYSTEM_INSTRUCTION: &str = "You are a highly accurate OCR assistant for accounting. \
Your job is to extract transaction details from images. Pay close attention to dates and prices.";

pub const USER_INSTRUCTION: &str = "Analyze this image (receipt, invoice, or bank statement). \
Extract every transaction row visible in the image, top to bottom. \
Write every date strictly in DD/MM/YYYY format, expanding two-digit years to four digits. \
Classify each row as INCOME (refund, deposit, money in) or EXPENSE (purchase, withdrawal, money out); \
when unsure, use EXPENSE. \
Report each amount as an unsigned number without currency symbols; the type carries the direction. \
Return a JSON array.";

/// The four fields every returned object must carry.
pub const REQUIRED_FIELDS: [&str; 4] = ["date", "description", "amount", "type"];

/// Array of objects with exactly four required fields, `type` limited to the two variants.
pub fn response_schema() -> Value {
    let variants: Vec<&str> = TransactionType::ALL.iter().map(|t| t.as_str()).collect();
    json!({
        "type": "ARRAY",
        "description": "List of transactions extracted from the image.",
        "items": {
            "type": "OBJECT",
            "properties": {
                "date": {
                    "type": "STRING",
                    "description": "The date of the transaction in DD/MM/YYYY format (e.g., 15/12/2025). Normalize year to 4 digits."
                },
                "description": {
                    "type": "STRING",
                    "description": "The name, item, or description of the transaction."
                },
                "amount": {
                    "type": "NUMBER",
                    "description": "The absolute numeric value of the transaction amount (no symbols)."
                },
                "type": {
                    "type": "STRING",
                    "enum": variants,
                    "description": "INCOME for money in (refund, income, deposit), EXPENSE for money out (expense, purchase, withdrawal). Default to EXPENSE when ambiguous."
                }
            },
            "required": REQUIRED_FIELDS,
            "propertyOrdering": REQUIRED_FIELDS
        }
    })
}

// ── Wire types (generateContent) ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub system_instruction: Content,
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub role: Option<String>,
    pub parts: Vec<Part>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub enum Part {
    Text(String),
    InlineData(InlineData),
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InlineData {
    pub mime_type: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_mime_type: String,
    pub response_schema: Value,
}

impl GenerateRequest {
    pub fn for_image(image: &ImagePayload) -> Self {
        GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: vec![Part::Text(SYSTEM_INSTRUCTION.to_string())],
            },
            contents: vec![Content {
                role: Some("user".to_string()),
                parts: vec![
                    Part::InlineData(InlineData {
                        mime_type: image.media_type().to_string(),
                        data: image.data().to_string(),
                    }),
                    Part::Text(USER_INSTRUCTION.to_string()),
                ],
            }],
            generation_config: GenerationConfig {
                response_mime_type: "application/json".to_string(),
                response_schema: response_schema(),
            },
        }
    }

    /// The inline image carried by this request, if any.
    pub fn image(&self) -> Option<&InlineData> {
        self.contents
            .iter()
            .flat_map(|c| c.parts.iter())
            .find_map(|p| match p {
                Part::InlineData(data) => Some(data),
                Part::Text(_) => None,
            })
    }
}
