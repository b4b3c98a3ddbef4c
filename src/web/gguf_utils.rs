// GGUF metadata utilities
//
// Reads the chat convention fields of a model file with the gguf_llms crate,
// without loading any tensors.

use gguf_llms::{GgufHeader, GgufReader, Value};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Metadata fields the formatter needs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GgufChatInfo {
    pub chat_template: Option<String>,
    pub general_name: Option<String>,
    pub architecture: Option<String>,
}

/// Convert a GGUF Value to an Option<String>
pub fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Uint8(n) => Some(n.to_string()),
        Value::Uint16(n) => Some(n.to_string()),
        Value::Uint32(n) => Some(n.to_string()),
        Value::Uint64(n) => Some(n.to_string()),
        Value::Int8(n) => Some(n.to_string()),
        Value::Int16(n) => Some(n.to_string()),
        Value::Int32(n) => Some(n.to_string()),
        Value::Int64(n) => Some(n.to_string()),
        Value::Float32(f) => Some(f.to_string()),
        Value::Float64(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(_, _) => None,
    }
}

/// Read the raw metadata map of a GGUF file.
pub fn read_gguf_metadata_raw(file_path: &Path) -> Result<HashMap<String, Value>, String> {
    let file = File::open(file_path).map_err(|e| format!("Failed to open file: {e}"))?;
    let mut reader = BufReader::new(file);

    let header = GgufHeader::parse(&mut reader)
        .map_err(|e| format!("Failed to parse GGUF header: {e}"))?;

    GgufReader::read_metadata(&mut reader, header.n_kv)
        .map_err(|e| format!("Failed to read GGUF metadata: {e}"))
}

pub fn chat_info_from_metadata(metadata: &HashMap<String, Value>) -> GgufChatInfo {
    let get_string = |key: &str| metadata.get(key).and_then(value_to_string);
    GgufChatInfo {
        chat_template: get_string("tokenizer.chat_template").filter(|t| !t.trim().is_empty()),
        general_name: get_string("general.name"),
        architecture: get_string("general.architecture"),
    }
}

pub fn read_chat_info(file_path: &Path) -> Result<GgufChatInfo, String> {
    read_gguf_metadata_raw(file_path).map(|metadata| chat_info_from_metadata(&metadata))
}
