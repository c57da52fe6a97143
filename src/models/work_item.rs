use serde::{Deserialize, Serialize};

/// One unit of input, identified by its stable 0-based position in the source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkItem {
    pub index: u64,
    pub payload: serde_json::Value,
}

impl WorkItem {
    pub fn new(index: u64, payload: serde_json::Value) -> Self {
        Self { index, payload }
    }

    /// `null` and blank-string payloads carry nothing to transform
    pub fn has_empty_payload(&self) -> bool {
        match &self.payload {
            serde_json::Value::Null => true,
            serde_json::Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_payload_detection() {
        assert!(WorkItem::new(0, json!(null)).has_empty_payload());
        assert!(WorkItem::new(1, json!("   ")).has_empty_payload());
        assert!(!WorkItem::new(2, json!("text")).has_empty_payload());
        assert!(!WorkItem::new(3, json!({})).has_empty_payload());
    }
}
