/// `file://` URI for a path; URIs are returned unchanged
pub fn document_uri(path: &str) -> String {
    if path.starts_with("file://") {
        path.to_string()
    } else {
        format!("file://{}", path)
    }
}

/// Stable id of a source file: CRC32 of its `file://` URI, in hex
pub fn get_document_id(path: &str) -> String {
    format!("{:x}", crc32fast::hash(document_uri(path).as_bytes()))
}

/// Hands out node ids for one document, `<document id>-<n>` with `n`
/// counting from 1. Block ids double as scope handles, so a generator must
/// never be shared between two trees of the same file.
#[derive(Debug, Clone)]
pub struct IdGenerator {
    document: String,
    issued: u32,
}

impl IdGenerator {
    pub fn new(path: &str) -> Self {
        Self {
            document: get_document_id(path),
            issued: 0,
        }
    }

    pub fn new_id(&mut self) -> String {
        self.issued += 1;
        format!("{}-{}", self.document, self.issued)
    }

    pub fn document_id(&self) -> &str {
        &self.document
    }

    pub fn issued(&self) -> u32 {
        self.issued
    }
}
