//! Tree persistence codecs

use super::Tree;
use crate::config::CodecType;
use crate::error::{CodecError, Result};
use bytes::Bytes;
use std::path::Path;
use tracing::info;

/// Trait for tree codecs
pub trait TreeCodec: Send + Sync {
    /// Encode tree to bytes
    fn encode(&self, tree: &Tree) -> Result<Bytes>;

    /// Decode bytes to a validated tree
    fn decode(&self, data: &[u8]) -> Result<Tree>;

    /// Get codec name
    fn name(&self) -> &str;
}

/// JSON codec implementation
pub struct JsonCodec;

impl TreeCodec for JsonCodec {
    fn encode(&self, tree: &Tree) -> Result<Bytes> {
        let json = serde_json::to_vec(tree).map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(Bytes::from(json))
    }

    fn decode(&self, data: &[u8]) -> Result<Tree> {
        let tree = serde_json::from_slice(data).map_err(|e| CodecError::Decoding(e.to_string()))?;
        Ok(tree)
    }

    fn name(&self) -> &str {
        "json"
    }
}

/// MessagePack codec implementation
pub struct MessagePackCodec;

impl TreeCodec for MessagePackCodec {
    fn encode(&self, tree: &Tree) -> Result<Bytes> {
        let msgpack = rmp_serde::to_vec_named(tree).map_err(|e| CodecError::Encoding(e.to_string()))?;
        Ok(Bytes::from(msgpack))
    }

    fn decode(&self, data: &[u8]) -> Result<Tree> {
        let tree = rmp_serde::from_slice(data).map_err(|e| CodecError::Decoding(e.to_string()))?;
        Ok(tree)
    }

    fn name(&self) -> &str {
        "messagepack"
    }
}

impl CodecType {
    pub fn codec(self) -> Box<dyn TreeCodec> {
        match self {
            CodecType::Json => Box::new(JsonCodec),
            CodecType::MessagePack => Box::new(MessagePackCodec),
        }
    }
}

impl Tree {
    /// Write the tree to `path`
    pub fn save(&self, path: impl AsRef<Path>, codec: &dyn TreeCodec) -> Result<()> {
        let bytes = codec.encode(self)?;
        std::fs::write(path.as_ref(), &bytes)?;
        info!(
            "Saved tree with {} nodes to {} ({}, {} bytes)",
            self.len(),
            path.as_ref().display(),
            codec.name(),
            bytes.len()
        );
        Ok(())
    }

    /// Read and validate a tree written by [`Tree::save`]
    pub fn load(path: impl AsRef<Path>, codec: &dyn TreeCodec) -> Result<Tree> {
        let bytes = std::fs::read(path.as_ref())?;
        let tree = codec.decode(&bytes)?;
        info!(
            "Loaded tree with {} nodes and {} layers from {}",
            tree.len(),
            tree.num_layers(),
            path.as_ref().display()
        );
        Ok(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TreeError;
    use crate::tree::tests::sample_tree;

    #[test]
    fn test_json_roundtrip() {
        let tree = sample_tree();
        let codec = JsonCodec;

        let decoded = codec.decode(&codec.encode(&tree).unwrap()).unwrap();
        assert_eq!(decoded, tree);
        assert_eq!(decoded.layer_of(6), Some(2));
    }

    #[test]
    fn test_messagepack_file_roundtrip() {
        let tree = sample_tree();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tree.msgpack");

        let codec = CodecType::MessagePack.codec();
        tree.save(&path, codec.as_ref()).unwrap();
        let loaded = Tree::load(&path, codec.as_ref()).unwrap();

        assert_eq!(loaded, tree);
    }

    #[test]
    fn test_structurally_invalid_input_rejected() {
        let mut value = serde_json::to_value(sample_tree()).unwrap();
        value["root_nodes"] = serde_json::json!([5]);

        let err = JsonCodec.decode(&serde_json::to_vec(&value).unwrap()).unwrap_err();
        assert!(matches!(err, TreeError::Codec(CodecError::Decoding(_))));
    }

    #[test]
    fn test_garbage_rejected() {
        assert!(MessagePackCodec.decode(b"not a tree").is_err());
    }
}
