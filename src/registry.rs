// The model registry: a read-only catalog of super-resolution model variants,
// loaded once from a JSON document at startup and shared by reference with
// every request.

use crate::error::InferError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Architecture parameters for a dense-residual (RRDB) network.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct RrdbNetParams {
    pub num_in_ch: u32,
    pub num_out_ch: u32,
    pub num_feat: u32,
    pub num_block: u32,
    pub num_grow_ch: u32,
    pub scale: u32,
}

/// Architecture parameters for a compact sequential (SRVGG) network.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct SrvggNetParams {
    pub num_in_ch: u32,
    pub num_out_ch: u32,
    pub num_feat: u32,
    pub num_conv: u32,
    pub upscale: u32,
    // Activation kind is carried verbatim; the execution backend decides
    // which values it supports.
    pub act_type: String,
}

/// The variant discriminator. Exactly one parameter shape per kind.
#[derive(Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ModelVariant {
    #[serde(rename = "rrdbnet")]
    RrdbNet { params: RrdbNetParams },
    #[serde(rename = "srvggnet")]
    SrvggNet { params: SrvggNetParams },
    #[serde(rename = "face-restore")]
    FaceRestore,
}

/// One catalog entry: a named, fully parameterized model variant together
/// with the ordered remote locations of its weight artifacts.
#[derive(Deserialize, Debug, Clone)]
pub struct ModelDescriptor {
    pub name: String,
    pub urls: Vec<String>,
    #[serde(flatten)]
    pub variant: ModelVariant,
}

impl ModelDescriptor {
    /// The upscale factor the network natively produces. Face-restore models
    /// have no primary scale; they are only chained behind a primary model.
    pub fn native_scale(&self) -> Option<u32> {
        match &self.variant {
            ModelVariant::RrdbNet { params } => Some(params.scale),
            ModelVariant::SrvggNet { params } => Some(params.upscale),
            ModelVariant::FaceRestore => None,
        }
    }

    /// Whether this variant supports denoise-strength interpolation between
    /// two weight sets. Only the compact general-purpose model ships a
    /// (plain, denoised) weight pair; the URL order is the blend order.
    pub fn supports_dual_weights(&self) -> bool {
        matches!(self.variant, ModelVariant::SrvggNet { .. }) && self.urls.len() == 2
    }
}

/// Mapping from model name to descriptor. Built once, never mutated.
#[derive(Debug)]
pub struct ModelRegistry {
    models: HashMap<String, ModelDescriptor>,
}

impl ModelRegistry {
    /// Parse the catalog from a JSON array of descriptors.
    pub fn from_json(document: &str) -> Result<Self, InferError> {
        let entries: Vec<ModelDescriptor> = serde_json::from_str(document)
            .map_err(|e| InferError::Config(format!("invalid model catalog: {}", e)))?;

        let mut models = HashMap::with_capacity(entries.len());
        for entry in entries {
            if entry.urls.is_empty() {
                return Err(InferError::Config(format!(
                    "model '{}' has no weight URLs",
                    entry.name
                )));
            }
            if models.insert(entry.name.clone(), entry).is_some() {
                return Err(InferError::Config(
                    "duplicate model name in catalog".to_string(),
                ));
            }
        }

        Ok(Self { models })
    }

    /// Load the catalog document from disk.
    pub fn load_file(path: impl AsRef<Path>) -> Result<Self, InferError> {
        let path = path.as_ref();
        tracing::info!("Loading model catalog from {}", path.display());
        let document = std::fs::read_to_string(path).map_err(|e| {
            InferError::Config(format!(
                "cannot read model catalog '{}': {}",
                path.display(),
                e
            ))
        })?;
        let registry = Self::from_json(&document)?;
        tracing::info!("Model catalog loaded: {} model(s)", registry.len());
        Ok(registry)
    }

    pub fn lookup(&self, name: &str) -> Result<&ModelDescriptor, InferError> {
        self.models
            .get(name)
            .ok_or_else(|| InferError::UnknownModel(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    /// Model names in no particular order, for logging and discovery.
    pub fn model_names(&self) -> Vec<&str> {
        self.models.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {
            "name": "RealESRGAN_x2plus",
            "type": "rrdbnet",
            "urls": ["https://example.com/weights/RealESRGAN_x2plus.pth"],
            "params": {
                "num_in_ch": 3, "num_out_ch": 3, "num_feat": 64,
                "num_block": 23, "num_grow_ch": 32, "scale": 2
            }
        },
        {
            "name": "realesr-general-x4v3",
            "type": "srvggnet",
            "urls": [
                "https://example.com/weights/realesr-general-x4v3.pth",
                "https://example.com/weights/realesr-general-wdn-x4v3.pth"
            ],
            "params": {
                "num_in_ch": 3, "num_out_ch": 3, "num_feat": 64,
                "num_conv": 32, "upscale": 4, "act_type": "prelu"
            }
        },
        {
            "name": "GFPGANv1.3",
            "type": "face-restore",
            "urls": ["https://example.com/weights/GFPGANv1.3.pth"]
        }
    ]"#;

    #[test]
    fn test_parse_catalog() {
        let registry = ModelRegistry::from_json(CATALOG).unwrap();
        assert_eq!(registry.len(), 3);

        let rrdb = registry.lookup("RealESRGAN_x2plus").unwrap();
        assert_eq!(rrdb.native_scale(), Some(2));
        assert!(!rrdb.supports_dual_weights());
        match &rrdb.variant {
            ModelVariant::RrdbNet { params } => {
                assert_eq!(params.num_block, 23);
                assert_eq!(params.num_grow_ch, 32);
            }
            other => panic!("expected rrdbnet, got {:?}", other),
        }
    }

    #[test]
    fn test_dual_weight_detection() {
        let registry = ModelRegistry::from_json(CATALOG).unwrap();

        let general = registry.lookup("realesr-general-x4v3").unwrap();
        assert!(general.supports_dual_weights());
        assert_eq!(general.native_scale(), Some(4));
        // URL order is the blend order; the plain weight set comes first.
        assert!(general.urls[0].ends_with("realesr-general-x4v3.pth"));
        assert!(general.urls[1].ends_with("realesr-general-wdn-x4v3.pth"));
    }

    #[test]
    fn test_face_restore_has_no_scale() {
        let registry = ModelRegistry::from_json(CATALOG).unwrap();
        let face = registry.lookup("GFPGANv1.3").unwrap();
        assert_eq!(face.native_scale(), None);
        assert!(!face.supports_dual_weights());
    }

    #[test]
    fn test_unknown_model() {
        let registry = ModelRegistry::from_json(CATALOG).unwrap();
        match registry.lookup("does-not-exist") {
            Err(InferError::UnknownModel(name)) => assert_eq!(name, "does-not-exist"),
            other => panic!("expected UnknownModel, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_variant_kind_rejected() {
        let doc = r#"[{"name": "x", "type": "transformer", "urls": ["https://e/x.pth"]}]"#;
        assert!(matches!(
            ModelRegistry::from_json(doc),
            Err(InferError::Config(_))
        ));
    }

    #[test]
    fn test_missing_params_rejected() {
        // A variant kind must come with its own parameter shape.
        let doc = r#"[{"name": "x", "type": "rrdbnet", "urls": ["https://e/x.pth"]}]"#;
        assert!(matches!(
            ModelRegistry::from_json(doc),
            Err(InferError::Config(_))
        ));
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let doc = r#"[
            {"name": "x", "type": "face-restore", "urls": ["https://e/a.pth"]},
            {"name": "x", "type": "face-restore", "urls": ["https://e/b.pth"]}
        ]"#;
        assert!(matches!(
            ModelRegistry::from_json(doc),
            Err(InferError::Config(_))
        ));
    }

    #[test]
    fn test_empty_urls_rejected() {
        let doc = r#"[{"name": "x", "type": "face-restore", "urls": []}]"#;
        assert!(matches!(
            ModelRegistry::from_json(doc),
            Err(InferError::Config(_))
        ));
    }
}
