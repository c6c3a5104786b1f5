//! Codec configuration and the codec name registry.

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::codec::block::BlockPostingsFormat;
use crate::codec::field_infos::{FORMAT_CHECKSUM, FORMAT_CURRENT, FieldInfosFormat};
use crate::codec::memory::MemoryPostingsFormat;
use crate::codec::random::RandomPerFieldPostingsFormat;
use crate::codec::{Codec, PostingsFormat};
use crate::error::{QuiverError, Result};

/// Configuration for the codecs of an index.
///
/// # Example
///
/// ```
/// use quiver::codec::config::{CodecConfig, CodecRegistry};
///
/// # fn main() -> quiver::error::Result<()> {
/// let config = CodecConfig::from_json(r#"{"default_codec": "Memory"}"#)?;
/// assert_eq!(config.block.skip_interval, 16);
///
/// let registry = CodecRegistry::from_config(&config)?;
/// assert_eq!(registry.default_codec()?.name(), "Memory");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Codec used for newly written segments.
    pub default_codec: String,

    /// Settings of the block postings format.
    pub block: BlockConfig,

    /// Versions of the field metadata format.
    pub field_infos: FieldInfosConfig,

    /// Settings of the random per-field test format.
    pub random: RandomConfig,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            default_codec: BlockPostingsFormat::NAME.to_string(),
            block: BlockConfig::default(),
            field_infos: FieldInfosConfig::default(),
            random: RandomConfig::default(),
        }
    }
}

impl CodecConfig {
    /// Parse a configuration from JSON; missing keys take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: CodecConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Render the configuration as JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.block.terms_index_interval == 0 {
            return Err(QuiverError::invalid_argument(
                "block.terms_index_interval must be at least 1",
            ));
        }
        if self.field_infos.write_version > FORMAT_CURRENT {
            return Err(QuiverError::invalid_argument(format!(
                "field_infos.write_version {} is newer than the current format {FORMAT_CURRENT}",
                self.field_infos.write_version
            )));
        }
        Ok(())
    }
}

/// Settings of the block postings format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlockConfig {
    /// Documents between skip entries; `0` disables skip data.
    pub skip_interval: u32,

    /// Terms per term block; one index entry is kept per block.
    pub terms_index_interval: u32,
}

impl Default for BlockConfig {
    fn default() -> Self {
        BlockConfig {
            skip_interval: 16,
            terms_index_interval: 32,
        }
    }
}

/// Versions of the field metadata format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FieldInfosConfig {
    /// Version written to new files.
    pub write_version: u32,

    /// First version whose files end with a checksum footer.
    pub checksum_version: u32,
}

impl Default for FieldInfosConfig {
    fn default() -> Self {
        FieldInfosConfig {
            write_version: FORMAT_CURRENT,
            checksum_version: FORMAT_CHECKSUM,
        }
    }
}

/// Settings of the random per-field test format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RandomConfig {
    /// Seed for choosing formats; a fresh random seed per segment when absent.
    pub seed: Option<u64>,
}

/// Resolves codec names to codecs.
///
/// Built once from a [`CodecConfig`] and passed to whatever opens segments.
#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: AHashMap<String, Arc<Codec>>,
    default_codec: String,
}

impl CodecRegistry {
    /// Build the standard codecs: `Block`, `Memory` and `RandomPerField`.
    pub fn from_config(config: &CodecConfig) -> Result<Self> {
        config.validate()?;

        let field_infos = FieldInfosFormat::new(&config.field_infos);
        let block = BlockPostingsFormat::new(config.block);
        let palette = vec![
            PostingsFormat::Block(block.clone()),
            PostingsFormat::Block(BlockPostingsFormat::new(BlockConfig {
                skip_interval: 2,
                terms_index_interval: 3,
            })),
            PostingsFormat::Memory(MemoryPostingsFormat::new()),
        ];

        let mut registry = CodecRegistry {
            codecs: AHashMap::new(),
            default_codec: config.default_codec.clone(),
        };
        registry.register(Codec::new(
            BlockPostingsFormat::NAME,
            PostingsFormat::Block(block),
            field_infos.clone(),
        ));
        registry.register(Codec::new(
            MemoryPostingsFormat::NAME,
            PostingsFormat::Memory(MemoryPostingsFormat::new()),
            field_infos.clone(),
        ));
        registry.register(Codec::new(
            RandomPerFieldPostingsFormat::NAME,
            PostingsFormat::RandomPerField(RandomPerFieldPostingsFormat::new(
                palette,
                config.random.seed,
            )),
            field_infos,
        ));

        registry.default_codec()?;
        Ok(registry)
    }

    /// Add a codec, replacing any codec of the same name.
    pub fn register(&mut self, codec: Codec) -> Option<Arc<Codec>> {
        self.codecs.insert(codec.name().to_string(), Arc::new(codec))
    }

    /// Resolve a codec by name.
    pub fn lookup(&self, name: &str) -> Result<Arc<Codec>> {
        self.codecs.get(name).cloned().ok_or_else(|| {
            QuiverError::invalid_argument(format!(
                "unknown codec '{name}' (registered: {})",
                self.names().join(", ")
            ))
        })
    }

    /// The codec new segments are written with.
    pub fn default_codec(&self) -> Result<Arc<Codec>> {
        self.lookup(&self.default_codec)
    }

    /// Registered codec names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.codecs.keys().cloned().collect();
        names.sort();
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = CodecConfig::default();
        assert_eq!(config.default_codec, "Block");
        assert_eq!(config.block.skip_interval, 16);
        assert_eq!(config.block.terms_index_interval, 32);
        assert_eq!(config.field_infos.write_version, 1);
        assert_eq!(config.field_infos.checksum_version, 1);
        assert_eq!(config.random.seed, None);
    }

    #[test]
    fn test_json_roundtrip() {
        let mut config = CodecConfig::default();
        config.random.seed = Some(42);
        config.block.skip_interval = 8;

        let json = config.to_json().unwrap();
        assert_eq!(CodecConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_partial_json() {
        let config = CodecConfig::from_json(r#"{"block": {"skip_interval": 4}}"#).unwrap();
        assert_eq!(config.block.skip_interval, 4);
        assert_eq!(config.block.terms_index_interval, 32);
        assert_eq!(config.default_codec, "Block");
    }

    #[test]
    fn test_invalid_config() {
        assert!(CodecConfig::from_json(r#"{"block": {"terms_index_interval": 0}}"#).is_err());
        assert!(CodecConfig::from_json("not json").is_err());
    }

    #[test]
    fn test_registry() {
        let registry = CodecRegistry::from_config(&CodecConfig::default()).unwrap();
        assert_eq!(registry.names(), vec!["Block", "Memory", "RandomPerField"]);
        assert_eq!(registry.default_codec().unwrap().name(), "Block");
        assert_eq!(registry.lookup("Memory").unwrap().name(), "Memory");
        assert!(registry.lookup("Lucene40").is_err());
    }

    #[test]
    fn test_unknown_default_codec() {
        let config = CodecConfig {
            default_codec: "Nope".to_string(),
            ..CodecConfig::default()
        };
        assert!(CodecRegistry::from_config(&config).is_err());
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = CodecRegistry::from_config(&CodecConfig::default()).unwrap();
        let tuned = Codec::new(
            "Block",
            PostingsFormat::Block(BlockPostingsFormat::new(BlockConfig {
                skip_interval: 4,
                terms_index_interval: 8,
            })),
            FieldInfosFormat::new(&FieldInfosConfig::default()),
        );
        assert!(registry.register(tuned).is_some());
        assert_eq!(registry.names().len(), 3);
    }
}
