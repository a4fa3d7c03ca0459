use crate::crypto::Algorithm;
use crate::error::{Result, StoreError};
use std::path::{Path, PathBuf};

/// On-disk format for collection files.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    /// Human-readable structured text, indentation controlled by `tabspace`.
    Json,
    /// Compact length-prefixed binary envelope. Mutually exclusive with
    /// encryption; supports chunked storage and the native id value type.
    Binary,
}

/// Store configuration.
///
/// | option             | default           |
/// |--------------------|-------------------|
/// | `directory`        | `./borealisdata`  |
/// | `extension`        | `json` (`bin` when binary encoding is chosen) |
/// | `tabspace`         | `3` (forced to `0` in binary mode) |
/// | `encoding`         | `Encoding::Json`  |
/// | `encryption`       | `None`            |
/// | `encryption_key`   | `None`            |
/// | `no_repeat`        | `false`           |
/// | `auto_primary_key` | `Some("_id")`     |
/// | `object_id`        | `false`           |
#[derive(Debug, Clone)]
pub struct Config {
    pub directory: PathBuf,
    pub extension: String,
    pub tabspace: usize,
    pub encoding: Encoding,
    pub encryption: Option<Algorithm>,
    pub encryption_key: Option<String>,
    /// Reject writes that would duplicate an existing record on all
    /// caller-supplied fields.
    pub no_repeat: bool,
    /// Name of the auto-assigned primary key field, or `None` to disable.
    pub auto_primary_key: Option<String>,
    /// Use the binary-native unique id type for generated keys
    /// (binary encoding only).
    pub object_id: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("./borealisdata"),
            extension: "json".to_string(),
            tabspace: 3,
            encoding: Encoding::Json,
            encryption: None,
            encryption_key: None,
            no_repeat: false,
            auto_primary_key: Some("_id".to_string()),
            object_id: false,
        }
    }
}

impl Config {
    /// Default configuration rooted at a specific storage directory.
    pub fn with_directory<P: AsRef<Path>>(directory: P) -> Self {
        Self {
            directory: directory.as_ref().to_path_buf(),
            ..Self::default()
        }
    }

    /// Validate and normalize the configuration.
    ///
    /// Binary encoding refuses encryption outright, forces `tabspace` to 0,
    /// and swaps the default `json` extension for `bin`. Encryption requires
    /// a hex key whose length exactly matches the algorithm's table entry.
    pub fn normalized(mut self) -> Result<Config> {
        if self.encoding == Encoding::Binary {
            if self.encryption.is_some() || self.encryption_key.is_some() {
                return Err(StoreError::Validation(
                    "binary encoding does not support encryption; clear the \
                     encryption settings or use the json encoding"
                        .to_string(),
                ));
            }
            if self.extension == "json" {
                self.extension = "bin".to_string();
            }
            self.tabspace = 0;
        }

        if let Some(algorithm) = self.encryption {
            let key = self.encryption_key.as_deref().ok_or_else(|| {
                StoreError::Validation(
                    "encryption key required when encryption is enabled".to_string(),
                )
            })?;
            algorithm.validate_key(key)?;
        }

        if self.object_id && self.encoding != Encoding::Binary {
            return Err(StoreError::Validation(
                "object_id requires the binary encoding".to_string(),
            ));
        }

        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_rejects_encryption() {
        let config = Config {
            encoding: Encoding::Binary,
            encryption: Some(Algorithm::Aes128Cbc),
            encryption_key: Some("00112233445566778899aabbccddeeff".to_string()),
            ..Config::default()
        };
        assert!(matches!(
            config.normalized(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn binary_forces_extension_and_tabspace() {
        let config = Config {
            encoding: Encoding::Binary,
            ..Config::default()
        };
        let config = config.normalized().unwrap();
        assert_eq!(config.extension, "bin");
        assert_eq!(config.tabspace, 0);
    }

    #[test]
    fn encryption_requires_key() {
        let config = Config {
            encryption: Some(Algorithm::Aes256Gcm),
            ..Config::default()
        };
        assert!(matches!(
            config.normalized(),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn key_length_checked_against_algorithm() {
        let config = Config {
            encryption: Some(Algorithm::Aes256Gcm),
            encryption_key: Some("00112233445566778899aabbccddeeff".to_string()),
            ..Config::default()
        };
        assert!(config.normalized().is_err());
    }

    #[test]
    fn object_id_requires_binary() {
        let config = Config {
            object_id: true,
            ..Config::default()
        };
        assert!(config.normalized().is_err());
    }
}
