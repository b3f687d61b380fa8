//! Configuration management

use crate::consensus::{pow, ProofOfAuthority, ProofOfWork, Seal};
use crate::crypto::KeyPair;
use crate::error::ChainError;
use primitive_types::U512;
use serde::{Deserialize, Deserializer};
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub consensus: ConsensusConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SealKind {
    #[default]
    Work,
    Authority,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub kind: SealKind,
    pub work: WorkConfig,
    pub authority: Option<AuthorityConfig>,
}

/// Targets accept decimal (`"452312848583266388373324160190187140051835877600158453279131187530910662656"`),
/// hex (`"0x1000"`) or power-of-two (`"2^248"`) notation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorkConfig {
    #[serde(deserialize_with = "deserialize_target")]
    pub initial_target: U512,
    #[serde(deserialize_with = "deserialize_target")]
    pub max_target: U512,
    pub retarget_window: u64,
    pub target_block_time_secs: u64,
}

impl Default for WorkConfig {
    fn default() -> Self {
        Self {
            initial_target: pow::initial_target(),
            max_target: pow::max_weight(),
            retarget_window: pow::DIFFICULTY_ADJUSTMENT_INTERVAL,
            target_block_time_secs: pow::TARGET_BLOCK_TIME,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthorityConfig {
    /// Compressed secp256k1 public key, hex.
    pub public_key: String,
    /// Present only on the node allowed to seal blocks.
    #[serde(default)]
    pub secret_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_data_dir(),
        }
    }
}

fn default_data_dir() -> String {
    "./data/chain.db".to_string()
}

pub fn parse_target(raw: &str) -> Result<U512, ChainError> {
    let raw = raw.trim();
    let invalid = || ChainError::ConfigError(format!("invalid target '{}'", raw));
    if let Some(exponent) = raw.strip_prefix("2^") {
        let exponent: usize = exponent.trim().parse().map_err(|_| invalid())?;
        if exponent >= 512 {
            return Err(invalid());
        }
        Ok(U512::one() << exponent)
    } else if let Some(digits) = raw.strip_prefix("0x") {
        U512::from_str_radix(digits, 16).map_err(|_| invalid())
    } else {
        U512::from_dec_str(raw).map_err(|_| invalid())
    }
}

fn deserialize_target<'de, D>(deserializer: D) -> Result<U512, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_target(&raw).map_err(serde::de::Error::custom)
}

impl Config {
    pub fn from_toml_str(config_str: &str) -> Result<Self, ChainError> {
        let config: Config = toml::from_str(config_str)
            .map_err(|e| ChainError::ConfigError(format!("failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ChainError> {
        let work = &self.consensus.work;
        if work.retarget_window == 0 {
            return Err(ChainError::ConfigError("consensus.work.retarget_window must be at least 1".into()));
        }
        if work.target_block_time_secs == 0 {
            return Err(ChainError::ConfigError(
                "consensus.work.target_block_time_secs must be at least 1".into(),
            ));
        }
        if work.max_target.is_zero() {
            return Err(ChainError::ConfigError("consensus.work.max_target must be positive".into()));
        }
        if self.consensus.kind == SealKind::Authority && self.consensus.authority.is_none() {
            return Err(ChainError::ConfigError(
                "consensus.authority must be set when consensus.kind = \"authority\"".into(),
            ));
        }
        if self.database.path.is_empty() {
            return Err(ChainError::ConfigError("database.path must be set".into()));
        }
        Ok(())
    }
}

impl ConsensusConfig {
    pub fn build_seal(&self) -> Result<Seal, ChainError> {
        match self.kind {
            SealKind::Work => Ok(ProofOfWork {
                initial_target: self.work.initial_target,
                max_target: self.work.max_target,
                retarget_window: self.work.retarget_window,
                target_block_time: self.work.target_block_time_secs,
            }
            .into()),
            SealKind::Authority => {
                let authority = self
                    .authority
                    .as_ref()
                    .ok_or_else(|| ChainError::ConfigError("consensus.authority is missing".into()))?;
                let public_key = hex::decode(authority.public_key.trim()).map_err(|e| {
                    ChainError::ConfigError(format!("consensus.authority.public_key is not hex: {}", e))
                })?;
                match &authority.secret_key {
                    Some(secret) => {
                        let keypair = KeyPair::from_secret_hex(secret.trim())?;
                        if keypair.public_key_bytes().as_slice() != public_key.as_slice() {
                            return Err(ChainError::ConfigError(
                                "consensus.authority.secret_key does not match public_key".into(),
                            ));
                        }
                        Ok(ProofOfAuthority::with_signer(keypair).into())
                    }
                    None => Ok(ProofOfAuthority::new(&public_key)?.into()),
                }
            }
        }
    }
}

/// Reads the TOML file at `path`; a missing file yields the defaults.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ChainError> {
    let path = path.as_ref();
    match fs::read_to_string(path) {
        Ok(config_str) => Config::from_toml_str(&config_str),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("No config at {}, using defaults", path.display());
            let config = Config::default();
            config.validate()?;
            Ok(config)
        }
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.consensus.kind, SealKind::Work);
        assert_eq!(config.consensus.work.initial_target, U512::one() << 248);
        assert_eq!(config.consensus.work.retarget_window, 10);
        assert!(config.validate().is_ok());
        assert!(matches!(config.consensus.build_seal().unwrap(), Seal::Work(_)));
    }

    #[test]
    fn test_parse_target_notations() {
        assert_eq!(parse_target("2^248").unwrap(), U512::one() << 248);
        assert_eq!(parse_target("0x100").unwrap(), U512::from(256u32));
        assert_eq!(parse_target("12345").unwrap(), U512::from(12345u32));
        assert!(parse_target("2^512").is_err());
        assert!(parse_target("lots").is_err());
    }

    #[test]
    fn test_work_section() {
        let config = Config::from_toml_str(
            r#"
            [consensus]
            kind = "work"

            [consensus.work]
            initial_target = "2^252"
            retarget_window = 5
            target_block_time_secs = 12

            [database]
            path = "chain.db"
            "#,
        )
        .unwrap();
        match config.consensus.build_seal().unwrap() {
            Seal::Work(pow) => {
                assert_eq!(pow.initial_target, U512::one() << 252);
                assert_eq!(pow.max_target, U512::one() << 256);
                assert_eq!(pow.retarget_window, 5);
                assert_eq!(pow.target_block_time, 12);
            }
            other => panic!("unexpected seal {:?}", other),
        }
        assert_eq!(config.database.path, "chain.db");
    }

    #[test]
    fn test_authority_section() {
        let keypair = KeyPair::generate();
        let public_hex = hex::encode(keypair.public_key_bytes());
        let secret_hex = hex::encode(keypair.secret_key.secret_bytes());

        let signer = Config::from_toml_str(&format!(
            "[consensus]\nkind = \"authority\"\n[consensus.authority]\npublic_key = \"{}\"\nsecret_key = \"{}\"\n",
            public_hex, secret_hex
        ))
        .unwrap();
        match signer.consensus.build_seal().unwrap() {
            Seal::Authority(poa) => assert!(poa.can_sign()),
            other => panic!("unexpected seal {:?}", other),
        }

        let verifier = Config::from_toml_str(&format!(
            "[consensus]\nkind = \"authority\"\n[consensus.authority]\npublic_key = \"{}\"\n",
            public_hex
        ))
        .unwrap();
        match verifier.consensus.build_seal().unwrap() {
            Seal::Authority(poa) => assert!(!poa.can_sign()),
            other => panic!("unexpected seal {:?}", other),
        }

        let mismatched = Config::from_toml_str(&format!(
            "[consensus]\nkind = \"authority\"\n[consensus.authority]\npublic_key = \"{}\"\nsecret_key = \"{}\"\n",
            hex::encode(KeyPair::generate().public_key_bytes()),
            secret_hex
        ))
        .unwrap();
        assert!(matches!(mismatched.consensus.build_seal(), Err(ChainError::ConfigError(_))));
    }

    #[test]
    fn test_validation_errors() {
        assert!(Config::from_toml_str("[consensus]\nkind = \"authority\"\n").is_err());
        assert!(Config::from_toml_str("[consensus.work]\nretarget_window = 0\n").is_err());
        assert!(Config::from_toml_str("[consensus.work]\ntarget_block_time_secs = 0\n").is_err());
        assert!(Config::from_toml_str("[consensus]\nkind = \"stake\"\n").is_err());
        assert!(Config::from_toml_str("[database]\npath = \"\"\n").is_err());
    }

    #[test]
    fn test_load_config_file_and_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = load_config(dir.path().join("absent.toml")).unwrap();
        assert_eq!(missing.database.path, "./data/chain.db");

        let path = dir.path().join("config.toml");
        let mut file = fs::File::create(&path).unwrap();
        writeln!(file, "[consensus.work]\ninitial_target = \"0x10\"").unwrap();
        let loaded = load_config(&path).unwrap();
        assert_eq!(loaded.consensus.work.initial_target, U512::from(16u8));
    }
}
