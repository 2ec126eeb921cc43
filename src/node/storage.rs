//! On-disk node state: `keys.json` and `chain.json` under `<data-dir>/port-<port>/`

use crate::crypto::KeyPair;
use crate::types::Block;
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeysFile {
    secret_key: String,
    public_key: String,
}

#[derive(Debug, Clone)]
pub struct NodeStore {
    dir: PathBuf,
}

impl NodeStore {
    pub fn open<P: AsRef<Path>>(data_dir: P, port: u16) -> Result<Self> {
        let dir = data_dir.as_ref().join(format!("port-{}", port));
        fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create data directory {}", dir.display()))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn keys_path(&self) -> PathBuf {
        self.dir.join("keys.json")
    }

    fn chain_path(&self) -> PathBuf {
        self.dir.join("chain.json")
    }

    /// Load the node key pair, generating and saving one on first start
    pub fn load_or_generate_keys(&self) -> Result<KeyPair> {
        let path = self.keys_path();
        if !path.exists() {
            let keys = KeyPair::generate();
            let file = KeysFile {
                secret_key: hex::encode(keys.secret_bytes()),
                public_key: hex::encode(keys.public_bytes()),
            };
            write_atomic(&path, &serde_json::to_vec_pretty(&file)?)?;
            return Ok(keys);
        }

        let data = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let file: KeysFile = serde_json::from_slice(&data)
            .with_context(|| format!("malformed key file {}", path.display()))?;
        let secret = hex::decode(&file.secret_key).context("secret key is not hex")?;
        let keys = KeyPair::from_secret_bytes(&secret)?;
        if hex::encode(keys.public_bytes()) != file.public_key {
            bail!("public key in {} does not match its secret key", path.display());
        }
        Ok(keys)
    }

    /// Persisted chain, or `None` before the first save
    pub fn load_chain(&self) -> Result<Option<Vec<Block>>> {
        let path = self.chain_path();
        if !path.exists() {
            return Ok(None);
        }
        let data = fs::read(&path).with_context(|| format!("failed to read {}", path.display()))?;
        let chain = serde_json::from_slice(&data)
            .with_context(|| format!("malformed chain file {}", path.display()))?;
        Ok(Some(chain))
    }

    pub fn save_chain(&self, chain: &[Block]) -> Result<()> {
        write_atomic(&self.chain_path(), &serde_json::to_vec_pretty(chain)?)
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("json.tmp");
    fs::write(&tmp_path, data).with_context(|| format!("failed to write {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::genesis;

    fn scratch(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("ouro-store-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_keys_generated_once() {
        let root = scratch("keys");
        let store = NodeStore::open(&root, 4001).unwrap();
        let first = store.load_or_generate_keys().unwrap();
        let second = store.load_or_generate_keys().unwrap();
        assert_eq!(first.public_bytes(), second.public_bytes());
        assert!(store.dir().ends_with("port-4001"));
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_chain_roundtrip() {
        let root = scratch("chain");
        let store = NodeStore::open(&root, 4002).unwrap();
        assert!(store.load_chain().unwrap().is_none());
        store.save_chain(&[genesis()]).unwrap();
        assert_eq!(store.load_chain().unwrap(), Some(vec![genesis()]));
        assert!(!store.dir().join("chain.json.tmp").exists());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_mismatched_key_file_rejected() {
        let root = scratch("mismatch");
        let store = NodeStore::open(&root, 4003).unwrap();
        let keys = KeyPair::generate();
        let other = KeyPair::generate();
        let file = KeysFile {
            secret_key: hex::encode(keys.secret_bytes()),
            public_key: hex::encode(other.public_bytes()),
        };
        fs::write(store.dir().join("keys.json"), serde_json::to_vec(&file).unwrap()).unwrap();
        assert!(store.load_or_generate_keys().is_err());
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn test_malformed_chain_is_error() {
        let root = scratch("badchain");
        let store = NodeStore::open(&root, 4004).unwrap();
        fs::write(store.dir().join("chain.json"), b"{not json").unwrap();
        assert!(store.load_chain().is_err());
        fs::remove_dir_all(&root).unwrap();
    }
}
