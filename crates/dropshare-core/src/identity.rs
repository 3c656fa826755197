//! 本地用户标识
//!
//! 首次使用时生成，保存在本地键值文件的固定键下，之后不再更换。
//! 它是上传时 `uploadedBy` 的默认值。

use log::{debug, info};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// 保存用户标识的键
pub const USER_ID_KEY: &str = "dropshare.user_id";

/// 生成新的用户标识
pub fn generate_user_id() -> String {
    format!("user-{:08x}", rand::random::<u32>())
}

/// 本地键值存储（TOML 文件）
#[derive(Debug, Clone)]
pub struct IdentityStore {
    path: PathBuf,
}

impl IdentityStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 默认位于配置目录下的 `dropshare/identity.toml`
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dropshare")
            .join("identity.toml")
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> anyhow::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self.read_all()?.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let mut values = self.read_all()?;
        values.insert(key.to_string(), value.to_string());

        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, toml::to_string(&values)?)?;
        Ok(())
    }

    /// 读取用户标识，不存在时生成并保存
    pub fn load_or_create(&self) -> anyhow::Result<String> {
        if let Some(id) = self.get(USER_ID_KEY)?.filter(|id| !id.is_empty()) {
            debug!("Loaded user id from {:?}", self.path);
            return Ok(id);
        }

        let id = generate_user_id();
        self.set(USER_ID_KEY, &id)?;
        info!("Generated new user id {}", id);
        Ok(id)
    }
}

impl Default for IdentityStore {
    fn default() -> Self {
        Self::new(Self::default_path())
    }
}
