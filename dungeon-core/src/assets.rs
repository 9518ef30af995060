//! Generated media cache.
//!
//! Images and audio are expensive to produce, so each one is generated at
//! most once per cache key and then served from disk forever. The index that
//! maps keys to files lives in `asset_index.json` under the cache root and is
//! rewritten after every change.
//!
//! Ordering rules:
//! - an artifact is fully written before the index mentions it
//! - concurrent misses on one key wait for the first generator and then hit
//! - a failed generation leaves the index untouched

use crate::storage::{write_atomic, KeyedLocks};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::fs;
use tokio::sync::RwLock;

/// Error type returned by asset generators.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

const INDEX_FILE: &str = "asset_index.json";
const IMAGE_DIR: &str = "images";
const AUDIO_DIR: &str = "audio";

/// Voices handed out to new NPCs when no roster is configured.
pub const DEFAULT_VOICES: &[&str] = &[
    "voice_en_male_deep_01",
    "voice_en_female_warm_01",
    "voice_en_male_gravel_02",
    "voice_en_female_bright_02",
    "voice_en_neutral_whisper_01",
];

/// Errors from the asset cache.
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("Generation failed for {key}: {reason}")]
    GenerationFailed { key: String, reason: String },

    #[error("Corrupt asset index at {path}: {reason}")]
    CorruptIndex { path: PathBuf, reason: String },

    #[error("Invalid cache key: {0:?}")]
    InvalidKey(String),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// What a generator hands back: the artifact itself or where to fetch it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GeneratedAsset {
    Bytes(Vec<u8>),
    Url(String),
}

impl TryFrom<serde_json::Value> for GeneratedAsset {
    type Error = AssetError;

    /// Accepts a bare URL string, `{"url": ...}`, `{"bytes": [...]}`, or a
    /// bare byte array. Anything else is `GenerationFailed` keyed `payload`.
    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        fn bytes_from(items: &[Value]) -> Option<Vec<u8>> {
            items
                .iter()
                .map(|v| v.as_u64().and_then(|n| u8::try_from(n).ok()))
                .collect()
        }

        let unrecognized = |v: &Value| {
            let shown: String = v.to_string().chars().take(80).collect();
            AssetError::GenerationFailed {
                key: "payload".to_string(),
                reason: format!("unrecognized payload {shown}"),
            }
        };

        match &value {
            Value::String(s) if s.starts_with("http://") || s.starts_with("https://") => {
                Ok(GeneratedAsset::Url(s.clone()))
            }
            Value::Array(items) => bytes_from(items)
                .map(GeneratedAsset::Bytes)
                .ok_or_else(|| unrecognized(&value)),
            Value::Object(map) => match (map.get("url"), map.get("bytes")) {
                (Some(Value::String(url)), None) => Ok(GeneratedAsset::Url(url.clone())),
                (None, Some(Value::Array(items))) => bytes_from(items)
                    .map(GeneratedAsset::Bytes)
                    .ok_or_else(|| unrecognized(&value)),
                _ => Err(unrecognized(&value)),
            },
            _ => Err(unrecognized(&value)),
        }
    }
}

/// The permanent voice and face of an NPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NpcAssets {
    pub voice_id: String,
    pub portrait_path: String,
    pub description_hash: String,
}

/// On-disk index of every cached artifact.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssetIndex {
    /// Room id to scene image.
    #[serde(default)]
    pub images: HashMap<String, PathBuf>,
    /// Audio key to clip.
    #[serde(default)]
    pub audio: HashMap<String, PathBuf>,
    #[serde(default)]
    pub npcs: HashMap<String, NpcAssets>,
}

/// Settings for an [`AssetCache`].
#[derive(Debug, Clone)]
pub struct AssetCacheConfig {
    pub root: PathBuf,
    /// Upper bound on one generation, including any download.
    pub generation_timeout: Duration,
    pub voices: Vec<String>,
}

impl AssetCacheConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            generation_timeout: Duration::from_secs(60),
            voices: DEFAULT_VOICES.iter().map(|v| v.to_string()).collect(),
        }
    }

    pub fn with_generation_timeout(mut self, timeout: Duration) -> Self {
        self.generation_timeout = timeout;
        self
    }

    pub fn with_voices(mut self, voices: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.voices = voices.into_iter().map(Into::into).collect();
        self
    }
}

#[derive(Debug, Clone, Copy)]
enum AssetKind {
    Image,
    Audio,
}

impl AssetKind {
    fn label(self) -> &'static str {
        match self {
            AssetKind::Image => "image",
            AssetKind::Audio => "audio",
        }
    }

    fn dir(self) -> &'static str {
        match self {
            AssetKind::Image => IMAGE_DIR,
            AssetKind::Audio => AUDIO_DIR,
        }
    }

    fn default_extension(self) -> &'static str {
        match self {
            AssetKind::Image => "png",
            AssetKind::Audio => "mp3",
        }
    }

    fn entries(self, index: &AssetIndex) -> &HashMap<String, PathBuf> {
        match self {
            AssetKind::Image => &index.images,
            AssetKind::Audio => &index.audio,
        }
    }

    fn entries_mut(self, index: &mut AssetIndex) -> &mut HashMap<String, PathBuf> {
        match self {
            AssetKind::Image => &mut index.images,
            AssetKind::Audio => &mut index.audio,
        }
    }
}

/// Hex SHA-256 of a prompt or description.
pub fn content_hash(text: &str) -> String {
    hex::encode(Sha256::digest(text.as_bytes()))
}

/// Content-addressed cache of generated scene images, audio and NPC casting.
#[derive(Debug)]
pub struct AssetCache {
    config: AssetCacheConfig,
    index_path: PathBuf,
    index: RwLock<AssetIndex>,
    locks: KeyedLocks,
    http: reqwest::Client,
}

impl AssetCache {
    /// Open the cache, creating its directories and loading the index.
    ///
    /// A missing index starts empty; an unreadable one is an error. Entries
    /// whose files have disappeared are dropped so they can be regenerated.
    pub async fn open(config: AssetCacheConfig) -> Result<Self, AssetError> {
        fs::create_dir_all(config.root.join(IMAGE_DIR)).await?;
        fs::create_dir_all(config.root.join(AUDIO_DIR)).await?;

        let index_path = config.root.join(INDEX_FILE);
        let mut index = match fs::read_to_string(&index_path).await {
            Ok(content) => {
                serde_json::from_str(&content).map_err(|e| AssetError::CorruptIndex {
                    path: index_path.clone(),
                    reason: e.to_string(),
                })?
            }
            Err(e) if e.kind() == ErrorKind::NotFound => AssetIndex::default(),
            Err(e) => return Err(e.into()),
        };

        let pruned = prune_missing(&mut index).await;

        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(config.generation_timeout)
            .build()?;

        let cache = Self {
            config,
            index_path,
            index: RwLock::new(index),
            locks: KeyedLocks::new(),
            http,
        };

        if pruned > 0 {
            tracing::warn!(pruned, "Dropped index entries whose files are missing");
            let index = cache.index.read().await;
            cache.persist_index(&index).await?;
        }

        Ok(cache)
    }

    pub fn root(&self) -> &Path {
        &self.config.root
    }

    /// A copy of the current index.
    pub async fn snapshot(&self) -> AssetIndex {
        self.index.read().await.clone()
    }

    /// The scene image for a room, generating it on first request.
    ///
    /// The room id is the cache key; the prompt only disambiguates the file
    /// name, so two rooms with the same prompt still get separate images.
    pub async fn get_scene_image<F, Fut>(
        &self,
        room_id: &str,
        prompt: &str,
        generate: F,
    ) -> Result<PathBuf, AssetError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<GeneratedAsset, BoxError>>,
    {
        self.cached_or_generate(AssetKind::Image, room_id, prompt, generate)
            .await
    }

    /// An audio clip (narration, ambience) keyed by `key`.
    pub async fn get_audio<F, Fut>(
        &self,
        key: &str,
        text: &str,
        generate: F,
    ) -> Result<PathBuf, AssetError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<GeneratedAsset, BoxError>>,
    {
        self.cached_or_generate(AssetKind::Audio, key, text, generate)
            .await
    }

    /// Voice and portrait for an NPC.
    ///
    /// The first call casts the NPC; later calls return the same record even
    /// if the description has changed.
    pub async fn get_npc_assets(
        &self,
        npc_id: &str,
        description: &str,
    ) -> Result<NpcAssets, AssetError> {
        validate_key(npc_id)?;

        if let Some(record) = self.index.read().await.npcs.get(npc_id).cloned() {
            return Ok(record);
        }

        let _guard = self.locks.lock(&format!("npc:{npc_id}")).await;
        if let Some(record) = self.index.read().await.npcs.get(npc_id).cloned() {
            return Ok(record);
        }

        let record = NpcAssets {
            voice_id: self.assign_voice(npc_id),
            portrait_path: format!("{IMAGE_DIR}/npc_{npc_id}.png"),
            description_hash: content_hash(description),
        };
        tracing::info!(npc_id, voice = %record.voice_id, "Cast new NPC");

        let key = npc_id.to_string();
        let stored = record.clone();
        self.record(move |index| {
            index.npcs.insert(key, stored);
        })
        .await?;

        Ok(record)
    }

    /// Same NPC id, same voice: the roster slot comes from a hash of the id.
    fn assign_voice(&self, npc_id: &str) -> String {
        let digest = Sha256::digest(npc_id.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let slot = u64::from_be_bytes(prefix);

        if self.config.voices.is_empty() {
            let roster = DEFAULT_VOICES;
            roster[(slot % roster.len() as u64) as usize].to_string()
        } else {
            let roster = &self.config.voices;
            roster[(slot % roster.len() as u64) as usize].clone()
        }
    }

    async fn lookup(&self, kind: AssetKind, key: &str) -> Option<PathBuf> {
        kind.entries(&*self.index.read().await).get(key).cloned()
    }

    async fn cached_or_generate<F, Fut>(
        &self,
        kind: AssetKind,
        key: &str,
        prompt: &str,
        generate: F,
    ) -> Result<PathBuf, AssetError>
    where
        F: FnOnce(String) -> Fut,
        Fut: Future<Output = Result<GeneratedAsset, BoxError>>,
    {
        validate_key(key)?;

        if let Some(path) = self.lookup(kind, key).await {
            tracing::info!(kind = kind.label(), key, "Asset cache hit");
            return Ok(path);
        }

        let _guard = self.locks.lock(&format!("{}:{key}", kind.label())).await;
        // Another caller may have generated it while we waited.
        if let Some(path) = self.lookup(kind, key).await {
            tracing::info!(kind = kind.label(), key, "Asset cache hit after wait");
            return Ok(path);
        }

        tracing::info!(kind = kind.label(), key, "Asset cache miss, generating");

        let hash = content_hash(prompt);
        let timeout = self.config.generation_timeout;
        let produced = tokio::time::timeout(timeout, async {
            let payload = generate(prompt.to_string())
                .await
                .map_err(|e| generation_failed(key, e.to_string()))?;
            self.materialize(kind, key, payload).await
        })
        .await;

        let (bytes, extension) = match produced {
            Ok(result) => result?,
            Err(_) => {
                return Err(generation_failed(
                    key,
                    format!("timed out after {timeout:?}"),
                ))
            }
        };

        let path = self
            .config
            .root
            .join(kind.dir())
            .join(format!("{key}_{}.{extension}", &hash[..8]));
        write_atomic(&path, &bytes).await?;

        let entry_key = key.to_string();
        let entry_path = path.clone();
        self.record(move |index| {
            kind.entries_mut(index).insert(entry_key, entry_path);
        })
        .await?;

        tracing::info!(kind = kind.label(), key, path = %path.display(), bytes = bytes.len(), "Stored generated asset");
        Ok(path)
    }

    /// Turn a payload into bytes and a file extension.
    async fn materialize(
        &self,
        kind: AssetKind,
        key: &str,
        payload: GeneratedAsset,
    ) -> Result<(Vec<u8>, String), AssetError> {
        let (bytes, extension) = match payload {
            GeneratedAsset::Bytes(bytes) => (bytes, kind.default_extension().to_string()),
            GeneratedAsset::Url(url) => {
                tracing::debug!(key, %url, "Fetching generated asset");
                let response = self
                    .http
                    .get(&url)
                    .send()
                    .await
                    .map_err(|e| generation_failed(key, format!("fetching {url}: {e}")))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(generation_failed(
                        key,
                        format!("fetching {url} returned {status}"),
                    ));
                }

                let bytes = response
                    .bytes()
                    .await
                    .map_err(|e| generation_failed(key, format!("reading {url}: {e}")))?;
                let extension = extension_from_url(&url)
                    .unwrap_or_else(|| kind.default_extension().to_string());
                (bytes.to_vec(), extension)
            }
        };

        if bytes.is_empty() {
            return Err(generation_failed(key, "empty payload".to_string()));
        }
        Ok((bytes, extension))
    }

    /// Apply a change to the index and persist it, rolling back on failure.
    async fn record(&self, update: impl FnOnce(&mut AssetIndex)) -> Result<(), AssetError> {
        let mut index = self.index.write().await;
        let previous = index.clone();
        update(&mut *index);

        if let Err(e) = self.persist_index(&*index).await {
            *index = previous;
            return Err(e);
        }
        Ok(())
    }

    async fn persist_index(&self, index: &AssetIndex) -> Result<(), AssetError> {
        let content = serde_json::to_vec_pretty(index)?;
        write_atomic(&self.index_path, &content).await?;
        Ok(())
    }
}

fn generation_failed(key: &str, reason: String) -> AssetError {
    tracing::warn!(key, %reason, "Asset generation failed");
    AssetError::GenerationFailed {
        key: key.to_string(),
        reason,
    }
}

/// Keys become file names, so they must not contain separators.
fn validate_key(key: &str) -> Result<(), AssetError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(AssetError::InvalidKey(key.to_string()))
    }
}

fn extension_from_url(url: &str) -> Option<String> {
    const KNOWN: &[&str] = &["png", "jpg", "jpeg", "webp", "gif", "mp3", "wav", "ogg"];

    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.last()?;
    let (_, extension) = last.rsplit_once('.')?;
    let extension = extension.to_lowercase();
    KNOWN.contains(&extension.as_str()).then_some(extension)
}

/// Drop file entries that no longer exist on disk. Returns how many went.
async fn prune_missing(index: &mut AssetIndex) -> usize {
    let mut missing = Vec::new();
    for (label, entries) in [("image", &index.images), ("audio", &index.audio)] {
        for (key, path) in entries {
            if !fs::try_exists(path).await.unwrap_or(false) {
                missing.push((label, key.clone()));
            }
        }
    }

    for (label, key) in &missing {
        match *label {
            "image" => index.images.remove(key),
            _ => index.audio.remove(key),
        };
    }
    missing.len()
}
