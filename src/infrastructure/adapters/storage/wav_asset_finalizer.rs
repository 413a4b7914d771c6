//! WAV Asset Finalizer - 把音频缓冲区写成 WAV 文件
//!
//! 写入流程: 临时文件 → fsync → 硬链接到目标名。目标名已存在时链接失败，
//! 换下一个后缀重试，已有文件不会被覆盖。任何失败（包括 future 被丢弃）
//! 都由 `FileGuard` 清理临时文件和已占用但未交付的目标文件。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use uuid::Uuid;

use crate::application::ports::{AssetFinalizerPort, AssetProvenance, AssetRecord, FinalizeError};
use crate::domain::audio::wav;
use crate::domain::{ChunkBuffer, WavInfo};

const FILE_PREFIX: &str = "composition";
const FALLBACK_HINT: &str = "music";
const MAX_HINT_CHARS: usize = 30;
const TEMP_DIR_NAME: &str = "cadenza";
const MAX_NAME_ATTEMPTS: u32 = 10_000;

/// Finalizer 配置
#[derive(Debug, Clone)]
pub struct WavAssetFinalizerConfig {
    /// 默认输出目录，未设置时使用系统临时目录
    pub output_dir: Option<PathBuf>,
    /// 是否写出 TOML 元数据文件
    pub write_sidecar: bool,
}

impl Default for WavAssetFinalizerConfig {
    fn default() -> Self {
        Self {
            output_dir: None,
            write_sidecar: true,
        }
    }
}

/// WAV 资产写出器
pub struct WavAssetFinalizer {
    config: WavAssetFinalizerConfig,
}

impl WavAssetFinalizer {
    pub fn new(config: WavAssetFinalizerConfig) -> Self {
        Self { config }
    }

    pub fn with_output_dir(output_dir: impl Into<PathBuf>) -> Self {
        Self::new(WavAssetFinalizerConfig {
            output_dir: Some(output_dir.into()),
            ..Default::default()
        })
    }
}

impl Default for WavAssetFinalizer {
    fn default() -> Self {
        Self::new(WavAssetFinalizerConfig::default())
    }
}

/// 元数据文件内容
#[derive(Debug, Serialize, Deserialize)]
struct AssetSidecar {
    file: String,
    session_id: String,
    prompt: String,
    requested_duration_secs: Option<u32>,
    style: Option<String>,
    seed: Option<u64>,
    created_at: String,
    truncated: bool,
    duration_secs: f64,
    chunk_count: usize,
    sample_rate: u32,
    channels: u16,
}

/// 写入期间持有的文件，未 disarm 时在 drop 中删除
///
/// 临时文件始终由它清理；已占用的目标文件在记录返回前也由它看守
struct FileGuard {
    path: PathBuf,
    armed: bool,
}

impl FileGuard {
    fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    fn path(&self) -> &Path {
        &self.path
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for FileGuard {
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Failed to remove unfinished asset file"
                    );
                }
            }
        }
    }
}

/// 文件名中的提示词部分: 非字母数字字符替换为下划线，最多 30 个字符
pub fn sanitize_hint(hint: &str) -> String {
    let sanitized: String = hint
        .chars()
        .take(MAX_HINT_CHARS)
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = sanitized.trim_matches('_');
    if trimmed.is_empty() {
        FALLBACK_HINT.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `composition_<YYYYmmdd_HHMMSS>_<hint>`
pub fn asset_stem(name_hint: &str, created_at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        FILE_PREFIX,
        created_at.format("%Y%m%d_%H%M%S"),
        sanitize_hint(name_hint)
    )
}

/// 第 n 个候选文件名: `stem`、`stem_2`、`stem_3` ...
fn candidate_stem(stem: &str, n: u32) -> String {
    if n <= 1 {
        stem.to_string()
    } else {
        format!("{}_{}", stem, n)
    }
}

/// 写出并 fsync 一个临时文件
async fn write_temp(
    destination: &Path,
    label: &str,
    parts: impl IntoIterator<Item = impl AsRef<[u8]>>,
) -> Result<FileGuard, FinalizeError> {
    let temp_path = destination.join(format!(".{}.{}.partial", label, Uuid::new_v4().simple()));
    let guard = FileGuard::new(temp_path.clone());

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&temp_path)
        .await?;
    for part in parts {
        file.write_all(part.as_ref()).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(guard)
}

/// 以硬链接原子占用目标文件名
///
/// 目标已存在时返回 `Ok(None)`，已有文件不会被替换
async fn claim(temp: &FileGuard, final_path: &Path) -> Result<Option<FileGuard>, FinalizeError> {
    match fs::hard_link(temp.path(), final_path).await {
        Ok(()) => Ok(Some(FileGuard::new(final_path.to_path_buf()))),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(None),
        Err(e) => Err(e.into()),
    }
}

impl WavAssetFinalizer {
    async fn write_asset(
        &self,
        buffer: &ChunkBuffer,
        destination: &Path,
        name_hint: &str,
        provenance: &AssetProvenance,
        created_at: DateTime<Utc>,
    ) -> Result<AssetRecord, FinalizeError> {
        let snapshot = buffer.read_playable_through();
        if snapshot.is_empty() {
            return Err(FinalizeError::EmptyBuffer);
        }

        let spec = buffer.spec();
        let byte_len = snapshot.playable_bytes;
        let header = wav::encode_header(&spec, byte_len)
            .map_err(|e| FinalizeError::InvalidAudio(e.to_string()))?;

        fs::create_dir_all(destination).await?;

        let base = asset_stem(name_hint, created_at);
        let mut parts: Vec<bytes::Bytes> = Vec::with_capacity(snapshot.chunk_count + 1);
        parts.push(bytes::Bytes::copy_from_slice(&header));
        parts.extend(snapshot.segments());
        let wav_temp = write_temp(destination, &format!("{}.wav", base), parts).await?;

        for n in 1..=MAX_NAME_ATTEMPTS {
            let stem = candidate_stem(&base, n);
            let path = destination.join(format!("{}.wav", stem));
            let Some(wav_claim) = claim(&wav_temp, &path).await? else {
                continue;
            };

            let mut record = AssetRecord {
                path,
                sidecar_path: None,
                duration_secs: spec.duration_secs(byte_len),
                prompt: provenance.prompt.clone(),
                session_id: provenance.session_id,
                created_at,
                truncated: !snapshot.complete,
                chunk_count: snapshot.chunk_count,
                byte_len,
                sample_rate: spec.sample_rate,
                channels: spec.channels,
            };

            let mut sidecar_claim = None;
            if self.config.write_sidecar {
                let sidecar_path = destination.join(format!("{}.toml", stem));
                let content = encode_sidecar(&record)?;
                let sidecar_temp =
                    write_temp(destination, &format!("{}.toml", stem), [content.into_bytes()])
                        .await?;
                // 元数据文件名被占用时放弃这个候选，wav_claim 被 drop 后删除
                let Some(claimed) = claim(&sidecar_temp, &sidecar_path).await? else {
                    continue;
                };
                record.sidecar_path = Some(sidecar_path);
                sidecar_claim = Some(claimed);
            }

            wav_claim.disarm();
            if let Some(claimed) = sidecar_claim {
                claimed.disarm();
            }

            tracing::info!(
                path = %record.path.display(),
                session_id = %record.session_id,
                bytes = byte_len,
                chunks = record.chunk_count,
                truncated = record.truncated,
                "Asset written"
            );
            return Ok(record);
        }

        Err(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("no free file name for {} in {}", base, destination.display()),
        )
        .into())
    }
}

#[async_trait]
impl AssetFinalizerPort for WavAssetFinalizer {
    async fn finalize(
        &self,
        buffer: &ChunkBuffer,
        destination: &Path,
        name_hint: &str,
        provenance: &AssetProvenance,
    ) -> Result<AssetRecord, FinalizeError> {
        self.write_asset(buffer, destination, name_hint, provenance, Utc::now())
            .await
    }

    fn default_destination(&self) -> PathBuf {
        self.config
            .output_dir
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(TEMP_DIR_NAME))
    }
}

fn encode_sidecar(record: &AssetRecord) -> Result<String, FinalizeError> {
    let sidecar = AssetSidecar {
        file: record
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default(),
        session_id: record.session_id.to_string(),
        prompt: record.prompt.text().to_string(),
        requested_duration_secs: record.prompt.duration_secs(),
        style: record.prompt.style().map(str::to_string),
        seed: record.prompt.seed(),
        created_at: record.created_at.to_rfc3339(),
        truncated: record.truncated,
        duration_secs: record.duration_secs,
        chunk_count: record.chunk_count,
        sample_rate: record.sample_rate,
        channels: record.channels,
    };
    toml::to_string_pretty(&sidecar)
        .map_err(|e| FinalizeError::InvalidAudio(format!("failed to encode metadata: {}", e)))
}

/// 读取已写出的 WAV 并校验头部
///
/// 宿主导入前调用；零帧文件会记录警告但不视为错误
pub async fn inspect_wav(path: impl AsRef<Path>) -> Result<WavInfo, FinalizeError> {
    let path = path.as_ref();
    let data = fs::read(path).await?;
    let info = wav::parse(&data).map_err(|e| FinalizeError::InvalidAudio(e.to_string()))?;
    if info.is_empty() {
        tracing::warn!(path = %path.display(), "Audio file contains no frames");
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AudioChunk, AudioSpec, Prompt, SessionId};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn provenance() -> AssetProvenance {
        AssetProvenance {
            session_id: SessionId::new(),
            prompt: Prompt::new("upbeat 30s intro").with_duration_secs(30),
        }
    }

    fn buffer_with(chunks: u64, complete: bool) -> ChunkBuffer {
        let buffer = ChunkBuffer::new(AudioSpec::default());
        for i in 0..chunks {
            buffer.append(AudioChunk::new(i, vec![i as u8; 400])).unwrap();
        }
        if complete {
            buffer.mark_complete();
        }
        buffer
    }

    fn leftover_partials(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count()
    }

    #[test]
    fn test_sanitize_hint() {
        assert_eq!(sanitize_hint("upbeat 30s intro"), "upbeat_30s_intro");
        assert_eq!(sanitize_hint("  !!  "), "music");
        assert_eq!(sanitize_hint(""), "music");
        assert_eq!(sanitize_hint(&"a".repeat(50)).len(), 30);
    }

    #[tokio::test]
    async fn test_finalize_complete_buffer() {
        let dir = TempDir::new().unwrap();
        let finalizer = WavAssetFinalizer::default();
        let buffer = buffer_with(5, true);

        let record = finalizer
            .finalize(&buffer, dir.path(), "upbeat 30s intro", &provenance())
            .await
            .unwrap();

        assert!(!record.truncated);
        assert_eq!(record.chunk_count, 5);
        assert_eq!(record.byte_len, 2000);
        let name = record.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("composition_"));
        assert!(name.ends_with("_upbeat_30s_intro.wav"));

        let info = inspect_wav(&record.path).await.unwrap();
        assert_eq!(info.data_size, 2000);
        assert_eq!(info.sample_rate, 48000);

        let sidecar = std::fs::read_to_string(record.sidecar_path.unwrap()).unwrap();
        assert!(sidecar.contains("truncated = false"));
        assert!(sidecar.contains("upbeat 30s intro"));
        assert_eq!(leftover_partials(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_truncated_flag_and_no_overwrite() {
        let dir = TempDir::new().unwrap();
        let finalizer = WavAssetFinalizer::new(WavAssetFinalizerConfig {
            output_dir: None,
            write_sidecar: false,
        });
        let buffer = buffer_with(3, false);

        let first = finalizer
            .finalize(&buffer, dir.path(), "take", &provenance())
            .await
            .unwrap();
        let second = finalizer
            .finalize(&buffer, dir.path(), "take", &provenance())
            .await
            .unwrap();

        assert!(first.truncated);
        assert!(first.sidecar_path.is_none());
        assert_ne!(first.path, second.path);
        assert!(first.path.exists() && second.path.exists());
    }

    #[tokio::test]
    async fn test_empty_buffer_rejected() {
        let dir = TempDir::new().unwrap();
        let finalizer = WavAssetFinalizer::default();
        let buffer = ChunkBuffer::new(AudioSpec::default());

        let err = finalizer
            .finalize(&buffer, dir.path(), "x", &provenance())
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::EmptyBuffer));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_unwritable_destination_is_io_error() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"file").unwrap();

        let finalizer = WavAssetFinalizer::default();
        let err = finalizer
            .finalize(&buffer_with(2, true), &blocker, "x", &provenance())
            .await
            .unwrap_err();
        assert!(matches!(err, FinalizeError::Io(_)));
    }

    fn files_in(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .filter_map(Result::ok)
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_finalize_never_overwrites() {
        let dir = TempDir::new().unwrap();
        let finalizer = Arc::new(WavAssetFinalizer::default());

        let mut tasks = Vec::new();
        for fill in 0..8u8 {
            let finalizer = finalizer.clone();
            let destination = dir.path().to_path_buf();
            tasks.push(tokio::spawn(async move {
                let buffer = ChunkBuffer::new(AudioSpec::default());
                for seq in 0..4 {
                    buffer
                        .append(AudioChunk::new(seq, vec![fill; 256 * 1024]))
                        .unwrap();
                }
                buffer.mark_complete();
                let record = finalizer
                    .finalize(&buffer, &destination, "same", &provenance())
                    .await
                    .unwrap();
                (fill, record)
            }));
        }

        let mut paths = std::collections::HashSet::new();
        for task in tasks {
            let (fill, record) = task.await.unwrap();
            let data = std::fs::read(&record.path).unwrap();
            assert_eq!(data.len(), 44 + 4 * 256 * 1024);
            assert!(data[44..].iter().all(|b| *b == fill));
            assert!(record.sidecar_path.as_ref().unwrap().exists());
            paths.insert(record.path);
        }
        assert_eq!(paths.len(), 8);

        let names = files_in(dir.path());
        assert_eq!(names.iter().filter(|n| n.ends_with(".wav")).count(), 8);
        assert_eq!(names.iter().filter(|n| n.ends_with(".toml")).count(), 8);
        assert_eq!(leftover_partials(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_taken_sidecar_name_moves_to_next_suffix() {
        let dir = TempDir::new().unwrap();
        let finalizer = WavAssetFinalizer::default();
        let created_at = Utc::now();
        let stem = asset_stem("take", created_at);
        let foreign = dir.path().join(format!("{}.toml", stem));
        std::fs::write(&foreign, b"keep me").unwrap();

        let record = finalizer
            .write_asset(&buffer_with(2, true), dir.path(), "take", &provenance(), created_at)
            .await
            .unwrap();

        assert_eq!(record.path, dir.path().join(format!("{}_2.wav", stem)));
        assert_eq!(
            record.sidecar_path,
            Some(dir.path().join(format!("{}_2.toml", stem)))
        );
        // 占用过的第一个候选已被撤回
        assert!(!dir.path().join(format!("{}.wav", stem)).exists());
        assert_eq!(std::fs::read(&foreign).unwrap(), b"keep me");
        assert_eq!(leftover_partials(dir.path()), 0);
    }

    #[tokio::test]
    async fn test_interrupted_finalize_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let finalizer = WavAssetFinalizer::default();
        let buffer = buffer_with(64, true);

        let interrupted = tokio::time::timeout(
            std::time::Duration::ZERO,
            finalizer.finalize(&buffer, dir.path(), "take", &provenance()),
        )
        .await;
        assert!(interrupted.is_err());
        assert!(files_in(dir.path()).is_empty());

        let record = finalizer
            .finalize(&buffer, dir.path(), "take", &provenance())
            .await
            .unwrap();
        assert!(record.path.to_string_lossy().ends_with("_take.wav"));
    }

    #[test]
    fn test_guard_removes_file_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(".a.wav.partial");
        std::fs::write(&path, b"half").unwrap();
        drop(FileGuard::new(path.clone()));
        assert!(!path.exists());
    }

    #[test]
    fn test_default_destination() {
        let finalizer = WavAssetFinalizer::default();
        assert!(finalizer.default_destination().ends_with("cadenza"));
        let finalizer = WavAssetFinalizer::with_output_dir("/tmp/out");
        assert_eq!(finalizer.default_destination(), PathBuf::from("/tmp/out"));
    }
}
