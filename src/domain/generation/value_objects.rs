//! Generation Context - Value Objects

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PromptError;

/// 会话唯一标识（同时作为生成请求的幂等键）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 输出槽位标识（例如一条输出音轨）
///
/// 不变量: 同一槽位同时最多只有一个活跃会话
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotId(String);

impl SlotId {
    pub fn new(slot: impl Into<String>) -> Self {
        Self(slot.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl std::fmt::Display for SlotId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SlotId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

/// Prompt 校验边界
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptLimits {
    /// 文本最大字符数
    pub max_chars: usize,
    /// 目标时长下限（秒）
    pub min_duration_secs: u32,
    /// 目标时长上限（秒）
    pub max_duration_secs: u32,
}

impl Default for PromptLimits {
    fn default() -> Self {
        Self {
            max_chars: 1000,
            min_duration_secs: 5,
            max_duration_secs: 120,
        }
    }
}

/// 文本提示词
///
/// 不可变值对象: 文本在构造时去除首尾空白，使用前必须通过 `validate`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prompt {
    text: String,
    duration_secs: Option<u32>,
    style: Option<String>,
    seed: Option<u64>,
}

impl Prompt {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into().trim().to_string(),
            duration_secs: None,
            style: None,
            seed: None,
        }
    }

    pub fn with_duration_secs(mut self, secs: u32) -> Self {
        self.duration_secs = Some(secs);
        self
    }

    pub fn with_style(mut self, style: impl Into<String>) -> Self {
        let style = style.into();
        self.style = if style.trim().is_empty() {
            None
        } else {
            Some(style.trim().to_string())
        };
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// 校验文本与时长是否在允许范围内
    pub fn validate(&self, limits: &PromptLimits) -> Result<(), PromptError> {
        if self.text.is_empty() {
            return Err(PromptError::Empty);
        }

        let chars = self.text.chars().count();
        if chars > limits.max_chars {
            return Err(PromptError::TooLong {
                chars,
                max: limits.max_chars,
            });
        }

        if let Some(secs) = self.duration_secs {
            if secs < limits.min_duration_secs || secs > limits.max_duration_secs {
                return Err(PromptError::DurationOutOfRange {
                    secs,
                    min: limits.min_duration_secs,
                    max: limits.max_duration_secs,
                });
            }
        }

        Ok(())
    }

    // Getters
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn duration_secs(&self) -> Option<u32> {
        self.duration_secs
    }

    pub fn style(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_is_trimmed() {
        let prompt = Prompt::new("  upbeat 30s intro \n");
        assert_eq!(prompt.text(), "upbeat 30s intro");
    }

    #[test]
    fn test_empty_prompt_rejected() {
        let limits = PromptLimits::default();
        assert!(matches!(
            Prompt::new("   ").validate(&limits),
            Err(PromptError::Empty)
        ));
    }

    #[test]
    fn test_duration_bounds() {
        let limits = PromptLimits::default();
        assert!(Prompt::new("lofi").with_duration_secs(30).validate(&limits).is_ok());
        assert!(Prompt::new("lofi").with_duration_secs(5).validate(&limits).is_ok());
        assert!(Prompt::new("lofi").with_duration_secs(120).validate(&limits).is_ok());
        assert!(matches!(
            Prompt::new("lofi").with_duration_secs(4).validate(&limits),
            Err(PromptError::DurationOutOfRange { secs: 4, .. })
        ));
        assert!(Prompt::new("lofi").with_duration_secs(121).validate(&limits).is_err());
    }

    #[test]
    fn test_too_long_prompt_rejected() {
        let limits = PromptLimits {
            max_chars: 8,
            ..Default::default()
        };
        assert!(matches!(
            Prompt::new("a very long prompt").validate(&limits),
            Err(PromptError::TooLong { max: 8, .. })
        ));
    }

    #[test]
    fn test_blank_style_is_dropped() {
        let prompt = Prompt::new("jazz").with_style("  ");
        assert_eq!(prompt.style(), None);
    }
}
