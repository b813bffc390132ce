//! # Config 模块
//!
//! 动画运行时配置。
//!
//! ## 配置优先级
//!
//! 1. 代码中显式构造的配置（最高）
//! 2. 配置文件 (animation.json)
//! 3. 默认值（最低）

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::easing::EasingFunction;
use crate::error::ConfigError;

/// 动画配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnimationConfig {
    /// 全局时钟配置
    #[serde(default)]
    pub clock: ClockConfig,

    /// 过渡未声明缓动时使用的默认缓动
    #[serde(default)]
    pub default_easing: EasingFunction,
}

/// 全局时钟配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClockConfig {
    /// 帧间隔（毫秒）
    #[serde(default = "default_timing_interval")]
    pub timing_interval_ms: i32,

    /// 固定步长模式
    ///
    /// 开启后每次 tick 都按 `timing_interval_ms` 前进，不读取真实耗时。
    /// 只有暂停计时器时除外。
    #[serde(default)]
    pub consistent_timing: bool,

    /// 慢放模式
    #[serde(default)]
    pub slow_mode: bool,

    /// 慢放倍率（delta 除以该值）
    #[serde(default = "default_slowdown_factor")]
    pub slowdown_factor: f64,

    /// 两次 tick 之间最多保留的顶层事件数，超出时丢弃最旧的
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

// 默认值函数
fn default_timing_interval() -> i32 {
    16
}

fn default_slowdown_factor() -> f64 {
    5.0
}

fn default_event_capacity() -> usize {
    1024
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            timing_interval_ms: default_timing_interval(),
            consistent_timing: false,
            slow_mode: false,
            slowdown_factor: default_slowdown_factor(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            clock: ClockConfig::default(),
            default_easing: EasingFunction::Linear,
        }
    }
}

impl AnimationConfig {
    /// 加载配置文件
    ///
    /// 如果文件不存在或解析失败，返回默认配置并记录警告。
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            warn!(path = %path.display(), "配置文件不存在，使用默认配置");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(config) => {
                    info!(path = %path.display(), "配置文件加载成功");
                    config
                }
                Err(e) => {
                    warn!(error = %e, "配置文件解析失败，使用默认配置");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(error = %e, "配置文件读取失败，使用默认配置");
                Self::default()
            }
        }
    }

    /// 保存配置到文件
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializationFailed(e.to_string()))?;
        fs::write(path, json).map_err(|e| ConfigError::Io(e.to_string()))?;
        Ok(())
    }

    /// 验证配置有效性
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.clock.validate()
    }
}

impl ClockConfig {
    /// 验证时钟配置
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing_interval_ms <= 0 {
            return Err(ConfigError::ValidationFailed(format!(
                "帧间隔必须大于 0，当前为 {}",
                self.timing_interval_ms
            )));
        }
        if !self.slowdown_factor.is_finite() || self.slowdown_factor < 1.0 {
            return Err(ConfigError::ValidationFailed(format!(
                "慢放倍率必须不小于 1.0，当前为 {}",
                self.slowdown_factor
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AnimationConfig::default();
        assert_eq!(config.clock.timing_interval_ms, 16);
        assert!(!config.clock.consistent_timing);
        assert_eq!(config.clock.slowdown_factor, 5.0);
        assert_eq!(config.clock.event_capacity, 1024);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: AnimationConfig =
            serde_json::from_str(r#"{ "clock": { "slow_mode": true } }"#).unwrap();
        assert!(config.clock.slow_mode);
        assert_eq!(config.clock.timing_interval_ms, 16);
        assert_eq!(config.default_easing, EasingFunction::Linear);
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = AnimationConfig::default();
        config.clock.timing_interval_ms = 0;
        assert!(config.validate().is_err());

        let mut config = AnimationConfig::default();
        config.clock.slowdown_factor = 0.5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = AnimationConfig::load("definitely/not/here/animation.json");
        assert_eq!(config, AnimationConfig::default());
    }
}
