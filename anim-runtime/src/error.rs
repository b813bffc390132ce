//! # Error 模块
//!
//! 定义 anim-runtime 中使用的错误类型。
//!
//! 动画控制调用（start/stop/seek）从不返回错误，只有构建期操作
//! （组装任务树、加载场景、校验配置）才会返回 `Result`。

use thiserror::Error;

use crate::job::JobId;

/// 任务树构建错误
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    /// 任务句柄已失效
    #[error("任务 {0} 不存在或已被销毁")]
    NotFound(JobId),

    /// 目标任务不是分组
    #[error("任务 {0} 不是动画分组，无法添加子任务")]
    NotAGroup(JobId),

    /// 形成环
    #[error("不能把任务 {child} 加入 {group}：会形成环")]
    CyclicGroup { group: JobId, child: JobId },

    /// 子任务不属于该分组
    #[error("任务 {child} 不是分组 {group} 的子任务")]
    NotAChild { group: JobId, child: JobId },
}

/// 场景加载错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SceneError {
    /// JSON 解析失败
    #[error("场景解析失败: {0}")]
    Parse(String),

    /// 引用了未定义的对象
    #[error("未知对象 '{name}'（{context}）")]
    UnknownObject { name: String, context: String },

    /// 对象重复定义
    #[error("对象 '{0}' 重复定义")]
    DuplicateObject(String),
}

/// 配置错误
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// 序列化失败
    #[error("序列化失败: {0}")]
    SerializationFailed(String),

    /// IO 错误
    #[error("IO 错误: {0}")]
    Io(String),

    /// 配置校验失败
    #[error("配置验证失败: {0}")]
    ValidationFailed(String),
}

/// anim-runtime 统一错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnimError {
    /// 任务树错误
    #[error("任务错误: {0}")]
    Job(#[from] JobError),

    /// 场景错误
    #[error("场景错误: {0}")]
    Scene(#[from] SceneError),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
}

/// Result 类型别名
pub type AnimResult<T> = Result<T, AnimError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SceneError::UnknownObject {
            name: "rect".to_string(),
            context: "状态 moved".to_string(),
        };
        assert_eq!(err.to_string(), "未知对象 'rect'（状态 moved）");

        let err: AnimError = ConfigError::ValidationFailed("x".to_string()).into();
        assert_eq!(err.to_string(), "配置错误: 配置验证失败: x");
    }
}
