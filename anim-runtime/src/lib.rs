//! # Anim Runtime
//!
//! 声明式 UI 的动画与状态机运行时。
//!
//! ## 架构概述
//!
//! `anim-runtime` 是纯逻辑核心，不依赖任何渲染引擎。宿主每帧把单调时间戳交给
//! [`Animator`]，由它推进所有任务树并把插值结果写回属性：
//!
//! ```text
//! Host                              Runtime
//!   │                                  │
//!   │──── advance(elapsed_ms) ────────►│ 推进任务树
//!   │                                  │ 写属性 / 触发回调
//!   │◄─── 本帧事件 / needs_tick() ─────│
//!   │                                  │
//! ```
//!
//! 状态机建立在任务树之上：[`StateGroup::set_state`] 计算属性变化，
//! 挑选 [`Transition`]，生成一棵任务树交给 `Animator` 播放，结束后恢复绑定。
//!
//! ## 核心类型
//!
//! - [`Animator`]：任务 arena、全局时钟与控制 API
//! - [`JobId`]：任务句柄，销毁后失效
//! - [`PropertyObject`] / [`Item`]：动画写入的目标
//! - [`StateGroup`] / [`State`] / [`Transition`]：状态与过渡
//! - [`Scene`]：从 JSON 组装节点、状态与过渡
//!
//! ## 使用示例
//!
//! ```ignore
//! use anim_runtime::{Animator, ClockConfig, Scene};
//!
//! let mut scene = Scene::from_json(&text)?;
//! let mut animator = Animator::new(ClockConfig::default());
//!
//! scene.set_state(&mut animator, "expanded");
//! while animator.needs_tick() {
//!     for (job, event) in animator.advance_by_source() {
//!         log_event(job, event);
//!     }
//!     render(scene.snapshot());
//! }
//! ```
//!
//! ## 模块结构
//!
//! - [`job`]：任务种类与分组
//! - [`animator`]：任务树状态机
//! - [`clock`]：全局时钟与时间源
//! - [`property`] / [`item`] / [`value`]：属性模型
//! - [`state`]：状态、过渡与过渡管理
//! - [`scene`] / [`diagnostic`]：场景描述与静态检查

pub mod animator;
pub mod clock;
pub mod config;
pub mod diagnostic;
pub mod easing;
pub mod error;
pub mod item;
pub mod job;
pub mod property;
pub mod scene;
pub mod state;
pub mod value;

// 重导出核心类型
pub use animator::Animator;
pub use clock::{ManualTime, MonotonicTime, TimeSource, TimerMode};
pub use config::{AnimationConfig, ClockConfig};
pub use diagnostic::{Diagnostic, DiagnosticLevel, DiagnosticResult, analyze_json, analyze_scene};
pub use easing::EasingFunction;
pub use error::{AnimError, AnimResult, ConfigError, JobError, SceneError};
pub use item::{AnchorLine, AnchorRef, Item, TransformOrigin};
pub use job::proxy::{RenderAnimation, RenderChannel, RenderThreadAnimator};
pub use job::{
    ActionJob, AnimatedProperty, Direction, JobEvent, JobId, JobKindTag, JobState, PauseJob,
    PropertyAnimationJob, PropertyUpdater, RotationDirection, SmoothedJob, UNCONTROLLED,
};
pub use property::{Binding, ObjectId, PropertyObject, PropertyRef, WriteFlags};
pub use scene::{Scene, SceneDesc};
pub use state::{
    AnimationTemplate, ParentTemplate, PropertyChanges, PropertySelector, PropertyTemplate,
    RotationTemplate, State, StateGroup, Transition,
};
pub use value::Value;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_api_accessible() {
        let mut animator =
            Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()));
        let pause = animator.create_pause(100);
        assert_eq!(animator.state(pause), JobState::Stopped);

        let obj = PropertyObject::new("box");
        obj.declare("x", 0.0);
        let mut group = StateGroup::new();
        group.add_state(
            State::builder("moved")
                .with(PropertyChanges::new(&obj).set("x", 10.0))
                .build(),
        );
        group.set_state(&mut animator, "moved");
        assert_eq!(obj.get("x"), Value::Number(10.0));
    }
}
