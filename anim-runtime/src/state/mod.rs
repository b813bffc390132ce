//! # State 模块
//!
//! 声明式状态机：`StateGroup` 持有命名状态与过渡，切换状态时
//! 计算动作列表、继承回滚列表，并由过渡模板生成动画任务。
//!
//! ## 使用示例
//!
//! ```ignore
//! let mut group = StateGroup::new();
//! group.add_state(
//!     State::builder("moved")
//!         .with(PropertyChanges::new(&rect).set("x", 100.0))
//!         .build(),
//! );
//! group.add_transition(Transition::any().with_animation(
//!     PropertyTemplate::new(PropertySelector::new("x")).with_duration(200),
//! ));
//! group.set_state(&mut animator, "moved");
//! ```

mod action;
mod event;
mod group;
mod manager;
mod operation;
#[allow(clippy::module_inception)]
mod state;
mod transition;

pub use action::{ChangeValue, SimpleAction, StateAction};
pub use event::{
    ActionEvent, AnchorChanges, EventKind, EventRef, PARENT_CHANGE_PROPERTIES, ParentChange,
    ReplaceSignalHandler, Script, StateChangeScript,
};
pub use group::StateGroup;
pub use operation::{PropertyChanges, StateOperation};
pub use state::{State, StateBuilder, WhenPredicate};
pub use transition::{
    AnchorTemplate, AnimationTemplate, DEFAULT_DURATION, ParentTemplate, PropertyActionTemplate,
    PropertySelector, PropertyTemplate, RotationTemplate, ScriptActionTemplate, SmoothedTemplate,
    Transition,
};
