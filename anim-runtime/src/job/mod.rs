//! # Job 模块
//!
//! 动画任务树的数据模型。
//!
//! ## 模型
//!
//! 所有任务存放在 [`Animator`](crate::Animator) 持有的 arena 中，
//! 通过 [`JobId`] 引用。分组独占子任务，子任务只保存指向分组的
//! 句柄，用于脱离与通知，从不用于销毁。
//!
//! 任务种类是封闭的和类型：
//!
//! - 叶子：属性动画、暂停、动作、平滑跟随、渲染线程代理
//! - 分组：顺序、并行、持续（子任务自由运行，不被 seek）
//!
//! 时间单位统一为毫秒（`i32`），`-1` 表示时长不可预知（uncontrolled）。

mod continuing;
mod group;
mod leaf;
mod parallel;
pub mod proxy;
mod sequential;
mod store;

use std::rc::Rc;

use crate::animator::Animator;

pub use continuing::ContinuingGroup;
pub use leaf::{
    ActionCallback, ActionJob, AnimatedProperty, LeafJob, PauseJob, PropertyAnimationJob,
    PropertyUpdater, RotationDirection, SmoothedJob,
};
pub use parallel::ParallelGroup;
pub use proxy::AnimatorProxyJob;
pub use sequential::SequentialGroup;
pub(crate) use store::JobStore;

/// 不可预知时长
pub const UNCONTROLLED: i32 = -1;

/// 任务句柄
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "job#{}v{}", self.index, self.generation)
    }
}

/// 播放方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Forward,
    Backward,
}

impl Direction {
    /// 反向
    pub fn reversed(self) -> Self {
        match self {
            Direction::Forward => Direction::Backward,
            Direction::Backward => Direction::Forward,
        }
    }
}

/// 任务生命周期状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobState {
    #[default]
    Stopped,
    Paused,
    Running,
}

/// 任务通知
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobEvent {
    /// 状态变化
    StateChanged {
        new_state: JobState,
        old_state: JobState,
    },
    /// 播放完成（到达方向隐含的终点，或不可预知时长任务自报完成）
    Finished,
    /// 循环序号变化
    CurrentLoopChanged(i32),
    /// 方向变化
    DirectionChanged(Direction),
    /// 总时间变化
    CurrentTimeChanged(i32),
}

/// 任务监听器
///
/// 监听器可以拿到 `&mut Animator`，包括销毁触发通知的任务本身。
pub type JobListener = Rc<dyn Fn(&mut Animator, JobId, &JobEvent)>;

/// 任务种类
pub enum JobKind {
    Leaf(LeafJob),
    Sequential(SequentialGroup),
    Parallel(ParallelGroup),
    Continuing(ContinuingGroup),
}

/// 任务种类标签（用于分发，不借用任务）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKindTag {
    Property,
    Pause,
    Action,
    Smoothed,
    Proxy,
    Sequential,
    Parallel,
    Continuing,
}

impl JobKindTag {
    /// 是否为分组
    pub fn is_group(self) -> bool {
        matches!(
            self,
            JobKindTag::Sequential | JobKindTag::Parallel | JobKindTag::Continuing
        )
    }
}

impl JobKind {
    pub fn tag(&self) -> JobKindTag {
        match self {
            JobKind::Leaf(LeafJob::Property(_)) => JobKindTag::Property,
            JobKind::Leaf(LeafJob::Pause(_)) => JobKindTag::Pause,
            JobKind::Leaf(LeafJob::Action(_)) => JobKindTag::Action,
            JobKind::Leaf(LeafJob::Smoothed(_)) => JobKindTag::Smoothed,
            JobKind::Leaf(LeafJob::Proxy(_)) => JobKindTag::Proxy,
            JobKind::Sequential(_) => JobKindTag::Sequential,
            JobKind::Parallel(_) => JobKindTag::Parallel,
            JobKind::Continuing(_) => JobKindTag::Continuing,
        }
    }
}

/// 任务节点
pub struct Job {
    pub(crate) kind: JobKind,
    pub(crate) state: JobState,
    pub(crate) direction: Direction,
    pub(crate) loop_count: i32,
    pub(crate) current_loop: i32,
    /// 当前循环内时间
    pub(crate) current_time: i32,
    /// 跨循环累计时间
    pub(crate) total_current_time: i32,
    pub(crate) uncontrolled_finish_time: i32,
    pub(crate) current_loop_start_time: i32,
    pub(crate) has_registered_timer: bool,
    pub(crate) destroying: bool,

    // 分组链表
    pub(crate) group: Option<JobId>,
    pub(crate) prev_sibling: Option<JobId>,
    pub(crate) next_sibling: Option<JobId>,
    pub(crate) first_child: Option<JobId>,
    pub(crate) last_child: Option<JobId>,

    pub(crate) listeners: Vec<JobListener>,
    pub(crate) label: Option<String>,
}

impl Job {
    pub(crate) fn new(kind: JobKind) -> Self {
        Self {
            kind,
            state: JobState::Stopped,
            direction: Direction::Forward,
            loop_count: 1,
            current_loop: 0,
            current_time: 0,
            total_current_time: 0,
            uncontrolled_finish_time: UNCONTROLLED,
            current_loop_start_time: 0,
            has_registered_timer: false,
            destroying: false,
            group: None,
            prev_sibling: None,
            next_sibling: None,
            first_child: None,
            last_child: None,
            listeners: Vec::new(),
            label: None,
        }
    }

    pub(crate) fn tag(&self) -> JobKindTag {
        self.kind.tag()
    }
}

/// 回调可能销毁任务：句柄失效时立即返回
macro_rules! return_if_deleted {
    ($animator:expr, $id:expr) => {
        if !$animator.contains($id) {
            return;
        }
    };
    ($animator:expr, $id:expr, $ret:expr) => {
        if !$animator.contains($id) {
            return $ret;
        }
    };
}

pub(crate) use return_if_deleted;
