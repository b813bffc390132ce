//! # Animator 模块
//!
//! 任务树的拥有者与状态机。
//!
//! `Animator` 持有所有任务（arena）与全局时钟，提供：
//!
//! - 创建：`create_*`
//! - 组装：`append_child` / `prepend_child` / `remove_child`（见 `job/group.rs`）
//! - 控制：`start` / `pause` / `resume` / `stop` / `complete` / `set_current_time`
//! - 驱动：`advance(elapsed_ms)`，宿主每帧调用一次
//!
//! 所有控制操作同步执行完毕。监听器与动作回调可以任意修改任务树，
//! 包括销毁正在通知的任务；每次回调之后都会重新校验句柄。

use std::collections::VecDeque;
use std::rc::Rc;

use tracing::{debug, warn};

use crate::clock::{AnimationClock, MonotonicTime, TimeSource, TimerMode};
use crate::config::ClockConfig;
use crate::job::proxy::{RenderAnimation, RenderChannel};
use crate::job::{
    ActionJob, AnimatorProxyJob, ContinuingGroup, Direction, Job, JobEvent, JobId, JobKind,
    JobKindTag, JobListener, JobState, JobStore, LeafJob, ParallelGroup, PauseJob,
    PropertyAnimationJob, SequentialGroup, SmoothedJob, UNCONTROLLED, return_if_deleted,
};

/// 任务树与全局时钟
pub struct Animator {
    pub(crate) jobs: JobStore,
    pub(crate) clock: AnimationClock,
    /// 自上次 tick 以来顶层任务的状态变化与完成事件
    events: VecDeque<(JobId, JobEvent)>,
    /// 本轮是否已因超出容量丢弃过事件
    events_overflowed: bool,
}

impl Default for Animator {
    fn default() -> Self {
        Self::new(ClockConfig::default())
    }
}

impl Animator {
    /// 使用单调时钟创建
    pub fn new(config: ClockConfig) -> Self {
        Self::with_time_source(config, Box::new(MonotonicTime::default()))
    }

    /// 注入时间源创建
    pub fn with_time_source(config: ClockConfig, time_source: Box<dyn TimeSource>) -> Self {
        Self {
            jobs: JobStore::default(),
            clock: AnimationClock::new(config, time_source),
            events: VecDeque::new(),
            events_overflowed: false,
        }
    }

    // ========== 创建 ==========

    fn insert(&mut self, kind: JobKind) -> JobId {
        let id = self.jobs.insert(Job::new(kind));
        debug!(job = %id, "创建任务");
        id
    }

    pub fn create_pause(&mut self, duration: i32) -> JobId {
        self.insert(JobKind::Leaf(LeafJob::Pause(PauseJob::new(duration))))
    }

    pub fn create_action(&mut self, callback: impl FnMut(&mut Animator) + 'static) -> JobId {
        self.insert(JobKind::Leaf(LeafJob::Action(ActionJob::new(callback))))
    }

    pub fn create_property_animation(&mut self, animation: PropertyAnimationJob) -> JobId {
        self.insert(JobKind::Leaf(LeafJob::Property(animation)))
    }

    pub fn create_smoothed(&mut self, smoothed: SmoothedJob) -> JobId {
        self.insert(JobKind::Leaf(LeafJob::Smoothed(smoothed)))
    }

    /// 创建渲染线程代理
    pub fn create_proxy(&mut self, channel: &RenderChannel, animation: RenderAnimation) -> JobId {
        let proxy = AnimatorProxyJob::new(channel, animation);
        self.insert(JobKind::Leaf(LeafJob::Proxy(proxy)))
    }

    pub fn create_sequential(&mut self) -> JobId {
        self.insert(JobKind::Sequential(SequentialGroup::default()))
    }

    pub fn create_parallel(&mut self) -> JobId {
        self.insert(JobKind::Parallel(ParallelGroup::default()))
    }

    pub fn create_continuing(&mut self) -> JobId {
        self.insert(JobKind::Continuing(ContinuingGroup::default()))
    }

    // ========== 查询 ==========

    /// 句柄是否仍然有效
    pub fn contains(&self, id: JobId) -> bool {
        self.jobs.contains(id)
    }

    /// 存活任务数
    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    pub(crate) fn job(&self, id: JobId) -> Option<&Job> {
        self.jobs.get(id)
    }

    pub fn kind(&self, id: JobId) -> Option<JobKindTag> {
        self.jobs.get(id).map(Job::tag)
    }

    pub(crate) fn is_group(&self, id: JobId) -> bool {
        self.kind(id).is_some_and(JobKindTag::is_group)
    }

    /// 已销毁的任务视为 Stopped
    pub fn state(&self, id: JobId) -> JobState {
        self.jobs.get(id).map(|j| j.state).unwrap_or_default()
    }

    pub fn direction(&self, id: JobId) -> Direction {
        self.jobs.get(id).map(|j| j.direction).unwrap_or_default()
    }

    pub fn loop_count(&self, id: JobId) -> i32 {
        self.jobs.get(id).map(|j| j.loop_count).unwrap_or(1)
    }

    pub fn current_loop(&self, id: JobId) -> i32 {
        self.jobs.get(id).map(|j| j.current_loop).unwrap_or(0)
    }

    /// 跨循环累计时间
    pub fn current_time(&self, id: JobId) -> i32 {
        self.jobs.get(id).map(|j| j.total_current_time).unwrap_or(0)
    }

    /// 当前循环内时间
    pub fn current_loop_time(&self, id: JobId) -> i32 {
        self.jobs.get(id).map(|j| j.current_time).unwrap_or(0)
    }

    /// 自报完成时间，`-1` 表示尚未完成
    pub fn uncontrolled_finish_time(&self, id: JobId) -> i32 {
        self.jobs
            .get(id)
            .map(|j| j.uncontrolled_finish_time)
            .unwrap_or(UNCONTROLLED)
    }

    pub(crate) fn set_uncontrolled_finish_time(&mut self, id: JobId, time: i32) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.uncontrolled_finish_time = time;
        }
    }

    pub fn label(&self, id: JobId) -> Option<&str> {
        self.jobs.get(id).and_then(|j| j.label.as_deref())
    }

    pub fn set_label(&mut self, id: JobId, label: impl Into<String>) {
        if let Some(job) = self.jobs.get_mut(id) {
            job.label = Some(label.into());
        }
    }

    /// 单次循环时长，`-1` 表示不可预知
    pub fn duration(&self, id: JobId) -> i32 {
        let Some(job) = self.jobs.get(id) else {
            return 0;
        };
        match &job.kind {
            JobKind::Leaf(leaf) => leaf.duration(),
            JobKind::Sequential(_) => {
                let mut total: i32 = 0;
                let mut child = job.first_child;
                while let Some(c) = child {
                    let d = self.total_duration(c);
                    if d == UNCONTROLLED {
                        return UNCONTROLLED;
                    }
                    total = total.saturating_add(d);
                    child = self.next_sibling(c);
                }
                total
            }
            JobKind::Parallel(_) => {
                let mut longest = 0;
                let mut child = job.first_child;
                while let Some(c) = child {
                    let d = self.total_duration(c);
                    if d == UNCONTROLLED {
                        return UNCONTROLLED;
                    }
                    longest = longest.max(d);
                    child = self.next_sibling(c);
                }
                longest
            }
            JobKind::Continuing(_) => UNCONTROLLED,
        }
    }

    /// 总时长（含循环）
    pub fn total_duration(&self, id: JobId) -> i32 {
        let duration = self.duration(id);
        if duration <= 0 {
            return duration;
        }
        let loops = self.loop_count(id);
        if loops < 0 {
            return UNCONTROLLED;
        }
        duration.saturating_mul(loops)
    }

    /// 时钟状态
    pub fn clock(&self) -> &AnimationClock {
        &self.clock
    }

    pub fn timer_mode(&self) -> TimerMode {
        self.clock.mode()
    }

    /// 取出尚未交出的顶层任务事件
    ///
    /// `advance` 每次都会交出事件，只在两次 tick 之间需要时调用。
    pub fn drain_events(&mut self) -> Vec<(JobId, JobEvent)> {
        self.events_overflowed = false;
        std::mem::take(&mut self.events).into()
    }

    // ========== 监听 ==========

    /// 注册监听器
    pub fn add_listener(
        &mut self,
        id: JobId,
        listener: impl Fn(&mut Animator, JobId, &JobEvent) + 'static,
    ) {
        if let Some(job) = self.jobs.get_mut(id) {
            let listener: JobListener = Rc::new(listener);
            job.listeners.push(listener);
        }
    }

    pub(crate) fn notify(&mut self, id: JobId, event: JobEvent) {
        let listeners = match self.jobs.get(id) {
            Some(job) if !job.listeners.is_empty() => job.listeners.clone(),
            _ => return,
        };
        for listener in listeners {
            listener(self, id, &event);
            return_if_deleted!(self, id);
        }
    }

    fn record_top_level(&mut self, id: JobId, event: JobEvent) {
        if !self.jobs.get(id).is_some_and(|j| j.group.is_none()) {
            return;
        }
        let capacity = self.clock.config.event_capacity;
        if capacity == 0 {
            return;
        }
        if self.events.len() >= capacity {
            self.events.pop_front();
            if !self.events_overflowed {
                self.events_overflowed = true;
                warn!(capacity, "两次 tick 之间的事件超出容量，丢弃最旧的事件");
            }
        }
        self.events.push_back((id, event));
    }

    // ========== 控制 ==========

    /// 启动（Stopped/Paused → Running）
    pub fn start(&mut self, id: JobId) {
        if self.state(id) == JobState::Running || !self.contains(id) {
            return;
        }
        self.set_state(id, JobState::Running);
    }

    pub fn pause(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.state == JobState::Stopped {
            warn!(job = %id, "不能暂停已停止的动画");
            return;
        }
        self.set_state(id, JobState::Paused);
    }

    pub fn resume(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.state != JobState::Paused {
            warn!(job = %id, state = ?job.state, "只能恢复处于暂停状态的动画");
            return;
        }
        self.set_state(id, JobState::Running);
    }

    /// 停止，并先把有进度的任务 seek 到方向隐含的终点
    ///
    /// 重复调用与调用一次效果相同。
    pub fn stop(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.state == JobState::Stopped {
            return;
        }
        let (direction, total_current_time) = (job.direction, job.total_current_time);
        let total = self.total_duration(id);
        let terminal = match direction {
            Direction::Forward => total,
            Direction::Backward => 0,
        };
        if total_current_time != 0 && total > 0 && total_current_time != terminal {
            self.set_current_time(id, terminal);
            return_if_deleted!(self, id);
        }
        self.stop_job(id);
    }

    /// 直接停止，不做终点 seek（分组内部使用）
    pub(crate) fn stop_job(&mut self, id: JobId) {
        if self.contains(id) && self.state(id) != JobState::Stopped {
            self.set_state(id, JobState::Stopped);
        }
    }

    /// 跳到方向隐含的终点并停止
    ///
    /// 无限循环且时长不可预知（也尚未自报完成）的任务没有终点，静默忽略。
    pub fn complete(&mut self, id: JobId) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        let (direction, finish) = (job.direction, job.uncontrolled_finish_time);
        let terminal = match direction {
            Direction::Backward => 0,
            Direction::Forward => {
                let total = self.total_duration(id);
                if total >= 0 {
                    total
                } else if finish >= 0 {
                    finish
                } else {
                    debug!(job = %id, "无法确定终点，complete 被忽略");
                    return;
                }
            }
        };
        self.set_current_time(id, terminal);
        return_if_deleted!(self, id);
        self.stop_job(id);
    }

    /// 修改循环次数（-1 表示无限）
    pub fn set_loop_count(&mut self, id: JobId, loops: i32) -> bool {
        if loops < UNCONTROLLED {
            warn!(job = %id, loops, "循环次数无效，保留原值");
            return false;
        }
        match self.jobs.get_mut(id) {
            Some(job) => {
                job.loop_count = loops;
                true
            }
            None => false,
        }
    }

    /// 修改方向
    pub fn set_direction(&mut self, id: JobId, direction: Direction) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.direction == direction {
            return;
        }
        let (state, loops, has_timer) = (job.state, job.loop_count, job.has_registered_timer);

        if state == JobState::Stopped {
            let duration = self.duration(id);
            if let Some(job) = self.jobs.get_mut(id) {
                match direction {
                    Direction::Backward => {
                        job.current_time = duration;
                        job.current_loop = (loops - 1).max(0);
                    }
                    Direction::Forward => {
                        job.current_time = 0;
                        job.current_loop = 0;
                    }
                }
            }
        }

        // 先按旧方向把时间补齐，再更新方向
        if has_timer {
            self.ensure_timer_update();
            return_if_deleted!(self, id);
        }
        if let Some(job) = self.jobs.get_mut(id) {
            job.direction = direction;
        }
        self.update_direction(id, direction);
        return_if_deleted!(self, id);
        if has_timer {
            self.restart_animation_timer();
        }
        self.notify(id, JobEvent::DirectionChanged(direction));
    }

    /// 设置累计时间，驱动更新与自动停止
    pub fn set_current_time(&mut self, id: JobId, msecs: i32) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        let (direction, loops, group, old_loop) =
            (job.direction, job.loop_count, job.group, job.current_loop);
        let duration = self.duration(id);
        let mut msecs = msecs.max(0);

        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        let total_duration;
        if duration < 0 && direction == Direction::Forward {
            // 时长不可预知：只有自报完成后才知道循环在哪里结束
            let mut total = UNCONTROLLED;
            let finish = job.uncontrolled_finish_time;
            if finish >= 0 && msecs >= finish {
                msecs = finish;
                if job.current_loop == loops - 1 {
                    total = finish;
                } else {
                    job.current_loop += 1;
                    job.current_loop_start_time = msecs;
                    job.uncontrolled_finish_time = UNCONTROLLED;
                }
            }
            total_duration = total;
            job.total_current_time = msecs;
            job.current_time = msecs - job.current_loop_start_time;
        } else {
            total_duration = if duration <= 0 {
                duration
            } else if loops < 0 {
                UNCONTROLLED
            } else {
                duration.saturating_mul(loops)
            };
            if total_duration != UNCONTROLLED {
                msecs = msecs.min(total_duration.max(0));
            }
            job.total_current_time = msecs;

            job.current_loop = if duration <= 0 { 0 } else { msecs / duration };
            if job.current_loop == loops {
                // 正好落在最后一个循环的末尾
                job.current_time = duration.max(0);
                job.current_loop = (loops - 1).max(0);
            } else if direction == Direction::Forward {
                job.current_time = if duration <= 0 { msecs } else { msecs % duration };
            } else {
                job.current_time = if duration <= 0 {
                    msecs
                } else {
                    // 截断取余：msecs 为 0 时得到 0
                    (msecs - 1) % duration + 1
                };
                if job.current_time == duration {
                    job.current_loop -= 1;
                }
            }
        }
        let (current_loop, current_time) = (job.current_loop, job.current_time);

        if current_loop != old_loop && group.is_none() {
            self.top_level_loop_changed(id);
            return_if_deleted!(self, id);
        }

        self.update_current_time(id, current_time);
        return_if_deleted!(self, id);

        if current_loop != old_loop {
            self.notify(id, JobEvent::CurrentLoopChanged(current_loop));
            return_if_deleted!(self, id);
        }

        let (total_current_time, direction) = match self.jobs.get(id) {
            Some(job) => (job.total_current_time, job.direction),
            None => return,
        };
        let at_end = match direction {
            Direction::Forward => total_current_time == total_duration,
            Direction::Backward => total_current_time == 0,
        };
        if at_end {
            self.stop_job(id);
            return_if_deleted!(self, id);
        }

        self.notify(id, JobEvent::CurrentTimeChanged(total_current_time));
    }

    // ========== 状态机 ==========

    pub(crate) fn set_state(&mut self, id: JobId, new_state: JobState) {
        let Some(job) = self.jobs.get(id) else {
            return;
        };
        if job.state == new_state || job.loop_count == 0 {
            return;
        }
        let old_state = job.state;
        let old_current_time = job.current_time;
        let old_current_loop = job.current_loop;
        let old_direction = job.direction;
        let loops = job.loop_count;

        // 从 Stopped 启动：回到方向对应的起点
        if old_state == JobState::Stopped {
            let start = match old_direction {
                Direction::Forward => 0,
                Direction::Backward => {
                    if loops == UNCONTROLLED {
                        self.duration(id)
                    } else {
                        self.total_duration(id)
                    }
                }
            };
            if let Some(job) = self.jobs.get_mut(id) {
                job.total_current_time = start;
                job.current_time = start;
                job.uncontrolled_finish_time = UNCONTROLLED;
                if job.group.is_none() {
                    job.current_loop_start_time = start;
                }
            }
        }

        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        job.state = new_state;
        let group = job.group;
        let has_timer = job.has_registered_timer;
        let is_top_level = match group {
            None => true,
            Some(g) => self.state(g) == JobState::Stopped,
        };

        if old_state == JobState::Running {
            if new_state == JobState::Paused && has_timer {
                self.ensure_timer_update();
            }
            self.unregister_animation(id);
        } else if new_state == JobState::Running {
            self.register_animation(id, is_top_level);
        }

        self.update_state(id, new_state, old_state);
        return_if_deleted!(self, id);
        if self.state(id) != new_state {
            return;
        }

        let changed = JobEvent::StateChanged {
            new_state,
            old_state,
        };
        self.notify(id, changed);
        return_if_deleted!(self, id);
        if self.state(id) != new_state {
            return;
        }
        self.record_top_level(id, changed);

        match new_state {
            JobState::Paused => {}
            JobState::Running => {
                if old_state == JobState::Stopped && is_top_level {
                    // 立即按起点更新一次，避免首帧延迟
                    self.ensure_timer_update();
                    return_if_deleted!(self, id);
                    let start = self.current_time(id);
                    self.set_current_time(id, start);
                }
            }
            JobState::Stopped => {
                let duration = self.duration(id);
                let reached_end = match old_direction {
                    Direction::Forward => {
                        i64::from(old_current_time) * i64::from(old_current_loop + 1)
                            == i64::from(duration) * i64::from(loops)
                    }
                    Direction::Backward => old_current_time == 0,
                };
                if duration == UNCONTROLLED || loops < 0 || reached_end {
                    self.finished(id);
                }
            }
        }
    }

    fn finished(&mut self, id: JobId) {
        self.notify(id, JobEvent::Finished);
        return_if_deleted!(self, id);
        self.record_top_level(id, JobEvent::Finished);

        let group = self.jobs.get(id).and_then(|j| j.group);
        if let Some(group) = group
            && (self.duration(id) == UNCONTROLLED || self.loop_count(id) < 0)
        {
            self.uncontrolled_animation_finished(group, id);
        }
    }

    // ========== 按种类分发 ==========

    pub(crate) fn update_state(&mut self, id: JobId, new_state: JobState, old_state: JobState) {
        match self.kind(id) {
            Some(JobKindTag::Sequential) => self.seq_update_state(id, new_state, old_state),
            Some(JobKindTag::Parallel) => self.par_update_state(id, new_state, old_state),
            Some(JobKindTag::Continuing) => self.cont_update_state(id, new_state, old_state),
            Some(_) => self.leaf_update_state(id, new_state, old_state),
            None => {}
        }
    }

    pub(crate) fn update_current_time(&mut self, id: JobId, current_time: i32) {
        match self.kind(id) {
            Some(JobKindTag::Sequential) => self.seq_update_current_time(id, current_time),
            Some(JobKindTag::Parallel) => self.par_update_current_time(id, current_time),
            Some(JobKindTag::Continuing) => self.cont_update_current_time(id, current_time),
            Some(_) => self.leaf_update_current_time(id, current_time),
            None => {}
        }
    }

    pub(crate) fn update_direction(&mut self, id: JobId, direction: Direction) {
        match self.kind(id) {
            Some(JobKindTag::Sequential) => self.seq_update_direction(id, direction),
            Some(JobKindTag::Parallel) => self.par_update_direction(id, direction),
            Some(JobKindTag::Continuing) => self.group_update_direction(id, direction),
            _ => {}
        }
    }

    pub(crate) fn top_level_loop_changed(&mut self, id: JobId) {
        if self.is_group(id) {
            self.group_top_level_loop_changed(id);
        } else {
            self.leaf_top_level_loop_changed(id);
        }
    }

    pub(crate) fn uncontrolled_animation_finished(&mut self, group: JobId, child: JobId) {
        match self.kind(group) {
            Some(JobKindTag::Sequential) => self.seq_uncontrolled_finished(group, child),
            Some(JobKindTag::Parallel) | Some(JobKindTag::Continuing) => {
                self.par_uncontrolled_finished(group, child)
            }
            _ => {}
        }
    }

    // ========== 销毁 ==========

    /// 销毁任务（分组连同子任务）
    ///
    /// 运行中的任务直接置为 Stopped，不做终点 seek。
    /// 可以在监听器中销毁正在通知的任务。
    pub fn destroy(&mut self, id: JobId) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.destroying {
            return;
        }
        job.destroying = true;

        while let Some(child) = self.first_child(id) {
            self.detach_silently(id, child);
            self.destroy(child);
        }

        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.state != JobState::Stopped {
            let old_state = job.state;
            job.state = JobState::Stopped;
            if old_state == JobState::Running {
                self.unregister_animation(id);
            }
            self.notify(
                id,
                JobEvent::StateChanged {
                    new_state: JobState::Stopped,
                    old_state,
                },
            );
            return_if_deleted!(self, id);
        }

        if let Some(group) = self.jobs.get(id).and_then(|j| j.group) {
            self.remove_animation(group, id);
        }
        self.jobs.remove(id);
        debug!(job = %id, "销毁任务");
    }

    // ========== 时钟 ==========

    fn register_animation(&mut self, id: JobId, top_level: bool) {
        let Some(tag) = self.kind(id) else {
            return;
        };
        self.clock
            .register_running(id, tag.is_group(), tag == JobKindTag::Pause);
        if top_level && let Some(job) = self.jobs.get_mut(id) {
            job.has_registered_timer = true;
            self.clock.register_top_level(id);
        }
    }

    fn unregister_animation(&mut self, id: JobId) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        let tag = job.tag();
        let had_timer = std::mem::replace(&mut job.has_registered_timer, false);
        self.clock
            .unregister_running(id, tag.is_group(), tag == JobKindTag::Pause);
        if had_timer {
            self.clock.unregister_top_level(id);
        }
    }

    /// 宿主每帧调用：`elapsed_ms` 为单调递增的时间戳
    ///
    /// # 返回
    /// - 自上次 tick 以来顶层任务的事件（包括两次 tick 之间控制操作产生的）
    pub fn advance(&mut self, elapsed_ms: i64) -> Vec<(JobId, JobEvent)> {
        self.tick(Some(elapsed_ms));
        self.drain_events()
    }

    /// 使用配置的时间源推进，返回值同 [`Animator::advance`]
    pub fn advance_by_source(&mut self) -> Vec<(JobId, JobEvent)> {
        self.tick(None);
        self.drain_events()
    }

    /// 驱动方是否需要继续调用 `advance`
    pub fn needs_tick(&self) -> bool {
        self.clock.needs_tick()
    }

    fn tick(&mut self, time_step: Option<i64>) {
        self.update_animations_time(time_step);
        self.restart_animation_timer();
        if self.clock.start_stop_pending && self.clock.process_start_stop(time_step) {
            self.restart_animation_timer();
        }
    }

    fn update_animations_time(&mut self, time_step: Option<i64>) {
        if self.clock.inside_tick {
            return;
        }
        let Some(delta) = self.clock.take_delta(time_step) else {
            return;
        };
        if delta == 0 {
            return;
        }

        self.clock.inside_tick = true;
        self.clock.current_index = 0;
        while let Some(&id) = usize::try_from(self.clock.current_index)
            .ok()
            .and_then(|i| self.clock.animations.get(i))
        {
            if let Some(job) = self.jobs.get(id) {
                let elapsed = match job.direction {
                    Direction::Forward => job.total_current_time.saturating_add(delta),
                    Direction::Backward => job.total_current_time.saturating_sub(delta),
                };
                self.set_current_time(id, elapsed);
            }
            self.clock.current_index += 1;
        }
        self.clock.inside_tick = false;
        self.clock.current_index = -1;
    }

    /// 只有暂停计时器在跑时，先把时间补齐
    pub(crate) fn ensure_timer_update(&mut self) {
        if self.clock.is_pause_timer_active() {
            let step = self.clock.catch_up_step();
            self.update_animations_time(step);
            self.restart_animation_timer();
        }
    }

    fn restart_animation_timer(&mut self) {
        self.clock.mode = if self.clock.running_leaf_animations > 0 {
            TimerMode::Continuous
        } else if !self.clock.running_pause_animations.is_empty() {
            TimerMode::PauseTimer(self.closest_pause_time_to_finish())
        } else {
            TimerMode::Stopped
        };
    }

    fn closest_pause_time_to_finish(&self) -> i32 {
        self.clock
            .running_pause_animations
            .iter()
            .filter_map(|&id| {
                let job = self.jobs.get(id)?;
                let remaining = match job.direction {
                    Direction::Forward => self.duration(id) - job.current_time,
                    Direction::Backward => job.current_time,
                };
                Some(remaining)
            })
            .min()
            .unwrap_or(i32::MAX)
            .max(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::easing::EasingFunction;
    use crate::property::PropertyObject;
    use crate::value::Value;
    use std::cell::{Cell, RefCell};

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    fn move_x(animator: &mut Animator, obj: &PropertyObject, to: f64, duration: i32) -> JobId {
        animator.create_property_animation(PropertyAnimationJob::single(
            obj.property("x"),
            None,
            Value::Number(to),
            duration,
            EasingFunction::Linear,
        ))
    }

    #[test]
    fn test_clock_drives_property_animation() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let job = move_x(&mut animator, &obj, 100.0, 100);

        animator.start(job);
        assert_eq!(animator.state(job), JobState::Running);
        assert_eq!(animator.clock().pending(), &[job]);

        // 并入活动列表，建立时间基线
        animator.advance(1000);
        assert_eq!(animator.clock().animations(), &[job]);
        assert_eq!(animator.timer_mode(), TimerMode::Continuous);

        animator.advance(1040);
        assert_eq!(animator.current_time(job), 40);
        assert_eq!(obj.get("x"), Value::Number(40.0));

        let events = animator.advance(1200);
        assert_eq!(animator.state(job), JobState::Stopped);
        assert_eq!(obj.get("x"), Value::Number(100.0));
        assert!(events.contains(&(job, JobEvent::Finished)));

        animator.advance(1216);
        assert!(animator.clock().animations().is_empty());
        assert_eq!(animator.timer_mode(), TimerMode::Stopped);
        assert!(!animator.needs_tick());
        assert!(animator.drain_events().is_empty());
    }

    #[test]
    fn test_stop_settles_on_terminal_value() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let job = move_x(&mut animator, &obj, 100.0, 100);

        animator.start(job);
        animator.set_current_time(job, 30);
        assert_eq!(obj.get("x"), Value::Number(30.0));

        animator.stop(job);
        assert_eq!(animator.state(job), JobState::Stopped);
        assert_eq!(animator.current_time(job), 100);
        assert_eq!(obj.get("x"), Value::Number(100.0));

        // 再次 stop 没有任何变化
        animator.stop(job);
        assert_eq!(animator.current_time(job), 100);
        assert_eq!(animator.state(job), JobState::Stopped);
    }

    #[test]
    fn test_complete_reaches_exact_terminal_time() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        animator.set_loop_count(job, 3);
        animator.start(job);
        animator.set_current_time(job, 120);
        assert_eq!(animator.current_loop(job), 1);

        animator.complete(job);
        assert_eq!(animator.current_time(job), 300);
        assert_eq!(animator.state(job), JobState::Stopped);

        let backward = animator.create_pause(100);
        animator.set_direction(backward, Direction::Backward);
        animator.start(backward);
        assert_eq!(animator.current_time(backward), 100);
        animator.complete(backward);
        assert_eq!(animator.current_time(backward), 0);
    }

    #[test]
    fn test_complete_without_terminal_is_silent() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let job = animator.create_smoothed(SmoothedJob::new(obj.property("x"), 1000.0, 10.0));
        animator.set_loop_count(job, -1);
        animator.start(job);
        animator.complete(job);
        assert_eq!(animator.state(job), JobState::Running);
    }

    #[test]
    fn test_backward_loops() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        animator.set_loop_count(job, 2);
        animator.set_direction(job, Direction::Backward);
        animator.start(job);
        assert_eq!(animator.current_time(job), 200);
        assert_eq!(animator.current_loop(job), 1);

        animator.set_current_time(job, 100);
        assert_eq!(animator.current_loop(job), 0);
        assert_eq!(animator.current_loop_time(job), 100);

        animator.set_current_time(job, 0);
        assert_eq!(animator.state(job), JobState::Stopped);
    }

    #[test]
    fn test_pause_and_resume() {
        let mut animator = animator();
        let job = animator.create_pause(100);

        animator.pause(job);
        assert_eq!(animator.state(job), JobState::Stopped);

        animator.start(job);
        animator.pause(job);
        assert_eq!(animator.state(job), JobState::Paused);
        assert_eq!(animator.clock().running_pause_count(), 0);

        animator.resume(job);
        assert_eq!(animator.state(job), JobState::Running);
        assert_eq!(animator.clock().running_pause_count(), 1);
    }

    #[test]
    fn test_pause_only_uses_pause_timer() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        animator.start(job);
        animator.advance(0);
        assert_eq!(animator.timer_mode(), TimerMode::PauseTimer(100));
        animator.advance(30);
        assert_eq!(animator.timer_mode(), TimerMode::PauseTimer(70));
    }

    #[test]
    fn test_zero_loop_count_never_starts() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        animator.set_loop_count(job, 0);
        animator.start(job);
        assert_eq!(animator.state(job), JobState::Stopped);
        assert!(!animator.set_loop_count(job, -3));
    }

    #[test]
    fn test_negative_duration_is_rejected() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        assert!(!animator.set_duration(job, -1));
        assert_eq!(animator.duration(job), 100);
        assert!(animator.set_duration(job, 50));
        assert_eq!(animator.duration(job), 50);
    }

    #[test]
    fn test_listener_can_destroy_job() {
        let mut animator = animator();
        let job = animator.create_pause(100);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = seen.clone();
        animator.add_listener(job, move |animator, id, event| {
            log.borrow_mut().push(*event);
            if *event == JobEvent::Finished {
                animator.destroy(id);
            }
        });

        animator.start(job);
        animator.set_current_time(job, 100);
        assert!(!animator.contains(job));
        assert_eq!(animator.job_count(), 0);
        assert!(seen.borrow().contains(&JobEvent::Finished));
        assert!(animator.clock().pending().is_empty());
    }

    #[test]
    fn test_new_jobs_get_zero_first_delta() {
        let mut animator = animator();
        let a = animator.create_pause(1000);
        animator.start(a);
        animator.advance(0);
        animator.advance(100);
        assert_eq!(animator.current_time(a), 100);

        // b 在两次 tick 之间启动，下一次 tick 只负责并入
        let b = animator.create_pause(1000);
        animator.start(b);
        animator.advance(116);
        assert_eq!(animator.current_time(a), 116);
        assert_eq!(animator.current_time(b), 0);

        animator.advance(132);
        assert_eq!(animator.current_time(a), 132);
        assert_eq!(animator.current_time(b), 16);
    }

    #[test]
    fn test_pause_between_explicit_ticks_keeps_time_base() {
        let mut animator = animator();
        let a = animator.create_pause(1000);
        let b = animator.create_pause(1000);
        animator.start(a);
        animator.start(b);
        animator.advance(10_000);
        animator.advance(10_050);

        // 暂停 b 时只补齐到上次的时间戳
        animator.pause(b);
        assert_eq!(animator.current_time(b), 50);
        animator.set_direction(a, Direction::Backward);
        assert_eq!(animator.current_time(a), 50);

        animator.advance(10_070);
        assert_eq!(animator.current_time(a), 30);
        assert_eq!(animator.current_time(b), 50);
    }

    #[test]
    fn test_source_driven_catch_up() {
        let time = ManualTime::new();
        let mut animator =
            Animator::with_time_source(ClockConfig::default(), Box::new(time.clone()));
        let a = animator.create_pause(1000);
        animator.start(a);
        animator.advance_by_source();
        time.advance(40);

        // 由时间源驱动时，启动新任务前先按时间源补齐
        let b = animator.create_pause(1000);
        animator.start(b);
        assert_eq!(animator.current_time(a), 40);

        time.advance(16);
        animator.advance_by_source();
        assert_eq!(animator.current_time(a), 56);
        assert_eq!(animator.current_time(b), 0);
    }

    #[test]
    fn test_events_are_handed_out_per_tick() {
        let mut animator = animator();
        animator.advance(0);
        for round in 0..100 {
            let job = animator.create_pause(0);
            animator.start(job);
            animator.destroy(job);
            let events = animator.advance(round * 16);
            // Running、Stopped、Finished
            assert_eq!(events.len(), 3);
            assert_eq!(events.last(), Some(&(job, JobEvent::Finished)));
        }
        assert!(animator.drain_events().is_empty());
    }

    #[test]
    fn test_events_between_ticks_are_bounded() {
        let config = ClockConfig {
            event_capacity: 8,
            ..ClockConfig::default()
        };
        let mut animator = Animator::with_time_source(config, Box::new(ManualTime::new()));
        let mut last = None;
        for _ in 0..1000 {
            let job = animator.create_pause(0);
            animator.start(job);
            animator.destroy(job);
            last = Some(job);
        }

        let events = animator.advance(0);
        assert_eq!(events.len(), 8);
        assert_eq!(events.last(), last.map(|job| (job, JobEvent::Finished)).as_ref());
        assert_eq!(animator.job_count(), 0);
    }

    #[test]
    fn test_action_fires_once_per_activation() {
        let mut animator = animator();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let job = animator.create_action(move |_| counter.set(counter.get() + 1));
        animator.start(job);
        assert_eq!(hits.get(), 1);
        assert_eq!(animator.state(job), JobState::Stopped);
        animator.start(job);
        assert_eq!(hits.get(), 2);
    }
}
