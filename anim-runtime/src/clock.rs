//! # Clock 模块
//!
//! 驱动所有顶层任务树的全局时钟。
//!
//! ## 设计要点
//!
//! - 时钟不是全局单例，而是 [`Animator`](crate::Animator) 持有的状态，测试可注入手动时间源
//! - 顶层任务启动时先进入待启动列表，只在 tick 边界并入活动列表，
//!   新任务的第一个 delta 为 0
//! - 同一 tick 内所有任务看到相同的 delta，按注册顺序推进
//! - 只有暂停任务在运行时，驱动方可以改用粗粒度定时器
//!   （[`TimerMode::PauseTimer`]）代替逐帧轮询

use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

use crate::config::ClockConfig;
use crate::job::JobId;

/// 时间源（毫秒）
pub trait TimeSource {
    /// 自上次 `restart` 以来经过的毫秒数
    fn elapsed(&self) -> i64;

    /// 重新开始计时
    fn restart(&mut self);
}

/// 单调时钟
pub struct MonotonicTime {
    start: Instant,
}

impl Default for MonotonicTime {
    fn default() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl TimeSource for MonotonicTime {
    fn elapsed(&self) -> i64 {
        i64::try_from(self.start.elapsed().as_millis()).unwrap_or(i64::MAX)
    }

    fn restart(&mut self) {
        self.start = Instant::now();
    }
}

/// 手动时间源，测试与离线渲染使用
///
/// 克隆共享同一个时间值。
#[derive(Clone, Default)]
pub struct ManualTime {
    now: Rc<Cell<i64>>,
    origin: Rc<Cell<i64>>,
}

impl ManualTime {
    pub fn new() -> Self {
        Self::default()
    }

    /// 前进若干毫秒
    pub fn advance(&self, ms: i64) {
        self.now.set(self.now.get() + ms);
    }

    pub fn now(&self) -> i64 {
        self.now.get()
    }
}

impl TimeSource for ManualTime {
    fn elapsed(&self) -> i64 {
        self.now.get() - self.origin.get()
    }

    fn restart(&mut self) {
        self.origin.set(self.now.get());
    }
}

/// 驱动方应采用的定时方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimerMode {
    /// 没有运行中的任务
    #[default]
    Stopped,
    /// 逐帧驱动
    Continuous,
    /// 只有暂停任务：这么多毫秒后再 tick 一次即可
    PauseTimer(i32),
}

/// 全局动画时钟的注册表与计时状态
pub struct AnimationClock {
    pub(crate) config: ClockConfig,
    pub(crate) time_source: Box<dyn TimeSource>,
    /// 活动的顶层任务（注册顺序）
    pub(crate) animations: Vec<JobId>,
    /// 本 tick 期间启动、等待并入的任务
    pub(crate) animations_to_start: Vec<JobId>,
    /// 运行中的非分组、非暂停任务数
    pub(crate) running_leaf_animations: usize,
    /// 运行中的暂停任务
    pub(crate) running_pause_animations: Vec<JobId>,
    pub(crate) last_tick: i64,
    /// 宿主最近一次显式传入的时间戳；`None` 表示由时间源驱动
    pub(crate) explicit_step: Option<i64>,
    pub(crate) time_started: bool,
    pub(crate) inside_tick: bool,
    /// tick 循环中当前处理的下标，注销时据此修正
    pub(crate) current_index: isize,
    pub(crate) start_stop_pending: bool,
    pub(crate) mode: TimerMode,
}

impl AnimationClock {
    pub fn new(config: ClockConfig, time_source: Box<dyn TimeSource>) -> Self {
        Self {
            config,
            time_source,
            animations: Vec::new(),
            animations_to_start: Vec::new(),
            running_leaf_animations: 0,
            running_pause_animations: Vec::new(),
            last_tick: 0,
            explicit_step: None,
            time_started: false,
            inside_tick: false,
            current_index: -1,
            start_stop_pending: false,
            mode: TimerMode::Stopped,
        }
    }

    pub fn config(&self) -> &ClockConfig {
        &self.config
    }

    pub fn mode(&self) -> TimerMode {
        self.mode
    }

    /// 活动的顶层任务
    pub fn animations(&self) -> &[JobId] {
        &self.animations
    }

    /// 等待并入的顶层任务
    pub fn pending(&self) -> &[JobId] {
        &self.animations_to_start
    }

    pub fn running_leaf_count(&self) -> usize {
        self.running_leaf_animations
    }

    pub fn running_pause_count(&self) -> usize {
        self.running_pause_animations.len()
    }

    pub fn is_pause_timer_active(&self) -> bool {
        matches!(self.mode, TimerMode::PauseTimer(_))
    }

    /// 驱动方是否需要调用 `advance`
    pub fn needs_tick(&self) -> bool {
        self.start_stop_pending || self.mode != TimerMode::Stopped
    }

    // ========== 注册 ==========

    pub(crate) fn register_running(&mut self, id: JobId, is_group: bool, is_pause: bool) {
        if is_group {
            return;
        }
        if is_pause {
            self.running_pause_animations.push(id);
        } else {
            self.running_leaf_animations += 1;
        }
    }

    pub(crate) fn unregister_running(&mut self, id: JobId, is_group: bool, is_pause: bool) {
        if is_group {
            return;
        }
        if is_pause {
            self.running_pause_animations.retain(|p| *p != id);
        } else {
            self.running_leaf_animations = self.running_leaf_animations.saturating_sub(1);
        }
    }

    /// 顶层任务加入待启动列表
    pub(crate) fn register_top_level(&mut self, id: JobId) {
        self.animations_to_start.push(id);
        self.start_stop_pending = true;
    }

    /// 从活动或待启动列表移除
    pub(crate) fn unregister_top_level(&mut self, id: JobId) {
        if let Some(idx) = self.animations.iter().position(|a| *a == id) {
            self.animations.remove(idx);
            if idx as isize <= self.current_index {
                self.current_index -= 1;
            }
            if self.animations.is_empty() {
                self.start_stop_pending = true;
            }
        } else {
            self.animations_to_start.retain(|a| *a != id);
        }
    }

    // ========== 计时 ==========

    /// 计算本 tick 的 delta；时钟尚未开始时返回 `None`
    pub(crate) fn take_delta(&mut self, time_step: Option<i64>) -> Option<i32> {
        if !self.time_started {
            return None;
        }
        self.explicit_step = time_step;
        let total_elapsed = time_step.unwrap_or_else(|| self.time_source.elapsed());
        let mut delta = if self.config.consistent_timing && !self.is_pause_timer_active() {
            i64::from(self.config.timing_interval_ms)
        } else {
            total_elapsed - self.last_tick
        };
        if self.config.slow_mode && self.config.slowdown_factor > 0.0 {
            delta = (delta as f64 / self.config.slowdown_factor).round() as i64;
        }
        self.last_tick = total_elapsed;
        Some(i32::try_from(delta.max(0)).unwrap_or(i32::MAX))
    }

    /// 两次 tick 之间补齐时间时使用的时间戳
    ///
    /// 宿主显式驱动时沿用上一次的时间戳（delta 为 0），不读时间源。
    pub(crate) fn catch_up_step(&self) -> Option<i64> {
        self.explicit_step
    }

    /// 在 tick 边界并入待启动任务
    ///
    /// # 返回
    /// - 活动列表是否非空
    pub(crate) fn process_start_stop(&mut self, time_step: Option<i64>) -> bool {
        self.start_stop_pending = false;
        self.animations.append(&mut self.animations_to_start);
        if self.animations.is_empty() {
            self.mode = TimerMode::Stopped;
            self.time_started = false;
            return false;
        }
        if !self.time_started {
            self.explicit_step = time_step;
            match time_step {
                Some(step) => self.last_tick = step,
                None => {
                    self.time_source.restart();
                    self.last_tick = 0;
                }
            }
            self.time_started = true;
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock() -> AnimationClock {
        AnimationClock::new(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    fn id(index: u32) -> JobId {
        JobId {
            index,
            generation: 0,
        }
    }

    #[test]
    fn test_delta_baseline_on_first_splice() {
        let mut clock = clock();
        clock.register_top_level(id(0));
        assert_eq!(clock.take_delta(Some(100)), None);
        assert!(clock.process_start_stop(Some(100)));
        assert_eq!(clock.take_delta(Some(116)), Some(16));
    }

    #[test]
    fn test_catch_up_keeps_explicit_time_base() {
        let time = ManualTime::new();
        let mut clock = AnimationClock::new(ClockConfig::default(), Box::new(time.clone()));
        assert_eq!(clock.catch_up_step(), None);

        clock.register_top_level(id(0));
        clock.process_start_stop(Some(5000));
        assert_eq!(clock.catch_up_step(), Some(5000));
        assert_eq!(clock.take_delta(Some(5100)), Some(100));

        // 时间源与宿主时间戳无关，补齐时不能读它
        time.advance(42);
        let step = clock.catch_up_step();
        assert_eq!(clock.take_delta(step), Some(0));
        assert_eq!(clock.take_delta(Some(5116)), Some(16));
    }

    #[test]
    fn test_consistent_and_slow_timing() {
        let mut clock = AnimationClock::new(
            ClockConfig {
                consistent_timing: true,
                slow_mode: true,
                ..ClockConfig::default()
            },
            Box::new(ManualTime::new()),
        );
        clock.register_top_level(id(0));
        clock.process_start_stop(Some(0));
        // 16 / 5 = 3.2 -> 3
        assert_eq!(clock.take_delta(Some(1000)), Some(3));
    }

    #[test]
    fn test_unregister_adjusts_current_index() {
        let mut clock = clock();
        clock.animations = vec![id(0), id(1), id(2)];
        clock.current_index = 1;
        clock.unregister_top_level(id(0));
        assert_eq!(clock.current_index, 0);
        clock.unregister_top_level(id(2));
        assert_eq!(clock.current_index, 0);
        assert_eq!(clock.animations, vec![id(1)]);
    }

    #[test]
    fn test_manual_time_source() {
        let time = ManualTime::new();
        let mut source = time.clone();
        time.advance(40);
        source.restart();
        time.advance(10);
        assert_eq!(source.elapsed(), 10);
    }
}
