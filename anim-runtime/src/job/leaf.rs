//! 叶子任务
//!
//! 叶子任务没有子任务，各自实现时长与 `update_current_time`/`update_state`。

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::proxy::AnimatorProxyJob;
use super::{JobId, JobKind, JobState, UNCONTROLLED};
use crate::animator::Animator;
use crate::easing::EasingFunction;
use crate::property::{PropertyRef, WriteFlags};
use crate::value::Value;

/// 叶子任务
pub enum LeafJob {
    Property(PropertyAnimationJob),
    Pause(PauseJob),
    Action(ActionJob),
    Smoothed(SmoothedJob),
    Proxy(AnimatorProxyJob),
}

impl LeafJob {
    /// 单次循环时长
    pub fn duration(&self) -> i32 {
        match self {
            LeafJob::Property(job) => job.duration,
            LeafJob::Pause(job) => job.duration,
            LeafJob::Action(_) => 0,
            LeafJob::Smoothed(_) => UNCONTROLLED,
            LeafJob::Proxy(job) => job.duration(),
        }
    }
}

// ========== 暂停 ==========

/// 暂停任务：只占用时间
pub struct PauseJob {
    pub(crate) duration: i32,
}

impl PauseJob {
    pub fn new(duration: i32) -> Self {
        Self {
            duration: checked_duration(duration, 0),
        }
    }
}

// ========== 动作 ==========

/// 动作回调
pub type ActionCallback = Box<dyn FnMut(&mut Animator)>;

/// 动作任务：每次从 Stopped 进入 Running 时调用一次回调
pub struct ActionJob {
    pub(crate) callback: Option<ActionCallback>,
}

impl ActionJob {
    pub fn new(callback: impl FnMut(&mut Animator) + 'static) -> Self {
        Self {
            callback: Some(Box::new(callback)),
        }
    }
}

// ========== 属性动画 ==========

/// 单个被动画驱动的属性
#[derive(Debug, Clone)]
pub struct AnimatedProperty {
    pub property: PropertyRef,
    /// 起点；未显式给出时在首次更新时从属性读取
    pub from: Option<Value>,
    pub to: Value,
    pub(crate) from_defined: bool,
}

impl AnimatedProperty {
    pub fn new(property: PropertyRef, from: Option<Value>, to: Value) -> Self {
        let from_defined = from.is_some();
        Self {
            property,
            from,
            to,
            from_defined,
        }
    }
}

/// 角度插值方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    /// 按数值变化：0 → 240 顺时针转 240 度
    #[default]
    Numerical,
    /// 取不超过 180 度的一侧
    Shortest,
    Clockwise,
    Counterclockwise,
}

impl RotationDirection {
    /// 插值时实际使用的终点角度
    ///
    /// 与 `to` 相差 360 的整数倍，保证从 `from` 出发沿指定方向转动。
    pub fn resolve(self, from: f64, to: f64) -> f64 {
        let diff = to - from;
        match self {
            RotationDirection::Numerical => to,
            RotationDirection::Shortest if diff > 180.0 => {
                to - 360.0 * ((diff - 180.0) / 360.0).ceil()
            }
            RotationDirection::Shortest if diff < -180.0 => {
                to + 360.0 * ((-180.0 - diff) / 360.0).ceil()
            }
            RotationDirection::Clockwise if diff < 0.0 => to + 360.0 * (-diff / 360.0).ceil(),
            RotationDirection::Counterclockwise if diff > 0.0 => {
                to - 360.0 * (diff / 360.0).ceil()
            }
            _ => to,
        }
    }
}

/// 批量插值写回
#[derive(Debug, Clone, Default)]
pub struct PropertyUpdater {
    pub actions: Vec<AnimatedProperty>,
    /// 反向播放时进度取 1 - v
    pub reverse: bool,
    /// 数值按角度插值的方向
    pub rotation: RotationDirection,
    pub(crate) from_sourced: bool,
}

impl PropertyUpdater {
    pub fn new(actions: Vec<AnimatedProperty>) -> Self {
        Self {
            actions,
            reverse: false,
            rotation: RotationDirection::Numerical,
            from_sourced: false,
        }
    }

    /// 按进度写回所有属性
    pub fn set_value(&mut self, progress: f64) {
        let v = if self.reverse {
            1.0 - progress
        } else {
            progress
        };

        for action in &mut self.actions {
            if v == 1.0 {
                action.property.write(action.to.clone(), WriteFlags::ANIMATION);
                continue;
            }
            if !self.from_sourced && !action.from_defined {
                action.from = Some(action.property.read());
            }
            let Some(from) = &action.from else {
                continue;
            };
            let to = match (from, &action.to) {
                (Value::Number(a), Value::Number(b)) => {
                    Value::Number(self.rotation.resolve(*a, *b))
                }
                (_, to) => to.clone(),
            };
            if let Some(value) = from.interpolate(&to, v) {
                action.property.write(value, WriteFlags::ANIMATION);
            }
        }
        self.from_sourced = true;
    }

    pub(crate) fn reset_sourced(&mut self) {
        self.from_sourced = false;
    }
}

/// 属性动画任务
pub struct PropertyAnimationJob {
    pub(crate) duration: i32,
    pub(crate) easing: EasingFunction,
    pub(crate) updater: PropertyUpdater,
}

impl PropertyAnimationJob {
    pub fn new(duration: i32, easing: EasingFunction, updater: PropertyUpdater) -> Self {
        Self {
            duration: checked_duration(duration, 250),
            easing,
            updater,
        }
    }

    /// 单属性便捷构造
    pub fn single(
        property: PropertyRef,
        from: Option<Value>,
        to: Value,
        duration: i32,
        easing: EasingFunction,
    ) -> Self {
        Self::new(
            duration,
            easing,
            PropertyUpdater::new(vec![AnimatedProperty::new(property, from, to)]),
        )
    }

    pub fn updater(&self) -> &PropertyUpdater {
        &self.updater
    }

    fn update(&mut self, time: i32) {
        let linear = if self.duration == 0 {
            1.0
        } else {
            f64::from(time) / f64::from(self.duration)
        };
        self.updater.set_value(self.easing.apply(linear));
    }
}

// ========== 平滑跟随 ==========

/// 按速度逼近目标值的数值动画，时长不可预知
pub struct SmoothedJob {
    pub(crate) property: PropertyRef,
    pub(crate) to: f64,
    /// 单位/秒
    pub(crate) velocity: f64,
    pub(crate) from: Option<f64>,
}

impl SmoothedJob {
    pub fn new(property: PropertyRef, to: f64, velocity: f64) -> Self {
        let velocity = if velocity.is_finite() && velocity > 0.0 {
            velocity
        } else {
            warn!(velocity, "平滑动画速度必须为正数，改用默认值 200");
            200.0
        };
        Self {
            property,
            to,
            velocity,
            from: None,
        }
    }

    /// 推进到 `time`，到达目标时返回 `true`
    fn update(&mut self, time: i32) -> bool {
        let current = self.property.read().as_number().unwrap_or(0.0);
        let from = *self.from.get_or_insert(current);
        let distance = self.to - from;
        let travelled = self.velocity * f64::from(time) / 1000.0;
        if travelled >= distance.abs() {
            self.property.write(Value::Number(self.to), WriteFlags::ANIMATION);
            true
        } else {
            let value = from + distance.signum() * travelled;
            self.property.write(Value::Number(value), WriteFlags::ANIMATION);
            false
        }
    }
}

/// 负时长视为配置错误：记录日志并保留原值
pub(crate) fn checked_duration(duration: i32, fallback: i32) -> i32 {
    if duration < 0 {
        warn!(duration, fallback, "动画时长不能为负数，已忽略");
        fallback
    } else {
        duration
    }
}

// ========== Animator 中的叶子逻辑 ==========

impl Animator {
    pub(crate) fn leaf_update_current_time(&mut self, id: JobId, time: i32) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        if job.state == JobState::Stopped {
            return;
        }
        let JobKind::Leaf(leaf) = &mut job.kind else {
            return;
        };

        let self_finished = match leaf {
            LeafJob::Property(anim) => {
                anim.update(time);
                false
            }
            LeafJob::Smoothed(smoothed) => smoothed.update(time),
            LeafJob::Proxy(proxy) => proxy.poll_finished(),
            LeafJob::Pause(_) | LeafJob::Action(_) => false,
        };

        if self_finished {
            debug!(job = %id, time, "叶子任务自报完成");
            self.stop_job(id);
        }
    }

    pub(crate) fn leaf_update_state(&mut self, id: JobId, new_state: JobState, old_state: JobState) {
        let Some(job) = self.jobs.get_mut(id) else {
            return;
        };
        let direction = job.direction;
        let JobKind::Leaf(leaf) = &mut job.kind else {
            return;
        };
        let fresh_start = new_state == JobState::Running && old_state == JobState::Stopped;

        match leaf {
            LeafJob::Property(anim) => {
                if fresh_start {
                    anim.updater.reset_sourced();
                }
            }
            LeafJob::Smoothed(smoothed) => {
                if fresh_start {
                    smoothed.from = None;
                }
            }
            LeafJob::Proxy(proxy) => proxy.forward_state(new_state, old_state, direction),
            LeafJob::Pause(_) => {}
            LeafJob::Action(action) => {
                if !fresh_start {
                    return;
                }
                let Some(mut callback) = action.callback.take() else {
                    return;
                };
                callback(self);
                // 回调可能销毁了自己
                if let Some(job) = self.jobs.get_mut(id)
                    && let JobKind::Leaf(LeafJob::Action(action)) = &mut job.kind
                    && action.callback.is_none()
                {
                    action.callback = Some(callback);
                }
            }
        }
    }

    /// 顶层循环切换：重新从属性采样起点
    pub(crate) fn leaf_top_level_loop_changed(&mut self, id: JobId) {
        if let Some(job) = self.jobs.get_mut(id)
            && let JobKind::Leaf(LeafJob::Property(anim)) = &mut job.kind
        {
            anim.updater.reset_sourced();
        }
    }

    /// 修改叶子时长（属性动画与暂停）
    ///
    /// # 返回
    /// - 负时长或任务不支持设置时长时返回 `false`，原值不变
    pub fn set_duration(&mut self, id: JobId, duration: i32) -> bool {
        if duration < 0 {
            warn!(job = %id, duration, "动画时长不能为负数，保留原值");
            return false;
        }
        let Some(job) = self.jobs.get_mut(id) else {
            return false;
        };
        match &mut job.kind {
            JobKind::Leaf(LeafJob::Property(anim)) => anim.duration = duration,
            JobKind::Leaf(LeafJob::Pause(pause)) => pause.duration = duration,
            _ => {
                debug!(job = %id, "该任务的时长由内容决定，不能直接设置");
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::property::PropertyObject;

    #[test]
    fn test_updater_sources_from_once() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 10.0);
        let mut updater = PropertyUpdater::new(vec![AnimatedProperty::new(
            obj.property("x"),
            None,
            Value::Number(20.0),
        )]);

        updater.set_value(0.5);
        assert_eq!(obj.get("x"), Value::Number(15.0));
        // 起点已采样，不会从 15 重新开始
        updater.set_value(0.5);
        assert_eq!(obj.get("x"), Value::Number(15.0));
        updater.set_value(1.0);
        assert_eq!(obj.get("x"), Value::Number(20.0));
    }

    #[test]
    fn test_rotation_direction_resolve() {
        use RotationDirection::*;
        assert_eq!(Numerical.resolve(10.0, 350.0), 350.0);
        assert_eq!(Shortest.resolve(10.0, 350.0), -10.0);
        assert_eq!(Shortest.resolve(350.0, 10.0), 370.0);
        // 恰好 180 度时保持数值方向
        assert_eq!(Shortest.resolve(0.0, 180.0), 180.0);
        assert_eq!(Shortest.resolve(0.0, 541.0), -179.0);
        assert_eq!(Clockwise.resolve(10.0, 350.0), 350.0);
        assert_eq!(Clockwise.resolve(350.0, 10.0), 370.0);
        assert_eq!(Clockwise.resolve(0.0, -360.0), 0.0);
        assert_eq!(Counterclockwise.resolve(10.0, 350.0), -10.0);
        assert_eq!(Counterclockwise.resolve(350.0, 10.0), 10.0);
    }

    #[test]
    fn test_updater_rotates_shortest_way() {
        let obj = PropertyObject::new("dial");
        obj.declare("rotation", 350.0);
        let mut updater = PropertyUpdater::new(vec![AnimatedProperty::new(
            obj.property("rotation"),
            None,
            Value::Number(30.0),
        )]);
        updater.rotation = RotationDirection::Shortest;

        updater.set_value(0.5);
        assert_eq!(obj.get("rotation"), Value::Number(370.0));
        // 终点写入声明的角度
        updater.set_value(1.0);
        assert_eq!(obj.get("rotation"), Value::Number(30.0));
    }

    #[test]
    fn test_reverse_updater() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let mut updater = PropertyUpdater::new(vec![AnimatedProperty::new(
            obj.property("x"),
            Some(Value::Number(0.0)),
            Value::Number(100.0),
        )]);
        updater.reverse = true;

        updater.set_value(0.0);
        assert_eq!(obj.get("x"), Value::Number(100.0));
        updater.set_value(0.75);
        assert_eq!(obj.get("x"), Value::Number(25.0));
    }

    #[test]
    fn test_negative_duration_falls_back() {
        assert_eq!(PauseJob::new(-5).duration, 0);
        assert_eq!(PauseJob::new(5).duration, 5);
    }

    #[test]
    fn test_smoothed_reaches_target() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let mut job = SmoothedJob::new(obj.property("x"), 37.0, 1000.0);
        assert!(!job.update(20));
        assert_eq!(obj.get("x"), Value::Number(20.0));
        assert!(job.update(37));
        assert_eq!(obj.get("x"), Value::Number(37.0));
    }
}
