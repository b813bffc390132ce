//! 顺序分组
//!
//! 子任务依次播放，同一时刻只有"当前"子任务接收时间。
//! 跨越子任务（或跨越整轮循环）时，中间经过的每个子任务都会被
//! 快进到终点或回退到 0，保证每个子任务都走完一次完整的启动/停止。

use tracing::debug;

use super::{Direction, JobId, JobKind, JobState, UNCONTROLLED, return_if_deleted};
use crate::animator::Animator;

/// 顺序分组状态
#[derive(Debug, Default)]
pub struct SequentialGroup {
    /// 当前子任务（只是引用，不拥有）
    pub(crate) current: Option<JobId>,
    pub(crate) previous_loop: i32,
}

/// `index_for_current_time` 的结果
struct AnimationIndex {
    animation: JobId,
    /// `animation` 之前的子任务时长之和
    time_offset: i32,
    /// `animation` 是否位于原当前子任务之后
    after_current: bool,
}

impl Animator {
    fn seq(&self, group: JobId) -> Option<&SequentialGroup> {
        match self.job(group).map(|j| &j.kind) {
            Some(JobKind::Sequential(seq)) => Some(seq),
            _ => None,
        }
    }

    fn seq_mut(&mut self, group: JobId) -> Option<&mut SequentialGroup> {
        match self.jobs.get_mut(group).map(|j| &mut j.kind) {
            Some(JobKind::Sequential(seq)) => Some(seq),
            _ => None,
        }
    }

    /// 顺序分组当前接收时间的子任务
    pub fn current_animation(&self, group: JobId) -> Option<JobId> {
        self.seq(group).and_then(|s| s.current)
    }

    /// 子任务的实际总时长：不可预知时取其自报完成时间（可能仍为 -1）
    pub(crate) fn animation_actual_total_duration(&self, child: JobId) -> i32 {
        let total = self.total_duration(child);
        if total == UNCONTROLLED {
            self.uncontrolled_finish_time(child)
        } else {
            total
        }
    }

    fn seq_index_for_current_time(&self, group: JobId) -> Option<AnimationIndex> {
        let job = self.job(group)?;
        let (current_time, direction) = (job.current_time, job.direction);
        let current = self.current_animation(group);

        let mut time_offset = 0;
        let mut after_current = false;
        let mut duration = 0;
        let mut child = job.first_child;
        while let Some(anim) = child {
            duration = self.animation_actual_total_duration(anim);

            // 时长不可预知、在 current_time 之后结束、
            // 或反向时恰好在 current_time 结束：即为当前子任务
            if duration == UNCONTROLLED
                || current_time < time_offset + duration
                || (current_time == time_offset + duration && direction == Direction::Backward)
            {
                return Some(AnimationIndex {
                    animation: anim,
                    time_offset,
                    after_current,
                });
            }

            if Some(anim) == current {
                after_current = true;
            }
            time_offset += duration;
            child = self.next_sibling(anim);
        }

        // 超出了不可预知分组的实际时长，或全部子任务时长为 0
        Some(AnimationIndex {
            animation: self.last_child(group)?,
            time_offset: time_offset - duration,
            after_current,
        })
    }

    fn seq_at_end(&self, group: JobId) -> bool {
        let (Some(job), Some(current)) = (self.job(group), self.current_animation(group)) else {
            return false;
        };
        job.current_loop == job.loop_count - 1
            && job.direction == Direction::Forward
            && self.next_sibling(current).is_none()
            && self.current_time(current) == self.animation_actual_total_duration(current)
    }

    fn seq_set_previous_loop(&mut self, group: JobId, previous_loop: i32) {
        if let Some(seq) = self.seq_mut(group) {
            seq.previous_loop = previous_loop;
        }
    }

    fn seq_set_current_animation(&mut self, group: JobId, anim: Option<JobId>, intermediate: bool) {
        let Some(anim) = anim else {
            if let Some(seq) = self.seq_mut(group) {
                seq.current = None;
            }
            return;
        };
        let old = self.current_animation(group);
        if old == Some(anim) {
            return;
        }
        if let Some(old) = old {
            self.stop_job(old);
            return_if_deleted!(self, group);
        }
        if let Some(seq) = self.seq_mut(group) {
            seq.current = Some(anim);
        }
        self.seq_activate_current_animation(group, intermediate);
    }

    fn seq_activate_current_animation(&mut self, group: JobId, intermediate: bool) {
        let Some(current) = self.current_animation(group) else {
            return;
        };
        if self.state(group) == JobState::Stopped {
            return;
        }

        self.stop_job(current);
        return_if_deleted!(self, group);
        // 方向与分组保持一致
        let direction = self.direction(group);
        self.set_direction(current, direction);
        return_if_deleted!(self, group);
        if self.total_duration(current) == UNCONTROLLED {
            self.reset_uncontrolled_finish_time(current);
        }
        self.start(current);
        return_if_deleted!(self, group);
        if !intermediate && self.state(group) == JobState::Paused {
            self.pause(current);
        }
    }

    fn seq_restart(&mut self, group: JobId) {
        let (direction, loops) = (self.direction(group), self.loop_count(group));
        let (previous_loop, edge) = match direction {
            Direction::Forward => (0, self.first_child(group)),
            Direction::Backward => (loops - 1, self.last_child(group)),
        };
        self.seq_set_previous_loop(group, previous_loop);
        if edge == self.current_animation(group) {
            self.seq_activate_current_animation(group, false);
        } else {
            self.seq_set_current_animation(group, edge, false);
        }
    }

    fn seq_advance_forwards(&mut self, group: JobId, target: JobId) {
        let (previous_loop, current_loop) = self.seq_loops(group);
        if previous_loop < current_loop {
            // 先把本轮剩余子任务快进到终点
            let mut anim = self.current_animation(group);
            while let Some(a) = anim {
                self.seq_set_current_animation(group, Some(a), true);
                return_if_deleted!(self, group);
                let end = self.animation_actual_total_duration(a);
                self.set_current_time(a, end);
                return_if_deleted!(self, group);
                anim = self.next_sibling(a);
            }
            // 再回到第一个子任务
            let first = self.first_child(group);
            if first.is_some() && first.and_then(|f| self.next_sibling(f)).is_none() {
                // 只有一个子任务时 set_current_animation 不会生效，需要强制激活
                self.seq_activate_current_animation(group, false);
            } else {
                self.seq_set_current_animation(group, first, true);
            }
            return_if_deleted!(self, group);
        }

        let mut anim = self.current_animation(group);
        while let Some(a) = anim
            && a != target
        {
            self.seq_set_current_animation(group, Some(a), true);
            return_if_deleted!(self, group);
            let end = self.animation_actual_total_duration(a);
            self.set_current_time(a, end);
            return_if_deleted!(self, group);
            anim = self.next_sibling(a);
        }
    }

    fn seq_rewind_forwards(&mut self, group: JobId, target: JobId) {
        let (previous_loop, current_loop) = self.seq_loops(group);
        if previous_loop > current_loop {
            let mut anim = self.current_animation(group);
            while let Some(a) = anim {
                self.seq_set_current_animation(group, Some(a), true);
                return_if_deleted!(self, group);
                self.set_current_time(a, 0);
                return_if_deleted!(self, group);
                anim = self.prev_sibling(a);
            }
            let last = self.last_child(group);
            if last.is_some() && last.and_then(|l| self.prev_sibling(l)).is_none() {
                self.seq_activate_current_animation(group, false);
            } else {
                self.seq_set_current_animation(group, last, true);
            }
            return_if_deleted!(self, group);
        }

        let mut anim = self.current_animation(group);
        while let Some(a) = anim
            && a != target
        {
            self.seq_set_current_animation(group, Some(a), true);
            return_if_deleted!(self, group);
            self.set_current_time(a, 0);
            return_if_deleted!(self, group);
            anim = self.prev_sibling(a);
        }
    }

    fn seq_loops(&self, group: JobId) -> (i32, i32) {
        let previous = self.seq(group).map(|s| s.previous_loop).unwrap_or(0);
        (previous, self.current_loop(group))
    }

    // ========== 分组回调 ==========

    pub(crate) fn seq_update_current_time(&mut self, group: JobId, current_time: i32) {
        let Some(current) = self.current_animation(group) else {
            return;
        };
        let Some(index) = self.seq_index_for_current_time(group) else {
            return;
        };

        let (previous_loop, current_loop) = self.seq_loops(group);
        let switching = current != index.animation;
        if previous_loop < current_loop
            || (previous_loop == current_loop && switching && index.after_current)
        {
            // 正向前进等价于反向回退
            self.seq_advance_forwards(group, index.animation);
        } else if previous_loop > current_loop
            || (previous_loop == current_loop && switching && !index.after_current)
        {
            self.seq_rewind_forwards(group, index.animation);
        }
        return_if_deleted!(self, group);

        self.seq_set_current_animation(group, Some(index.animation), false);
        return_if_deleted!(self, group);

        let new_current_time = current_time - index.time_offset;
        match self.current_animation(group) {
            Some(current) => {
                self.set_current_time(current, new_current_time);
                return_if_deleted!(self, group);
                if self.seq_at_end(group) {
                    // 不超出分组时长
                    let overshoot = self
                        .current_animation(group)
                        .map(|c| self.current_time(c) - new_current_time)
                        .unwrap_or(0);
                    if let Some(job) = self.jobs.get_mut(group) {
                        job.current_time += overshoot;
                    }
                    self.stop_job(group);
                    return_if_deleted!(self, group);
                }
            }
            None => {
                // 所有子任务都已移除
                if let Some(job) = self.jobs.get_mut(group) {
                    job.current_time = 0;
                }
                self.stop_job(group);
                return_if_deleted!(self, group);
            }
        }

        self.seq_set_previous_loop(group, current_loop);
    }

    pub(crate) fn seq_update_state(&mut self, group: JobId, new_state: JobState, old_state: JobState) {
        let Some(current) = self.current_animation(group) else {
            return;
        };
        let current_state = self.state(current);
        match new_state {
            JobState::Stopped => self.stop_job(current),
            JobState::Paused => {
                if old_state == current_state && old_state == JobState::Running {
                    self.pause(current);
                } else {
                    self.seq_restart(group);
                }
            }
            JobState::Running => {
                if old_state == current_state && old_state == JobState::Paused {
                    self.start(current);
                } else {
                    self.seq_restart(group);
                }
            }
        }
    }

    pub(crate) fn seq_update_direction(&mut self, group: JobId, direction: Direction) {
        if self.state(group) == JobState::Stopped {
            return;
        }
        if let Some(current) = self.current_animation(group) {
            self.set_direction(current, direction);
        }
    }

    /// 当前子任务自报完成：记下它的完成时间，转到下一个子任务，
    /// 若其余子任务时长都已知则得出分组的完成时间
    pub(crate) fn seq_uncontrolled_finished(&mut self, group: JobId, child: JobId) {
        if self.current_animation(group) != Some(child) {
            debug!(group = %group, child = %child, "非当前子任务自报完成，已忽略");
            return;
        }
        let finish = self.current_time(child);
        self.set_uncontrolled_finish_time(child, finish);

        let mut total = self.current_time(group);
        let forward = self.direction(group) == Direction::Forward;
        let step = |animator: &Animator, id: JobId| {
            if forward {
                animator.next_sibling(id)
            } else {
                animator.prev_sibling(id)
            }
        };

        if let Some(neighbour) = step(self, child) {
            self.seq_set_current_animation(group, Some(neighbour), false);
            return_if_deleted!(self, group);
        }
        let mut sibling = step(self, child);
        while let Some(s) = sibling {
            let duration = self.total_duration(s);
            if duration == UNCONTROLLED {
                total = UNCONTROLLED;
                break;
            }
            total += duration;
            sibling = step(self, s);
        }

        if total >= 0 {
            self.set_uncontrolled_finish_time(group, total);
        }
        if self.seq_at_end(group) {
            self.stop_job(group);
        }
    }

    pub(crate) fn seq_animation_inserted(&mut self, group: JobId, child: JobId) {
        if self.current_animation(group).is_none() {
            let first = self.first_child(group);
            self.seq_set_current_animation(group, first, false);
            return_if_deleted!(self, group);
        }

        // 插在尚未开始的当前子任务之前：新子任务成为当前
        if let Some(current) = self.current_animation(group)
            && self.next_sibling(child) == Some(current)
            && self.current_time(current) == 0
            && self.current_loop(current) == 0
        {
            self.seq_set_current_animation(group, Some(child), false);
        }
    }

    pub(crate) fn seq_animation_removed(
        &mut self,
        group: JobId,
        child: JobId,
        prev: Option<JobId>,
        next: Option<JobId>,
    ) {
        let removing_current = self.current_animation(group) == Some(child);
        if removing_current {
            self.seq_set_current_animation(group, next.or(prev), false);
            return_if_deleted!(self, group);
        }

        // 重新计算当前子任务之前的时长
        let current = self.current_animation(group);
        let mut current_time = 0;
        let mut anim = self.first_child(group);
        while let Some(a) = anim
            && Some(a) != current
        {
            current_time += self.animation_actual_total_duration(a);
            anim = self.next_sibling(a);
        }
        if !removing_current && let Some(current) = current {
            current_time += self.current_time(current);
        }

        let duration = self.duration(group);
        if let Some(job) = self.jobs.get_mut(group) {
            job.current_time = current_time;
            job.total_current_time = current_time + job.current_loop * duration.max(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::config::ClockConfig;
    use crate::easing::EasingFunction;
    use crate::job::{PropertyAnimationJob, SmoothedJob};
    use crate::property::PropertyObject;
    use crate::value::Value;
    use std::cell::Cell;
    use std::rc::Rc;

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    fn sequence(animator: &mut Animator, durations: &[i32]) -> (JobId, Vec<JobId>) {
        let group = animator.create_sequential();
        let children = durations
            .iter()
            .map(|&d| {
                let child = animator.create_pause(d);
                animator.append_child(group, child).unwrap();
                child
            })
            .collect();
        (group, children)
    }

    #[test]
    fn test_first_child_is_current_after_insert() {
        let mut animator = animator();
        let (group, children) = sequence(&mut animator, &[100, 200]);
        assert_eq!(animator.current_animation(group), Some(children[0]));
        assert_eq!(animator.duration(group), 300);
    }

    #[test]
    fn test_forward_scrub_finishes_passed_children() {
        let mut animator = animator();
        let (group, children) = sequence(&mut animator, &[100, 200]);
        animator.start(group);
        animator.set_current_time(group, 150);

        assert_eq!(animator.current_animation(group), Some(children[1]));
        assert_eq!(animator.state(children[0]), JobState::Stopped);
        assert_eq!(animator.current_time(children[0]), 100);
        assert_eq!(animator.state(children[1]), JobState::Running);
        assert_eq!(animator.current_loop_time(children[1]), 50);
    }

    #[test]
    fn test_reversal_matches_direct_backward_seek() {
        let mut animator = animator();
        let (reversed, first) = sequence(&mut animator, &[100, 200]);
        animator.start(reversed);
        animator.set_current_time(reversed, 150);
        animator.set_direction(reversed, Direction::Backward);
        animator.set_current_time(reversed, 50);

        let (direct, second) = sequence(&mut animator, &[100, 200]);
        animator.set_direction(direct, Direction::Backward);
        animator.start(direct);
        animator.set_current_time(direct, 50);

        assert_eq!(animator.current_animation(reversed), Some(first[0]));
        assert_eq!(animator.current_animation(direct), Some(second[0]));
        assert_eq!(animator.current_loop_time(first[0]), 50);
        assert_eq!(animator.current_loop_time(second[0]), 50);
        assert_eq!(animator.state(first[1]), JobState::Stopped);
        assert_eq!(animator.state(second[1]), JobState::Stopped);
    }

    #[test]
    fn test_backward_tie_selects_earlier_child() {
        let mut animator = animator();
        let (group, children) = sequence(&mut animator, &[100, 200]);
        animator.set_direction(group, Direction::Backward);
        animator.start(group);
        animator.set_current_time(group, 100);
        assert_eq!(animator.current_animation(group), Some(children[0]));
        assert_eq!(animator.current_loop_time(children[0]), 100);
    }

    #[test]
    fn test_pause_then_action_fires_once() {
        let mut animator = animator();
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let group = animator.create_sequential();
        let pause = animator.create_pause(100);
        let action = animator.create_action(move |_| counter.set(counter.get() + 1));
        animator.append_child(group, pause).unwrap();
        animator.append_child(group, action).unwrap();

        animator.start(group);
        animator.set_current_time(group, 99);
        assert_eq!(animator.current_animation(group), Some(pause));
        assert_eq!(animator.state(pause), JobState::Running);
        assert_eq!(hits.get(), 0);

        animator.set_current_time(group, 100);
        assert_eq!(hits.get(), 1);
        assert_eq!(animator.state(group), JobState::Stopped);
    }

    #[test]
    fn test_uncontrolled_child_fixes_group_finish_time() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let group = animator.create_sequential();
        let pause = animator.create_pause(100);
        // 1 单位/毫秒，37 毫秒到达
        let smoothed = animator.create_smoothed(SmoothedJob::new(obj.property("x"), 37.0, 1000.0));
        animator.append_child(group, pause).unwrap();
        animator.append_child(group, smoothed).unwrap();
        assert_eq!(animator.duration(group), UNCONTROLLED);

        animator.start(group);
        animator.set_current_time(group, 137);

        assert_eq!(animator.uncontrolled_finish_time(smoothed), 37);
        assert_eq!(animator.uncontrolled_finish_time(group), 137);
        assert_eq!(animator.state(group), JobState::Stopped);
        assert_eq!(obj.get("x"), Value::Number(37.0));
    }

    #[test]
    fn test_loops_restart_from_first_child() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let group = animator.create_sequential();
        let anim = animator.create_property_animation(PropertyAnimationJob::single(
            obj.property("x"),
            Some(Value::Number(0.0)),
            Value::Number(100.0),
            100,
            EasingFunction::Linear,
        ));
        let pause = animator.create_pause(100);
        animator.append_child(group, anim).unwrap();
        animator.append_child(group, pause).unwrap();
        animator.set_loop_count(group, 2);

        animator.start(group);
        animator.set_current_time(group, 250);
        assert_eq!(animator.current_loop(group), 1);
        assert_eq!(animator.current_animation(group), Some(anim));
        assert_eq!(obj.get("x"), Value::Number(50.0));
        assert_eq!(animator.state(pause), JobState::Stopped);
    }

    #[test]
    fn test_removing_current_moves_to_next() {
        let mut animator = animator();
        let (group, children) = sequence(&mut animator, &[100, 200, 300]);
        animator.start(group);
        animator.set_current_time(group, 150);
        assert_eq!(animator.current_animation(group), Some(children[1]));

        animator.remove_child(group, children[1]).unwrap();
        assert_eq!(animator.current_animation(group), Some(children[2]));
        assert_eq!(animator.current_loop_time(group), 100);
    }

    #[test]
    fn test_prepend_before_unstarted_current() {
        let mut animator = animator();
        let (group, children) = sequence(&mut animator, &[100]);
        let head = animator.create_pause(50);
        animator.prepend_child(group, head).unwrap();
        assert_eq!(animator.current_animation(group), Some(head));
        assert_eq!(animator.children(group), vec![head, children[0]]);
    }
}
