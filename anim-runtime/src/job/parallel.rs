//! 并行分组
//!
//! 所有子任务共享分组时间。跨越循环边界时：
//! 正向把仍在运行的子任务推到终点，反向把所有子任务回退到 0 并停止。

use super::{Direction, JobId, JobKind, JobState, UNCONTROLLED, return_if_deleted};
use crate::animator::Animator;

/// 并行分组状态：用于检测两次更新之间是否跨越了循环边界
#[derive(Debug, Default)]
pub struct ParallelGroup {
    pub(crate) previous_loop: i32,
    pub(crate) previous_current_time: i32,
}

impl Animator {
    fn par(&self, group: JobId) -> Option<&ParallelGroup> {
        match self.job(group).map(|j| &j.kind) {
            Some(JobKind::Parallel(par)) => Some(par),
            _ => None,
        }
    }

    fn par_mut(&mut self, group: JobId) -> Option<&mut ParallelGroup> {
        match self.jobs.get_mut(group).map(|j| &mut j.kind) {
            Some(JobKind::Parallel(par)) => Some(par),
            _ => None,
        }
    }

    /// 子任务在当前分组时间是否应当运行
    ///
    /// 正向不包含时长终点，反向包含终点但不包含 0。
    fn par_should_animation_start(&self, group: JobId, child: JobId, start_if_at_end: bool) -> bool {
        let duration = self.total_duration(child);
        if duration == UNCONTROLLED {
            return self.uncontrolled_finish_time(child) == UNCONTROLLED;
        }
        let current_time = self.current_loop_time(group);
        if start_if_at_end {
            return current_time <= duration;
        }
        match self.direction(group) {
            Direction::Forward => current_time < duration,
            Direction::Backward => current_time != 0 && current_time <= duration,
        }
    }

    /// 让子任务跟随分组状态
    fn par_apply_group_state(&mut self, group: JobId, child: JobId) {
        match self.state(group) {
            JobState::Running => self.start(child),
            JobState::Paused => self.pause(child),
            JobState::Stopped => {}
        }
    }

    pub(crate) fn par_update_current_time(&mut self, group: JobId, _current_time: i32) {
        if self.first_child(group).is_none() {
            return;
        }
        let Some((previous_loop, previous_current_time)) = self
            .par(group)
            .map(|p| (p.previous_loop, p.previous_current_time))
        else {
            return;
        };
        let current_loop = self.current_loop(group);

        if current_loop > previous_loop {
            // 模拟上一轮结束
            let duration = self.duration(group);
            if duration > 0 {
                for child in self.children(group) {
                    if self.state(child) != JobState::Stopped {
                        // 会自行停止
                        self.set_current_time(child, duration);
                        return_if_deleted!(self, group);
                    }
                }
            }
            self.reset_uncontrolled_finish_times(group);
        } else if current_loop < previous_loop {
            // 反向跨越：回退并显式停止，下一轮重新触发启动
            for child in self.children(group) {
                self.par_apply_group_state(group, child);
                return_if_deleted!(self, group);
                self.set_current_time(child, 0);
                return_if_deleted!(self, group);
                self.stop_job(child);
                return_if_deleted!(self, group);
            }
        }

        for child in self.children(group) {
            let duration = self.total_duration(child);
            if current_loop > previous_loop
                || self.par_should_animation_start(
                    group,
                    child,
                    previous_current_time > duration,
                )
            {
                self.par_apply_group_state(group, child);
                return_if_deleted!(self, group);
            }

            if self.state(child) == self.state(group) {
                let current_time = self.current_loop_time(group);
                self.set_current_time(child, current_time);
                return_if_deleted!(self, group);
                if duration > 0 && current_time > duration {
                    self.stop_job(child);
                    return_if_deleted!(self, group);
                }
            }
        }

        let current_time = self.current_loop_time(group);
        if let Some(par) = self.par_mut(group) {
            par.previous_loop = current_loop;
            par.previous_current_time = current_time;
        }
    }

    pub(crate) fn par_update_state(&mut self, group: JobId, new_state: JobState, old_state: JobState) {
        match new_state {
            JobState::Stopped => {
                for child in self.children(group) {
                    self.stop_job(child);
                    return_if_deleted!(self, group);
                }
            }
            JobState::Paused => {
                for child in self.children(group) {
                    if self.state(child) == JobState::Running {
                        self.pause(child);
                        return_if_deleted!(self, group);
                    }
                }
            }
            JobState::Running => {
                let (direction, loops) = (self.direction(group), self.loop_count(group));
                for child in self.children(group) {
                    if old_state == JobState::Stopped {
                        self.stop_job(child);
                        return_if_deleted!(self, group);
                        if let Some(par) = self.par_mut(group) {
                            par.previous_loop = match direction {
                                Direction::Forward => 0,
                                Direction::Backward => loops - 1,
                            };
                        }
                    }
                    self.reset_uncontrolled_finish_time(child);
                    self.set_direction(child, direction);
                    return_if_deleted!(self, group);
                    if self.par_should_animation_start(group, child, old_state == JobState::Stopped) {
                        self.start(child);
                        return_if_deleted!(self, group);
                    }
                }
            }
        }
    }

    pub(crate) fn par_update_direction(&mut self, group: JobId, direction: Direction) {
        if self.state(group) != JobState::Stopped {
            self.group_update_direction(group, direction);
            return;
        }
        let loops = self.loop_count(group);
        let duration = self.duration(group);
        if let Some(par) = self.par_mut(group) {
            match direction {
                Direction::Forward => {
                    par.previous_loop = 0;
                    par.previous_current_time = 0;
                }
                Direction::Backward => {
                    // 无限循环反向播放没有意义，从第 0 轮开始
                    par.previous_loop = if loops == UNCONTROLLED { 0 } else { loops - 1 };
                    par.previous_current_time = duration;
                }
            }
        }
    }

    /// 子任务自报完成（并行与持续分组共用）
    ///
    /// 所有不可预知时长的子任务都完成后，分组得出自己的完成时间；
    /// 若已没有运行中的子任务且处于最后一轮，则停止。
    pub(crate) fn par_uncontrolled_finished(&mut self, group: JobId, child: JobId) {
        let mut uncontrolled_running = 0;
        for c in self.children(group) {
            if c == child {
                let finish = self.current_time(child);
                self.set_uncontrolled_finish_time(child, finish);
            } else if (self.duration(c) == UNCONTROLLED || self.loop_count(c) < 0)
                && !self.is_uncontrolled_finished(c)
            {
                uncontrolled_running += 1;
            }
        }
        if uncontrolled_running > 0 {
            return;
        }

        let mut max_duration = 0;
        let mut running = false;
        for c in self.children(group) {
            running |= self.state(c) == JobState::Running;
            max_duration = max_duration.max(self.total_duration(c));
        }

        let Some(job) = self.jobs.get_mut(group) else {
            return;
        };
        job.uncontrolled_finish_time =
            (max_duration + job.current_loop_start_time).max(job.total_current_time);
        let last_loop = match job.direction {
            Direction::Forward => job.current_loop == job.loop_count - 1,
            Direction::Backward => job.current_loop == 0,
        };
        if !running && last_loop {
            self.stop_job(group);
        }
    }
}
