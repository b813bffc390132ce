//! 持续分组
//!
//! 所有子任务同时启动后自由运行：分组只把每次 tick 经过的时间
//! 转交给仍在运行的子任务，从不 seek。所有子任务都停下后分组结束。

use super::{Direction, JobId, JobKind, JobState, return_if_deleted};
use crate::animator::Animator;

/// 持续分组状态
#[derive(Debug, Default)]
pub struct ContinuingGroup {
    /// 上次更新时的分组时间
    pub(crate) last_time: i32,
    pub(crate) previous_loop: i32,
}

impl Animator {
    fn cont_mut(&mut self, group: JobId) -> Option<&mut ContinuingGroup> {
        match self.jobs.get_mut(group).map(|j| &mut j.kind) {
            Some(JobKind::Continuing(cont)) => Some(cont),
            _ => None,
        }
    }

    fn cont_start_children(&mut self, group: JobId) {
        let direction = self.direction(group);
        for child in self.children(group) {
            self.stop_job(child);
            return_if_deleted!(self, group);
            self.reset_uncontrolled_finish_time(child);
            self.set_direction(child, direction);
            return_if_deleted!(self, group);
            self.start(child);
            return_if_deleted!(self, group);
        }
    }

    pub(crate) fn cont_update_current_time(&mut self, group: JobId, current_time: i32) {
        let current_loop = self.current_loop(group);
        let Some(cont) = self.cont_mut(group) else {
            return;
        };
        let new_loop = cont.previous_loop != current_loop;
        let elapsed = if new_loop {
            current_time
        } else {
            (current_time - cont.last_time).abs()
        };
        cont.last_time = current_time;
        cont.previous_loop = current_loop;

        if new_loop {
            // 新一轮：所有子任务重新开始
            self.cont_start_children(group);
            return_if_deleted!(self, group);
        }
        if elapsed == 0 {
            return;
        }

        let group_state = self.state(group);
        for child in self.children(group) {
            if self.state(child) != group_state {
                continue;
            }
            let time = self.current_time(child);
            let time = match self.direction(child) {
                Direction::Forward => time.saturating_add(elapsed),
                Direction::Backward => time.saturating_sub(elapsed),
            };
            self.set_current_time(child, time);
            return_if_deleted!(self, group);
        }
    }

    pub(crate) fn cont_update_state(&mut self, group: JobId, new_state: JobState, old_state: JobState) {
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
                if self.first_child(group).is_none() {
                    self.stop_job(group);
                    return;
                }
                if old_state == JobState::Paused {
                    // 恢复：只继续暂停中的子任务，已结束的不再重启
                    for child in self.children(group) {
                        if self.state(child) == JobState::Paused {
                            self.resume(child);
                            return_if_deleted!(self, group);
                        }
                    }
                    return;
                }
                let (start_time, current_loop) = (
                    self.current_loop_time(group),
                    self.current_loop(group),
                );
                if let Some(cont) = self.cont_mut(group) {
                    cont.last_time = start_time;
                    cont.previous_loop = current_loop;
                }
                self.cont_start_children(group);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::config::ClockConfig;
    use crate::job::SmoothedJob;
    use crate::property::PropertyObject;
    use crate::value::Value;

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    #[test]
    fn test_children_free_run_until_all_stop() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0).declare("y", 0.0);
        let group = animator.create_continuing();
        let a = animator.create_smoothed(SmoothedJob::new(obj.property("x"), 10.0, 1000.0));
        let b = animator.create_smoothed(SmoothedJob::new(obj.property("y"), 40.0, 1000.0));
        animator.append_child(group, a).unwrap();
        animator.append_child(group, b).unwrap();

        animator.start(group);
        animator.advance(0);
        animator.advance(16);
        assert_eq!(animator.state(a), JobState::Stopped);
        assert_eq!(obj.get("x"), Value::Number(10.0));
        assert_eq!(obj.get("y"), Value::Number(16.0));
        assert_eq!(animator.state(group), JobState::Running);

        animator.advance(32);
        animator.advance(48);
        assert_eq!(obj.get("y"), Value::Number(40.0));
        assert_eq!(animator.state(group), JobState::Stopped);
    }

    #[test]
    fn test_empty_group_stops_immediately() {
        let mut animator = animator();
        let group = animator.create_continuing();
        animator.start(group);
        assert_eq!(animator.state(group), JobState::Stopped);
    }

    #[test]
    fn test_resume_keeps_finished_children_stopped() {
        let mut animator = animator();
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0).declare("y", 0.0);
        let group = animator.create_continuing();
        let a = animator.create_smoothed(SmoothedJob::new(obj.property("x"), 5.0, 1000.0));
        let b = animator.create_smoothed(SmoothedJob::new(obj.property("y"), 100.0, 1000.0));
        animator.append_child(group, a).unwrap();
        animator.append_child(group, b).unwrap();

        animator.start(group);
        animator.set_current_time(group, 10);
        assert_eq!(animator.state(a), JobState::Stopped);

        animator.pause(group);
        assert_eq!(animator.state(b), JobState::Paused);
        animator.resume(group);
        assert_eq!(animator.state(a), JobState::Stopped);
        assert_eq!(animator.state(b), JobState::Running);
    }
}
