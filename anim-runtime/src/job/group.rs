//! 分组公共逻辑：子任务双向链表、插入/移除回调、uncontrolled 完成记录

use tracing::debug;

use super::{Direction, JobId, JobKindTag, UNCONTROLLED, return_if_deleted};
use crate::animator::Animator;
use crate::error::JobError;

impl Animator {
    // ========== 链表查询 ==========

    pub fn first_child(&self, group: JobId) -> Option<JobId> {
        self.job(group).and_then(|j| j.first_child)
    }

    pub fn last_child(&self, group: JobId) -> Option<JobId> {
        self.job(group).and_then(|j| j.last_child)
    }

    pub fn next_sibling(&self, id: JobId) -> Option<JobId> {
        self.job(id).and_then(|j| j.next_sibling)
    }

    pub fn prev_sibling(&self, id: JobId) -> Option<JobId> {
        self.job(id).and_then(|j| j.prev_sibling)
    }

    /// 所属分组
    pub fn group_of(&self, id: JobId) -> Option<JobId> {
        self.job(id).and_then(|j| j.group)
    }

    /// 子任务（按链表顺序）
    pub fn children(&self, group: JobId) -> Vec<JobId> {
        let mut children = Vec::new();
        let mut child = self.first_child(group);
        while let Some(c) = child {
            children.push(c);
            child = self.next_sibling(c);
        }
        children
    }

    // ========== 组装 ==========

    fn check_insert(&self, group: JobId, child: JobId) -> Result<(), JobError> {
        if !self.contains(group) {
            return Err(JobError::NotFound(group));
        }
        if !self.contains(child) {
            return Err(JobError::NotFound(child));
        }
        if !self.is_group(group) {
            return Err(JobError::NotAGroup(group));
        }
        // child 不能是 group 自身或其祖先
        let mut ancestor = Some(group);
        while let Some(a) = ancestor {
            if a == child {
                return Err(JobError::CyclicGroup { group, child });
            }
            ancestor = self.group_of(a);
        }
        Ok(())
    }

    /// 追加子任务；子任务先脱离原分组
    pub fn append_child(&mut self, group: JobId, child: JobId) -> Result<(), JobError> {
        self.check_insert(group, child)?;
        if let Some(old) = self.group_of(child) {
            self.remove_animation(old, child);
        }

        let last = self.last_child(group);
        if let Some(last) = last
            && let Some(job) = self.jobs.get_mut(last)
        {
            job.next_sibling = Some(child);
        }
        if let Some(job) = self.jobs.get_mut(group) {
            if last.is_none() {
                job.first_child = Some(child);
            }
            job.last_child = Some(child);
        }
        if let Some(job) = self.jobs.get_mut(child) {
            job.prev_sibling = last;
            job.next_sibling = None;
            job.group = Some(group);
        }

        self.animation_inserted(group, child);
        Ok(())
    }

    /// 插入到最前；子任务先脱离原分组
    pub fn prepend_child(&mut self, group: JobId, child: JobId) -> Result<(), JobError> {
        self.check_insert(group, child)?;
        if let Some(old) = self.group_of(child) {
            self.remove_animation(old, child);
        }

        let first = self.first_child(group);
        if let Some(first) = first
            && let Some(job) = self.jobs.get_mut(first)
        {
            job.prev_sibling = Some(child);
        }
        if let Some(job) = self.jobs.get_mut(group) {
            if first.is_none() {
                job.last_child = Some(child);
            }
            job.first_child = Some(child);
        }
        if let Some(job) = self.jobs.get_mut(child) {
            job.prev_sibling = None;
            job.next_sibling = first;
            job.group = Some(group);
        }

        self.animation_inserted(group, child);
        Ok(())
    }

    /// 移除子任务，子任务成为独立任务（不销毁）
    pub fn remove_child(&mut self, group: JobId, child: JobId) -> Result<(), JobError> {
        if !self.contains(group) {
            return Err(JobError::NotFound(group));
        }
        if self.group_of(child) != Some(group) {
            return Err(JobError::NotAChild { group, child });
        }
        self.remove_animation(group, child);
        Ok(())
    }

    /// 销毁所有子任务
    pub fn clear_group(&mut self, group: JobId) {
        while let Some(child) = self.first_child(group) {
            self.destroy(child);
            return_if_deleted!(self, group);
        }
    }

    /// 断开链表并通知分组
    pub(crate) fn remove_animation(&mut self, group: JobId, child: JobId) {
        let (prev, next) = self.unlink(group, child);
        self.animation_removed(group, child, prev, next);
    }

    /// 断开链表，不触发分组回调（销毁分组时使用）
    pub(crate) fn detach_silently(&mut self, group: JobId, child: JobId) {
        self.unlink(group, child);
    }

    fn unlink(&mut self, group: JobId, child: JobId) -> (Option<JobId>, Option<JobId>) {
        let (prev, next) = match self.jobs.get_mut(child) {
            Some(job) => {
                let links = (job.prev_sibling, job.next_sibling);
                job.prev_sibling = None;
                job.next_sibling = None;
                job.group = None;
                links
            }
            None => return (None, None),
        };

        match prev.and_then(|p| self.jobs.get_mut(p)) {
            Some(job) => job.next_sibling = next,
            None => {
                if let Some(job) = self.jobs.get_mut(group) {
                    job.first_child = next;
                }
            }
        }
        match next.and_then(|n| self.jobs.get_mut(n)) {
            Some(job) => job.prev_sibling = prev,
            None => {
                if let Some(job) = self.jobs.get_mut(group) {
                    job.last_child = prev;
                }
            }
        }
        (prev, next)
    }

    // ========== 分组回调 ==========

    fn animation_inserted(&mut self, group: JobId, child: JobId) {
        if self.kind(group) == Some(JobKindTag::Sequential) {
            self.seq_animation_inserted(group, child);
        }
    }

    fn animation_removed(
        &mut self,
        group: JobId,
        child: JobId,
        prev: Option<JobId>,
        next: Option<JobId>,
    ) {
        self.set_uncontrolled_finish_time(child, UNCONTROLLED);
        if self.first_child(group).is_none() {
            if let Some(job) = self.jobs.get_mut(group) {
                job.current_time = 0;
            }
            self.stop_job(group);
            return_if_deleted!(self, group);
        }
        if self.kind(group) == Some(JobKindTag::Sequential) {
            self.seq_animation_removed(group, child, prev, next);
        }
    }

    // ========== uncontrolled 记录 ==========

    pub(crate) fn is_uncontrolled_finished(&self, child: JobId) -> bool {
        self.uncontrolled_finish_time(child) >= 0
    }

    pub(crate) fn reset_uncontrolled_finish_time(&mut self, child: JobId) {
        self.set_uncontrolled_finish_time(child, UNCONTROLLED);
    }

    pub(crate) fn reset_uncontrolled_finish_times(&mut self, group: JobId) {
        for child in self.children(group) {
            if self.duration(child) == UNCONTROLLED {
                self.reset_uncontrolled_finish_time(child);
            }
        }
    }

    /// 顶层循环切换向下传播
    pub(crate) fn group_top_level_loop_changed(&mut self, group: JobId) {
        for child in self.children(group) {
            self.top_level_loop_changed(child);
            return_if_deleted!(self, group);
        }
    }

    /// 默认的方向更新：同步到所有子任务
    pub(crate) fn group_update_direction(&mut self, group: JobId, direction: Direction) {
        for child in self.children(group) {
            self.set_direction(child, direction);
            return_if_deleted!(self, group);
        }
        debug!(group = %group, ?direction, "分组方向已更新");
    }
}
