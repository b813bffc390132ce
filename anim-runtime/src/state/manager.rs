//! 过渡管理器
//!
//! 每个状态持有一个管理器，负责把动作列表落到属性上：
//! 有过渡时先“试应用”绑定变化读出终值，再交给过渡模板生成任务；
//! 未被动画接管的动作立即生效，绑定统一在结束时恢复。

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use tracing::debug;

use super::action::{SimpleAction, StateAction};
use super::transition::Transition;
use crate::animator::Animator;
use crate::job::{JobEvent, JobId};
use crate::property::{PropertyRef, WriteFlags};

/// 完成时写终值：不移除刚恢复的绑定
const COMPLETE_WRITE: WriteFlags = WriteFlags {
    bypass_interceptor: false,
    dont_remove_binding: true,
};

#[derive(Default)]
struct ManagerInner {
    running: Option<JobId>,
    bindings_list: Vec<StateAction>,
    complete_list: Vec<SimpleAction>,
}

/// 过渡管理器
#[derive(Clone)]
pub(crate) struct TransitionManager {
    inner: Rc<RefCell<ManagerInner>>,
    on_complete: Rc<dyn Fn()>,
}

impl TransitionManager {
    pub(crate) fn new(on_complete: impl Fn() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(ManagerInner::default())),
            on_complete: Rc::new(on_complete),
        }
    }

    /// 正在运行的过渡任务
    pub(crate) fn running(&self) -> Option<JobId> {
        self.inner.borrow().running
    }

    /// 执行一次状态切换
    ///
    /// # 参数
    ///
    /// - `list`: 新状态的完整动作列表
    /// - `transition`: 选中的过渡以及是否反向
    pub(crate) fn transition(
        &self,
        animator: &mut Animator,
        mut list: Vec<StateAction>,
        transition: Option<(&Transition, bool)>,
    ) {
        self.cancel(animator);

        let mut bindings_list = Vec::new();
        for action in &list {
            if action.to_binding.is_some() {
                bindings_list.push(action.clone());
            }
            if action.from_binding.is_some()
                && let Some(property) = &action.property
            {
                property.set_binding(None, WriteFlags::NONE);
            }
            if let Some(event) = &action.event
                && event.borrow().changes_bindings()
            {
                bindings_list.push(action.clone());
                event.borrow_mut().clear_bindings();
            }
        }

        if transition.is_some() && !bindings_list.is_empty() {
            fake_apply(&mut list);
        }
        self.inner.borrow_mut().bindings_list = bindings_list;

        let mut job = None;
        if let Some((transition, reversed)) = transition {
            let mut touched: Vec<PropertyRef> = Vec::new();
            job = transition.prepare(animator, &mut list, &mut touched, reversed);

            let mut complete_list = Vec::new();
            list.retain(|action| {
                if action.event.is_some() {
                    return !action.action_done;
                }
                match &action.property {
                    Some(property) if touched.contains(property) => {
                        if action.to_value != action.from_value {
                            complete_list.push(SimpleAction::end_state(action));
                        }
                        false
                    }
                    _ => true,
                }
            });
            self.inner.borrow_mut().complete_list = complete_list;
        }

        // 剩余动作立即生效；绑定在 complete 中统一恢复
        for action in &list {
            match (&action.event, &action.property) {
                (Some(event), _) => {
                    let mut event = event.borrow_mut();
                    if event.changes_bindings() {
                        continue;
                    }
                    if event.is_reversable() && action.reverse_event {
                        event.reverse();
                    } else {
                        event.execute();
                    }
                }
                (None, Some(property)) if action.to_binding.is_none() => {
                    property.write(action.to_value.clone(), WriteFlags::NONE);
                }
                _ => {}
            }
        }

        let Some(job) = job else {
            self.complete();
            return;
        };

        self.inner.borrow_mut().running = Some(job);
        let weak = self.downgrade();
        animator.add_listener(job, move |animator, id, event| {
            if *event != JobEvent::Finished {
                return;
            }
            let Some(manager) = weak.upgrade() else {
                return;
            };
            let is_current = {
                let mut inner = manager.inner.borrow_mut();
                if inner.running == Some(id) {
                    inner.running = None;
                    true
                } else {
                    false
                }
            };
            if is_current {
                debug!(job = %id, "过渡结束");
                manager.complete();
                animator.destroy(id);
            }
        });
        animator.start(job);
    }

    /// 恢复绑定、写入动画属性的终值并通知状态
    pub(crate) fn complete(&self) {
        let (bindings_list, complete_list) = {
            let mut inner = self.inner.borrow_mut();
            (
                std::mem::take(&mut inner.bindings_list),
                std::mem::take(&mut inner.complete_list),
            )
        };
        for action in &bindings_list {
            match (&action.to_binding, &action.event) {
                (Some(binding), _) => {
                    if let Some(property) = &action.property {
                        property.set_binding(Some(binding.clone()), WriteFlags::NONE);
                    }
                }
                (None, Some(event)) => {
                    let mut event = event.borrow_mut();
                    if action.reverse_event {
                        event.reverse();
                    } else {
                        event.execute();
                    }
                }
                (None, None) => {}
            }
        }
        for action in &complete_list {
            if let Some(property) = &action.property {
                property.write(action.value.clone(), COMPLETE_WRITE);
            }
        }
        (self.on_complete)();
    }

    /// 中断正在运行的过渡
    ///
    /// 任务停在当前值上，不跳到终点；新的过渡从这里继续。
    pub(crate) fn cancel(&self, animator: &mut Animator) {
        let (running, bindings_list) = {
            let mut inner = self.inner.borrow_mut();
            inner.complete_list.clear();
            (
                inner.running.take(),
                std::mem::take(&mut inner.bindings_list),
            )
        };
        if let Some(job) = running {
            debug!(job = %job, "中断过渡");
            animator.stop_job(job);
            animator.destroy(job);
        }
        for action in bindings_list {
            if action.to_binding.is_some()
                && action.deletable_to_binding
                && let Some(property) = &action.property
            {
                property.set_binding(None, WriteFlags::NONE);
            }
        }
    }

    fn downgrade(&self) -> WeakManager {
        WeakManager {
            inner: Rc::downgrade(&self.inner),
            on_complete: Rc::downgrade(&self.on_complete),
        }
    }
}

struct WeakManager {
    inner: Weak<RefCell<ManagerInner>>,
    on_complete: Weak<dyn Fn()>,
}

impl WeakManager {
    fn upgrade(&self) -> Option<TransitionManager> {
        Some(TransitionManager {
            inner: self.inner.upgrade()?,
            on_complete: self.on_complete.upgrade()?,
        })
    }
}

/// 先应用所有变化读出终值，再回滚到起点
fn fake_apply(list: &mut [StateAction]) {
    for action in list.iter() {
        match (&action.event, &action.property) {
            (Some(event), _) => {
                let mut event = event.borrow_mut();
                if !event.is_reversable() {
                    continue;
                }
                if action.reverse_event {
                    event.reverse();
                } else {
                    event.execute();
                }
            }
            (None, Some(property)) => match &action.to_binding {
                Some(binding) => {
                    property.set_binding(Some(binding.clone()), WriteFlags::ANIMATION);
                }
                None => {
                    property.write(action.to_value.clone(), WriteFlags::ANIMATION);
                }
            },
            (None, None) => {}
        }
    }

    for action in list.iter_mut() {
        if let Some(event) = &action.event {
            event.borrow_mut().save_target_values();
            continue;
        }
        if let Some(property) = &action.property
            && (action.to_binding.is_some() || !action.to_value.is_defined())
        {
            action.to_value = property.read();
        }
    }

    for action in list.iter() {
        match (&action.event, &action.property) {
            (Some(event), _) => {
                let mut event = event.borrow_mut();
                if event.is_reversable() {
                    event.clear_bindings();
                    event.rewind();
                    event.clear_bindings();
                }
            }
            (None, Some(property)) => {
                if action.to_binding.is_some() {
                    property.set_binding(None, WriteFlags::NONE);
                }
                property.write(action.from_value.clone(), WriteFlags::ANIMATION);
            }
            (None, None) => {}
        }
    }
}
