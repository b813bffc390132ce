//! 状态：一组操作与离开时的回滚列表

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tracing::{debug, warn};

use super::action::{RevertKey, SimpleAction, StateAction};
use super::manager::TransitionManager;
use super::operation::StateOperation;
use super::transition::Transition;
use crate::animator::Animator;
use crate::property::{Binding, ObjectId, WriteFlags};
use crate::value::Value;

/// `when` 条件
pub type WhenPredicate = Rc<dyn Fn() -> bool>;

#[derive(Default)]
struct RevertData {
    list: Vec<SimpleAction>,
    /// 本次切换中从旧状态继承并转为回滚动作的条目，完成后移除
    reverting: Vec<RevertKey>,
}

struct StateInner {
    name: String,
    extends: String,
    when: Option<WhenPredicate>,
    operations: Vec<StateOperation>,
    revert: RefCell<RevertData>,
    /// 展开 extends 链时的重入保护
    in_state: Cell<bool>,
    manager: TransitionManager,
}

/// 状态（共享句柄）
#[derive(Clone)]
pub struct State {
    inner: Rc<StateInner>,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("name", &self.inner.name)
            .field("extends", &self.inner.extends)
            .field("operations", &self.inner.operations.len())
            .finish()
    }
}

/// 状态构建器
pub struct StateBuilder {
    name: String,
    extends: String,
    when: Option<WhenPredicate>,
    operations: Vec<StateOperation>,
}

impl StateBuilder {
    /// 继承另一个状态的全部操作
    pub fn extends(mut self, base: impl Into<String>) -> Self {
        self.extends = base.into();
        self
    }

    pub fn when(mut self, predicate: impl Fn() -> bool + 'static) -> Self {
        self.when = Some(Rc::new(predicate));
        self
    }

    pub fn with(mut self, operation: impl Into<StateOperation>) -> Self {
        self.operations.push(operation.into());
        self
    }

    pub fn build(self) -> State {
        let inner = Rc::new_cyclic(|weak: &std::rc::Weak<StateInner>| {
            let weak = weak.clone();
            StateInner {
                name: self.name,
                extends: self.extends,
                when: self.when,
                operations: self.operations,
                revert: RefCell::new(RevertData::default()),
                in_state: Cell::new(false),
                manager: TransitionManager::new(move || {
                    if let Some(inner) = weak.upgrade() {
                        State { inner }.complete();
                    }
                }),
            }
        });
        State { inner }
    }
}

impl State {
    pub fn builder(name: impl Into<String>) -> StateBuilder {
        StateBuilder {
            name: name.into(),
            extends: String::new(),
            when: None,
            operations: Vec::new(),
        }
    }

    /// 基础状态：没有任何操作
    pub(crate) fn null_state() -> State {
        State::builder("").build()
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn extends_name(&self) -> &str {
        &self.inner.extends
    }

    pub fn operations(&self) -> &[StateOperation] {
        &self.inner.operations
    }

    /// `when` 条件的当前结果，没有条件时为 `None`
    pub fn when_satisfied(&self) -> Option<bool> {
        self.inner.when.as_ref().map(|when| when())
    }

    pub fn ptr_eq(&self, other: &State) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// 正在运行的过渡任务
    pub fn running_transition(&self) -> Option<crate::job::JobId> {
        self.inner.manager.running()
    }

    /// 展开 extends 链后的完整动作列表
    ///
    /// 遇到环时把已在展开中的状态视为已应用，返回空列表。
    pub fn generate_action_list(&self, states: &[State]) -> Vec<StateAction> {
        if self.inner.in_state.get() {
            debug!(state = %self.name(), "extends 成环，停止展开");
            return Vec::new();
        }
        self.inner.in_state.set(true);

        let mut list = Vec::new();
        let extends = &self.inner.extends;
        if !extends.is_empty() {
            match states.iter().find(|s| s.name() == extends) {
                Some(base) => list = base.generate_action_list(states),
                None => warn!(state = %self.name(), extends = %extends, "继承的状态不存在"),
            }
        }
        for operation in &self.inner.operations {
            list.extend(operation.actions());
        }

        self.inner.in_state.set(false);
        list
    }

    /// 从 `revert` 切换到本状态
    ///
    /// 继承旧状态的回滚列表，与本状态的动作合并后交给过渡管理器。
    pub(crate) fn apply(
        &self,
        animator: &mut Animator,
        states: &[State],
        transition: Option<(&Transition, bool)>,
        revert: &State,
    ) {
        self.cancel(animator);
        let same = self.ptr_eq(revert);
        if !same {
            revert.cancel(animator);
        }

        let mut revert_list = if same {
            std::mem::take(&mut self.inner.revert.borrow_mut().list)
        } else {
            self.inner.revert.borrow_mut().list.clear();
            std::mem::take(&mut revert.inner.revert.borrow_mut().list)
        };
        self.inner.revert.borrow_mut().reverting.clear();

        let mut apply_list = self.generate_action_list(states);
        let mut additional_reverts = Vec::new();

        for action in apply_list.iter_mut() {
            if let Some(event) = action.event.clone() {
                if !event.borrow().is_reversable() {
                    continue;
                }
                let found = revert_list.iter().position(|entry| {
                    entry.event.as_ref().is_some_and(|other| {
                        let (event, other) = (event.borrow(), other.borrow());
                        event.type_name() == other.type_name() && event.may_override(&other)
                    })
                });
                match found {
                    Some(index) => {
                        let other = revert_list[index].event.clone();
                        let distinct = other.as_ref().is_some_and(|o| !Rc::ptr_eq(o, &event));
                        if distinct && event.borrow().needs_copy() {
                            if let Some(other) = other {
                                event.borrow_mut().copy_originals(&other.borrow());
                            }
                            additional_reverts.push(SimpleAction::start_state(action));
                            revert_list.remove(index);
                        } else if event.borrow().is_rewindable() {
                            event.borrow_mut().save_current_values();
                        }
                    }
                    None => {
                        event.borrow_mut().save_originals();
                        additional_reverts.push(SimpleAction::start_state(action));
                    }
                }
            } else if let Some(property) = action.property.clone() {
                action.from_binding = property.binding();
                match revert_list
                    .iter()
                    .find(|entry| entry.property.as_ref() == Some(&property))
                {
                    Some(entry) => {
                        if entry.binding != action.from_binding {
                            action.delete_from_binding();
                        }
                    }
                    None if !action.restore => action.delete_from_binding(),
                    None => additional_reverts.push(SimpleAction::start_state(action)),
                }
            }
        }

        // 旧状态留下、本状态不再覆盖的条目转为恢复动作
        let mut reverting = Vec::new();
        for entry in &revert_list {
            let carried = match (&entry.event, &entry.property) {
                (Some(event), _) => {
                    let event = event.borrow();
                    if !event.is_reversable() {
                        continue;
                    }
                    apply_list.iter().any(|action| {
                        action.event.as_ref().is_some_and(|a| {
                            let a = a.borrow();
                            a.type_name() == event.type_name() && a.may_override(&event)
                        })
                    })
                }
                (None, Some(property)) => apply_list.iter().any(|a| a.targets(property)),
                (None, None) => continue,
            };
            if carried {
                continue;
            }

            let mut action = match (&entry.event, &entry.property) {
                (Some(event), _) => StateAction::event(event.clone()),
                (None, Some(property)) => {
                    property.set_binding(None, WriteFlags::NONE);
                    StateAction::new(property.clone(), entry.value.clone())
                }
                (None, None) => continue,
            };
            action.to_binding = entry.binding.clone();
            action.specified_object = entry.specified_object;
            action.specified_property = entry.specified_property.clone();
            action.reverse_event = entry.reverse_event;
            if let Some(event) = &action.event
                && event.borrow().is_rewindable()
            {
                event.borrow_mut().save_current_values();
            }
            apply_list.push(action);
            if let Some(key) = entry.key() {
                reverting.push(key);
            }
        }

        revert_list.extend(additional_reverts);
        {
            let mut revert = self.inner.revert.borrow_mut();
            revert.list = revert_list;
            revert.reverting = reverting;
        }

        debug!(state = %self.name(), actions = apply_list.len(), "应用状态");
        self.inner.manager.transition(animator, apply_list, transition);
    }

    /// 切换完成：移除已恢复的回滚条目
    pub(crate) fn complete(&self) {
        let mut revert = self.inner.revert.borrow_mut();
        let RevertData { list, reverting } = &mut *revert;
        for key in reverting.drain(..) {
            if let Some(index) = list.iter().position(|entry| entry.key().as_ref() == Some(&key)) {
                list.remove(index);
            }
        }
    }

    /// 中断本状态正在运行的过渡
    pub fn cancel(&self, animator: &mut Animator) {
        self.inner.manager.cancel(animator);
    }

    // ========== 回滚列表 ==========

    fn find_revert(&self, object: ObjectId, property: &str) -> Option<usize> {
        self.inner.revert.borrow().list.iter().position(|entry| {
            entry.specified_object == Some(object) && entry.specified_property == property
        })
    }

    pub fn contains_property_in_revert_list(&self, object: ObjectId, property: &str) -> bool {
        self.find_revert(object, property).is_some()
    }

    /// 修改离开状态时要恢复的值
    pub fn change_value_in_revert_list(
        &self,
        object: ObjectId,
        property: &str,
        value: impl Into<Value>,
    ) -> bool {
        let Some(index) = self.find_revert(object, property) else {
            return false;
        };
        self.inner.revert.borrow_mut().list[index].value = value.into();
        true
    }

    /// 修改离开状态时要恢复的绑定
    pub fn change_binding_in_revert_list(
        &self,
        object: ObjectId,
        property: &str,
        binding: Binding,
    ) -> bool {
        let Some(index) = self.find_revert(object, property) else {
            return false;
        };
        self.inner.revert.borrow_mut().list[index].binding = Some(binding);
        true
    }

    /// 立即恢复该属性并移除条目
    pub fn remove_entry_from_revert_list(&self, object: ObjectId, property: &str) -> bool {
        let Some(index) = self.find_revert(object, property) else {
            return false;
        };
        let entry = self.inner.revert.borrow_mut().list.remove(index);
        if let Some(target) = &entry.property {
            match entry.binding {
                Some(binding) => {
                    target.set_binding(Some(binding), WriteFlags::NONE);
                }
                None => {
                    target.write(entry.value, WriteFlags::NONE);
                }
            }
        }
        true
    }

    /// 为已生效的动作补记回滚条目
    pub fn add_entry_to_revert_list(&self, action: &StateAction) {
        self.inner
            .revert
            .borrow_mut()
            .list
            .push(SimpleAction::start_state(action));
    }

    /// 移除某个对象的全部条目（不恢复）
    pub fn remove_all_entries_from_revert_list(&self, object: ObjectId) {
        self.inner
            .revert
            .borrow_mut()
            .list
            .retain(|entry| entry.specified_object != Some(object));
    }

    pub fn value_in_revert_list(&self, object: ObjectId, property: &str) -> Option<Value> {
        let index = self.find_revert(object, property)?;
        Some(self.inner.revert.borrow().list[index].value.clone())
    }

    pub fn binding_in_revert_list(&self, object: ObjectId, property: &str) -> Option<Binding> {
        let index = self.find_revert(object, property)?;
        self.inner.revert.borrow().list[index].binding.clone()
    }

    pub fn revert_list_len(&self) -> usize {
        self.inner.revert.borrow().list.len()
    }
}
