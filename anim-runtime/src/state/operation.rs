//! 状态操作：状态声明中的条目，展开为动作列表

use tracing::warn;

use super::action::{ChangeValue, StateAction};
use super::event::{
    ActionEvent, AnchorChanges, EventRef, ParentChange, ReplaceSignalHandler, StateChangeScript,
};
use crate::property::{Binding, PropertyObject, SignalHandler};
use crate::value::Value;

/// 属性变化
pub struct PropertyChanges {
    target: PropertyObject,
    changes: Vec<(String, ChangeValue)>,
    signal_handlers: Vec<EventRef>,
    restore_entry_values: bool,
    explicit: bool,
}

impl PropertyChanges {
    pub fn new(target: &PropertyObject) -> Self {
        Self {
            target: target.clone(),
            changes: Vec::new(),
            signal_handlers: Vec::new(),
            restore_entry_values: true,
            explicit: false,
        }
    }

    pub fn set(mut self, property: &str, value: impl Into<Value>) -> Self {
        self.changes
            .push((property.to_string(), ChangeValue::Value(value.into())));
        self
    }

    pub fn bind(mut self, property: &str, binding: Binding) -> Self {
        self.changes
            .push((property.to_string(), ChangeValue::Binding(binding)));
        self
    }

    /// 在状态内替换信号处理器
    pub fn replace_handler(mut self, signal: &str, handler: SignalHandler) -> Self {
        let event = ActionEvent::SignalHandler(ReplaceSignalHandler::new(&self.target, signal, handler));
        self.signal_handlers.push(event.into_ref());
        self
    }

    /// 离开状态时是否恢复进入前的值（默认恢复）
    pub fn restore_entry_values(mut self, restore: bool) -> Self {
        self.restore_entry_values = restore;
        self
    }

    /// 显式模式：绑定在进入状态时求值一次，不再保持绑定
    pub fn explicit(mut self, explicit: bool) -> Self {
        self.explicit = explicit;
        self
    }

    pub fn target(&self) -> &PropertyObject {
        &self.target
    }

    /// 涉及的属性名
    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.changes.iter().map(|(name, _)| name.as_str())
    }

    pub fn actions(&self) -> Vec<StateAction> {
        let mut list = Vec::new();
        for (name, change) in &self.changes {
            if !self.target.has_property(name) {
                warn!(object = %self.target.name(), property = %name, "不能给不存在的属性赋值");
                continue;
            }
            let property = self.target.property(name);
            let mut action = match change {
                ChangeValue::Binding(binding) if self.explicit => {
                    StateAction::new(property, binding.evaluate())
                }
                _ => StateAction::from_change(property, change),
            };
            action.restore = self.restore_entry_values;
            list.push(action);
        }
        for event in &self.signal_handlers {
            list.push(StateAction::event(event.clone()));
        }
        list
    }
}

/// 状态操作
pub enum StateOperation {
    PropertyChanges(PropertyChanges),
    /// 换父节点、锚点变化或状态脚本
    Event(EventRef),
}

impl StateOperation {
    /// 展开为动作列表
    pub fn actions(&self) -> Vec<StateAction> {
        match self {
            StateOperation::PropertyChanges(changes) => changes.actions(),
            StateOperation::Event(event) => {
                let mut list = vec![StateAction::event(event.clone())];
                if let ActionEvent::ParentChange(change) = &*event.borrow() {
                    list.extend(change.value_actions());
                }
                list
            }
        }
    }
}

impl From<PropertyChanges> for StateOperation {
    fn from(changes: PropertyChanges) -> Self {
        StateOperation::PropertyChanges(changes)
    }
}

impl From<ParentChange> for StateOperation {
    fn from(change: ParentChange) -> Self {
        StateOperation::Event(ActionEvent::ParentChange(change).into_ref())
    }
}

impl From<AnchorChanges> for StateOperation {
    fn from(changes: AnchorChanges) -> Self {
        StateOperation::Event(ActionEvent::AnchorChanges(changes).into_ref())
    }
}

impl From<StateChangeScript> for StateOperation {
    fn from(script: StateChangeScript) -> Self {
        StateOperation::Event(ActionEvent::Script(script).into_ref())
    }
}
