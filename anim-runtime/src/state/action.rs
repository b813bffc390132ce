//! 状态动作与回滚记录

use std::rc::Rc;

use super::event::EventRef;
use crate::property::{Binding, ObjectId, PropertyRef, WriteFlags};
use crate::value::Value;

/// 状态给属性的新值：常量或绑定
#[derive(Debug, Clone)]
pub enum ChangeValue {
    Value(Value),
    Binding(Binding),
}

impl From<Value> for ChangeValue {
    fn from(value: Value) -> Self {
        ChangeValue::Value(value)
    }
}

impl From<f64> for ChangeValue {
    fn from(value: f64) -> Self {
        ChangeValue::Value(Value::Number(value))
    }
}

impl From<Binding> for ChangeValue {
    fn from(binding: Binding) -> Self {
        ChangeValue::Binding(binding)
    }
}

/// 单条状态变化
///
/// 属性动作（`property` 有值）带起止值或目标绑定；事件动作只带 `event`。
#[derive(Debug, Clone)]
pub struct StateAction {
    pub property: Option<PropertyRef>,
    pub from_value: Value,
    pub to_value: Value,
    /// 进入状态前属性上的绑定
    pub from_binding: Option<Binding>,
    pub to_binding: Option<Binding>,
    pub event: Option<EventRef>,
    /// 执行事件时调用 `reverse` 而不是 `execute`
    pub reverse_event: bool,
    /// 离开状态时恢复原值
    pub restore: bool,
    /// 已被过渡中的动作任务接管
    pub action_done: bool,
    /// 取消过渡时可以丢弃目标绑定
    pub deletable_to_binding: bool,
    pub specified_object: Option<ObjectId>,
    pub specified_property: String,
}

impl StateAction {
    /// 属性改为常量，起点取当前值
    pub fn new(property: PropertyRef, to: impl Into<Value>) -> Self {
        Self {
            from_value: property.read(),
            to_value: to.into(),
            specified_object: Some(property.object_id()),
            specified_property: property.name().to_string(),
            property: Some(property),
            from_binding: None,
            to_binding: None,
            event: None,
            reverse_event: false,
            restore: true,
            action_done: false,
            deletable_to_binding: false,
        }
    }

    /// 属性改为绑定
    pub fn with_binding(property: PropertyRef, binding: Binding) -> Self {
        Self {
            to_value: Value::Undefined,
            to_binding: Some(binding),
            deletable_to_binding: true,
            ..Self::new(property, Value::Undefined)
        }
    }

    pub fn from_change(property: PropertyRef, change: &ChangeValue) -> Self {
        match change {
            ChangeValue::Value(value) => Self::new(property, value.clone()),
            ChangeValue::Binding(binding) => Self::with_binding(property, binding.clone()),
        }
    }

    /// 事件动作
    pub fn event(event: EventRef) -> Self {
        Self {
            property: None,
            from_value: Value::Undefined,
            to_value: Value::Undefined,
            from_binding: None,
            to_binding: None,
            event: Some(event),
            reverse_event: false,
            restore: true,
            action_done: false,
            deletable_to_binding: false,
            specified_object: None,
            specified_property: String::new(),
        }
    }

    /// 是否作用于该属性
    pub fn targets(&self, property: &PropertyRef) -> bool {
        self.property.as_ref() == Some(property)
    }

    /// 移除进入状态前的绑定，它不会再被恢复
    pub(crate) fn delete_from_binding(&mut self) {
        if self.from_binding.take().is_some()
            && let Some(property) = &self.property
        {
            property.set_binding(None, WriteFlags::NONE);
        }
    }
}

/// 回滚记录的键
#[derive(Debug, Clone)]
pub(crate) enum RevertKey {
    Property(PropertyRef),
    Event(EventRef),
}

impl PartialEq for RevertKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RevertKey::Property(a), RevertKey::Property(b)) => a == b,
            (RevertKey::Event(a), RevertKey::Event(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

/// 回滚列表条目：离开状态时需要恢复的值
#[derive(Debug, Clone)]
pub struct SimpleAction {
    pub property: Option<PropertyRef>,
    pub value: Value,
    pub binding: Option<Binding>,
    pub event: Option<EventRef>,
    pub reverse_event: bool,
    pub specified_object: Option<ObjectId>,
    pub specified_property: String,
}

impl SimpleAction {
    /// 起点快照：原值与属性当前绑定，事件在恢复时回退
    pub fn start_state(action: &StateAction) -> Self {
        Self {
            property: action.property.clone(),
            value: action.from_value.clone(),
            binding: action.property.as_ref().and_then(PropertyRef::binding),
            event: action.event.clone(),
            reverse_event: true,
            specified_object: action.specified_object,
            specified_property: action.specified_property.clone(),
        }
    }

    /// 终点快照
    pub fn end_state(action: &StateAction) -> Self {
        Self {
            property: action.property.clone(),
            value: action.to_value.clone(),
            binding: action.to_binding.clone(),
            event: action.event.clone(),
            reverse_event: false,
            specified_object: action.specified_object,
            specified_property: action.specified_property.clone(),
        }
    }

    pub(crate) fn key(&self) -> Option<RevertKey> {
        match (&self.event, &self.property) {
            (Some(event), _) => Some(RevertKey::Event(event.clone())),
            (None, Some(property)) => Some(RevertKey::Property(property.clone())),
            (None, None) => None,
        }
    }
}
