//! # Property 模块
//!
//! 动画与状态引擎对外依赖的属性抽象。
//!
//! ## 核心概念
//!
//! - [`PropertyHandle`]: 可读写、可挂绑定的属性句柄（外部协作者实现）
//! - [`PropertyRef`]: 共享句柄，按 (对象, 属性名) 判等
//! - [`Binding`]: 绑定表达式，带身份标识
//! - [`PropertyObject`]: 内置的动态属性对象，测试与场景加载使用

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

use crate::value::Value;

/// 对象标识
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub(crate) u64);

impl ObjectId {
    /// 分配新的对象 ID
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// 获取原始值
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "obj#{}", self.0)
    }
}

/// 属性写入标志
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct WriteFlags {
    /// 跳过写入拦截器
    pub bypass_interceptor: bool,
    /// 保留属性上已有的绑定
    pub dont_remove_binding: bool,
}

impl WriteFlags {
    /// 普通写入：经过拦截器，移除绑定
    pub const NONE: WriteFlags = WriteFlags {
        bypass_interceptor: false,
        dont_remove_binding: false,
    };

    /// 动画写入：插值结果不能触发拦截器，也不能破坏绑定
    pub const ANIMATION: WriteFlags = WriteFlags {
        bypass_interceptor: true,
        dont_remove_binding: true,
    };
}

/// 绑定表达式
#[derive(Clone)]
pub struct Binding {
    id: u64,
    evaluate: Rc<dyn Fn() -> Value>,
}

impl Binding {
    /// 创建绑定
    pub fn new(evaluate: impl Fn() -> Value + 'static) -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self {
            id: NEXT.fetch_add(1, Ordering::Relaxed),
            evaluate: Rc::new(evaluate),
        }
    }

    /// 求值
    pub fn evaluate(&self) -> Value {
        (self.evaluate)()
    }

    /// 绑定标识
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Binding {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl std::fmt::Debug for Binding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Binding#{}", self.id)
    }
}

/// 属性句柄
pub trait PropertyHandle {
    /// 所属对象
    fn object_id(&self) -> ObjectId;

    /// 属性名
    fn name(&self) -> &str;

    /// 读取当前值
    fn read(&self) -> Value;

    /// 写入
    ///
    /// # 返回
    /// - 属性不存在时返回 `false`
    fn write(&self, value: Value, flags: WriteFlags) -> bool;

    /// 当前绑定
    fn binding(&self) -> Option<Binding>;

    /// 设置或清除绑定，返回被替换的绑定
    ///
    /// 设置绑定时立即求值并写入。
    fn set_binding(&self, binding: Option<Binding>, flags: WriteFlags) -> Option<Binding>;

    /// 是否有绑定
    fn has_binding(&self) -> bool {
        self.binding().is_some()
    }

    /// 取走绑定（属性保留当前值）
    fn take_binding(&self) -> Option<Binding> {
        self.set_binding(None, WriteFlags::NONE)
    }
}

/// 共享属性句柄
#[derive(Clone)]
pub struct PropertyRef(Rc<dyn PropertyHandle>);

impl PropertyRef {
    /// 包装任意句柄实现
    pub fn new(handle: impl PropertyHandle + 'static) -> Self {
        Self(Rc::new(handle))
    }

    pub fn object_id(&self) -> ObjectId {
        self.0.object_id()
    }

    pub fn name(&self) -> &str {
        self.0.name()
    }

    pub fn read(&self) -> Value {
        self.0.read()
    }

    pub fn write(&self, value: Value, flags: WriteFlags) -> bool {
        self.0.write(value, flags)
    }

    pub fn binding(&self) -> Option<Binding> {
        self.0.binding()
    }

    pub fn has_binding(&self) -> bool {
        self.0.has_binding()
    }

    pub fn set_binding(&self, binding: Option<Binding>, flags: WriteFlags) -> Option<Binding> {
        self.0.set_binding(binding, flags)
    }

    pub fn take_binding(&self) -> Option<Binding> {
        self.0.take_binding()
    }
}

impl PartialEq for PropertyRef {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id() && self.name() == other.name()
    }
}

impl Eq for PropertyRef {}

impl std::fmt::Debug for PropertyRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.object_id(), self.name())
    }
}

/// 变更观察者
pub type ChangeObserver = Rc<dyn Fn(&str, &Value)>;

/// 写入拦截器
pub type Interceptor = Rc<dyn Fn(&Value) -> Value>;

/// 信号处理器
pub type SignalHandler = Rc<dyn Fn()>;

#[derive(Default)]
struct PropertySlot {
    value: Value,
    binding: Option<Binding>,
    interceptor: Option<Interceptor>,
}

struct ObjectInner {
    id: ObjectId,
    name: String,
    slots: RefCell<BTreeMap<String, PropertySlot>>,
    observers: RefCell<Vec<(String, ChangeObserver)>>,
    handlers: RefCell<BTreeMap<String, SignalHandler>>,
}

/// 动态属性对象
///
/// 克隆得到的是同一对象的另一个句柄。
#[derive(Clone)]
pub struct PropertyObject {
    inner: Rc<ObjectInner>,
}

impl PropertyObject {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Rc::new(ObjectInner {
                id: ObjectId::next(),
                name: name.into(),
                slots: RefCell::new(BTreeMap::new()),
                observers: RefCell::new(Vec::new()),
                handlers: RefCell::new(BTreeMap::new()),
            }),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// 声明属性并设置初值（不触发通知）
    pub fn declare(&self, property: impl Into<String>, value: impl Into<Value>) -> &Self {
        let mut slots = self.inner.slots.borrow_mut();
        slots.entry(property.into()).or_default().value = value.into();
        self
    }

    /// 是否声明了该属性
    pub fn has_property(&self, property: &str) -> bool {
        self.inner.slots.borrow().contains_key(property)
    }

    /// 已声明的属性名
    pub fn property_names(&self) -> Vec<String> {
        self.inner.slots.borrow().keys().cloned().collect()
    }

    /// 获取属性句柄
    pub fn property(&self, property: &str) -> PropertyRef {
        PropertyRef::new(ObjectProperty {
            object: self.clone(),
            name: property.to_string(),
        })
    }

    /// 读取属性，不存在时返回 `Value::Undefined`
    pub fn get(&self, property: &str) -> Value {
        self.inner
            .slots
            .borrow()
            .get(property)
            .map(|slot| slot.value.clone())
            .unwrap_or_default()
    }

    /// 读取数值属性
    pub fn number(&self, property: &str) -> f64 {
        self.get(property).as_number().unwrap_or(0.0)
    }

    /// 普通写入（会移除绑定）
    pub fn set(&self, property: &str, value: impl Into<Value>) -> bool {
        self.write_with_flags(property, value.into(), WriteFlags::NONE)
    }

    /// 按标志写入
    pub fn write_with_flags(&self, property: &str, value: Value, flags: WriteFlags) -> bool {
        let interceptor = {
            let slots = self.inner.slots.borrow();
            let Some(slot) = slots.get(property) else {
                debug!(object = %self.name(), property, "写入未声明的属性，已忽略");
                return false;
            };
            if flags.bypass_interceptor {
                None
            } else {
                slot.interceptor.clone()
            }
        };
        let value = match interceptor {
            Some(intercept) => intercept(&value),
            None => value,
        };

        let changed = {
            let mut slots = self.inner.slots.borrow_mut();
            let Some(slot) = slots.get_mut(property) else {
                return false;
            };
            if !flags.dont_remove_binding {
                slot.binding = None;
            }
            let changed = slot.value != value;
            slot.value = value.clone();
            changed
        };

        if changed {
            self.notify(property, &value);
        }
        true
    }

    /// 监听属性变化
    pub fn on_changed(&self, property: impl Into<String>, observer: impl Fn(&str, &Value) + 'static) {
        self.inner
            .observers
            .borrow_mut()
            .push((property.into(), Rc::new(observer)));
    }

    /// 设置写入拦截器
    pub fn set_interceptor(&self, property: &str, interceptor: impl Fn(&Value) -> Value + 'static) {
        if let Some(slot) = self.inner.slots.borrow_mut().get_mut(property) {
            slot.interceptor = Some(Rc::new(interceptor));
        }
    }

    /// 当前绑定
    pub fn binding(&self, property: &str) -> Option<Binding> {
        self.inner
            .slots
            .borrow()
            .get(property)
            .and_then(|slot| slot.binding.clone())
    }

    /// 设置或清除绑定
    pub fn set_binding(
        &self,
        property: &str,
        binding: Option<Binding>,
        flags: WriteFlags,
    ) -> Option<Binding> {
        let old = {
            let mut slots = self.inner.slots.borrow_mut();
            let slot = slots.get_mut(property)?;
            std::mem::replace(&mut slot.binding, binding.clone())
        };
        if let Some(binding) = binding {
            let value = binding.evaluate();
            self.write_with_flags(
                property,
                value,
                WriteFlags {
                    dont_remove_binding: true,
                    ..flags
                },
            );
        }
        old
    }

    /// 重新求值所有绑定
    ///
    /// 没有依赖追踪，宿主在绑定源变化后调用。
    pub fn refresh_bindings(&self) {
        let bound: Vec<(String, Binding)> = self
            .inner
            .slots
            .borrow()
            .iter()
            .filter_map(|(name, slot)| slot.binding.clone().map(|b| (name.clone(), b)))
            .collect();
        for (name, binding) in bound {
            let value = binding.evaluate();
            self.write_with_flags(&name, value, WriteFlags::ANIMATION);
        }
    }

    // ========== 信号处理器 ==========

    /// 当前信号处理器
    pub fn signal_handler(&self, signal: &str) -> Option<SignalHandler> {
        self.inner.handlers.borrow().get(signal).cloned()
    }

    /// 替换信号处理器，返回旧处理器
    pub fn set_signal_handler(
        &self,
        signal: &str,
        handler: Option<SignalHandler>,
    ) -> Option<SignalHandler> {
        let mut handlers = self.inner.handlers.borrow_mut();
        match handler {
            Some(h) => handlers.insert(signal.to_string(), h),
            None => handlers.remove(signal),
        }
    }

    /// 触发信号
    pub fn emit(&self, signal: &str) {
        let handler = self.signal_handler(signal);
        if let Some(handler) = handler {
            handler();
        }
    }

    fn notify(&self, property: &str, value: &Value) {
        let observers: Vec<ChangeObserver> = self
            .inner
            .observers
            .borrow()
            .iter()
            .filter(|(name, _)| name == property)
            .map(|(_, observer)| observer.clone())
            .collect();
        for observer in observers {
            observer(property, value);
        }
    }
}

impl std::fmt::Debug for PropertyObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PropertyObject({}, {})", self.inner.name, self.inner.id)
    }
}

/// [`PropertyObject`] 上某个属性的句柄
struct ObjectProperty {
    object: PropertyObject,
    name: String,
}

impl PropertyHandle for ObjectProperty {
    fn object_id(&self) -> ObjectId {
        self.object.id()
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn read(&self) -> Value {
        self.object.get(&self.name)
    }

    fn write(&self, value: Value, flags: WriteFlags) -> bool {
        self.object.write_with_flags(&self.name, value, flags)
    }

    fn binding(&self) -> Option<Binding> {
        self.object.binding(&self.name)
    }

    fn set_binding(&self, binding: Option<Binding>, flags: WriteFlags) -> Option<Binding> {
        self.object.set_binding(&self.name, binding, flags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn test_plain_write_removes_binding() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let prop = obj.property("x");
        prop.set_binding(Some(Binding::new(|| Value::Number(5.0))), WriteFlags::NONE);
        assert_eq!(prop.read(), Value::Number(5.0));
        assert!(prop.has_binding());

        prop.write(Value::Number(7.0), WriteFlags::ANIMATION);
        assert!(prop.has_binding());

        prop.write(Value::Number(8.0), WriteFlags::NONE);
        assert!(!prop.has_binding());
        assert_eq!(obj.get("x"), Value::Number(8.0));
    }

    #[test]
    fn test_interceptor_is_bypassed_by_animation_writes() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        obj.set_interceptor("x", |v| Value::Number(v.as_number().unwrap_or(0.0).round()));

        obj.set("x", 1.4);
        assert_eq!(obj.get("x"), Value::Number(1.0));

        obj.write_with_flags("x", Value::Number(1.4), WriteFlags::ANIMATION);
        assert_eq!(obj.get("x"), Value::Number(1.4));
    }

    #[test]
    fn test_change_notification() {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0);
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        obj.on_changed("x", move |_, _| counter.set(counter.get() + 1));

        obj.set("x", 1.0);
        obj.set("x", 1.0);
        obj.set("y", 1.0);
        assert_eq!(hits.get(), 1);
    }

    #[test]
    fn test_property_ref_equality() {
        let a = PropertyObject::new("a");
        let b = PropertyObject::new("b");
        assert_eq!(a.property("x"), a.property("x"));
        assert_ne!(a.property("x"), a.property("y"));
        assert_ne!(a.property("x"), b.property("x"));
    }

    #[test]
    fn test_signal_handler_replacement() {
        let obj = PropertyObject::new("button");
        let hits = Rc::new(Cell::new(0));
        let counter = hits.clone();
        let handler: SignalHandler = Rc::new(move || counter.set(counter.get() + 1));
        assert!(obj.set_signal_handler("clicked", Some(handler)).is_none());
        obj.emit("clicked");
        assert_eq!(hits.get(), 1);

        let old = obj.set_signal_handler("clicked", None);
        assert!(old.is_some());
        obj.emit("clicked");
        assert_eq!(hits.get(), 1);
    }
}
