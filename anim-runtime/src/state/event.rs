//! 状态事件
//!
//! 不能表达为单个属性值的状态变化。事件按能力分类：
//!
//! | 事件 | 可回退 | 需要复制原值 | 改变绑定 |
//! |---|---|---|---|
//! | [`StateChangeScript`] | 否 | 否 | 否 |
//! | [`ReplaceSignalHandler`] | 是 | 是 | 否 |
//! | [`ParentChange`] | 是 | 否 | 否 |
//! | [`AnchorChanges`] | 是 | 是 | 是 |
//!
//! 事件在动作、回滚列表与过渡之间共享，因此以 [`EventRef`] 持有。

use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::rc::Rc;

use tracing::{debug, warn};

use super::action::{ChangeValue, StateAction};
use crate::item::{
    AnchorLine, AnchorRef, Anchors, Item, TransformOrigin, decompose_similarity, origin_offset,
};
use crate::property::{ObjectId, PropertyObject, SignalHandler};

/// 共享事件
pub type EventRef = Rc<RefCell<ActionEvent>>;

/// 状态脚本
pub type Script = Rc<dyn Fn()>;

/// 事件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Script,
    SignalHandler,
    ParentChange,
    AnchorChanges,
}

/// 状态事件
pub enum ActionEvent {
    Script(StateChangeScript),
    SignalHandler(ReplaceSignalHandler),
    ParentChange(ParentChange),
    AnchorChanges(AnchorChanges),
}

impl std::fmt::Debug for ActionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActionEvent::Script(s) => write!(f, "StateChangeScript({})", s.name),
            ActionEvent::SignalHandler(h) => {
                write!(f, "ReplaceSignalHandler({}.{})", h.object.name(), h.signal)
            }
            ActionEvent::ParentChange(p) => {
                write!(f, "ParentChange({} -> {})", p.target.name(), p.parent.name())
            }
            ActionEvent::AnchorChanges(a) => write!(f, "AnchorChanges({})", a.target.name()),
        }
    }
}

impl ActionEvent {
    /// 包装为共享事件
    pub fn into_ref(self) -> EventRef {
        Rc::new(RefCell::new(self))
    }

    pub fn kind(&self) -> EventKind {
        match self {
            ActionEvent::Script(_) => EventKind::Script,
            ActionEvent::SignalHandler(_) => EventKind::SignalHandler,
            ActionEvent::ParentChange(_) => EventKind::ParentChange,
            ActionEvent::AnchorChanges(_) => EventKind::AnchorChanges,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            ActionEvent::Script(_) => "StateChangeScript",
            ActionEvent::SignalHandler(_) => "ReplaceSignalHandler",
            ActionEvent::ParentChange(_) => "ParentChange",
            ActionEvent::AnchorChanges(_) => "AnchorChanges",
        }
    }

    /// 被修改的对象
    pub fn target_id(&self) -> ObjectId {
        match self {
            ActionEvent::Script(s) => s.owner,
            ActionEvent::SignalHandler(h) => h.object.id(),
            ActionEvent::ParentChange(p) => p.target.id(),
            ActionEvent::AnchorChanges(a) => a.target.id(),
        }
    }

    pub fn execute(&mut self) {
        match self {
            ActionEvent::Script(s) => s.execute(),
            ActionEvent::SignalHandler(h) => h.execute(),
            ActionEvent::ParentChange(p) => p.execute(),
            ActionEvent::AnchorChanges(a) => a.execute(),
        }
    }

    pub fn is_reversable(&self) -> bool {
        !matches!(self, ActionEvent::Script(_))
    }

    pub fn reverse(&mut self) {
        match self {
            ActionEvent::Script(_) => {}
            ActionEvent::SignalHandler(h) => h.reverse(),
            ActionEvent::ParentChange(p) => p.reverse(),
            ActionEvent::AnchorChanges(a) => a.reverse(),
        }
    }

    /// 记录进入状态前的原值，供离开状态时回退
    pub fn save_originals(&mut self) {
        match self {
            ActionEvent::Script(_) => {}
            ActionEvent::SignalHandler(h) => h.save_originals(),
            ActionEvent::ParentChange(p) => p.save_originals(),
            ActionEvent::AnchorChanges(a) => a.save_originals(),
        }
    }

    /// 被同类事件接替时是否需要继承对方的原值
    pub fn needs_copy(&self) -> bool {
        matches!(
            self,
            ActionEvent::SignalHandler(_) | ActionEvent::AnchorChanges(_)
        )
    }

    /// 继承 `other` 记录的原值（种类不同时忽略）
    pub fn copy_originals(&mut self, other: &ActionEvent) {
        match (self, other) {
            (ActionEvent::SignalHandler(h), ActionEvent::SignalHandler(o)) => h.copy_originals(o),
            (ActionEvent::AnchorChanges(a), ActionEvent::AnchorChanges(o)) => a.copy_originals(o),
            _ => {}
        }
    }

    pub fn is_rewindable(&self) -> bool {
        self.is_reversable()
    }

    /// 回到最近一次 `save_current_values` 记录的值
    pub fn rewind(&mut self) {
        match self {
            ActionEvent::Script(_) => {}
            ActionEvent::SignalHandler(h) => h.rewind(),
            ActionEvent::ParentChange(p) => p.rewind(),
            ActionEvent::AnchorChanges(a) => a.rewind(),
        }
    }

    pub fn save_current_values(&mut self) {
        match self {
            ActionEvent::Script(_) => {}
            ActionEvent::SignalHandler(h) => h.save_current_values(),
            ActionEvent::ParentChange(p) => p.save_current_values(),
            ActionEvent::AnchorChanges(a) => a.save_current_values(),
        }
    }

    /// 假应用之后记录终点值
    pub fn save_target_values(&mut self) {
        if let ActionEvent::AnchorChanges(a) = self {
            a.save_target_values();
        }
    }

    /// 是否通过绑定改变属性（需要先假应用才能得知终点）
    pub fn changes_bindings(&self) -> bool {
        matches!(self, ActionEvent::AnchorChanges(_))
    }

    pub fn clear_bindings(&mut self) {
        if let ActionEvent::AnchorChanges(a) = self {
            a.clear_bindings();
        }
    }

    /// 是否取代回滚列表中的 `other`
    pub fn may_override(&self, other: &ActionEvent) -> bool {
        match (self, other) {
            (ActionEvent::SignalHandler(h), ActionEvent::SignalHandler(o)) => {
                h.object.id() == o.object.id() && h.signal == o.signal
            }
            (ActionEvent::ParentChange(p), ActionEvent::ParentChange(o)) => p.target == o.target,
            (ActionEvent::AnchorChanges(a), ActionEvent::AnchorChanges(o)) => a.target == o.target,
            _ => false,
        }
    }
}

// ========== 状态脚本 ==========

/// 进入状态时执行的脚本
pub struct StateChangeScript {
    pub(crate) name: String,
    pub(crate) script: Script,
    /// 所属对象（用于匹配与诊断）
    pub(crate) owner: ObjectId,
}

impl StateChangeScript {
    pub fn new(name: impl Into<String>, script: impl Fn() + 'static) -> Self {
        Self {
            name: name.into(),
            script: Rc::new(script),
            owner: ObjectId::next(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn script(&self) -> Script {
        self.script.clone()
    }

    fn execute(&self) {
        debug!(script = %self.name, "执行状态脚本");
        (self.script)();
    }
}

// ========== 信号处理器替换 ==========

/// 在状态内替换某个信号的处理器
pub struct ReplaceSignalHandler {
    pub(crate) object: PropertyObject,
    pub(crate) signal: String,
    handler: Option<SignalHandler>,
    reverse_handler: Option<SignalHandler>,
    rewind_handler: Option<SignalHandler>,
}

impl ReplaceSignalHandler {
    pub fn new(object: &PropertyObject, signal: impl Into<String>, handler: SignalHandler) -> Self {
        Self {
            object: object.clone(),
            signal: signal.into(),
            handler: Some(handler),
            reverse_handler: None,
            rewind_handler: None,
        }
    }

    fn execute(&self) {
        self.object
            .set_signal_handler(&self.signal, self.handler.clone());
    }

    fn reverse(&self) {
        self.object
            .set_signal_handler(&self.signal, self.reverse_handler.clone());
    }

    fn save_originals(&mut self) {
        self.save_current_values();
        self.reverse_handler = self.rewind_handler.clone();
    }

    fn copy_originals(&mut self, other: &ReplaceSignalHandler) {
        self.reverse_handler = other.reverse_handler.clone();
    }

    fn rewind(&self) {
        self.object
            .set_signal_handler(&self.signal, self.rewind_handler.clone());
    }

    fn save_current_values(&mut self) {
        self.rewind_handler = self.object.signal_handler(&self.signal);
    }
}

// ========== 换父节点 ==========

/// 换父节点时可以同时指定的属性
pub const PARENT_CHANGE_PROPERTIES: [&str; 6] = ["x", "y", "width", "height", "scale", "rotation"];

/// 把节点挂到新的父节点下，并尽量保持场景中的外观
pub struct ParentChange {
    pub(crate) target: Item,
    pub(crate) parent: Item,
    values: BTreeMap<String, ChangeValue>,
    orig_parent: Option<Item>,
    orig_stack_before: Option<Item>,
    rewind_parent: Option<Item>,
    rewind_stack_before: Option<Item>,
}

impl ParentChange {
    pub fn new(target: &Item, parent: &Item) -> Self {
        Self {
            target: target.clone(),
            parent: parent.clone(),
            values: BTreeMap::new(),
            orig_parent: None,
            orig_stack_before: None,
            rewind_parent: None,
            rewind_stack_before: None,
        }
    }

    /// 同时修改几何属性（只接受 [`PARENT_CHANGE_PROPERTIES`]）
    pub fn with_value(mut self, property: &str, value: impl Into<ChangeValue>) -> Self {
        if PARENT_CHANGE_PROPERTIES.contains(&property) {
            self.values.insert(property.to_string(), value.into());
        } else {
            warn!(property, "换父节点不支持修改该属性，已忽略");
        }
        self
    }

    pub fn target(&self) -> &Item {
        &self.target
    }

    pub fn parent(&self) -> &Item {
        &self.parent
    }

    /// 进入状态前的父节点
    pub fn original_parent(&self) -> Option<&Item> {
        self.orig_parent.as_ref()
    }

    /// 是否同时修改了该几何属性
    pub fn has_value(&self, property: &str) -> bool {
        self.values.contains_key(property)
    }

    /// 事件本身之外附带的属性动作
    pub(crate) fn value_actions(&self) -> Vec<StateAction> {
        self.values
            .iter()
            .map(|(name, value)| StateAction::from_change(self.target.property(name), value))
            .collect()
    }

    fn execute(&self) {
        self.do_change(Some(&self.parent), None);
    }

    fn reverse(&self) {
        self.do_change(self.orig_parent.as_ref(), self.orig_stack_before.as_ref());
    }

    fn save_originals(&mut self) {
        self.save_current_values();
        self.orig_parent = self.rewind_parent.clone();
        self.orig_stack_before = self.rewind_stack_before.clone();
    }

    fn rewind(&self) {
        self.do_change(self.rewind_parent.as_ref(), self.rewind_stack_before.as_ref());
    }

    fn save_current_values(&mut self) {
        self.rewind_parent = self.target.parent();
        self.rewind_stack_before = self.target.next_sibling();
    }

    /// 换父节点并补偿几何
    ///
    /// 旧父节点到新父节点的变换必须是等比缩放加旋转；否则只换父节点，
    /// 不调整几何。
    fn do_change(&self, target_parent: Option<&Item>, stack_before: Option<&Item>) {
        let target = &self.target;
        match (target_parent, target.parent()) {
            (Some(new_parent), Some(old_parent)) => {
                let transform = old_parent.item_transform(new_parent);
                let decomposed = match transform {
                    Some(t) => decompose_similarity(&t),
                    None => {
                        warn!(target = %target.name(), "复杂变换下无法保持外观");
                        None
                    }
                };
                let (mut x, mut y) = transform
                    .map(|t| t.map(target.x(), target.y()))
                    .unwrap_or((target.x(), target.y()));
                target.set_parent(Some(new_parent));

                if let Some((scale, rotation)) = decomposed {
                    if target.transform_origin() != TransformOrigin::TopLeft {
                        // 原点不在左上角时，缩放与旋转会带动左上角
                        let offset =
                            origin_offset(target.transform_origin_point(), scale, rotation);
                        x += offset.0;
                        y += offset.1;
                    }
                    target.set_x(x);
                    target.set_y(y);
                    target.set_rotation(target.rotation() + rotation);
                    target.set_scale(target.scale() * scale);
                }
            }
            _ => {
                target.set_parent(target_parent);
            }
        }

        if let Some(sibling) = stack_before {
            target.stack_before(sibling);
        }
    }
}

// ========== 锚点变化 ==========

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct Geometry {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

impl Geometry {
    fn of(item: &Item) -> Self {
        Self {
            x: item.x(),
            y: item.y(),
            width: item.width(),
            height: item.height(),
        }
    }
}

/// 在状态内设置或清除锚点
pub struct AnchorChanges {
    pub(crate) target: Item,
    set: Anchors,
    reset: BTreeSet<AnchorLine>,
    orig: Anchors,
    orig_geometry: Option<Geometry>,
    /// 接替前一个锚点变化时需要先恢复原锚点的锚线
    apply_orig: BTreeSet<AnchorLine>,
    rewind_geometry: Geometry,
    from_geometry: Geometry,
    to_geometry: Geometry,
}

impl AnchorChanges {
    pub fn new(target: &Item) -> Self {
        Self {
            target: target.clone(),
            set: Anchors::new(),
            reset: BTreeSet::new(),
            orig: Anchors::new(),
            orig_geometry: None,
            apply_orig: BTreeSet::new(),
            rewind_geometry: Geometry::default(),
            from_geometry: Geometry::default(),
            to_geometry: Geometry::default(),
        }
    }

    /// 设置锚点
    pub fn anchor(mut self, line: AnchorLine, target: AnchorRef) -> Self {
        self.reset.remove(&line);
        self.set.insert(line, target);
        self
    }

    /// 清除锚点
    pub fn reset(mut self, line: AnchorLine) -> Self {
        self.set.remove(&line);
        self.reset.insert(line);
        self
    }

    pub fn target(&self) -> &Item {
        &self.target
    }

    /// 涉及的全部锚线
    fn combined(&self) -> BTreeSet<AnchorLine> {
        self.set.keys().copied().chain(self.reset.iter().copied()).collect()
    }

    /// 锚点动画需要驱动的几何动作
    pub(crate) fn additional_actions(&self) -> Vec<StateAction> {
        let combined = self.combined();
        let h_change = combined.iter().any(|l| l.is_horizontal());
        let v_change = combined.iter().any(|l| !l.is_horizontal());
        let (from, to) = (self.from_geometry, self.to_geometry);

        let mut extra = Vec::new();
        let mut push = |changed: bool, name: &str, value: f64| {
            if changed {
                extra.push(StateAction::new(self.target.property(name), value));
            }
        };
        push(h_change && from.x != to.x, "x", to.x);
        push(v_change && from.y != to.y, "y", to.y);
        push(h_change && from.width != to.width, "width", to.width);
        push(v_change && from.height != to.height, "height", to.height);
        extra
    }

    fn execute(&self) {
        let target = &self.target;
        for line in &self.apply_orig {
            target.set_anchor(*line, self.orig.get(line).cloned());
        }
        for line in &self.reset {
            target.set_anchor(*line, None);
        }
        for (line, anchor) in &self.set {
            target.set_anchor(*line, Some(anchor.clone()));
        }
        target.apply_anchors();
    }

    fn reverse(&self) {
        let target = &self.target;
        for line in self.set.keys() {
            target.set_anchor(*line, None);
        }
        for (line, anchor) in &self.orig {
            target.set_anchor(*line, Some(anchor.clone()));
        }

        // 恢复被本状态锚点改写的绝对几何
        let state_h = self.set.keys().filter(|l| l.is_horizontal()).count();
        let state_v = self.set.keys().filter(|l| !l.is_horizontal()).count();
        let orig_h = target.used_anchors(true).len();
        let orig_v = target.used_anchors(false).len();
        if let Some(orig) = self.orig_geometry {
            if state_h > 1 && orig_h <= 1 {
                target.set_width(orig.width);
            }
            if state_v > 1 && orig_v <= 1 {
                target.set_height(orig.height);
            }
            if state_h > 0 && orig_h == 0 {
                target.set_x(orig.x);
            }
            if state_v > 0 && orig_v == 0 {
                target.set_y(orig.y);
            }
        }
        target.apply_anchors();
    }

    fn save_originals(&mut self) {
        self.orig = self.target.anchors();
        self.orig_geometry = Some(Geometry::of(&self.target));
        self.apply_orig.clear();
        self.save_current_values();
    }

    fn copy_originals(&mut self, other: &AnchorChanges) {
        self.apply_orig = other.combined();
        self.orig = other.orig.clone();
        self.orig_geometry = other.orig_geometry;
        self.save_current_values();
    }

    /// 只恢复几何，不恢复锚点
    fn rewind(&self) {
        let g = self.rewind_geometry;
        self.target.set_x(g.x);
        self.target.set_y(g.y);
        self.target.set_width(g.width);
        self.target.set_height(g.height);
    }

    fn save_current_values(&mut self) {
        self.rewind_geometry = Geometry::of(&self.target);
    }

    fn save_target_values(&mut self) {
        self.to_geometry = Geometry::of(&self.target);
    }

    fn clear_bindings(&mut self) {
        self.from_geometry = Geometry::of(&self.target);
        for line in self.apply_orig.iter().chain(self.combined().iter()) {
            self.target.set_anchor(*line, None);
        }
    }
}
