//! # 过渡模块
//!
//! `Transition` 把一对状态名（可用逗号分隔或 `*` 通配）绑定到一组
//! 动画模板。状态切换时模板根据动作列表生成真正的任务树：
//! 属性模板认领匹配的属性动作，记入 `modified` 防止重复认领。

use std::rc::Rc;

use tracing::{debug, warn};

use super::action::StateAction;
use super::event::{ActionEvent, EventRef, PARENT_CHANGE_PROPERTIES, ParentChange, Script};
use crate::animator::Animator;
use crate::easing::EasingFunction;
use crate::item::{Item, TransformOrigin, decompose_similarity, origin_offset};
use crate::job::{
    AnimatedProperty, Direction, JobId, PropertyAnimationJob, PropertyUpdater, RotationDirection,
    SmoothedJob,
};
use crate::property::{ObjectId, PropertyObject, PropertyRef, WriteFlags};
use crate::value::Value;

/// 默认动画时长（毫秒）
pub const DEFAULT_DURATION: i32 = 250;

// ========== 属性选择 ==========

/// 模板作用的属性与对象
#[derive(Clone, Default)]
pub struct PropertySelector {
    properties: Vec<String>,
    targets: Vec<PropertyObject>,
    exclude: Vec<ObjectId>,
}

impl PropertySelector {
    /// `properties` 为逗号分隔的属性名
    pub fn new(properties: &str) -> Self {
        Self::default().with_properties(properties)
    }

    pub fn with_properties(mut self, properties: &str) -> Self {
        self.properties.extend(
            properties
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
        );
        self
    }

    pub fn with_target(mut self, target: &PropertyObject) -> Self {
        self.targets.push(target.clone());
        self
    }

    pub fn with_exclude(mut self, target: &PropertyObject) -> Self {
        self.exclude.push(target.id());
        self
    }

    pub fn properties(&self) -> &[String] {
        &self.properties
    }

    fn has_target(&self, id: ObjectId) -> bool {
        self.targets.iter().any(|t| t.id() == id)
    }

    /// 动作是否落在选择范围内
    ///
    /// 既按实际属性匹配，也按声明时指定的对象与属性名匹配。
    fn matches(&self, action: &StateAction) -> bool {
        let Some(property) = &action.property else {
            return false;
        };
        let object = property.object_id();
        let same = action.specified_object == Some(object);
        let specified = action.specified_object.filter(|_| !same);

        let target_ok = self.targets.is_empty()
            || self.has_target(object)
            || specified.is_some_and(|id| self.has_target(id));
        let not_excluded = !self.exclude.contains(&object)
            && specified.is_none_or(|id| !self.exclude.contains(&id));
        let name_ok = self.properties.iter().any(|p| p == property.name())
            || (!same && self.properties.contains(&action.specified_property));
        target_ok && not_excluded && name_ok
    }

    /// 显式目标：属性名 × 目标对象
    fn explicit_properties(&self) -> Vec<PropertyRef> {
        let mut list = Vec::new();
        for target in &self.targets {
            for name in &self.properties {
                if target.has_property(name) {
                    list.push(target.property(name));
                } else {
                    debug!(object = %target.name(), property = %name, "过渡目标没有该属性");
                }
            }
        }
        list
    }
}

// ========== 模板 ==========

/// 属性动画模板
#[derive(Clone)]
pub struct PropertyTemplate {
    pub selector: PropertySelector,
    pub from: Option<Value>,
    pub to: Option<Value>,
    pub duration: i32,
    pub easing: Option<EasingFunction>,
    pub loops: i32,
}

impl PropertyTemplate {
    pub fn new(selector: PropertySelector) -> Self {
        Self {
            selector,
            from: None,
            to: None,
            duration: DEFAULT_DURATION,
            easing: None,
            loops: 1,
        }
    }

    pub fn with_from(mut self, from: impl Into<Value>) -> Self {
        self.from = Some(from.into());
        self
    }

    pub fn with_to(mut self, to: impl Into<Value>) -> Self {
        self.to = Some(to.into());
        self
    }

    pub fn with_duration(mut self, duration: i32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = Some(easing);
        self
    }

    pub fn with_loops(mut self, loops: i32) -> Self {
        self.loops = loops;
        self
    }
}

/// 角度动画模板：按指定方向插值，默认作用于 `rotation` 与 `angle`
#[derive(Clone)]
pub struct RotationTemplate {
    pub animation: PropertyTemplate,
    pub direction: RotationDirection,
}

impl RotationTemplate {
    pub fn new() -> Self {
        Self::with_selector(PropertySelector::new("rotation,angle"))
    }

    pub fn with_selector(selector: PropertySelector) -> Self {
        Self {
            animation: PropertyTemplate::new(selector),
            direction: RotationDirection::Numerical,
        }
    }

    pub fn with_direction(mut self, direction: RotationDirection) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_from(mut self, from: f64) -> Self {
        self.animation.from = Some(Value::Number(from));
        self
    }

    pub fn with_to(mut self, to: f64) -> Self {
        self.animation.to = Some(Value::Number(to));
        self
    }

    pub fn with_duration(mut self, duration: i32) -> Self {
        self.animation.duration = duration;
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.animation.easing = Some(easing);
        self
    }
}

impl Default for RotationTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// 平滑跟随模板
#[derive(Clone)]
pub struct SmoothedTemplate {
    pub selector: PropertySelector,
    /// 单位/秒
    pub velocity: f64,
}

impl SmoothedTemplate {
    pub fn new(selector: PropertySelector, velocity: f64) -> Self {
        Self { selector, velocity }
    }
}

/// 锚点动画模板：驱动 `AnchorChanges` 引起的几何变化
#[derive(Clone)]
pub struct AnchorTemplate {
    pub targets: Vec<Item>,
    pub duration: i32,
    pub easing: Option<EasingFunction>,
}

impl AnchorTemplate {
    pub fn new() -> Self {
        Self {
            targets: Vec::new(),
            duration: DEFAULT_DURATION,
            easing: None,
        }
    }

    pub fn with_target(mut self, target: &Item) -> Self {
        self.targets.push(target.clone());
        self
    }

    pub fn with_duration(mut self, duration: i32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = Some(easing);
        self
    }
}

impl Default for AnchorTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// 换父节点动画模板
///
/// 生成的顺序任务：先挂到 `via`（若有），再播放子动画，最后挂到目标父节点。
/// 同时给出 `target` 与 `new_parent` 时直接使用它们，否则认领状态中的
/// `ParentChange`（`target` 可用于筛选，`new_parent` 可替换目标父节点）。
/// 经过 `via` 时，`ParentChange` 附带的 x/y/scale/rotation 终点会换算到
/// `via` 的坐标系，子动画在 `via` 下播放。
#[derive(Clone)]
pub struct ParentTemplate {
    pub target: Option<Item>,
    pub new_parent: Option<Item>,
    pub via: Option<Item>,
    /// 没有子动画时，默认的几何动画使用的时长与缓动
    pub duration: i32,
    pub easing: Option<EasingFunction>,
    pub animations: Vec<AnimationTemplate>,
}

impl ParentTemplate {
    pub fn new() -> Self {
        Self {
            target: None,
            new_parent: None,
            via: None,
            duration: DEFAULT_DURATION,
            easing: None,
            animations: Vec::new(),
        }
    }

    pub fn with_target(mut self, target: &Item) -> Self {
        self.target = Some(target.clone());
        self
    }

    pub fn with_new_parent(mut self, parent: &Item) -> Self {
        self.new_parent = Some(parent.clone());
        self
    }

    pub fn with_via(mut self, via: &Item) -> Self {
        self.via = Some(via.clone());
        self
    }

    pub fn with_duration(mut self, duration: i32) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.easing = Some(easing);
        self
    }

    pub fn with_animation(mut self, animation: impl Into<AnimationTemplate>) -> Self {
        self.animations.push(animation.into());
        self
    }

    /// 没有声明子动画时：对被换父节点的几何属性做一次属性动画
    fn default_animation(&self, items: &[Item]) -> AnimationTemplate {
        let selector = items.iter().fold(
            PropertySelector::new("x,y,scale,rotation"),
            |selector, item| selector.with_target(item.object()),
        );
        let mut template = PropertyTemplate::new(selector).with_duration(self.duration);
        template.easing = self.easing;
        template.into()
    }
}

impl Default for ParentTemplate {
    fn default() -> Self {
        Self::new()
    }
}

/// 在动画中途立即设置属性
#[derive(Clone)]
pub struct PropertyActionTemplate {
    pub selector: PropertySelector,
    pub value: Option<Value>,
}

impl PropertyActionTemplate {
    pub fn new(selector: PropertySelector) -> Self {
        Self {
            selector,
            value: None,
        }
    }

    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.value = Some(value.into());
        self
    }
}

/// 在动画中途运行脚本
#[derive(Clone, Default)]
pub struct ScriptActionTemplate {
    pub script: Option<Script>,
    /// 接管同名 `StateChangeScript`
    pub state_script: Option<String>,
}

impl ScriptActionTemplate {
    pub fn new(script: impl Fn() + 'static) -> Self {
        Self {
            script: Some(Rc::new(script)),
            state_script: None,
        }
    }

    pub fn state_script(name: impl Into<String>) -> Self {
        Self {
            script: None,
            state_script: Some(name.into()),
        }
    }
}

/// 动画模板
#[derive(Clone)]
pub enum AnimationTemplate {
    Property(PropertyTemplate),
    Rotation(RotationTemplate),
    Smoothed(SmoothedTemplate),
    Anchor(AnchorTemplate),
    Parent(ParentTemplate),
    /// 暂停（毫秒）
    Pause(i32),
    PropertyAction(PropertyActionTemplate),
    ScriptAction(ScriptActionTemplate),
    Sequential(Vec<AnimationTemplate>),
    Parallel(Vec<AnimationTemplate>),
}

macro_rules! impl_from_template {
    ($($ty:ident => $variant:ident),* $(,)?) => {
        $(impl From<$ty> for AnimationTemplate {
            fn from(template: $ty) -> Self {
                AnimationTemplate::$variant(template)
            }
        })*
    };
}

impl_from_template! {
    PropertyTemplate => Property,
    RotationTemplate => Rotation,
    SmoothedTemplate => Smoothed,
    AnchorTemplate => Anchor,
    ParentTemplate => Parent,
    PropertyActionTemplate => PropertyAction,
    ScriptActionTemplate => ScriptAction,
}

/// 生成任务时共享的上下文
struct BuildContext<'a> {
    animator: &'a mut Animator,
    actions: &'a mut [StateAction],
    modified: &'a mut Vec<PropertyRef>,
    direction: Direction,
    default_easing: EasingFunction,
}

impl AnimationTemplate {
    fn build(&self, ctx: &mut BuildContext<'_>) -> JobId {
        match self {
            AnimationTemplate::Property(t) => {
                build_property(t, RotationDirection::Numerical, ctx)
            }
            AnimationTemplate::Rotation(t) => build_property(&t.animation, t.direction, ctx),
            AnimationTemplate::Smoothed(t) => build_smoothed(t, ctx),
            AnimationTemplate::Anchor(t) => build_anchor(t, ctx),
            AnimationTemplate::Parent(t) => build_parent(t, ctx),
            AnimationTemplate::Pause(duration) => ctx.animator.create_pause(*duration),
            AnimationTemplate::PropertyAction(t) => build_property_action(t, ctx),
            AnimationTemplate::ScriptAction(t) => build_script_action(t, ctx),
            AnimationTemplate::Sequential(children) => {
                let group = ctx.animator.create_sequential();
                build_children(group, children, ctx);
                group
            }
            AnimationTemplate::Parallel(children) => {
                let group = ctx.animator.create_parallel();
                build_children(group, children, ctx);
                group
            }
        }
    }
}

/// 反向时倒序生成并前插，任务顺序与声明顺序一致
fn build_children(group: JobId, children: &[AnimationTemplate], ctx: &mut BuildContext<'_>) {
    let backward = ctx.direction == Direction::Backward;
    let ordered: Box<dyn Iterator<Item = &AnimationTemplate>> = if backward {
        Box::new(children.iter().rev())
    } else {
        Box::new(children.iter())
    };
    for child in ordered {
        let job = child.build(ctx);
        let result = if backward {
            ctx.animator.prepend_child(group, job)
        } else {
            ctx.animator.append_child(group, job)
        };
        if let Err(e) = result {
            debug!(error = %e, "无法加入过渡分组");
        }
    }
}

fn build_property(
    template: &PropertyTemplate,
    rotation: RotationDirection,
    ctx: &mut BuildContext<'_>,
) -> JobId {
    let mut animated = Vec::new();

    match &template.to {
        Some(to) if to.is_defined() => {
            for property in template.selector.explicit_properties() {
                animated.push(AnimatedProperty::new(
                    property.clone(),
                    template.from.clone(),
                    to.clone(),
                ));
                if ctx.actions.iter().any(|a| a.targets(&property))
                    && !ctx.modified.contains(&property)
                {
                    ctx.modified.push(property);
                }
            }
        }
        _ => {
            for action in ctx.actions.iter_mut() {
                if !template.selector.matches(action) {
                    continue;
                }
                let Some(property) = action.property.clone() else {
                    continue;
                };
                if ctx.modified.contains(&property) {
                    continue;
                }
                let to = action.to_value.clone();
                animated.push(AnimatedProperty::new(
                    property.clone(),
                    template.from.clone(),
                    to.clone(),
                ));
                ctx.modified.push(property);
                action.from_value = to;
            }
        }
    }

    let mut updater = PropertyUpdater::new(animated);
    updater.reverse = ctx.direction == Direction::Backward;
    updater.rotation = rotation;
    let easing = template.easing.unwrap_or(ctx.default_easing);
    let job = ctx.animator.create_property_animation(PropertyAnimationJob::new(
        template.duration,
        easing,
        updater,
    ));
    ctx.animator.set_loop_count(job, template.loops);
    job
}

fn build_smoothed(template: &SmoothedTemplate, ctx: &mut BuildContext<'_>) -> JobId {
    let mut jobs = Vec::new();
    for action in ctx.actions.iter_mut() {
        if !template.selector.matches(action) {
            continue;
        }
        let (Some(property), Some(to)) = (action.property.clone(), action.to_value.as_number())
        else {
            continue;
        };
        if ctx.modified.contains(&property) {
            continue;
        }
        jobs.push(SmoothedJob::new(property.clone(), to, template.velocity));
        ctx.modified.push(property);
        action.from_value = action.to_value.clone();
    }

    match jobs.len() {
        0 => ctx.animator.create_pause(0),
        1 => match jobs.pop() {
            Some(job) => ctx.animator.create_smoothed(job),
            None => ctx.animator.create_pause(0),
        },
        _ => {
            let group = ctx.animator.create_parallel();
            for job in jobs {
                let child = ctx.animator.create_smoothed(job);
                if let Err(e) = ctx.animator.append_child(group, child) {
                    debug!(error = %e, "无法加入平滑分组");
                }
            }
            group
        }
    }
}

fn build_anchor(template: &AnchorTemplate, ctx: &mut BuildContext<'_>) -> JobId {
    let mut animated = Vec::new();
    for action in ctx.actions.iter() {
        let Some(event) = &action.event else {
            continue;
        };
        let event = event.borrow();
        let ActionEvent::AnchorChanges(changes) = &*event else {
            continue;
        };
        if !template.targets.is_empty() && !template.targets.contains(changes.target()) {
            continue;
        }
        for extra in changes.additional_actions() {
            if let Some(property) = extra.property {
                animated.push(AnimatedProperty::new(property, None, extra.to_value));
            }
        }
    }

    let mut updater = PropertyUpdater::new(animated);
    updater.reverse = ctx.direction == Direction::Backward;
    let easing = template.easing.unwrap_or(ctx.default_easing);
    ctx.animator.create_property_animation(PropertyAnimationJob::new(
        template.duration,
        easing,
        updater,
    ))
}

fn build_parent(template: &ParentTemplate, ctx: &mut BuildContext<'_>) -> JobId {
    // (事件, 是否回退)
    let mut changes: Vec<(EventRef, bool)> = Vec::new();
    let mut via_changes: Vec<EventRef> = Vec::new();
    let mut items: Vec<Item> = Vec::new();
    let reparent = |item: &Item, parent: &Item| {
        ActionEvent::ParentChange(ParentChange::new(item, parent)).into_ref()
    };

    if let (Some(target), Some(parent)) = (&template.target, &template.new_parent) {
        changes.push((reparent(target, parent), false));
        if let Some(via) = &template.via {
            via_changes.push(reparent(target, via));
        }
        items.push(target.clone());
    } else {
        for index in 0..ctx.actions.len() {
            let Some(event) = ctx.actions[index].event.clone() else {
                continue;
            };
            let reverse = ctx.actions[index].reverse_event;
            let (item, final_parent, values) = {
                let borrowed = event.borrow();
                let ActionEvent::ParentChange(change) = &*borrowed else {
                    continue;
                };
                if template.target.as_ref().is_some_and(|t| t != change.target()) {
                    continue;
                }
                let final_parent = match (&template.new_parent, reverse) {
                    (Some(parent), _) => Some(parent.clone()),
                    (None, true) => change.original_parent().cloned(),
                    (None, false) => Some(change.parent().clone()),
                };
                let values: Vec<&str> = PARENT_CHANGE_PROPERTIES
                    .into_iter()
                    .filter(|name| change.has_value(name))
                    .collect();
                (change.target().clone(), final_parent, values)
            };

            ctx.actions[index].action_done = true;
            match &template.new_parent {
                Some(parent) => changes.push((reparent(&item, parent), false)),
                None => changes.push((event, reverse)),
            }
            if let Some(via) = &template.via {
                via_changes.push(reparent(&item, via));
                if let Some(final_parent) = &final_parent {
                    rebase_geometry(ctx.actions, &item, final_parent, via, &values);
                }
            }
            items.push(item);
        }
    }

    let sequence = ctx.animator.create_sequential();
    if changes.is_empty() {
        debug!("没有需要动画的换父节点");
        return sequence;
    }

    let fallback;
    let animations = if template.animations.is_empty() {
        fallback = template.default_animation(&items);
        std::slice::from_ref(&fallback)
    } else {
        template.animations.as_slice()
    };
    let group = ctx.animator.create_parallel();
    build_children(group, animations, ctx);

    let target_job = ctx.animator.create_action(move |_| {
        for (event, reverse) in &changes {
            let mut event = event.borrow_mut();
            if *reverse {
                event.reverse();
            } else {
                event.execute();
            }
        }
    });
    let via_job = template.via.as_ref().map(|_| {
        ctx.animator.create_action(move |_| {
            for event in &via_changes {
                event.borrow_mut().execute();
            }
        })
    });

    // 反向播放时倒着执行，实际顺序仍是 via、子动画、目标父节点
    let order = match (ctx.direction, via_job) {
        (Direction::Forward, Some(via)) => vec![via, group, target_job],
        (Direction::Forward, None) => vec![target_job, group],
        (Direction::Backward, Some(via)) => vec![target_job, group, via],
        (Direction::Backward, None) => vec![group, target_job],
    };
    for job in order {
        if let Err(e) = ctx.animator.append_child(sequence, job) {
            debug!(error = %e, "无法加入换父节点序列");
        }
    }
    sequence
}

/// 把 `ParentChange` 附带的几何终点从 `final_parent` 换算到 `via` 的坐标系
///
/// 变换含切变、非等比缩放或不可逆时保持原值，只记录警告。
fn rebase_geometry(
    actions: &mut [StateAction],
    item: &Item,
    final_parent: &Item,
    via: &Item,
    values: &[&str],
) {
    let position = |name: &str| {
        if !values.contains(&name) {
            return None;
        }
        let property = item.property(name);
        actions.iter().position(|a| a.targets(&property))
    };
    let [x, y, width, height, scale, rotation] =
        ["x", "y", "width", "height", "scale", "rotation"].map(position);
    let to = |index: Option<usize>| index.and_then(|i| actions[i].to_value.as_number());

    let Some(transform) = final_parent.item_transform(via) else {
        warn!(item = %item.name(), via = %via.name(), "复杂变换下无法保持外观");
        return;
    };
    let Some((factor, angle)) = decompose_similarity(&transform) else {
        return;
    };

    let (mut new_x, mut new_y) = transform.map(to(x).unwrap_or(0.0), to(y).unwrap_or(0.0));
    if item.transform_origin() != TransformOrigin::TopLeft {
        let w = to(width).unwrap_or_else(|| item.width());
        let h = to(height).unwrap_or_else(|| item.height());
        let offset = origin_offset(item.transform_origin().point(w, h), factor, angle);
        new_x += offset.0;
        new_y += offset.1;
    }

    let rewritten = [
        (x, Some(new_x)),
        (y, Some(new_y)),
        (scale, to(scale).map(|s| s * factor)),
        (rotation, to(rotation).map(|r| r + angle)),
    ];
    for (index, value) in rewritten {
        if let (Some(index), Some(value)) = (index, value) {
            actions[index].to_value = Value::Number(value);
        }
    }
}

fn build_property_action(template: &PropertyActionTemplate, ctx: &mut BuildContext<'_>) -> JobId {
    let mut writes: Vec<(PropertyRef, Value)> = Vec::new();

    match &template.value {
        Some(value) if value.is_defined() => {
            for property in template.selector.explicit_properties() {
                writes.push((property.clone(), value.clone()));
                if ctx.actions.iter().any(|a| a.targets(&property))
                    && !ctx.modified.contains(&property)
                {
                    ctx.modified.push(property);
                }
            }
        }
        _ => {
            for action in ctx.actions.iter_mut() {
                if !template.selector.matches(action) {
                    continue;
                }
                let Some(property) = action.property.clone() else {
                    continue;
                };
                if ctx.modified.contains(&property) {
                    continue;
                }
                writes.push((property.clone(), action.to_value.clone()));
                ctx.modified.push(property);
                action.from_value = action.to_value.clone();
            }
        }
    }

    ctx.animator.create_action(move |_| {
        for (property, value) in &writes {
            property.write(value.clone(), WriteFlags::ANIMATION);
        }
    })
}

fn build_script_action(template: &ScriptActionTemplate, ctx: &mut BuildContext<'_>) -> JobId {
    let mut state_script: Option<Script> = None;
    if let Some(name) = &template.state_script {
        for action in ctx.actions.iter_mut() {
            let Some(event) = &action.event else {
                continue;
            };
            let claimed = match &*event.borrow() {
                ActionEvent::Script(script) if script.name() == name => Some(script.script()),
                _ => None,
            };
            if let Some(script) = claimed {
                state_script = Some(script);
                action.action_done = true;
                break;
            }
        }
    }

    let reversing = ctx.direction == Direction::Backward;
    let own = template.script.clone();
    ctx.animator.create_action(move |_| match (&state_script, &own) {
        // 反向播放时被接管的状态脚本不再运行
        (Some(_), _) if reversing => {}
        (Some(script), _) => script(),
        (None, Some(script)) => script(),
        (None, None) => {}
    })
}

// ========== 过渡 ==========

/// 状态之间的过渡
#[derive(Clone)]
pub struct Transition {
    from: String,
    to: String,
    reversible: bool,
    default_easing: EasingFunction,
    animations: Vec<AnimationTemplate>,
}

impl Transition {
    /// `from`/`to` 可为逗号分隔的状态名或 `*`
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            reversible: false,
            default_easing: EasingFunction::default(),
            animations: Vec::new(),
        }
    }

    /// 任意状态之间
    pub fn any() -> Self {
        Self::new("*", "*")
    }

    pub fn reversible(mut self, reversible: bool) -> Self {
        self.reversible = reversible;
        self
    }

    /// 未指定缓动的模板使用该缓动
    pub fn with_easing(mut self, easing: EasingFunction) -> Self {
        self.default_easing = easing;
        self
    }

    pub fn with_animation(mut self, animation: impl Into<AnimationTemplate>) -> Self {
        self.animations.push(animation.into());
        self
    }

    pub fn from_state(&self) -> &str {
        &self.from
    }

    pub fn to_state(&self) -> &str {
        &self.to
    }

    pub fn is_reversible(&self) -> bool {
        self.reversible
    }

    pub fn animations(&self) -> &[AnimationTemplate] {
        &self.animations
    }

    /// 生成过渡任务树（顶层并行分组）
    ///
    /// # 参数
    ///
    /// - `actions`: 动作列表；被认领的动作会改写起点或标记 `action_done`
    /// - `modified`: 收集被动画接管的属性
    /// - `reversed`: 沿可逆过渡反向播放
    ///
    /// # 返回
    ///
    /// 没有动画模板时返回 `None`
    pub(crate) fn prepare(
        &self,
        animator: &mut Animator,
        actions: &mut [StateAction],
        modified: &mut Vec<PropertyRef>,
        reversed: bool,
    ) -> Option<JobId> {
        if self.animations.is_empty() {
            return None;
        }
        let direction = if reversed {
            Direction::Backward
        } else {
            Direction::Forward
        };
        let group = animator.create_parallel();
        animator.set_label(group, format!("{} -> {}", self.from, self.to));

        let mut ctx = BuildContext {
            animator: &mut *animator,
            actions,
            modified,
            direction,
            default_easing: self.default_easing,
        };
        build_children(group, &self.animations, &mut ctx);
        animator.set_direction(group, direction);
        Some(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::config::ClockConfig;
    use crate::job::{JobKindTag, JobState};

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    fn rect() -> PropertyObject {
        let obj = PropertyObject::new("rect");
        obj.declare("x", 0.0).declare("y", 0.0).declare("opacity", 1.0);
        obj
    }

    #[test]
    fn test_selector_matches_by_name_and_target() {
        let obj = rect();
        let other = rect();
        let action = StateAction::new(obj.property("x"), 10.0);

        assert!(PropertySelector::new("x, y").matches(&action));
        assert!(!PropertySelector::new("y").matches(&action));
        assert!(PropertySelector::new("x").with_target(&obj).matches(&action));
        assert!(!PropertySelector::new("x").with_target(&other).matches(&action));
        assert!(!PropertySelector::new("x").with_exclude(&obj).matches(&action));
        assert!(!PropertySelector::default().matches(&action));
    }

    #[test]
    fn test_property_template_claims_once() {
        let mut animator = animator();
        let obj = rect();
        let mut actions = vec![
            StateAction::new(obj.property("x"), 100.0),
            StateAction::new(obj.property("y"), 50.0),
        ];
        let mut modified = Vec::new();
        let transition = Transition::any()
            .with_animation(PropertyTemplate::new(PropertySelector::new("x")).with_duration(100))
            .with_animation(PropertyTemplate::new(PropertySelector::new("x,y")).with_duration(200));

        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, false)
            .unwrap();
        assert_eq!(modified.len(), 2);
        assert_eq!(animator.kind(group), Some(JobKindTag::Parallel));
        assert_eq!(animator.duration(group), 200);
        // 被认领的动作起点改为终点，管理器据此判断是否需要写入
        assert_eq!(actions[0].from_value, Value::Number(100.0));

        let first = animator.first_child(group).unwrap();
        animator.start(group);
        animator.set_current_time(group, 50);
        assert_eq!(obj.get("x"), Value::Number(50.0));
        assert_eq!(obj.get("y"), Value::Number(12.5));
        assert_eq!(animator.duration(first), 100);
    }

    #[test]
    fn test_explicit_to_animates_targets() {
        let mut animator = animator();
        let obj = rect();
        let mut actions = vec![StateAction::new(obj.property("opacity"), 0.0)];
        let mut modified = Vec::new();
        let transition = Transition::any().with_animation(
            PropertyTemplate::new(PropertySelector::new("opacity").with_target(&obj))
                .with_from(1.0)
                .with_to(0.5)
                .with_duration(100),
        );
        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, false)
            .unwrap();
        assert_eq!(modified, vec![obj.property("opacity")]);
        animator.start(group);
        animator.set_current_time(group, 100);
        assert_eq!(obj.get("opacity"), Value::Number(0.5));
    }

    #[test]
    fn test_reversed_sequence_runs_backward() {
        let mut animator = animator();
        let obj = rect();
        let mut actions = vec![StateAction::new(obj.property("x"), 100.0)];
        let mut modified = Vec::new();
        let transition = Transition::new("a", "b").reversible(true).with_animation(
            AnimationTemplate::Sequential(vec![
                AnimationTemplate::Pause(100),
                PropertyTemplate::new(PropertySelector::new("x"))
                    .with_duration(100)
                    .into(),
            ]),
        );
        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, true)
            .unwrap();
        let sequence = animator.first_child(group).unwrap();
        let children = animator.children(sequence);
        assert_eq!(animator.kind(children[0]), Some(JobKindTag::Pause));
        assert_eq!(animator.direction(group), Direction::Backward);
        assert_eq!(animator.current_loop_time(group), 200);
    }

    #[test]
    fn test_script_action_claims_state_script() {
        use super::super::event::StateChangeScript;
        use std::cell::Cell;

        let mut animator = animator();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        let event = ActionEvent::Script(StateChangeScript::new("ping", move || {
            c.set(c.get() + 1)
        }))
        .into_ref();
        let mut actions = vec![StateAction::event(event)];
        let mut modified = Vec::new();
        let transition = Transition::any().with_animation(AnimationTemplate::Sequential(vec![
            AnimationTemplate::Pause(50),
            ScriptActionTemplate::state_script("ping").into(),
        ]));
        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, false)
            .unwrap();
        assert!(actions[0].action_done);

        animator.start(group);
        animator.set_current_time(group, 49);
        assert_eq!(count.get(), 0);
        animator.set_current_time(group, 50);
        assert_eq!(count.get(), 1);
        assert_eq!(animator.state(group), JobState::Stopped);
    }

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn test_rotation_template_directions() {
        let cases = [
            (RotationDirection::Numerical, 180.0),
            (RotationDirection::Shortest, 0.0),
            (RotationDirection::Clockwise, 180.0),
            (RotationDirection::Counterclockwise, 0.0),
        ];
        for (direction, halfway) in cases {
            let mut animator = animator();
            let dial = PropertyObject::new("dial");
            dial.declare("rotation", 10.0).declare("x", 0.0);
            let mut actions = vec![
                StateAction::new(dial.property("rotation"), 350.0),
                StateAction::new(dial.property("x"), 100.0),
            ];
            let mut modified = Vec::new();
            let transition = Transition::any().with_animation(
                RotationTemplate::new()
                    .with_direction(direction)
                    .with_duration(100),
            );
            let group = transition
                .prepare(&mut animator, &mut actions, &mut modified, false)
                .unwrap();
            // 默认只认领 rotation/angle
            assert_eq!(modified, vec![dial.property("rotation")]);

            animator.start(group);
            animator.set_current_time(group, 50);
            assert_eq!(dial.get("rotation"), Value::Number(halfway), "{direction:?}");
            animator.set_current_time(group, 100);
            assert_eq!(dial.get("rotation"), Value::Number(350.0));
        }
    }

    #[test]
    fn test_parent_template_explicit_target() {
        let mut animator = animator();
        let root = Item::new("root");
        let a = Item::new("a");
        let b = Item::new("b");
        let rect = Item::new("rect");
        for item in [&a, &b] {
            item.set_parent(Some(&root));
        }
        rect.set_parent(Some(&a));

        let transition = Transition::any().with_animation(
            ParentTemplate::new()
                .with_target(&rect)
                .with_new_parent(&b)
                .with_duration(100),
        );
        let mut modified = Vec::new();
        let group = transition
            .prepare(&mut animator, &mut [], &mut modified, false)
            .unwrap();
        let sequence = animator.first_child(group).unwrap();
        let kinds: Vec<_> = animator
            .children(sequence)
            .iter()
            .map(|c| animator.kind(*c))
            .collect();
        assert_eq!(
            kinds,
            vec![Some(JobKindTag::Action), Some(JobKindTag::Parallel)]
        );

        animator.start(group);
        assert_eq!(rect.parent(), Some(b));
    }

    #[test]
    fn test_parent_template_via_rebases_geometry() {
        let mut animator = animator();
        let root = Item::new("root");
        let b = Item::new("b");
        let via = Item::new("via");
        let rect = Item::new("rect");
        b.set_parent(Some(&root));
        via.set_parent(Some(&root));
        via.set_transform_origin(TransformOrigin::TopLeft);
        via.set_rotation(90.0);
        rect.set_parent(Some(&b));

        let change = ParentChange::new(&rect, &b)
            .with_value("x", 10.0)
            .with_value("y", 0.0)
            .with_value("rotation", 0.0);
        let mut actions = change.value_actions();
        actions.insert(
            0,
            StateAction::event(ActionEvent::ParentChange(change).into_ref()),
        );
        let mut modified = Vec::new();
        let transition = Transition::any().with_animation(
            ParentTemplate::new().with_via(&via).with_duration(100),
        );
        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, false)
            .unwrap();
        assert!(actions[0].action_done);
        assert_eq!(modified.len(), 3);
        // 终点换算到 via（旋转 90 度）的坐标系
        let rebased = |name: &str| {
            let property = rect.property(name);
            actions
                .iter()
                .find(|a| a.targets(&property))
                .and_then(|a| a.to_value.as_number())
                .unwrap()
        };
        assert!(close(rebased("x"), 0.0));
        assert!(close(rebased("y"), -10.0));
        assert!(close(rebased("rotation"), -90.0));

        animator.start(group);
        assert_eq!(rect.parent(), Some(via.clone()));
        assert!(close(rect.rotation(), -90.0));

        // 子动画在 via 的坐标系下播放
        animator.set_current_time(group, 99);
        assert_eq!(rect.parent(), Some(via));

        animator.set_current_time(group, 100);
        assert_eq!(rect.parent(), Some(b));
        assert!(close(rect.x(), 10.0));
        assert!(close(rect.y(), 0.0));
        assert!(close(rect.rotation(), 0.0));
    }

    #[test]
    fn test_parent_template_reversed_order() {
        let mut animator = animator();
        let b = Item::new("b");
        let via = Item::new("via");
        let rect = Item::new("rect");
        let transition = Transition::any().with_animation(
            ParentTemplate::new()
                .with_target(&rect)
                .with_new_parent(&b)
                .with_via(&via),
        );
        let mut modified = Vec::new();
        let group = transition
            .prepare(&mut animator, &mut [], &mut modified, true)
            .unwrap();
        let sequence = animator.first_child(group).unwrap();
        let kinds: Vec<_> = animator
            .children(sequence)
            .iter()
            .map(|c| animator.kind(*c))
            .collect();
        assert_eq!(
            kinds,
            vec![
                Some(JobKindTag::Action),
                Some(JobKindTag::Parallel),
                Some(JobKindTag::Action),
            ]
        );

        // 反向播放时先经过 via，最后落到目标父节点
        animator.start(group);
        assert_eq!(rect.parent(), Some(via));
        animator.complete(group);
        assert_eq!(rect.parent(), Some(b));
    }

    #[test]
    fn test_parent_template_keeps_values_under_singular_via() {
        let mut animator = animator();
        let root = Item::new("root");
        let b = Item::new("b");
        let via = Item::new("via");
        let rect = Item::new("rect");
        b.set_parent(Some(&root));
        via.set_parent(Some(&root));
        via.set_scale(0.0);
        rect.set_parent(Some(&b));

        let change = ParentChange::new(&rect, &b).with_value("x", 20.0);
        let mut actions = change.value_actions();
        actions.insert(
            0,
            StateAction::event(ActionEvent::ParentChange(change).into_ref()),
        );
        let transition =
            Transition::any().with_animation(ParentTemplate::new().with_via(&via));
        let mut modified = Vec::new();
        transition.prepare(&mut animator, &mut actions, &mut modified, false);
        assert_eq!(actions[1].to_value, Value::Number(20.0));
    }

    #[test]
    fn test_parent_template_without_change_is_empty() {
        let mut animator = animator();
        let obj = rect();
        let mut actions = vec![StateAction::new(obj.property("x"), 10.0)];
        let mut modified = Vec::new();
        let transition = Transition::any().with_animation(ParentTemplate::new());
        let group = transition
            .prepare(&mut animator, &mut actions, &mut modified, false)
            .unwrap();
        let sequence = animator.first_child(group).unwrap();
        assert!(animator.children(sequence).is_empty());
        assert!(modified.is_empty());
    }

    #[test]
    fn test_no_templates_yield_no_job() {
        let mut animator = animator();
        let transition = Transition::any();
        let mut modified = Vec::new();
        assert!(transition
            .prepare(&mut animator, &mut [], &mut modified, false)
            .is_none());
    }
}
