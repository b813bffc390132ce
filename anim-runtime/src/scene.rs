//! # Scene 模块
//!
//! JSON 场景描述：节点、状态与过渡。
//!
//! `SceneDesc` 只是数据，`Scene::from_desc` 把它组装成节点树与 `StateGroup`。
//! 静态检查见 [`crate::diagnostic::analyze_scene`]。
//!
//! ## 格式
//!
//! ```json
//! {
//!   "name": "demo",
//!   "objects": [
//!     { "name": "root", "width": 400, "height": 300 },
//!     { "name": "box", "parent": "root", "width": 50, "height": 50 }
//!   ],
//!   "states": [
//!     { "name": "moved", "changes": [{ "target": "box", "properties": { "x": 100 } }] }
//!   ],
//!   "transitions": [
//!     { "from": "*", "to": "*", "animations": [
//!       { "type": "property", "properties": "x", "duration": 200 }
//!     ] }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::animator::Animator;
use crate::config::AnimationConfig;
use crate::easing::EasingFunction;
use crate::error::SceneError;
use crate::item::{AnchorLine, AnchorRef, Item, TransformOrigin};
use crate::job::RotationDirection;
use crate::property::{Binding, PropertyObject};
use crate::state::{
    AnchorChanges, AnchorTemplate, AnimationTemplate, DEFAULT_DURATION, ParentChange,
    ParentTemplate, PropertyActionTemplate, PropertyChanges, PropertySelector, PropertyTemplate,
    RotationTemplate, SmoothedTemplate, State, StateGroup, Transition,
};
use crate::value::Value;

// ========== 描述 ==========

/// 场景描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneDesc {
    pub name: String,
    pub objects: Vec<ObjectDesc>,
    pub states: Vec<StateDesc>,
    pub transitions: Vec<TransitionDesc>,
}

/// 节点描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObjectDesc {
    pub name: String,
    pub parent: Option<String>,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    pub rotation: f64,
    pub scale: f64,
    pub opacity: f64,
    pub transform_origin: TransformOrigin,
    /// 额外声明的属性
    pub properties: BTreeMap<String, Value>,
}

impl Default for ObjectDesc {
    fn default() -> Self {
        Self {
            name: String::new(),
            parent: None,
            x: 0.0,
            y: 0.0,
            width: 0.0,
            height: 0.0,
            rotation: 0.0,
            scale: 1.0,
            opacity: 1.0,
            transform_origin: TransformOrigin::default(),
            properties: BTreeMap::new(),
        }
    }
}

/// 状态描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StateDesc {
    pub name: String,
    pub extends: Option<String>,
    pub changes: Vec<PropertyChangesDesc>,
    pub parent_changes: Vec<ParentChangeDesc>,
    pub anchor_changes: Vec<AnchorChangesDesc>,
}

/// 属性变化描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PropertyChangesDesc {
    pub target: String,
    pub properties: BTreeMap<String, Value>,
    /// 属性名 -> `"对象.属性"`
    pub bindings: BTreeMap<String, String>,
    pub restore_entry_values: bool,
    pub explicit: bool,
}

impl Default for PropertyChangesDesc {
    fn default() -> Self {
        Self {
            target: String::new(),
            properties: BTreeMap::new(),
            bindings: BTreeMap::new(),
            restore_entry_values: true,
            explicit: false,
        }
    }
}

/// 换父节点描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ParentChangeDesc {
    pub target: String,
    pub parent: String,
    pub values: BTreeMap<String, f64>,
}

/// 锚定目标描述
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnchorTargetDesc {
    pub item: String,
    pub line: AnchorLine,
}

/// 锚点变化描述
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnchorChangesDesc {
    pub target: String,
    pub anchors: BTreeMap<AnchorLine, AnchorTargetDesc>,
    pub reset: Vec<AnchorLine>,
}

/// 过渡描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionDesc {
    pub from: String,
    pub to: String,
    pub reversible: bool,
    /// 缺省时使用 [`AnimationConfig::default_easing`]
    pub easing: Option<EasingFunction>,
    pub animations: Vec<AnimationDesc>,
}

impl Default for TransitionDesc {
    fn default() -> Self {
        Self {
            from: "*".to_string(),
            to: "*".to_string(),
            reversible: false,
            easing: None,
            animations: Vec::new(),
        }
    }
}

fn default_duration() -> i32 {
    DEFAULT_DURATION
}

fn default_loops() -> i32 {
    1
}

fn default_velocity() -> f64 {
    200.0
}

/// 动画模板描述
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnimationDesc {
    Property {
        #[serde(default)]
        properties: String,
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default)]
        exclude: Vec<String>,
        #[serde(default)]
        from: Option<Value>,
        #[serde(default)]
        to: Option<Value>,
        #[serde(default = "default_duration")]
        duration: i32,
        #[serde(default)]
        easing: Option<EasingFunction>,
        #[serde(default = "default_loops")]
        loops: i32,
    },
    /// 角度动画；`properties` 为空时作用于 `rotation` 与 `angle`
    Rotation {
        #[serde(default)]
        properties: String,
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default)]
        from: Option<f64>,
        #[serde(default)]
        to: Option<f64>,
        #[serde(default = "default_duration")]
        duration: i32,
        #[serde(default)]
        easing: Option<EasingFunction>,
        #[serde(default)]
        direction: RotationDirection,
    },
    Smoothed {
        #[serde(default)]
        properties: String,
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default = "default_velocity")]
        velocity: f64,
    },
    Anchor {
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default = "default_duration")]
        duration: i32,
        #[serde(default)]
        easing: Option<EasingFunction>,
    },
    /// 换父节点动画；`animations` 为空时对几何属性做默认动画
    Parent {
        #[serde(default)]
        target: Option<String>,
        #[serde(default)]
        new_parent: Option<String>,
        #[serde(default)]
        via: Option<String>,
        #[serde(default = "default_duration")]
        duration: i32,
        #[serde(default)]
        easing: Option<EasingFunction>,
        #[serde(default)]
        animations: Vec<AnimationDesc>,
    },
    Pause {
        #[serde(default = "default_duration")]
        duration: i32,
    },
    PropertyAction {
        #[serde(default)]
        properties: String,
        #[serde(default)]
        targets: Vec<String>,
        #[serde(default)]
        value: Option<Value>,
    },
    Sequential {
        #[serde(default)]
        animations: Vec<AnimationDesc>,
    },
    Parallel {
        #[serde(default)]
        animations: Vec<AnimationDesc>,
    },
}

impl SceneDesc {
    /// 解析 JSON
    pub fn from_json(text: &str) -> Result<Self, SceneError> {
        serde_json::from_str(text).map_err(|e| SceneError::Parse(e.to_string()))
    }

    pub fn to_json(&self) -> Result<String, SceneError> {
        serde_json::to_string_pretty(self).map_err(|e| SceneError::Parse(e.to_string()))
    }
}

// ========== 场景 ==========

/// 组装好的场景
pub struct Scene {
    name: String,
    items: Vec<(String, Item)>,
    group: StateGroup,
}

impl Scene {
    /// 解析并组装
    pub fn from_json(text: &str) -> Result<Self, SceneError> {
        Self::from_desc(&SceneDesc::from_json(text)?)
    }

    pub fn from_desc(desc: &SceneDesc) -> Result<Self, SceneError> {
        Self::from_desc_with_config(desc, &AnimationConfig::default())
    }

    /// 组装场景；过渡的默认缓动取自配置
    pub fn from_desc_with_config(
        desc: &SceneDesc,
        config: &AnimationConfig,
    ) -> Result<Self, SceneError> {
        let mut scene = Scene {
            name: desc.name.clone(),
            items: Vec::new(),
            group: StateGroup::new(),
        };

        for object in &desc.objects {
            if scene.item(&object.name).is_some() {
                return Err(SceneError::DuplicateObject(object.name.clone()));
            }
            scene.items.push((object.name.clone(), build_item(object)));
        }
        for object in &desc.objects {
            if let Some(parent) = &object.parent {
                let parent = scene.lookup(parent, &format!("{} 的父节点", object.name))?;
                let item = scene.lookup(&object.name, "节点")?;
                item.set_parent(Some(parent));
            }
        }

        for state in &desc.states {
            let built = scene.build_state(state)?;
            scene.group.add_state(built);
        }
        for transition in &desc.transitions {
            let built = scene.build_transition(transition, config.default_easing)?;
            scene.group.add_transition(built);
        }

        info!(
            scene = %scene.name,
            objects = scene.items.len(),
            states = scene.group.states().len(),
            transitions = scene.group.transitions().len(),
            "场景已加载"
        );
        Ok(scene)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn item(&self, name: &str) -> Option<&Item> {
        self.items.iter().find(|(n, _)| n == name).map(|(_, item)| item)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &Item)> {
        self.items.iter().map(|(name, item)| (name.as_str(), item))
    }

    pub fn group(&self) -> &StateGroup {
        &self.group
    }

    pub fn group_mut(&mut self) -> &mut StateGroup {
        &mut self.group
    }

    pub fn set_state(&mut self, animator: &mut Animator, name: &str) {
        self.group.set_state(animator, name);
    }

    /// 所有节点的全部属性值
    pub fn snapshot(&self) -> BTreeMap<String, BTreeMap<String, Value>> {
        self.items
            .iter()
            .map(|(name, item)| (name.clone(), object_values(item.object())))
            .collect()
    }

    fn lookup(&self, name: &str, context: &str) -> Result<&Item, SceneError> {
        self.item(name).ok_or_else(|| SceneError::UnknownObject {
            name: name.to_string(),
            context: context.to_string(),
        })
    }

    fn build_state(&self, desc: &StateDesc) -> Result<State, SceneError> {
        let context = format!("状态 {}", desc.name);
        let mut builder = State::builder(desc.name.clone());
        if let Some(extends) = &desc.extends {
            builder = builder.extends(extends.clone());
        }

        for change in &desc.changes {
            let target = self.lookup(&change.target, &context)?;
            let mut op = PropertyChanges::new(target.object())
                .restore_entry_values(change.restore_entry_values)
                .explicit(change.explicit);
            for (property, value) in &change.properties {
                op = op.set(property, value.clone());
            }
            for (property, source) in &change.bindings {
                op = op.bind(property, self.binding(source, &context)?);
            }
            builder = builder.with(op);
        }

        for change in &desc.parent_changes {
            let target = self.lookup(&change.target, &context)?;
            let parent = self.lookup(&change.parent, &context)?;
            let mut op = ParentChange::new(target, parent);
            for (property, value) in &change.values {
                op = op.with_value(property, *value);
            }
            builder = builder.with(op);
        }

        for change in &desc.anchor_changes {
            let target = self.lookup(&change.target, &context)?;
            let mut op = AnchorChanges::new(target);
            for (line, anchor) in &change.anchors {
                let item = self.lookup(&anchor.item, &context)?;
                op = op.anchor(*line, AnchorRef::new(item, anchor.line));
            }
            for line in &change.reset {
                op = op.reset(*line);
            }
            builder = builder.with(op);
        }

        Ok(builder.build())
    }

    /// `"对象.属性"` 形式的绑定源
    fn binding(&self, source: &str, context: &str) -> Result<Binding, SceneError> {
        let Some((object, property)) = source.rsplit_once('.') else {
            return Err(SceneError::UnknownObject {
                name: source.to_string(),
                context: format!("{context} 的绑定"),
            });
        };
        let object = self.lookup(object, context)?.object().clone();
        let property = property.to_string();
        Ok(Binding::new(move || object.get(&property)))
    }

    fn build_transition(
        &self,
        desc: &TransitionDesc,
        default_easing: EasingFunction,
    ) -> Result<Transition, SceneError> {
        let mut transition = Transition::new(desc.from.clone(), desc.to.clone())
            .reversible(desc.reversible)
            .with_easing(desc.easing.unwrap_or(default_easing));
        for animation in &desc.animations {
            transition = transition.with_animation(self.build_animation(animation)?);
        }
        Ok(transition)
    }

    fn build_animation(&self, desc: &AnimationDesc) -> Result<AnimationTemplate, SceneError> {
        let template = match desc {
            AnimationDesc::Property {
                properties,
                targets,
                exclude,
                from,
                to,
                duration,
                easing,
                loops,
            } => {
                let mut selector = self.selector(properties, targets)?;
                for name in exclude {
                    selector = selector.with_exclude(self.lookup(name, "动画排除")?.object());
                }
                PropertyTemplate {
                    selector,
                    from: from.clone(),
                    to: to.clone(),
                    duration: *duration,
                    easing: *easing,
                    loops: *loops,
                }
                .into()
            }
            AnimationDesc::Rotation {
                properties,
                targets,
                from,
                to,
                duration,
                easing,
                direction,
            } => {
                let properties = if properties.trim().is_empty() {
                    "rotation,angle"
                } else {
                    properties.as_str()
                };
                let mut template =
                    RotationTemplate::with_selector(self.selector(properties, targets)?)
                        .with_direction(*direction)
                        .with_duration(*duration);
                template.animation.from = from.map(Value::Number);
                template.animation.to = to.map(Value::Number);
                template.animation.easing = *easing;
                template.into()
            }
            AnimationDesc::Smoothed {
                properties,
                targets,
                velocity,
            } => SmoothedTemplate::new(self.selector(properties, targets)?, *velocity).into(),
            AnimationDesc::Anchor {
                targets,
                duration,
                easing,
            } => {
                let mut template = AnchorTemplate::new().with_duration(*duration);
                template.easing = *easing;
                for name in targets {
                    template = template.with_target(self.lookup(name, "锚点动画")?);
                }
                template.into()
            }
            AnimationDesc::Parent {
                target,
                new_parent,
                via,
                duration,
                easing,
                animations,
            } => {
                let mut template = ParentTemplate::new().with_duration(*duration);
                template.easing = *easing;
                if let Some(name) = target {
                    template = template.with_target(self.lookup(name, "换父节点动画")?);
                }
                if let Some(name) = new_parent {
                    template = template.with_new_parent(self.lookup(name, "换父节点动画")?);
                }
                if let Some(name) = via {
                    template = template.with_via(self.lookup(name, "换父节点动画")?);
                }
                template.animations = animations
                    .iter()
                    .map(|a| self.build_animation(a))
                    .collect::<Result<_, _>>()?;
                template.into()
            }
            AnimationDesc::Pause { duration } => AnimationTemplate::Pause(*duration),
            AnimationDesc::PropertyAction {
                properties,
                targets,
                value,
            } => PropertyActionTemplate {
                selector: self.selector(properties, targets)?,
                value: value.clone(),
            }
            .into(),
            AnimationDesc::Sequential { animations } => AnimationTemplate::Sequential(
                animations
                    .iter()
                    .map(|a| self.build_animation(a))
                    .collect::<Result<_, _>>()?,
            ),
            AnimationDesc::Parallel { animations } => AnimationTemplate::Parallel(
                animations
                    .iter()
                    .map(|a| self.build_animation(a))
                    .collect::<Result<_, _>>()?,
            ),
        };
        Ok(template)
    }

    fn selector(&self, properties: &str, targets: &[String]) -> Result<PropertySelector, SceneError> {
        let mut selector = PropertySelector::new(properties);
        for name in targets {
            selector = selector.with_target(self.lookup(name, "动画目标")?.object());
        }
        Ok(selector)
    }
}

fn build_item(desc: &ObjectDesc) -> Item {
    let item = Item::new(desc.name.clone());
    item.set_x(desc.x);
    item.set_y(desc.y);
    item.set_width(desc.width);
    item.set_height(desc.height);
    item.set_rotation(desc.rotation);
    item.set_scale(desc.scale);
    item.object().set("opacity", desc.opacity);
    item.set_transform_origin(desc.transform_origin);
    for (name, value) in &desc.properties {
        item.object().declare(name.clone(), value.clone());
    }
    item
}

fn object_values(object: &PropertyObject) -> BTreeMap<String, Value> {
    object
        .property_names()
        .into_iter()
        .map(|name| {
            let value = object.get(&name);
            (name, value)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualTime;
    use crate::config::ClockConfig;

    const DEMO: &str = r#"{
        "name": "demo",
        "objects": [
            { "name": "root", "width": 400, "height": 300 },
            { "name": "box", "parent": "root", "width": 50, "height": 50, "properties": { "label": "hi" } },
            { "name": "panel", "parent": "root", "x": 200 }
        ],
        "states": [
            { "name": "moved", "changes": [{ "target": "box", "properties": { "x": 100 } }] },
            { "name": "docked", "parent_changes": [{ "target": "box", "parent": "panel" }] },
            { "name": "right", "anchor_changes": [
                { "target": "box", "anchors": { "right": { "item": "root", "line": "right" } } }
            ] }
        ],
        "transitions": [
            { "from": "", "to": "moved", "reversible": true, "animations": [
                { "type": "sequential", "animations": [
                    { "type": "pause", "duration": 50 },
                    { "type": "property", "properties": "x", "duration": 100 }
                ] }
            ] }
        ]
    }"#;

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    #[test]
    fn test_load_scene() {
        let scene = Scene::from_json(DEMO).unwrap();
        assert_eq!(scene.name(), "demo");
        let root = scene.item("root").unwrap();
        let boxed = scene.item("box").unwrap();
        assert_eq!(boxed.parent().as_ref(), Some(root));
        assert_eq!(boxed.object().get("label"), Value::Text("hi".to_string()));
        assert_eq!(scene.group().states().len(), 3);
        assert_eq!(scene.group().transitions().len(), 1);
        assert_eq!(scene.snapshot()["panel"]["x"], Value::Number(200.0));
    }

    #[test]
    fn test_scene_transition_runs() {
        let mut scene = Scene::from_json(DEMO).unwrap();
        let mut animator = animator();
        scene.set_state(&mut animator, "moved");
        let boxed = scene.item("box").unwrap().clone();

        animator.advance(0);
        animator.advance(50);
        assert_eq!(boxed.x(), 0.0);
        animator.advance(100);
        assert_eq!(boxed.x(), 50.0);
        animator.advance(150);
        assert_eq!(boxed.x(), 100.0);

        // 反向：先倒放属性动画，再走暂停
        scene.set_state(&mut animator, "");
        animator.advance(200);
        animator.advance(250);
        assert_eq!(boxed.x(), 50.0);
        animator.advance(300);
        assert_eq!(boxed.x(), 0.0);
    }

    #[test]
    fn test_unknown_parent_is_an_error() {
        let err = Scene::from_json(r#"{ "objects": [{ "name": "a", "parent": "ghost" }] }"#)
            .err()
            .unwrap();
        assert!(matches!(err, SceneError::UnknownObject { ref name, .. } if name == "ghost"));
    }

    #[test]
    fn test_duplicate_object_is_an_error() {
        let err = Scene::from_json(r#"{ "objects": [{ "name": "a" }, { "name": "a" }] }"#)
            .err()
            .unwrap();
        assert_eq!(err, SceneError::DuplicateObject("a".to_string()));
    }

    #[test]
    fn test_bindings_follow_source() {
        let text = r#"{
            "objects": [{ "name": "src", "width": 30 }, { "name": "dst" }],
            "states": [{ "name": "s", "changes": [{ "target": "dst", "bindings": { "width": "src.width" } }] }]
        }"#;
        let mut scene = Scene::from_json(text).unwrap();
        let mut animator = animator();
        scene.set_state(&mut animator, "s");
        let dst = scene.item("dst").unwrap().clone();
        assert_eq!(dst.width(), 30.0);
        scene.item("src").unwrap().set_width(45.0);
        dst.object().refresh_bindings();
        assert_eq!(dst.width(), 45.0);
    }

    fn run_to_end(animator: &mut Animator, now: &mut i64) {
        animator.advance(*now);
        let mut frames = 0;
        while animator.needs_tick() {
            *now += 16;
            animator.advance(*now);
            frames += 1;
            assert!(frames < 1000, "动画没有结束");
        }
    }

    #[test]
    fn test_drawer_scene_round_trip() {
        let mut scene = Scene::from_json(include_str!("../../scenes/drawer.json")).unwrap();
        let mut animator = animator();
        let mut now = 0;
        let number = |scene: &Scene, object: &str, property: &str| {
            scene.item(object).unwrap().object().number(property)
        };

        scene.set_state(&mut animator, "open");
        animator.advance(now);
        now += 112;
        animator.advance(now);
        let x = number(&scene, "sidebar", "x");
        assert!(x > -200.0 && x < 0.0, "x = {x}");

        run_to_end(&mut animator, &mut now);
        assert_eq!(number(&scene, "sidebar", "x"), 0.0);
        assert_eq!(number(&scene, "content", "x"), 200.0);
        assert_eq!(number(&scene, "content", "opacity"), 0.6);

        scene.set_state(&mut animator, "open_with_badge");
        run_to_end(&mut animator, &mut now);
        assert_eq!(number(&scene, "badge", "opacity"), 1.0);
        assert_eq!(number(&scene, "content", "x"), 200.0);

        scene.set_state(&mut animator, "");
        run_to_end(&mut animator, &mut now);
        assert_eq!(scene.group().state(), "");
        assert_eq!(number(&scene, "sidebar", "x"), -200.0);
        assert_eq!(number(&scene, "content", "x"), 0.0);
        assert_eq!(number(&scene, "content", "opacity"), 1.0);
        assert_eq!(number(&scene, "badge", "opacity"), 0.0);
    }

    #[test]
    fn test_trace_snapshot() {
        let text = r#"{
            "objects": [{ "name": "box" }],
            "states": [{ "name": "right", "changes": [{ "target": "box", "properties": { "x": 100 } }] }],
            "transitions": [{ "animations": [{ "type": "property", "properties": "x", "duration": 64 }] }]
        }"#;
        let mut scene = Scene::from_json(text).unwrap();
        let mut animator = animator();
        let mut trace = String::new();

        scene.set_state(&mut animator, "right");
        let mut now = 0;
        animator.advance(now);
        while animator.needs_tick() {
            now += 16;
            animator.advance(now);
            let x = scene.snapshot()["box"]["x"].clone();
            trace.push_str(&format!("t={now} box.x={}\n", serde_json::to_string(&x).unwrap()));
        }

        insta::assert_snapshot!(trace, @r"
        t=16 box.x=25.0
        t=32 box.x=50.0
        t=48 box.x=75.0
        t=64 box.x=100.0
        ");
    }

    #[test]
    fn test_rotation_animation_from_json() {
        let text = r#"{
            "objects": [{ "name": "dial", "rotation": 350 }],
            "states": [{ "name": "on", "changes": [{ "target": "dial", "properties": { "rotation": 10 } }] }],
            "transitions": [{ "animations": [
                { "type": "rotation", "duration": 100, "direction": "shortest" }
            ] }]
        }"#;
        let mut scene = Scene::from_json(text).unwrap();
        let mut animator = animator();
        let dial = scene.item("dial").unwrap().clone();

        scene.set_state(&mut animator, "on");
        animator.advance(0);
        animator.advance(50);
        // 最短路径经过 360，而不是倒转回 180
        assert!((dial.rotation() - 360.0).abs() < 1e-9, "rotation = {}", dial.rotation());

        let mut now = 50;
        run_to_end(&mut animator, &mut now);
        assert_eq!(dial.rotation(), 10.0);
    }

    #[test]
    fn test_parent_animation_from_json() {
        let text = r#"{
            "objects": [
                { "name": "a" },
                { "name": "b", "x": 100 },
                { "name": "box", "parent": "a" }
            ],
            "states": [{ "name": "docked", "parent_changes": [
                { "target": "box", "parent": "b", "values": { "x": 20 } }
            ] }],
            "transitions": [{ "animations": [{ "type": "parent", "duration": 100 }] }]
        }"#;
        let mut scene = Scene::from_json(text).unwrap();
        let mut animator = animator();
        let boxed = scene.item("box").unwrap().clone();
        let b = scene.item("b").unwrap().clone();

        scene.set_state(&mut animator, "docked");
        animator.advance(0);
        // 先换父节点并保持外观，再在 b 的坐标系里移动到终点
        assert_eq!(boxed.parent(), Some(b.clone()));
        animator.advance(50);
        let x = boxed.x();
        assert!(x > -100.0 && x < 20.0, "x = {x}");

        let mut now = 50;
        run_to_end(&mut animator, &mut now);
        assert_eq!(boxed.parent(), Some(b));
        assert_eq!(boxed.x(), 20.0);
        assert_eq!(scene.group().state(), "docked");
    }

    #[test]
    fn test_parse_error() {
        assert!(matches!(
            SceneDesc::from_json("{ not json"),
            Err(SceneError::Parse(_))
        ));
    }
}
