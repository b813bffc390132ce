//! # 诊断模块
//!
//! 对场景描述做静态检查，不依赖 IO，也不创建任何节点。
//!
//! ## 设计原则
//!
//! - 纯函数 API，可在无 IO 环境下运行
//! - 诊断分级：Error（加载会失败）、Warn（能加载但行为可疑）、Info（信息提示）
//! - 复用 `SceneDesc`，不重复解析逻辑

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::item::GEOMETRY_PROPERTIES;
use crate::scene::{AnimationDesc, SceneDesc, StateDesc};

/// 诊断级别
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DiagnosticLevel {
    /// 信息提示
    Info,
    /// 警告（建议修复）
    Warn,
    /// 错误（必须修复）
    Error,
}

impl std::fmt::Display for DiagnosticLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warn => write!(f, "WARN"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// 诊断条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    /// 诊断级别
    pub level: DiagnosticLevel,
    /// 场景 ID / 文件路径
    pub scene_id: String,
    /// 描述内的位置，如 `states[moved].changes[0]`
    pub path: Option<String>,
    /// 诊断消息
    pub message: String,
    /// 诊断详情（可选）
    pub detail: Option<String>,
}

impl Diagnostic {
    fn with_level(level: DiagnosticLevel, scene_id: &str, message: String) -> Self {
        Self {
            level,
            scene_id: scene_id.to_string(),
            path: None,
            message,
            detail: None,
        }
    }

    /// 创建错误诊断
    pub fn error(scene_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Error, &scene_id.into(), message.into())
    }

    /// 创建警告诊断
    pub fn warn(scene_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Warn, &scene_id.into(), message.into())
    }

    /// 创建信息诊断
    pub fn info(scene_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self::with_level(DiagnosticLevel::Info, &scene_id.into(), message.into())
    }

    /// 设置位置
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// 设置详情
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.level, self.scene_id)?;
        if let Some(path) = &self.path {
            write!(f, " @ {}", path)?;
        }
        write!(f, ": {}", self.message)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n  | {}", detail)?;
        }
        Ok(())
    }
}

/// 诊断结果
#[derive(Debug, Clone, Default)]
pub struct DiagnosticResult {
    /// 诊断条目列表
    pub diagnostics: Vec<Diagnostic>,
}

impl DiagnosticResult {
    /// 创建空结果
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加诊断
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.diagnostics.push(diagnostic);
    }

    /// 合并另一个结果
    pub fn merge(&mut self, other: DiagnosticResult) {
        self.diagnostics.extend(other.diagnostics);
    }

    /// 获取错误数量
    pub fn error_count(&self) -> usize {
        self.count(DiagnosticLevel::Error)
    }

    /// 获取警告数量
    pub fn warn_count(&self) -> usize {
        self.count(DiagnosticLevel::Warn)
    }

    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics.iter().filter(|d| d.level == level).count()
    }

    /// 是否有错误
    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    /// 是否为空
    pub fn is_empty(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// 按级别过滤
    pub fn filter_by_level(&self, min_level: DiagnosticLevel) -> Vec<&Diagnostic> {
        self.diagnostics
            .iter()
            .filter(|d| d.level >= min_level)
            .collect()
    }
}

impl std::fmt::Display for DiagnosticResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for diagnostic in &self.diagnostics {
            writeln!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

//=============================================================================
// 场景分析 API
//=============================================================================

/// 解析并分析 JSON 场景，解析失败记为一条错误
pub fn analyze_json(scene_id: &str, text: &str) -> DiagnosticResult {
    match SceneDesc::from_json(text) {
        Ok(desc) => analyze_scene(scene_id, &desc),
        Err(err) => {
            let mut result = DiagnosticResult::new();
            result.push(Diagnostic::error(scene_id, err.to_string()));
            result
        }
    }
}

/// 分析场景描述，返回诊断结果
///
/// 执行以下检查：
/// - 对象、状态重名，未知父节点
/// - `extends` 指向不存在的状态或形成环
/// - 状态与动画引用了未定义的对象或属性
/// - 过渡引用了不存在的状态
/// - 非法的时长、循环次数与速度
///
/// # 参数
///
/// - `scene_id`: 出现在诊断中的场景标识（通常是文件路径）
/// - `desc`: 场景描述
pub fn analyze_scene(scene_id: &str, desc: &SceneDesc) -> DiagnosticResult {
    let mut analyzer = Analyzer {
        scene_id,
        result: DiagnosticResult::new(),
        objects: HashMap::new(),
    };
    analyzer.check_objects(desc);
    analyzer.check_states(desc);
    analyzer.check_transitions(desc);
    analyzer.result
}

struct Analyzer<'a> {
    scene_id: &'a str,
    result: DiagnosticResult,
    /// 对象名 -> 已声明的属性
    objects: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> Analyzer<'a> {
    fn error(&mut self, path: String, message: String) {
        self.result
            .push(Diagnostic::error(self.scene_id, message).with_path(path));
    }

    fn warn(&mut self, path: String, message: String) {
        self.result
            .push(Diagnostic::warn(self.scene_id, message).with_path(path));
    }

    fn check_objects(&mut self, desc: &'a SceneDesc) {
        for (index, object) in desc.objects.iter().enumerate() {
            let path = format!("objects[{index}]");
            if object.name.is_empty() {
                self.error(path.clone(), "对象名为空".to_string());
            }
            let mut properties: HashSet<&str> = GEOMETRY_PROPERTIES.iter().copied().collect();
            properties.extend(object.properties.keys().map(String::as_str));
            if self.objects.insert(&object.name, properties).is_some() {
                self.error(path, format!("对象 '{}' 重复定义", object.name));
            }
        }

        for (index, object) in desc.objects.iter().enumerate() {
            let Some(parent) = &object.parent else {
                continue;
            };
            let path = format!("objects[{index}].parent");
            if parent == &object.name {
                self.error(path, format!("对象 '{}' 不能以自己为父节点", object.name));
            } else if !self.objects.contains_key(parent.as_str()) {
                self.error(path, format!("未知父节点 '{parent}'"));
            }
        }
    }

    fn check_object(&mut self, path: &str, name: &str) -> bool {
        if self.objects.contains_key(name) {
            return true;
        }
        self.error(path.to_string(), format!("未知对象 '{name}'"));
        false
    }

    fn check_property(&mut self, path: &str, object: &str, property: &str) {
        let declared = self
            .objects
            .get(object)
            .is_some_and(|props| props.contains(property));
        if !declared {
            self.result.push(
                Diagnostic::warn(self.scene_id, format!("对象 '{object}' 没有属性 '{property}'"))
                    .with_path(path)
                    .with_detail("运行时会跳过这条变化"),
            );
        }
    }

    fn check_states(&mut self, desc: &'a SceneDesc) {
        let mut names: BTreeMap<&str, &StateDesc> = BTreeMap::new();
        for (index, state) in desc.states.iter().enumerate() {
            let path = format!("states[{index}]");
            if state.name.is_empty() {
                self.error(path, "状态名为空（空名保留给基础状态）".to_string());
                continue;
            }
            if names.insert(&state.name, state).is_some() {
                self.error(path, format!("状态 '{}' 重复定义", state.name));
            }
        }

        for state in &desc.states {
            let path = format!("states[{}]", state.name);
            if let Some(extends) = &state.extends {
                if !names.contains_key(extends.as_str()) {
                    self.error(
                        format!("{path}.extends"),
                        format!("继承的状态 '{extends}' 不存在"),
                    );
                } else if extends_cycle(&names, state) {
                    self.warn(
                        format!("{path}.extends"),
                        "继承链形成环，运行时会在环处截断".to_string(),
                    );
                }
            }
            self.check_state_operations(&path, state);
        }
    }

    fn check_state_operations(&mut self, path: &str, state: &StateDesc) {
        for (index, change) in state.changes.iter().enumerate() {
            let path = format!("{path}.changes[{index}]");
            if !self.check_object(&path, &change.target) {
                continue;
            }
            for property in change.properties.keys().chain(change.bindings.keys()) {
                self.check_property(&path, &change.target, property);
            }
            for source in change.bindings.values() {
                match source.rsplit_once('.') {
                    Some((object, property)) => {
                        if self.check_object(&path, object) {
                            self.check_property(&path, object, property);
                        }
                    }
                    None => self.error(
                        path.clone(),
                        format!("绑定源 '{source}' 应写成 \"对象.属性\""),
                    ),
                }
            }
        }

        for (index, change) in state.parent_changes.iter().enumerate() {
            let path = format!("{path}.parent_changes[{index}]");
            self.check_object(&path, &change.target);
            self.check_object(&path, &change.parent);
            if change.target == change.parent {
                self.error(path.clone(), "不能把对象挂到自己下面".to_string());
            }
            for property in change.values.keys() {
                if !crate::state::PARENT_CHANGE_PROPERTIES.contains(&property.as_str()) {
                    self.warn(path.clone(), format!("换父节点不支持属性 '{property}'"));
                }
            }
        }

        for (index, change) in state.anchor_changes.iter().enumerate() {
            let path = format!("{path}.anchor_changes[{index}]");
            self.check_object(&path, &change.target);
            for (line, anchor) in &change.anchors {
                self.check_object(&path, &anchor.item);
                if line.is_horizontal() != anchor.line.is_horizontal() {
                    self.error(
                        path.clone(),
                        format!("锚线 {line:?} 不能锚定到 {:?}", anchor.line),
                    );
                }
            }
        }
    }

    fn check_transitions(&mut self, desc: &'a SceneDesc) {
        let states: HashSet<&str> = desc
            .states
            .iter()
            .map(|s| s.name.as_str())
            .chain(std::iter::once(""))
            .collect();

        for (index, transition) in desc.transitions.iter().enumerate() {
            let path = format!("transitions[{index}]");
            for side in [&transition.from, &transition.to] {
                for name in side.split(',').map(str::trim) {
                    if name != "*" && !states.contains(name) {
                        self.warn(path.clone(), format!("过渡引用了不存在的状态 '{name}'"));
                    }
                }
            }
            if transition.animations.is_empty() {
                self.result.push(
                    Diagnostic::info(self.scene_id, "过渡没有动画，切换会立即完成")
                        .with_path(path.clone()),
                );
            }
            for (i, animation) in transition.animations.iter().enumerate() {
                self.check_animation(&format!("{path}.animations[{i}]"), animation);
            }
        }
    }

    fn check_animation(&mut self, path: &str, animation: &AnimationDesc) {
        match animation {
            AnimationDesc::Property {
                targets,
                exclude,
                duration,
                loops,
                ..
            } => {
                self.check_targets(path, targets.iter().chain(exclude));
                self.check_duration(path, *duration);
                if *loops == 0 {
                    self.warn(path.to_string(), "loops 为 0，动画不会运行".to_string());
                }
            }
            AnimationDesc::Smoothed {
                targets, velocity, ..
            } => {
                self.check_targets(path, targets.iter());
                if *velocity <= 0.0 {
                    self.warn(path.to_string(), format!("速度 {velocity} 不是正数"));
                }
            }
            AnimationDesc::Anchor {
                targets, duration, ..
            } => {
                self.check_targets(path, targets.iter());
                self.check_duration(path, *duration);
            }
            AnimationDesc::Rotation {
                targets, duration, ..
            } => {
                self.check_targets(path, targets.iter());
                self.check_duration(path, *duration);
            }
            AnimationDesc::Parent {
                target,
                new_parent,
                via,
                duration,
                animations,
                ..
            } => {
                self.check_targets(path, target.iter().chain(new_parent).chain(via));
                self.check_duration(path, *duration);
                for (i, child) in animations.iter().enumerate() {
                    self.check_animation(&format!("{path}.animations[{i}]"), child);
                }
            }
            AnimationDesc::Pause { duration } => self.check_duration(path, *duration),
            AnimationDesc::PropertyAction { targets, .. } => {
                self.check_targets(path, targets.iter());
            }
            AnimationDesc::Sequential { animations } | AnimationDesc::Parallel { animations } => {
                for (i, child) in animations.iter().enumerate() {
                    self.check_animation(&format!("{path}.animations[{i}]"), child);
                }
            }
        }
    }

    fn check_targets<'b>(&mut self, path: &str, targets: impl Iterator<Item = &'b String>) {
        for target in targets {
            self.check_object(path, target);
        }
    }

    fn check_duration(&mut self, path: &str, duration: i32) {
        if duration < 0 {
            self.warn(path.to_string(), format!("时长 {duration} 为负数"));
        }
    }
}

/// 沿 `extends` 链走，回到自身即成环；只挂在别处环上的不算
fn extends_cycle(states: &BTreeMap<&str, &StateDesc>, start: &StateDesc) -> bool {
    let mut seen: HashSet<&str> = HashSet::new();
    let mut current = start.extends.as_deref();
    while let Some(name) = current {
        if name == start.name {
            return true;
        }
        if !seen.insert(name) {
            return false;
        }
        current = states.get(name).and_then(|s| s.extends.as_deref());
    }
    false
}
