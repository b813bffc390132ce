//! # Item 模块
//!
//! 带几何属性的场景节点，是状态事件（换父节点、锚点变化）的操作对象。
//!
//! ## 坐标约定
//!
//! 节点坐标系中的点 `p` 映射到父节点坐标系：
//!
//! ```text
//! parent = R(S(p - o)) + o + (x, y)
//! ```
//!
//! 其中 `o` 是变换原点（默认中心），`S` 为等比缩放，`R` 为旋转（角度制）。
//! 锚点只考虑 x/y/width/height，不考虑旋转与缩放。

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::property::{ObjectId, PropertyObject, PropertyRef};
use crate::value::Value;

/// 几何属性名
pub const GEOMETRY_PROPERTIES: [&str; 9] = [
    "x",
    "y",
    "width",
    "height",
    "rotation",
    "scale",
    "opacity",
    "z",
    "baselineOffset",
];

// ========== 浮点比较 ==========

pub(crate) fn fuzzy_is_null(v: f64) -> bool {
    v.abs() <= 1e-12
}

pub(crate) fn fuzzy_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-12_f64.max(1e-9 * a.abs().max(b.abs()))
}

// ========== 变换 ==========

/// 变换原点
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformOrigin {
    TopLeft,
    Top,
    TopRight,
    Left,
    #[default]
    Center,
    Right,
    BottomLeft,
    Bottom,
    BottomRight,
}

impl TransformOrigin {
    /// 原点在节点坐标系中的位置
    pub fn point(self, width: f64, height: f64) -> (f64, f64) {
        let (w, h) = (width, height);
        match self {
            TransformOrigin::TopLeft => (0.0, 0.0),
            TransformOrigin::Top => (w / 2.0, 0.0),
            TransformOrigin::TopRight => (w, 0.0),
            TransformOrigin::Left => (0.0, h / 2.0),
            TransformOrigin::Center => (w / 2.0, h / 2.0),
            TransformOrigin::Right => (w, h / 2.0),
            TransformOrigin::BottomLeft => (0.0, h),
            TransformOrigin::Bottom => (w / 2.0, h),
            TransformOrigin::BottomRight => (w, h),
        }
    }
}

/// 变换分类（按复杂度排序）
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TransformKind {
    Identity,
    Translate,
    Scale,
    Rotate,
    Shear,
}

/// 二维仿射变换
///
/// `x' = m11 * x + m21 * y + dx`，`y' = m12 * x + m22 * y + dy`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub m11: f64,
    pub m12: f64,
    pub m21: f64,
    pub m22: f64,
    pub dx: f64,
    pub dy: f64,
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transform {
    pub fn identity() -> Self {
        Self {
            m11: 1.0,
            m12: 0.0,
            m21: 0.0,
            m22: 1.0,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn translation(dx: f64, dy: f64) -> Self {
        Self {
            dx,
            dy,
            ..Self::identity()
        }
    }

    pub fn scaling(sx: f64, sy: f64) -> Self {
        Self {
            m11: sx,
            m22: sy,
            ..Self::identity()
        }
    }

    /// 旋转（角度制）
    pub fn rotation(degrees: f64) -> Self {
        let (sin, cos) = degrees.to_radians().sin_cos();
        Self {
            m11: cos,
            m12: sin,
            m21: -sin,
            m22: cos,
            dx: 0.0,
            dy: 0.0,
        }
    }

    pub fn map(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.m11 * x + self.m21 * y + self.dx,
            self.m12 * x + self.m22 * y + self.dy,
        )
    }

    /// 先应用 `self`，再应用 `next`
    pub fn then(&self, next: &Transform) -> Transform {
        let n = next;
        Transform {
            m11: n.m11 * self.m11 + n.m21 * self.m12,
            m12: n.m12 * self.m11 + n.m22 * self.m12,
            m21: n.m11 * self.m21 + n.m21 * self.m22,
            m22: n.m12 * self.m21 + n.m22 * self.m22,
            dx: n.m11 * self.dx + n.m21 * self.dy + n.dx,
            dy: n.m12 * self.dx + n.m22 * self.dy + n.dy,
        }
    }

    pub fn determinant(&self) -> f64 {
        self.m11 * self.m22 - self.m12 * self.m21
    }

    /// 逆变换，不可逆时返回 `None`
    pub fn inverse(&self) -> Option<Transform> {
        let det = self.determinant();
        if fuzzy_is_null(det) {
            return None;
        }
        let m11 = self.m22 / det;
        let m12 = -self.m12 / det;
        let m21 = -self.m21 / det;
        let m22 = self.m11 / det;
        Some(Transform {
            m11,
            m12,
            m21,
            m22,
            dx: -(m11 * self.dx + m21 * self.dy),
            dy: -(m12 * self.dx + m22 * self.dy),
        })
    }

    pub fn kind(&self) -> TransformKind {
        if !fuzzy_is_null(self.m12) || !fuzzy_is_null(self.m21) {
            // 两列正交即为旋转（可带等比或非等比缩放）
            let dot = self.m11 * self.m21 + self.m12 * self.m22;
            if fuzzy_is_null(dot) {
                TransformKind::Rotate
            } else {
                TransformKind::Shear
            }
        } else if !fuzzy_is_null(self.m11 - 1.0) || !fuzzy_is_null(self.m22 - 1.0) {
            TransformKind::Scale
        } else if !fuzzy_is_null(self.dx) || !fuzzy_is_null(self.dy) {
            TransformKind::Translate
        } else {
            TransformKind::Identity
        }
    }
}

/// 把变换分解为等比缩放与旋转
///
/// # 返回
/// - `Some((scale, rotation))`
/// - 存在切变、不可逆、非等比缩放或缩放为 0 时记录警告并返回 `None`
pub fn decompose_similarity(transform: &Transform) -> Option<(f64, f64)> {
    if transform.kind() >= TransformKind::Shear || transform.inverse().is_none() {
        warn!(?transform, "复杂变换下无法保持外观");
        return None;
    }

    let is_rotate = transform.kind() == TransformKind::Rotate || transform.m11 < 0.0;
    if !fuzzy_eq(transform.m11, transform.m22) {
        warn!(?transform, "非等比缩放下无法保持外观");
        return None;
    }
    if !is_rotate {
        return Some((transform.m11, 0.0));
    }

    let scale = transform.m11.hypot(transform.m12);
    if fuzzy_is_null(scale) {
        warn!(?transform, "缩放为 0 时无法保持外观");
        return None;
    }
    let rotation = (transform.m12 / scale)
        .atan2(transform.m11 / scale)
        .to_degrees();
    Some((scale, rotation))
}

/// 绕原点 `o` 等比缩放并旋转后，节点左上角的位移：`R(S(o)) - o`
pub(crate) fn origin_offset(origin: (f64, f64), scale: f64, rotation: f64) -> (f64, f64) {
    let (ox, oy) = origin;
    Transform::translation(ox, oy)
        .then(&Transform::scaling(scale, scale))
        .then(&Transform::rotation(rotation))
        .then(&Transform::translation(-ox, -oy))
        .map(0.0, 0.0)
}

// ========== 锚点 ==========

/// 锚线
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnchorLine {
    Left,
    Right,
    HorizontalCenter,
    Top,
    Bottom,
    VerticalCenter,
    Baseline,
}

impl AnchorLine {
    pub const ALL: [AnchorLine; 7] = [
        AnchorLine::Left,
        AnchorLine::Right,
        AnchorLine::HorizontalCenter,
        AnchorLine::Top,
        AnchorLine::Bottom,
        AnchorLine::VerticalCenter,
        AnchorLine::Baseline,
    ];

    pub fn is_horizontal(self) -> bool {
        matches!(
            self,
            AnchorLine::Left | AnchorLine::Right | AnchorLine::HorizontalCenter
        )
    }
}

/// 锚定目标：某个节点的某条锚线
#[derive(Clone)]
pub struct AnchorRef {
    item: WeakItem,
    line: AnchorLine,
}

impl AnchorRef {
    pub fn new(item: &Item, line: AnchorLine) -> Self {
        Self {
            item: item.downgrade(),
            line,
        }
    }

    pub fn item(&self) -> Option<Item> {
        self.item.upgrade()
    }

    pub fn line(&self) -> AnchorLine {
        self.line
    }
}

impl PartialEq for AnchorRef {
    fn eq(&self, other: &Self) -> bool {
        self.line == other.line && Weak::ptr_eq(&self.item.0, &other.item.0)
    }
}

impl std::fmt::Debug for AnchorRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.item() {
            Some(item) => write!(f, "{}.{:?}", item.name(), self.line),
            None => write!(f, "<dropped>.{:?}", self.line),
        }
    }
}

/// 锚点集合
pub type Anchors = BTreeMap<AnchorLine, AnchorRef>;

// ========== 节点 ==========

struct ItemInner {
    object: PropertyObject,
    parent: RefCell<Weak<ItemInner>>,
    children: RefCell<Vec<Item>>,
    transform_origin: Cell<TransformOrigin>,
    anchors: RefCell<Anchors>,
}

/// 场景节点
///
/// 克隆得到的是同一节点的另一个句柄。父节点持有子节点，子节点只保存弱引用。
#[derive(Clone)]
pub struct Item {
    inner: Rc<ItemInner>,
}

/// 节点弱引用
#[derive(Clone, Default)]
pub struct WeakItem(Weak<ItemInner>);

impl WeakItem {
    pub fn upgrade(&self) -> Option<Item> {
        self.0.upgrade().map(|inner| Item { inner })
    }
}

impl PartialEq for Item {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Eq for Item {}

impl std::fmt::Debug for Item {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Item({})", self.name())
    }
}

impl Item {
    pub fn new(name: impl Into<String>) -> Self {
        let object = PropertyObject::new(name);
        object
            .declare("x", 0.0)
            .declare("y", 0.0)
            .declare("width", 0.0)
            .declare("height", 0.0)
            .declare("rotation", 0.0)
            .declare("scale", 1.0)
            .declare("opacity", 1.0)
            .declare("z", 0.0)
            .declare("baselineOffset", 0.0);
        Self {
            inner: Rc::new(ItemInner {
                object,
                parent: RefCell::new(Weak::new()),
                children: RefCell::new(Vec::new()),
                transform_origin: Cell::new(TransformOrigin::default()),
                anchors: RefCell::new(Anchors::new()),
            }),
        }
    }

    pub fn downgrade(&self) -> WeakItem {
        WeakItem(Rc::downgrade(&self.inner))
    }

    pub fn object(&self) -> &PropertyObject {
        &self.inner.object
    }

    pub fn id(&self) -> ObjectId {
        self.inner.object.id()
    }

    pub fn name(&self) -> &str {
        self.inner.object.name()
    }

    pub fn property(&self, name: &str) -> PropertyRef {
        self.inner.object.property(name)
    }

    // ========== 几何 ==========

    pub fn x(&self) -> f64 {
        self.inner.object.number("x")
    }

    pub fn y(&self) -> f64 {
        self.inner.object.number("y")
    }

    pub fn width(&self) -> f64 {
        self.inner.object.number("width")
    }

    pub fn height(&self) -> f64 {
        self.inner.object.number("height")
    }

    pub fn rotation(&self) -> f64 {
        self.inner.object.number("rotation")
    }

    pub fn scale(&self) -> f64 {
        self.inner.object.number("scale")
    }

    pub fn set_x(&self, x: f64) {
        self.inner.object.set("x", x);
    }

    pub fn set_y(&self, y: f64) {
        self.inner.object.set("y", y);
    }

    pub fn set_width(&self, width: f64) {
        self.inner.object.set("width", width);
    }

    pub fn set_height(&self, height: f64) {
        self.inner.object.set("height", height);
    }

    pub fn set_rotation(&self, rotation: f64) {
        self.inner.object.set("rotation", rotation);
    }

    pub fn set_scale(&self, scale: f64) {
        self.inner.object.set("scale", scale);
    }

    pub fn transform_origin(&self) -> TransformOrigin {
        self.inner.transform_origin.get()
    }

    pub fn set_transform_origin(&self, origin: TransformOrigin) {
        self.inner.transform_origin.set(origin);
    }

    /// 变换原点在节点坐标系中的位置
    pub fn transform_origin_point(&self) -> (f64, f64) {
        self.transform_origin().point(self.width(), self.height())
    }

    /// 节点坐标系 → 父节点坐标系
    pub fn item_to_parent(&self) -> Transform {
        let (ox, oy) = self.transform_origin_point();
        let scale = self.scale();
        Transform::translation(-ox, -oy)
            .then(&Transform::scaling(scale, scale))
            .then(&Transform::rotation(self.rotation()))
            .then(&Transform::translation(ox + self.x(), oy + self.y()))
    }

    /// 节点坐标系 → 场景坐标系
    pub fn to_scene(&self) -> Transform {
        let mut transform = self.item_to_parent();
        let mut ancestor = self.parent();
        while let Some(item) = ancestor {
            transform = transform.then(&item.item_to_parent());
            ancestor = item.parent();
        }
        transform
    }

    /// 本节点坐标系 → `other` 坐标系；`other` 不可逆时返回 `None`
    pub fn item_transform(&self, other: &Item) -> Option<Transform> {
        Some(self.to_scene().then(&other.to_scene().inverse()?))
    }

    // ========== 树 ==========

    pub fn parent(&self) -> Option<Item> {
        self.inner.parent.borrow().upgrade().map(|inner| Item { inner })
    }

    /// 子节点（按堆叠顺序）
    pub fn children(&self) -> Vec<Item> {
        self.inner.children.borrow().clone()
    }

    /// 修改父节点，追加到新父节点子列表末尾
    ///
    /// # 返回
    /// - 新父节点是自身或后代时拒绝并返回 `false`
    pub fn set_parent(&self, parent: Option<&Item>) -> bool {
        if let Some(parent) = parent {
            let mut ancestor = Some(parent.clone());
            while let Some(a) = ancestor {
                if a == *self {
                    warn!(item = %self.name(), parent = %parent.name(), "不能把节点挂到自身或后代下");
                    return false;
                }
                ancestor = a.parent();
            }
        }

        if self.parent().as_ref() == parent {
            return true;
        }
        if let Some(old) = self.parent() {
            old.inner.children.borrow_mut().retain(|c| c != self);
        }
        match parent {
            Some(parent) => {
                *self.inner.parent.borrow_mut() = Rc::downgrade(&parent.inner);
                parent.inner.children.borrow_mut().push(self.clone());
            }
            None => *self.inner.parent.borrow_mut() = Weak::new(),
        }
        true
    }

    /// 在堆叠顺序中移到兄弟节点之前
    pub fn stack_before(&self, sibling: &Item) {
        let Some(parent) = self.parent() else {
            return;
        };
        if sibling.parent().as_ref() != Some(&parent) || sibling == self {
            return;
        }
        let mut children = parent.inner.children.borrow_mut();
        children.retain(|c| c != self);
        let index = children
            .iter()
            .position(|c| c == sibling)
            .unwrap_or(children.len());
        children.insert(index, self.clone());
    }

    /// 堆叠顺序中紧随其后的兄弟节点
    pub fn next_sibling(&self) -> Option<Item> {
        let parent = self.parent()?;
        let children = parent.inner.children.borrow();
        let index = children.iter().position(|c| c == self)?;
        children.get(index + 1).cloned()
    }

    // ========== 锚点 ==========

    pub fn anchor(&self, line: AnchorLine) -> Option<AnchorRef> {
        self.inner.anchors.borrow().get(&line).cloned()
    }

    pub fn anchors(&self) -> Anchors {
        self.inner.anchors.borrow().clone()
    }

    /// 设置或清除锚点（不立即重新布局）
    pub fn set_anchor(&self, line: AnchorLine, target: Option<AnchorRef>) {
        let mut anchors = self.inner.anchors.borrow_mut();
        match target {
            Some(target) => {
                anchors.insert(line, target);
            }
            None => {
                anchors.remove(&line);
            }
        }
    }

    /// 水平/垂直方向使用的锚线
    pub fn used_anchors(&self, horizontal: bool) -> Vec<AnchorLine> {
        self.inner
            .anchors
            .borrow()
            .keys()
            .copied()
            .filter(|line| line.is_horizontal() == horizontal)
            .collect()
    }

    /// 锚线在本节点坐标系中的位置
    fn local_line(&self, line: AnchorLine) -> f64 {
        match line {
            AnchorLine::Left | AnchorLine::Top => 0.0,
            AnchorLine::Right => self.width(),
            AnchorLine::HorizontalCenter => self.width() / 2.0,
            AnchorLine::Bottom => self.height(),
            AnchorLine::VerticalCenter => self.height() / 2.0,
            AnchorLine::Baseline => self.inner.object.number("baselineOffset"),
        }
    }

    /// 锚定目标在本节点父坐标系中的位置
    fn anchor_position(&self, target: &AnchorRef) -> Option<f64> {
        let item = target.item()?;
        let local = item.local_line(target.line);
        if self.parent().as_ref() == Some(&item) {
            return Some(local);
        }
        let offset = if target.line.is_horizontal() {
            item.x()
        } else {
            item.y()
        };
        Some(offset + local)
    }

    /// 按锚点重新计算几何
    pub fn apply_anchors(&self) {
        let anchors = self.anchors();
        let pos = |line| anchors.get(&line).and_then(|t| self.anchor_position(t));

        let (left, right, hcenter) = (
            pos(AnchorLine::Left),
            pos(AnchorLine::Right),
            pos(AnchorLine::HorizontalCenter),
        );
        match (left, right, hcenter) {
            (Some(l), Some(r), _) => {
                self.set_x(l);
                self.set_width(r - l);
            }
            (Some(l), None, Some(c)) => {
                self.set_x(l);
                self.set_width(2.0 * (c - l));
            }
            (None, Some(r), Some(c)) => {
                let width = 2.0 * (r - c);
                self.set_width(width);
                self.set_x(r - width);
            }
            (Some(l), None, None) => self.set_x(l),
            (None, Some(r), None) => self.set_x(r - self.width()),
            (None, None, Some(c)) => self.set_x(c - self.width() / 2.0),
            (None, None, None) => {}
        }

        let (top, bottom, vcenter, baseline) = (
            pos(AnchorLine::Top),
            pos(AnchorLine::Bottom),
            pos(AnchorLine::VerticalCenter),
            pos(AnchorLine::Baseline),
        );
        match (top, bottom, vcenter) {
            (Some(t), Some(b), _) => {
                self.set_y(t);
                self.set_height(b - t);
            }
            (Some(t), None, Some(c)) => {
                self.set_y(t);
                self.set_height(2.0 * (c - t));
            }
            (None, Some(b), Some(c)) => {
                let height = 2.0 * (b - c);
                self.set_height(height);
                self.set_y(b - height);
            }
            (Some(t), None, None) => self.set_y(t),
            (None, Some(b), None) => self.set_y(b - self.height()),
            (None, None, Some(c)) => self.set_y(c - self.height() / 2.0),
            (None, None, None) => {
                if let Some(base) = baseline {
                    self.set_y(base - self.local_line(AnchorLine::Baseline));
                }
            }
        }
    }

    /// 当前几何快照
    pub fn geometry(&self) -> [Value; 4] {
        [
            Value::Number(self.x()),
            Value::Number(self.y()),
            Value::Number(self.width()),
            Value::Number(self.height()),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_close(actual: (f64, f64), expected: (f64, f64)) {
        assert!(
            (actual.0 - expected.0).abs() < 1e-9 && (actual.1 - expected.1).abs() < 1e-9,
            "{actual:?} != {expected:?}"
        );
    }

    fn item(name: &str, x: f64, y: f64, w: f64, h: f64) -> Item {
        let item = Item::new(name);
        item.set_x(x);
        item.set_y(y);
        item.set_width(w);
        item.set_height(h);
        item
    }

    #[test]
    fn test_transform_compose_and_inverse() {
        let t = Transform::rotation(90.0).then(&Transform::translation(10.0, 0.0));
        assert_close(t.map(1.0, 0.0), (10.0, 1.0));
        let inv = t.inverse().unwrap();
        assert_close(inv.map(10.0, 1.0), (1.0, 0.0));
        assert!(Transform::scaling(0.0, 1.0).inverse().is_none());
    }

    #[test]
    fn test_transform_kind() {
        assert_eq!(Transform::identity().kind(), TransformKind::Identity);
        assert_eq!(Transform::translation(1.0, 0.0).kind(), TransformKind::Translate);
        assert_eq!(Transform::scaling(2.0, 2.0).kind(), TransformKind::Scale);
        assert_eq!(Transform::rotation(30.0).kind(), TransformKind::Rotate);
        let shear = Transform {
            m21: 0.5,
            ..Transform::identity()
        };
        assert_eq!(shear.kind(), TransformKind::Shear);
    }

    #[test]
    fn test_decompose_similarity() {
        let t = Transform::scaling(2.0, 2.0).then(&Transform::rotation(30.0));
        let (scale, rotation) = decompose_similarity(&t).unwrap();
        assert!((scale - 2.0).abs() < 1e-9);
        assert!((rotation - 30.0).abs() < 1e-9);

        assert!(decompose_similarity(&Transform::scaling(2.0, 3.0)).is_none());
        let shear = Transform {
            m21: 0.5,
            ..Transform::identity()
        };
        assert!(decompose_similarity(&shear).is_none());
    }

    #[test]
    fn test_item_to_parent_uses_center_origin() {
        let rect = item("rect", 10.0, 20.0, 100.0, 50.0);
        rect.set_rotation(180.0);
        // 绕中心旋转 180 度：左上角落到右下角
        assert_close(rect.item_to_parent().map(0.0, 0.0), (110.0, 70.0));
        rect.set_transform_origin(TransformOrigin::TopLeft);
        assert_close(rect.item_to_parent().map(0.0, 0.0), (10.0, 20.0));
    }

    #[test]
    fn test_item_transform_between_parents() {
        let root = item("root", 0.0, 0.0, 500.0, 500.0);
        let a = item("a", 100.0, 0.0, 100.0, 100.0);
        let b = item("b", 0.0, 50.0, 100.0, 100.0);
        a.set_parent(Some(&root));
        b.set_parent(Some(&root));
        let t = a.item_transform(&b).unwrap();
        assert_close(t.map(0.0, 0.0), (100.0, -50.0));
    }

    #[test]
    fn test_set_parent_and_stacking() {
        let root = Item::new("root");
        let a = Item::new("a");
        let b = Item::new("b");
        let c = Item::new("c");
        for child in [&a, &b, &c] {
            assert!(child.set_parent(Some(&root)));
        }
        c.stack_before(&a);
        assert_eq!(root.children(), vec![c.clone(), a.clone(), b.clone()]);
        assert_eq!(c.next_sibling(), Some(a.clone()));

        assert!(!root.set_parent(Some(&a)));
        assert!(a.set_parent(None));
        assert_eq!(root.children(), vec![c, b]);
        assert_eq!(a.parent(), None);
    }

    #[test]
    fn test_anchors_fill_parent_and_sibling() {
        let root = item("root", 0.0, 0.0, 400.0, 300.0);
        let bar = item("bar", 0.0, 0.0, 0.0, 40.0);
        let body = item("body", 0.0, 0.0, 0.0, 0.0);
        bar.set_parent(Some(&root));
        body.set_parent(Some(&root));

        bar.set_anchor(AnchorLine::Left, Some(AnchorRef::new(&root, AnchorLine::Left)));
        bar.set_anchor(AnchorLine::Right, Some(AnchorRef::new(&root, AnchorLine::Right)));
        bar.set_anchor(AnchorLine::Bottom, Some(AnchorRef::new(&root, AnchorLine::Bottom)));
        bar.apply_anchors();
        assert_eq!((bar.x(), bar.y(), bar.width()), (0.0, 260.0, 400.0));

        body.set_anchor(AnchorLine::Top, Some(AnchorRef::new(&root, AnchorLine::Top)));
        body.set_anchor(AnchorLine::Bottom, Some(AnchorRef::new(&bar, AnchorLine::Top)));
        body.set_anchor(
            AnchorLine::HorizontalCenter,
            Some(AnchorRef::new(&root, AnchorLine::HorizontalCenter)),
        );
        body.set_width(100.0);
        body.apply_anchors();
        assert_eq!((body.x(), body.y(), body.height()), (150.0, 0.0, 260.0));
        assert_eq!(body.used_anchors(false).len(), 2);
    }
}
