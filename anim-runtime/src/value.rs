//! # Value 模块
//!
//! 属性值类型，以及动画插值规则。

use serde::{Deserialize, Serialize};

/// 属性值
///
/// 几何类型按字段逐一线性插值；`Bool`/`Text` 不可插值，
/// 动画只能在终点直接写入。
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// 未定义（属性不存在或尚未赋值）
    #[default]
    Undefined,
    /// 数值
    Number(f64),
    /// 布尔
    Bool(bool),
    /// 文本
    Text(String),
    /// 矩形
    Rect {
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    },
    /// 颜色（各分量 0.0 - 1.0）
    Color { r: f64, g: f64, b: f64, a: f64 },
    /// 尺寸
    Size { width: f64, height: f64 },
    /// 点
    Point { x: f64, y: f64 },
}

impl Value {
    /// 数值视图
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    /// 是否已定义
    pub fn is_defined(&self) -> bool {
        !matches!(self, Value::Undefined)
    }

    /// 类型名（用于日志与诊断）
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Undefined => "undefined",
            Value::Number(_) => "number",
            Value::Bool(_) => "bool",
            Value::Text(_) => "text",
            Value::Rect { .. } => "rect",
            Value::Color { .. } => "color",
            Value::Size { .. } => "size",
            Value::Point { .. } => "point",
        }
    }

    /// 在 `self` 与 `to` 之间插值
    ///
    /// # 参数
    /// - `to`: 终点值
    /// - `progress`: 缓动后的进度，可以略微越出 [0, 1]
    ///
    /// # 返回
    /// - 类型不匹配或不可插值时返回 `None`
    pub fn interpolate(&self, to: &Value, progress: f64) -> Option<Value> {
        let lerp = |a: f64, b: f64| a + (b - a) * progress;
        match (self, to) {
            (Value::Number(a), Value::Number(b)) => Some(Value::Number(lerp(*a, *b))),
            (Value::Point { x: x1, y: y1 }, Value::Point { x: x2, y: y2 }) => Some(Value::Point {
                x: lerp(*x1, *x2),
                y: lerp(*y1, *y2),
            }),
            (
                Value::Size {
                    width: w1,
                    height: h1,
                },
                Value::Size {
                    width: w2,
                    height: h2,
                },
            ) => Some(Value::Size {
                width: lerp(*w1, *w2),
                height: lerp(*h1, *h2),
            }),
            (
                Value::Rect {
                    x: x1,
                    y: y1,
                    width: w1,
                    height: h1,
                },
                Value::Rect {
                    x: x2,
                    y: y2,
                    width: w2,
                    height: h2,
                },
            ) => Some(Value::Rect {
                x: lerp(*x1, *x2),
                y: lerp(*y1, *y2),
                width: lerp(*w1, *w2),
                height: lerp(*h1, *h2),
            }),
            (
                Value::Color {
                    r: r1,
                    g: g1,
                    b: b1,
                    a: a1,
                },
                Value::Color {
                    r: r2,
                    g: g2,
                    b: b2,
                    a: a2,
                },
            ) => Some(Value::Color {
                r: lerp(*r1, *r2).clamp(0.0, 1.0),
                g: lerp(*g1, *g2).clamp(0.0, 1.0),
                b: lerp(*b1, *b2).clamp(0.0, 1.0),
                a: lerp(*a1, *a2).clamp(0.0, 1.0),
            }),
            _ => None,
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Number(n) => write!(f, "{n}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Text(s) => write!(f, "{s:?}"),
            Value::Rect {
                x,
                y,
                width,
                height,
            } => write!(f, "rect({x}, {y}, {width}x{height})"),
            Value::Color { r, g, b, a } => write!(f, "rgba({r}, {g}, {b}, {a})"),
            Value::Size { width, height } => write!(f, "size({width}x{height})"),
            Value::Point { x, y } => write!(f, "point({x}, {y})"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_interpolation() {
        let v = Value::Number(0.0).interpolate(&Value::Number(10.0), 0.25);
        assert_eq!(v, Some(Value::Number(2.5)));
    }

    #[test]
    fn test_color_is_clamped() {
        let from = Value::Color {
            r: 0.0,
            g: 0.0,
            b: 0.0,
            a: 1.0,
        };
        let to = Value::Color {
            r: 1.0,
            g: 0.5,
            b: 0.0,
            a: 1.0,
        };
        let v = from.interpolate(&to, 1.2);
        assert_eq!(
            v,
            Some(Value::Color {
                r: 1.0,
                g: 0.6,
                b: 0.0,
                a: 1.0
            })
        );
    }

    #[test]
    fn test_mismatched_types_do_not_interpolate() {
        assert_eq!(Value::Number(1.0).interpolate(&Value::Bool(true), 0.5), None);
        assert_eq!(Value::from("a").interpolate(&Value::from("b"), 0.5), None);
    }

    #[test]
    fn test_untagged_json() {
        let v: Value = serde_json::from_str(r#"{ "x": 1.0, "y": 2.0 }"#).unwrap();
        assert_eq!(v, Value::Point { x: 1.0, y: 2.0 });
        let v: Value = serde_json::from_str("3").unwrap();
        assert_eq!(v, Value::Number(3.0));
        let v: Value = serde_json::from_str(r#"{ "width": 4, "height": 5 }"#).unwrap();
        assert_eq!(
            v,
            Value::Size {
                width: 4.0,
                height: 5.0
            }
        );
    }
}
