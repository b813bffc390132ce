//! # Easing 模块
//!
//! 缓动函数库，把线性进度映射为动画进度。

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;

/// 缓动函数类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EasingFunction {
    /// 线性（匀速）
    #[default]
    Linear,
    /// 二次缓入
    InQuad,
    /// 二次缓出
    OutQuad,
    /// 二次缓入缓出
    InOutQuad,
    /// 三次缓入
    InCubic,
    /// 三次缓出
    OutCubic,
    /// 三次缓入缓出
    InOutCubic,
    /// 四次缓入
    InQuart,
    /// 四次缓出
    OutQuart,
    /// 正弦缓入
    InSine,
    /// 正弦缓出
    OutSine,
    /// 正弦缓入缓出
    InOutSine,
    /// 指数缓入
    InExpo,
    /// 指数缓出
    OutExpo,
    /// 回拉缓入（起步先反向）
    InBack,
    /// 回拉缓出（终点前越过）
    OutBack,
    /// 回拉缓入缓出
    InOutBack,
    /// 弹性缓出
    OutElastic,
    /// 弹跳缓出
    OutBounce,
}

impl EasingFunction {
    /// 计算缓动值
    ///
    /// # 参数
    /// - `t`: 时间进度 (0.0 - 1.0)
    ///
    /// # 返回
    /// - 缓动后的进度值。端点固定为 0 和 1，Back/Elastic 中途可越界
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);

        match self {
            EasingFunction::Linear => t,
            EasingFunction::InQuad => t * t,
            EasingFunction::OutQuad => 1.0 - (1.0 - t) * (1.0 - t),
            EasingFunction::InOutQuad => {
                if t < 0.5 {
                    2.0 * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(2) / 2.0
                }
            }
            EasingFunction::InCubic => t * t * t,
            EasingFunction::OutCubic => 1.0 - (1.0 - t).powi(3),
            EasingFunction::InOutCubic => {
                if t < 0.5 {
                    4.0 * t * t * t
                } else {
                    1.0 - (-2.0 * t + 2.0).powi(3) / 2.0
                }
            }
            EasingFunction::InQuart => t.powi(4),
            EasingFunction::OutQuart => 1.0 - (1.0 - t).powi(4),
            EasingFunction::InSine => 1.0 - (t * PI / 2.0).cos(),
            EasingFunction::OutSine => (t * PI / 2.0).sin(),
            EasingFunction::InOutSine => -((PI * t).cos() - 1.0) / 2.0,
            EasingFunction::InExpo => {
                if t == 0.0 {
                    0.0
                } else {
                    2.0_f64.powf(10.0 * t - 10.0)
                }
            }
            EasingFunction::OutExpo => {
                if t == 1.0 {
                    1.0
                } else {
                    1.0 - 2.0_f64.powf(-10.0 * t)
                }
            }
            EasingFunction::InBack => ease_in_back(t),
            EasingFunction::OutBack => 1.0 - ease_in_back(1.0 - t),
            EasingFunction::InOutBack => {
                if t < 0.5 {
                    ease_in_back(2.0 * t) / 2.0
                } else {
                    1.0 - ease_in_back(2.0 - 2.0 * t) / 2.0
                }
            }
            EasingFunction::OutElastic => ease_out_elastic(t),
            EasingFunction::OutBounce => ease_out_bounce(t),
        }
    }
}

/// 回拉缓入，过冲系数 1.70158
fn ease_in_back(t: f64) -> f64 {
    let c1 = 1.70158;
    let c3 = c1 + 1.0;
    c3 * t * t * t - c1 * t * t
}

/// 弹性缓出
fn ease_out_elastic(t: f64) -> f64 {
    if t == 0.0 {
        0.0
    } else if t == 1.0 {
        1.0
    } else {
        let c4 = (2.0 * PI) / 3.0;
        2.0_f64.powf(-10.0 * t) * ((t * 10.0 - 0.75) * c4).sin() + 1.0
    }
}

/// 弹跳缓出
fn ease_out_bounce(t: f64) -> f64 {
    let n1 = 7.5625;
    let d1 = 2.75;

    if t < 1.0 / d1 {
        n1 * t * t
    } else if t < 2.0 / d1 {
        let t = t - 1.5 / d1;
        n1 * t * t + 0.75
    } else if t < 2.5 / d1 {
        let t = t - 2.25 / d1;
        n1 * t * t + 0.9375
    } else {
        let t = t - 2.625 / d1;
        n1 * t * t + 0.984375
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [EasingFunction; 19] = [
        EasingFunction::Linear,
        EasingFunction::InQuad,
        EasingFunction::OutQuad,
        EasingFunction::InOutQuad,
        EasingFunction::InCubic,
        EasingFunction::OutCubic,
        EasingFunction::InOutCubic,
        EasingFunction::InQuart,
        EasingFunction::OutQuart,
        EasingFunction::InSine,
        EasingFunction::OutSine,
        EasingFunction::InOutSine,
        EasingFunction::InExpo,
        EasingFunction::OutExpo,
        EasingFunction::InBack,
        EasingFunction::OutBack,
        EasingFunction::InOutBack,
        EasingFunction::OutElastic,
        EasingFunction::OutBounce,
    ];

    #[test]
    fn test_linear() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(0.0), 0.0);
        assert_eq!(easing.apply(0.5), 0.5);
        assert_eq!(easing.apply(1.0), 1.0);
    }

    #[test]
    fn test_endpoints_are_fixed() {
        for easing in ALL {
            assert!(easing.apply(0.0).abs() < 1e-9, "{easing:?} at 0");
            assert!((easing.apply(1.0) - 1.0).abs() < 1e-9, "{easing:?} at 1");
        }
    }

    #[test]
    fn test_in_out_midpoint() {
        let mid = EasingFunction::InOutCubic.apply(0.5);
        assert!((mid - 0.5).abs() < 0.01);
    }

    #[test]
    fn test_back_overshoots() {
        assert!(EasingFunction::InBack.apply(0.2) < 0.0);
        assert!(EasingFunction::OutBack.apply(0.8) > 1.0);
    }

    #[test]
    fn test_clamp() {
        let easing = EasingFunction::Linear;
        assert_eq!(easing.apply(-0.5), 0.0);
        assert_eq!(easing.apply(1.5), 1.0);
    }

    #[test]
    fn test_serde_names() {
        let easing: EasingFunction = serde_json::from_str("\"in_out_quad\"").unwrap();
        assert_eq!(easing, EasingFunction::InOutQuad);
    }
}
