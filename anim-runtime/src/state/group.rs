//! 状态组：当前状态、状态切换与过渡选择

use tracing::{debug, info, warn};

use super::state::State;
use super::transition::Transition;
use crate::animator::Animator;

/// 状态组
pub struct StateGroup {
    states: Vec<State>,
    transitions: Vec<Transition>,
    current: String,
    null_state: State,
    applying: bool,
}

impl Default for StateGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl StateGroup {
    pub fn new() -> Self {
        Self {
            states: Vec::new(),
            transitions: Vec::new(),
            current: String::new(),
            null_state: State::null_state(),
            applying: false,
        }
    }

    /// 添加状态；空名与重名会被拒绝
    pub fn add_state(&mut self, state: State) -> bool {
        if state.name().is_empty() {
            warn!("状态名不能为空");
            return false;
        }
        if self.find_state(state.name()).is_some() {
            warn!(state = %state.name(), "状态名重复");
            return false;
        }
        self.states.push(state);
        true
    }

    pub fn add_transition(&mut self, transition: Transition) {
        self.transitions.push(transition);
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// 当前状态名，基础状态为空串
    pub fn state(&self) -> &str {
        &self.current
    }

    pub fn find_state(&self, name: &str) -> Option<&State> {
        self.states.iter().find(|s| s.name() == name)
    }

    /// 当前生效的状态对象（基础状态时为空状态）
    pub fn current_state(&self) -> &State {
        self.find_state(&self.current).unwrap_or(&self.null_state)
    }

    /// 切换到 `name`，空串表示回到基础状态
    pub fn set_state(&mut self, animator: &mut Animator, name: &str) {
        if self.current == name {
            return;
        }
        if self.applying {
            warn!(state = %name, "不能在状态切换过程中再次切换状态");
            return;
        }
        if !name.is_empty() && self.find_state(name).is_none() {
            warn!(state = %name, "未知状态，回到基础状态");
        }
        self.applying = true;

        let transition = self
            .find_transition(&self.current, name)
            .and_then(|(index, reversed)| self.transitions.get(index).map(|t| (t, reversed)));
        info!(
            from = %self.current,
            to = %name,
            animated = transition.is_some(),
            "状态切换"
        );

        let old_state = self.current_state().clone();
        self.current = name.to_string();
        let new_state = self.current_state().clone();
        new_state.apply(animator, &self.states, transition, &old_state);

        self.applying = false;
    }

    /// 按 `when` 条件更新当前状态
    ///
    /// 第一个条件成立的命名状态生效；当前状态的条件不再成立时回到基础状态。
    /// 状态发生变化时返回 `true`。
    pub fn update_auto_state(&mut self, animator: &mut Animator) -> bool {
        let mut revert = false;
        let mut target = None;
        for state in &self.states {
            match state.when_satisfied() {
                Some(true) => {
                    target = Some(state.name().to_string());
                    break;
                }
                Some(false) if state.name() == self.current => revert = true,
                _ => {}
            }
        }
        if let Some(name) = target {
            if name == self.current {
                return false;
            }
            self.set_state(animator, &name);
            return true;
        }
        if revert {
            let changed = !self.current.is_empty();
            self.set_state(animator, "");
            return changed;
        }
        false
    }

    /// 选择最匹配的过渡
    ///
    /// 精确匹配每侧 2 分，`*` 每侧 1 分，满分 4 直接胜出；
    /// 可逆过渡再按交换后的方向打分（`*`→`*` 除外）。
    ///
    /// # 返回
    ///
    /// 过渡下标与是否反向
    pub fn find_transition(&self, from: &str, to: &str) -> Option<(usize, bool)> {
        let mut best: Option<(usize, bool)> = None;
        let mut best_score = 0;

        for (index, transition) in self.transitions.iter().enumerate() {
            let from_list = split_states(transition.from_state());
            let to_list = split_states(transition.to_state());
            let wildcard_only = transition.from_state() == "*" && transition.to_state() == "*";

            for pass in 0..2 {
                let reversed = pass == 1;
                if reversed && (!transition.is_reversible() || wildcard_only) {
                    break;
                }
                let (from_side, to_side) = if reversed {
                    (&to_list, &from_list)
                } else {
                    (&from_list, &to_list)
                };
                let (Some(a), Some(b)) = (side_score(from_side, from), side_score(to_side, to))
                else {
                    continue;
                };
                let score = a + b;
                if score == 4 {
                    debug!(index, reversed, "过渡完全匹配");
                    return Some((index, reversed));
                }
                if score > best_score {
                    best_score = score;
                    best = Some((index, reversed));
                }
            }
        }
        best
    }
}

fn split_states(list: &str) -> Vec<&str> {
    list.split(',').map(str::trim).collect()
}

fn side_score(list: &[&str], name: &str) -> Option<u8> {
    if list.contains(&name) {
        Some(2)
    } else if list.contains(&"*") {
        Some(1)
    } else {
        None
    }
}
