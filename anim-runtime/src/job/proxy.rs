//! # 渲染线程代理
//!
//! 部分动画直接在渲染线程上驱动节点属性（透明度、位移、缩放、旋转）。
//! 主线程上用 [`AnimatorProxyJob`] 占位：它和普通叶子任务一样被时钟驱动，
//! 同时把 Start/Pause/Resume/Stop 通过通道转发给 [`RenderThreadAnimator`]。
//! 渲染侧完成后回复 `Finished`，代理在下一次 tick 时自行停止。
//!
//! 主线程先走到终点时（常见的竞争），`Stop` 带上方向，渲染侧据此写入终值；
//! 代理被销毁时发送不带方向的 `Stop`，渲染侧原地取消。每个 `Stop` 都会得到
//! `Stopped` 确认，收件箱据此清掉该 key 的全部记录。
//!
//! 共享节点由 `Mutex` 保护，锁只在读写节点字段时持有，不跨 tick。

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, warn};

use super::{Direction, JobState};
use crate::easing::EasingFunction;

/// 渲染节点上可动画的字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    Opacity,
    X,
    Y,
    Scale,
    Rotation,
}

/// 渲染节点
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderNode {
    pub opacity: f64,
    pub x: f64,
    pub y: f64,
    pub scale: f64,
    pub rotation: f64,
}

impl Default for RenderNode {
    fn default() -> Self {
        Self {
            opacity: 1.0,
            x: 0.0,
            y: 0.0,
            scale: 1.0,
            rotation: 0.0,
        }
    }
}

impl RenderNode {
    fn get(&self, target: RenderTarget) -> f64 {
        match target {
            RenderTarget::Opacity => self.opacity,
            RenderTarget::X => self.x,
            RenderTarget::Y => self.y,
            RenderTarget::Scale => self.scale,
            RenderTarget::Rotation => self.rotation,
        }
    }

    fn set(&mut self, target: RenderTarget, value: f64) {
        match target {
            RenderTarget::Opacity => self.opacity = value,
            RenderTarget::X => self.x = value,
            RenderTarget::Y => self.y = value,
            RenderTarget::Scale => self.scale = value,
            RenderTarget::Rotation => self.rotation = value,
        }
    }
}

/// 节点共享句柄
pub type SharedNode = Arc<Mutex<RenderNode>>;

/// 渲染侧动画描述
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderAnimation {
    pub target: RenderTarget,
    pub from: Option<f64>,
    pub to: f64,
    pub duration: i32,
    pub easing: EasingFunction,
}

/// 主线程 → 渲染线程
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCommand {
    Start { key: u64, animation: RenderAnimation },
    Pause { key: u64 },
    Resume { key: u64 },
    /// `settle` 为 `Some` 时按方向写入终值，`None` 表示原地取消
    Stop {
        key: u64,
        settle: Option<Direction>,
    },
}

/// 渲染线程 → 主线程
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderReply {
    Finished { key: u64 },
    /// 对 `Stop` 的确认，此后不会再有该 key 的回复
    Stopped { key: u64 },
}

#[derive(Default)]
struct ReplyInbox {
    finished: HashSet<u64>,
    /// 已停止、等待 `Stopped` 确认的 key
    retired: HashSet<u64>,
}

/// 主线程侧的通道端点
///
/// 多个代理共享同一个收件箱，按 key 认领各自的回复。
#[derive(Clone)]
pub struct RenderChannel {
    commands: Sender<RenderCommand>,
    replies: Rc<Receiver<RenderReply>>,
    inbox: Rc<RefCell<ReplyInbox>>,
    next_key: Rc<RefCell<u64>>,
}

impl RenderChannel {
    fn allocate_key(&self) -> u64 {
        let mut next = self.next_key.borrow_mut();
        *next += 1;
        *next
    }

    fn send(&self, command: RenderCommand) {
        if self.commands.send(command).is_err() {
            debug!("渲染线程已退出，命令被丢弃");
        }
    }

    fn collect_replies(&self, inbox: &mut ReplyInbox) {
        while let Ok(reply) = self.replies.try_recv() {
            match reply {
                RenderReply::Finished { key } => {
                    if !inbox.retired.contains(&key) {
                        inbox.finished.insert(key);
                    }
                }
                RenderReply::Stopped { key } => {
                    inbox.retired.remove(&key);
                    inbox.finished.remove(&key);
                }
            }
        }
    }

    /// 收取回复，返回 `key` 是否已完成
    fn take_finished(&self, key: u64) -> bool {
        let mut inbox = self.inbox.borrow_mut();
        self.collect_replies(&mut inbox);
        inbox.finished.remove(&key)
    }

    /// 停止渲染侧动画并丢弃该 key 的回复
    fn retire(&self, key: u64, settle: Option<Direction>) {
        let mut inbox = self.inbox.borrow_mut();
        inbox.finished.remove(&key);
        if self.commands.send(RenderCommand::Stop { key, settle }).is_ok() {
            inbox.retired.insert(key);
        } else {
            debug!(key, "渲染线程已退出，Stop 被丢弃");
        }
    }

    /// 收件箱中尚未认领或等待确认的 key 数
    pub fn pending_replies(&self) -> usize {
        let mut inbox = self.inbox.borrow_mut();
        self.collect_replies(&mut inbox);
        inbox.finished.len() + inbox.retired.len()
    }
}

/// 渲染线程代理任务
pub struct AnimatorProxyJob {
    key: u64,
    animation: RenderAnimation,
    channel: RenderChannel,
    started: bool,
}

impl AnimatorProxyJob {
    pub fn new(channel: &RenderChannel, animation: RenderAnimation) -> Self {
        let animation = RenderAnimation {
            duration: super::leaf::checked_duration(animation.duration, 0),
            ..animation
        };
        Self {
            key: channel.allocate_key(),
            animation,
            channel: channel.clone(),
            started: false,
        }
    }

    pub fn key(&self) -> u64 {
        self.key
    }

    pub(crate) fn duration(&self) -> i32 {
        self.animation.duration
    }

    /// 把状态变化转发给渲染侧；停止时按 `direction` 落到终值
    pub(crate) fn forward_state(
        &mut self,
        new_state: JobState,
        old_state: JobState,
        direction: Direction,
    ) {
        let key = self.key;
        match (old_state, new_state) {
            (JobState::Stopped, JobState::Running | JobState::Paused) => {
                self.started = true;
                self.channel.send(RenderCommand::Start {
                    key,
                    animation: self.animation,
                });
                if new_state == JobState::Paused {
                    self.channel.send(RenderCommand::Pause { key });
                }
            }
            (JobState::Running, JobState::Paused) => self.channel.send(RenderCommand::Pause { key }),
            (JobState::Paused, JobState::Running) => {
                self.channel.send(RenderCommand::Resume { key })
            }
            (JobState::Running | JobState::Paused, JobState::Stopped) => {
                self.started = false;
                self.channel.retire(key, Some(direction));
            }
            _ => {}
        }
    }

    pub(crate) fn poll_finished(&mut self) -> bool {
        self.started && self.channel.take_finished(self.key)
    }
}

impl Drop for AnimatorProxyJob {
    fn drop(&mut self) {
        if self.started {
            self.channel.retire(self.key, None);
        }
    }
}

struct RenderJob {
    animation: RenderAnimation,
    from: f64,
    elapsed: i32,
    paused: bool,
}

/// 渲染线程侧的动画控制器
pub struct RenderThreadAnimator {
    node: SharedNode,
    commands: Receiver<RenderCommand>,
    replies: Sender<RenderReply>,
    jobs: HashMap<u64, RenderJob>,
    disconnected: bool,
}

impl RenderThreadAnimator {
    /// 创建控制器与主线程通道
    pub fn new(node: SharedNode) -> (Self, RenderChannel) {
        let (command_tx, command_rx) = mpsc::channel();
        let (reply_tx, reply_rx) = mpsc::channel();
        let controller = Self {
            node,
            commands: command_rx,
            replies: reply_tx,
            jobs: HashMap::new(),
            disconnected: false,
        };
        let channel = RenderChannel {
            commands: command_tx,
            replies: Rc::new(reply_rx),
            inbox: Rc::new(RefCell::new(ReplyInbox::default())),
            next_key: Rc::new(RefCell::new(0)),
        };
        (controller, channel)
    }

    /// 处理所有待处理命令
    pub fn process_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    fn apply(&mut self, command: RenderCommand) {
        match command {
            RenderCommand::Start { key, animation } => {
                let from = match animation.from {
                    Some(from) => from,
                    None => self.lock_node().get(animation.target),
                };
                self.jobs.insert(
                    key,
                    RenderJob {
                        animation,
                        from,
                        elapsed: 0,
                        paused: false,
                    },
                );
            }
            RenderCommand::Pause { key } => {
                if let Some(job) = self.jobs.get_mut(&key) {
                    job.paused = true;
                }
            }
            RenderCommand::Resume { key } => {
                if let Some(job) = self.jobs.get_mut(&key) {
                    job.paused = false;
                }
            }
            RenderCommand::Stop { key, settle } => {
                if let Some(job) = self.jobs.remove(&key)
                    && let Some(direction) = settle
                {
                    let value = match direction {
                        Direction::Forward => job.animation.to,
                        Direction::Backward => job.from,
                    };
                    self.lock_node().set(job.animation.target, value);
                }
                if self.replies.send(RenderReply::Stopped { key }).is_err() {
                    debug!(key, "主线程已退出，停止确认被丢弃");
                }
            }
        }
    }

    /// 推进所有渲染侧动画
    pub fn advance(&mut self, delta_ms: i32) {
        let mut finished = Vec::new();
        {
            let mut node = self.node.lock().unwrap_or_else(PoisonError::into_inner);
            for (key, job) in self.jobs.iter_mut() {
                if job.paused {
                    continue;
                }
                job.elapsed = job.elapsed.saturating_add(delta_ms);
                let animation = &job.animation;
                let progress = if animation.duration <= 0 {
                    1.0
                } else {
                    (f64::from(job.elapsed) / f64::from(animation.duration)).min(1.0)
                };
                let eased = animation.easing.apply(progress);
                let value = job.from + (animation.to - job.from) * eased;
                node.set(animation.target, value);
                if progress >= 1.0 {
                    node.set(animation.target, animation.to);
                    finished.push(*key);
                }
            }
        }

        for key in finished {
            self.jobs.remove(&key);
            if self.replies.send(RenderReply::Finished { key }).is_err() {
                debug!(key, "主线程已退出，完成通知被丢弃");
            }
        }
    }

    /// 正在运行的动画数
    pub fn active_count(&self) -> usize {
        self.jobs.len()
    }

    /// 在独立线程上运行，直到主线程断开且所有动画结束
    pub fn spawn(mut self, frame: Duration) -> JoinHandle<()> {
        let frame_ms = i32::try_from(frame.as_millis()).unwrap_or(i32::MAX);
        std::thread::spawn(move || {
            loop {
                self.process_commands();
                if self.disconnected && self.jobs.is_empty() {
                    break;
                }
                self.advance(frame_ms);
                std::thread::sleep(frame);
            }
        })
    }

    fn lock_node(&self) -> std::sync::MutexGuard<'_, RenderNode> {
        self.node.lock().unwrap_or_else(|e| {
            warn!("渲染节点锁已中毒，继续使用内部数据");
            e.into_inner()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animator::Animator;
    use crate::clock::ManualTime;
    use crate::config::ClockConfig;

    fn fade_out() -> RenderAnimation {
        RenderAnimation {
            target: RenderTarget::Opacity,
            from: None,
            to: 0.0,
            duration: 100,
            easing: EasingFunction::Linear,
        }
    }

    #[test]
    fn test_controller_animates_node() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut proxy = AnimatorProxyJob::new(&channel, fade_out());

        proxy.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        controller.process_commands();
        controller.advance(50);
        assert_eq!(node.lock().unwrap().opacity, 0.5);
        assert!(!proxy.poll_finished());

        controller.advance(50);
        assert_eq!(node.lock().unwrap().opacity, 0.0);
        assert_eq!(controller.active_count(), 0);
        assert!(proxy.poll_finished());
    }

    #[test]
    fn test_pause_and_stop_commands() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut proxy = AnimatorProxyJob::new(&channel, fade_out());

        proxy.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        proxy.forward_state(JobState::Paused, JobState::Running, Direction::Forward);
        controller.process_commands();
        controller.advance(50);
        assert_eq!(node.lock().unwrap().opacity, 1.0);

        proxy.forward_state(JobState::Stopped, JobState::Paused, Direction::Forward);
        controller.process_commands();
        assert_eq!(controller.active_count(), 0);
    }

    #[test]
    fn test_replies_are_claimed_by_key() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node);
        let mut a = AnimatorProxyJob::new(&channel, fade_out());
        let mut b = AnimatorProxyJob::new(
            &channel,
            RenderAnimation {
                target: RenderTarget::X,
                duration: 200,
                ..fade_out()
            },
        );
        a.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        b.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        controller.process_commands();
        controller.advance(100);

        // b 先收取时会把 a 的回复留在收件箱
        assert!(!b.poll_finished());
        assert!(a.poll_finished());
    }

    fn animator() -> Animator {
        Animator::with_time_source(ClockConfig::default(), Box::new(ManualTime::new()))
    }

    #[test]
    fn test_main_clock_stop_settles_render_node() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut animator = animator();
        let job = animator.create_proxy(&channel, fade_out());

        animator.start(job);
        controller.process_commands();
        controller.advance(50);
        assert_eq!(node.lock().unwrap().opacity, 0.5);

        // 主线程先走到终点
        animator.advance(0);
        animator.advance(100);
        assert_eq!(animator.state(job), JobState::Stopped);

        controller.process_commands();
        controller.advance(50);
        assert_eq!(node.lock().unwrap().opacity, 0.0);
        assert_eq!(controller.active_count(), 0);
        assert_eq!(channel.pending_replies(), 0);
    }

    #[test]
    fn test_backward_stop_settles_on_start_value() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut proxy = AnimatorProxyJob::new(&channel, fade_out());

        proxy.forward_state(JobState::Running, JobState::Stopped, Direction::Backward);
        controller.process_commands();
        controller.advance(30);
        proxy.forward_state(JobState::Stopped, JobState::Running, Direction::Backward);
        controller.process_commands();
        assert_eq!(node.lock().unwrap().opacity, 1.0);
    }

    #[test]
    fn test_destroy_cancels_in_place() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut animator = animator();
        let job = animator.create_proxy(&channel, fade_out());

        animator.start(job);
        controller.process_commands();
        controller.advance(50);
        animator.destroy(job);
        controller.process_commands();
        assert_eq!(controller.active_count(), 0);
        assert_eq!(node.lock().unwrap().opacity, 0.5);
        assert_eq!(channel.pending_replies(), 0);
    }

    #[test]
    fn test_late_finished_reply_is_discarded() {
        let node = SharedNode::default();
        let (mut controller, channel) = RenderThreadAnimator::new(node);
        let mut proxy = AnimatorProxyJob::new(&channel, fade_out());

        proxy.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        controller.process_commands();
        // 渲染侧完成，回复还在路上时主线程已停止
        controller.advance(100);
        proxy.forward_state(JobState::Stopped, JobState::Running, Direction::Forward);
        assert_eq!(channel.pending_replies(), 1);

        controller.process_commands();
        assert_eq!(channel.pending_replies(), 0);
        assert!(!proxy.poll_finished());
    }

    #[test]
    fn test_spawned_thread_exits_after_disconnect() {
        let node = SharedNode::default();
        let (controller, channel) = RenderThreadAnimator::new(node.clone());
        let mut proxy = AnimatorProxyJob::new(
            &channel,
            RenderAnimation {
                duration: 10,
                ..fade_out()
            },
        );
        proxy.forward_state(JobState::Running, JobState::Stopped, Direction::Forward);
        // 已启动的代理在 drop 时发送 Stop，这里先标记为未启动，让动画自然跑完
        proxy.started = false;
        drop(proxy);
        drop(channel);

        let handle = controller.spawn(Duration::from_millis(5));
        handle.join().unwrap();
        assert_eq!(node.lock().unwrap().opacity, 0.0);
    }
}
