//! 平滑过渡调度
//!
//! 两类纯附加状态：
//! - TransitionTimer: 固定时长的倒计时，产生 [0,1] 插值因子，
//!   用于抓取对齐、手锁定、锚点放置、约束进入/退出四族过渡。
//! - IntervalScheduler: 固定节拍的后台任务（释放后状态广播），
//!   只读注册表状态，可随时取消。
//!
//! 计时器单调递减，低于零视为未激活；启动时长受配置上限约束。

use crate::config::get_config;

// ============================================================================
// 过渡计时器
// ============================================================================

/// 倒计时过渡计时器
///
/// `remaining < 0` 表示未激活（因子恒为 1）。
#[derive(Clone, Copy, Debug)]
pub struct TransitionTimer {
    /// 剩余时间（秒），负值 = 未激活
    remaining: f32,
    /// 本次过渡的总时长（秒）
    duration: f32,
}

impl Default for TransitionTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl TransitionTimer {
    /// 创建未激活的计时器
    #[inline]
    pub fn new() -> Self {
        Self {
            remaining: -1.0,
            duration: 0.0,
        }
    }

    /// 启动过渡，时长被钳制到配置上限
    pub fn start(&mut self, duration: f32) {
        let max = get_config().max_transition_duration;
        let duration = duration.clamp(0.0, max);
        if duration <= 0.0 {
            self.finish();
            return;
        }
        self.duration = duration;
        self.remaining = duration;
    }

    /// 推进计时器
    #[inline]
    pub fn tick(&mut self, dt: f32) {
        if self.remaining >= 0.0 {
            self.remaining -= dt.max(0.0);
        }
    }

    /// 是否处于过渡中
    #[inline]
    pub fn active(&self) -> bool {
        self.remaining >= 0.0
    }

    /// 立即完成过渡（实体销毁 / 重新抓取时调用）
    #[inline]
    pub fn finish(&mut self) {
        self.remaining = -1.0;
    }

    /// 归一化进度 t = 1 - remaining/duration
    ///
    /// 未激活（含已完成）恒为 1。
    #[inline]
    pub fn factor(&self) -> f32 {
        if !self.active() || self.duration <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining / self.duration).clamp(0.0, 1.0)
    }
}

// ============================================================================
// 节拍任务调度
// ============================================================================

/// 单个节拍任务
#[derive(Clone, Copy, Debug)]
struct IntervalTask {
    /// 任务句柄
    id: u64,
    /// 业务标签（此核心中为对象索引）
    tag: usize,
    /// 触发周期（秒）
    period: f32,
    /// 距下次触发的时间
    until_next: f32,
    /// 剩余寿命（秒），耗尽后任务自动结束
    life: f32,
}

/// 节拍任务调度器
///
/// 单线程协作式：每帧由控制器 tick 一次；触发结果写入复用缓冲，
/// 由调用方在同一帧内消费。任务只读状态，注册表的变更始终发生在
/// 控制器自己的代码路径里。
#[derive(Debug, Default)]
pub struct IntervalScheduler {
    tasks: Vec<IntervalTask>,
    next_id: u64,
    /// 触发缓冲（复用内存）
    fired: Vec<(u64, usize)>,
}

impl IntervalScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 调度一个节拍任务，返回句柄
    ///
    /// `period` 最小 1 毫秒；`life` 是任务的最长持续时间。
    pub fn schedule(&mut self, tag: usize, period: f32, life: f32) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        let period = period.max(1e-3);
        self.tasks.push(IntervalTask {
            id,
            tag,
            period,
            until_next: period,
            life: life.max(0.0),
        });
        id
    }

    /// 按句柄取消
    pub fn cancel(&mut self, id: u64) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.id != id);
        self.tasks.len() != before
    }

    /// 按标签取消（对象被重新抓取时立刻调用）
    pub fn cancel_tag(&mut self, tag: usize) -> bool {
        let before = self.tasks.len();
        self.tasks.retain(|t| t.tag != tag);
        self.tasks.len() != before
    }

    /// 是否存在指定标签的任务
    #[inline]
    pub fn has_tag(&self, tag: usize) -> bool {
        self.tasks.iter().any(|t| t.tag == tag)
    }

    /// 活跃任务数
    #[inline]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// 是否没有任务
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// 推进所有任务，返回本帧触发的 (句柄, 标签) 列表
    ///
    /// 返回的切片只在下次 tick 前有效。dt 超过周期时会多次触发。
    pub fn tick(&mut self, dt: f32) -> &[(u64, usize)] {
        self.fired.clear();
        let dt = dt.max(0.0);

        for task in &mut self.tasks {
            task.life -= dt;
            task.until_next -= dt;
            while task.until_next <= 0.0 {
                self.fired.push((task.id, task.tag));
                task.until_next += task.period;
            }
        }

        // 寿命耗尽的任务本帧触发完后移除
        self.tasks.retain(|t| t.life > 0.0);
        &self.fired
    }
}
