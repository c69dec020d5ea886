//! 操控核心配置
//!
//! 所有参数扁平化，直接在代码中修改默认值即可。

use once_cell::sync::Lazy;
use std::sync::RwLock;

/// 操控配置（扁平化，不嵌套）
#[derive(Debug, Clone)]
pub struct ManipulationConfig {
    // ========== 平滑过渡 ==========
    /// 抓取后物体对齐到手的时长（秒），默认 0.1
    pub align_duration: f32,
    /// 手锁定到抓取点的时长（秒），默认 0.1
    pub hand_lock_duration: f32,
    /// 放置到锚点的滑移时长（秒），默认 0.1
    pub place_duration: f32,
    /// 约束进入/退出混合时长（秒），默认 0.1
    pub constraint_blend_duration: f32,
    /// 释放后手回到真实追踪位姿的混合时长（秒），默认 0.15
    pub hand_blend_duration: f32,
    /// 所有过渡计时器的时长上限（秒），默认 1.0
    pub max_transition_duration: f32,

    // ========== 候选选择 ==========
    /// 抓取点默认最大抓取距离（米），默认 0.25
    pub default_max_grab_distance: f32,
    /// 锚点默认最大放置距离（米），默认 0.2
    pub default_max_place_distance: f32,
    /// 双手最小间距（米），默认 0.12
    /// 候选点会把另一只手顶得比这更近时触发软惩罚
    pub min_hand_distance: f32,
    /// 软惩罚距离常数（米），默认 1000.0
    /// 加到候选距离上，让候选几乎必败但仍可被选中
    pub overlap_penalty: f32,
    /// 包围体之外的"无穷"距离偏置（米），默认 10000.0
    pub unreachable_distance: f32,

    // ========== 释放速度 ==========
    /// 开始增幅的速度阈值（米/秒），默认 1.5
    pub release_speed_threshold: f32,
    /// 增幅平滑过渡窗口宽度（米/秒），默认 1.0
    /// 阈值之上经过这个宽度增幅从 1 线性升到 boost
    pub release_speed_gradient: f32,
    /// 水平（XZ）分量满增幅倍数，默认 1.3
    pub release_boost_horizontal: f32,
    /// 垂直（Y）分量满增幅倍数，默认 1.6
    pub release_boost_vertical: f32,

    // ========== 速度平滑 ==========
    /// 速度平滑窗口帧数，默认 8
    pub velocity_window: usize,

    // ========== 释放后状态广播 ==========
    /// 广播周期（秒），默认 0.2
    pub sync_interval: f32,
    /// 广播最长持续时间（秒），默认 3.0
    /// 超时后任务自动结束，即使刚体还未休眠
    pub sync_max_duration: f32,

    // ========== 调试 ==========
    /// 是否输出逐次过渡的调试日志，默认 false
    pub debug_log: bool,
}

impl Default for ManipulationConfig {
    fn default() -> Self {
        Self {
            // ====== 平滑过渡 ======
            // 短到不被注意、长到足以消除视觉跳变
            align_duration: 0.1,
            hand_lock_duration: 0.1,
            place_duration: 0.1,
            constraint_blend_duration: 0.1,
            hand_blend_duration: 0.15,

            // 计时器时长上限，防止误配置把过渡拖成慢动作
            max_transition_duration: 1.0,

            // ====== 候选选择 ======
            default_max_grab_distance: 0.25,
            default_max_place_distance: 0.2,

            // 两只手掌的物理宽度量级
            min_hand_distance: 0.12,

            // 软惩罚：比任何正常距离大得多，但不是硬拒绝
            overlap_penalty: 1000.0,
            unreachable_distance: 10000.0,

            // ====== 释放速度 ======
            // 低速放下不增幅，快速投掷增幅
            release_speed_threshold: 1.5,
            release_speed_gradient: 1.0,
            release_boost_horizontal: 1.3,
            release_boost_vertical: 1.6,

            // ====== 速度平滑 ======
            // 90Hz 下约 90ms 窗口
            velocity_window: 8,

            // ====== 释放后状态广播 ======
            sync_interval: 0.2,
            sync_max_duration: 3.0,

            // ====== 调试 ======
            debug_log: false,
        }
    }
}

/// 全局配置实例
static MANIPULATION_CONFIG: Lazy<RwLock<ManipulationConfig>> =
    Lazy::new(|| RwLock::new(ManipulationConfig::default()));

/// 获取当前配置（只读）
pub fn get_config() -> ManipulationConfig {
    MANIPULATION_CONFIG
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .clone()
}

/// 手动设置配置（用于运行时调试）
pub fn set_config(config: ManipulationConfig) {
    *MANIPULATION_CONFIG.write().unwrap_or_else(|e| e.into_inner()) = config;
}

/// 重置为默认配置
pub fn reset_config() {
    *MANIPULATION_CONFIG.write().unwrap_or_else(|e| e.into_inner()) =
        ManipulationConfig::default();
}
