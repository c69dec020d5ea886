//! VR 操纵核心
//!
//! 抓取器（手部效应器）、可抓对象与锚点插槽之间的帧同步交互内核：
//! 抓取（换手、双手、贴合偏移）、释放（速度增幅、顺手放置）、放置
//! 滑移与占位互斥、依赖图两遍约束求解、亲和范围事件与释放后状态
//! 广播。单线程，宿主每帧喂入手姿并调用 [`GrabController::update`]。
//!
//! 模块划分：
//! - `math` / `transition`：位姿等距变换与回绕安全角度工具、过渡计时器
//! - `object` / `anchor` / `grabber`：场景三方的静态配置与动态状态
//! - `constraint`：平移/旋转夹取管线，含跨 ±360° 的累计单轴限位
//! - `graph` / `selector`：依赖图分层与最近候选查询
//! - `registry` / `events`：持握记录与订阅式事件总线
//! - `physics`：窄接口物理桥接（rapier 实现与空实现）
//! - `controller`：对外入口，聚合以上全部

use thiserror::Error;

pub mod anchor;
pub mod config;
pub mod constraint;
pub mod controller;
pub mod events;
pub mod grabber;
pub mod graph;
pub mod hand_pose;
pub mod math;
pub mod object;
pub mod physics;
pub mod registry;
pub mod selector;
pub mod transition;

pub use anchor::Anchor;
pub use config::{get_config, reset_config, set_config, ManipulationConfig};
pub use constraint::{
    Axis, Constraint, ConstraintState, RotationConstraint, RotationLimits, TranslationConstraint,
};
pub use controller::{GrabController, PlaceOptions, SyncState};
pub use events::{EventBus, EventFlags, EventKind, GrabEvent};
pub use grabber::{Grabber, HandFlags, HandSide};
pub use graph::DependencyGraph;
pub use hand_pose::{HandPoseProvider, HandPoseSample, PointPoseProvider};
pub use math::Pose;
pub use object::{
    AxisShape, GrabPoint, GrabShape, Grabbable, ObjectFlags, ProximityMode, SnapFlags, SnapTarget,
};
pub use physics::{NullPhysics, PhysicsLink, RapierPhysics};
pub use registry::{ActiveGrab, GrabRegistry, Hold};
pub use transition::{IntervalScheduler, TransitionTimer};

/// 操纵核心错误
#[derive(Error, Debug)]
pub enum GrabError {
    /// 抓取形状参数退化（零长轴、上下界颠倒等）
    #[error("抓取形状退化: {0}")]
    DegenerateShape(String),
}

pub type Result<T> = std::result::Result<T, GrabError>;
