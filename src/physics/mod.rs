//! 物理桥接
//!
//! 核心对物理引擎只有很窄的诉求：持住时把刚体切成运动学并喂目标位姿，
//! 释放时切回动态并施加释放速度，事后读回位姿与休眠状态。`PhysicsLink`
//! 把这层诉求抽成接口，rapier 实现见 `rapier.rs`，无物理场景用 `NullPhysics`。

mod rapier;

pub use rapier::RapierPhysics;

use glam::Vec3;

use crate::math::Pose;

/// 物理协作方接口
pub trait PhysicsLink {
    /// 切换运动学状态（被持 = 运动学）
    fn set_kinematic(&mut self, object: usize, kinematic: bool);

    /// 喂入本帧运动学目标位姿
    fn push_kinematic_target(&mut self, object: usize, pose: &Pose);

    /// 释放时施加线速度与角速度
    fn apply_release_velocity(&mut self, object: usize, linear: Vec3, angular: Vec3);

    /// 读回刚体位姿（无绑定返回 None）
    fn read_pose(&self, object: usize) -> Option<Pose>;

    /// 读回休眠状态（无绑定视为未休眠）
    fn is_sleeping(&self, object: usize) -> bool;

    /// 解除对象与刚体的绑定
    fn unregister(&mut self, object: usize);
}

/// 无操作实现
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPhysics;

impl PhysicsLink for NullPhysics {
    fn set_kinematic(&mut self, _object: usize, _kinematic: bool) {}

    fn push_kinematic_target(&mut self, _object: usize, _pose: &Pose) {}

    fn apply_release_velocity(&mut self, _object: usize, _linear: Vec3, _angular: Vec3) {}

    fn read_pose(&self, _object: usize) -> Option<Pose> {
        None
    }

    fn is_sleeping(&self, _object: usize) -> bool {
        false
    }

    fn unregister(&mut self, _object: usize) {}
}
