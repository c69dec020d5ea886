//! rapier3d 物理桥接实现
//!
//! 持有完整的 rapier 仿真世界（刚体集、碰撞体集、各阶段管线），
//! 并维护 对象 id → 刚体句柄 的映射。被持对象切为位置运动学刚体，
//! 每帧喂入目标位姿；释放时切回动态刚体并注入释放速度。

use std::collections::HashMap;

use glam::{Quat, Vec3};
use rapier3d::na;
use rapier3d::prelude::*;

use crate::math::Pose;
use crate::physics::PhysicsLink;

/// glam 位姿 → rapier 等距变换
fn to_isometry(pose: &Pose) -> Isometry<Real> {
    Isometry::from_parts(
        na::Translation3::new(pose.position.x, pose.position.y, pose.position.z),
        na::UnitQuaternion::from_quaternion(na::Quaternion::new(
            pose.rotation.w,
            pose.rotation.x,
            pose.rotation.y,
            pose.rotation.z,
        )),
    )
}

/// rapier 等距变换 → glam 位姿
fn from_isometry(iso: &Isometry<Real>) -> Pose {
    let t = iso.translation.vector;
    let q = iso.rotation.quaternion();
    Pose::new(Vec3::new(t.x, t.y, t.z), Quat::from_xyzw(q.i, q.j, q.k, q.w))
}

/// rapier 仿真世界
pub struct RapierPhysics {
    // ========================================
    // 仿真管线
    // ========================================
    pipeline: PhysicsPipeline,
    integration: IntegrationParameters,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: Vector<Real>,

    // ========================================
    // 场景数据
    // ========================================
    bodies: RigidBodySet,
    colliders: ColliderSet,
    /// 对象 id → 刚体句柄
    handles: HashMap<usize, RigidBodyHandle>,
}

impl Default for RapierPhysics {
    fn default() -> Self {
        Self::new()
    }
}

impl RapierPhysics {
    pub fn new() -> Self {
        Self {
            pipeline: PhysicsPipeline::new(),
            integration: IntegrationParameters::default(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            gravity: vector![0.0, -9.81, 0.0],
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            handles: HashMap::new(),
        }
    }

    /// 注册对象刚体（已注册则替换旧刚体）
    pub fn register_body(
        &mut self,
        object: usize,
        pose: &Pose,
        collider: Collider,
        dynamic: bool,
    ) -> RigidBodyHandle {
        if self.handles.contains_key(&object) {
            self.unregister_body(object);
        }
        let builder = if dynamic {
            RigidBodyBuilder::dynamic()
        } else {
            RigidBodyBuilder::kinematic_position_based()
        };
        let body = builder.position(to_isometry(pose)).build();
        let handle = self.bodies.insert(body);
        self.colliders
            .insert_with_parent(collider, handle, &mut self.bodies);
        self.handles.insert(object, handle);
        log::debug!("注册刚体: 对象 {} (dynamic={})", object, dynamic);
        handle
    }

    /// 注册盒形刚体（便捷入口）
    pub fn register_cuboid(
        &mut self,
        object: usize,
        pose: &Pose,
        half_extents: Vec3,
        dynamic: bool,
    ) -> RigidBodyHandle {
        let collider =
            ColliderBuilder::cuboid(half_extents.x, half_extents.y, half_extents.z).build();
        self.register_body(object, pose, collider, dynamic)
    }

    fn unregister_body(&mut self, object: usize) {
        if let Some(handle) = self.handles.remove(&object) {
            self.bodies.remove(
                handle,
                &mut self.islands,
                &mut self.colliders,
                &mut self.impulse_joints,
                &mut self.multibody_joints,
                true,
            );
        }
    }

    #[inline]
    pub fn handle(&self, object: usize) -> Option<RigidBodyHandle> {
        self.handles.get(&object).copied()
    }

    #[inline]
    pub fn body(&self, object: usize) -> Option<&RigidBody> {
        self.handles.get(&object).and_then(|h| self.bodies.get(*h))
    }

    #[inline]
    pub fn body_count(&self) -> usize {
        self.handles.len()
    }

    /// 步进仿真
    pub fn step(&mut self, delta_time: f32) {
        self.integration.dt = delta_time.max(0.001);
        self.pipeline.step(
            &self.gravity,
            &self.integration,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd,
            Some(&mut self.query_pipeline),
            &(),
            &(),
        );
    }
}

impl PhysicsLink for RapierPhysics {
    fn set_kinematic(&mut self, object: usize, kinematic: bool) {
        if let Some(handle) = self.handles.get(&object) {
            if let Some(body) = self.bodies.get_mut(*handle) {
                let target = if kinematic {
                    RigidBodyType::KinematicPositionBased
                } else {
                    RigidBodyType::Dynamic
                };
                if body.body_type() != target {
                    body.set_body_type(target, true);
                }
            }
        }
    }

    fn push_kinematic_target(&mut self, object: usize, pose: &Pose) {
        if let Some(handle) = self.handles.get(&object) {
            if let Some(body) = self.bodies.get_mut(*handle) {
                body.set_next_kinematic_position(to_isometry(pose));
            }
        }
    }

    fn apply_release_velocity(&mut self, object: usize, linear: Vec3, angular: Vec3) {
        if let Some(handle) = self.handles.get(&object) {
            if let Some(body) = self.bodies.get_mut(*handle) {
                body.set_linvel(vector![linear.x, linear.y, linear.z], true);
                body.set_angvel(vector![angular.x, angular.y, angular.z], true);
            }
        }
    }

    fn read_pose(&self, object: usize) -> Option<Pose> {
        let handle = self.handles.get(&object)?;
        let body = self.bodies.get(*handle)?;
        Some(from_isometry(body.position()))
    }

    fn is_sleeping(&self, object: usize) -> bool {
        self.body(object).map(|b| b.is_sleeping()).unwrap_or(false)
    }

    fn unregister(&mut self, object: usize) {
        self.unregister_body(object);
        log::debug!("解绑刚体: 对象 {}", object);
    }
}

// ============ 测试 ============
