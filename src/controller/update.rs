//! 每帧操纵更新
//!
//! update(dt) 的固定次序：快照（消费手姿、回读物理、记录帧首位姿）→
//! 计时器推进 → 放置滑移 → 两遍约束（先根持握后依赖持握，每个对象
//! 求解完立即向未被持的依赖后代刚性传播）→ 亲和事件边沿检测 →
//! 节拍任务。次序固定保证同一帧内父对象位姿先于依赖子对象可用。

use std::collections::HashMap;

use glam::{Quat, Vec3};

use crate::constraint::solve_blended;
use crate::events::{EventKind, GrabEvent};
use crate::math::{rotation_between, Pose};
use crate::selector;

use super::{GrabController, SyncState};

impl GrabController {
    /// 推进一帧
    pub fn update(&mut self, dt: f32) {
        let dt = dt.max(0.0);
        self.snapshot(dt);
        self.tick_transitions(dt);
        self.advance_glides(dt);
        self.constrain_held();
        self.refresh_affordances();
        self.run_interval_tasks(dt);
    }

    // ========================================
    // 快照
    // ========================================

    /// 消费本帧喂入的手姿、回读自由对象的物理位姿、记录帧首位姿
    fn snapshot(&mut self, dt: f32) {
        // 未喂入的抓取器视为原地（速度差分为零）
        let mut fed = std::mem::take(&mut self.pending_poses);
        for id in self.registry.grabber_ids() {
            let target = fed.remove(&id);
            if let Some(grabber) = self.registry.grabber_mut(id) {
                let pose = target.unwrap_or(grabber.pose);
                grabber.advance_pose(pose, dt);
            }
        }

        // 自由对象（未被持、未被锚定）的位姿由物理世界权威
        for id in self.registry.object_ids() {
            if self.registry.is_grabbed(id) {
                continue;
            }
            let anchored = self
                .registry
                .object(id)
                .map(|o| o.is_anchored())
                .unwrap_or(true);
            if anchored {
                continue;
            }
            if let Some(pose) = self.physics.read_pose(id) {
                if let Some(object) = self.registry.object_mut(id) {
                    object.pose = pose;
                }
            }
        }

        for id in self.registry.object_ids() {
            if let Some(object) = self.registry.object_mut(id) {
                object.snapshot_pose();
            }
        }

        // 悬挂的持握引用：记错误日志并清除，本帧继续
        for id in self.registry.grabber_ids() {
            let held = self.registry.grabber(id).and_then(|g| g.held_object());
            if let Some(object) = held {
                let valid = self
                    .registry
                    .grab(object)
                    .map(|g| g.has_grabber(id))
                    .unwrap_or(false);
                if !valid {
                    log::error!(
                        "抓取器 {} 引用对象 {} 但注册表无对应持握，引用已清除",
                        id,
                        object
                    );
                    if let Some(grabber) = self.registry.grabber_mut(id) {
                        grabber.held = None;
                    }
                }
            }
        }
    }

    // ========================================
    // 计时器
    // ========================================

    fn tick_transitions(&mut self, dt: f32) {
        for id in self.registry.grabber_ids() {
            if let Some(grabber) = self.registry.grabber_mut(id) {
                if let Some(blend) = &mut grabber.hand_blend {
                    blend.timer.tick(dt);
                    if !blend.timer.active() {
                        grabber.hand_blend = None;
                    }
                }
            }
        }
        for object in self.registry.grabbed_object_ids() {
            if let Some(grab) = self.registry.grab_mut(object) {
                grab.align_timer.tick(dt);
                for hold in &mut grab.holds {
                    hold.lock_timer.tick(dt);
                }
            }
        }
        for id in self.registry.object_ids() {
            if let Some(object) = self.registry.object_mut(id) {
                object.constraint_state.blend.tick(dt);
            }
        }
    }

    // ========================================
    // 放置滑移
    // ========================================

    /// 在途滑移插值到锚点位姿，结束帧精确贴合
    fn advance_glides(&mut self, dt: f32) {
        for id in self.registry.object_ids() {
            let (anchor_id, from) = match self.registry.object(id).and_then(|o| o.placement) {
                Some(glide) => (glide.anchor, glide.from),
                None => continue,
            };
            let target = match self.registry.anchor(anchor_id) {
                Some(anchor) => anchor.pose,
                None => {
                    if let Some(object) = self.registry.object_mut(id) {
                        object.placement = None;
                    }
                    continue;
                }
            };

            let pose = {
                let object = match self.registry.object_mut(id) {
                    Some(o) => o,
                    None => continue,
                };
                let glide = match &mut object.placement {
                    Some(g) => g,
                    None => continue,
                };
                glide.timer.tick(dt);
                if glide.timer.active() {
                    let pose = from.blend(&target, glide.timer.factor());
                    object.pose = pose;
                    pose
                } else {
                    object.pose = target;
                    object.placement = None;
                    target
                }
            };
            self.physics.push_kinematic_target(id, &pose);
        }
    }

    // ========================================
    // 两遍约束
    // ========================================

    /// 被持对象两遍求解：根持握先行，依赖持握在其父位姿就绪后处理
    fn constrain_held(&mut self) {
        let (roots, dependents) = self.graph.partition_held(&self.registry);
        for object in roots {
            self.drive_held(object);
            self.propagate_descendants(object);
        }
        for object in dependents {
            self.drive_held(object);
            self.propagate_descendants(object);
        }
    }

    /// 主持握驱动 + look-at 牵引 + 约束求解，结果写回并推给物理
    fn drive_held(&mut self, object_id: usize) {
        let (primary, grip_offset) = match self
            .registry
            .grab(object_id)
            .and_then(|g| g.primary())
        {
            Some(hold) => (hold.grabber, hold.grip_offset),
            None => return,
        };
        let hand_pose = match self.registry.grabber(primary) {
            Some(g) => g.pose,
            None => return,
        };
        let mut target = hand_pose.transform(&grip_offset);

        if let Some(grab) = self.registry.grab(object_id) {
            if grab.align_timer.active() {
                target = grab.align_from.blend(&target, grab.align_timer.factor());
            }
        }

        target = self.steer_by_look_child(object_id, target, hand_pose.position);

        // 依赖对象在父参考系内求解，根对象在世界空间求解
        let parent_pose = self
            .registry
            .object(object_id)
            .filter(|o| o.is_dependent())
            .and_then(|o| o.parent())
            .and_then(|p| self.registry.object(p))
            .map(|p| p.pose);
        if let Some(object) = self.registry.object_mut(object_id) {
            if object.is_constrained() {
                target = match parent_pose {
                    Some(parent) => {
                        let local = parent.relative_to(&target);
                        let solved =
                            solve_blended(&object.constraint, &mut object.constraint_state, &local);
                        parent.transform(&solved)
                    }
                    None => {
                        solve_blended(&object.constraint, &mut object.constraint_state, &target)
                    }
                };
            }
            object.pose = target;
        }
        self.physics.push_kinematic_target(object_id, &target);
    }

    /// look-at 子对象牵引
    ///
    /// 父对象绕主手位置旋转，使指向子对象吸附点的方向对齐到指向副手
    /// 真实位置的方向，按子持握的手锁定进度球面插值。
    fn steer_by_look_child(&self, object_id: usize, target: Pose, pivot: Vec3) -> Pose {
        let child_id = match self
            .graph
            .look_children(object_id)
            .iter()
            .copied()
            .find(|&c| self.registry.is_grabbed(c))
        {
            Some(c) => c,
            None => return target,
        };
        let (child_grabber, child_point, lock) = match self
            .registry
            .grab(child_id)
            .and_then(|g| g.primary())
        {
            Some(hold) => (hold.grabber, hold.point, hold.lock_timer.factor()),
            None => return target,
        };
        let hand = match self.registry.grabber(child_grabber) {
            Some(g) => g.pose,
            None => return target,
        };
        let snap = {
            let (parent, child) = match (
                self.registry.object(object_id),
                self.registry.object(child_id),
            ) {
                (Some(p), Some(c)) => (p, c),
                _ => return target,
            };
            let point = match child.point(child_point) {
                Some(p) => p,
                None => return target,
            };
            // 子对象随父目标位姿刚性移动后的吸附位置
            let tentative = target.transform(&parent.prev_pose.relative_to(&child.prev_pose));
            point.resolve_snap(&tentative, &hand).position
        };

        let full = rotation_between(snap - pivot, hand.position - pivot);
        let delta = Quat::IDENTITY.slerp(full, lock.clamp(0.0, 1.0));

        Pose {
            position: pivot + delta * (target.position - pivot),
            rotation: (delta * target.rotation).normalize(),
        }
    }

    /// 把新求解的位姿刚性传播给未被持、未被锚定的依赖后代
    ///
    /// 被持后代跳过（第二遍自己驱动），独立后代原地不动。父环经
    /// 访问标记截断。
    fn propagate_descendants(&mut self, root: usize) {
        let mut stack: Vec<(usize, usize)> = self
            .graph
            .children(root)
            .iter()
            .map(|&c| (root, c))
            .collect();
        let mut seen: Vec<usize> = vec![root];

        while let Some((parent_id, child_id)) = stack.pop() {
            if seen.contains(&child_id) {
                continue;
            }
            seen.push(child_id);

            if self.registry.is_grabbed(child_id) {
                continue;
            }
            let follows = self
                .registry
                .object(child_id)
                .map(|o| o.is_dependent() && !o.is_anchored())
                .unwrap_or(false);
            if !follows {
                continue;
            }
            let (parent_pose, parent_prev) = match self.registry.object(parent_id) {
                Some(p) => (p.pose, p.prev_pose),
                None => continue,
            };
            let pose = match self.registry.object_mut(child_id) {
                Some(child) => {
                    let local = parent_prev.relative_to(&child.prev_pose);
                    child.pose = parent_pose.transform(&local);
                    child.pose
                }
                None => continue,
            };
            self.physics.push_kinematic_target(child_id, &pose);
            for &grandchild in self.graph.children(child_id) {
                stack.push((child_id, grandchild));
            }
        }
    }

    // ========================================
    // 亲和事件
    // ========================================

    /// 可抓范围与放置范围的边沿检测
    fn refresh_affordances(&mut self) {
        // 抓取器 → 最近可抓候选
        for grabber_id in self.registry.grabber_ids() {
            let fresh = selector::hover_candidate(&self.registry, grabber_id);
            let stale = self.hover_state.get(&grabber_id).copied();
            if fresh == stale {
                continue;
            }
            if let Some((object, point)) = stale {
                self.hover_state.remove(&grabber_id);
                self.emit(
                    GrabEvent::new(EventKind::GrabRangeLeft, object)
                        .with_grabber(grabber_id)
                        .with_point(point),
                );
            }
            if let Some((object, point)) = fresh {
                self.hover_state.insert(grabber_id, (object, point));
                self.emit(
                    GrabEvent::new(EventKind::GrabRangeEntered, object)
                        .with_grabber(grabber_id)
                        .with_point(point),
                );
            }
        }

        // 锚点 → 最近被持候选，对象升序先到先得
        let mut claims: HashMap<usize, (usize, usize)> = HashMap::new();
        for object_id in self.registry.grabbed_object_ids() {
            let eligible = self
                .registry
                .object(object_id)
                .map(|o| o.is_placeable() && !o.is_dependent())
                .unwrap_or(false);
            if !eligible {
                continue;
            }
            let grabber = match self.registry.grab(object_id).and_then(|g| g.primary()) {
                Some(hold) => hold.grabber,
                None => continue,
            };
            if let Some(candidate) = selector::closest_anchor(&self.registry, object_id) {
                claims.entry(candidate.anchor).or_insert((object_id, grabber));
            }
        }
        for anchor_id in self.registry.anchor_ids() {
            let fresh = claims.get(&anchor_id).copied();
            let stale = self.registry.anchor(anchor_id).and_then(|a| a.candidate);
            if fresh == stale {
                continue;
            }
            if let Some(anchor) = self.registry.anchor_mut(anchor_id) {
                anchor.candidate = fresh;
            }
            if let Some((object, grabber)) = stale {
                self.emit(
                    GrabEvent::new(EventKind::AnchorRangeLeft, object)
                        .with_anchor(anchor_id)
                        .with_grabber(grabber),
                );
            }
            if let Some((object, grabber)) = fresh {
                self.emit(
                    GrabEvent::new(EventKind::AnchorRangeEntered, object)
                        .with_anchor(anchor_id)
                        .with_grabber(grabber),
                );
            }
        }
    }

    // ========================================
    // 节拍任务
    // ========================================

    /// 释放后状态广播：只读对象状态，刚体休眠时最后广播一次并结束
    fn run_interval_tasks(&mut self, dt: f32) {
        let fired: Vec<(u64, usize)> = self.scheduler.tick(dt).to_vec();
        for (task, object_id) in fired {
            let registry_pose = match self.registry.object(object_id) {
                Some(o) => o.pose,
                None => {
                    self.scheduler.cancel(task);
                    continue;
                }
            };
            let pose = self.physics.read_pose(object_id).unwrap_or(registry_pose);
            let sleeping = self.physics.is_sleeping(object_id);
            if let Some(handler) = &mut self.sync_handler {
                handler(SyncState {
                    object: object_id,
                    pose,
                    sleeping,
                });
            }
            if sleeping {
                self.scheduler.cancel(task);
            }
        }
    }
}

// ============ 测试 ============
