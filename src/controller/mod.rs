//! 过渡控制器
//!
//! 操纵核心的唯一上下文对象：持有注册表、依赖图、事件总线、节拍调度器
//! 与物理桥接，编排 Grab / Release / Place / RemoveFromAnchor 四族过渡，
//! 并在每帧 update 中完成快照、约束求解、依赖传播与亲和事件。
//!
//! 所有注册表变更都发生在控制器的操作与 update 内（单线程帧同步）。
//! 事件处理器不得在回调中同步发起新的过渡，否则事件顺序无法保证。

mod grab;
mod place;
mod release;
mod update;

pub use place::PlaceOptions;

use std::collections::HashMap;

use crate::anchor::Anchor;
use crate::config::get_config;
use crate::events::{EventBus, EventKind, GrabEvent};
use crate::grabber::Grabber;
use crate::graph::DependencyGraph;
use crate::hand_pose::{HandPoseProvider, HandPoseSample, PointPoseProvider};
use crate::math::Pose;
use crate::object::{Grabbable, SnapTarget};
use crate::physics::{NullPhysics, PhysicsLink};
use crate::registry::GrabRegistry;
use crate::transition::IntervalScheduler;

// ============================================================================
// 状态广播
// ============================================================================

/// 释放后周期广播的对象状态（网络复制接缝）
#[derive(Clone, Copy, Debug)]
pub struct SyncState {
    /// 对象 id
    pub object: usize,
    /// 当前位姿（有刚体时取物理位姿）
    pub pose: Pose,
    /// 刚体是否已休眠
    pub sleeping: bool,
}

// ============================================================================
// 控制器
// ============================================================================

/// 操纵核心控制器
pub struct GrabController {
    // ========================================
    // 核心状态
    // ========================================
    pub(crate) registry: GrabRegistry,
    pub(crate) graph: DependencyGraph,
    pub(crate) events: EventBus,
    pub(crate) scheduler: IntervalScheduler,

    // ========================================
    // 协作方
    // ========================================
    pub(crate) physics: Box<dyn PhysicsLink>,
    pub(crate) pose_provider: Box<dyn HandPoseProvider>,
    pub(crate) sync_handler: Option<Box<dyn FnMut(SyncState)>>,

    // ========================================
    // 帧内瞬态
    // ========================================
    /// 本帧喂入、尚未消费的抓取器原始位姿
    pub(crate) pending_poses: HashMap<usize, Pose>,
    /// 抓取器 id → 当前可抓范围候选 (对象, 抓取点)，边沿检测基准
    pub(crate) hover_state: HashMap<usize, (usize, usize)>,
}

impl Default for GrabController {
    fn default() -> Self {
        Self::new()
    }
}

impl GrabController {
    /// 创建控制器（无物理、默认手姿提供方）
    pub fn new() -> Self {
        Self {
            registry: GrabRegistry::new(),
            graph: DependencyGraph::new(),
            events: EventBus::new(),
            scheduler: IntervalScheduler::new(),
            physics: Box::new(NullPhysics),
            pose_provider: Box::new(PointPoseProvider),
            sync_handler: None,
            pending_poses: HashMap::new(),
            hover_state: HashMap::new(),
        }
    }

    /// 注入物理桥接
    pub fn with_physics(mut self, physics: Box<dyn PhysicsLink>) -> Self {
        self.physics = physics;
        self
    }

    /// 注入手姿提供方
    pub fn with_pose_provider(mut self, provider: Box<dyn HandPoseProvider>) -> Self {
        self.pose_provider = provider;
        self
    }

    // ========================================
    // 订阅
    // ========================================

    /// 订阅过渡事件，返回退订令牌
    pub fn subscribe(&mut self, handler: impl FnMut(&GrabEvent) + 'static) -> u64 {
        self.events.subscribe(handler)
    }

    /// 退订
    pub fn unsubscribe(&mut self, token: u64) -> bool {
        self.events.unsubscribe(token)
    }

    /// 设置释放后状态广播回调
    pub fn set_sync_handler(&mut self, handler: impl FnMut(SyncState) + 'static) {
        self.sync_handler = Some(Box::new(handler));
    }

    /// 移除状态广播回调
    pub fn clear_sync_handler(&mut self) {
        self.sync_handler = None;
    }

    // ========================================
    // 注册与生命周期
    // ========================================

    /// 注册抓取器
    pub fn register_grabber(&mut self, grabber: Grabber) -> usize {
        let id = self.registry.add_grabber(grabber);
        if get_config().debug_log {
            log::debug!("注册抓取器 {}", id);
        }
        id
    }

    /// 注销抓取器，持有中的对象先被释放
    pub fn unregister_grabber(&mut self, id: usize) -> bool {
        let held = match self.registry.grabber(id) {
            Some(g) => g.held_object(),
            None => return false,
        };
        if let Some(object) = held {
            self.release_hold(id, object, false);
        }
        self.drop_hover_state(id);
        self.scrub_anchor_candidates(|(_, g)| g == id);
        self.pending_poses.remove(&id);
        self.registry.remove_grabber(id).is_some()
    }

    /// 注册对象并重建依赖图
    pub fn register_object(&mut self, object: Grabbable) -> usize {
        let id = self.registry.add_object(object);
        self.graph.rebuild(&self.registry);
        id
    }

    /// 注销对象
    ///
    /// 持有中的手全部释放（事件正常上报），锚点占用静默清除，
    /// 物理绑定与节拍任务一并撤销。
    pub fn unregister_object(&mut self, id: usize) -> bool {
        if self.registry.object(id).is_none() {
            return false;
        }

        // 释放所有持握（不触发顺手放置，对象即将消失）
        let holders: Vec<usize> = self
            .registry
            .grab(id)
            .map(|g| g.holds.iter().map(|h| h.grabber).collect())
            .unwrap_or_default();
        for grabber in holders {
            self.release_hold(grabber, id, false);
        }

        // 清除锚点占用
        if let Some(anchor_id) = self.registry.object(id).and_then(|o| o.anchor()) {
            if let Some(anchor) = self.registry.anchor_mut(anchor_id) {
                anchor.occupant = None;
            }
        }

        // 子对象的父引用失效
        let ids = self.registry.object_ids();
        for other in ids {
            if let Some(obj) = self.registry.object_mut(other) {
                if obj.parent == Some(id) {
                    obj.parent = None;
                }
            }
        }

        self.scheduler.cancel_tag(id);
        self.physics.unregister(id);
        self.scrub_hover_object(id);
        self.scrub_anchor_candidates(|(o, _)| o == id);
        let removed = self.registry.remove_object(id).is_some();
        self.graph.rebuild(&self.registry);
        removed
    }

    /// 注册锚点
    pub fn register_anchor(&mut self, anchor: Anchor) -> usize {
        self.registry.add_anchor(anchor)
    }

    /// 注销锚点，占用者脱离锚点（静默），在途滑移立即完成
    pub fn unregister_anchor(&mut self, id: usize) -> bool {
        let occupant = match self.registry.anchor(id) {
            Some(a) => a.occupant(),
            None => return false,
        };
        if let Some(object_id) = occupant {
            let grabbed = self.registry.is_grabbed(object_id);
            if let Some(object) = self.registry.object_mut(object_id) {
                object.anchor = None;
                if object.placement.map(|g| g.anchor == id).unwrap_or(false) {
                    object.placement = None;
                }
            }
            if !grabbed {
                self.physics.set_kinematic(object_id, false);
            }
        }
        self.registry.remove_anchor(id).is_some()
    }

    /// 重设对象的可抓取父级，成环返回 false
    pub fn set_parent(&mut self, child: usize, parent: Option<usize>) -> bool {
        if self.registry.object(child).is_none() {
            return false;
        }
        if let Some(p) = parent {
            if p == child || self.registry.object(p).is_none() {
                return false;
            }
            // 沿父链走到头，途经 child 即成环
            let mut cursor = Some(p);
            let mut hops = 0;
            let cap = self.registry.object_count() + 1;
            while let Some(cur) = cursor {
                if cur == child {
                    return false;
                }
                hops += 1;
                if hops > cap {
                    break;
                }
                cursor = self.registry.object(cur).and_then(|o| o.parent());
            }
        }
        if let Some(object) = self.registry.object_mut(child) {
            object.parent = parent;
        }
        self.graph.rebuild(&self.registry);
        true
    }

    /// 启用/禁用抓取器，禁用时持有对象被释放
    pub fn set_grabber_enabled(&mut self, id: usize, enabled: bool) -> bool {
        let held = match self.registry.grabber(id) {
            Some(g) => g.held_object(),
            None => return false,
        };
        if !enabled {
            if let Some(object) = held {
                self.release_hold(id, object, false);
            }
            self.drop_hover_state(id);
        }
        if let Some(grabber) = self.registry.grabber_mut(id) {
            grabber.enabled = enabled;
        }
        true
    }

    /// 启用/禁用对象，禁用时全部持握被释放
    pub fn set_object_enabled(&mut self, id: usize, enabled: bool) -> bool {
        if self.registry.object(id).is_none() {
            return false;
        }
        if !enabled {
            let holders: Vec<usize> = self
                .registry
                .grab(id)
                .map(|g| g.holds.iter().map(|h| h.grabber).collect())
                .unwrap_or_default();
            for grabber in holders {
                self.release_hold(grabber, id, false);
            }
            self.scrub_hover_object(id);
        }
        if let Some(object) = self.registry.object_mut(id) {
            object.enabled = enabled;
        }
        true
    }

    /// 启用/禁用锚点，禁用时在途滑移立即完成（占用保持）
    pub fn set_anchor_enabled(&mut self, id: usize, enabled: bool) -> bool {
        let occupant = match self.registry.anchor(id) {
            Some(a) => a.occupant(),
            None => return false,
        };
        if !enabled {
            if let Some(object_id) = occupant {
                self.finish_glide(object_id);
            }
        }
        if let Some(anchor) = self.registry.anchor_mut(id) {
            anchor.enabled = enabled;
        }
        true
    }

    /// 关停：释放所有持握、完成所有过渡、清空任务
    pub fn shutdown(&mut self) {
        let grabbed = self.registry.grabbed_object_ids();
        for object in grabbed {
            let holders: Vec<usize> = self
                .registry
                .grab(object)
                .map(|g| g.holds.iter().map(|h| h.grabber).collect())
                .unwrap_or_default();
            for grabber in holders {
                self.release_hold(grabber, object, false);
            }
        }
        let ids = self.registry.object_ids();
        for id in ids {
            self.finish_glide(id);
        }
        while self.scheduler.len() > 0 {
            let tags: Vec<usize> = self.registry.object_ids();
            let mut any = false;
            for tag in tags {
                any |= self.scheduler.cancel_tag(tag);
            }
            if !any {
                break;
            }
        }
        self.hover_state.clear();
        self.pending_poses.clear();
        log::info!("操纵核心关停");
    }

    // ========================================
    // 帧输入
    // ========================================

    /// 喂入抓取器本帧原始位姿，update 时消费
    pub fn set_grabber_pose(&mut self, id: usize, pose: Pose) -> bool {
        if self.registry.grabber(id).is_none() {
            return false;
        }
        self.pending_poses.insert(id, pose);
        true
    }

    // ========================================
    // 查询
    // ========================================

    /// 注册表只读访问
    #[inline]
    pub fn registry(&self) -> &GrabRegistry {
        &self.registry
    }

    /// 对象是否被持有
    #[inline]
    pub fn is_grabbed(&self, object: usize) -> bool {
        self.registry.is_grabbed(object)
    }

    /// 抓取器当前持有的对象
    pub fn held_object(&self, grabber: usize) -> Option<usize> {
        self.registry.grabber(grabber).and_then(|g| g.held_object())
    }

    /// 抓取器的显示位姿
    ///
    /// 释放后回退混合 > 持握锁定混合 > 原始追踪位姿。
    /// 锁定只在 HandToObject 吸附、对象受约束或多手持握时生效。
    pub fn grabber_display_pose(&self, grabber_id: usize) -> Option<Pose> {
        let grabber = self.registry.grabber(grabber_id)?;

        if let Some(blend) = &grabber.hand_blend {
            return Some(blend.from.blend(&grabber.pose, blend.timer.factor()));
        }

        let object_id = match grabber.held_object() {
            Some(o) => o,
            None => return Some(grabber.pose),
        };
        let (object, grab) = match (self.registry.object(object_id), self.registry.grab(object_id))
        {
            (Some(o), Some(g)) => (o, g),
            _ => return Some(grabber.pose),
        };
        let hold = match grab.find_hold(grabber_id) {
            Some(h) => h,
            None => return Some(grabber.pose),
        };
        let point = match object.point(hold.point) {
            Some(p) => p,
            None => return Some(grabber.pose),
        };

        let locks = point.snap_target == SnapTarget::HandToObject
            || object.is_constrained()
            || grab.is_multi_hand();
        if !locks {
            return Some(grabber.pose);
        }

        let locked = point.resolve_snap(&object.pose, &grabber.pose);
        Some(grabber.pose.blend(&locked, hold.lock_timer.factor()))
    }

    /// 抓取器当前应呈现的手姿样本
    ///
    /// 提供方返回的混合系数按手锁定进度衰减，姿势随锁定过渡淡入。
    pub fn hand_pose_sample(&self, grabber_id: usize) -> Option<HandPoseSample> {
        let grabber = self.registry.grabber(grabber_id)?;
        let object_id = grabber.held_object()?;
        let grab = self.registry.grab(object_id)?;
        let hold = grab.find_hold(grabber_id)?;

        let mut sample = self.pose_provider.hand_pose(
            &self.registry,
            object_id,
            hold.point,
            grabber.avatar,
            grabber.hand,
        )?;
        sample.blend *= hold.lock_timer.factor();
        Some(sample)
    }

    // ========================================
    // 内部工具
    // ========================================

    /// 发射事件
    pub(crate) fn emit(&mut self, event: GrabEvent) {
        self.events.emit(&event);
    }

    /// 对象的在途滑移立即完成（位姿直达锚点）
    pub(crate) fn finish_glide(&mut self, object_id: usize) {
        let target = match self.registry.object(object_id).and_then(|o| o.placement) {
            Some(glide) => self
                .registry
                .anchor(glide.anchor)
                .map(|a| a.pose)
                .unwrap_or_default(),
            None => return,
        };
        if let Some(object) = self.registry.object_mut(object_id) {
            object.pose = target;
            object.placement = None;
        }
        self.physics.push_kinematic_target(object_id, &target);
    }

    /// 撤销抓取器的悬停状态并补发离开事件
    pub(crate) fn drop_hover_state(&mut self, grabber_id: usize) {
        if let Some((object, point)) = self.hover_state.remove(&grabber_id) {
            self.emit(
                GrabEvent::new(EventKind::GrabRangeLeft, object)
                    .with_grabber(grabber_id)
                    .with_point(point),
            );
        }
    }

    /// 撤销所有指向某对象的悬停状态
    pub(crate) fn scrub_hover_object(&mut self, object_id: usize) {
        let stale: Vec<usize> = self
            .hover_state
            .iter()
            .filter(|(_, (o, _))| *o == object_id)
            .map(|(g, _)| *g)
            .collect();
        for grabber in stale {
            self.drop_hover_state(grabber);
        }
    }

    /// 撤销满足谓词的锚点亲和候选并补发离开事件
    pub(crate) fn scrub_anchor_candidates(&mut self, pred: impl Fn((usize, usize)) -> bool) {
        let stale: Vec<(usize, usize, usize)> = self
            .registry
            .iter_anchors()
            .filter_map(|(id, a)| a.candidate.filter(|c| pred(*c)).map(|(o, g)| (id, o, g)))
            .collect();
        for (anchor_id, object, grabber) in stale {
            if let Some(anchor) = self.registry.anchor_mut(anchor_id) {
                anchor.candidate = None;
            }
            self.emit(
                GrabEvent::new(EventKind::AnchorRangeLeft, object)
                    .with_anchor(anchor_id)
                    .with_grabber(grabber),
            );
        }
    }
}

// ============ 测试 ============

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::reset_config;
    use crate::grabber::HandSide;
    use glam::Vec3;

    fn controller() -> GrabController {
        reset_config();
        GrabController::new()
    }

    #[test]
    fn test_register_lifecycle() {
        let mut c = controller();
        let g = c.register_grabber(Grabber::new("右手", HandSide::Right));
        let o = c.register_object(Grabbable::new("方块"));
        let a = c.register_anchor(Anchor::new("插槽", Pose::IDENTITY));

        assert_eq!(c.registry().grabber_count(), 1);
        assert_eq!(c.registry().object_count(), 1);
        assert_eq!(c.registry().anchor_count(), 1);

        assert!(c.unregister_grabber(g));
        assert!(c.unregister_object(o));
        assert!(c.unregister_anchor(a));
        assert!(!c.unregister_object(o));
        assert_eq!(c.registry().object_count(), 0);
    }

    #[test]
    fn test_set_parent_rejects_cycle() {
        let mut c = controller();
        let a = c.register_object(Grabbable::new("a"));
        let b = c.register_object(Grabbable::new("b"));
        let d = c.register_object(Grabbable::new("d"));

        assert!(c.set_parent(b, Some(a)));
        assert!(c.set_parent(d, Some(b)));
        // a → b → d 已成链，d 不能再当 a 的父级
        assert!(!c.set_parent(a, Some(d)));
        assert!(!c.set_parent(a, Some(a)));
        // 断开合法
        assert!(c.set_parent(b, None));
    }

    #[test]
    fn test_unregister_object_clears_child_parent() {
        let mut c = controller();
        let a = c.register_object(Grabbable::new("a"));
        let b = c.register_object(Grabbable::new("b"));
        assert!(c.set_parent(b, Some(a)));

        assert!(c.unregister_object(a));
        assert!(c.registry().object(b).unwrap().parent().is_none());
    }

    #[test]
    fn test_display_pose_without_hold_is_raw() {
        let mut c = controller();
        let g = c.register_grabber(Grabber::new("左手", HandSide::Left));
        let pose = Pose::from_position(Vec3::new(1.0, 2.0, 3.0));
        c.set_grabber_pose(g, pose);
        c.update(1.0 / 90.0);

        let display = c.grabber_display_pose(g).unwrap();
        assert!((display.position - pose.position).length() < 1e-6);
    }

    #[test]
    fn test_subscribe_unsubscribe() {
        let mut c = controller();
        let token = c.subscribe(|_| {});
        assert!(c.unsubscribe(token));
        assert!(!c.unsubscribe(token));
    }
}
