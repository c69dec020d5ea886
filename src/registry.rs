//! 抓取状态注册表
//!
//! 三类实体的槽位集合（下标即 id，先填空洞再追加，保证扫描顺序确定），
//! 加上"对象 → 活动抓取记录"映射。"X 是否被抓/被放"的唯一权威来源。
//! 只有控制器在单线程帧内改写这里。

use std::collections::HashMap;

use crate::anchor::Anchor;
use crate::grabber::Grabber;
use crate::math::Pose;
use crate::object::Grabbable;
use crate::transition::TransitionTimer;

// ============================================================================
// 活动抓取记录
// ============================================================================

/// 单只手的持握
#[derive(Clone, Debug)]
pub struct Hold {
    /// 抓取器 id
    pub grabber: usize,
    /// 抓取点下标
    pub point: usize,
    /// 抓取瞬间捕获的对象相对手的位姿
    pub grip_offset: Pose,
    /// 手锁定到抓取点的过渡
    pub lock_timer: TransitionTimer,
}

impl Hold {
    /// 创建持握记录并启动锁定过渡
    pub fn new(grabber: usize, point: usize, grip_offset: Pose, lock_duration: f32) -> Self {
        let mut lock_timer = TransitionTimer::new();
        lock_timer.start(lock_duration);
        Self {
            grabber,
            point,
            grip_offset,
            lock_timer,
        }
    }
}

/// 对象的活动抓取记录（首个持握创建，最后一个释放销毁）
#[derive(Clone, Debug)]
pub struct ActiveGrab {
    /// 持握列表（下标 0 为主持握）
    pub holds: Vec<Hold>,
    /// 从哪个锚点上被抓走
    pub source_anchor: Option<usize>,
    /// 对象对齐到手的过渡
    pub align_timer: TransitionTimer,
    /// 对齐起点位姿
    pub align_from: Pose,
}

impl ActiveGrab {
    /// 以首个持握创建记录
    pub fn new(hold: Hold, source_anchor: Option<usize>, align_from: Pose) -> Self {
        Self {
            holds: vec![hold],
            source_anchor,
            align_timer: TransitionTimer::new(),
            align_from,
        }
    }

    /// 主持握（驱动对象位姿的那只手）
    #[inline]
    pub fn primary(&self) -> Option<&Hold> {
        self.holds.first()
    }

    /// 查找某抓取器的持握
    pub fn find_hold(&self, grabber: usize) -> Option<&Hold> {
        self.holds.iter().find(|h| h.grabber == grabber)
    }

    /// 查找某抓取器的持握（可变）
    pub fn find_hold_mut(&mut self, grabber: usize) -> Option<&mut Hold> {
        self.holds.iter_mut().find(|h| h.grabber == grabber)
    }

    /// 是否有某抓取器
    #[inline]
    pub fn has_grabber(&self, grabber: usize) -> bool {
        self.holds.iter().any(|h| h.grabber == grabber)
    }

    /// 某抓取点上的持握
    pub fn holds_on_point(&self, point: usize) -> impl Iterator<Item = &Hold> {
        self.holds.iter().filter(move |h| h.point == point)
    }

    /// 持握数量
    #[inline]
    pub fn hold_count(&self) -> usize {
        self.holds.len()
    }

    /// 是否多手持握
    #[inline]
    pub fn is_multi_hand(&self) -> bool {
        self.holds.len() > 1
    }
}

// ============================================================================
// 槽位集合
// ============================================================================

/// 下标稳定的槽位集合：移除留洞，插入先填最小空洞
#[derive(Clone, Debug)]
struct Slots<T> {
    items: Vec<Option<T>>,
}

impl<T> Slots<T> {
    fn new() -> Self {
        Self { items: Vec::new() }
    }

    fn insert(&mut self, value: T) -> usize {
        for (i, slot) in self.items.iter_mut().enumerate() {
            if slot.is_none() {
                *slot = Some(value);
                return i;
            }
        }
        self.items.push(Some(value));
        self.items.len() - 1
    }

    fn remove(&mut self, id: usize) -> Option<T> {
        self.items.get_mut(id).and_then(|slot| slot.take())
    }

    fn get(&self, id: usize) -> Option<&T> {
        self.items.get(id).and_then(|slot| slot.as_ref())
    }

    fn get_mut(&mut self, id: usize) -> Option<&mut T> {
        self.items.get_mut(id).and_then(|slot| slot.as_mut())
    }

    /// 升序遍历（扫描顺序的确定性来源）
    fn iter(&self) -> impl Iterator<Item = (usize, &T)> {
        self.items
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|v| (i, v)))
    }

    fn len(&self) -> usize {
        self.items.iter().filter(|s| s.is_some()).count()
    }
}

// ============================================================================
// 注册表
// ============================================================================

/// 抓取器/对象/锚点集合与活动抓取映射
#[derive(Debug)]
pub struct GrabRegistry {
    grabbers: Slots<Grabber>,
    objects: Slots<Grabbable>,
    anchors: Slots<Anchor>,
    grabs: HashMap<usize, ActiveGrab>,
}

impl GrabRegistry {
    /// 空注册表
    pub fn new() -> Self {
        Self {
            grabbers: Slots::new(),
            objects: Slots::new(),
            anchors: Slots::new(),
            grabs: HashMap::new(),
        }
    }

    // ========================================
    // 抓取器
    // ========================================

    pub fn add_grabber(&mut self, grabber: Grabber) -> usize {
        self.grabbers.insert(grabber)
    }

    pub fn remove_grabber(&mut self, id: usize) -> Option<Grabber> {
        self.grabbers.remove(id)
    }

    #[inline]
    pub fn grabber(&self, id: usize) -> Option<&Grabber> {
        self.grabbers.get(id)
    }

    #[inline]
    pub fn grabber_mut(&mut self, id: usize) -> Option<&mut Grabber> {
        self.grabbers.get_mut(id)
    }

    pub fn iter_grabbers(&self) -> impl Iterator<Item = (usize, &Grabber)> {
        self.grabbers.iter()
    }

    pub fn grabber_ids(&self) -> Vec<usize> {
        self.grabbers.iter().map(|(i, _)| i).collect()
    }

    pub fn grabber_count(&self) -> usize {
        self.grabbers.len()
    }

    // ========================================
    // 对象
    // ========================================

    pub fn add_object(&mut self, object: Grabbable) -> usize {
        self.objects.insert(object)
    }

    pub fn remove_object(&mut self, id: usize) -> Option<Grabbable> {
        self.objects.remove(id)
    }

    #[inline]
    pub fn object(&self, id: usize) -> Option<&Grabbable> {
        self.objects.get(id)
    }

    #[inline]
    pub fn object_mut(&mut self, id: usize) -> Option<&mut Grabbable> {
        self.objects.get_mut(id)
    }

    pub fn iter_objects(&self) -> impl Iterator<Item = (usize, &Grabbable)> {
        self.objects.iter()
    }

    pub fn object_ids(&self) -> Vec<usize> {
        self.objects.iter().map(|(i, _)| i).collect()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    // ========================================
    // 锚点
    // ========================================

    pub fn add_anchor(&mut self, anchor: Anchor) -> usize {
        self.anchors.insert(anchor)
    }

    pub fn remove_anchor(&mut self, id: usize) -> Option<Anchor> {
        self.anchors.remove(id)
    }

    #[inline]
    pub fn anchor(&self, id: usize) -> Option<&Anchor> {
        self.anchors.get(id)
    }

    #[inline]
    pub fn anchor_mut(&mut self, id: usize) -> Option<&mut Anchor> {
        self.anchors.get_mut(id)
    }

    pub fn iter_anchors(&self) -> impl Iterator<Item = (usize, &Anchor)> {
        self.anchors.iter()
    }

    pub fn anchor_ids(&self) -> Vec<usize> {
        self.anchors.iter().map(|(i, _)| i).collect()
    }

    pub fn anchor_count(&self) -> usize {
        self.anchors.len()
    }

    // ========================================
    // 活动抓取
    // ========================================

    #[inline]
    pub fn grab(&self, object: usize) -> Option<&ActiveGrab> {
        self.grabs.get(&object)
    }

    #[inline]
    pub fn grab_mut(&mut self, object: usize) -> Option<&mut ActiveGrab> {
        self.grabs.get_mut(&object)
    }

    pub fn insert_grab(&mut self, object: usize, grab: ActiveGrab) {
        self.grabs.insert(object, grab);
    }

    pub fn remove_grab(&mut self, object: usize) -> Option<ActiveGrab> {
        self.grabs.remove(&object)
    }

    /// 对象是否被抓
    #[inline]
    pub fn is_grabbed(&self, object: usize) -> bool {
        self.grabs.contains_key(&object)
    }

    /// 被抓对象 id，升序
    pub fn grabbed_object_ids(&self) -> Vec<usize> {
        let mut ids: Vec<usize> = self.grabs.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    pub fn grab_count(&self) -> usize {
        self.grabs.len()
    }
}

impl Default for GrabRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::HandSide;

    #[test]
    fn test_slot_reuse_keeps_scan_order() {
        let mut r = GrabRegistry::new();
        let a = r.add_object(Grabbable::new("a"));
        let b = r.add_object(Grabbable::new("b"));
        let c = r.add_object(Grabbable::new("c"));
        assert_eq!((a, b, c), (0, 1, 2));

        r.remove_object(b);
        // 空洞被下一次插入填上
        let d = r.add_object(Grabbable::new("d"));
        assert_eq!(d, 1);

        let order: Vec<usize> = r.iter_objects().map(|(i, _)| i).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_grab_map_round_trip() {
        let mut r = GrabRegistry::new();
        let g = r.add_grabber(Grabber::new("right", HandSide::Right));
        let o = r.add_object(Grabbable::new("cup"));

        assert!(!r.is_grabbed(o));
        let hold = Hold::new(g, 0, Pose::IDENTITY, 0.1);
        r.insert_grab(o, ActiveGrab::new(hold, None, Pose::IDENTITY));
        assert!(r.is_grabbed(o));
        assert_eq!(r.grab(o).unwrap().hold_count(), 1);
        assert!(r.grab(o).unwrap().has_grabber(g));

        r.remove_grab(o);
        assert!(!r.is_grabbed(o));
    }

    #[test]
    fn test_grabbed_ids_sorted() {
        let mut r = GrabRegistry::new();
        let g = r.add_grabber(Grabber::new("right", HandSide::Right));
        let ids: Vec<usize> = (0..5)
            .map(|i| r.add_object(Grabbable::new(format!("o{}", i))))
            .collect();
        for &o in ids.iter().rev() {
            let hold = Hold::new(g, 0, Pose::IDENTITY, 0.1);
            r.insert_grab(o, ActiveGrab::new(hold, None, Pose::IDENTITY));
        }
        assert_eq!(r.grabbed_object_ids(), ids);
    }

    #[test]
    fn test_multi_hand_queries() {
        let hold = Hold::new(0, 0, Pose::IDENTITY, 0.1);
        let mut grab = ActiveGrab::new(hold, None, Pose::IDENTITY);
        assert!(!grab.is_multi_hand());
        grab.holds.push(Hold::new(1, 1, Pose::IDENTITY, 0.1));
        assert!(grab.is_multi_hand());
        assert_eq!(grab.primary().unwrap().grabber, 0);
        assert_eq!(grab.holds_on_point(1).count(), 1);
    }
}
