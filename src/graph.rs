//! 依赖图
//!
//! 可抓取对象之间父子关系的派生邻接表：直接子对象、全部后代、look-at
//! 子对象（被持时牵引父对象朝向的那些）。只在结构变更时重建，热路径
//! 均为只读查询，不做任何临时树遍历。

use crate::registry::GrabRegistry;

const EMPTY: &[usize] = &[];

/// 派生邻接数据
#[derive(Clone, Debug, Default)]
pub struct DependencyGraph {
    /// 直接子对象（按 id 升序）
    children: Vec<Vec<usize>>,
    /// 全部后代
    descendants: Vec<Vec<usize>>,
    /// look-at 子对象
    look_children: Vec<Vec<usize>>,
}

impl DependencyGraph {
    /// 空图
    pub fn new() -> Self {
        Self::default()
    }

    /// 依据注册表当前的父指针重建全部邻接表
    pub fn rebuild(&mut self, registry: &GrabRegistry) {
        let cap = registry
            .iter_objects()
            .map(|(i, _)| i + 1)
            .max()
            .unwrap_or(0);

        self.children.clear();
        self.children.resize(cap, Vec::new());
        self.look_children.clear();
        self.look_children.resize(cap, Vec::new());

        // 升序扫描保证各列表内部升序
        for (id, object) in registry.iter_objects() {
            if let Some(parent) = object.parent() {
                if parent < cap && registry.object(parent).is_some() {
                    self.children[parent].push(id);
                    if object.steers_parent() {
                        self.look_children[parent].push(id);
                    }
                }
            }
        }

        // 后代 = 子表的传递闭包（访问标记防环）
        self.descendants.clear();
        self.descendants.resize(cap, Vec::new());
        for root in 0..cap {
            let mut out = Vec::new();
            let mut visited = vec![false; cap];
            visited[root] = true;
            let mut stack: Vec<usize> = self.children[root].clone();
            while let Some(cur) = stack.pop() {
                if cur >= cap || visited[cur] {
                    continue;
                }
                visited[cur] = true;
                out.push(cur);
                stack.extend_from_slice(&self.children[cur]);
            }
            out.sort_unstable();
            self.descendants[root] = out;
        }
    }

    /// 直接子对象
    #[inline]
    pub fn children(&self, object: usize) -> &[usize] {
        self.children.get(object).map(Vec::as_slice).unwrap_or(EMPTY)
    }

    /// 全部后代
    #[inline]
    pub fn descendants(&self, object: usize) -> &[usize] {
        self.descendants
            .get(object)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    /// look-at 子对象
    #[inline]
    pub fn look_children(&self, object: usize) -> &[usize] {
        self.look_children
            .get(object)
            .map(Vec::as_slice)
            .unwrap_or(EMPTY)
    }

    /// 沿依赖链上溯是否存在被持祖先
    ///
    /// 链在独立对象处断开；父环经迭代上限截断。
    pub fn has_held_ancestor(&self, registry: &GrabRegistry, object: usize) -> bool {
        self.held_depth(registry, object) > 0
    }

    /// 依赖链上被持祖先的数量（第二遍内部的排序键）
    pub fn held_depth(&self, registry: &GrabRegistry, object: usize) -> usize {
        let mut depth = 0;
        let mut cur = object;
        let cap = registry.object_count() + 1;
        for _ in 0..cap {
            let o = match registry.object(cur) {
                Some(o) => o,
                None => return depth,
            };
            if !o.is_dependent() {
                return depth;
            }
            let parent = match o.parent() {
                Some(p) => p,
                None => return depth,
            };
            if registry.is_grabbed(parent) {
                depth += 1;
            }
            cur = parent;
        }
        depth
    }

    /// 把被抓对象分成两遍：先根持握，后依赖持握（按链深再按 id 排序）
    pub fn partition_held(&self, registry: &GrabRegistry) -> (Vec<usize>, Vec<usize>) {
        let mut roots = Vec::new();
        let mut dependents = Vec::new();
        for object in registry.grabbed_object_ids() {
            let depth = self.held_depth(registry, object);
            if depth == 0 {
                roots.push(object);
            } else {
                dependents.push((depth, object));
            }
        }
        dependents.sort_unstable();
        (roots, dependents.into_iter().map(|(_, o)| o).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grabber::{Grabber, HandSide};
    use crate::math::Pose;
    use crate::object::{Grabbable, ObjectFlags};
    use crate::registry::{ActiveGrab, Hold};

    fn grab(registry: &mut GrabRegistry, grabber: usize, object: usize) {
        let hold = Hold::new(grabber, 0, Pose::IDENTITY, 0.1);
        registry.insert_grab(object, ActiveGrab::new(hold, None, Pose::IDENTITY));
    }

    #[test]
    fn test_rebuild_children_and_descendants() {
        let mut r = GrabRegistry::new();
        let root = r.add_object(Grabbable::new("rifle"));
        let stock = r.add_object(Grabbable::new("stock"));
        let sight = r.add_object(Grabbable::new("sight"));
        r.object_mut(stock).unwrap().parent = Some(root);
        r.object_mut(sight).unwrap().parent = Some(stock);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);

        assert_eq!(g.children(root), &[stock]);
        assert_eq!(g.children(stock), &[sight]);
        assert_eq!(g.descendants(root), &[stock, sight]);
        assert_eq!(g.descendants(sight), EMPTY);
    }

    #[test]
    fn test_look_children_require_flag() {
        let mut r = GrabRegistry::new();
        let root = r.add_object(Grabbable::new("rifle"));
        let fore = r.add_object(
            Grabbable::new("foregrip")
                .with_flags(ObjectFlags::PLACEABLE | ObjectFlags::CONTROL_PARENT_DIRECTION),
        );
        let plain = r.add_object(Grabbable::new("plain"));
        r.object_mut(fore).unwrap().parent = Some(root);
        r.object_mut(plain).unwrap().parent = Some(root);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);
        assert_eq!(g.look_children(root), &[fore]);
        assert_eq!(g.children(root), &[fore, plain]);
    }

    #[test]
    fn test_independent_child_not_look() {
        let mut r = GrabRegistry::new();
        let root = r.add_object(Grabbable::new("rifle"));
        let free = r.add_object(Grabbable::new("free").with_flags(
            ObjectFlags::PLACEABLE
                | ObjectFlags::CONTROL_PARENT_DIRECTION
                | ObjectFlags::PARENT_INDEPENDENT,
        ));
        r.object_mut(free).unwrap().parent = Some(root);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);
        assert_eq!(g.look_children(root), EMPTY);
    }

    #[test]
    fn test_held_ancestor_and_partition() {
        let mut r = GrabRegistry::new();
        let ga = r.add_grabber(Grabber::new("left", HandSide::Left));
        let gb = r.add_grabber(Grabber::new("right", HandSide::Right));
        let root = r.add_object(Grabbable::new("rifle"));
        let stock = r.add_object(Grabbable::new("stock"));
        let sight = r.add_object(Grabbable::new("sight"));
        r.object_mut(stock).unwrap().parent = Some(root);
        r.object_mut(sight).unwrap().parent = Some(stock);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);

        grab(&mut r, ga, root);
        grab(&mut r, gb, sight);
        assert!(!g.has_held_ancestor(&r, root));
        assert!(g.has_held_ancestor(&r, sight));

        let (roots, deps) = g.partition_held(&r);
        assert_eq!(roots, vec![root]);
        assert_eq!(deps, vec![sight]);
    }

    #[test]
    fn test_partition_orders_by_chain_depth() {
        let mut r = GrabRegistry::new();
        let g0 = r.add_grabber(Grabber::new("a", HandSide::Left));
        let g1 = r.add_grabber(Grabber::new("b", HandSide::Right));
        let g2 = r.add_grabber(Grabber::new("c", HandSide::Left));
        let root = r.add_object(Grabbable::new("root"));
        let mid = r.add_object(Grabbable::new("mid"));
        let leaf = r.add_object(Grabbable::new("leaf"));
        r.object_mut(mid).unwrap().parent = Some(root);
        r.object_mut(leaf).unwrap().parent = Some(mid);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);
        grab(&mut r, g0, root);
        grab(&mut r, g1, mid);
        grab(&mut r, g2, leaf);

        let (roots, deps) = g.partition_held(&r);
        assert_eq!(roots, vec![root]);
        // leaf 的链深 2，排在 mid 之后
        assert_eq!(deps, vec![mid, leaf]);
    }

    #[test]
    fn test_parent_cycle_terminates() {
        let mut r = GrabRegistry::new();
        let a = r.add_object(Grabbable::new("a"));
        let b = r.add_object(Grabbable::new("b"));
        r.object_mut(a).unwrap().parent = Some(b);
        r.object_mut(b).unwrap().parent = Some(a);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);
        // 环不得挂死，也不得产生重复后代
        assert_eq!(g.descendants(a), &[b]);
        assert!(!g.has_held_ancestor(&r, a));
    }

    #[test]
    fn test_independent_breaks_chain() {
        let mut r = GrabRegistry::new();
        let g0 = r.add_grabber(Grabber::new("a", HandSide::Left));
        let root = r.add_object(Grabbable::new("root"));
        let solo = r.add_object(
            Grabbable::new("solo")
                .with_flags(ObjectFlags::PLACEABLE | ObjectFlags::PARENT_INDEPENDENT),
        );
        r.object_mut(solo).unwrap().parent = Some(root);

        let mut g = DependencyGraph::new();
        g.rebuild(&r);
        grab(&mut r, g0, root);
        assert!(!g.has_held_ancestor(&r, solo));
    }
}
