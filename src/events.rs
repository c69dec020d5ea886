//! 过渡事件
//!
//! 控制器在每次状态变更的前后沿发出有序事件，供音效、触感、UI、网络
//! 同步等订阅方消费。事件在发起操作的调用栈内同步派发；处理器内不得
//! 再同步发起另一次过渡（调用方约定，不强制）。

use bitflags::bitflags;

use crate::config::get_config;

// ============================================================================
// 事件类型
// ============================================================================

/// 事件类型
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    /// 抓取请求已通过校验，即将执行
    GrabTrying,
    /// 抓取前沿
    Grabbing,
    /// 抓取后沿
    Grabbed,
    /// 释放前沿
    Releasing,
    /// 释放后沿
    Released,
    /// 放置前沿
    Placing,
    /// 放置后沿
    Placed,
    /// 离开锚点前沿
    Removing,
    /// 离开锚点后沿
    Removed,
    /// 抓取器进入某对象的可抓范围
    GrabRangeEntered,
    /// 抓取器离开可抓范围
    GrabRangeLeft,
    /// 被持对象进入某锚点的放置范围
    AnchorRangeEntered,
    /// 被持对象离开放置范围
    AnchorRangeLeft,
}

bitflags! {
    /// 事件上下文标记
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct EventFlags: u32 {
        /// 对象同时被多只手持有
        const MULTI_HAND = 1 << 0;
        /// 本次变更由换手引起
        const HAND_SWAP = 1 << 1;
    }
}

/// 过渡事件
#[derive(Clone, Copy, Debug)]
pub struct GrabEvent {
    /// 类型
    pub kind: EventKind,
    /// 涉及的对象
    pub object: usize,
    /// 涉及的锚点
    pub anchor: Option<usize>,
    /// 涉及的抓取器
    pub grabber: Option<usize>,
    /// 涉及的抓取点下标
    pub point: Option<usize>,
    /// 上下文标记
    pub flags: EventFlags,
}

impl GrabEvent {
    /// 创建事件
    pub fn new(kind: EventKind, object: usize) -> Self {
        Self {
            kind,
            object,
            anchor: None,
            grabber: None,
            point: None,
            flags: EventFlags::empty(),
        }
    }

    /// 附加锚点
    pub fn with_anchor(mut self, anchor: usize) -> Self {
        self.anchor = Some(anchor);
        self
    }

    /// 附加抓取器
    pub fn with_grabber(mut self, grabber: usize) -> Self {
        self.grabber = Some(grabber);
        self
    }

    /// 附加抓取点
    pub fn with_point(mut self, point: usize) -> Self {
        self.point = Some(point);
        self
    }

    /// 附加上下文标记
    pub fn with_flags(mut self, flags: EventFlags) -> Self {
        self.flags |= flags;
        self
    }
}

// ============================================================================
// 事件总线
// ============================================================================

type Handler = Box<dyn FnMut(&GrabEvent)>;

/// 订阅者列表
///
/// 订阅返回令牌，退订按令牌移除。派发顺序与订阅顺序一致。
pub struct EventBus {
    handlers: Vec<(u64, Handler)>,
    next_token: u64,
}

impl EventBus {
    /// 空总线
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_token: 1,
        }
    }

    /// 订阅，返回退订令牌
    pub fn subscribe(&mut self, handler: impl FnMut(&GrabEvent) + 'static) -> u64 {
        let token = self.next_token;
        self.next_token += 1;
        self.handlers.push((token, Box::new(handler)));
        token
    }

    /// 按令牌退订
    pub fn unsubscribe(&mut self, token: u64) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(t, _)| *t != token);
        self.handlers.len() != before
    }

    /// 订阅者数量
    #[inline]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// 是否没有订阅者
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// 派发事件
    pub fn emit(&mut self, event: &GrabEvent) {
        if get_config().debug_log {
            log::debug!(
                "事件 {:?} 对象={} 锚点={:?} 抓取器={:?}",
                event.kind,
                event.object,
                event.anchor,
                event.grabber
            );
        }
        for (_, handler) in self.handlers.iter_mut() {
            handler(event);
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("handlers", &self.handlers.len())
            .finish()
    }
}
