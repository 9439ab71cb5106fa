use dashmap::DashSet;
use std::fmt;
use std::sync::Arc;
use tickvault_core::common::Symbol;
use tickvault_core::store::entity::SeriesKey;

/// # Summary
/// 一次抓取所占用的目标。
///
/// K 线按 (证券, 周期, 复权) 占用，实时快照按证券占用，两者写入不同文件互不冲突。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FetchTarget {
    Kline(SeriesKey),
    Realtime(Symbol),
}

impl fmt::Display for FetchTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchTarget::Kline(key) => write!(f, "{key}"),
            FetchTarget::Realtime(symbol) => write!(f, "{symbol} realtime"),
        }
    }
}

/// # Summary
/// 进行中抓取的登记表。
///
/// # Invariants
/// - 同一目标同一时刻至多被一个 `ClaimGuard` 持有。
/// - 守卫销毁即释放，任务被取消或异常退出时同样生效。
#[derive(Clone, Default)]
pub struct InFlightRegistry {
    inner: Arc<DashSet<FetchTarget>>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Summary
    /// 尝试占用目标。
    ///
    /// # Returns
    /// 目标空闲时返回守卫；已被占用时返回 `None`，调用方应跳过而非等待。
    pub fn try_claim(&self, target: FetchTarget) -> Option<ClaimGuard> {
        if self.inner.insert(target.clone()) {
            Some(ClaimGuard {
                registry: self.inner.clone(),
                target,
            })
        } else {
            None
        }
    }

    pub fn is_busy(&self, target: &FetchTarget) -> bool {
        self.inner.contains(target)
    }

    /// 当前被占用的目标数
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// 目标占用凭证，销毁时自动释放
#[derive(Debug)]
pub struct ClaimGuard {
    registry: Arc<DashSet<FetchTarget>>,
    target: FetchTarget,
}

impl ClaimGuard {
    pub fn target(&self) -> &FetchTarget {
        &self.target
    }
}

impl Drop for ClaimGuard {
    fn drop(&mut self) {
        self.registry.remove(&self.target);
    }
}
