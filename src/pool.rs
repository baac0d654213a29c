//! 缓冲池
//! 叶子的内容缓冲按尺寸分级缓存，第k级的容量为 leaf_capacity << k。
//! 池内部用Mutex保护，可以用Arc在多棵同类型的树之间共享；单棵树的修改仍然只能在一个线程上进行。

use std::mem;

use parking_lot::Mutex;

use crate::cast::CastFrame;
use crate::tree::Batch;

/// 叶子的默认容量
pub const LEAF_CAPACITY: usize = 8;
/// 缓存的尺寸级别数量，超过该级别的缓冲不缓存
pub const CACHE_HIERARCHY: usize = 4;

/// 一种尺寸的空闲列表
#[derive(Debug)]
pub struct FreeList<B> {
    list: Mutex<Vec<B>>,
}

impl<B> FreeList<B> {
    pub fn new() -> Self {
        FreeList {
            list: Mutex::new(Vec::new()),
        }
    }
    #[inline]
    pub fn pop(&self) -> Option<B> {
        self.list.lock().pop()
    }
    #[inline]
    pub fn push(&self, buffer: B) {
        self.list.lock().push(buffer);
    }
    pub fn len(&self) -> usize {
        self.list.lock().len()
    }
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<B> Default for FreeList<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// 叶子内容的分级缓冲池
#[derive(Debug)]
pub struct ContentPool<E> {
    leaf_capacity: usize,
    classes: Vec<FreeList<Vec<E>>>,
}

impl<E> ContentPool<E> {
    /// 参数为0时使用默认值
    pub fn new(leaf_capacity: usize, hierarchy: usize) -> Self {
        let leaf_capacity = if leaf_capacity == 0 {
            LEAF_CAPACITY
        } else {
            leaf_capacity
        };
        let hierarchy = if hierarchy == 0 {
            CACHE_HIERARCHY
        } else {
            hierarchy
        };
        ContentPool {
            leaf_capacity,
            classes: (0..hierarchy).map(|_| FreeList::new()).collect(),
        }
    }

    #[inline]
    pub fn leaf_capacity(&self) -> usize {
        self.leaf_capacity
    }

    #[inline]
    pub fn hierarchy(&self) -> usize {
        self.classes.len()
    }

    /// 指定级别的缓冲容量
    #[inline]
    pub fn capacity(&self, class: usize) -> usize {
        self.leaf_capacity << class
    }

    /// 能容纳len个单元的最小级别
    pub fn class_of(&self, len: usize) -> usize {
        let mut class = 0;
        while self.capacity(class) < len {
            class += 1;
        }
        class
    }

    /// 借出一个指定级别的空缓冲，池中没有时新建
    pub fn take(&self, class: usize) -> Vec<E> {
        match self.classes.get(class).and_then(|list| list.pop()) {
            Some(buffer) => buffer,
            None => Vec::with_capacity(self.capacity(class)),
        }
    }

    /// 清空缓冲后归还，超出缓存级别的直接释放
    pub fn cache(&self, mut buffer: Vec<E>, class: usize) {
        buffer.clear();
        if let Some(list) = self.classes.get(class) {
            list.push(buffer);
        }
    }

    /// 将缓冲扩大一级，旧缓冲归还到池中，返回新的级别
    pub fn expand(&self, buffer: &mut Vec<E>, class: usize) -> usize {
        let mut bigger = self.take(class + 1);
        bigger.append(buffer);
        let old = mem::replace(buffer, bigger);
        self.cache(old, class);
        class + 1
    }

    /// 将缓冲缩小一级
    pub fn shrink(&self, buffer: &mut Vec<E>, class: usize) -> usize {
        debug_assert!(class > 0 && buffer.len() <= self.capacity(class - 1));
        let mut smaller = self.take(class - 1);
        smaller.append(buffer);
        let old = mem::replace(buffer, smaller);
        self.cache(old, class);
        class - 1
    }

    /// 指定级别空闲缓冲的数量
    pub fn cached(&self, class: usize) -> usize {
        self.classes.get(class).map_or(0, |list| list.len())
    }
}

/// 一棵树用到的全部缓冲池：叶子内容、收缩用的临时列表、分裂用的工作列表、查询路径
#[derive(Debug)]
pub struct TreePool<P, T> {
    pub(crate) content: ContentPool<(T, P)>,
    scratch: FreeList<Vec<(T, P)>>,
    batches: FreeList<Vec<Batch<P, T>>>,
    paths: FreeList<Vec<CastFrame<P>>>,
}

impl<P, T> TreePool<P, T> {
    /// 参数为0时使用默认值
    pub fn new(leaf_capacity: usize, hierarchy: usize) -> Self {
        let content = ContentPool::new(leaf_capacity, hierarchy);
        log::debug!(
            "tree pool created, leaf_capacity: {}, hierarchy: {}",
            content.leaf_capacity(),
            content.hierarchy()
        );
        TreePool {
            content,
            scratch: FreeList::new(),
            batches: FreeList::new(),
            paths: FreeList::new(),
        }
    }

    #[inline]
    pub fn content(&self) -> &ContentPool<(T, P)> {
        &self.content
    }

    pub(crate) fn take_scratch(&self) -> Vec<(T, P)> {
        self.scratch.pop().unwrap_or_default()
    }

    pub(crate) fn cache_scratch(&self, mut list: Vec<(T, P)>) {
        list.clear();
        self.scratch.push(list);
    }

    pub(crate) fn take_batches(&self) -> Vec<Batch<P, T>> {
        self.batches.pop().unwrap_or_default()
    }

    // 工作列表处理完时已为空
    pub(crate) fn cache_batches(&self, batches: Vec<Batch<P, T>>) {
        debug_assert!(batches.is_empty());
        self.batches.push(batches);
    }

    /// 借出一个至少能容纳deep+1层的查询路径
    pub(crate) fn take_path(&self, deep: usize) -> Vec<CastFrame<P>> {
        let mut path = self.paths.pop().unwrap_or_default();
        path.reserve(deep + 1);
        path
    }

    pub(crate) fn cache_path(&self, mut path: Vec<CastFrame<P>>) {
        path.clear();
        self.paths.push(path);
    }

    /// 空闲的查询路径数量
    pub fn cached_paths(&self) -> usize {
        self.paths.len()
    }

    /// 空闲的分裂工作列表数量
    pub fn cached_batches(&self) -> usize {
        self.batches.len()
    }
}

impl<P, T> Default for TreePool<P, T> {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

#[test]
fn test_content_pool() {
    let pool: ContentPool<usize> = ContentPool::new(0, 3);
    assert_eq!(pool.leaf_capacity(), LEAF_CAPACITY);
    assert_eq!(pool.hierarchy(), 3);
    assert_eq!(pool.class_of(0), 0);
    assert_eq!(pool.class_of(8), 0);
    assert_eq!(pool.class_of(9), 1);
    assert_eq!(pool.class_of(33), 3);

    let mut buffer = pool.take(0);
    assert!(buffer.capacity() >= 8);
    buffer.extend(0..8);
    let class = pool.expand(&mut buffer, 0);
    assert_eq!(class, 1);
    assert!(buffer.capacity() >= 16);
    assert_eq!(buffer, (0..8).collect::<Vec<_>>());
    assert_eq!(pool.cached(0), 1);

    buffer.truncate(3);
    let class = pool.shrink(&mut buffer, class);
    assert_eq!(class, 0);
    assert_eq!(buffer, vec![0, 1, 2]);
    assert_eq!(pool.cached(0), 0);
    assert_eq!(pool.cached(1), 1);

    pool.cache(buffer, 0);
    assert_eq!(pool.cached(0), 1);
    assert!(pool.take(0).is_empty());
    // 超出缓存级别的缓冲直接释放
    pool.cache(Vec::with_capacity(64), 3);
    assert_eq!(pool.cached(3), 0);

    let list: FreeList<Vec<usize>> = FreeList::default();
    assert!(list.is_empty());
    list.push(vec![1]);
    assert!(!list.is_empty());
    assert_eq!(list.pop(), Some(vec![1]));
    assert!(list.is_empty());
}
