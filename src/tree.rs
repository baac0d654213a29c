//! 固定范围的点叉树
//! 采用二进制掩码 表达xyz的大小， child&1 == 0 表示x为小，否则为大。
//! 分支节点和叶子各放在一个连续数组中，删除时用最后一个元素填补空位，这样内存连续，叉树本身可以快速拷贝。
//! 叶子的内容缓冲从TreePool中借出，按尺寸分级归还。

use std::fmt::Debug;
use std::mem;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use pi_null::Null;

use crate::error::{Result, TreeError};
use crate::pool::TreePool;

pub trait Helper<const N: usize> {
    type Point: Copy + PartialEq + Debug;
    type Vector: Copy + Debug;
    type Aabb: Clone + Debug;

    /// 由中心和尺寸创建包围盒
    fn bounds(center: &Self::Point, size: &Self::Vector) -> Self::Aabb;
    /// 包围盒的最小点及最大点
    fn min_max(aabb: &Self::Aabb) -> (Self::Point, Self::Point);
    /// 由最小点及最大点创建aabb
    fn aabb(min: &Self::Point, max: &Self::Point) -> Self::Aabb;
    /// 判断点是否在aabb内，边界也算在内
    fn aabb_contains_point(aabb: &Self::Aabb, point: &Self::Point) -> bool;
    /// 区域的中心点
    fn center(min: &Self::Point, max: &Self::Point) -> Self::Point;
    /// 判断所在的子节点
    fn get_child(center: &Self::Point, point: &Self::Point) -> usize;
    /// 子节点的区域，小的一侧为[min, center]，大的一侧为[center, max]，子区域正好拼成父区域
    fn child_region(
        min: &Self::Point,
        max: &Self::Point,
        center: &Self::Point,
        child: usize,
    ) -> (Self::Point, Self::Point);
}

/// 查询形状
/// 应用方可以实现自己需要的形状， 比如点查询， 球查询， 视锥体查询...
pub trait Shape<P, A> {
    /// 点是否在形状内
    fn contains_point(&self, point: &P) -> bool;
    /// 形状是否完全包含该区域
    fn contains_region(&self, region: &A) -> bool;
    /// 形状是否和该区域相交
    fn intersects_region(&self, region: &A) -> bool;
}

impl<P, A, S: Shape<P, A> + ?Sized> Shape<P, A> for &S {
    #[inline]
    fn contains_point(&self, point: &P) -> bool {
        (**self).contains_point(point)
    }
    #[inline]
    fn contains_region(&self, region: &A) -> bool {
        (**self).contains_region(region)
    }
    #[inline]
    fn intersects_region(&self, region: &A) -> bool {
        (**self).intersects_region(region)
    }
}

/// 默认的最大深度
pub const DEEP: usize = 10;
pub const DEEP_MAX: usize = 16;
/// 节点下的单元数量小于该值时，节点收缩为叶子
pub const COLLAPSE_COUNT: usize = 6;

const MAX_ITEMS: usize = i32::MAX as usize;
static TREE_ID: AtomicU64 = AtomicU64::new(0);
const MAX_HANDLE: usize = u32::MAX as usize;

/// 叉树的构建参数
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeOptions {
    /// 预计的单元数量，用于预分配节点和叶子数组
    pub capacity: usize,
    /// 是否允许相同的(item, position)重复添加
    pub allow_duplicates: bool,
    /// 最大深度，0表示默认值，超过DEEP_MAX取DEEP_MAX
    pub max_depth: usize,
    /// 收缩阈值，0表示默认值，不超过叶子容量
    pub collapse_count: usize,
}

impl Default for TreeOptions {
    fn default() -> Self {
        TreeOptions {
            capacity: 0,
            allow_duplicates: false,
            max_depth: DEEP,
            collapse_count: COLLAPSE_COUNT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Child {
    Empty,
    Node(u32),
    Leaf(u32),
}

#[derive(Debug, Clone)]
pub(crate) struct Node<const N: usize> {
    pub(crate) parent: u32,       // 父节点，根节点为null
    pub(crate) parent_child: usize, // 对应父节点childs的位置
    pub(crate) item_count: usize, // 其下所有叶子的单元数量
    pub(crate) childs: [Child; N],
}

impl<const N: usize> Node<N> {
    #[inline]
    fn new(parent: u32, parent_child: usize) -> Self {
        Node {
            parent,
            parent_child,
            item_count: 0,
            childs: [Child::Empty; N],
        }
    }
}

#[derive(Debug)]
pub(crate) struct Leaf<T, P> {
    pub(crate) parent: u32,
    pub(crate) parent_child: usize,
    pub(crate) class: usize, // 缓冲的尺寸级别
    pub(crate) content: Vec<(T, P)>,
}

// 查找到的单元
struct Located {
    leaf: usize,
    index: usize,
    same: bool, // 目标位置是否落在同一个叶子内
}

// 分裂后需要重新放入的单元
#[derive(Debug)]
pub(crate) struct Batch<P, T> {
    node: usize,
    depth: usize,
    min: P,
    max: P,
    class: usize,
    entries: Vec<(T, P)>,
}

///
/// 点叉树结构体
///
/// 单元(item, position)存放在叶子中，叶子满了且未到最大深度时分裂为分支节点，
/// 删除后分支节点的单元数量低于阈值时收缩回叶子。
///
pub struct Tree<H: Helper<N>, T, const N: usize> {
    pub(crate) nodes: Vec<Node<N>>,              // 所有分支节点，0为根节点
    pub(crate) leaves: Vec<Leaf<T, H::Point>>,   // 所有叶子
    pub(crate) pool: Arc<TreePool<H::Point, T>>,
    pub(crate) bounds: H::Aabb,
    pub(crate) min: H::Point,
    pub(crate) max: H::Point,
    pub(crate) deep: usize,
    pub(crate) id: u64, // 创建时分配，不同的树不会相同
    collapse_count: usize,
    allow_duplicates: bool,
    pub(crate) version: u64, // 每次修改加1，用于检查查询过程中的修改
}

impl<H: Helper<N>, T, const N: usize> Tree<H, T, N> {
    ///构建树
    ///
    /// 需传入包围盒的中心和尺寸，使用默认参数和独立的缓冲池
    pub fn new(center: H::Point, size: H::Vector) -> Self {
        Self::with_options(center, size, TreeOptions::default())
    }

    pub fn with_options(center: H::Point, size: H::Vector, options: TreeOptions) -> Self {
        Self::with_pool(center, size, options, Arc::new(TreePool::default()))
    }

    /// 使用共享的缓冲池构建树
    pub fn with_pool(
        center: H::Point,
        size: H::Vector,
        options: TreeOptions,
        pool: Arc<TreePool<H::Point, T>>,
    ) -> Self {
        let deep = if options.max_depth == 0 {
            DEEP
        } else if options.max_depth > DEEP_MAX {
            DEEP_MAX
        } else {
            options.max_depth
        };
        let collapse_count = if options.collapse_count == 0 {
            COLLAPSE_COUNT
        } else {
            options.collapse_count
        };
        let leaf_capacity = pool.content.leaf_capacity();
        let collapse_count = collapse_count.min(leaf_capacity);
        let bounds = H::bounds(&center, &size);
        let (min, max) = H::min_max(&bounds);
        let mut nodes = Vec::with_capacity(1 + options.capacity / leaf_capacity);
        nodes.push(Node::new(u32::null(), 0));
        Tree {
            nodes,
            leaves: Vec::with_capacity(options.capacity / leaf_capacity),
            pool,
            bounds,
            min,
            max,
            deep,
            id: TREE_ID.fetch_add(1, Ordering::Relaxed),
            collapse_count,
            allow_duplicates: options.allow_duplicates,
            version: 0,
        }
    }

    /// 单元数量
    #[inline]
    pub fn len(&self) -> usize {
        self.nodes[0].item_count
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn bounds(&self) -> &H::Aabb {
        &self.bounds
    }

    #[inline]
    pub fn max_depth(&self) -> usize {
        self.deep
    }

    #[inline]
    pub fn collapse_count(&self) -> usize {
        self.collapse_count
    }

    #[inline]
    pub fn allow_duplicates(&self) -> bool {
        self.allow_duplicates
    }

    /// 修改版本号
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }

    #[inline]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn pool(&self) -> &Arc<TreePool<H::Point, T>> {
        &self.pool
    }

    /// 当前最深的分支节点所在的层
    pub fn depth(&self) -> usize {
        let mut deepest = 0;
        let mut stack = vec![(0usize, 0usize)];
        while let Some((node, depth)) = stack.pop() {
            deepest = deepest.max(depth);
            for child in self.nodes[node].childs.iter() {
                if let Child::Node(n) = child {
                    stack.push((*n as usize, depth + 1));
                }
            }
        }
        deepest
    }

    /// 遍历所有的单元，顺序为叶子数组的顺序
    pub fn iter(&self) -> impl Iterator<Item = (&T, &H::Point)> {
        self.leaves
            .iter()
            .flat_map(|leaf| leaf.content.iter().map(|(item, point)| (item, point)))
    }

    /// 清空，所有叶子缓冲归还到池中
    pub fn clear(&mut self) {
        log::debug!(
            "clear tree, items: {}, nodes: {}, leaves: {}",
            self.len(),
            self.nodes.len(),
            self.leaves.len()
        );
        self.release();
        self.nodes.truncate(1);
        self.nodes[0] = Node::new(u32::null(), 0);
        self.touch();
    }

    #[inline]
    fn touch(&mut self) {
        self.version = self.version.wrapping_add(1);
    }

    fn release(&mut self) {
        for leaf in self.leaves.drain(..) {
            self.pool.content.cache(leaf.content, leaf.class);
        }
    }

    fn check_capacity(&self) -> Result<()> {
        if self.len() >= MAX_ITEMS {
            log::warn!("tree item count reached {}", MAX_ITEMS);
            return Err(TreeError::CapacityExceeded("item count"));
        }
        if self.nodes.len() + self.deep >= MAX_HANDLE {
            log::warn!("tree node count reached {}", self.nodes.len());
            return Err(TreeError::CapacityExceeded("node count"));
        }
        Ok(())
    }

    // 从根节点向下找到点所在的叶子
    fn find_leaf(&self, point: &H::Point) -> Option<usize> {
        let (mut node, mut min, mut max) = (0, self.min, self.max);
        loop {
            let center = H::center(&min, &max);
            let child = H::get_child(&center, point);
            match self.nodes[node].childs[child] {
                Child::Empty => return None,
                Child::Node(n) => {
                    node = n as usize;
                    (min, max) = H::child_region(&min, &max, &center, child);
                }
                Child::Leaf(l) => return Some(l as usize),
            }
        }
    }

    //////////////////////////////////////////////////////节点及叶子数组/////////////////////////////////////////////////////////

    fn add_node(&mut self, parent: usize, parent_child: usize) -> usize {
        let index = self.nodes.len();
        self.nodes.push(Node::new(parent as u32, parent_child));
        index
    }

    // 用最后一个节点填补空位，返回被移动节点原来的位置
    fn remove_node(&mut self, index: usize) -> Option<usize> {
        debug_assert!(index != 0, "root node can't be removed");
        let last = self.nodes.len() - 1;
        self.nodes.swap_remove(index);
        if index == last {
            return None;
        }
        let (parent, parent_child, childs) = {
            let moved = &self.nodes[index];
            (moved.parent as usize, moved.parent_child, moved.childs)
        };
        self.nodes[parent].childs[parent_child] = Child::Node(index as u32);
        for child in childs {
            match child {
                Child::Node(n) => self.nodes[n as usize].parent = index as u32,
                Child::Leaf(l) => self.leaves[l as usize].parent = index as u32,
                Child::Empty => (),
            }
        }
        Some(last)
    }

    fn add_leaf(&mut self, parent: usize, parent_child: usize, entry: (T, H::Point)) -> usize {
        let mut content = self.pool.content.take(0);
        content.push(entry);
        self.push_leaf(parent, parent_child, 0, content)
    }

    // 用最小能容纳全部单元的缓冲创建叶子
    fn add_leaf_from(
        &mut self,
        parent: usize,
        parent_child: usize,
        entries: &mut Vec<(T, H::Point)>,
    ) -> usize {
        let class = self.pool.content.class_of(entries.len());
        let mut content = self.pool.content.take(class);
        content.append(entries);
        self.push_leaf(parent, parent_child, class, content)
    }

    fn push_leaf(
        &mut self,
        parent: usize,
        parent_child: usize,
        class: usize,
        content: Vec<(T, H::Point)>,
    ) -> usize {
        let index = self.leaves.len();
        self.leaves.push(Leaf {
            parent: parent as u32,
            parent_child,
            class,
            content,
        });
        index
    }

    // 用最后一个叶子填补空位，被删除叶子的缓冲由调用方处理
    fn remove_leaf(&mut self, index: usize) -> Leaf<T, H::Point> {
        let leaf = self.leaves.swap_remove(index);
        if let Some(moved) = self.leaves.get(index) {
            self.nodes[moved.parent as usize].childs[moved.parent_child] =
                Child::Leaf(index as u32);
        }
        leaf
    }

    //////////////////////////////////////////////////////修改/////////////////////////////////////////////////////////////////

    // 从指定节点向上减少单元数量
    fn sub_count(&mut self, mut node: usize) {
        loop {
            let n = &mut self.nodes[node];
            n.item_count -= 1;
            if n.parent.is_null() {
                return;
            }
            node = n.parent as usize;
        }
    }

    // 叶子已满，替换为分支节点，返回新节点及叶子原有的单元
    fn split(&mut self, node: usize, child: usize, leaf: usize) -> (usize, usize, Vec<(T, H::Point)>) {
        let branch = self.add_node(node, child);
        let Leaf { class, content, .. } = self.remove_leaf(leaf);
        self.nodes[node].childs[child] = Child::Node(branch as u32);
        log::trace!("split leaf {} into node {}, items: {}", leaf, branch, content.len());
        (branch, class, content)
    }

    // 节点收缩为叶子，返回父节点
    fn collapse(&mut self, node: usize) -> usize {
        let mut gathered = self.pool.take_scratch();
        for child in 0..N {
            if let Child::Leaf(l) = self.nodes[node].childs[child] {
                self.nodes[node].childs[child] = Child::Empty;
                let mut leaf = self.remove_leaf(l as usize);
                gathered.append(&mut leaf.content);
                self.pool.content.cache(leaf.content, leaf.class);
            }
        }
        let (parent, parent_child) = {
            let n = &self.nodes[node];
            (n.parent as usize, n.parent_child)
        };
        log::trace!("collapse node {}, items: {}", node, gathered.len());
        if gathered.is_empty() {
            self.nodes[parent].childs[parent_child] = Child::Empty;
        } else {
            let leaf = self.add_leaf_from(parent, parent_child, &mut gathered);
            self.nodes[parent].childs[parent_child] = Child::Leaf(leaf as u32);
        }
        self.pool.cache_scratch(gathered);
        match self.remove_node(node) {
            // 父节点是最后一个节点，被移动到了node的位置
            Some(moved) if moved == parent => node,
            _ => parent,
        }
    }

    // 从指定节点向上检查收缩
    fn try_collapse(&mut self, mut node: usize) {
        while node != 0 {
            let n = &self.nodes[node];
            if n.item_count >= self.collapse_count
                || n.childs.iter().any(|c| matches!(c, Child::Node(_)))
            {
                return;
            }
            node = self.collapse(node);
        }
    }

    // 从叶子中取出单元，处理叶子的删除、缩小及节点的收缩
    fn take(&mut self, l: usize, index: usize) -> (T, H::Point) {
        let leaf = &mut self.leaves[l];
        let entry = leaf.content.swap_remove(index);
        let node = leaf.parent as usize;
        if leaf.content.is_empty() {
            let parent_child = leaf.parent_child;
            self.nodes[node].childs[parent_child] = Child::Empty;
            let leaf = self.remove_leaf(l);
            self.pool.content.cache(leaf.content, leaf.class);
        } else if leaf.class > 0
            && leaf.content.len() <= self.pool.content.capacity(leaf.class - 1) / 2
        {
            leaf.class = self.pool.content.shrink(&mut leaf.content, leaf.class);
        }
        self.sub_count(node);
        self.try_collapse(node);
        entry
    }
}

impl<H: Helper<N>, T: PartialEq, const N: usize> Tree<H, T, N> {
    /// 添加单元，位置在包围盒外时返回错误
    ///
    /// 不允许重复时，如果已有相同的(item, position)，返回Ok(false)
    pub fn add(&mut self, item: T, point: H::Point) -> Result<bool> {
        if !H::aabb_contains_point(&self.bounds, &point) {
            return Err(TreeError::OutOfBounds(format!("{:?}", point)));
        }
        self.check_capacity()?;
        let inserted = self.insert((item, point), !self.allow_duplicates);
        if inserted {
            self.touch();
        }
        Ok(inserted)
    }

    /// 移除单元，不存在或在包围盒外时返回false
    pub fn remove(&mut self, item: &T, point: &H::Point) -> bool {
        match self.locate(item, point, None) {
            Some(located) => {
                self.take(located.leaf, located.index);
                self.touch();
                true
            }
            None => false,
        }
    }

    /// 检查是否包含单元
    pub fn contains(&self, item: &T, point: &H::Point) -> bool {
        self.locate(item, point, None).is_some()
    }

    /// 移动单元，任一位置在包围盒外或单元不存在时返回Ok(false)
    ///
    /// 不允许重复时，目标位置已有相同的单元，两者合并为一个
    pub fn move_item(&mut self, item: &T, from: &H::Point, to: H::Point) -> Result<bool> {
        if !H::aabb_contains_point(&self.bounds, &to) {
            return Ok(false);
        }
        let located = match self.locate(item, from, Some(&to)) {
            Some(located) => located,
            None => return Ok(false),
        };
        if located.same {
            // 还在同一个叶子内，直接修改位置
            let content = &self.leaves[located.leaf].content;
            let duplicate = !self.allow_duplicates
                && content
                    .iter()
                    .enumerate()
                    .any(|(i, (t, p))| i != located.index && t == item && *p == to);
            if duplicate {
                self.take(located.leaf, located.index);
            } else {
                self.leaves[located.leaf].content[located.index].1 = to;
            }
            self.touch();
            return Ok(true);
        }
        self.check_capacity()?;
        let (item, _) = self.take(located.leaf, located.index);
        self.insert((item, to), !self.allow_duplicates);
        self.touch();
        Ok(true)
    }

    // 查找单元，to不为空时同时判断to是否落在同一个叶子内
    fn locate(&self, item: &T, point: &H::Point, to: Option<&H::Point>) -> Option<Located> {
        if !H::aabb_contains_point(&self.bounds, point) {
            return None;
        }
        let (mut node, mut min, mut max) = (0, self.min, self.max);
        let mut same = to.is_some();
        loop {
            let center = H::center(&min, &max);
            let child = H::get_child(&center, point);
            if let Some(to) = to {
                same = same && H::get_child(&center, to) == child;
            }
            match self.nodes[node].childs[child] {
                Child::Empty => return None,
                Child::Node(n) => {
                    node = n as usize;
                    (min, max) = H::child_region(&min, &max, &center, child);
                }
                Child::Leaf(l) => {
                    let leaf = l as usize;
                    let index = self.leaves[leaf]
                        .content
                        .iter()
                        .position(|(t, p)| t == item && p == point)?;
                    return Some(Located { leaf, index, same });
                }
            }
        }
    }

    // 从根节点放入单元，分裂出的单元用工作列表重新放入
    fn insert(&mut self, entry: (T, H::Point), check: bool) -> bool {
        let mut batches = self.pool.take_batches();
        let inserted = self.place(0, 0, self.min, self.max, entry, check, &mut batches);
        while let Some(mut batch) = batches.pop() {
            let mut entries = mem::take(&mut batch.entries);
            for entry in entries.drain(..) {
                self.place(
                    batch.node,
                    batch.depth,
                    batch.min,
                    batch.max,
                    entry,
                    false,
                    &mut batches,
                );
            }
            self.pool.content.cache(entries, batch.class);
        }
        self.pool.cache_batches(batches);
        inserted
    }

    // 从指定节点向下放入单元，沿途增加单元数量
    #[allow(clippy::too_many_arguments)]
    fn place(
        &mut self,
        mut node: usize,
        mut depth: usize,
        mut min: H::Point,
        mut max: H::Point,
        entry: (T, H::Point),
        check: bool,
        batches: &mut Vec<Batch<H::Point, T>>,
    ) -> bool {
        loop {
            self.nodes[node].item_count += 1;
            let center = H::center(&min, &max);
            let child = H::get_child(&center, &entry.1);
            match self.nodes[node].childs[child] {
                Child::Empty => {
                    let leaf = self.add_leaf(node, child, entry);
                    self.nodes[node].childs[child] = Child::Leaf(leaf as u32);
                    return true;
                }
                Child::Node(n) => {
                    node = n as usize;
                    depth += 1;
                    (min, max) = H::child_region(&min, &max, &center, child);
                }
                Child::Leaf(l) => {
                    let l = l as usize;
                    if check
                        && self.leaves[l]
                            .content
                            .iter()
                            .any(|(t, p)| *t == entry.0 && *p == entry.1)
                    {
                        // 重复，撤销沿途增加的数量
                        self.sub_count(node);
                        return false;
                    }
                    let leaf = &mut self.leaves[l];
                    if leaf.content.len() < self.pool.content.capacity(leaf.class) {
                        leaf.content.push(entry);
                        return true;
                    }
                    if depth < self.deep {
                        let (branch, class, entries) = self.split(node, child, l);
                        node = branch;
                        depth += 1;
                        (min, max) = H::child_region(&min, &max, &center, child);
                        batches.push(Batch {
                            node,
                            depth,
                            min,
                            max,
                            class,
                            entries,
                        });
                    } else {
                        // 到达最大深度，扩大叶子
                        leaf.class = self.pool.content.expand(&mut leaf.content, leaf.class);
                        log::trace!("expand leaf {} to class {}", l, leaf.class);
                        leaf.content.push(entry);
                        return true;
                    }
                }
            }
        }
    }
}

impl<H: Helper<N>, T, const N: usize> Tree<H, T, N> {
    /// 完整性检查，用于调试和测试
    ///
    /// 检查父子关系、单元数量、叶子容量、深度，以及每个单元都能从根节点找到
    pub fn check(&self) -> Result<()> {
        macro_rules! ensure {
            ($cond:expr, $($arg:tt)*) => {
                if !$cond {
                    return Err(TreeError::Corrupted(format!($($arg)*)));
                }
            };
        }
        ensure!(!self.nodes.is_empty(), "missing root node");
        ensure!(
            self.nodes[0].parent.is_null(),
            "root has parent {}",
            self.nodes[0].parent
        );
        let mut node_seen = vec![false; self.nodes.len()];
        let mut leaf_seen = vec![false; self.leaves.len()];
        let mut stack = vec![(0usize, 0usize)];
        while let Some((index, depth)) = stack.pop() {
            ensure!(!node_seen[index], "node {} reached twice", index);
            node_seen[index] = true;
            ensure!(depth <= self.deep, "node {} at depth {}", index, depth);
            let node = &self.nodes[index];
            let mut sum = 0;
            for (c, child) in node.childs.iter().enumerate() {
                match *child {
                    Child::Empty => (),
                    Child::Node(n) => {
                        let n = n as usize;
                        ensure!(n != 0 && n < self.nodes.len(), "node {} has invalid child {}", index, n);
                        let sub = &self.nodes[n];
                        ensure!(
                            sub.parent as usize == index && sub.parent_child == c,
                            "node {} parent is ({}, {}), expect ({}, {})",
                            n,
                            sub.parent,
                            sub.parent_child,
                            index,
                            c
                        );
                        sum += sub.item_count;
                        stack.push((n, depth + 1));
                    }
                    Child::Leaf(l) => {
                        let l = l as usize;
                        ensure!(l < self.leaves.len(), "node {} has invalid leaf {}", index, l);
                        ensure!(!leaf_seen[l], "leaf {} reached twice", l);
                        leaf_seen[l] = true;
                        let leaf = &self.leaves[l];
                        ensure!(
                            leaf.parent as usize == index && leaf.parent_child == c,
                            "leaf {} parent is ({}, {}), expect ({}, {})",
                            l,
                            leaf.parent,
                            leaf.parent_child,
                            index,
                            c
                        );
                        ensure!(!leaf.content.is_empty(), "leaf {} is empty", l);
                        ensure!(
                            leaf.content.len() <= self.pool.content.capacity(leaf.class),
                            "leaf {} holds {} items, class {}",
                            l,
                            leaf.content.len(),
                            leaf.class
                        );
                        sum += leaf.content.len();
                    }
                }
            }
            ensure!(
                sum == node.item_count,
                "node {} item_count {}, children hold {}",
                index,
                node.item_count,
                sum
            );
        }
        ensure!(node_seen.iter().all(|s| *s), "unreachable node");
        ensure!(leaf_seen.iter().all(|s| *s), "unreachable leaf");
        for (l, leaf) in self.leaves.iter().enumerate() {
            for (_, point) in leaf.content.iter() {
                ensure!(
                    H::aabb_contains_point(&self.bounds, point),
                    "leaf {} point {:?} out of bounds",
                    l,
                    point
                );
                ensure!(
                    self.find_leaf(point) == Some(l),
                    "leaf {} point {:?} not reachable",
                    l,
                    point
                );
            }
        }
        Ok(())
    }
}

impl<H: Helper<N>, T, const N: usize> Drop for Tree<H, T, N> {
    fn drop(&mut self) {
        self.release();
    }
}
