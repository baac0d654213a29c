//! 叉树的错误类型

/// 叉树操作的错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TreeError {
    /// 添加的位置不在叉树的包围盒内
    #[error("position {0} is outside the tree bounds")]
    OutOfBounds(String),

    /// 单元数量或节点数量超出可表示的范围
    #[error("tree capacity exceeded: {0}")]
    CapacityExceeded(&'static str),

    /// 查询过程中叉树被修改
    #[error("tree was modified during shape cast")]
    Invalidated,

    /// 完整性检查失败
    #[error("tree integrity check failed: {0}")]
    Corrupted(String),
}

pub type Result<T> = std::result::Result<T, TreeError>;
