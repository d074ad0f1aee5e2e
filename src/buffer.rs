//! 活动日志缓冲区
//! 以整体读写 JSON 文件的方式持久化待入库的日志条目

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::activity_log::ActivityLogEntry;

/// 文件缓冲区
///
/// 缓冲文件保存一个 JSON 数组，load/save 始终整体读写而非追加。
/// 同一缓冲文件同一时刻只允许一个逻辑写入者：进程内由
/// `ActivityLogService` 的互斥锁串行化，跨进程共享同一文件属于
/// 部署错误。
pub struct BufferStore {
    path: PathBuf,
}

impl BufferStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// 缓冲文件路径
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 缓冲文件是否存在
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 读取全部缓冲条目
    ///
    /// 文件不存在时返回空序列。文件不可读或内容损坏时记录警告并
    /// 返回空序列：损坏的缓冲不能阻塞新的日志写入。
    pub fn load(&self) -> Vec<ActivityLogEntry> {
        if !self.path.exists() {
            return Vec::new();
        }

        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Failed to read buffer file, treating as empty"
                );
                return Vec::new();
            }
        };

        match serde_json::from_str(&raw) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Malformed buffer file, discarding contents"
                );
                Vec::new()
            }
        }
    }

    /// 整体写入缓冲条目，覆盖旧内容
    pub fn save(&self, entries: &[ActivityLogEntry]) -> Result<(), AppError> {
        let payload = serde_json::to_string_pretty(entries)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        fs::write(&self.path, payload)?;
        Ok(())
    }

    /// 删除缓冲文件
    ///
    /// 文件不存在时视为成功，重复调用无副作用。
    pub fn clear(&self) -> Result<(), AppError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
