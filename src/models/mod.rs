//! 数据模型模块
//! 活动日志管道的领域模型

pub mod activity_log;
