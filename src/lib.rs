//! BudgetBrain 活动日志管道
//! 缓冲 + 刷写的审计日志子系统

pub mod buffer;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod repository;
pub mod services;
pub mod telemetry;
