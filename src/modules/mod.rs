//! Toy Blog 模块组织结构
//!
//! 核心配置和工具
pub mod config;
pub mod error;
pub mod pagination;
pub mod cli;

// 数据库相关模块
pub mod database {
    pub mod schema;
    pub mod users;
    pub mod tags;
    pub mod posts;
    pub mod comments;
    pub mod hitokoto;
    pub mod collections;
    pub mod friends;
    pub mod images;
}

// 内容处理相关模块
pub mod content {
    pub mod markdown;
    pub mod media;
    pub mod templates;
}

// Web 相关模块
pub mod web {
    pub mod response;
    pub mod auth;
    pub mod upload;
    pub mod proxy;
    pub mod pages;
    pub mod admin;
    pub mod routes;

    // JSON API
    pub mod api {
        pub mod posts;
        pub mod comments;
        pub mod tags;
        pub mod hitokoto;
        pub mod books;
        pub mod friends;
        pub mod images;
        pub mod account;
        pub mod stats;
    }
}
